use fedi_identity::Author;
use serde::{Deserialize, Deserializer, Serialize};

/// Follow relationship state as reported by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum FollowState {
    #[default]
    None,
    Requesting,
    Accepted,
    Rejected,
}

impl FollowState {
    pub fn as_str(self) -> &'static str {
        match self {
            FollowState::None => "none",
            FollowState::Requesting => "requesting",
            FollowState::Accepted => "accepted",
            FollowState::Rejected => "rejected",
        }
    }
}

impl From<String> for FollowState {
    /// Unknown values (including the legacy `not_following`) read as `None`
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "requesting" | "pending" => FollowState::Requesting,
            "accepted" => FollowState::Accepted,
            "rejected" => FollowState::Rejected,
            _ => FollowState::None,
        }
    }
}

/// Result of a follow status lookup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FollowStatus {
    pub is_following: bool,
    pub follow_status: FollowState,
}

impl FollowStatus {
    pub fn from_state(state: FollowState) -> Self {
        Self {
            is_following: state == FollowState::Accepted,
            follow_status: state,
        }
    }
}

/// Status endpoint response. Newer nodes answer `{is_following, follow_status}`,
/// older ones `{follower, followed, status}`.
#[derive(Debug, Deserialize)]
pub(crate) struct FollowStatusResponse {
    #[serde(default)]
    pub(crate) is_following: Option<bool>,
    #[serde(default)]
    pub(crate) follow_status: Option<FollowState>,
    #[serde(default)]
    pub(crate) status: Option<FollowState>,
}

impl From<FollowStatusResponse> for FollowStatus {
    fn from(resp: FollowStatusResponse) -> Self {
        let mut state = resp.follow_status.or(resp.status).unwrap_or_default();
        if resp.is_following == Some(true) && state == FollowState::None {
            state = FollowState::Accepted;
        }
        Self {
            is_following: resp.is_following.unwrap_or(state == FollowState::Accepted),
            follow_status: state,
        }
    }
}

/// An incoming follow request as listed by the recipient's node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowRequest {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// The author asking to follow
    pub actor: Author,
    /// The author being followed
    pub object: Author,
    #[serde(default)]
    pub status: FollowState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Node-assigned ids are integers on some nodes and UUID strings on others
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    })
}

/// Paginated collection envelope. The item list is named after the collection
/// (`src`, `items`, `authors`, ...) depending on the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(
        alias = "src",
        alias = "authors",
        alias = "comments",
        alias = "likes",
        alias = "followers",
        alias = "following"
    )]
    pub items: Vec<T>,
}

impl<T> Page<T> {
    /// Whether the backend reported more items beyond this page
    pub fn has_more(&self, request: PageRequest) -> bool {
        match self.count {
            Some(count) => u64::from(request.page) * u64::from(request.size) < count,
            None => self.items.len() as u64 >= u64::from(request.size),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, size: 20 }
    }
}

/// Filters for the author directory. Unset filters are omitted so remote authors
/// (which are never `is_active` locally) still show up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorQuery {
    pub search: Option<String>,
    pub is_approved: Option<bool>,
    pub is_active: Option<bool>,
    pub page: PageRequest,
}

/// Something that can be liked
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LikeTarget {
    Entry(String),
    Comment(String),
}

impl LikeTarget {
    pub fn id(&self) -> &str {
        match self {
            LikeTarget::Entry(id) | LikeTarget::Comment(id) => id,
        }
    }
}
