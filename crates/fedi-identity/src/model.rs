//! Federated entities as they appear on the wire

use serde::{Deserialize, Serialize};

use crate::route::EntityKind;
use crate::url_utils::absolute_url;

/// An author, local or mirrored from a remote node.
///
/// `id` is either a bare UUID (local) or the author's fully-qualified URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    /// API root of the node hosting this author, e.g. `http://node/api/`
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub web: String,
    #[serde(default, rename = "displayName")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
    #[serde(
        default,
        rename = "profileImage",
        skip_serializing_if = "Option::is_none"
    )]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_approved: bool,
    #[serde(default)]
    pub is_staff: bool,
}

/// Authorship as sent by the backend: either an embedded author or just its identifier.
///
/// Fields of an `Unresolved` reference are unavailable until it is looked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuthorRef {
    Resolved(Author),
    Unresolved(String),
}

impl AuthorRef {
    /// The identifier, available in both shapes
    pub fn id(&self) -> &str {
        match self {
            AuthorRef::Resolved(author) => &author.id,
            AuthorRef::Unresolved(id) => id,
        }
    }

    pub fn resolved(&self) -> Option<&Author> {
        match self {
            AuthorRef::Resolved(author) => Some(author),
            AuthorRef::Unresolved(_) => None,
        }
    }

    pub fn into_resolved(self) -> Option<Author> {
        match self {
            AuthorRef::Resolved(author) => Some(author),
            AuthorRef::Unresolved(_) => None,
        }
    }
}

impl From<Author> for AuthorRef {
    fn from(author: Author) -> Self {
        AuthorRef::Resolved(author)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "contentType")]
    pub content_type: String,
    #[serde(default)]
    pub visibility: String,
    pub author: AuthorRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default, rename = "contentType")]
    pub content_type: String,
    pub author: AuthorRef,
    /// Identifier of the entry this comment belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    pub id: String,
    pub author: AuthorRef,
    /// Identifier of the liked entry or comment
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
}

/// Anything carrying the dual local/remote identifier shape
pub trait Addressable {
    const KIND: EntityKind;

    /// Identifier exactly as received
    fn raw_id(&self) -> &str;

    /// Node host the entity claims, when the wire format carries one
    fn host(&self) -> Option<&str> {
        None
    }

    /// Fully-qualified URL of the entity, if one is known
    fn fqid(&self) -> Option<&str> {
        let raw = self.raw_id();
        absolute_url(raw).map(|_| raw)
    }
}

impl Addressable for Author {
    const KIND: EntityKind = EntityKind::Author;

    fn raw_id(&self) -> &str {
        &self.id
    }

    fn host(&self) -> Option<&str> {
        (!self.host.is_empty()).then_some(self.host.as_str())
    }

    fn fqid(&self) -> Option<&str> {
        if absolute_url(&self.url).is_some() {
            Some(&self.url)
        } else {
            absolute_url(&self.id).map(|_| self.id.as_str())
        }
    }
}

impl Addressable for AuthorRef {
    const KIND: EntityKind = EntityKind::Author;

    fn raw_id(&self) -> &str {
        self.id()
    }

    fn host(&self) -> Option<&str> {
        self.resolved().and_then(Addressable::host)
    }

    fn fqid(&self) -> Option<&str> {
        match self {
            AuthorRef::Resolved(author) => author.fqid(),
            AuthorRef::Unresolved(id) => absolute_url(id).map(|_| id.as_str()),
        }
    }
}

impl Addressable for Entry {
    const KIND: EntityKind = EntityKind::Entry;

    fn raw_id(&self) -> &str {
        &self.id
    }
}

impl Addressable for Comment {
    const KIND: EntityKind = EntityKind::Comment;

    fn raw_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_author_from_wire() {
        let json = r#"{
            "type": "author",
            "id": "https://nodeB.example/api/authors/22222222-2222-2222-2222-222222222222",
            "host": "https://nodeB.example/api/",
            "displayName": "Bea",
            "profileImage": "https://nodeB.example/img.png",
            "web": "https://nodeB.example/authors/22222222-2222-2222-2222-222222222222"
        }"#;

        let author: Author = serde_json::from_str(json).unwrap();
        assert_eq!(author.display_name, "Bea");
        assert_eq!(author.host, "https://nodeB.example/api/");
        assert!(author.url.is_empty());
        assert!(!author.is_active);
        assert_eq!(
            author.fqid(),
            Some("https://nodeB.example/api/authors/22222222-2222-2222-2222-222222222222")
        );
    }

    #[test]
    fn test_author_ref_accepts_object_or_string() {
        let entry: Entry = serde_json::from_str(
            r#"{"id": "e1", "title": "t", "author": "11111111-1111-1111-1111-111111111111"}"#,
        )
        .unwrap();
        assert!(entry.author.resolved().is_none());
        assert_eq!(entry.author.id(), "11111111-1111-1111-1111-111111111111");

        let entry: Entry = serde_json::from_str(
            r#"{"id": "e1", "author": {"id": "a1", "displayName": "Al", "is_active": true}}"#,
        )
        .unwrap();
        let author = entry.author.resolved().unwrap();
        assert_eq!(author.display_name, "Al");
        assert!(author.is_active);
    }

    #[test]
    fn test_unresolved_ref_has_no_host() {
        let r = AuthorRef::Unresolved("https://nodeB.example/api/authors/x".to_string());
        assert!(r.host().is_none());
        assert_eq!(r.fqid(), Some("https://nodeB.example/api/authors/x"));
    }

    #[test]
    fn test_author_fqid_prefers_url() {
        let author = Author {
            id: "11111111-1111-1111-1111-111111111111".to_string(),
            url: "http://local/api/authors/11111111-1111-1111-1111-111111111111".to_string(),
            ..Default::default()
        };
        assert_eq!(author.fqid(), Some(author.url.as_str()));

        let bare = Author {
            id: "11111111-1111-1111-1111-111111111111".to_string(),
            ..Default::default()
        };
        assert_eq!(bare.fqid(), None);
    }
}
