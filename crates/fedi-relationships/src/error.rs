//! Error types for relationship actions

use std::fmt;

use fedi_client::{BackendError, FollowState};

#[derive(Debug)]
pub enum RelationshipError {
    /// Follow or like aimed at the viewer's own identity; no request was made
    SelfAction,
    /// Another action on the same key has not settled yet; this one was dropped
    InFlight,
    /// The current state has no edge to the requested one
    IllegalTransition { from: FollowState, to: FollowState },
    /// The backend call failed and the optimistic change was rolled back
    Backend(BackendError),
}

impl RelationshipError {
    /// Guards that are dropped without telling the user
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            RelationshipError::SelfAction | RelationshipError::InFlight
        )
    }
}

impl fmt::Display for RelationshipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationshipError::SelfAction => write!(f, "Cannot act on your own identity"),
            RelationshipError::InFlight => write!(f, "An action for this item is already in progress"),
            RelationshipError::IllegalTransition { from, to } => write!(
                f,
                "Cannot move from {} to {}",
                from.as_str(),
                to.as_str()
            ),
            RelationshipError::Backend(err) => write!(f, "Backend error: {}", err),
        }
    }
}

impl std::error::Error for RelationshipError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelationshipError::Backend(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BackendError> for RelationshipError {
    fn from(err: BackendError) -> Self {
        RelationshipError::Backend(err)
    }
}

pub type Result<T> = std::result::Result<T, RelationshipError>;
