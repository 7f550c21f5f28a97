//! Error types for the backend client

use std::fmt;

#[derive(Debug)]
pub enum BackendError {
    Http(Box<reqwest::Error>),
    Status { status: u16, body: String },
    Decode(String),
    InvalidUrl(String),
}

impl BackendError {
    /// The backend refused because the target already changed state elsewhere
    pub fn is_conflict(&self) -> bool {
        matches!(self, BackendError::Status { status: 409, .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::Status { status: 404, .. })
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Http(err) => write!(f, "HTTP error: {}", err),
            BackendError::Status { status, body } => {
                write!(f, "Backend returned status {}: {}", status, body)
            }
            BackendError::Decode(msg) => write!(f, "Failed to decode response: {}", msg),
            BackendError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackendError::Http(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Http(Box::new(err))
        }
    }
}

impl From<url::ParseError> for BackendError {
    fn from(err: url::ParseError) -> Self {
        BackendError::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = BackendError::Status {
            status: 404,
            body: "not found".to_string(),
        };
        assert_eq!(format!("{}", err), "Backend returned status 404: not found");
        assert!(err.is_not_found());
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_only_409_is_a_conflict() {
        let status = |status| BackendError::Status {
            status,
            body: String::new(),
        };
        assert!(status(409).is_conflict());
        assert!(!status(400).is_conflict());
        assert!(!BackendError::Decode("x".to_string()).is_conflict());
    }

    #[test]
    fn test_url_parse_error_converts() {
        let err: BackendError = url::Url::parse("::").unwrap_err().into();
        assert!(matches!(err, BackendError::InvalidUrl(_)));
    }
}
