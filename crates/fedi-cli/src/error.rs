use std::fmt;

use fedi_client::BackendError;
use fedi_relationships::RelationshipError;

#[derive(Debug)]
pub enum CliError {
    Config(String),
    Backend(BackendError),
    Relationship(RelationshipError),
    Output(serde_json::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Backend(err) => write!(f, "{}", err),
            CliError::Relationship(err) => write!(f, "{}", err),
            CliError::Output(err) => write!(f, "Failed to write output: {}", err),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Backend(err) => Some(err),
            CliError::Relationship(err) => Some(err),
            CliError::Output(err) => Some(err),
            CliError::Config(_) => None,
        }
    }
}

impl From<BackendError> for CliError {
    fn from(err: BackendError) -> Self {
        CliError::Backend(err)
    }
}

impl From<RelationshipError> for CliError {
    fn from(err: RelationshipError) -> Self {
        CliError::Relationship(err)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Output(err)
    }
}
