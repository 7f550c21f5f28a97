//! Federated node REST client
//!
//! `SocialBackend` is the seam the relationship layer talks through;
//! `HttpBackend` implements it against a node's JSON API with reqwest, caching
//! author lookups in a moka async cache.

mod backend;
pub mod error;
mod http;
mod types;

pub use backend::{resolve_author, SocialBackend};
pub use error::{BackendError, Result};
pub use http::HttpBackend;
pub use types::{
    AuthorQuery, FollowRequest, FollowState, FollowStatus, LikeTarget, Page, PageRequest,
};
