//! Federated identity resolution
//!
//! Authors, entries and comments are identified either by a bare UUID (owned by the
//! local node) or by the absolute URL of the node that owns them. This crate turns
//! either shape into a canonical identifier, decides whether an entity is remote and
//! computes the client route for it, without ever failing on malformed input.

mod model;
mod resolver;
mod route;
pub mod url_utils;

pub use model::{Addressable, Author, AuthorRef, Comment, Entry, Like};
pub use resolver::IdentityResolver;
pub use route::{EntityKind, Route};
