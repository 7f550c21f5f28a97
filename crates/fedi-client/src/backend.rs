use async_trait::async_trait;
use fedi_identity::{Author, AuthorRef, Comment, Entry, Like};

use crate::error::Result;
use crate::types::{AuthorQuery, FollowRequest, FollowStatus, LikeTarget, Page, PageRequest};

/// The REST surface of a node, as consumed by the relationship layer.
///
/// Identifiers passed in are canonical ids: bare UUIDs for local entities and
/// fully-qualified URLs for remote ones.
#[async_trait]
pub trait SocialBackend: Send + Sync {
    /// Follow state between two authors, both given as fully-qualified URLs
    async fn follow_status(&self, follower_url: &str, followed_url: &str)
        -> Result<FollowStatus>;

    async fn follow(&self, target_id: &str) -> Result<()>;

    async fn unfollow(&self, target_id: &str) -> Result<()>;

    /// Follow requests addressed to the authenticated author
    async fn follow_requests(&self, all_statuses: bool) -> Result<Vec<FollowRequest>>;

    async fn accept_follow_request(&self, request_id: &str) -> Result<()>;

    async fn reject_follow_request(&self, request_id: &str) -> Result<()>;

    async fn followers(&self, author_id: &str) -> Result<Vec<Author>>;

    async fn following(&self, author_id: &str) -> Result<Vec<Author>>;

    async fn search_authors(&self, query: &AuthorQuery) -> Result<Page<Author>>;

    async fn get_author(&self, author_id: &str) -> Result<Author>;

    async fn author_entries(&self, author_id: &str, page: PageRequest) -> Result<Page<Entry>>;

    async fn entry_comments(&self, entry_id: &str, page: PageRequest) -> Result<Page<Comment>>;

    async fn entry_likes(&self, entry_id: &str, page: PageRequest) -> Result<Page<Like>>;

    async fn like(&self, target: &LikeTarget) -> Result<()>;

    async fn unlike(&self, target: &LikeTarget) -> Result<()>;
}

/// Turn an author reference into a full author, fetching it if only the id is known
pub async fn resolve_author<B>(backend: &B, author: AuthorRef) -> Result<Author>
where
    B: SocialBackend + ?Sized,
{
    match author {
        AuthorRef::Resolved(author) => Ok(author),
        AuthorRef::Unresolved(id) => backend.get_author(&id).await,
    }
}
