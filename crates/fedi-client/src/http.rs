use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fedi_identity::url_utils::last_uuid_in;
use fedi_identity::{Author, Comment, Entry, Like};
use moka::future::Cache;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::backend::SocialBackend;
use crate::error::{BackendError, Result};
use crate::types::{
    AuthorQuery, FollowRequest, FollowStatus, FollowStatusResponse, LikeTarget, Page, PageRequest,
};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const AUTHOR_CACHE_TTL_SECS: u64 = 300; // 5 minutes

/// `SocialBackend` over the node's REST API
pub struct HttpBackend {
    client: Client,
    api_base: Url,
    author_cache: Cache<String, Arc<Author>>,
}

impl HttpBackend {
    /// Create a backend for the API rooted at `api_base` (e.g. `http://localhost:8000/api/`)
    pub fn new(api_base: &str) -> Result<Self> {
        Self::with_timeout(api_base, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(api_base: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(client, api_base)
    }

    /// Use a preconfigured client, e.g. one carrying the session's auth headers
    pub fn with_client(client: Client, api_base: &str) -> Result<Self> {
        let mut api_base = Url::parse(api_base)?;
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }

        let author_cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(AUTHOR_CACHE_TTL_SECS))
            .build();

        Ok(Self {
            client,
            api_base,
            author_cache,
        })
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// Drop a cached author so the next lookup hits the node
    pub async fn invalidate_author(&self, author_id: &str) {
        self.author_cache.invalidate(author_id).await;
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.api_base.join(path)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!(url = %url, "GET");
        let response = self.client.get(url).send().await?;
        let response = check_status(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn send_empty(&self, method: Method, url: Url) -> Result<()> {
        debug!(method = %method, url = %url, "Mutation");
        let response = self.client.request(method, url).send().await?;
        check_status(response).await?;
        Ok(())
    }

    async fn cache_author(&self, author: &Author) {
        let author = Arc::new(author.clone());
        self.author_cache
            .insert(author.id.clone(), author.clone())
            .await;
        if !author.url.is_empty() && author.url != author.id {
            self.author_cache.insert(author.url.clone(), author).await;
        }
    }
}

/// Percent-encode an identifier for use as one path segment.
/// UUIDs pass through untouched; URLs become a single opaque segment.
pub(crate) fn path_id(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

/// Entries accept a full URL in the path. Comments are addressed by UUID only, so a
/// comment URL is reduced to its trailing UUID, which is how the node stores the
/// comments it mirrors.
pub(crate) fn like_path(target: &LikeTarget) -> String {
    match target {
        LikeTarget::Entry(id) => format!("entries/{}/likes/", path_id(id)),
        LikeTarget::Comment(id) => {
            let id = last_uuid_in(id).unwrap_or(id.as_str());
            format!("comments/{}/likes/", path_id(id))
        }
    }
}

pub(crate) fn author_query_path(query: &AuthorQuery) -> String {
    let mut params = vec![
        format!("page={}", query.page.page),
        format!("size={}", query.page.size),
    ];
    if let Some(ref search) = query.search {
        params.push(format!("search={}", urlencoding::encode(search)));
    }
    if let Some(approved) = query.is_approved {
        params.push(format!("is_approved={approved}"));
    }
    if let Some(active) = query.is_active {
        params.push(format!("is_active={active}"));
    }
    format!("authors/?{}", params.join("&"))
}

fn page_query(page: PageRequest) -> String {
    format!("page={}&size={}", page.page, page.size)
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), body = %body, "Backend returned error status");
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl SocialBackend for HttpBackend {
    async fn follow_status(
        &self,
        follower_url: &str,
        followed_url: &str,
    ) -> Result<FollowStatus> {
        let url = self.endpoint(&format!(
            "follows/status/?follower_url={}&followed_url={}",
            urlencoding::encode(follower_url),
            urlencoding::encode(followed_url)
        ))?;
        let response: FollowStatusResponse = self.get_json(url).await?;
        Ok(response.into())
    }

    async fn follow(&self, target_id: &str) -> Result<()> {
        let url = self.endpoint(&format!("authors/{}/follow/", path_id(target_id)))?;
        self.send_empty(Method::POST, url).await
    }

    async fn unfollow(&self, target_id: &str) -> Result<()> {
        let url = self.endpoint(&format!("authors/{}/follow/", path_id(target_id)))?;
        self.send_empty(Method::DELETE, url).await
    }

    async fn follow_requests(&self, all_statuses: bool) -> Result<Vec<FollowRequest>> {
        let path = if all_statuses {
            "follows/requests/?all_statuses=true"
        } else {
            "follows/requests/"
        };
        self.get_json(self.endpoint(path)?).await
    }

    async fn accept_follow_request(&self, request_id: &str) -> Result<()> {
        let url = self.endpoint(&format!("follows/{}/accept/", path_id(request_id)))?;
        self.send_empty(Method::POST, url).await
    }

    async fn reject_follow_request(&self, request_id: &str) -> Result<()> {
        let url = self.endpoint(&format!("follows/{}/reject/", path_id(request_id)))?;
        self.send_empty(Method::POST, url).await
    }

    async fn followers(&self, author_id: &str) -> Result<Vec<Author>> {
        let url = self.endpoint(&format!("authors/{}/followers/", path_id(author_id)))?;
        let page: Page<Author> = self.get_json(url).await?;
        Ok(page.items)
    }

    async fn following(&self, author_id: &str) -> Result<Vec<Author>> {
        let url = self.endpoint(&format!("authors/{}/following/", path_id(author_id)))?;
        let page: Page<Author> = self.get_json(url).await?;
        Ok(page.items)
    }

    async fn search_authors(&self, query: &AuthorQuery) -> Result<Page<Author>> {
        let page: Page<Author> = self.get_json(self.endpoint(&author_query_path(query))?).await?;
        for author in &page.items {
            self.cache_author(author).await;
        }
        Ok(page)
    }

    async fn get_author(&self, author_id: &str) -> Result<Author> {
        if let Some(cached) = self.author_cache.get(author_id).await {
            return Ok(cached.as_ref().clone());
        }

        let url = self.endpoint(&format!("authors/{}/", path_id(author_id)))?;
        let author: Author = self.get_json(url).await?;
        self.cache_author(&author).await;
        if author.id != author_id {
            self.author_cache
                .insert(author_id.to_string(), Arc::new(author.clone()))
                .await;
        }
        Ok(author)
    }

    async fn author_entries(&self, author_id: &str, page: PageRequest) -> Result<Page<Entry>> {
        let url = self.endpoint(&format!(
            "authors/{}/entries/?{}",
            path_id(author_id),
            page_query(page)
        ))?;
        self.get_json(url).await
    }

    async fn entry_comments(&self, entry_id: &str, page: PageRequest) -> Result<Page<Comment>> {
        let url = self.endpoint(&format!(
            "entries/{}/comments/?{}",
            path_id(entry_id),
            page_query(page)
        ))?;
        self.get_json(url).await
    }

    async fn entry_likes(&self, entry_id: &str, page: PageRequest) -> Result<Page<Like>> {
        let url = self.endpoint(&format!(
            "entries/{}/likes/?{}",
            path_id(entry_id),
            page_query(page)
        ))?;
        self.get_json(url).await
    }

    async fn like(&self, target: &LikeTarget) -> Result<()> {
        let url = self.endpoint(&like_path(target))?;
        self.send_empty(Method::POST, url).await
    }

    async fn unlike(&self, target: &LikeTarget) -> Result<()> {
        let url = self.endpoint(&like_path(target))?;
        self.send_empty(Method::DELETE, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_id_encodes_urls_only() {
        assert_eq!(
            path_id("11111111-1111-1111-1111-111111111111"),
            "11111111-1111-1111-1111-111111111111"
        );
        assert_eq!(
            path_id("https://nodeB.example/api/authors/x/"),
            "https%3A%2F%2FnodeB.example%2Fapi%2Fauthors%2Fx%2F"
        );
    }

    #[test]
    fn test_endpoint_joins_relative_to_api_base() {
        let backend = HttpBackend::new("http://localhost:8000/api").unwrap();
        assert_eq!(backend.api_base().as_str(), "http://localhost:8000/api/");
        let url = backend.endpoint("authors/abc/follow/").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/authors/abc/follow/");
    }

    #[test]
    fn test_encoded_remote_id_stays_one_segment() {
        let backend = HttpBackend::new("http://localhost:8000/api/").unwrap();
        let url = backend
            .endpoint(&format!(
                "authors/{}/follow/",
                path_id("https://nodeB.example/api/authors/x")
            ))
            .unwrap();
        assert_eq!(url.path_segments().unwrap().count(), 5);
    }

    #[test]
    fn test_author_query_path_omits_unset_filters() {
        let query = AuthorQuery::default();
        assert_eq!(author_query_path(&query), "authors/?page=1&size=20");

        let query = AuthorQuery {
            search: Some("al ice".to_string()),
            is_approved: Some(true),
            is_active: Some(false),
            page: PageRequest { page: 2, size: 10 },
        };
        assert_eq!(
            author_query_path(&query),
            "authors/?page=2&size=10&search=al%20ice&is_approved=true&is_active=false"
        );
    }

    #[test]
    fn test_like_paths() {
        assert_eq!(
            like_path(&LikeTarget::Entry("e1".to_string())),
            "entries/e1/likes/"
        );
        assert_eq!(
            like_path(&LikeTarget::Comment("c1".to_string())),
            "comments/c1/likes/"
        );
    }

    #[test]
    fn test_remote_comment_like_path_uses_uuid() {
        let remote = "https://nodeB.example/api/authors/a/entries/b/comments/44444444-4444-4444-4444-444444444444/";
        assert_eq!(
            like_path(&LikeTarget::Comment(remote.to_string())),
            "comments/44444444-4444-4444-4444-444444444444/likes/"
        );
        let entry = "https://nodeB.example/api/authors/a/entries/44444444-4444-4444-4444-444444444444";
        assert_eq!(
            like_path(&LikeTarget::Entry(entry.to_string())),
            format!("entries/{}/likes/", urlencoding::encode(entry))
        );
    }
}
