//! In-memory backend used by the state machine tests

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fedi_client::{
    AuthorQuery, BackendError, FollowRequest, FollowState, FollowStatus, LikeTarget, Page,
    PageRequest, Result, SocialBackend,
};
use fedi_identity::{Author, Comment, Entry, Like};
use parking_lot::Mutex;

#[derive(Default)]
pub(crate) struct MockBackend {
    calls: Mutex<Vec<String>>,
    statuses: Mutex<HashMap<String, FollowState>>,
    status_delays: Mutex<VecDeque<Duration>>,
    requests: Mutex<Vec<FollowRequest>>,
    followers: Mutex<Vec<Author>>,
    likes: Mutex<Vec<Like>>,
    /// Status every mutation fails with; 0 lets them succeed
    failure_status: AtomicU16,
    settled: AtomicBool,
}

impl MockBackend {
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// State reported for `followed_url` from now on
    pub(crate) fn set_status(&self, followed_url: &str, state: FollowState) {
        self.statuses.lock().insert(followed_url.to_string(), state);
    }

    /// Delay the next status lookup; the answer is captured before the delay
    pub(crate) fn delay_next_status(&self, delay: Duration) {
        self.status_delays.lock().push_back(delay);
    }

    pub(crate) fn fail_mutations(&self, fail: bool) {
        self.fail_mutations_with(if fail { 503 } else { 0 });
    }

    pub(crate) fn fail_mutations_with(&self, status: u16) {
        self.failure_status.store(status, Ordering::SeqCst);
    }

    /// Accept/reject answer 409 as if the request had been settled elsewhere
    pub(crate) fn settle_elsewhere(&self, settled: bool) {
        self.settled.store(settled, Ordering::SeqCst);
    }

    pub(crate) fn set_requests(&self, requests: Vec<FollowRequest>) {
        *self.requests.lock() = requests;
    }

    pub(crate) fn set_followers(&self, followers: Vec<Author>) {
        *self.followers.lock() = followers;
    }

    pub(crate) fn set_likes(&self, likes: Vec<Like>) {
        *self.likes.lock() = likes;
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    async fn mutate(&self, call: String) -> Result<()> {
        self.record(call);
        tokio::task::yield_now().await;
        let status = self.failure_status.load(Ordering::SeqCst);
        if status != 0 {
            return Err(BackendError::Status {
                status,
                body: "refused".to_string(),
            });
        }
        Ok(())
    }

    async fn settle(&self, call: String) -> Result<()> {
        if self.settled.load(Ordering::SeqCst) {
            self.record(call);
            return Err(BackendError::Status {
                status: 409,
                body: "already settled".to_string(),
            });
        }
        self.mutate(call).await
    }
}

fn page<T>(items: Vec<T>) -> Page<T> {
    Page {
        page_number: Some(1),
        size: Some(items.len() as u32),
        count: Some(items.len() as u64),
        items,
    }
}

#[async_trait]
impl SocialBackend for MockBackend {
    async fn follow_status(&self, follower_url: &str, followed_url: &str) -> Result<FollowStatus> {
        self.record(format!("status {follower_url} {followed_url}"));
        let state = self
            .statuses
            .lock()
            .get(followed_url)
            .copied()
            .unwrap_or_default();
        let delay = self.status_delays.lock().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(FollowStatus::from_state(state))
    }

    async fn follow(&self, target_id: &str) -> Result<()> {
        self.mutate(format!("follow {target_id}")).await
    }

    async fn unfollow(&self, target_id: &str) -> Result<()> {
        self.mutate(format!("unfollow {target_id}")).await
    }

    async fn follow_requests(&self, all_statuses: bool) -> Result<Vec<FollowRequest>> {
        self.record(format!("requests {all_statuses}"));
        Ok(self.requests.lock().clone())
    }

    async fn accept_follow_request(&self, request_id: &str) -> Result<()> {
        self.settle(format!("accept {request_id}")).await
    }

    async fn reject_follow_request(&self, request_id: &str) -> Result<()> {
        self.settle(format!("reject {request_id}")).await
    }

    async fn followers(&self, author_id: &str) -> Result<Vec<Author>> {
        self.record(format!("followers {author_id}"));
        Ok(self.followers.lock().clone())
    }

    async fn following(&self, author_id: &str) -> Result<Vec<Author>> {
        self.record(format!("following {author_id}"));
        Ok(Vec::new())
    }

    async fn search_authors(&self, _query: &AuthorQuery) -> Result<Page<Author>> {
        Ok(page(Vec::new()))
    }

    async fn get_author(&self, author_id: &str) -> Result<Author> {
        Ok(Author {
            id: author_id.to_string(),
            ..Default::default()
        })
    }

    async fn author_entries(&self, _author_id: &str, _page: PageRequest) -> Result<Page<Entry>> {
        Ok(page(Vec::new()))
    }

    async fn entry_comments(&self, _entry_id: &str, _page: PageRequest) -> Result<Page<Comment>> {
        Ok(page(Vec::new()))
    }

    async fn entry_likes(&self, entry_id: &str, request: PageRequest) -> Result<Page<Like>> {
        self.record(format!("likes {entry_id}"));
        let likes = self.likes.lock().clone();
        let start = (request.page.saturating_sub(1) * request.size) as usize;
        Ok(Page {
            page_number: Some(request.page),
            size: Some(request.size),
            count: Some(likes.len() as u64),
            items: likes
                .into_iter()
                .skip(start)
                .take(request.size as usize)
                .collect(),
        })
    }

    async fn like(&self, target: &LikeTarget) -> Result<()> {
        self.mutate(format!("like {}", describe(target))).await
    }

    async fn unlike(&self, target: &LikeTarget) -> Result<()> {
        self.mutate(format!("unlike {}", describe(target))).await
    }
}

fn describe(target: &LikeTarget) -> String {
    match target {
        LikeTarget::Entry(id) => format!("entry {id}"),
        LikeTarget::Comment(id) => format!("comment {id}"),
    }
}
