//! Optimistic like/unlike for entries and comments.
//!
//! Unlike follows, a like is not re-read from the backend after it settles.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fedi_client::{LikeTarget, PageRequest, SocialBackend};
use fedi_identity::{Author, Comment, Entry, IdentityResolver};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::RelationshipCache;
use crate::error::{RelationshipError, Result};
use crate::events::{BusEvent, EventBus, POST_UPDATE};
use crate::optimistic::{ActionCoordinator, ActionFailure, OptimisticStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LikeState {
    pub liked: bool,
    pub count: u64,
}

#[derive(Default)]
struct LikeStates(Mutex<HashMap<LikeTarget, LikeState>>);

impl OptimisticStore<LikeTarget> for LikeStates {
    type Snapshot = Option<LikeState>;

    fn snapshot(&self, target: &LikeTarget) -> Option<LikeState> {
        self.0.lock().get(target).copied()
    }

    fn apply(&self, target: &LikeTarget, snapshot: Option<LikeState>) {
        let mut states = self.0.lock();
        match snapshot {
            Some(state) => {
                states.insert(target.clone(), state);
            }
            None => {
                states.remove(target);
            }
        }
    }
}

pub struct LikeController<B: ?Sized> {
    backend: Arc<B>,
    resolver: IdentityResolver,
    viewer_id: String,
    bus: EventBus,
    states: LikeStates,
    cache: Arc<RelationshipCache<LikeTarget, LikeState>>,
    actions: ActionCoordinator<LikeTarget>,
}

impl<B> LikeController<B>
where
    B: SocialBackend + ?Sized,
{
    pub fn new(
        backend: Arc<B>,
        resolver: IdentityResolver,
        viewer: &Author,
        bus: EventBus,
        cache_window: Duration,
    ) -> Self {
        let viewer_id = resolver.canonical_id(&viewer.id).to_string();
        Self {
            backend,
            resolver,
            viewer_id,
            bus,
            states: LikeStates::default(),
            cache: Arc::new(RelationshipCache::new(cache_window)),
            actions: ActionCoordinator::new(),
        }
    }

    pub fn cache(&self) -> &Arc<RelationshipCache<LikeTarget, LikeState>> {
        &self.cache
    }

    pub fn entry_target(&self, entry: &Entry) -> LikeTarget {
        LikeTarget::Entry(self.resolver.canonical_id(&entry.id).to_string())
    }

    pub fn comment_target(&self, comment: &Comment) -> LikeTarget {
        LikeTarget::Comment(self.resolver.canonical_id(&comment.id).to_string())
    }

    /// Record state already known from a listing
    pub fn seed(&self, target: LikeTarget, state: LikeState) {
        self.states.apply(&target, Some(state));
    }

    pub fn state(&self, target: &LikeTarget) -> LikeState {
        self.states.snapshot(target).unwrap_or_default()
    }

    /// Read an entry's likes from the backend, paging until the viewer's like turns
    /// up or the listing ends
    pub async fn load(&self, entry_id: &str) -> Result<LikeState> {
        let target = LikeTarget::Entry(self.resolver.canonical_id(entry_id).to_string());
        let mut request = PageRequest::default();
        let mut liked = false;
        let mut seen = 0u64;

        let count = loop {
            let page = self.backend.entry_likes(target.id(), request).await?;
            seen += page.items.len() as u64;
            liked = liked
                || page
                    .items
                    .iter()
                    .any(|like| self.resolver.same_entity(like.author.id(), &self.viewer_id));

            let more = !page.items.is_empty() && page.has_more(request);
            match page.count {
                Some(total) if liked || !more => break total,
                None if !more => break seen,
                _ => request.page += 1,
            }
        };
        let state = LikeState { liked, count };

        if self.actions.is_in_flight(&target) {
            debug!(entry = %target.id(), "Like in flight, keeping optimistic state");
            return Ok(self.state(&target));
        }
        self.states.apply(&target, Some(state));
        self.cache.put(target, state);
        Ok(state)
    }

    /// Cached like state within the reconciliation window, otherwise a fresh load
    pub async fn refresh(&self, entry_id: &str) -> Result<LikeState> {
        let target = LikeTarget::Entry(self.resolver.canonical_id(entry_id).to_string());
        if let Some(state) = self.cache.get_fresh(&target) {
            return Ok(state);
        }
        self.load(entry_id).await
    }

    pub async fn like_entry(&self, entry: &Entry) -> Result<LikeState> {
        self.like(self.entry_target(entry), entry.author.id()).await
    }

    pub async fn like_comment(&self, comment: &Comment) -> Result<LikeState> {
        self.like(self.comment_target(comment), comment.author.id())
            .await
    }

    /// Like `target`, authored by `author_id`. Liking your own work is refused.
    pub async fn like(&self, target: LikeTarget, author_id: &str) -> Result<LikeState> {
        if self.resolver.same_entity(author_id, &self.viewer_id) {
            return Err(RelationshipError::SelfAction);
        }
        if self.actions.is_in_flight(&target) {
            return Err(RelationshipError::InFlight);
        }

        let current = self.state(&target);
        if current.liked {
            return Ok(current);
        }
        let post = LikeState {
            liked: true,
            count: current.count + 1,
        };
        self.settle(target, post, true).await
    }

    pub async fn unlike(&self, target: LikeTarget) -> Result<LikeState> {
        if self.actions.is_in_flight(&target) {
            return Err(RelationshipError::InFlight);
        }

        let current = self.state(&target);
        if !current.liked {
            return Ok(current);
        }
        let post = LikeState {
            liked: false,
            count: current.count.saturating_sub(1),
        };
        self.settle(target, post, false).await
    }

    async fn settle(&self, target: LikeTarget, post: LikeState, like: bool) -> Result<LikeState> {
        let mutation = async {
            if like {
                self.backend.like(&target).await
            } else {
                self.backend.unlike(&target).await
            }
        };
        let result = self
            .actions
            .run(&target, &self.states, Some(post), mutation)
            .await;
        self.cache.invalidate(&target);

        match result {
            Ok(()) => {
                info!(object = %target.id(), liked = post.liked, "Like updated");
                self.bus
                    .publish(BusEvent::with_detail(POST_UPDATE, target.id()));
                Ok(post)
            }
            Err(ActionFailure::InFlight) => Err(RelationshipError::InFlight),
            Err(ActionFailure::Failed(err)) => {
                warn!(object = %target.id(), error = %err, "Like update failed");
                let message = if like { "Could not like" } else { "Could not unlike" };
                self.bus.publish(BusEvent::notice(message));
                Err(err.into())
            }
        }
    }
}
