//! Follow relationships between the viewer and other authors.
//!
//! Local state is optimistic: actions apply their post-state before the backend
//! answers and roll back exactly on failure. Backend status checks overwrite local
//! state unless a newer check or an action has started since, and a follow request
//! schedules one delayed re-check because remote nodes confirm asynchronously.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use fedi_client::{FollowRequest, FollowState, FollowStatus, SocialBackend};
use fedi_identity::{Author, IdentityResolver};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::RelationshipCache;
use crate::error::{RelationshipError, Result};
use crate::events::{BusEvent, EventBus, FOLLOW_UPDATE};
use crate::optimistic::{ActionCoordinator, ActionFailure, OptimisticStore};

const DEFAULT_RECONCILE_DELAY: Duration = Duration::from_millis(3000);
const DEFAULT_CACHE_WINDOW: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct FollowSettings {
    /// How long after a follow request the status is re-read from the backend
    pub reconcile_delay: Duration,
    /// Age after which a cached status is re-checked before use
    pub cache_window: Duration,
}

impl Default for FollowSettings {
    fn default() -> Self {
        Self {
            reconcile_delay: DEFAULT_RECONCILE_DELAY,
            cache_window: DEFAULT_CACHE_WINDOW,
        }
    }
}

/// (viewer, target) pair, each the author's canonical id or, for a remote author,
/// its full URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RelationshipKey {
    pub actor: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowRelationship {
    pub key: RelationshipKey,
    pub state: FollowState,
    /// When the backend last confirmed `state`; `None` while only optimistic
    pub last_verified_at: Option<Instant>,
}

/// The follow control to show for a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FollowAction {
    Follow,
    Pending,
    Unfollow,
    FollowAgain,
}

impl FollowAction {
    pub fn for_state(state: FollowState) -> Self {
        match state {
            FollowState::None => FollowAction::Follow,
            FollowState::Requesting => FollowAction::Pending,
            FollowState::Accepted => FollowAction::Unfollow,
            FollowState::Rejected => FollowAction::FollowAgain,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FollowAction::Follow => "Follow",
            FollowAction::Pending => "Pending",
            FollowAction::Unfollow => "Unfollow",
            FollowAction::FollowAgain => "Follow again",
        }
    }
}

/// Edges a local action may take. Reconciliation is not a transition and may
/// overwrite any state.
pub fn is_legal_transition(from: FollowState, to: FollowState) -> bool {
    use FollowState::*;
    matches!(
        (from, to),
        (None, Requesting)
            | (Requesting, Accepted)
            | (Requesting, Rejected)
            | (Accepted, None)
            | (Rejected, Requesting)
            | (Rejected, None)
    )
}

/// Identity used for keys, counters and the follow endpoints: the full URL of a
/// remote author, the canonical id of a local one
fn author_key(resolver: &IdentityResolver, author: &Author) -> String {
    if resolver.is_remote(author) {
        resolver.full_url(author)
    } else {
        resolver.canonical_id(&author.id).to_string()
    }
}

#[derive(Debug, Default)]
struct Ledger {
    relationships: HashMap<RelationshipKey, FollowRelationship>,
    /// Follower counters by canonical author id
    follower_counts: HashMap<String, u64>,
    /// Incoming follow requests by request id
    requests: HashMap<String, FollowState>,
    /// Latest unreconciled check or action per key. Values come from one counter and
    /// are never reused, so an entry can be dropped once its check lands.
    generations: HashMap<RelationshipKey, u64>,
    last_generation: u64,
}

/// Relationship state plus the follower counter it drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FollowSnapshot {
    state: Option<FollowState>,
    follower_count: Option<u64>,
}

/// Request state plus the viewer's own follower counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RequestSnapshot {
    state: Option<FollowState>,
    viewer_followers: Option<u64>,
}

struct Inner<B: ?Sized> {
    backend: Arc<B>,
    resolver: IdentityResolver,
    viewer: Author,
    viewer_id: String,
    settings: FollowSettings,
    bus: EventBus,
    cache: Arc<RelationshipCache<RelationshipKey, FollowStatus>>,
    actions: ActionCoordinator<RelationshipKey>,
    request_actions: ActionCoordinator<String>,
    ledger: Mutex<Ledger>,
    rechecks: Mutex<HashMap<RelationshipKey, (u64, JoinHandle<()>)>>,
    recheck_tickets: AtomicU64,
}

impl<B: ?Sized> Drop for Inner<B> {
    fn drop(&mut self) {
        for (_, (_, handle)) in self.rechecks.get_mut().drain() {
            handle.abort();
        }
    }
}

impl<B: ?Sized> OptimisticStore<RelationshipKey> for Inner<B> {
    type Snapshot = FollowSnapshot;

    fn snapshot(&self, key: &RelationshipKey) -> FollowSnapshot {
        let ledger = self.ledger.lock();
        FollowSnapshot {
            state: ledger.relationships.get(key).map(|r| r.state),
            follower_count: ledger.follower_counts.get(&key.target).copied(),
        }
    }

    fn apply(&self, key: &RelationshipKey, snapshot: FollowSnapshot) {
        let mut ledger = self.ledger.lock();
        match snapshot.state {
            Some(state) => {
                ledger
                    .relationships
                    .entry(key.clone())
                    .or_insert_with(|| FollowRelationship {
                        key: key.clone(),
                        state,
                        last_verified_at: None,
                    })
                    .state = state;
            }
            None => {
                ledger.relationships.remove(key);
            }
        }
        match snapshot.follower_count {
            Some(count) => {
                ledger.follower_counts.insert(key.target.clone(), count);
            }
            None => {
                ledger.follower_counts.remove(&key.target);
            }
        }
    }
}

impl<B: ?Sized> OptimisticStore<String> for Inner<B> {
    type Snapshot = RequestSnapshot;

    fn snapshot(&self, request_id: &String) -> RequestSnapshot {
        let ledger = self.ledger.lock();
        RequestSnapshot {
            state: ledger.requests.get(request_id).copied(),
            viewer_followers: ledger.follower_counts.get(&self.viewer_id).copied(),
        }
    }

    fn apply(&self, request_id: &String, snapshot: RequestSnapshot) {
        let mut ledger = self.ledger.lock();
        match snapshot.state {
            Some(state) => {
                ledger.requests.insert(request_id.clone(), state);
            }
            None => {
                ledger.requests.remove(request_id);
            }
        }
        match snapshot.viewer_followers {
            Some(count) => {
                ledger.follower_counts.insert(self.viewer_id.clone(), count);
            }
            None => {
                ledger.follower_counts.remove(&self.viewer_id);
            }
        }
    }
}

impl<B: ?Sized> Inner<B> {
    fn next_generation(&self, key: &RelationshipKey) -> u64 {
        let mut ledger = self.ledger.lock();
        ledger.last_generation += 1;
        let generation = ledger.last_generation;
        ledger.generations.insert(key.clone(), generation);
        generation
    }

    fn cancel_recheck(&self, key: &RelationshipKey) {
        if let Some((_, handle)) = self.rechecks.lock().remove(key) {
            handle.abort();
        }
    }

    /// Drop a finished re-check unless a newer one has replaced it
    fn forget_recheck(&self, key: &RelationshipKey, ticket: u64) {
        let mut rechecks = self.rechecks.lock();
        if rechecks.get(key).is_some_and(|(current, _)| *current == ticket) {
            rechecks.remove(key);
        }
    }

    fn local_state(&self, key: &RelationshipKey) -> FollowState {
        self.ledger
            .lock()
            .relationships
            .get(key)
            .map(|r| r.state)
            .unwrap_or_default()
    }

    /// Overwrite local state with a backend answer unless the check was superseded.
    ///
    /// Returns the effective status and whether local state changed.
    fn reconcile(
        &self,
        key: &RelationshipKey,
        status: FollowStatus,
        generation: u64,
    ) -> (FollowStatus, bool) {
        let mut ledger = self.ledger.lock();
        let current = ledger.relationships.get(key).map(|r| r.state);

        let superseded = ledger.generations.get(key).copied() != Some(generation);
        if superseded || self.actions.is_in_flight(key) {
            debug!(author = %key.target, "Discarding superseded status check");
            return (FollowStatus::from_state(current.unwrap_or_default()), false);
        }

        ledger.generations.remove(key);
        let next = status.follow_status;
        if let (Some(previous), Some(count)) = (current, ledger.follower_counts.get_mut(&key.target))
        {
            if previous != FollowState::Accepted && next == FollowState::Accepted {
                *count += 1;
            } else if previous == FollowState::Accepted && next != FollowState::Accepted {
                *count = count.saturating_sub(1);
            }
        }

        ledger.relationships.insert(
            key.clone(),
            FollowRelationship {
                key: key.clone(),
                state: next,
                last_verified_at: Some(Instant::now()),
            },
        );
        drop(ledger);

        self.cache.put(key.clone(), status);
        (status, current != Some(next))
    }
}

/// Follow state between one viewer and any number of targets.
///
/// Cheap to clone; clones share state. Scheduled re-checks stop once every clone
/// has been dropped.
pub struct FollowStateMachine<B: ?Sized> {
    inner: Arc<Inner<B>>,
}

impl<B: ?Sized> Clone for FollowStateMachine<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B> FollowStateMachine<B>
where
    B: SocialBackend + ?Sized + 'static,
{
    pub fn new(
        backend: Arc<B>,
        resolver: IdentityResolver,
        viewer: Author,
        bus: EventBus,
        settings: FollowSettings,
    ) -> Self {
        let viewer_id = author_key(&resolver, &viewer);
        Self {
            inner: Arc::new(Inner {
                backend,
                resolver,
                viewer,
                viewer_id,
                settings,
                bus,
                cache: Arc::new(RelationshipCache::new(settings.cache_window)),
                actions: ActionCoordinator::new(),
                request_actions: ActionCoordinator::new(),
                ledger: Mutex::new(Ledger::default()),
                rechecks: Mutex::new(HashMap::new()),
                recheck_tickets: AtomicU64::new(0),
            }),
        }
    }

    pub fn viewer(&self) -> &Author {
        &self.inner.viewer
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.inner.resolver
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn cache(&self) -> &Arc<RelationshipCache<RelationshipKey, FollowStatus>> {
        &self.inner.cache
    }

    pub fn settings(&self) -> FollowSettings {
        self.inner.settings
    }

    /// Whether `target` is the viewer, under either identifier shape
    pub fn is_self(&self, target: &Author) -> bool {
        let resolver = &self.inner.resolver;
        resolver.same_entity(&self.inner.viewer_id, &target.id)
            || resolver.full_url(&self.inner.viewer) == resolver.full_url(target)
    }

    /// Relationship key for `target`, refusing the viewer itself
    pub fn key_for(&self, target: &Author) -> Result<RelationshipKey> {
        if self.is_self(target) {
            return Err(RelationshipError::SelfAction);
        }
        Ok(RelationshipKey {
            actor: self.inner.viewer_id.clone(),
            target: author_key(&self.inner.resolver, target),
        })
    }

    /// Identifier the follow endpoints expect for `target`: the full URL of a remote
    /// author, the bare id of a local one
    fn wire_id(&self, target: &Author) -> String {
        author_key(&self.inner.resolver, target)
    }

    pub fn relationship(&self, target: &Author) -> Option<FollowRelationship> {
        let key = self.key_for(target).ok()?;
        self.inner.ledger.lock().relationships.get(&key).cloned()
    }

    /// The control to render for `target`; nothing for the viewer
    pub fn follow_action_for(&self, target: &Author) -> Option<FollowAction> {
        let key = self.key_for(target).ok()?;
        Some(FollowAction::for_state(self.inner.local_state(&key)))
    }

    /// Ask the backend for the relationship, addressing both parties by full URL
    pub async fn check_status(&self, target: &Author) -> Result<FollowStatus> {
        let key = self.key_for(target)?;
        let (status, _) = self.check_key(&key, target).await?;
        Ok(status)
    }

    async fn check_key(
        &self,
        key: &RelationshipKey,
        target: &Author,
    ) -> Result<(FollowStatus, bool)> {
        let generation = self.inner.next_generation(key);
        let follower_url = self.inner.resolver.full_url(&self.inner.viewer);
        let followed_url = self.inner.resolver.full_url(target);

        let status = self
            .inner
            .backend
            .follow_status(&follower_url, &followed_url)
            .await?;
        Ok(self.inner.reconcile(key, status, generation))
    }

    /// Current relationship: the optimistic state while an action is in flight, a
    /// cached status within the reconciliation window, otherwise a fresh check
    pub async fn status(&self, target: &Author) -> Result<FollowStatus> {
        let key = self.key_for(target)?;
        if self.inner.actions.is_in_flight(&key) {
            return Ok(FollowStatus::from_state(self.inner.local_state(&key)));
        }
        if let Some(status) = self.inner.cache.get_fresh(&key) {
            return Ok(status);
        }
        self.check_status(target).await
    }

    pub async fn request_follow(&self, target: &Author) -> Result<()> {
        let key = self.key_for(target)?;
        if self.inner.actions.is_in_flight(&key) {
            debug!(author = %key.target, "Follow already in flight");
            return Err(RelationshipError::InFlight);
        }

        let from = self.inner.local_state(&key);
        if !is_legal_transition(from, FollowState::Requesting) {
            return Err(RelationshipError::IllegalTransition {
                from,
                to: FollowState::Requesting,
            });
        }

        self.inner.cancel_recheck(&key);
        self.inner.next_generation(&key);

        let pre: FollowSnapshot = self.inner.snapshot(&key);
        let post = FollowSnapshot {
            state: Some(FollowState::Requesting),
            ..pre
        };
        let wire_id = self.wire_id(target);
        let result = self
            .inner
            .actions
            .run(&key, &*self.inner, post, self.inner.backend.follow(&wire_id))
            .await;

        match result {
            Ok(()) => {
                info!(author = %key.target, "Follow request sent");
                self.inner.cache.invalidate(&key);
                self.inner
                    .bus
                    .publish(BusEvent::with_detail(FOLLOW_UPDATE, key.target.as_str()));
                self.schedule_recheck(key, target.clone());
                Ok(())
            }
            Err(ActionFailure::InFlight) => Err(RelationshipError::InFlight),
            Err(ActionFailure::Failed(err)) => {
                warn!(author = %key.target, error = %err, "Follow request failed");
                self.inner.cache.invalidate(&key);
                self.inner
                    .bus
                    .publish(BusEvent::notice("Could not send follow request"));
                Err(err.into())
            }
        }
    }

    pub async fn unfollow(&self, target: &Author) -> Result<()> {
        let key = self.key_for(target)?;
        if self.inner.actions.is_in_flight(&key) {
            debug!(author = %key.target, "Unfollow already in flight");
            return Err(RelationshipError::InFlight);
        }

        let from = self.inner.local_state(&key);
        if from != FollowState::Accepted {
            return Err(RelationshipError::IllegalTransition {
                from,
                to: FollowState::None,
            });
        }

        self.inner.cancel_recheck(&key);
        self.inner.next_generation(&key);

        let pre: FollowSnapshot = self.inner.snapshot(&key);
        let post = FollowSnapshot {
            state: Some(FollowState::None),
            follower_count: pre.follower_count.map(|c| c.saturating_sub(1)),
        };
        let wire_id = self.wire_id(target);
        let result = self
            .inner
            .actions
            .run(&key, &*self.inner, post, self.inner.backend.unfollow(&wire_id))
            .await;

        match result {
            Ok(()) => {
                info!(author = %key.target, "Unfollowed");
                self.inner.cache.invalidate(&key);
                self.inner
                    .bus
                    .publish(BusEvent::with_detail(FOLLOW_UPDATE, key.target.as_str()));
                Ok(())
            }
            Err(ActionFailure::InFlight) => Err(RelationshipError::InFlight),
            Err(ActionFailure::Failed(err)) => {
                warn!(author = %key.target, error = %err, "Unfollow failed");
                self.inner.cache.invalidate(&key);
                self.inner.bus.publish(BusEvent::notice("Could not unfollow"));
                Err(err.into())
            }
        }
    }

    /// Re-read the relationship after the reconciliation delay, replacing any
    /// re-check already pending for the key
    fn schedule_recheck(&self, key: RelationshipKey, target: Author) {
        let machine: Weak<Inner<B>> = Arc::downgrade(&self.inner);
        let delay = self.inner.settings.reconcile_delay;
        let task_key = key.clone();
        let ticket = self.inner.recheck_tickets.fetch_add(1, Ordering::Relaxed);

        // Held across the spawn so the task cannot forget itself before it is recorded
        let mut rechecks = self.inner.rechecks.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = machine.upgrade() else {
                return;
            };
            let machine = FollowStateMachine { inner };
            match machine.check_key(&task_key, &target).await {
                Ok((status, changed)) => {
                    debug!(
                        author = %task_key.target,
                        state = status.follow_status.as_str(),
                        changed,
                        "Reconciled follow state"
                    );
                    if changed {
                        machine
                            .inner
                            .bus
                            .publish(BusEvent::with_detail(FOLLOW_UPDATE, task_key.target.as_str()));
                    }
                }
                Err(err) => warn!(author = %task_key.target, error = %err, "Follow re-check failed"),
            }
            machine.inner.forget_recheck(&task_key, ticket);
        });

        if let Some((_, previous)) = rechecks.insert(key, (ticket, handle)) {
            previous.abort();
        }
    }

    pub async fn accept_request(&self, request_id: &str) -> Result<()> {
        self.settle_request(request_id, FollowState::Accepted).await
    }

    pub async fn reject_request(&self, request_id: &str) -> Result<()> {
        self.settle_request(request_id, FollowState::Rejected).await
    }

    async fn settle_request(&self, request_id: &str, to: FollowState) -> Result<()> {
        let key = request_id.to_string();
        let current = self.inner.ledger.lock().requests.get(&key).copied();
        if matches!(
            current,
            Some(FollowState::Accepted) | Some(FollowState::Rejected)
        ) {
            debug!(request_id, state = ?current, "Follow request already settled");
            return Ok(());
        }
        if self.inner.request_actions.is_in_flight(&key) {
            return Err(RelationshipError::InFlight);
        }

        let pre: RequestSnapshot = self.inner.snapshot(&key);
        let post = RequestSnapshot {
            state: Some(to),
            viewer_followers: match to {
                FollowState::Accepted => pre.viewer_followers.map(|c| c + 1),
                _ => pre.viewer_followers,
            },
        };
        let backend = &self.inner.backend;
        let mutation = async {
            match to {
                FollowState::Accepted => backend.accept_follow_request(request_id).await,
                _ => backend.reject_follow_request(request_id).await,
            }
        };

        match self
            .inner
            .request_actions
            .run(&key, &*self.inner, post, mutation)
            .await
        {
            Ok(()) => {
                info!(request_id, state = to.as_str(), "Follow request settled");
                self.inner.bus.publish(BusEvent::follow_update());
                Ok(())
            }
            Err(ActionFailure::InFlight) => Err(RelationshipError::InFlight),
            Err(ActionFailure::Failed(err)) if err.is_conflict() => {
                debug!(request_id, "Follow request was already settled on the backend");
                // Settled, but not by us: keep the state and leave the counter alone
                self.inner.apply(
                    &key,
                    RequestSnapshot {
                        state: Some(to),
                        ..pre
                    },
                );
                self.inner.bus.publish(BusEvent::follow_update());
                Ok(())
            }
            Err(ActionFailure::Failed(err)) => {
                warn!(request_id, error = %err, "Settling follow request failed");
                self.inner
                    .bus
                    .publish(BusEvent::notice("Could not update follow request"));
                Err(err.into())
            }
        }
    }

    /// Incoming follow requests. Only pending ones unless `all_statuses`.
    pub async fn load_requests(&self, all_statuses: bool) -> Result<Vec<FollowRequest>> {
        let requests = self.inner.backend.follow_requests(all_statuses).await?;

        let mut ledger = self.inner.ledger.lock();
        for request in &requests {
            if self.inner.request_actions.is_in_flight(&request.id) {
                continue;
            }
            ledger.requests.insert(request.id.clone(), request.status);
        }
        debug!(count = requests.len(), "Loaded follow requests");
        Ok(requests)
    }

    /// Locally known state of an incoming request
    pub fn request_state(&self, request_id: &str) -> Option<FollowState> {
        self.inner.ledger.lock().requests.get(request_id).copied()
    }

    /// Followers of `author`; also seeds its follower counter
    pub async fn followers(&self, author: &Author) -> Result<Vec<Author>> {
        let followers = self.inner.backend.followers(&self.wire_id(author)).await?;
        self.set_follower_count(author, followers.len() as u64);
        Ok(followers)
    }

    pub async fn following(&self, author: &Author) -> Result<Vec<Author>> {
        Ok(self.inner.backend.following(&self.wire_id(author)).await?)
    }

    pub fn set_follower_count(&self, author: &Author, count: u64) {
        let id = author_key(&self.inner.resolver, author);
        self.inner.ledger.lock().follower_counts.insert(id, count);
    }

    pub fn follower_count(&self, author: &Author) -> Option<u64> {
        let id = author_key(&self.inner.resolver, author);
        self.inner.ledger.lock().follower_counts.get(&id).copied()
    }
}
