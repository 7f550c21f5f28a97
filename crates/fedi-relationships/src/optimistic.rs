//! Apply-then-reconcile for user actions.
//!
//! The post-state is written before the backend is called; if the call fails the
//! captured pre-state is written back exactly. A key with an action in flight
//! rejects further actions until it settles, so two optimistic states for the same
//! key never coexist.

use std::collections::HashSet;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

/// State that an action can snapshot and overwrite, including derived counters
pub trait OptimisticStore<K> {
    type Snapshot;

    fn snapshot(&self, key: &K) -> Self::Snapshot;

    fn apply(&self, key: &K, snapshot: Self::Snapshot);
}

#[derive(Debug)]
pub enum ActionFailure<E> {
    /// Another action on the key had not settled; nothing was applied or sent
    InFlight,
    /// The mutation failed and the pre-state was restored
    Failed(E),
}

#[derive(Debug)]
pub struct ActionCoordinator<K> {
    in_flight: Arc<Mutex<HashSet<K>>>,
}

impl<K> ActionCoordinator<K>
where
    K: Hash + Eq + Clone + Debug,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight.lock().contains(key)
    }

    /// Claim `key` until the guard is dropped, or `None` if it is already claimed
    pub fn try_begin(&self, key: &K) -> Option<InFlightGuard<K>> {
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard {
            key: key.clone(),
            in_flight: self.in_flight.clone(),
        })
    }

    /// Apply `post`, await `mutation`, and restore the pre-state if it fails.
    ///
    /// `mutation` is not polled unless the key was free, so a rejected action never
    /// reaches the network.
    pub async fn run<S, T, E, Fut>(
        &self,
        key: &K,
        store: &S,
        post: S::Snapshot,
        mutation: Fut,
    ) -> Result<T, ActionFailure<E>>
    where
        S: OptimisticStore<K> + ?Sized,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(_guard) = self.try_begin(key) else {
            debug!(key = ?key, "Action already in flight, ignoring");
            return Err(ActionFailure::InFlight);
        };

        let pre = store.snapshot(key);
        store.apply(key, post);

        match mutation.await {
            Ok(value) => Ok(value),
            Err(err) => {
                debug!(key = ?key, "Mutation failed, rolling back");
                store.apply(key, pre);
                Err(ActionFailure::Failed(err))
            }
        }
    }
}

impl<K> Default for ActionCoordinator<K>
where
    K: Hash + Eq + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Releases its key when dropped, including when the owning future is cancelled
pub struct InFlightGuard<K: Hash + Eq> {
    key: K,
    in_flight: Arc<Mutex<HashSet<K>>>,
}

impl<K: Hash + Eq> Drop for InFlightGuard<K> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Counters {
        values: Mutex<HashMap<&'static str, (bool, u64)>>,
    }

    impl OptimisticStore<&'static str> for Counters {
        type Snapshot = (bool, u64);

        fn snapshot(&self, key: &&'static str) -> (bool, u64) {
            self.values.lock().get(key).copied().unwrap_or_default()
        }

        fn apply(&self, key: &&'static str, snapshot: (bool, u64)) {
            self.values.lock().insert(*key, snapshot);
        }
    }

    #[tokio::test]
    async fn test_success_keeps_post_state() {
        let coordinator = ActionCoordinator::new();
        let store = Counters::default();
        store.apply(&"e1", (false, 4));

        let result: Result<(), ActionFailure<&str>> =
            coordinator.run(&"e1", &store, (true, 5), async { Ok(()) }).await;
        assert!(result.is_ok());
        assert_eq!(store.snapshot(&"e1"), (true, 5));
        assert!(!coordinator.is_in_flight(&"e1"));
    }

    #[tokio::test]
    async fn test_failure_restores_pre_state() {
        let coordinator = ActionCoordinator::new();
        let store = Counters::default();
        store.apply(&"e1", (false, 4));

        let result: Result<(), _> = coordinator
            .run(&"e1", &store, (true, 5), async { Err("boom") })
            .await;
        assert!(matches!(result, Err(ActionFailure::Failed("boom"))));
        assert_eq!(store.snapshot(&"e1"), (false, 4));
        assert!(!coordinator.is_in_flight(&"e1"));
    }

    #[tokio::test]
    async fn test_post_state_visible_while_in_flight() {
        let coordinator = ActionCoordinator::new();
        let store = Counters::default();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let action = coordinator.run(&"e1", &store, (true, 1), async move {
            rx.await.map_err(|_| "dropped")
        });
        let observe = async {
            tokio::task::yield_now().await;
            let seen = store.snapshot(&"e1");
            let second: Result<(), _> = coordinator
                .run(&"e1", &store, (false, 0), async { Ok::<(), &str>(()) })
                .await;
            tx.send(()).unwrap();
            (seen, second)
        };

        let (first, (seen, second)) = tokio::join!(action, observe);
        assert!(first.is_ok());
        assert_eq!(seen, (true, 1));
        assert!(matches!(second, Err(ActionFailure::InFlight)));
        assert_eq!(store.snapshot(&"e1"), (true, 1));
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let coordinator: ActionCoordinator<String> = ActionCoordinator::new();
        let key = "k".to_string();
        let guard = coordinator.try_begin(&key).unwrap();
        assert!(coordinator.try_begin(&key).is_none());
        drop(guard);
        assert!(coordinator.try_begin(&key).is_some());
    }
}
