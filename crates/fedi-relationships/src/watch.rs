//! Live view of one relationship, re-resolved on `follow-update` and optionally on
//! a fixed interval.

use std::time::Duration;

use fedi_client::{FollowStatus, SocialBackend};
use fedi_identity::Author;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::debug;

use crate::events::FOLLOW_UPDATE;
use crate::follow::FollowStateMachine;

/// Handle to a background refresh task; dropping it stops the task
pub struct RelationshipWatch {
    rx: watch::Receiver<Option<FollowStatus>>,
    handle: Option<JoinHandle<()>>,
}

impl RelationshipWatch {
    /// Last resolved status, `None` until the first check lands (or forever for self)
    pub fn current(&self) -> Option<FollowStatus> {
        *self.rx.borrow()
    }

    /// Wait for the next resolution. `None` once no more updates can arrive.
    pub async fn changed(&mut self) -> Option<FollowStatus> {
        self.rx.changed().await.ok()?;
        *self.rx.borrow_and_update()
    }
}

impl Drop for RelationshipWatch {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl<B> FollowStateMachine<B>
where
    B: SocialBackend + ?Sized + 'static,
{
    /// Keep the relationship with `target` resolved until the handle is dropped
    pub fn watch(&self, target: Author, refresh_every: Option<Duration>) -> RelationshipWatch {
        let (tx, rx) = watch::channel(None);
        let key = match self.key_for(&target) {
            Ok(key) => key,
            Err(_) => return RelationshipWatch { rx, handle: None },
        };

        let mut updates = self.bus().subscribe(FOLLOW_UPDATE);
        let machine = self.clone();
        let handle = tokio::spawn(async move {
            match machine.status(&target).await {
                Ok(status) => {
                    tx.send_replace(Some(status));
                }
                Err(err) => debug!(author = %key.target, error = %err, "Initial status check failed"),
            }

            let mut ticker = refresh_every.map(|period| {
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                ticker
            });

            loop {
                tokio::select! {
                    event = updates.recv() => {
                        if event.is_none() {
                            break;
                        }
                        machine.cache().invalidate(&key);
                    }
                    _ = next_tick(&mut ticker) => {}
                }

                match machine.check_status(&target).await {
                    Ok(status) => {
                        tx.send_replace(Some(status));
                    }
                    Err(err) => debug!(author = %key.target, error = %err, "Status refresh failed"),
                }
            }
        });

        RelationshipWatch {
            rx,
            handle: Some(handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use fedi_client::FollowState;
    use fedi_identity::IdentityResolver;

    use crate::events::{BusEvent, EventBus};
    use crate::follow::FollowSettings;
    use crate::mock::MockBackend;

    const BEA: &str = "https://nodeB.example/api/authors/22222222-2222-2222-2222-222222222222";
    const CY: &str = "https://nodeC.example/api/authors/44444444-4444-4444-4444-444444444444";

    fn author(id: &str) -> Author {
        Author {
            id: id.to_string(),
            ..Default::default()
        }
    }

    fn machine(backend: Arc<MockBackend>) -> FollowStateMachine<MockBackend> {
        FollowStateMachine::new(
            backend,
            IdentityResolver::parse("http://localhost:8000/api/").unwrap(),
            author("11111111-1111-1111-1111-111111111111"),
            EventBus::new(),
            FollowSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_follow_update_refreshes_every_watch() {
        let backend = Arc::new(MockBackend::default());
        let follows = machine(backend.clone());

        let mut bea = follows.watch(author(BEA), None);
        let mut cy = follows.watch(author(CY), None);
        assert_eq!(bea.changed().await.unwrap().follow_status, FollowState::None);
        assert_eq!(cy.changed().await.unwrap().follow_status, FollowState::None);

        backend.set_status(BEA, FollowState::Accepted);
        backend.set_status(CY, FollowState::Rejected);
        follows.bus().publish(BusEvent::follow_update());

        assert_eq!(bea.changed().await.unwrap().follow_status, FollowState::Accepted);
        assert_eq!(cy.changed().await.unwrap().follow_status, FollowState::Rejected);
        assert!(bea.current().unwrap().is_following);
    }

    #[tokio::test]
    async fn test_self_watch_never_resolves() {
        let backend = Arc::new(MockBackend::default());
        let follows = machine(backend.clone());

        let mut me = follows.watch(author("11111111-1111-1111-1111-111111111111"), None);
        assert!(me.current().is_none());
        assert!(me.changed().await.is_none());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_refresh() {
        let backend = Arc::new(MockBackend::default());
        let follows = machine(backend.clone());

        let mut bea = follows.watch(author(BEA), Some(Duration::from_secs(60)));
        bea.changed().await.unwrap();
        assert_eq!(backend.count("status "), 1);

        backend.set_status(BEA, FollowState::Requesting);
        let status = bea.changed().await.unwrap();
        assert_eq!(status.follow_status, FollowState::Requesting);
        assert_eq!(backend.count("status "), 2);
    }

    #[tokio::test]
    async fn test_dropping_watch_stops_refresh() {
        let backend = Arc::new(MockBackend::default());
        let follows = machine(backend.clone());

        let mut bea = follows.watch(author(BEA), None);
        bea.changed().await.unwrap();
        drop(bea);
        tokio::task::yield_now().await;

        follows.bus().publish(BusEvent::follow_update());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(backend.count("status "), 1);
    }
}
