//! Optimistic relationship state for a federated social client
//!
//! A [`Session`] ties together the follow state machine, the like controller and
//! their caches around one [`EventBus`]. Actions apply immediately, reconcile with
//! the backend afterwards, and roll back exactly when the backend refuses.

mod cache;
pub mod error;
pub mod events;
mod follow;
mod likes;
mod optimistic;
mod session;
mod watch;

#[cfg(test)]
mod mock;

pub use cache::{CacheStats, RelationshipCache};
pub use error::{RelationshipError, Result};
pub use events::{BusEvent, EventBus, Listener, Subscription};
pub use follow::{
    is_legal_transition, FollowAction, FollowRelationship, FollowSettings, FollowStateMachine,
    RelationshipKey,
};
pub use likes::{LikeController, LikeState};
pub use optimistic::{ActionCoordinator, ActionFailure, InFlightGuard, OptimisticStore};
pub use session::Session;
pub use watch::RelationshipWatch;
