//! One viewer's relationship state, shared by everything rendering the session.
//!
//! Dropping the session stops the cache listeners and discards the caches.

use std::sync::Arc;

use fedi_client::SocialBackend;
use fedi_identity::{Author, IdentityResolver};
use tracing::info;

use crate::events::{EventBus, Listener, FOLLOW_UPDATE, POST_UPDATE};
use crate::follow::{FollowSettings, FollowStateMachine};
use crate::likes::LikeController;

pub struct Session<B: ?Sized> {
    bus: EventBus,
    follows: FollowStateMachine<B>,
    likes: LikeController<B>,
    _listeners: Vec<Listener>,
}

impl<B> Session<B>
where
    B: SocialBackend + ?Sized + 'static,
{
    /// Must be called from within a tokio runtime
    pub fn new(
        backend: Arc<B>,
        resolver: IdentityResolver,
        viewer: Author,
        settings: FollowSettings,
    ) -> Self {
        let bus = EventBus::new();
        let likes = LikeController::new(
            backend.clone(),
            resolver.clone(),
            &viewer,
            bus.clone(),
            settings.cache_window,
        );

        info!(
            viewer = %viewer.id,
            node = %resolver.api_base(),
            "Starting relationship session"
        );
        let follows = FollowStateMachine::new(backend, resolver, viewer, bus.clone(), settings);

        let listeners = vec![
            follows.cache().clear_on(&bus, FOLLOW_UPDATE),
            likes.cache().clear_on(&bus, POST_UPDATE),
        ];

        Self {
            bus,
            follows,
            likes,
            _listeners: listeners,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn follows(&self) -> &FollowStateMachine<B> {
        &self.follows
    }

    pub fn likes(&self) -> &LikeController<B> {
        &self.likes
    }

    pub fn viewer(&self) -> &Author {
        self.follows.viewer()
    }
}
