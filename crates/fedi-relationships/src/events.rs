//! Name-keyed broadcast channel shared by everything rendering the same session.
//!
//! Events carry no formal payload; `detail` is an optional hint such as the id of
//! the entity that changed. Subscriptions end when the subscriber drops them.

use std::future::Future;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const FOLLOW_UPDATE: &str = "follow-update";
pub const POST_CREATED: &str = "post-created";
pub const POST_UPDATE: &str = "post-update";
/// Transient user-facing message (failed action)
pub const NOTICE: &str = "notice";

const BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusEvent {
    pub name: String,
    pub detail: Option<String>,
}

impl BusEvent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            detail: None,
        }
    }

    pub fn with_detail(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            detail: Some(detail.into()),
        }
    }

    pub fn follow_update() -> Self {
        Self::new(FOLLOW_UPDATE)
    }

    pub fn notice(message: impl Into<String>) -> Self {
        Self::with_detail(NOTICE, message)
    }
}

/// Cheap-to-clone handle to one broadcast channel
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Broadcast an event, returning how many subscribers were listening
    pub fn publish(&self, event: BusEvent) -> usize {
        debug!(event = %event.name, detail = ?event.detail, "Publishing event");
        self.tx.send(event).unwrap_or(0)
    }

    /// Receive events named `name` until the returned subscription is dropped
    pub fn subscribe(&self, name: &str) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            name: name.to_string(),
        }
    }

    /// Run `handler` for every `name` event on a background task that stops when the
    /// returned listener is dropped
    pub fn listen<F, Fut>(&self, name: &str, mut handler: F) -> Listener
    where
        F: FnMut(BusEvent) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut subscription = self.subscribe(name);
        let handle = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                handler(event).await;
            }
        });
        Listener { handle }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Subscription {
    rx: broadcast::Receiver<BusEvent>,
    name: String,
}

impl Subscription {
    /// Next matching event, or `None` once every publisher is gone.
    ///
    /// If the subscriber fell behind and events were dropped, a bare event of the
    /// subscribed name is returned so the subscriber still refreshes.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.name == self.name => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(event = %self.name, skipped, "Subscriber lagged behind event bus");
                    return Some(BusEvent::new(&self.name));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Background event handler; aborted on drop
pub struct Listener {
    handle: JoinHandle<()>,
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
