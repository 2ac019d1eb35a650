//! Asynchronous subject-based message bus
//!
//! Subscribers register for an exact subject and receive every event published
//! on it through an unbounded tokio channel.

use super::error_handling::{AsyncRecvError, AsyncTryRecvError, MessageBusError, MessageBusResult};
use super::events::Event;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc as async_mpsc;
use tokio::time::{timeout, Duration as AsyncDuration};

/// Publish/subscribe fabric used to reach workers and the runtime layer
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Subscribe to every event published on `subject`
    async fn subscribe(&self, subject: &str) -> AsyncConsumer;

    /// Publish an event to all current subscribers of `subject`
    async fn publish(&self, subject: &str, event: Event) -> MessageBusResult<()>;
}

/// Async consumer for a single subject
pub struct AsyncConsumer {
    subject: String,
    receiver: async_mpsc::UnboundedReceiver<Event>,
}

impl AsyncConsumer {
    pub fn new(subject: &str, receiver: async_mpsc::UnboundedReceiver<Event>) -> Self {
        Self {
            subject: subject.to_string(),
            receiver,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Wait for the next event; `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Async receive with timeout
    pub async fn recv_timeout(&mut self, duration: AsyncDuration) -> Result<Event, AsyncRecvError> {
        match timeout(duration, self.receiver.recv()).await {
            Ok(Some(event)) => Ok(event),
            Ok(None) => Err(AsyncRecvError::Disconnected),
            Err(_) => Err(AsyncRecvError::Timeout),
        }
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Result<Event, AsyncTryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(event),
            Err(async_mpsc::error::TryRecvError::Empty) => Err(AsyncTryRecvError::Empty),
            Err(async_mpsc::error::TryRecvError::Disconnected) => {
                Err(AsyncTryRecvError::Disconnected)
            }
        }
    }
}

/// Async subscriber registry keyed by subject
struct AsyncSubscriberRegistry {
    subscribers: HashMap<String, Vec<async_mpsc::UnboundedSender<Event>>>,
}

impl AsyncSubscriberRegistry {
    fn new() -> Self {
        Self {
            subscribers: HashMap::new(),
        }
    }

    fn add_subscriber(&mut self, subject: String, sender: async_mpsc::UnboundedSender<Event>) {
        self.subscribers.entry(subject).or_default().push(sender);
    }

    /// Drop senders whose consumer went away and return the live ones
    fn live_subscribers(&mut self, subject: &str) -> Vec<async_mpsc::UnboundedSender<Event>> {
        match self.subscribers.get_mut(subject) {
            Some(senders) => {
                senders.retain(|sender| !sender.is_closed());
                if senders.is_empty() {
                    self.subscribers.remove(subject);
                    Vec::new()
                } else {
                    senders.clone()
                }
            }
            None => Vec::new(),
        }
    }
}

/// In-process message bus
#[derive(Clone)]
pub struct AsyncMessageBus {
    registry: Arc<tokio::sync::Mutex<AsyncSubscriberRegistry>>,
}

impl AsyncMessageBus {
    /// Create a new async message bus instance
    pub fn new() -> Self {
        Self {
            registry: Arc::new(tokio::sync::Mutex::new(AsyncSubscriberRegistry::new())),
        }
    }

    /// Get the number of live subscribers for a subject
    pub async fn subscriber_count(&self, subject: &str) -> usize {
        let mut registry = self.registry.lock().await;
        registry.live_subscribers(subject).len()
    }
}

impl Default for AsyncMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for AsyncMessageBus {
    async fn subscribe(&self, subject: &str) -> AsyncConsumer {
        let (sender, receiver) = async_mpsc::unbounded_channel();

        let mut registry = self.registry.lock().await;
        registry.add_subscriber(subject.to_string(), sender);

        AsyncConsumer::new(subject, receiver)
    }

    async fn publish(&self, subject: &str, event: Event) -> MessageBusResult<()> {
        let subscribers = {
            let mut registry = self.registry.lock().await;
            registry.live_subscribers(subject)
        };

        crate::log_bus_debug!(
            "Publishing {} on {} to {} subscriber(s)",
            event.event_type(),
            subject,
            subscribers.len()
        );

        if subscribers.is_empty() {
            return Ok(());
        }

        let total_subscribers = subscribers.len();
        let failed_sends = subscribers
            .iter()
            .filter(|subscriber| subscriber.send(event.clone()).is_err())
            .count();

        if failed_sends > 0 {
            return Err(MessageBusError::SendFailed {
                reason: format!(
                    "{} of {} async subscribers on {} failed to receive event",
                    failed_sends, total_subscribers, subject
                ),
            });
        }

        Ok(())
    }
}
