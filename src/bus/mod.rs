//! # Message Bus
//!
//! Subject-addressed pub/sub fabric used for the worker protocol: staging
//! requests are published to a worker's request subject, replies come back on a
//! per-attempt reply subject, heartbeats arrive on the advertisement subject and
//! runtime commands leave on the runtime subject.
//!
//! ```rust
//! use droplet_stager::bus::{AsyncMessageBus, Event, MessageBus};
//! use droplet_stager::runtime::RuntimeCommand;
//!
//! # async fn example() {
//! let bus = AsyncMessageBus::new();
//! let mut consumer = bus.subscribe("runtime").await;
//!
//! let event = Event::Runtime(RuntimeCommand::Stop { app_guid: "app-1".into() });
//! bus.publish("runtime", event).await.unwrap();
//!
//! let received = consumer.recv().await;
//! # }
//! ```

pub use async_bus::{AsyncConsumer, AsyncMessageBus, MessageBus};
pub use error_handling::{AsyncRecvError, AsyncTryRecvError, MessageBusError, MessageBusResult};
pub use events::Event;

mod async_bus;
mod error_handling;
mod events;
