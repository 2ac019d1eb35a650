//! Background tasks that keep the registry current

use super::advertisement::WorkerAdvertisement;
use super::worker_registry::WorkerRegistry;
use crate::bus::{Event, MessageBus};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Consume heartbeats from `subject` and refresh the registry with each one.
///
/// The subscription is established before this function returns, so no
/// heartbeat published afterwards is missed.
pub async fn spawn_heartbeat_listener(
    registry: Arc<WorkerRegistry>,
    bus: Arc<dyn MessageBus>,
    subject: &str,
) -> JoinHandle<()> {
    let mut consumer = bus.subscribe(subject).await;
    tokio::spawn(async move {
        while let Some(event) = consumer.recv().await {
            match event {
                Event::WorkerAdvertised(heartbeat) => {
                    let advertisement = WorkerAdvertisement::from_heartbeat(heartbeat, Utc::now());
                    if let Err(e) = registry.register_or_refresh(advertisement) {
                        crate::log_registry_warn!("Failed to record heartbeat: {}", e);
                    }
                }
                other => crate::log_registry_debug!(
                    "Ignoring {} on {}",
                    other.event_type(),
                    consumer.subject()
                ),
            }
        }
    })
}

/// Periodically evict advertisements that missed their TTL.
pub fn spawn_eviction_sweeper(registry: Arc<WorkerRegistry>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = registry.evict_expired(Utc::now()) {
                crate::log_registry_warn!("Eviction sweep failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::AsyncMessageBus;
    use crate::registry::WorkerHeartbeat;

    #[tokio::test]
    async fn heartbeats_on_the_bus_populate_the_registry() {
        let registry = Arc::new(WorkerRegistry::new(Duration::from_secs(10)));
        let bus = Arc::new(AsyncMessageBus::new());
        let handle =
            spawn_heartbeat_listener(registry.clone(), bus.clone(), "staging.advertise").await;

        bus.publish(
            "staging.advertise",
            Event::WorkerAdvertised(WorkerHeartbeat {
                worker_id: "w1".to_string(),
                stacks: vec!["lucid64".to_string()],
                available_memory_mb: 2048,
                available_disk_mb: 4096,
                available_file_descriptors: 4096,
            }),
        )
        .await
        .unwrap();

        for _ in 0..50 {
            if !registry.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(registry.get("w1").unwrap().unwrap().available_memory_mb, 2048);
        handle.abort();
    }
}
