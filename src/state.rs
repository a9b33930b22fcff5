//! Process-wide application state: the link command handle, the event bus
//! and the last-known telemetry snapshot. A plain injected dependency created
//! at startup, written on every bus update, read whenever a consumer resumes.

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::config::LinkConfig;
use crate::core::events::{BusEvent, EventBus};
use crate::core::machine::LinkHandle;
use crate::core::telemetry::TelemetrySnapshot;

/// Holder for the last published snapshot. Shared by cloning; readers only
/// ever get an immutable snapshot handle.
#[derive(Clone)]
pub struct SnapshotStore {
    current: Arc<RwLock<Arc<TelemetrySnapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(TelemetrySnapshot::default()))),
        }
    }

    pub async fn latest(&self) -> Arc<TelemetrySnapshot> {
        self.current.read().await.clone()
    }

    async fn store(&self, snapshot: Arc<TelemetrySnapshot>) {
        *self.current.write().await = snapshot;
    }

    /// Mirrors `TelemetryUpdated` bus events into the store until the bus
    /// closes.
    pub fn follow(&self, bus: &EventBus) -> JoinHandle<()> {
        let store = self.clone();
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(BusEvent::TelemetryUpdated(snapshot)) => store.store(snapshot).await,
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a consumer needs to drive the bridge.
pub struct AppState {
    pub handle: LinkHandle,
    pub bus: EventBus,
    pub snapshots: SnapshotStore,
    pub config: LinkConfig,
}

impl AppState {
    pub fn new(handle: LinkHandle, bus: EventBus, config: LinkConfig) -> Self {
        let snapshots = SnapshotStore::new();
        let _ = snapshots.follow(&bus);
        Self {
            handle,
            bus,
            snapshots,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn store_follows_bus_updates() {
        let bus = EventBus::new();
        let store = SnapshotStore::new();
        let _ = store.follow(&bus);

        let mut updated = TelemetrySnapshot::default();
        updated.cumulative_power = 0.7;
        bus.publish(BusEvent::TelemetryUpdated(Arc::new(updated)));

        let seen = timeout(Duration::from_secs(1), async {
            loop {
                if store.latest().await.cumulative_power == 0.7 {
                    break;
                }
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(seen.is_ok());
    }
}
