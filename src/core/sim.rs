//! Simulated peripheral link. Fabricates the scan/connect lifecycle with
//! short delays so the state machine, its consumers and the tests can run
//! without any radio hardware. Telemetry in demo mode comes from the demo
//! generator inside the machine, not from this backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use crate::core::ble::constants::TARGET_DEVICE_NAME;
use crate::core::events::LinkEvent;
use crate::core::machine::{LinkBackend, LinkError};

const SIMULATED_LATENCY: Duration = Duration::from_millis(50);
const SIMULATED_ADDRESS: &str = "00:00:00:00:00:00";

/// Shared call counters, handed to tests before the backend moves into the
/// machine.
#[derive(Clone, Default)]
pub struct SimCounters {
    pub scans_started: Arc<AtomicUsize>,
    pub connects_started: Arc<AtomicUsize>,
    pub writes: Arc<AtomicUsize>,
}

impl SimCounters {
    pub fn scans(&self) -> usize {
        self.scans_started.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects_started.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

pub struct SimulatedLink {
    events: mpsc::Sender<LinkEvent>,
    pending: Option<JoinHandle<()>>,
    counters: SimCounters,
}

impl SimulatedLink {
    pub fn new(events: mpsc::Sender<LinkEvent>) -> Self {
        Self {
            events,
            pending: None,
            counters: SimCounters::default(),
        }
    }

    /// Counter handles used by tests to assert backend call counts.
    pub fn counters(&self) -> SimCounters {
        self.counters.clone()
    }

    fn cancel_pending(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl LinkBackend for SimulatedLink {
    async fn start_scan(&mut self) -> Result<(), LinkError> {
        self.cancel_pending();
        self.counters.scans_started.fetch_add(1, Ordering::SeqCst);
        let events = self.events.clone();
        self.pending = Some(tokio::spawn(async move {
            sleep(SIMULATED_LATENCY).await;
            let _ = events
                .send(LinkEvent::ScanResult {
                    name: TARGET_DEVICE_NAME.to_string(),
                    address: SIMULATED_ADDRESS.to_string(),
                })
                .await;
        }));
        info!("Simulated scan started");
        Ok(())
    }

    async fn stop_scan(&mut self) {
        self.cancel_pending();
    }

    async fn connect(&mut self) -> Result<(), LinkError> {
        self.cancel_pending();
        self.counters.connects_started.fetch_add(1, Ordering::SeqCst);
        let events = self.events.clone();
        self.pending = Some(tokio::spawn(async move {
            sleep(SIMULATED_LATENCY).await;
            let _ = events.send(LinkEvent::LinkUp).await;
            let _ = events.send(LinkEvent::ServicesDiscovered { ok: true }).await;
        }));
        info!("Simulated connection started");
        Ok(())
    }

    async fn write(&mut self, _payload: &[u8]) -> Result<(), LinkError> {
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.cancel_pending();
    }
}
