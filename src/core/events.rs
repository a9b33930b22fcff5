//! Typed events exchanged between the link backends, the state machine and
//! its consumers, plus the broadcast bus the machine publishes on.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::core::telemetry::TelemetrySnapshot;

/// Capacity of the outbound broadcast channel. Slow subscribers that fall
/// further behind than this lose the oldest events (telemetry is best-effort).
const BUS_CAPACITY: usize = 64;

/// Lifecycle state of the link to the peripheral. Exactly one is active at a
/// time; the radio handle exists only while `Connecting` or `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkState {
    Unpaired,
    Scanning,
    DeviceFound,
    Connecting,
    Connected,
}

impl LinkState {
    /// Human-readable label shown by dashboards for this state.
    pub fn label(&self) -> &'static str {
        match self {
            LinkState::Unpaired => "Unpaired",
            LinkState::Scanning => "Scanning",
            LinkState::DeviceFound => "Device Found",
            LinkState::Connecting => "Connecting",
            LinkState::Connected => "Device Connected",
        }
    }
}

/// Builds the status label for a `(state, demo)` pair. Demo-mode labels are
/// prefixed so a dashboard can never mistake synthetic data for a live link.
pub fn status_label(state: LinkState, is_demo: bool) -> String {
    decorate_label(state.label(), is_demo)
}

/// Applies the demo prefix to an arbitrary label (also used for the failure
/// labels, which are not derived from a state).
pub fn decorate_label(label: &str, is_demo: bool) -> String {
    if is_demo {
        format!("DEMO - {}", label)
    } else {
        label.to_string()
    }
}

/// User-issued commands, serialized through the same queue as radio events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCommand {
    StartScan,
    Connect,
    Disconnect,
    Reset,
    EnterDemo,
}

/// Inbound events consumed by the state machine. Backend callbacks arrive on
/// implementation-specific tasks and are marshalled through an mpsc channel so
/// transitions never run concurrently.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    Command(LinkCommand),
    ScanResult { name: String, address: String },
    ScanFailed { reason: String },
    LinkUp,
    LinkDown,
    ServicesDiscovered { ok: bool },
    Notification(Vec<u8>),
}

/// Outbound events published on the bus for UI and logging consumers.
#[derive(Debug, Clone)]
pub enum BusEvent {
    StatusChanged {
        state: LinkState,
        is_demo: bool,
        label: String,
    },
    MessageReceived {
        key: String,
        value: String,
    },
    TelemetryUpdated(Arc<TelemetrySnapshot>),
    LinkAlive(bool),
}

/// Broadcast bus carrying [`BusEvent`]s to any number of subscribers. Events
/// from the state machine are delivered in the order they were generated.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event. A send error only means there is currently no
    /// subscriber, which is fine for a broadcast.
    pub fn publish(&self, event: BusEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
