//! AMG HUD bridge library.
//! Connects to an ESP32 drive-telemetry peripheral over BLE, decodes its
//! `KEY=VALUE` notification protocol and aggregates it into immutable
//! snapshots for dashboard consumers. A simulated link and a demo telemetry
//! generator substitute for the hardware when none is present.

pub mod config;
pub mod core;
pub mod render;
pub mod state;
pub mod utils;

pub use config::LinkConfig;
pub use core::{
    link_channel, BusEvent, EventBus, LinkCommand, LinkHandle, LinkState, LinkStateMachine,
    MachineTiming, TelemetrySnapshot,
};
pub use state::{AppState, SnapshotStore};
