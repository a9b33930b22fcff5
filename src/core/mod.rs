//! Core of the bridge: the connection lifecycle state machine and everything
//! it coordinates (wire codec, telemetry aggregation, heartbeat watchdog,
//! demo generator) plus the link backends it is generic over.

pub mod ble;
pub mod codec;
pub mod demo;
pub mod events;
pub mod heartbeat;
pub mod machine;
pub mod permissions;
pub mod sim;
pub mod telemetry;

// Re-export the types most consumers need.
pub use events::{BusEvent, EventBus, LinkCommand, LinkState};
pub use machine::{link_channel, LinkHandle, LinkStateMachine, MachineTiming};
pub use telemetry::TelemetrySnapshot;
