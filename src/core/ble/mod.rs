//! Bluetooth backend for the link state machine: scanning for the telemetry
//! peripheral, connecting, discovering the notify characteristic and
//! forwarding its payloads into the machine's event queue.

pub mod constants;
mod connection;
mod link;
mod notification;
mod scanner;
mod types;

pub use link::RealLink;
