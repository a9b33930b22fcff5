//! Telemetry model and aggregation.
//! Folds decoded wire messages and status changes into an immutable snapshot
//! that dashboards read. The raw key/value map is the authoritative source;
//! the typed numeric fields are projections recomputed from it.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use serde::Serialize;

use crate::core::events::LinkState;

/// Gear selector position reported by the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GearMode {
    T,
    P,
    R,
    D,
    S,
    SPlus,
}

impl GearMode {
    /// Single-letter wire alias (`S+` for [`GearMode::SPlus`]).
    pub fn alias(&self) -> &'static str {
        match self {
            GearMode::T => "T",
            GearMode::P => "P",
            GearMode::R => "R",
            GearMode::D => "D",
            GearMode::S => "S",
            GearMode::SPlus => "S+",
        }
    }

    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "T" => Some(GearMode::T),
            "P" => Some(GearMode::P),
            "R" => Some(GearMode::R),
            "D" => Some(GearMode::D),
            "S" => Some(GearMode::S),
            "S+" => Some(GearMode::SPlus),
            _ => None,
        }
    }
}

/// Aggregated telemetry state. Immutable: the aggregator replaces the whole
/// snapshot on every accepted event, so consumers never observe a
/// partially-updated one.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetrySnapshot {
    pub gear_mode: GearMode,
    /// Cumulative motor power in the 0..1 domain, before display scaling.
    pub cumulative_power: f32,
    /// Signed per-motor power, magnitude roughly 0..255.
    pub left_motor: f32,
    pub right_motor: f32,
    pub analog_throttle: f32,
    pub analog_brake: f32,
    pub analog_steer: f32,
    pub is_link_alive: bool,
    pub is_connected: bool,
    pub is_device_found: bool,
    pub is_demo: bool,
    pub status_label: String,
    /// Last-seen value per wire key, including keys with no typed projection.
    pub raw_messages: HashMap<String, String>,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            gear_mode: GearMode::P,
            cumulative_power: 0.0,
            left_motor: 0.0,
            right_motor: 0.0,
            analog_throttle: 0.0,
            analog_brake: 0.0,
            analog_steer: 0.0,
            is_link_alive: false,
            is_connected: false,
            is_device_found: false,
            is_demo: false,
            status_label: "Unpaired".to_string(),
            raw_messages: HashMap::new(),
        }
    }
}

/// Folds events into [`TelemetrySnapshot`]s. Owned by the state machine; the
/// snapshot is handed to consumers behind an `Arc`, never by mutable
/// reference.
pub struct TelemetryAggregator {
    current: Arc<TelemetrySnapshot>,
}

impl TelemetryAggregator {
    pub fn new() -> Self {
        Self {
            current: Arc::new(TelemetrySnapshot::default()),
        }
    }

    pub fn snapshot(&self) -> Arc<TelemetrySnapshot> {
        self.current.clone()
    }

    /// Applies a decoded wire message. The raw map always records the value;
    /// a typed field only updates when its key is known and the value parses.
    /// Parse failures keep the previous value (best-effort telemetry).
    pub fn apply_message(&mut self, key: &str, value: &str) -> Arc<TelemetrySnapshot> {
        let mut next = (*self.current).clone();
        next.raw_messages.insert(key.to_string(), value.to_string());
        match key {
            "CUMULATED_POWER" => Self::parse_into(value, &mut next.cumulative_power),
            "LEFT_MOTOR" => Self::parse_into(value, &mut next.left_motor),
            "RIGHT_MOTOR" => Self::parse_into(value, &mut next.right_motor),
            "ANALOG_BRAKE" => Self::parse_into(value, &mut next.analog_brake),
            "ANALOG_THROTTLE" => Self::parse_into(value, &mut next.analog_throttle),
            "ANALOG_STEER" => Self::parse_into(value, &mut next.analog_steer),
            "MODE" => {
                if let Some(mode) = GearMode::from_alias(value) {
                    next.gear_mode = mode;
                } else {
                    debug!("Unknown gear mode alias {:?}, keeping {:?}", value, next.gear_mode);
                }
            }
            _ => {}
        }
        self.replace(next)
    }

    /// Applies a link status change.
    pub fn apply_status(
        &mut self,
        state: LinkState,
        is_demo: bool,
        label: &str,
    ) -> Arc<TelemetrySnapshot> {
        let mut next = (*self.current).clone();
        next.is_connected = state == LinkState::Connected;
        next.is_device_found = matches!(
            state,
            LinkState::DeviceFound | LinkState::Connecting | LinkState::Connected
        );
        next.is_demo = is_demo;
        next.status_label = label.to_string();
        if !next.is_connected {
            next.is_link_alive = false;
        }
        self.replace(next)
    }

    /// Applies a heartbeat-derived liveness change.
    pub fn apply_link_alive(&mut self, alive: bool) -> Arc<TelemetrySnapshot> {
        let mut next = (*self.current).clone();
        next.is_link_alive = alive;
        self.replace(next)
    }

    fn parse_into(value: &str, field: &mut f32) {
        match value.parse::<f32>() {
            Ok(parsed) => *field = parsed,
            Err(_) => debug!("Unparseable numeric value {:?}, keeping {}", value, field),
        }
    }

    fn replace(&mut self, next: TelemetrySnapshot) -> Arc<TelemetrySnapshot> {
        self.current = Arc::new(next);
        self.current.clone()
    }
}

impl Default for TelemetryAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_updates_raw_map_and_typed_field() {
        let mut agg = TelemetryAggregator::new();
        let snapshot = agg.apply_message("CUMULATED_POWER", "0.5");
        assert_eq!(snapshot.cumulative_power, 0.5);
        assert_eq!(
            snapshot.raw_messages.get("CUMULATED_POWER").map(String::as_str),
            Some("0.5")
        );
    }

    #[test]
    fn parse_failure_keeps_previous_value() {
        let mut agg = TelemetryAggregator::new();
        agg.apply_message("LEFT_MOTOR", "120.0");
        let snapshot = agg.apply_message("LEFT_MOTOR", "bogus");
        assert_eq!(snapshot.left_motor, 120.0);
        // The raw map still records what was last seen on the wire.
        assert_eq!(
            snapshot.raw_messages.get("LEFT_MOTOR").map(String::as_str),
            Some("bogus")
        );
    }

    #[test]
    fn unknown_keys_are_stored_but_not_interpreted() {
        let mut agg = TelemetryAggregator::new();
        let before = agg.snapshot();
        let snapshot = agg.apply_message("BATTERY_TEMP", "42");
        assert_eq!(snapshot.raw_messages.get("BATTERY_TEMP").map(String::as_str), Some("42"));
        assert_eq!(snapshot.cumulative_power, before.cumulative_power);
        assert_eq!(snapshot.gear_mode, before.gear_mode);
    }

    #[test]
    fn gear_mode_round_trips_through_alias() {
        for mode in [
            GearMode::T,
            GearMode::P,
            GearMode::R,
            GearMode::D,
            GearMode::S,
            GearMode::SPlus,
        ] {
            assert_eq!(GearMode::from_alias(mode.alias()), Some(mode));
        }
        assert_eq!(GearMode::from_alias("X"), None);
    }

    #[test]
    fn status_change_sets_connectivity_flags() {
        let mut agg = TelemetryAggregator::new();
        let snapshot = agg.apply_status(LinkState::Connected, false, "Device Connected");
        assert!(snapshot.is_connected);
        assert!(snapshot.is_device_found);
        assert_eq!(snapshot.status_label, "Device Connected");

        let snapshot = agg.apply_status(LinkState::DeviceFound, false, "Disconnected");
        assert!(!snapshot.is_connected);
        assert!(snapshot.is_device_found);
        assert!(!snapshot.is_link_alive);
    }

    #[test]
    fn every_apply_produces_a_fresh_snapshot() {
        let mut agg = TelemetryAggregator::new();
        let first = agg.apply_message("PING", "1");
        let second = agg.apply_link_alive(true);
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!first.is_link_alive);
        assert!(second.is_link_alive);
    }
}
