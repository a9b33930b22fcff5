//! Peripheral profile constants and link timing.
//! The ESP32 exposes one service with one notify characteristic; these UUIDs
//! and the advertised name are the whole contract with the firmware.

use tokio::time::Duration;
use uuid::Uuid;

/// Advertised name of the target peripheral.
pub const TARGET_DEVICE_NAME: &str = "ESP32_BLE_AMG";

/// The telemetry service on the peripheral.
pub const UUID_TELEMETRY_SERVICE: Uuid = Uuid::from_u128(0x5fafc201_1fb5_459e_8fcc_c5c9c331914c);

/// The notify characteristic carrying the `KEY=VALUE` payloads.
pub const UUID_TELEMETRY_NOTIFY_CHAR: Uuid =
    Uuid::from_u128(0xceb5483e_36e1_4688_b7f5_ea07361b26af);

/// Standard client characteristic configuration descriptor, written by the
/// host stack when subscribing to notifications.
pub const UUID_CCC_DESCRIPTOR: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// Bounded scan duration; a scan still running after this is cancelled.
pub const SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Supervisory tick re-issuing scan/connect while auto-search is on.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Interval between outbound keepalive writes on a live connection.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(2);

/// Payload written to the peripheral on every keepalive tick.
pub const KEEPALIVE_PAYLOAD: &[u8] = b"HELLO";

/// Fast demo tick (power/pedal telemetry).
pub const DEMO_FAST_INTERVAL: Duration = Duration::from_millis(500);

/// Slow demo tick (gear-mode changes).
pub const DEMO_SLOW_INTERVAL: Duration = Duration::from_millis(5000);

/// Devices weaker than this are ignored during scanning.
pub const MIN_RSSI_THRESHOLD: i16 = -90;
