//! Shared data structures for the BLE backend.

use bluest::{Characteristic, Device};
use regex::Regex;

/// Live handles held only while connecting or connected. The characteristic
/// carries notifications inbound and keepalive writes outbound. Dropping
/// this releases the characteristic and device objects.
#[derive(Clone)]
pub struct ConnectedPeripheral {
    pub device: Device,
    pub notify_characteristic: Characteristic,
}

/// Pulls a MAC address out of a platform device-id string, if it embeds one.
pub fn extract_mac_address(device_id: &str) -> Option<String> {
    let re = Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").ok()?;
    re.find_iter(device_id)
        .last()
        .map(|m| m.as_str().to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_address_is_extracted_and_uppercased() {
        assert_eq!(
            extract_mac_address("dev/hci0/aa:bb:cc:dd:ee:ff"),
            Some("AA:BB:CC:DD:EE:FF".to_string())
        );
        assert_eq!(extract_mac_address("3A2B1C"), None);
    }
}
