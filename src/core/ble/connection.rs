//! Connection establishment against the peripheral: open the link, discover
//! the telemetry service and notify characteristic, hand the characteristic
//! to the notification forwarder. Progress is reported as link events so the
//! state machine observes `LinkUp` and `ServicesDiscovered` transitions.

use bluest::{Adapter, Characteristic, Device};
use log::{info, warn};
use tokio::sync::mpsc;

use crate::core::ble::constants::{UUID_TELEMETRY_NOTIFY_CHAR, UUID_TELEMETRY_SERVICE};
use crate::core::events::LinkEvent;
use crate::core::machine::LinkError;

#[derive(Clone)]
pub struct LinkConnector {
    adapter: Adapter,
    events: mpsc::Sender<LinkEvent>,
}

impl LinkConnector {
    pub fn new(adapter: Adapter, events: mpsc::Sender<LinkEvent>) -> Self {
        Self { adapter, events }
    }

    /// Connects and discovers the telemetry characteristic. Emits `LinkUp`
    /// once the radio link is open and `ServicesDiscovered` with the
    /// discovery outcome; on failure the caller owns the cleanup.
    pub async fn establish(&self, device: &Device) -> Result<Characteristic, LinkError> {
        if !device.is_connected().await {
            info!("Opening connection to {}", device.id());
            self.adapter.connect_device(device).await?;
        }
        let _ = self.events.send(LinkEvent::LinkUp).await;

        info!("Discovering services");
        match self.discover_notify_char(device).await {
            Ok(notify_char) => {
                let _ = self.events.send(LinkEvent::ServicesDiscovered { ok: true }).await;
                Ok(notify_char)
            }
            Err(err) => {
                warn!("Service discovery failed: {}", err);
                let _ = self
                    .events
                    .send(LinkEvent::ServicesDiscovered { ok: false })
                    .await;
                Err(err)
            }
        }
    }

    async fn discover_notify_char(&self, device: &Device) -> Result<Characteristic, LinkError> {
        let services = device.services().await?;
        let service = services
            .iter()
            .find(|s| s.uuid() == UUID_TELEMETRY_SERVICE)
            .ok_or_else(|| {
                for service in &services {
                    info!("Peripheral offers service {}", service.uuid());
                }
                LinkError::ServiceMissing(UUID_TELEMETRY_SERVICE)
            })?;

        let characteristics = service.characteristics().await?;
        let notify_char = characteristics
            .into_iter()
            .find(|c| c.uuid() == UUID_TELEMETRY_NOTIFY_CHAR)
            .ok_or(LinkError::CharacteristicMissing(UUID_TELEMETRY_NOTIFY_CHAR))?;
        info!("Found telemetry characteristic {}", notify_char.uuid());
        Ok(notify_char)
    }

    /// Closes the radio link. No-op when already disconnected.
    pub async fn disconnect(&self, device: &Device) {
        if device.is_connected().await {
            info!("Disconnecting from {}", device.id());
            if let Err(err) = self.adapter.disconnect_device(device).await {
                warn!("Disconnect failed: {}", err);
            }
        }
    }
}
