//! The real peripheral link: bluest adapter plumbing assembled behind the
//! [`LinkBackend`] capability. The state machine never touches bluest types;
//! everything radio-specific stays in this module.

use std::sync::Arc;

use async_trait::async_trait;
use bluest::{Adapter, Device};
use log::{info, warn};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::core::ble::connection::LinkConnector;
use crate::core::ble::notification::NotificationForwarder;
use crate::core::ble::scanner::LinkScanner;
use crate::core::ble::types::ConnectedPeripheral;
use crate::core::events::LinkEvent;
use crate::core::machine::{LinkBackend, LinkError};

pub struct RealLink {
    events: mpsc::Sender<LinkEvent>,
    /// Device handle parked by the scanner, consumed by connect.
    found_device: Arc<Mutex<Option<Device>>>,
    /// Live handles, present only while connecting/connected.
    connected: Arc<Mutex<Option<ConnectedPeripheral>>>,
    scanner: LinkScanner,
    connector: LinkConnector,
    forwarder: Arc<Mutex<NotificationForwarder>>,
    connect_task: Option<JoinHandle<()>>,
}

impl RealLink {
    /// Waits for a usable Bluetooth adapter and assembles the backend.
    pub async fn new(events: mpsc::Sender<LinkEvent>, target_name: String) -> Result<Self, LinkError> {
        let adapter = Adapter::default()
            .await
            .ok_or(LinkError::AdapterUnavailable)?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available");

        let found_device = Arc::new(Mutex::new(None));
        let scanner = LinkScanner::new(
            adapter.clone(),
            target_name,
            found_device.clone(),
            events.clone(),
        );
        let connector = LinkConnector::new(adapter, events.clone());
        let forwarder = Arc::new(Mutex::new(NotificationForwarder::new(events.clone())));

        Ok(Self {
            events,
            found_device,
            connected: Arc::new(Mutex::new(None)),
            scanner,
            connector,
            forwarder,
            connect_task: None,
        })
    }
}

#[async_trait]
impl LinkBackend for RealLink {
    async fn start_scan(&mut self) -> Result<(), LinkError> {
        self.found_device.lock().await.take();
        self.scanner.start().await;
        Ok(())
    }

    async fn stop_scan(&mut self) {
        self.scanner.stop().await;
    }

    async fn connect(&mut self) -> Result<(), LinkError> {
        let device = self
            .found_device
            .lock()
            .await
            .clone()
            .ok_or(LinkError::NoDeviceDiscovered)?;

        // Establishment takes seconds; run it off the actor loop and report
        // progress through the event channel.
        let connector = self.connector.clone();
        let forwarder = self.forwarder.clone();
        let connected = self.connected.clone();
        let events = self.events.clone();
        self.connect_task = Some(tokio::spawn(async move {
            match connector.establish(&device).await {
                Ok(notify_char) => {
                    forwarder.lock().await.start(notify_char.clone()).await;
                    *connected.lock().await = Some(ConnectedPeripheral {
                        device,
                        notify_characteristic: notify_char,
                    });
                }
                Err(err) => {
                    warn!("Connection attempt failed: {}", err);
                    let _ = events.send(LinkEvent::LinkDown).await;
                }
            }
        }));
        Ok(())
    }

    async fn write(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        let peripheral = self.connected.lock().await.clone();
        if let Some(peripheral) = peripheral {
            peripheral.notify_characteristic.write(payload).await?;
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(task) = self.connect_task.take() {
            task.abort();
            let _ = task.await;
        }
        self.forwarder.lock().await.stop().await;

        let peripheral = self.connected.lock().await.take();
        if let Some(peripheral) = peripheral {
            self.connector.disconnect(&peripheral.device).await;
        } else if let Some(device) = self.found_device.lock().await.clone() {
            // An aborted establishment may have left the radio link half-open.
            self.connector.disconnect(&device).await;
        }
    }
}
