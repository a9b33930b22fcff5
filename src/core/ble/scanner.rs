//! Cancellable scan task over the bluest advertisement stream.
//! Reports the target peripheral (or a failure) to the state machine through
//! the shared event channel and parks the `Device` handle for the connector.

use std::sync::Arc;

use anyhow::Result;
use bluest::{Adapter, Device};
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::ble::constants::MIN_RSSI_THRESHOLD;
use crate::core::ble::notification::send_or_cancelled;
use crate::core::ble::types::extract_mac_address;
use crate::core::events::LinkEvent;

pub struct LinkScanner {
    adapter: Adapter,
    target_name: String,
    found_device: Arc<Mutex<Option<Device>>>,
    events: mpsc::Sender<LinkEvent>,
    cancel_token: CancellationToken,
    scan_task: Option<JoinHandle<()>>,
}

impl LinkScanner {
    pub fn new(
        adapter: Adapter,
        target_name: String,
        found_device: Arc<Mutex<Option<Device>>>,
        events: mpsc::Sender<LinkEvent>,
    ) -> Self {
        Self {
            adapter,
            target_name,
            found_device,
            events,
            cancel_token: CancellationToken::new(),
            scan_task: None,
        }
    }

    /// Starts the background scan task, cancelling any previous one first.
    pub async fn start(&mut self) {
        if self.scan_task.is_some() {
            self.stop().await;
        }
        self.cancel_token = CancellationToken::new();

        let adapter = self.adapter.clone();
        let target_name = self.target_name.clone();
        let found_device = self.found_device.clone();
        let events = self.events.clone();
        let cancel_token = self.cancel_token.clone();

        self.scan_task = Some(tokio::spawn(async move {
            if let Err(err) =
                Self::scan_task(adapter, target_name, found_device, &events, &cancel_token).await
            {
                error!("Scan task failed: {}", err);
                let failed = LinkEvent::ScanFailed {
                    reason: err.to_string(),
                };
                send_or_cancelled(&events, &cancel_token, failed).await;
            }
        }));
        info!("Device scan task started");
    }

    async fn scan_task(
        adapter: Adapter,
        target_name: String,
        found_device: Arc<Mutex<Option<Device>>>,
        events: &mpsc::Sender<LinkEvent>,
        cancel_token: &CancellationToken,
    ) -> Result<()> {
        // A peripheral the OS still considers connected never advertises;
        // check for one before scanning.
        for device in adapter.connected_devices().await? {
            if Self::is_target(&device, &target_name) {
                Self::report_found(&found_device, events, cancel_token, device).await;
                return Ok(());
            }
        }

        info!("Scanning for {}", target_name);
        let mut scan_stream = adapter.scan(&[]).await?;
        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered) => {
                            let device = discovered.device;
                            debug!("Advertisement from {:?} (rssi {:?})", device, discovered.rssi);
                            let strong_enough = discovered
                                .rssi
                                .map(|rssi| rssi >= MIN_RSSI_THRESHOLD)
                                .unwrap_or(true);
                            if strong_enough && Self::is_target(&device, &target_name) {
                                Self::report_found(&found_device, events, cancel_token, device)
                                    .await;
                                break;
                            }
                        }
                        None => {
                            info!("Scan stream ended");
                            break;
                        }
                    }
                }
                _ = cancel_token.cancelled() => break,
            }
        }
        Ok(())
    }

    /// Cancels the scan task and waits for it to wind down.
    pub async fn stop(&mut self) {
        self.cancel_token.cancel();
        if let Some(task) = self.scan_task.take() {
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    error!("Scan task join error: {:?}", err);
                }
            }
            info!("Scan stopped");
        }
    }

    async fn report_found(
        found_device: &Arc<Mutex<Option<Device>>>,
        events: &mpsc::Sender<LinkEvent>,
        cancel_token: &CancellationToken,
        device: Device,
    ) {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let id = device.id().to_string();
        let address = extract_mac_address(&id).unwrap_or_else(|| "N/A".to_string());
        info!("Found target peripheral: {} ({}, id {})", name, address, id);

        *found_device.lock().await = Some(device);
        send_or_cancelled(events, cancel_token, LinkEvent::ScanResult { name, address }).await;
    }

    fn is_target(device: &Device, target_name: &str) -> bool {
        device
            .name()
            .map(|name| name == target_name)
            .unwrap_or(false)
    }
}
