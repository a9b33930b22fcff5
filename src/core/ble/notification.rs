//! Forwards the peripheral's notify stream into the state machine's event
//! queue. Subscription failure and stream end are both reported as
//! `LinkDown`; the forwarder never interprets payloads itself.

use bluest::Characteristic;
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::events::LinkEvent;

/// Sends an event unless the token is cancelled first. The machine is the
/// sole queue consumer and joins these tasks during teardown, so a plain
/// `send` on a full queue would deadlock against the join. Returns false
/// when the sender task should wind down.
pub(crate) async fn send_or_cancelled(
    events: &mpsc::Sender<LinkEvent>,
    cancel_token: &CancellationToken,
    event: LinkEvent,
) -> bool {
    tokio::select! {
        result = events.send(event) => result.is_ok(),
        _ = cancel_token.cancelled() => false,
    }
}

pub struct NotificationForwarder {
    events: mpsc::Sender<LinkEvent>,
    cancel_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl NotificationForwarder {
    pub fn new(events: mpsc::Sender<LinkEvent>) -> Self {
        Self {
            events,
            cancel_token: CancellationToken::new(),
            task: None,
        }
    }

    /// Starts the forwarding task, which subscribes to the characteristic
    /// and pumps payloads into the event queue.
    pub async fn start(&mut self, notify_char: Characteristic) {
        self.stop().await;
        self.cancel_token = CancellationToken::new();

        let events = self.events.clone();
        let cancel_token = self.cancel_token.clone();
        self.task = Some(tokio::spawn(async move {
            // The stream borrows the characteristic, so both live here.
            let mut stream = match notify_char.notify().await {
                Ok(stream) => stream,
                Err(err) => {
                    error!("Failed to subscribe to notifications: {}", err);
                    send_or_cancelled(&events, &cancel_token, LinkEvent::LinkDown).await;
                    return;
                }
            };
            info!("Listening for telemetry notifications");
            loop {
                tokio::select! {
                    result = stream.next() => {
                        match result {
                            Some(Ok(payload)) => {
                                debug!("Notification payload: {:?}", payload);
                                let event = LinkEvent::Notification(payload);
                                if !send_or_cancelled(&events, &cancel_token, event).await {
                                    break;
                                }
                            }
                            Some(Err(err)) => {
                                error!("Notification stream error: {}", err);
                                send_or_cancelled(&events, &cancel_token, LinkEvent::LinkDown)
                                    .await;
                                break;
                            }
                            None => {
                                info!("Notification stream ended");
                                send_or_cancelled(&events, &cancel_token, LinkEvent::LinkDown)
                                    .await;
                                break;
                            }
                        }
                    }
                    _ = cancel_token.cancelled() => break,
                }
            }
        }));
    }

    /// Cancels the forwarding task. Safe to call when none is running; a
    /// deliberate stop produces no `LinkDown`.
    pub async fn stop(&mut self) {
        self.cancel_token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}
