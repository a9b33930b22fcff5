//! The connection lifecycle state machine.
//!
//! One actor owns the link state and drives every transition. Backend
//! callbacks, user commands and timer firings all funnel through a single
//! mpsc queue, so transitions never run concurrently and every timer callback
//! is re-checked against the current state before acting.

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::core::ble::constants::KEEPALIVE_PAYLOAD;
use crate::core::codec;
use crate::core::demo::DemoGenerator;
use crate::core::events::{
    decorate_label, status_label, BusEvent, EventBus, LinkCommand, LinkEvent, LinkState,
};
use crate::core::heartbeat::{deadline_wait, HeartbeatWatchdog};
use crate::core::permissions::{all_granted, PermissionProvider};
use crate::core::telemetry::TelemetryAggregator;

/// Capacity of the inbound event queue.
const EVENT_QUEUE_CAPACITY: usize = 64;

/// Wire key that re-arms the heartbeat watchdog.
const PING_KEY: &str = "PING";

/// Failures surfaced by a link backend. All of them are recoverable; the
/// machine absorbs them into a status label and an eventual retry.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("no Bluetooth adapter available")]
    AdapterUnavailable,
    #[error("no discovered device to connect to")]
    NoDeviceDiscovered,
    #[error("service {0} not found on peripheral")]
    ServiceMissing(Uuid),
    #[error("characteristic {0} not found on peripheral")]
    CharacteristicMissing(Uuid),
    #[error(transparent)]
    Radio(#[from] bluest::Error),
}

/// Capability set a peripheral link must provide. Implemented by the bluest
/// backend and by the simulated one; the backend reports progress by sending
/// [`LinkEvent`]s through the channel it was constructed with.
#[async_trait]
pub trait LinkBackend: Send + 'static {
    /// Begins scanning for the target peripheral. Must be idempotent-safe:
    /// the machine guards against re-entrant scans before calling.
    async fn start_scan(&mut self) -> Result<(), LinkError>;

    /// Cancels an in-flight scan. No-op when none is running.
    async fn stop_scan(&mut self);

    /// Opens the connection to the most recently discovered device and runs
    /// service discovery plus notification subscription, reporting `LinkUp`,
    /// `ServicesDiscovered` and later `LinkDown` through the event channel.
    async fn connect(&mut self) -> Result<(), LinkError>;

    /// Writes a payload to the telemetry characteristic. No-op while no
    /// peripheral is connected.
    async fn write(&mut self, payload: &[u8]) -> Result<(), LinkError>;

    /// Tears down the connection and releases all radio handles. Idempotent.
    async fn disconnect(&mut self);
}

/// Timing knobs for the machine, filled from [`crate::config::LinkConfig`].
#[derive(Debug, Clone)]
pub struct MachineTiming {
    pub scan_timeout: Duration,
    pub retry_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub keepalive_interval: Duration,
    pub demo_fast_interval: Duration,
    pub demo_slow_interval: Duration,
}

impl Default for MachineTiming {
    fn default() -> Self {
        use crate::core::ble::constants::*;
        Self {
            scan_timeout: SCAN_TIMEOUT,
            retry_interval: RETRY_INTERVAL,
            heartbeat_timeout: crate::core::heartbeat::DEFAULT_HEARTBEAT_TIMEOUT,
            keepalive_interval: KEEPALIVE_INTERVAL,
            demo_fast_interval: DEMO_FAST_INTERVAL,
            demo_slow_interval: DEMO_SLOW_INTERVAL,
        }
    }
}

/// Creates the event channel shared by the machine and its backend.
pub fn link_channel() -> (mpsc::Sender<LinkEvent>, mpsc::Receiver<LinkEvent>) {
    mpsc::channel(EVENT_QUEUE_CAPACITY)
}

/// Clonable command handle. Commands travel through the same queue as radio
/// callbacks, so they are serialized with every other event.
#[derive(Clone)]
pub struct LinkHandle {
    tx: mpsc::Sender<LinkEvent>,
}

impl LinkHandle {
    pub fn new(tx: mpsc::Sender<LinkEvent>) -> Self {
        Self { tx }
    }

    pub async fn start_scan(&self) -> Result<()> {
        self.send(LinkCommand::StartScan).await
    }

    pub async fn connect(&self) -> Result<()> {
        self.send(LinkCommand::Connect).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.send(LinkCommand::Disconnect).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.send(LinkCommand::Reset).await
    }

    pub async fn run_demo(&self) -> Result<()> {
        self.send(LinkCommand::EnterDemo).await
    }

    async fn send(&self, command: LinkCommand) -> Result<()> {
        self.tx.send(LinkEvent::Command(command)).await?;
        Ok(())
    }
}

/// Identity of the peripheral found by the most recent scan. Present in
/// `DeviceFound`, `Connecting` and `Connected`.
#[derive(Debug, Clone)]
struct FoundDevice {
    name: String,
    address: String,
}

pub struct LinkStateMachine<B: LinkBackend> {
    backend: B,
    permissions: Box<dyn PermissionProvider>,
    timing: MachineTiming,
    bus: EventBus,
    rx: mpsc::Receiver<LinkEvent>,

    state: LinkState,
    device: Option<FoundDevice>,
    is_demo: bool,
    auto_search: bool,
    scan_deadline: Option<Instant>,
    heartbeat: HeartbeatWatchdog,
    aggregator: TelemetryAggregator,
    demo: DemoGenerator,
}

impl<B: LinkBackend> LinkStateMachine<B> {
    pub fn new(
        backend: B,
        permissions: Box<dyn PermissionProvider>,
        timing: MachineTiming,
        bus: EventBus,
        rx: mpsc::Receiver<LinkEvent>,
    ) -> Self {
        let heartbeat = HeartbeatWatchdog::new(timing.heartbeat_timeout);
        Self {
            backend,
            permissions,
            timing,
            bus,
            rx,
            state: LinkState::Unpaired,
            device: None,
            is_demo: false,
            auto_search: false,
            scan_deadline: None,
            heartbeat,
            aggregator: TelemetryAggregator::new(),
            demo: DemoGenerator::new(),
        }
    }

    /// Spawns the machine onto the runtime and returns its command handle.
    pub fn spawn(self, tx: mpsc::Sender<LinkEvent>) -> LinkHandle {
        let _ = tokio::spawn(self.run());
        LinkHandle::new(tx)
    }

    /// Single-consumer loop: exactly one transition at a time. Timer branches
    /// resolve to internal ticks which are handled like any other event.
    pub async fn run(mut self) {
        let mut retry = interval_at(
            Instant::now() + self.timing.retry_interval,
            self.timing.retry_interval,
        );
        retry.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut keepalive = interval_at(
            Instant::now() + self.timing.keepalive_interval,
            self.timing.keepalive_interval,
        );
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut demo_fast = interval_at(Instant::now(), self.timing.demo_fast_interval);
        demo_fast.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut demo_slow = interval_at(Instant::now(), self.timing.demo_slow_interval);
        demo_slow.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Link state machine started");
        loop {
            tokio::select! {
                maybe_event = self.rx.recv() => {
                    match maybe_event {
                        Some(event) => self.handle_event(event).await,
                        None => break,
                    }
                }
                _ = retry.tick() => self.on_retry_tick().await,
                _ = keepalive.tick(), if self.state == LinkState::Connected => {
                    self.on_keepalive_tick().await
                }
                () = deadline_wait(self.scan_deadline) => self.on_scan_timeout().await,
                () = deadline_wait(self.heartbeat.deadline()) => self.on_heartbeat_expired(),
                _ = demo_fast.tick(), if self.is_demo => self.on_demo_tick(),
                _ = demo_slow.tick(), if self.is_demo => self.on_demo_mode_tick(),
            }
        }
        info!("Link state machine stopped");
        self.backend.disconnect().await;
    }

    async fn handle_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Command(command) => self.handle_command(command).await,
            LinkEvent::ScanResult { name, address } => self.on_scan_result(name, address).await,
            LinkEvent::ScanFailed { reason } => self.on_scan_failed(&reason).await,
            LinkEvent::LinkUp => self.on_link_up(),
            LinkEvent::LinkDown => self.on_link_down().await,
            LinkEvent::ServicesDiscovered { ok } => self.on_services_discovered(ok).await,
            LinkEvent::Notification(payload) => self.on_notification(&payload),
        }
    }

    async fn handle_command(&mut self, command: LinkCommand) {
        debug!("Command {:?} in state {:?}", command, self.state);
        match command {
            LinkCommand::StartScan => {
                self.leave_demo();
                self.auto_search = true;
                self.start_scan().await;
            }
            LinkCommand::Connect => {
                self.leave_demo();
                self.auto_search = true;
                self.connect().await;
            }
            LinkCommand::Disconnect => {
                self.leave_demo();
                self.auto_search = false;
                self.teardown().await;
                self.enter_state(if self.device.is_some() {
                    LinkState::DeviceFound
                } else {
                    LinkState::Unpaired
                });
                self.publish_label("Disconnected");
            }
            LinkCommand::Reset => {
                self.leave_demo();
                self.reset().await;
            }
            LinkCommand::EnterDemo => {
                // Demo substitutes for the real link entirely: tear down any
                // live connection first, then switch the data source.
                self.reset().await;
                self.is_demo = true;
                self.publish_status();
            }
        }
    }

    /// Universal cancellation: safe from any state, idempotent, always ends
    /// in `Unpaired` with no radio handle and no pending timers.
    async fn reset(&mut self) {
        self.auto_search = false;
        self.teardown().await;
        self.device = None;
        self.enter_state(LinkState::Unpaired);
        self.publish_status();
    }

    /// Stops scanning and disconnects, cancelling both deadline timers.
    async fn teardown(&mut self) {
        self.scan_deadline = None;
        self.heartbeat.disarm();
        self.backend.stop_scan().await;
        self.backend.disconnect().await;
    }

    async fn start_scan(&mut self) {
        if self.state != LinkState::Unpaired {
            // Re-entrant StartScan must not start a second concurrent scan.
            debug!("Ignoring StartScan in state {:?}", self.state);
            self.publish_status();
            return;
        }
        let grants = self.permissions.request_permissions().await;
        if !all_granted(&grants) {
            warn!("Scan refused, permissions not granted: {:?}", grants);
            self.publish_label("Scanning Failed");
            return;
        }
        match self.backend.start_scan().await {
            Ok(()) => {
                self.device = None;
                self.scan_deadline = Some(Instant::now() + self.timing.scan_timeout);
                self.enter_state(LinkState::Scanning);
                self.publish_status();
            }
            Err(err) => {
                warn!("Failed to start scan: {}", err);
                self.publish_label("Scanning Failed");
            }
        }
    }

    async fn connect(&mut self) {
        if self.state != LinkState::DeviceFound {
            debug!("Ignoring Connect in state {:?}", self.state);
            self.publish_status();
            return;
        }
        if self.device.is_none() {
            // Precondition violation: logged no-op, not an error.
            warn!("Connect requested with no discovered device");
            self.publish_status();
            return;
        }
        match self.backend.connect().await {
            Ok(()) => {
                self.enter_state(LinkState::Connecting);
                self.publish_status();
            }
            Err(err) => {
                warn!("Failed to initiate connection: {}", err);
                self.publish_label("Connection Failed");
            }
        }
    }

    async fn on_scan_result(&mut self, name: String, address: String) {
        if self.state != LinkState::Scanning {
            debug!("Dropping stale scan result for {}", name);
            return;
        }
        info!("Target device found: {} ({})", name, address);
        self.scan_deadline = None;
        self.backend.stop_scan().await;
        self.device = Some(FoundDevice { name, address });
        self.enter_state(LinkState::DeviceFound);
        self.publish_status();
        // Scanning only happens on the way to a connection; connect as soon
        // as the target shows up.
        self.connect().await;
    }

    async fn on_scan_failed(&mut self, reason: &str) {
        if self.state != LinkState::Scanning {
            return;
        }
        warn!("Scan failed: {}", reason);
        self.scan_deadline = None;
        self.backend.stop_scan().await;
        self.enter_state(LinkState::Unpaired);
        self.publish_label("Scanning Failed");
    }

    async fn on_scan_timeout(&mut self) {
        // Deadline fired; re-check state before acting on a stale timer.
        self.scan_deadline = None;
        if self.state != LinkState::Scanning {
            return;
        }
        info!("Scan timed out with no target device");
        self.backend.stop_scan().await;
        self.enter_state(LinkState::Unpaired);
        // A timeout is a normal stop, not an error; the label stays distinct
        // from the "Scanning Failed" failure path.
        self.publish_label("Scan Stopped");
    }

    fn on_link_up(&mut self) {
        if self.state != LinkState::Connecting {
            debug!("Dropping LinkUp in state {:?}", self.state);
            return;
        }
        info!("Link up, awaiting service discovery");
        // No state change: Connected is only reached once the telemetry
        // service is discovered and subscribed.
        self.publish_status();
    }

    async fn on_services_discovered(&mut self, ok: bool) {
        if self.state != LinkState::Connecting {
            debug!("Dropping ServicesDiscovered in state {:?}", self.state);
            return;
        }
        if ok {
            info!("Telemetry service subscribed, link established");
            self.enter_state(LinkState::Connected);
            self.heartbeat.arm();
            self.publish_status();
        } else {
            warn!("Service discovery failed");
            self.backend.disconnect().await;
            self.enter_state(LinkState::DeviceFound);
            self.publish_label("Connection Failed");
        }
    }

    async fn on_link_down(&mut self) {
        match self.state {
            LinkState::Connecting => {
                warn!("Link dropped while connecting");
                self.backend.disconnect().await;
                self.enter_state(LinkState::DeviceFound);
                self.publish_label("Connection Failed");
            }
            LinkState::Connected => {
                info!("Peripheral disconnected");
                self.backend.disconnect().await;
                self.heartbeat.disarm();
                self.enter_state(LinkState::DeviceFound);
                self.publish_label("Disconnected");
            }
            _ => debug!("Dropping LinkDown in state {:?}", self.state),
        }
    }

    fn on_notification(&mut self, payload: &[u8]) {
        // Hardware telemetry only feeds the snapshot on a live, non-demo link.
        if self.state != LinkState::Connected || self.is_demo {
            return;
        }
        let Some(message) = codec::decode(payload) else {
            debug!("Dropping malformed payload: {:?}", payload);
            return;
        };
        if message.key == PING_KEY {
            self.heartbeat.arm();
            self.publish_link_alive(true);
        }
        self.apply_message(&message.key, &message.value);
    }

    fn on_heartbeat_expired(&mut self) {
        self.heartbeat.fire();
        if self.state != LinkState::Connected {
            return;
        }
        warn!("No ping within heartbeat window, link is silent");
        self.publish_link_alive(false);
    }

    /// Bounded-rate re-arm: while auto-search is on, re-issue the next step
    /// toward `Connected` from whichever stable state we are stuck in.
    async fn on_retry_tick(&mut self) {
        if !self.auto_search || self.is_demo {
            return;
        }
        match self.state {
            LinkState::Unpaired => {
                debug!("Auto-search: re-issuing scan");
                self.start_scan().await;
            }
            LinkState::DeviceFound => {
                debug!("Auto-search: re-issuing connect");
                self.connect().await;
            }
            _ => {}
        }
    }

    /// Tells the peripheral the host is still listening. The firmware uses
    /// the write the way the machine uses `PING`: silence means a dead link.
    async fn on_keepalive_tick(&mut self) {
        if let Err(err) = self.backend.write(KEEPALIVE_PAYLOAD).await {
            warn!("Keepalive write failed: {}", err);
        }
    }

    fn on_demo_tick(&mut self) {
        for message in self.demo.tick() {
            self.apply_message(&message.key, &message.value);
        }
    }

    fn on_demo_mode_tick(&mut self) {
        let message = self.demo.tick_mode();
        self.apply_message(&message.key, &message.value);
    }

    fn leave_demo(&mut self) {
        if self.is_demo {
            info!("Leaving demo mode");
            self.is_demo = false;
        }
    }

    fn enter_state(&mut self, next: LinkState) {
        if self.state != next {
            info!("Link state {:?} -> {:?}", self.state, next);
        }
        self.state = next;
    }

    fn apply_message(&mut self, key: &str, value: &str) {
        let snapshot = self.aggregator.apply_message(key, value);
        self.bus.publish(BusEvent::MessageReceived {
            key: key.to_string(),
            value: value.to_string(),
        });
        self.bus.publish(BusEvent::TelemetryUpdated(snapshot));
    }

    /// Publishes the label derived from `(state, is_demo)`.
    fn publish_status(&mut self) {
        let label = status_label(self.state, self.is_demo);
        self.publish_status_with_label(label);
    }

    /// Publishes a failure-path label ("Connection Failed", ...) that stays
    /// distinguishable from the plain state labels.
    fn publish_label(&mut self, label: &str) {
        let label = decorate_label(label, self.is_demo);
        self.publish_status_with_label(label);
    }

    fn publish_status_with_label(&mut self, label: String) {
        let snapshot = self.aggregator.apply_status(self.state, self.is_demo, &label);
        self.bus.publish(BusEvent::StatusChanged {
            state: self.state,
            is_demo: self.is_demo,
            label,
        });
        self.bus.publish(BusEvent::TelemetryUpdated(snapshot));
    }

    fn publish_link_alive(&mut self, alive: bool) {
        let snapshot = self.aggregator.apply_link_alive(alive);
        self.bus.publish(BusEvent::LinkAlive(alive));
        self.bus.publish(BusEvent::TelemetryUpdated(snapshot));
    }
}
