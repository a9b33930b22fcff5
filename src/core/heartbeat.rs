//! Link liveness watchdog: a restartable deadline. Every received ping
//! re-arms it; if it is not re-armed before the deadline the link is declared
//! silent. Disarming on reset/disconnect guarantees no stale firing.

use tokio::time::{Duration, Instant};

pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_millis(3000);

pub struct HeartbeatWatchdog {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl HeartbeatWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// Resets the deadline to `now + timeout`, superseding any previous one.
    pub fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.timeout);
    }

    /// Cancels the pending deadline, if any. Idempotent.
    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// The currently pending deadline, for the owner's select loop. The owner
    /// must call [`HeartbeatWatchdog::fire`] once the deadline elapses so the
    /// watchdog fires exactly once per arm.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Acknowledges an expiry, clearing the deadline.
    pub fn fire(&mut self) {
        self.deadline = None;
    }
}

/// Sleeps until `deadline`, or forever when there is none. Pending branches
/// like the watchdog and the scan timeout share this helper in select loops.
pub async fn deadline_wait(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, timeout};

    const TIMEOUT: Duration = Duration::from_millis(3000);

    #[tokio::test(start_paused = true)]
    async fn fires_after_silence() {
        let mut watchdog = HeartbeatWatchdog::new(TIMEOUT);
        watchdog.arm();
        deadline_wait(watchdog.deadline()).await;
        watchdog.fire();
        assert!(!watchdog.is_armed());
        // Without a re-arm the watchdog stays quiet.
        let idle = timeout(Duration::from_secs(10), deadline_wait(watchdog.deadline())).await;
        assert!(idle.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_just_before_expiry_extends_deadline() {
        let mut watchdog = HeartbeatWatchdog::new(TIMEOUT);
        watchdog.arm();
        advance(TIMEOUT - Duration::from_millis(1)).await;
        watchdog.arm();

        // The original deadline passes without a firing.
        let early = timeout(Duration::from_millis(1), deadline_wait(watchdog.deadline())).await;
        assert!(early.is_err());

        // The extended deadline does fire.
        let fired = timeout(TIMEOUT, deadline_wait(watchdog.deadline())).await;
        assert!(fired.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_cancels_pending_deadline() {
        let mut watchdog = HeartbeatWatchdog::new(TIMEOUT);
        watchdog.arm();
        watchdog.disarm();
        let idle = timeout(Duration::from_secs(60), deadline_wait(watchdog.deadline())).await;
        assert!(idle.is_err());
    }
}
