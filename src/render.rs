//! Render target seam. Gauges, needles and traction indicators live outside
//! this crate; anything that can draw a snapshot implements [`Renderer`].

use crate::core::telemetry::TelemetrySnapshot;

pub trait Renderer {
    fn render(&mut self, snapshot: &TelemetrySnapshot);
}

/// Renderer that writes a one-line summary to the log. The binary's default.
pub struct LogRenderer;

impl Renderer for LogRenderer {
    fn render(&mut self, snapshot: &TelemetrySnapshot) {
        log::info!(
            "[{}] gear {} power {:.2} motors {:+.1}/{:+.1} throttle {:.0} brake {:.0} steer {:.0} alive {}",
            snapshot.status_label,
            snapshot.gear_mode.alias(),
            snapshot.cumulative_power,
            snapshot.left_motor,
            snapshot.right_motor,
            snapshot.analog_throttle,
            snapshot.analog_brake,
            snapshot.analog_steer,
            snapshot.is_link_alive,
        );
    }
}
