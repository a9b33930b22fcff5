//! Synthetic telemetry source used when no physical peripheral is around.
//! Deterministic cyclic counters drive the power level and gear mode; only
//! the per-motor balance and the pedal/steer readings are randomized.

use rand::Rng;

use crate::core::codec::WireMessage;
use crate::core::telemetry::GearMode;

/// Fixed gear cycle advanced by the slow tick. Runs up through the gears and
/// back down, so a dashboard exercises every selector position.
const MODE_CYCLE: [GearMode; 10] = [
    GearMode::T,
    GearMode::P,
    GearMode::R,
    GearMode::D,
    GearMode::S,
    GearMode::SPlus,
    GearMode::S,
    GearMode::D,
    GearMode::R,
    GearMode::P,
];

/// Number of discrete power steps (0/10 .. 10/10).
const POWER_STEPS: u32 = 11;

/// Generates the demo message stream. Owns its counters; the state machine
/// calls [`DemoGenerator::tick`] on the fast interval and
/// [`DemoGenerator::tick_mode`] on the slow one.
pub struct DemoGenerator {
    cumulated_power_counter: u32,
    mode_counter: usize,
}

impl DemoGenerator {
    pub fn new() -> Self {
        Self {
            cumulated_power_counter: 0,
            mode_counter: 0,
        }
    }

    /// Emits one batch of power/motor/pedal messages and advances the power
    /// counter modulo 11.
    pub fn tick(&mut self) -> Vec<WireMessage> {
        let mut rng = rand::thread_rng();
        let power = self.cumulated_power_counter as f32 / 10.0;
        self.cumulated_power_counter = (self.cumulated_power_counter + 1) % POWER_STEPS;

        let balance_left: f32 = rng.gen_range(-1.0..=1.0);
        let balance_right: f32 = rng.gen_range(-1.0..=1.0);
        vec![
            WireMessage::new("CUMULATED_POWER", power.to_string()),
            WireMessage::new("LEFT_MOTOR", (255.0 * power * balance_left).to_string()),
            WireMessage::new("RIGHT_MOTOR", (255.0 * power * balance_right).to_string()),
            WireMessage::new("ANALOG_BRAKE", rng.gen_range(0.0..500.0f32).to_string()),
            WireMessage::new("ANALOG_THROTTLE", rng.gen_range(0.0..500.0f32).to_string()),
            WireMessage::new("ANALOG_STEER", rng.gen_range(0.0..1024.0f32).to_string()),
        ]
    }

    /// Emits the current gear mode and advances the cycle.
    pub fn tick_mode(&mut self) -> WireMessage {
        let mode = MODE_CYCLE[self.mode_counter];
        self.mode_counter = (self.mode_counter + 1) % MODE_CYCLE.len();
        WireMessage::new("MODE", mode.alias())
    }
}

impl Default for DemoGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gear_cycle_order_and_wraparound() {
        let mut demo = DemoGenerator::new();
        let aliases: Vec<String> = (0..10).map(|_| demo.tick_mode().value).collect();
        assert_eq!(
            aliases,
            vec!["T", "P", "R", "D", "S", "S+", "S", "D", "R", "P"]
        );
        // Counter wrapped: the eleventh tick starts the cycle over.
        assert_eq!(demo.tick_mode().value, "T");
    }

    #[test]
    fn power_counter_cycles_through_eleven_steps() {
        let mut demo = DemoGenerator::new();
        let mut powers = Vec::new();
        for _ in 0..12 {
            let batch = demo.tick();
            let power = batch
                .iter()
                .find(|m| m.key == "CUMULATED_POWER")
                .and_then(|m| m.value.parse::<f32>().ok())
                .unwrap();
            powers.push(power);
        }
        for (i, power) in powers.iter().take(11).enumerate() {
            assert!((power - i as f32 / 10.0).abs() < 1e-6);
        }
        assert_eq!(powers[11], 0.0);
    }

    #[test]
    fn motor_values_stay_within_balance_envelope() {
        let mut demo = DemoGenerator::new();
        for _ in 0..22 {
            let batch = demo.tick();
            let lookup = |key: &str| -> f32 {
                batch
                    .iter()
                    .find(|m| m.key == key)
                    .and_then(|m| m.value.parse().ok())
                    .unwrap()
            };
            let power = lookup("CUMULATED_POWER");
            assert!(lookup("LEFT_MOTOR").abs() <= 255.0 * power + 1e-3);
            assert!(lookup("RIGHT_MOTOR").abs() <= 255.0 * power + 1e-3);
            assert!((0.0..500.0).contains(&lookup("ANALOG_BRAKE")));
            assert!((0.0..500.0).contains(&lookup("ANALOG_THROTTLE")));
            assert!((0.0..1024.0).contains(&lookup("ANALOG_STEER")));
        }
    }
}
