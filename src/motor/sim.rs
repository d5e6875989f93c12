// Simulated motor/encoder pair
//
// Stands in for the driver board when no serial port is configured: the
// motor half records the commanded speed, the encoder half integrates it
// into a pulse count. Uses tokio's clock so paused-time tests integrate
// deterministically.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;
use tokio::time::Instant;

use super::{MotorActuator, PositionSensor, Result};

/// Pulse rate at full commanded speed, pulses per second.
pub const DEFAULT_MAX_PULSE_RATE: f64 = 1200.0;

struct Integrator {
    position: f64,
    last: Instant,
}

struct SimLink {
    speed_bits: AtomicU32, // commanded fraction, f32 bits
    counting: AtomicBool,
    max_pulse_rate: f64,
    integrator: Mutex<Integrator>,
}

impl SimLink {
    fn speed(&self) -> f64 {
        f64::from(f32::from_bits(self.speed_bits.load(Ordering::Relaxed)))
    }

    fn pulse_rate(&self) -> f64 {
        if self.counting.load(Ordering::Relaxed) {
            self.speed() * self.max_pulse_rate
        } else {
            0.0
        }
    }

    /// Fold elapsed time into the position, then return it.
    fn advance(&self) -> f64 {
        let mut integrator = self.integrator.lock();
        let now = Instant::now();
        let dt = now.duration_since(integrator.last).as_secs_f64();
        integrator.position += self.pulse_rate() * dt;
        integrator.last = now;
        integrator.position
    }
}

/// Create a linked simulated motor and encoder.
pub fn sim_pair(max_pulse_rate: f64) -> (SimMotor, SimEncoder) {
    let link = Arc::new(SimLink {
        speed_bits: AtomicU32::new(0f32.to_bits()),
        counting: AtomicBool::new(false),
        max_pulse_rate,
        integrator: Mutex::new(Integrator {
            position: 0.0,
            last: Instant::now(),
        }),
    });
    (
        SimMotor { link: link.clone() },
        SimEncoder { link },
    )
}

pub struct SimMotor {
    link: Arc<SimLink>,
}

impl MotorActuator for SimMotor {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn set_speed(&mut self, fraction: f32) -> Result<()> {
        // Integrate up to the change point so the old speed stops counting here
        self.link.advance();
        self.link
            .speed_bits
            .store(fraction.clamp(-1.0, 1.0).to_bits(), Ordering::Relaxed);
        Ok(())
    }
}

pub struct SimEncoder {
    link: Arc<SimLink>,
}

impl PositionSensor for SimEncoder {
    fn start_counting(&mut self) -> Result<()> {
        let mut integrator = self.link.integrator.lock();
        integrator.position = 0.0;
        integrator.last = Instant::now();
        drop(integrator);
        self.link.counting.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn cumulative_count(&mut self) -> Result<i64> {
        Ok(self.link.advance() as i64)
    }

    fn instantaneous_rate(&mut self) -> Result<f32> {
        Ok(self.link.pulse_rate() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_count_integrates_commanded_speed() {
        let (mut motor, mut encoder) = sim_pair(1000.0);
        motor.set_speed(0.5).unwrap();
        encoder.start_counting().unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;

        let count = encoder.cumulative_count().unwrap();
        assert!((990..=1010).contains(&count), "count was {}", count);
        assert_eq!(encoder.instantaneous_rate().unwrap(), 500.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_counting_before_start() {
        let (mut motor, mut encoder) = sim_pair(1000.0);
        motor.set_speed(1.0).unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(encoder.cumulative_count().unwrap(), 0);
        assert_eq!(encoder.instantaneous_rate().unwrap(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reverse_counts_down() {
        let (mut motor, mut encoder) = sim_pair(1000.0);
        encoder.start_counting().unwrap();
        motor.set_speed(-1.0).unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(encoder.cumulative_count().unwrap() < -900);
    }
}
