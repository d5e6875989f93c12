// Wheel pin assignments, update frequencies, topics
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// Zenoh topics
pub const TOPIC_WHEEL_CMD: &str = "wheels/cmd"; // + "/<wheel id>", commands in
pub const TOPIC_WHEEL_ODOM: &str = "wheels/rt/odom"; // + "/<wheel id>", odometry out
pub const TOPIC_STATUS: &str = "wheels/state/status"; // per-wheel mode/flags

// Bridge loop frequency (command drain + status publish)
pub const BRIDGE_HZ: u64 = 50;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("wheel {wheel}: {field} frequency must be positive")]
    ZeroFrequency { wheel: u8, field: &'static str },

    #[error("wheel {wheel}: pin {pin} assigned twice")]
    PinConflict { wheel: u8, pin: u8 },

    #[error("duplicate wheel id {0}")]
    DuplicateWheelId(u8),
}

/// GPIO assignment for one wheel's motor driver and encoder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MotorPins {
    pub dir: u8,
    pub pwm: u8,
    pub enc_a: u8,
    pub enc_b: u8,
}

/// Loop rates for one wheel, all in Hz.
///
/// The two PID rates are plumbed through for the closed-loop modes but no
/// control law consumes them yet; only the PWM and odometry periods are
/// derived from this struct.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpdateFrequencies {
    pub angle_pid_hz: u32,
    pub speed_pid_hz: u32,
    pub pwm_hz: u32,
    pub odometry_hz: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WheelConfig {
    pub id: u8,
    pub pins: MotorPins,
    pub rates: UpdateFrequencies,
}

impl WheelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("angle_pid", self.rates.angle_pid_hz),
            ("speed_pid", self.rates.speed_pid_hz),
            ("pwm", self.rates.pwm_hz),
            ("odometry", self.rates.odometry_hz),
        ];
        for (field, hz) in checks {
            if hz == 0 {
                return Err(ConfigError::ZeroFrequency {
                    wheel: self.id,
                    field,
                });
            }
        }

        let pins = [self.pins.dir, self.pins.pwm, self.pins.enc_a, self.pins.enc_b];
        for (i, &pin) in pins.iter().enumerate() {
            if pins[..i].contains(&pin) {
                return Err(ConfigError::PinConflict {
                    wheel: self.id,
                    pin,
                });
            }
        }
        Ok(())
    }
}

impl Default for WheelConfig {
    fn default() -> Self {
        Self {
            id: 0,
            pins: MotorPins {
                dir: 18,
                pwm: 19,
                enc_a: 20,
                enc_b: 21,
            },
            rates: UpdateFrequencies {
                angle_pid_hz: 50,
                speed_pid_hz: 50,
                pwm_hz: 100,
                odometry_hz: 10,
            },
        }
    }
}

/// Top-level runtime configuration: the wheel set plus the serial port of
/// the driver board (absent = run against the simulated pair).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub serial_port: Option<String>,
    pub wheels: Vec<WheelConfig>,
}

impl RuntimeConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = Vec::with_capacity(self.wheels.len());
        for wheel in &self.wheels {
            wheel.validate()?;
            if seen.contains(&wheel.id) {
                return Err(ConfigError::DuplicateWheelId(wheel.id));
            }
            seen.push(wheel.id);
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            serial_port: None,
            wheels: vec![WheelConfig::default()],
        }
    }
}

/// Convert a loop rate to its period, rounded to the nearest millisecond
/// with a 1 ms floor.
pub fn period_from_hz(hz: u32) -> Duration {
    let millis = ((1000 + hz / 2) / hz).max(1);
    Duration::from_millis(millis as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_rounding() {
        assert_eq!(period_from_hz(100), Duration::from_millis(10));
        assert_eq!(period_from_hz(1), Duration::from_millis(1000));
        assert_eq!(period_from_hz(3), Duration::from_millis(333));
        // Rates past 1 kHz floor at the millisecond resolution
        assert_eq!(period_from_hz(2000), Duration::from_millis(1));
        assert_eq!(period_from_hz(10_000), Duration::from_millis(1));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_frequency_rejected() {
        let mut config = WheelConfig::default();
        config.rates.pwm_hz = 0;
        match config.validate() {
            Err(ConfigError::ZeroFrequency { wheel: 0, field }) => assert_eq!(field, "pwm"),
            other => panic!("expected ZeroFrequency, got {:?}", other),
        }
    }

    #[test]
    fn test_conflicting_pins_rejected() {
        let mut config = WheelConfig::default();
        config.pins.enc_b = config.pins.pwm;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PinConflict { wheel: 0, pin }) if pin == config.pins.pwm
        ));
    }

    #[test]
    fn test_duplicate_wheel_id_rejected() {
        let config = RuntimeConfig {
            serial_port: None,
            wheels: vec![WheelConfig::default(), WheelConfig::default()],
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateWheelId(0))
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let config = RuntimeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.wheels.len(), 1);
        assert_eq!(parsed.wheels[0].rates.pwm_hz, 100);
        assert_eq!(parsed.wheels[0].pins.dir, 18);
    }
}
