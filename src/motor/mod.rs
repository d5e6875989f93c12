// Motor hardware abstractions
//
// Provides:
// - The actuator/sensor traits the wheel workers drive
// - Serial wheel-driver-board implementations
// - A simulated pair for running without hardware

pub mod bus;
pub mod sim;

use std::sync::Arc;

use parking_lot::Mutex;

pub use bus::{SerialEncoder, SerialMotor, WheelBus};
pub use sim::{SimEncoder, SimMotor, sim_pair};

/// Error types for motor and encoder I/O
#[derive(Debug, thiserror::Error)]
pub enum MotorError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from channel {channel}: {reason}")]
    InvalidResponse { channel: u8, reason: String },

    #[error("Checksum mismatch on channel {channel}")]
    ChecksumMismatch { channel: u8 },

    #[error("Driver board fault on channel {channel}: 0x{status:02X}")]
    BoardFault { channel: u8, status: u8 },

    #[error("Timeout waiting for driver board (channel {channel})")]
    Timeout { channel: u8 },
}

pub type Result<T> = std::result::Result<T, MotorError>;

/// Converts a normalized speed command into physical motor output.
///
/// One actuator is driven by at most one worker at a time; implementations
/// are not assumed reentrant.
pub trait MotorActuator: Send + 'static {
    /// Prepare the output stage. Called once at controller construction.
    fn init(&mut self) -> Result<()>;

    /// Apply a speed fraction in [-1.0, 1.0]. Fire-and-forget per cycle; a
    /// failed call is skipped, not retried.
    fn set_speed(&mut self, fraction: f32) -> Result<()>;
}

/// Owns the pulse-counting hardware for one wheel.
pub trait PositionSensor: Send + 'static {
    /// Begin (or restart) pulse accumulation.
    fn start_counting(&mut self) -> Result<()>;

    /// Cumulative signed pulse count since counting started.
    fn cumulative_count(&mut self) -> Result<i64>;

    /// Instantaneous pulse rate in pulses per second.
    fn instantaneous_rate(&mut self) -> Result<f32>;
}

// Worker tasks are created and destroyed across mode changes, so the
// hardware handles live outside any single task and are handed to the
// current worker through a mutex. Exactly one worker per role exists at a
// time, so the lock is uncontended in steady state.
pub type SharedActuator = Arc<Mutex<Box<dyn MotorActuator>>>;
pub type SharedSensor = Arc<Mutex<Box<dyn PositionSensor>>>;

pub fn share_actuator(actuator: Box<dyn MotorActuator>) -> SharedActuator {
    Arc::new(Mutex::new(actuator))
}

pub fn share_sensor(sensor: Box<dyn PositionSensor>) -> SharedSensor {
    Arc::new(Mutex::new(sensor))
}
