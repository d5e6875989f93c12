// Shared per-wheel motor state
//
// One instance per wheel, allocated at controller construction and shared
// (Arc) between the commanding side, the coordinator and the worker loops.
// Every field is its own atomic so concurrent readers never observe a
// half-written composite; fields are updated independently, never as a
// whole-struct transaction.

use std::sync::atomic::{AtomicBool, AtomicI16, AtomicI64, AtomicU8, AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// Full-scale commanded PWM magnitude: ±1000 maps to ±100.0% duty.
pub const PWM_FULL_SCALE: i16 = 1000;

/// The wheel's actuation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ControlMode {
    Off = 0,
    PwmDirect = 1,
}

impl ControlMode {
    /// Decode a raw mode byte. Returns `None` for values outside the known
    /// set (e.g. a mode from a newer commanding side); callers treat that
    /// as "no active worker".
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ControlMode::Off),
            1 => Some(ControlMode::PwmDirect),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u8 {
        self as u8
    }
}

/// Which odometry fields the sampling worker should publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastFlags {
    pub angle: bool,
    pub speed: bool,
}

impl BroadcastFlags {
    pub fn any(self) -> bool {
        self.angle || self.speed
    }
}

/// Point-in-time copy of the sensed odometry fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdometrySnapshot {
    /// Cumulative encoder pulse count.
    pub angle: i64,
    /// Instantaneous pulse rate, pulses per second.
    pub rate: f32,
}

pub struct SharedMotorState {
    mode: AtomicU8,
    commanded_pwm: AtomicI16,
    angle_broadcast: AtomicBool,
    speed_broadcast: AtomicBool,
    odometry_angle: AtomicI64,
    odometry_rate: AtomicU32, // f32 bits
}

impl SharedMotorState {
    pub fn new() -> Self {
        Self {
            mode: AtomicU8::new(ControlMode::Off.as_raw()),
            commanded_pwm: AtomicI16::new(0),
            angle_broadcast: AtomicBool::new(false),
            speed_broadcast: AtomicBool::new(false),
            odometry_angle: AtomicI64::new(0),
            odometry_rate: AtomicU32::new(0f32.to_bits()),
        }
    }

    pub fn set_mode(&self, mode: ControlMode) {
        self.mode.store(mode.as_raw(), Ordering::Relaxed);
    }

    #[cfg(test)]
    pub(crate) fn set_raw_mode(&self, raw: u8) {
        self.mode.store(raw, Ordering::Relaxed);
    }

    pub fn raw_mode(&self) -> u8 {
        self.mode.load(Ordering::Relaxed)
    }

    pub fn control_mode(&self) -> Option<ControlMode> {
        ControlMode::from_raw(self.raw_mode())
    }

    /// Store the commanded duty, clamped to ±`PWM_FULL_SCALE`.
    pub fn set_commanded_pwm(&self, value: i16) {
        let clamped = value.clamp(-PWM_FULL_SCALE, PWM_FULL_SCALE);
        self.commanded_pwm.store(clamped, Ordering::Relaxed);
    }

    pub fn commanded_pwm(&self) -> i16 {
        self.commanded_pwm.load(Ordering::Relaxed)
    }

    /// Commanded duty as a normalized fraction in [-1.0, 1.0].
    pub fn commanded_fraction(&self) -> f32 {
        f32::from(self.commanded_pwm()) / f32::from(PWM_FULL_SCALE)
    }

    pub fn set_broadcast(&self, flags: BroadcastFlags) {
        self.angle_broadcast.store(flags.angle, Ordering::Relaxed);
        self.speed_broadcast.store(flags.speed, Ordering::Relaxed);
    }

    pub fn broadcast(&self) -> BroadcastFlags {
        BroadcastFlags {
            angle: self.angle_broadcast.load(Ordering::Relaxed),
            speed: self.speed_broadcast.load(Ordering::Relaxed),
        }
    }

    pub fn record_angle(&self, count: i64) {
        self.odometry_angle.store(count, Ordering::Relaxed);
    }

    pub fn record_rate(&self, rate: f32) {
        self.odometry_rate.store(rate.to_bits(), Ordering::Relaxed);
    }

    pub fn odometry(&self) -> OdometrySnapshot {
        OdometrySnapshot {
            angle: self.odometry_angle.load(Ordering::Relaxed),
            rate: f32::from_bits(self.odometry_rate.load(Ordering::Relaxed)),
        }
    }
}

impl Default for SharedMotorState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_round_trip() {
        let state = SharedMotorState::new();
        assert_eq!(state.control_mode(), Some(ControlMode::Off));

        state.set_mode(ControlMode::PwmDirect);
        assert_eq!(state.control_mode(), Some(ControlMode::PwmDirect));
        assert_eq!(state.raw_mode(), 1);
    }

    #[test]
    fn test_unknown_mode_decodes_to_none() {
        let state = SharedMotorState::new();
        state.set_raw_mode(0xAB);
        assert_eq!(state.control_mode(), None);
        assert_eq!(state.raw_mode(), 0xAB);
    }

    #[test]
    fn test_pwm_clamped_to_full_scale() {
        let state = SharedMotorState::new();

        state.set_commanded_pwm(500);
        assert_eq!(state.commanded_pwm(), 500);
        assert_eq!(state.commanded_fraction(), 0.5);

        state.set_commanded_pwm(3000);
        assert_eq!(state.commanded_pwm(), PWM_FULL_SCALE);

        state.set_commanded_pwm(-3000);
        assert_eq!(state.commanded_pwm(), -PWM_FULL_SCALE);
        assert_eq!(state.commanded_fraction(), -1.0);
    }

    #[test]
    fn test_broadcast_flags() {
        let state = SharedMotorState::new();
        assert!(!state.broadcast().any());

        state.set_broadcast(BroadcastFlags {
            angle: true,
            speed: false,
        });
        let flags = state.broadcast();
        assert!(flags.angle);
        assert!(!flags.speed);
        assert!(flags.any());
    }

    #[test]
    fn test_odometry_fields_independent() {
        let state = SharedMotorState::new();

        state.record_angle(-42);
        assert_eq!(state.odometry().angle, -42);
        assert_eq!(state.odometry().rate, 0.0);

        state.record_rate(12.5);
        let snapshot = state.odometry();
        assert_eq!(snapshot.angle, -42);
        assert_eq!(snapshot.rate, 12.5);
    }
}
