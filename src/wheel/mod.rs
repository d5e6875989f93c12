// Wheel controller: one wheel's state, hardware handles and task lifecycle
//
// Owns the shared motor state, the actuator/sensor cells and the dispatcher
// task, and exposes the commanding entry points. All coordination between
// the commanding side and the worker loops goes state-write-then-signal;
// mutating the shared state without raising the matching bit is not a
// supported way to drive the coordinator.

mod coordinator;

use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::config::{ConfigError, WheelConfig};
use crate::motor::{
    MotorActuator, MotorError, PositionSensor, SharedActuator, SharedSensor, share_actuator,
    share_sensor,
};
use crate::signal::{Signal, SignalBits};
use crate::state::{BroadcastFlags, ControlMode, OdometrySnapshot, SharedMotorState};
use coordinator::{Coordinator, LoopPeriods, RoleHandle, StatsSet};

#[derive(Debug, thiserror::Error)]
pub enum WheelError {
    #[error("invalid wheel configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("motor initialization failed: {0}")]
    Motor(#[from] MotorError),
}

/// Point-in-time liveness report over the wheel's three concurrent roles.
#[derive(Debug, Clone, Copy)]
pub struct WorkerReport {
    pub dispatcher_alive: bool,
    pub pwm_alive: bool,
    pub odometry_alive: bool,
    pub dispatcher_starts: u32,
    pub pwm_starts: u32,
    pub odometry_starts: u32,
}

pub struct WheelController {
    id: u8,
    shared: Arc<SharedMotorState>,
    signal: Arc<Signal>,
    actuator: SharedActuator,
    sensor: SharedSensor,
    periods: LoopPeriods,
    dispatcher: RoleHandle,
    stats: StatsSet,
}

impl WheelController {
    /// Validate the configuration, initialize the actuator and allocate the
    /// shared state. Spawns nothing; `start` brings the dispatcher up.
    pub fn new(
        config: &WheelConfig,
        mut actuator: Box<dyn MotorActuator>,
        sensor: Box<dyn PositionSensor>,
    ) -> Result<Self, WheelError> {
        config.validate()?;
        actuator.init()?;

        let stats = StatsSet::new();
        Ok(Self {
            id: config.id,
            shared: Arc::new(SharedMotorState::new()),
            signal: Arc::new(Signal::new()),
            actuator: share_actuator(actuator),
            sensor: share_sensor(sensor),
            periods: LoopPeriods::from_rates(&config.rates),
            dispatcher: RoleHandle::new("dispatcher", stats.dispatcher.clone()),
            stats,
        })
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    /// Spawn the dispatcher loop. Idempotent: a duplicate start while the
    /// dispatcher is alive is ignored.
    pub fn start(&mut self) {
        if self.dispatcher.is_alive() {
            debug!(wheel = self.id, "dispatcher already running, ignoring duplicate start");
            return;
        }
        let coordinator = Coordinator::new(
            self.id,
            self.shared.clone(),
            self.signal.clone(),
            self.actuator.clone(),
            self.sensor.clone(),
            self.periods,
            self.stats.clone(),
        );
        self.dispatcher.spawn(coordinator.run());
        info!(wheel = self.id, "wheel controller started");
    }

    /// Tear the wheel down: the coordinator stops the actuation worker,
    /// then the sampling worker, then exits, and this call returns once the
    /// dispatcher task is fully gone. Idempotent.
    pub async fn stop(&mut self) {
        if self.dispatcher.is_empty() {
            debug!(wheel = self.id, "already stopped");
            return;
        }
        self.signal.raise(SignalBits::SHUTDOWN);
        self.dispatcher.join().await;
        info!(wheel = self.id, "wheel controller stopped");
    }

    /// Command a control mode change.
    pub fn set_control_mode(&self, mode: ControlMode) {
        self.shared.set_mode(mode);
        self.signal.raise(SignalBits::CONTROL_MODE_CHANGED);
        debug!(wheel = self.id, ?mode, "control mode commanded");
    }

    /// Command a change to the odometry broadcast flags.
    pub fn set_broadcast_flags(&self, flags: BroadcastFlags) {
        self.shared.set_broadcast(flags);
        self.signal.raise(SignalBits::BROADCAST_STATUS_CHANGED);
        debug!(
            wheel = self.id,
            angle = flags.angle,
            speed = flags.speed,
            "broadcast flags commanded"
        );
    }

    /// Set the commanded duty (±1000 full scale). The PWM worker samples
    /// this every cycle, so no signal is raised.
    pub fn set_commanded_pwm(&self, value: i16) {
        self.shared.set_commanded_pwm(value);
        trace!(wheel = self.id, value, "pwm commanded");
    }

    pub fn control_mode(&self) -> Option<ControlMode> {
        self.shared.control_mode()
    }

    pub fn commanded_pwm(&self) -> i16 {
        self.shared.commanded_pwm()
    }

    pub fn broadcast(&self) -> BroadcastFlags {
        self.shared.broadcast()
    }

    pub fn odometry(&self) -> OdometrySnapshot {
        self.shared.odometry()
    }

    pub fn workers(&self) -> WorkerReport {
        WorkerReport {
            dispatcher_alive: self.stats.dispatcher.is_alive(),
            pwm_alive: self.stats.pwm.is_alive(),
            odometry_alive: self.stats.odometry.is_alive(),
            dispatcher_starts: self.stats.dispatcher.starts(),
            pwm_starts: self.stats.pwm.starts(),
            odometry_starts: self.stats.odometry.starts(),
        }
    }
}

impl Drop for WheelController {
    fn drop(&mut self) {
        // Best-effort teardown for a controller dropped without stop():
        // the coordinator owns Arcs to everything it touches, so it runs
        // its ordered shutdown on its own time and nothing dangles.
        if !self.dispatcher.is_empty() {
            self.signal.raise(SignalBits::SHUTDOWN);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct NullMotor;

    impl MotorActuator for NullMotor {
        fn init(&mut self) -> crate::motor::Result<()> {
            Ok(())
        }

        fn set_speed(&mut self, _fraction: f32) -> crate::motor::Result<()> {
            Ok(())
        }
    }

    struct FailingMotor;

    impl MotorActuator for FailingMotor {
        fn init(&mut self) -> crate::motor::Result<()> {
            Err(MotorError::Timeout { channel: 0 })
        }

        fn set_speed(&mut self, _fraction: f32) -> crate::motor::Result<()> {
            Ok(())
        }
    }

    struct NullEncoder;

    impl PositionSensor for NullEncoder {
        fn start_counting(&mut self) -> crate::motor::Result<()> {
            Ok(())
        }

        fn cumulative_count(&mut self) -> crate::motor::Result<i64> {
            Ok(0)
        }

        fn instantaneous_rate(&mut self) -> crate::motor::Result<f32> {
            Ok(0.0)
        }
    }

    fn null_wheel(config: &WheelConfig) -> Result<WheelController, WheelError> {
        WheelController::new(config, Box::new(NullMotor), Box::new(NullEncoder))
    }

    #[test]
    fn test_construction_rejects_zero_frequency() {
        let mut config = WheelConfig::default();
        config.rates.odometry_hz = 0;
        assert!(matches!(null_wheel(&config), Err(WheelError::Config(_))));
    }

    #[test]
    fn test_construction_propagates_motor_init_failure() {
        let result = WheelController::new(
            &WheelConfig::default(),
            Box::new(FailingMotor),
            Box::new(NullEncoder),
        );
        assert!(matches!(result, Err(WheelError::Motor(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_constructed_wheel_is_inert() {
        let wheel = null_wheel(&WheelConfig::default()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let report = wheel.workers();
        assert!(!report.dispatcher_alive);
        assert!(!report.pwm_alive);
        assert!(!report.odometry_alive);
        assert_eq!(wheel.control_mode(), Some(ControlMode::Off));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_mode_is_tolerated() {
        let mut wheel = null_wheel(&WheelConfig::default()).unwrap();
        wheel.start();
        wheel.set_control_mode(ControlMode::PwmDirect);
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(wheel.workers().pwm_alive);

        // A mode byte outside the known set must not crash the dispatcher;
        // it degrades to "no active worker".
        wheel.shared.set_raw_mode(0x7F);
        wheel.signal.raise(SignalBits::CONTROL_MODE_CHANGED);
        tokio::time::sleep(Duration::from_millis(25)).await;

        let report = wheel.workers();
        assert!(report.dispatcher_alive);
        assert!(!report.pwm_alive);

        wheel.stop().await;
    }
}
