// Control-mode coordinator: the per-wheel dispatch loop
//
// The coordinator is the only actor that creates or destroys worker tasks.
// It blocks on the wheel's change signal and, per wake, recomputes which of
// the two worker roles should exist from the shared state and closes the
// gap. Delivery is coalescing, so the signal payload is never trusted as a
// record of what changed.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, trace, warn};

use crate::config::{UpdateFrequencies, period_from_hz};
use crate::motor::{SharedActuator, SharedSensor};
use crate::signal::{Signal, SignalBits};
use crate::state::{ControlMode, SharedMotorState};

/// Liveness and start counters for one worker role, readable from outside
/// the coordinator (the census the demo's monitor prints).
pub(crate) struct RoleStats {
    alive: AtomicBool,
    starts: AtomicU32,
}

impl RoleStats {
    pub(crate) fn new() -> Self {
        Self {
            alive: AtomicBool::new(false),
            starts: AtomicU32::new(0),
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    pub(crate) fn starts(&self) -> u32 {
        self.starts.load(Ordering::Relaxed)
    }

    fn mark_started(&self) {
        self.alive.store(true, Ordering::Relaxed);
        self.starts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn mark_stopped(&self) {
        self.alive.store(false, Ordering::Relaxed);
    }
}

/// Stats for the wheel's three roles, shared between the controller (which
/// reads them into the census) and the tasks that maintain them.
#[derive(Clone)]
pub(crate) struct StatsSet {
    pub dispatcher: Arc<RoleStats>,
    pub pwm: Arc<RoleStats>,
    pub odometry: Arc<RoleStats>,
}

impl StatsSet {
    pub(crate) fn new() -> Self {
        Self {
            dispatcher: Arc::new(RoleStats::new()),
            pwm: Arc::new(RoleStats::new()),
            odometry: Arc::new(RoleStats::new()),
        }
    }
}

/// Owned handle to one worker role's task.
///
/// At most one live task per handle; the handle is emptied in the same
/// operation that confirms the task is torn down, so it can never dangle
/// after termination.
pub(crate) struct RoleHandle {
    role: &'static str,
    task: Option<JoinHandle<()>>,
    stats: Arc<RoleStats>,
}

impl RoleHandle {
    pub(crate) fn new(role: &'static str, stats: Arc<RoleStats>) -> Self {
        Self {
            role,
            task: None,
            stats,
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        matches!(&self.task, Some(task) if !task.is_finished())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.task.is_none()
    }

    /// Spawn a fresh instance of the role. The previous instance must have
    /// been stopped first.
    pub(crate) fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug_assert!(!self.is_alive(), "duplicate {} worker", self.role);
        self.task = Some(tokio::spawn(future));
        self.stats.mark_started();
    }

    /// Abort the task and wait until it is fully torn down. Idempotent.
    pub(crate) async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!(role = self.role, "worker panicked: {}", e);
                }
            }
            self.stats.mark_stopped();
            debug!(role = self.role, "worker torn down");
        }
    }

    /// Wait for the task to exit on its own (used for the dispatcher, which
    /// runs its own ordered teardown before returning).
    pub(crate) async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!(role = self.role, "worker panicked: {}", e);
                }
            }
            self.stats.mark_stopped();
        }
    }
}

/// Derived loop periods for the two worker roles.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoopPeriods {
    pub pwm: Duration,
    pub odometry: Duration,
}

impl LoopPeriods {
    pub(crate) fn from_rates(rates: &UpdateFrequencies) -> Self {
        Self {
            pwm: period_from_hz(rates.pwm_hz),
            odometry: period_from_hz(rates.odometry_hz),
        }
    }
}

pub(crate) struct Coordinator {
    wheel: u8,
    shared: Arc<SharedMotorState>,
    signal: Arc<Signal>,
    actuator: SharedActuator,
    sensor: SharedSensor,
    periods: LoopPeriods,
    pwm_worker: RoleHandle,
    odometry_worker: RoleHandle,
    dispatcher_stats: Arc<RoleStats>,
}

impl Coordinator {
    pub(crate) fn new(
        wheel: u8,
        shared: Arc<SharedMotorState>,
        signal: Arc<Signal>,
        actuator: SharedActuator,
        sensor: SharedSensor,
        periods: LoopPeriods,
        stats: StatsSet,
    ) -> Self {
        Self {
            wheel,
            shared,
            signal,
            actuator,
            sensor,
            periods,
            pwm_worker: RoleHandle::new("pwm_direct", stats.pwm),
            odometry_worker: RoleHandle::new("odometry", stats.odometry),
            dispatcher_stats: stats.dispatcher,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(wheel = self.wheel, "control coordinator running");
        loop {
            let bits = self.signal.wait().await;

            if bits.contains(SignalBits::SHUTDOWN) {
                self.shutdown().await;
                return;
            }
            if bits.contains(SignalBits::CONTROL_MODE_CHANGED) {
                self.reconcile_pwm_worker().await;
            }
            // The odometry role depends on both the flags and the mode, so
            // either change bit forces its re-evaluation.
            if bits.contains(SignalBits::CONTROL_MODE_CHANGED)
                || bits.contains(SignalBits::BROADCAST_STATUS_CHANGED)
            {
                self.reconcile_odometry_worker().await;
            }
        }
    }

    async fn reconcile_pwm_worker(&mut self) {
        // Stop-then-start: a live worker is never carried across a mode
        // change, so a repeated signal restarts it with current settings.
        self.pwm_worker.stop().await;

        let raw = self.shared.raw_mode();
        match ControlMode::from_raw(raw) {
            Some(ControlMode::PwmDirect) => {
                debug!(wheel = self.wheel, "starting pwm direct worker");
                self.pwm_worker.spawn(pwm_direct_loop(
                    self.wheel,
                    self.shared.clone(),
                    self.actuator.clone(),
                    self.periods.pwm,
                ));
            }
            Some(ControlMode::Off) => {}
            None => {
                warn!(
                    wheel = self.wheel,
                    mode = raw,
                    "unrecognized control mode, leaving motor idle"
                );
            }
        }
    }

    async fn reconcile_odometry_worker(&mut self) {
        self.odometry_worker.stop().await;

        let flags = self.shared.broadcast();
        if self.shared.control_mode() != Some(ControlMode::PwmDirect) || !flags.any() {
            return;
        }

        if let Err(e) = self.sensor.lock().start_counting() {
            warn!(wheel = self.wheel, error = %e, "failed to start pulse counting");
        }
        debug!(wheel = self.wheel, "starting odometry worker");
        self.odometry_worker.spawn(odometry_loop(
            self.wheel,
            self.shared.clone(),
            self.sensor.clone(),
            self.periods.odometry,
        ));
    }

    async fn shutdown(&mut self) {
        // Actuation stops first, sampling second, the dispatcher exits last;
        // the owning controller joins this task before releasing anything.
        self.pwm_worker.stop().await;
        self.odometry_worker.stop().await;
        self.dispatcher_stats.mark_stopped();
        info!(wheel = self.wheel, "control coordinator stopped");
    }
}

/// Open-loop PWM passthrough: push the commanded duty to the actuator at a
/// fixed period until stopped. Last write wins; reads are not synchronized
/// against the commanding side.
async fn pwm_direct_loop(
    wheel: u8,
    shared: Arc<SharedMotorState>,
    actuator: SharedActuator,
    period: Duration,
) {
    let mut tick = interval(period);
    loop {
        tick.tick().await;
        let fraction = shared.commanded_fraction();
        match actuator.lock().set_speed(fraction) {
            Ok(()) => trace!(wheel, fraction, "pushed pwm"),
            Err(e) => warn!(wheel, error = %e, "motor write failed, skipping cycle"),
        }
    }
}

/// Sample the position sensor into the shared record at a fixed period.
/// The flags are re-read every cycle and gate which fields get written,
/// not whether the loop keeps running; that is the coordinator's call.
async fn odometry_loop(
    wheel: u8,
    shared: Arc<SharedMotorState>,
    sensor: SharedSensor,
    period: Duration,
) {
    let mut tick = interval(period);
    loop {
        tick.tick().await;
        let flags = shared.broadcast();
        {
            let mut sensor = sensor.lock();
            if flags.angle {
                match sensor.cumulative_count() {
                    Ok(count) => shared.record_angle(count),
                    Err(e) => warn!(wheel, error = %e, "angle read failed, skipping cycle"),
                }
            }
            if flags.speed {
                match sensor.instantaneous_rate() {
                    Ok(rate) => shared.record_rate(rate),
                    Err(e) => warn!(wheel, error = %e, "rate read failed, skipping cycle"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_role_handle_stop_confirms_teardown() {
        let stats = Arc::new(RoleStats::new());
        let mut handle = RoleHandle::new("test", stats.clone());
        assert!(!handle.is_alive());

        handle.spawn(async {
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        });
        assert!(handle.is_alive());
        assert!(stats.is_alive());
        assert_eq!(stats.starts(), 1);

        handle.stop().await;
        assert!(!handle.is_alive());
        assert!(handle.is_empty());
        assert!(!stats.is_alive());

        // Stopping again is a no-op
        handle.stop().await;
        assert_eq!(stats.starts(), 1);
    }

    #[tokio::test]
    async fn test_role_handle_restart_counts_starts() {
        let stats = Arc::new(RoleStats::new());
        let mut handle = RoleHandle::new("test", stats.clone());

        for _ in 0..3 {
            handle.spawn(async {
                loop {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            });
            handle.stop().await;
        }
        assert_eq!(stats.starts(), 3);
        assert!(!stats.is_alive());
    }

    #[test]
    fn test_loop_periods_from_rates() {
        let rates = UpdateFrequencies {
            angle_pid_hz: 50,
            speed_pid_hz: 50,
            pwm_hz: 100,
            odometry_hz: 10,
        };
        let periods = LoopPeriods::from_rates(&rates);
        assert_eq!(periods.pwm, Duration::from_millis(10));
        assert_eq!(periods.odometry, Duration::from_millis(100));
    }
}
