// Per-wheel control-mode runtime
//
// Each wheel gets a coordinator task that listens for coalesced change
// signals and starts/stops the PWM passthrough and odometry sampling
// workers so exactly one instance of each role exists at a time. Commands
// arrive either over Zenoh (runtime bridge) or through the controller's
// entry points directly.

pub mod config;
pub mod messages;
pub mod motor;
pub mod runtime;
pub mod signal;
pub mod state;
pub mod wheel;

pub use state::{BroadcastFlags, ControlMode, OdometrySnapshot, PWM_FULL_SCALE};
pub use wheel::{WheelController, WheelError, WorkerReport};
