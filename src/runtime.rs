// Zenoh commanding bridge
//
// The external commanding actor for the wheel set: drains wheel commands
// from the command topic, applies them through the controller entry points
// (state write + signal raise), and publishes odometry and status back out.

use std::time::Duration;

use tokio::time::{Instant, interval};
use tracing::{info, warn};

use crate::config::{
    BRIDGE_HZ, RuntimeConfig, TOPIC_STATUS, TOPIC_WHEEL_CMD, TOPIC_WHEEL_ODOM, period_from_hz,
};
use crate::messages::{OdometryReport, WheelCommand, WheelStatus};
use crate::state::BroadcastFlags;
use crate::wheel::WheelController;

pub async fn run(
    config: &RuntimeConfig,
    wheels: &[WheelController],
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session
        .declare_subscriber(format!("{}/*", TOPIC_WHEEL_CMD))
        .await?;
    let pub_status = session.declare_publisher(TOPIC_STATUS).await?;

    let mut odom_pubs = Vec::with_capacity(wheels.len());
    for wheel in wheels {
        let publisher = session
            .declare_publisher(format!("{}/{}", TOPIC_WHEEL_ODOM, wheel.id()))
            .await?;
        odom_pubs.push(publisher);
    }

    let mut tick = interval(Duration::from_millis(1000 / BRIDGE_HZ));
    let mut last_odom = vec![Instant::now(); wheels.len()];

    info!(
        "Bridge started: {} wheel(s), {}Hz command loop",
        wheels.len(),
        BRIDGE_HZ
    );
    info!("Subscribed to: {}/*", TOPIC_WHEEL_CMD);
    info!("Publishing to: {}/<id>, {}", TOPIC_WHEEL_ODOM, TOPIC_STATUS);

    loop {
        tick.tick().await;

        // 1. Drain all pending commands (non-blocking)
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let key = sample.key_expr().to_string();
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<WheelCommand>(&payload) {
                Ok(cmd) => dispatch_command(&key, cmd, wheels),
                Err(e) => warn!("Failed to parse command on {}: {}", key, e),
            }
        }

        // 2. Publish odometry for broadcasting wheels, each at its own rate
        for (i, (wheel_config, wheel)) in config.wheels.iter().zip(wheels).enumerate() {
            let flags = wheel.broadcast();
            if !flags.any() {
                continue;
            }
            let period = period_from_hz(wheel_config.rates.odometry_hz);
            if last_odom[i].elapsed() < period {
                continue;
            }
            last_odom[i] = Instant::now();

            let snapshot = wheel.odometry();
            let report = OdometryReport {
                wheel: wheel.id(),
                angle: snapshot.angle,
                rate: snapshot.rate,
                pwm: wheel.commanded_pwm(),
            };
            odom_pubs[i].put(serde_json::to_string(&report)?).await?;
        }

        // 3. Publish per-wheel status
        let statuses: Vec<WheelStatus> = wheels
            .iter()
            .map(|wheel| {
                let flags = wheel.broadcast();
                WheelStatus {
                    wheel: wheel.id(),
                    mode: wheel.control_mode(),
                    angle_broadcast: flags.angle,
                    speed_broadcast: flags.speed,
                }
            })
            .collect();
        pub_status.put(serde_json::to_string(&statuses)?).await?;
    }
}

/// Route a command to the wheel named by the last key segment.
fn dispatch_command(key: &str, cmd: WheelCommand, wheels: &[WheelController]) {
    let id = key.rsplit('/').next().and_then(|s| s.parse::<u8>().ok());
    let Some(id) = id else {
        warn!("Command on unparseable key expr: {}", key);
        return;
    };
    let Some(wheel) = wheels.iter().find(|w| w.id() == id) else {
        warn!("Command for unknown wheel {}", id);
        return;
    };

    info!("Received command for wheel {}: {:?}", id, cmd);
    match cmd {
        WheelCommand::SetMode { mode } => wheel.set_control_mode(mode),
        WheelCommand::SetPwm { value } => wheel.set_commanded_pwm(value),
        WheelCommand::SetBroadcast { angle, speed } => {
            wheel.set_broadcast_flags(BroadcastFlags { angle, speed });
        }
    }
}
