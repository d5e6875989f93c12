use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wheel_runtime::config::RuntimeConfig;
use wheel_runtime::motor::sim::DEFAULT_MAX_PULSE_RATE;
use wheel_runtime::motor::{
    MotorActuator, PositionSensor, SerialEncoder, SerialMotor, WheelBus, sim_pair,
};
use wheel_runtime::runtime;
use wheel_runtime::state::{BroadcastFlags, ControlMode};
use wheel_runtime::wheel::WheelController;

/// Per-wheel control-mode runtime
#[derive(Parser)]
#[command(name = "wheel-runtime")]
struct Args {
    /// Path to a JSON runtime configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial port of the wheel driver board (overrides the config file;
    /// without one the simulated motor pair is used)
    #[arg(long)]
    port: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the Zenoh commanding bridge (default)
    Serve,
    /// Run the scripted single-wheel demonstration sequence
    Demo,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut config = match &args.config {
        Some(path) => RuntimeConfig::from_file(path)?,
        None => RuntimeConfig::default(),
    };
    if args.port.is_some() {
        config.serial_port = args.port;
    }

    let mut wheels = build_wheels(&config)?;
    for wheel in &mut wheels {
        wheel.start();
    }

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => runtime::run(&config, &wheels).await,
        Command::Demo => demo(&mut wheels).await,
    }
}

fn build_wheels(
    config: &RuntimeConfig,
) -> Result<Vec<WheelController>, Box<dyn std::error::Error + Send + Sync>> {
    let bus = match &config.serial_port {
        Some(port) => {
            info!("Opening wheel driver board on {}", port);
            Some(Arc::new(Mutex::new(WheelBus::open(port)?)))
        }
        None => {
            info!("No serial port configured, using simulated motors");
            None
        }
    };

    let mut wheels = Vec::with_capacity(config.wheels.len());
    for wheel_config in &config.wheels {
        let (actuator, sensor): (Box<dyn MotorActuator>, Box<dyn PositionSensor>) = match &bus {
            Some(bus) => (
                Box::new(SerialMotor::new(bus.clone(), wheel_config.id)),
                Box::new(SerialEncoder::new(bus.clone(), wheel_config.id)),
            ),
            None => {
                let (motor, encoder) = sim_pair(DEFAULT_MAX_PULSE_RATE);
                (Box::new(motor), Box::new(encoder))
            }
        };
        wheels.push(WheelController::new(wheel_config, actuator, sensor)?);
    }
    Ok(wheels)
}

/// Scripted demonstration: drive the first wheel through direct PWM, enable
/// odometry broadcast while printing samples, revert to off, then stop.
async fn demo(
    wheels: &mut [WheelController],
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let wheel = wheels.first_mut().ok_or("config contains no wheels")?;

    info!("Phase 1: PWM direct control at 50% duty");
    wheel.set_commanded_pwm(500);
    wheel.set_control_mode(ControlMode::PwmDirect);
    tokio::time::sleep(Duration::from_secs(10)).await;
    info!(report = ?wheel.workers(), "worker census");

    info!("Phase 2: enabling odometry broadcast");
    wheel.set_broadcast_flags(BroadcastFlags {
        angle: true,
        speed: true,
    });
    for i in 0..100u32 {
        let odom = wheel.odometry();
        info!(
            "angle: {}\trate: {:.1}\tpwm: {}",
            odom.angle,
            odom.rate,
            wheel.commanded_pwm()
        );
        if i % 20 == 19 {
            info!(report = ?wheel.workers(), "worker census");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    info!("Phase 3: reverting to off");
    wheel.set_control_mode(ControlMode::Off);
    tokio::time::sleep(Duration::from_secs(5)).await;

    info!("Stopping wheel tasks");
    wheel.stop().await;
    info!("Demonstration complete");
    Ok(())
}
