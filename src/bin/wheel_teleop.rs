// Keyboard teleop: W/S duty, SPACE zero, M mode, A/E broadcast flags, Q quit
use std::time::Duration;

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use tracing::info;

use wheel_runtime::config::TOPIC_WHEEL_CMD;
use wheel_runtime::messages::WheelCommand;
use wheel_runtime::state::{ControlMode, PWM_FULL_SCALE};

const DUTY_STEP: i16 = 50;

/// Publish wheel commands from the keyboard
#[derive(Parser)]
#[command(name = "wheel-teleop")]
struct Args {
    /// Wheel id to command
    #[arg(long, default_value_t = 0)]
    wheel: u8,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session
        .declare_publisher(format!("{}/{}", TOPIC_WHEEL_CMD, args.wheel))
        .await?;

    info!("Commanding wheel {}", args.wheel);
    info!("Controls: W/S=duty, SPACE=zero, M=mode, A=angle bcast, E=speed bcast, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut duty: i16 = 0;
    let mut mode = ControlMode::Off;
    let mut angle = false;
    let mut speed = false;

    loop {
        // Poll for key with 20ms timeout
        if !event::poll(Duration::from_millis(20))? {
            continue;
        }
        let Event::Key(KeyEvent { code, kind, .. }) = event::read()? else {
            continue;
        };
        if kind != KeyEventKind::Press && kind != KeyEventKind::Repeat {
            continue;
        }

        let command = match code {
            KeyCode::Char('w') => {
                duty = (duty + DUTY_STEP).min(PWM_FULL_SCALE);
                info!("Duty: {}", duty);
                Some(WheelCommand::SetPwm { value: duty })
            }
            KeyCode::Char('s') => {
                duty = (duty - DUTY_STEP).max(-PWM_FULL_SCALE);
                info!("Duty: {}", duty);
                Some(WheelCommand::SetPwm { value: duty })
            }
            KeyCode::Char(' ') => {
                duty = 0;
                info!("Duty: 0");
                Some(WheelCommand::SetPwm { value: 0 })
            }
            KeyCode::Char('m') => {
                mode = match mode {
                    ControlMode::Off => ControlMode::PwmDirect,
                    ControlMode::PwmDirect => ControlMode::Off,
                };
                info!("Mode: {:?}", mode);
                Some(WheelCommand::SetMode { mode })
            }
            KeyCode::Char('a') => {
                angle = !angle;
                info!("Angle broadcast: {}", angle);
                Some(WheelCommand::SetBroadcast { angle, speed })
            }
            KeyCode::Char('e') => {
                speed = !speed;
                info!("Speed broadcast: {}", speed);
                Some(WheelCommand::SetBroadcast { angle, speed })
            }
            KeyCode::Char('q') | KeyCode::Esc => break,
            _ => None,
        };

        if let Some(command) = command {
            publisher.put(serde_json::to_string(&command)?).await?;
        }
    }

    Ok(())
}
