// Wire types for the commanding surface

use serde::{Deserialize, Serialize};

use crate::state::ControlMode;

/// Command from teleop/scripts -> runtime, addressed to one wheel by topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum WheelCommand {
    SetMode { mode: ControlMode },
    SetPwm { value: i16 },
    SetBroadcast { angle: bool, speed: bool },
}

/// Odometry sample published while a broadcast flag is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OdometryReport {
    pub wheel: u8,
    pub angle: i64,
    pub rate: f32,
    pub pwm: i16,
}

/// Per-wheel status published on the state topic. `mode` is `None` when the
/// stored mode byte is outside the known set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WheelStatus {
    pub wheel: u8,
    pub mode: Option<ControlMode>,
    pub angle_broadcast: bool,
    pub speed_broadcast: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_format() {
        let json = r#"{"cmd":"set_mode","mode":"pwm_direct"}"#;
        let cmd: WheelCommand = serde_json::from_str(json).unwrap();
        assert!(matches!(
            cmd,
            WheelCommand::SetMode {
                mode: ControlMode::PwmDirect
            }
        ));

        let json = r#"{"cmd":"set_pwm","value":-500}"#;
        let cmd: WheelCommand = serde_json::from_str(json).unwrap();
        assert!(matches!(cmd, WheelCommand::SetPwm { value: -500 }));

        let json = r#"{"cmd":"set_broadcast","angle":true,"speed":false}"#;
        let cmd: WheelCommand = serde_json::from_str(json).unwrap();
        assert!(matches!(
            cmd,
            WheelCommand::SetBroadcast {
                angle: true,
                speed: false
            }
        ));
    }

    #[test]
    fn test_unknown_mode_string_is_rejected() {
        let json = r#"{"cmd":"set_mode","mode":"warp_drive"}"#;
        assert!(serde_json::from_str::<WheelCommand>(json).is_err());
    }

    #[test]
    fn test_report_round_trip() {
        let report = OdometryReport {
            wheel: 2,
            angle: -1234,
            rate: 55.5,
            pwm: 500,
        };
        let json = serde_json::to_string(&report).unwrap();
        let parsed: OdometryReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.wheel, 2);
        assert_eq!(parsed.angle, -1234);
        assert_eq!(parsed.pwm, 500);
    }
}
