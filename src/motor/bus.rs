// Wheel driver board serial protocol
//
// The board exposes one register bank per motor channel:
// Frame format: [0xA5, 0x5A, Channel, Length, Opcode, Params..., Checksum]
// Responses carry a status byte in place of the opcode.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serialport::SerialPort;
use tracing::debug;

use super::{MotorActuator, MotorError, PositionSensor, Result};
use crate::state::PWM_FULL_SCALE;

/// Default serial configuration for the driver board
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 50;

/// Frame header bytes
const HEADER: [u8; 2] = [0xA5, 0x5A];

/// Opcodes understood by the board
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Opcode {
    Ping = 0x01,
    ReadReg = 0x02,
    WriteReg = 0x03,
}

/// Register addresses, one bank per channel
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    FirmwareVersion = 0x00, // 2 bytes, read-only

    MotorEnable = 0x10, // 1 byte: 0=coast, 1=driven
    Duty = 0x11,        // 2 bytes, sign-magnitude, ±1000 full scale

    EncoderEnable = 0x20, // 1 byte: writing 1 zeroes and starts the counter
    EncoderCount = 0x21,  // 4 bytes, signed little-endian, read-only
    EncoderRate = 0x25,   // 4 bytes, signed little-endian, pulses/s, read-only
}

/// Serial connection to the wheel driver board.
pub struct WheelBus {
    port: Box<dyn SerialPort>,
}

impl WheelBus {
    /// Open a connection to the board
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    /// Open with custom baudrate
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self { port })
    }

    /// Two's-complement checksum over everything after the header
    fn checksum(data: &[u8]) -> u8 {
        let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        0u8.wrapping_sub(sum)
    }

    /// Build a frame with header and checksum
    fn build_frame(channel: u8, opcode: Opcode, params: &[u8]) -> Vec<u8> {
        let length = (params.len() + 2) as u8; // opcode + params + checksum
        let mut frame = Vec::with_capacity(6 + params.len());

        frame.extend_from_slice(&HEADER);
        frame.push(channel);
        frame.push(length);
        frame.push(opcode as u8);
        frame.extend_from_slice(params);

        let body = &frame[2..]; // checksum covers channel onward
        frame.push(Self::checksum(body));

        frame
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.port.write_all(frame)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read and validate a response frame, returning its payload
    fn read_response(&mut self, channel: u8) -> Result<Vec<u8>> {
        let mut header = [0u8; 2];
        self.port.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                MotorError::Timeout { channel }
            } else {
                MotorError::Io(e)
            }
        })?;

        if header != HEADER {
            return Err(MotorError::InvalidResponse {
                channel,
                reason: format!("bad header: {:02X?}", header),
            });
        }

        let mut chan_length = [0u8; 2];
        self.port.read_exact(&mut chan_length)?;
        let resp_channel = chan_length[0];
        let length = chan_length[1] as usize;

        if resp_channel != channel {
            return Err(MotorError::InvalidResponse {
                channel,
                reason: format!("channel mismatch: expected {}, got {}", channel, resp_channel),
            });
        }

        if length < 2 {
            return Err(MotorError::InvalidResponse {
                channel,
                reason: format!("frame too short: length {}", length),
            });
        }

        // status + params + checksum = length bytes
        let mut remaining = vec![0u8; length];
        self.port.read_exact(&mut remaining)?;

        let mut body = vec![resp_channel, length as u8];
        body.extend_from_slice(&remaining[..remaining.len() - 1]);
        let expected = Self::checksum(&body);
        let received = remaining[remaining.len() - 1];
        if expected != received {
            return Err(MotorError::ChecksumMismatch { channel });
        }

        let status = remaining[0];
        if status != 0 {
            return Err(MotorError::BoardFault { channel, status });
        }

        Ok(remaining[1..remaining.len() - 1].to_vec())
    }

    /// Check whether a channel's bank responds
    pub fn ping(&mut self, channel: u8) -> Result<bool> {
        let frame = Self::build_frame(channel, Opcode::Ping, &[]);
        self.send_frame(&frame)?;

        match self.read_response(channel) {
            Ok(_) => Ok(true),
            Err(MotorError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Write a single byte to a register
    pub fn write_u8(&mut self, channel: u8, register: Register, value: u8) -> Result<()> {
        let params = [register as u8, value];
        let frame = Self::build_frame(channel, Opcode::WriteReg, &params);
        debug!(
            "write u8 to channel {}: reg={:?}, value={}",
            channel, register, value
        );
        self.send_frame(&frame)?;
        let _ = self.read_response(channel)?;
        Ok(())
    }

    /// Write a signed duty value in sign-magnitude form
    pub fn write_duty(&mut self, channel: u8, value: i16) -> Result<()> {
        let raw = encode_sign_magnitude(value);
        let params = [Register::Duty as u8, (raw & 0xFF) as u8, (raw >> 8) as u8];
        let frame = Self::build_frame(channel, Opcode::WriteReg, &params);
        debug!("write duty to channel {}: {}", channel, value);
        self.send_frame(&frame)?;
        let _ = self.read_response(channel)?;
        Ok(())
    }

    /// Read a signed 32-bit register (little-endian)
    pub fn read_i32(&mut self, channel: u8, register: Register) -> Result<i32> {
        let params = [register as u8, 4]; // address, byte count
        let frame = Self::build_frame(channel, Opcode::ReadReg, &params);
        self.send_frame(&frame)?;

        let payload = self.read_response(channel)?;
        if payload.len() < 4 {
            return Err(MotorError::InvalidResponse {
                channel,
                reason: format!("expected 4 bytes, got {}", payload.len()),
            });
        }
        Ok(i32::from_le_bytes([
            payload[0], payload[1], payload[2], payload[3],
        ]))
    }
}

/// Encode a signed value to sign-magnitude form:
/// bit 15 = sign (1 = negative), bits 0-14 = magnitude
fn encode_sign_magnitude(value: i16) -> u16 {
    if value >= 0 {
        value as u16
    } else {
        0x8000 | (-(value as i32) as u16)
    }
}

/// Actuator facade over one board channel.
pub struct SerialMotor {
    bus: Arc<Mutex<WheelBus>>,
    channel: u8,
}

impl SerialMotor {
    pub fn new(bus: Arc<Mutex<WheelBus>>, channel: u8) -> Self {
        Self { bus, channel }
    }
}

impl MotorActuator for SerialMotor {
    fn init(&mut self) -> Result<()> {
        let mut bus = self.bus.lock();
        if !bus.ping(self.channel)? {
            return Err(MotorError::Timeout {
                channel: self.channel,
            });
        }
        bus.write_duty(self.channel, 0)?;
        bus.write_u8(self.channel, Register::MotorEnable, 1)
    }

    fn set_speed(&mut self, fraction: f32) -> Result<()> {
        let clamped = fraction.clamp(-1.0, 1.0);
        let duty = (clamped * f32::from(PWM_FULL_SCALE)).round() as i16;
        self.bus.lock().write_duty(self.channel, duty)
    }
}

/// Pulse-counter facade over one board channel.
pub struct SerialEncoder {
    bus: Arc<Mutex<WheelBus>>,
    channel: u8,
}

impl SerialEncoder {
    pub fn new(bus: Arc<Mutex<WheelBus>>, channel: u8) -> Self {
        Self { bus, channel }
    }
}

impl PositionSensor for SerialEncoder {
    fn start_counting(&mut self) -> Result<()> {
        self.bus
            .lock()
            .write_u8(self.channel, Register::EncoderEnable, 1)
    }

    fn cumulative_count(&mut self) -> Result<i64> {
        let count = self.bus.lock().read_i32(self.channel, Register::EncoderCount)?;
        Ok(i64::from(count))
    }

    fn instantaneous_rate(&mut self) -> Result<f32> {
        let rate = self.bus.lock().read_i32(self.channel, Register::EncoderRate)?;
        Ok(rate as f32)
    }
}
