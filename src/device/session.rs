// Device session for the GoPiGo controller board
//
// Owns the bus and serializes every command: the lock is held from encoding
// through the settle delay and any reply read, so no two frames are ever in
// flight at once.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use tracing::{debug, info, warn};

use super::bus::{Bus, BusError};
use super::protocol::{Frame, Opcode, decode_voltage, motor_select, split_target};
use super::units::{pulses_for_angle, pulses_for_distance};
use crate::config::{COMMAND_REGISTER, DEVICE_ADDRESS, SETTLE_DELAY};

/// Error types for device operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Transport error: {0}")]
    Transport(#[from] BusError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Motor addressed by direct control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motor {
    One,
    Two,
}

/// Spin direction for direct motor control
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Backward = 0,
    Forward = 1,
}

/// Serialized access to the controller board
pub struct Session<B> {
    bus: Mutex<B>,
    address: u8,
}

/// Exclusive hold on the bus for the duration of one operation
struct Link<'a, B> {
    bus: MutexGuard<'a, B>,
    address: u8,
}

impl<B: Bus> Link<'_, B> {
    /// Write one frame, then wait out the settle delay whether or not the write succeeded
    fn send(&mut self, opcode: Opcode, params: &[u8]) -> std::result::Result<(), BusError> {
        debug_assert!(params.len() <= opcode.arity());
        let frame = Frame::new(opcode, params);
        debug!("Sending {:?}: {:?}", opcode, frame.as_bytes());

        let result = self
            .bus
            .write_to_reg(self.address, COMMAND_REGISTER, frame.as_bytes());
        thread::sleep(SETTLE_DELAY);
        result
    }

    /// Send a query opcode and read its reply one byte at a time
    fn query<const N: usize>(&mut self, opcode: Opcode) -> std::result::Result<[u8; N], BusError> {
        debug_assert_eq!(N, opcode.reply_len());
        self.send(opcode, &[])?;

        let mut reply = [0u8; N];
        for byte in &mut reply {
            *byte = self.bus.read_byte(self.address)?;
        }
        debug!("Reply to {:?}: {:?}", opcode, reply);
        Ok(reply)
    }

    fn set_encoder_target(&mut self, motor1: bool, motor2: bool, target_pulses: i64) -> Result<()> {
        if target_pulses < 0 {
            return Err(SessionError::InvalidArgument(format!(
                "encoder target must be non-negative, got {}",
                target_pulses
            )));
        }
        // Targets of 65536 and above wrap in the high byte
        let (high, low) = split_target(target_pulses as u32);
        let mask = motor_select(motor1, motor2);
        debug!("Encoder target: mask={}, pulses={}", mask, target_pulses);
        self.send(Opcode::EncoderTarget, &[mask, high, low])?;
        Ok(())
    }
}

impl<B: Bus> Session<B> {
    /// Create a session for the board at the default address
    pub fn new(bus: B) -> Self {
        Self::with_address(bus, DEVICE_ADDRESS)
    }

    /// Create a session for a board at a custom address
    pub fn with_address(bus: B, address: u8) -> Self {
        info!("Device session on address 0x{:02X}", address);
        Self {
            bus: Mutex::new(bus),
            address,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    fn lock(&self) -> Link<'_, B> {
        Link {
            bus: self.bus.lock().unwrap_or_else(PoisonError::into_inner),
            address: self.address,
        }
    }

    /// Send a parameterless command that expects no reply
    fn command(&self, opcode: Opcode) -> Result<()> {
        self.lock().send(opcode, &[])?;
        Ok(())
    }

    /// Drive straight, stopping after `distance_cm` if positive.
    ///
    /// Aborts before sending the move if the encoder target cannot be set.
    fn drive(&self, opcode: Opcode, distance_cm: f64) -> Result<()> {
        let mut link = self.lock();
        if let Some(pulses) = pulses_for_distance(distance_cm) {
            link.set_encoder_target(true, true, i64::from(pulses))?;
        }
        link.send(opcode, &[])?;
        Ok(())
    }

    /// Turn on one wheel, stopping after `degrees` if positive.
    ///
    /// A failed encoder target is logged and the turn is issued anyway.
    fn turn(&self, opcode: Opcode, degrees: f64, motor1: bool, motor2: bool) -> Result<()> {
        let mut link = self.lock();
        if let Some(pulses) = pulses_for_angle(degrees) {
            if let Err(e) = link.set_encoder_target(motor1, motor2, i64::from(pulses)) {
                warn!("Turning without encoder target: {}", e);
            }
        }
        link.send(opcode, &[])?;
        Ok(())
    }

    /// Move forward `distance_cm`; zero or negative moves until stopped
    pub fn move_forward(&self, distance_cm: f64) -> Result<()> {
        self.drive(Opcode::MotorForward, distance_cm)
    }

    /// Move backward `distance_cm`; zero or negative moves until stopped
    pub fn move_backward(&self, distance_cm: f64) -> Result<()> {
        self.drive(Opcode::MotorBackward, distance_cm)
    }

    /// Turn left by `degrees` on the right wheel; zero or negative turns until stopped
    pub fn turn_left(&self, degrees: f64) -> Result<()> {
        self.turn(Opcode::Left, degrees, false, true)
    }

    /// Turn right by `degrees` on the left wheel; zero or negative turns until stopped
    pub fn turn_right(&self, degrees: f64) -> Result<()> {
        self.turn(Opcode::Right, degrees, true, false)
    }

    pub fn stop(&self) -> Result<()> {
        info!("Stopping motors");
        self.command(Opcode::Stop)
    }

    /// Turn left slowly by stopping one motor
    pub fn left(&self) -> Result<()> {
        self.command(Opcode::Left)
    }

    /// Rotate left in place with both wheels
    pub fn left_rotate(&self) -> Result<()> {
        self.command(Opcode::LeftRotate)
    }

    /// Turn right slowly by stopping one motor
    pub fn right(&self) -> Result<()> {
        self.command(Opcode::Right)
    }

    /// Rotate right in place with both wheels
    pub fn right_rotate(&self) -> Result<()> {
        self.command(Opcode::RightRotate)
    }

    pub fn increase_speed(&self) -> Result<()> {
        self.command(Opcode::IncreaseSpeed)
    }

    pub fn decrease_speed(&self) -> Result<()> {
        self.command(Opcode::DecreaseSpeed)
    }

    /// Encoders are enabled by default on the board
    pub fn enable_encoders(&self) -> Result<()> {
        self.command(Opcode::EnableEncoders)
    }

    pub fn disable_encoders(&self) -> Result<()> {
        self.command(Opcode::DisableEncoders)
    }

    /// Set direction and speed of a single motor
    pub fn direct_motor(&self, motor: Motor, direction: Direction, speed: u8) -> Result<()> {
        let opcode = match motor {
            Motor::One => Opcode::Motor1,
            Motor::Two => Opcode::Motor2,
        };
        self.lock().send(opcode, &[direction as u8, speed])?;
        Ok(())
    }

    /// Arm the encoder target so the next move stops after `target_pulses`.
    ///
    /// Rejects negative targets without touching the bus.
    pub fn set_encoder_target(&self, motor1: bool, motor2: bool, target_pulses: i64) -> Result<()> {
        self.lock()
            .set_encoder_target(motor1, motor2, target_pulses)
    }

    /// Read the battery voltage in volts
    pub fn battery_voltage(&self) -> Result<f32> {
        let [b1, b2] = self.lock().query::<2>(Opcode::BatteryVoltage)?;
        Ok(decode_voltage(b1, b2))
    }
}
