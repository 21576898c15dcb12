// GoPiGo controller board command protocol
//
// Every command is a fixed 4-byte frame written to one register:
// [opcode, param0, param1, param2], unused parameters zero.
// Queries are answered by reading reply bytes one at a time afterwards.

/// Frame length on the wire
pub const FRAME_LEN: usize = 4;

/// Opcode set understood by the controller firmware
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    MotorForward = 105,
    MotorBackward = 107,
    Stop = 120,
    Left = 97,            // turn by stopping one motor
    LeftRotate = 98,      // rotate with both motors in opposite directions
    Right = 100,          // turn by stopping one motor
    RightRotate = 110,    // rotate with both motors in opposite directions
    IncreaseSpeed = 116,  // +10
    DecreaseSpeed = 103,  // -10
    Motor1 = 111,         // direct control: [direction, speed]
    Motor2 = 112,         // direct control: [direction, speed]
    BatteryVoltage = 118, // replies with 2 bytes
    EncoderTarget = 50,   // [motor mask, target high, target low]
    EnableEncoders = 51,
    DisableEncoders = 52,
}

impl Opcode {
    /// Number of parameter bytes the opcode expects
    pub fn arity(self) -> usize {
        match self {
            Opcode::EncoderTarget => 3,
            Opcode::Motor1 | Opcode::Motor2 => 2,
            _ => 0,
        }
    }

    /// Number of reply bytes to read after the settle delay
    pub fn reply_len(self) -> usize {
        match self {
            Opcode::BatteryVoltage => 2,
            _ => 0,
        }
    }
}

/// One command frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    /// Build a frame from an opcode and up to three parameters.
    /// Missing parameters are zero; anything past the third is ignored.
    pub fn new(opcode: Opcode, params: &[u8]) -> Self {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[0] = opcode as u8;
        for (slot, &p) in bytes[1..].iter_mut().zip(params) {
            *slot = p;
        }
        Self(bytes)
    }

    pub fn opcode(&self) -> u8 {
        self.0[0]
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }
}

/// Motor selection mask for the encoder target command
pub fn motor_select(motor1: bool, motor2: bool) -> u8 {
    2 * u8::from(motor1) + u8::from(motor2)
}

/// Split a pulse target into (high, low) bytes.
///
/// Exact for targets below 65536; larger targets wrap in the high byte.
pub fn split_target(pulses: u32) -> (u8, u8) {
    ((pulses / 256) as u8, (pulses % 256) as u8)
}

/// Decode the two battery reply bytes into volts.
///
/// The firmware reports a 10-bit ADC reading behind a 0.4 divider on a 5V reference.
pub fn decode_voltage(b1: u8, b2: u8) -> f32 {
    let raw = u32::from(b1) * 255 + u32::from(b2);
    (5.0 * raw as f32 / 1024.0) / 0.4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_is_zero_padded() {
        let frame = Frame::new(Opcode::Stop, &[]);
        assert_eq!(frame.as_bytes(), &[120, 0, 0, 0]);

        let frame = Frame::new(Opcode::Motor1, &[1, 200]);
        assert_eq!(frame.as_bytes(), &[111, 1, 200, 0]);
    }

    #[test]
    fn test_frame_ignores_extra_params() {
        let frame = Frame::new(Opcode::EncoderTarget, &[3, 1, 2, 9, 9]);
        assert_eq!(frame.as_bytes(), &[50, 3, 1, 2]);
        assert_eq!(frame.opcode(), 50);
    }

    #[test]
    fn test_encoder_target_bytes() {
        // motor1 only, 300 pulses
        let (high, low) = split_target(300);
        let frame = Frame::new(Opcode::EncoderTarget, &[motor_select(true, false), high, low]);
        assert_eq!(frame.as_bytes(), &[50, 2, 1, 44]);
    }

    #[test]
    fn test_motor_select() {
        assert_eq!(motor_select(false, false), 0);
        assert_eq!(motor_select(false, true), 1);
        assert_eq!(motor_select(true, false), 2);
        assert_eq!(motor_select(true, true), 3);
    }

    #[test]
    fn test_split_target_wraps_above_16_bits() {
        assert_eq!(split_target(65535), (255, 255));
        assert_eq!(split_target(65536), (0, 0));
        assert_eq!(split_target(65536 + 300), (1, 44));
    }

    #[test]
    fn test_decode_voltage() {
        // (5 * 520 / 1024) / 0.4 = 6.347
        let volts = decode_voltage(2, 10);
        assert!((volts - 6.347).abs() < 0.001, "got {}", volts);
        assert_eq!(decode_voltage(0, 0), 0.0);
    }

    #[test]
    fn test_arity_and_reply_len() {
        assert_eq!(Opcode::EncoderTarget.arity(), 3);
        assert_eq!(Opcode::Motor2.arity(), 2);
        assert_eq!(Opcode::MotorForward.arity(), 0);
        assert_eq!(Opcode::BatteryVoltage.reply_len(), 2);
        assert_eq!(Opcode::Stop.reply_len(), 0);
    }
}
