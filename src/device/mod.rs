// Device layer for the GoPiGo controller board
//
// Provides:
// - Wheel geometry (centimeters/degrees -> encoder pulses)
// - The 4-byte command frame protocol
// - Bus transport abstraction (I2C hardware or mock)
// - The serialized device session

pub mod bus;
pub mod protocol;
mod session;
pub mod units;

pub use bus::{Bus, BusError, BusEvent, I2cBus, MockBus};
pub use protocol::{Frame, Opcode};
pub use session::{Direction, Motor, Session, SessionError};
