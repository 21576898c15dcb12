// Bus addressing, timing, and front-end defaults
use std::time::Duration;

// I2C bus device (bus 1 on the Raspberry Pi header)
pub const I2C_BUS_PATH: &str = "/dev/i2c-1";

// Controller board address and the register every command frame is written to
pub const DEVICE_ADDRESS: u8 = 0x08;
pub const COMMAND_REGISTER: u8 = 1;

// Quiescence the board needs after every frame before any further bus activity
pub const SETTLE_DELAY: Duration = Duration::from_millis(5);

// HTTP front-end
pub const HTTP_LISTEN_ADDR: &str = "0.0.0.0:8070";
pub const PUBLIC_DIR: &str = "./public";

// Use the in-memory bus instead of real hardware.
// Always on off-Linux; on Linux only with the `mock-bus` feature.
pub const MOCK_BUS: bool = cfg!(feature = "mock-bus") || !cfg!(target_os = "linux");
