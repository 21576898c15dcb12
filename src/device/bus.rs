// Register-addressed bus transport
//
// The session only needs two primitives from the bus: write bytes to a
// register of a device, and read one byte back from a device. Real hardware
// is any embedded-hal I2C implementation; tests and non-Linux hosts use the
// in-memory mock.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use embedded_hal::i2c::I2c;
use tracing::{debug, info};

use crate::config::MOCK_BUS;

/// Error types for bus transactions
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Failed to open bus {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("Write to device 0x{address:02X} register {register} failed: {reason}")]
    Write {
        address: u8,
        register: u8,
        reason: String,
    },

    #[error("Read from device 0x{address:02X} failed: {reason}")]
    Read { address: u8, reason: String },
}

/// Transport used by the device session
pub trait Bus: Send {
    /// Write `bytes` to `register` of the device at `address`
    fn write_to_reg(&mut self, address: u8, register: u8, bytes: &[u8]) -> Result<(), BusError>;

    /// Read a single byte from the device at `address`
    fn read_byte(&mut self, address: u8) -> Result<u8, BusError>;
}

impl<B: Bus + ?Sized> Bus for Box<B> {
    fn write_to_reg(&mut self, address: u8, register: u8, bytes: &[u8]) -> Result<(), BusError> {
        (**self).write_to_reg(address, register, bytes)
    }

    fn read_byte(&mut self, address: u8) -> Result<u8, BusError> {
        (**self).read_byte(address)
    }
}

/// Adapter from an embedded-hal I2C device to the register-addressed bus
pub struct I2cBus<T> {
    i2c: T,
}

impl<T: I2c> I2cBus<T> {
    pub fn new(i2c: T) -> Self {
        Self { i2c }
    }
}

impl<T: I2c + Send> Bus for I2cBus<T> {
    fn write_to_reg(&mut self, address: u8, register: u8, bytes: &[u8]) -> Result<(), BusError> {
        // Register byte leads the payload in a single write transaction
        let mut buf = Vec::with_capacity(bytes.len() + 1);
        buf.push(register);
        buf.extend_from_slice(bytes);
        self.i2c.write(address, &buf).map_err(|e| BusError::Write {
            address,
            register,
            reason: format!("{:?}", e),
        })
    }

    fn read_byte(&mut self, address: u8) -> Result<u8, BusError> {
        let mut buf = [0u8; 1];
        self.i2c
            .read(address, &mut buf)
            .map_err(|e| BusError::Read {
                address,
                reason: format!("{:?}", e),
            })?;
        Ok(buf[0])
    }
}

/// Open the Linux I2C character device at `path`
#[cfg(target_os = "linux")]
pub fn open(path: &str) -> Result<I2cBus<linux_embedded_hal::I2cdev>, BusError> {
    let dev = linux_embedded_hal::I2cdev::new(path).map_err(|e| BusError::Open {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    info!("Opened I2C bus {}", path);
    Ok(I2cBus::new(dev))
}

/// Open the configured bus: the real I2C device, or the mock when `MOCK_BUS` is set
#[cfg(target_os = "linux")]
pub fn open_default() -> Result<Box<dyn Bus>, BusError> {
    if MOCK_BUS {
        info!("Using mock bus (mock-bus feature enabled)");
        return Ok(Box::new(MockBus::new()));
    }
    Ok(Box::new(open(crate::config::I2C_BUS_PATH)?))
}

#[cfg(not(target_os = "linux"))]
pub fn open_default() -> Result<Box<dyn Bus>, BusError> {
    debug_assert!(MOCK_BUS);
    info!("Using mock bus (no I2C support on this platform)");
    Ok(Box::new(MockBus::new()))
}

/// A transaction observed by the mock bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Write {
        address: u8,
        register: u8,
        bytes: Vec<u8>,
    },
    Read {
        address: u8,
    },
}

/// In-memory bus for tests and hosts without hardware.
///
/// Cloning yields another handle to the same state, so a test can keep one
/// handle while the session owns the other.
#[derive(Clone, Default)]
pub struct MockBus {
    inner: Arc<Mutex<MockBusInner>>,
}

#[derive(Default)]
struct MockBusInner {
    events: Vec<BusEvent>,
    replies: VecDeque<u8>,
    failing_opcodes: HashSet<u8>,
    fail_reads: bool,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockBusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue bytes returned by subsequent reads (reads return 0 once drained)
    pub fn queue_reply(&self, bytes: &[u8]) {
        self.lock().replies.extend(bytes);
    }

    /// Reject every write whose first byte is `opcode`
    pub fn fail_opcode(&self, opcode: u8) {
        self.lock().failing_opcodes.insert(opcode);
    }

    /// Reject every read
    pub fn fail_reads(&self) {
        self.lock().fail_reads = true;
    }

    /// All successful transactions in order
    pub fn events(&self) -> Vec<BusEvent> {
        self.lock().events.clone()
    }

    /// Payloads of all successful writes in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                BusEvent::Write { bytes, .. } => Some(bytes.clone()),
                BusEvent::Read { .. } => None,
            })
            .collect()
    }
}

impl Bus for MockBus {
    fn write_to_reg(&mut self, address: u8, register: u8, bytes: &[u8]) -> Result<(), BusError> {
        let mut inner = self.lock();
        if bytes
            .first()
            .is_some_and(|op| inner.failing_opcodes.contains(op))
        {
            return Err(BusError::Write {
                address,
                register,
                reason: "injected failure".to_string(),
            });
        }
        debug!("Mock write 0x{:02X}/{}: {:?}", address, register, bytes);
        inner.events.push(BusEvent::Write {
            address,
            register,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }

    fn read_byte(&mut self, address: u8) -> Result<u8, BusError> {
        let mut inner = self.lock();
        if inner.fail_reads {
            return Err(BusError::Read {
                address,
                reason: "injected failure".to_string(),
            });
        }
        inner.events.push(BusEvent::Read { address });
        Ok(inner.replies.pop_front().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, Operation};

    /// Fake I2C device capturing raw transactions
    #[derive(Default)]
    struct FakeI2c {
        written: Vec<(u8, Vec<u8>)>,
        next_read: u8,
        fail: bool,
    }

    impl ErrorType for FakeI2c {
        type Error = ErrorKind;
    }

    impl I2c for FakeI2c {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if self.fail {
                return Err(ErrorKind::Other);
            }
            for op in operations {
                match op {
                    Operation::Write(bytes) => self.written.push((address, bytes.to_vec())),
                    Operation::Read(buf) => buf.fill(self.next_read),
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_i2c_register_write_prefixes_register() {
        let mut bus = I2cBus::new(FakeI2c::default());
        bus.write_to_reg(0x08, 1, &[105, 0, 0, 0]).unwrap();
        assert_eq!(bus.i2c.written, vec![(0x08, vec![1, 105, 0, 0, 0])]);
    }

    #[test]
    fn test_i2c_read_byte() {
        let mut bus = I2cBus::new(FakeI2c {
            next_read: 42,
            ..Default::default()
        });
        assert_eq!(bus.read_byte(0x08).unwrap(), 42);
    }

    #[test]
    fn test_i2c_errors_map_to_bus_errors() {
        let mut bus = I2cBus::new(FakeI2c {
            fail: true,
            ..Default::default()
        });
        assert!(matches!(
            bus.write_to_reg(0x08, 1, &[120]),
            Err(BusError::Write { address: 0x08, register: 1, .. })
        ));
        assert!(matches!(
            bus.read_byte(0x08),
            Err(BusError::Read { address: 0x08, .. })
        ));
    }

    #[test]
    fn test_mock_records_and_replies() {
        let handle = MockBus::new();
        let mut bus = handle.clone();
        handle.queue_reply(&[7]);

        bus.write_to_reg(0x08, 1, &[118, 0, 0, 0]).unwrap();
        assert_eq!(bus.read_byte(0x08).unwrap(), 7);
        // Drained replies read as zero
        assert_eq!(bus.read_byte(0x08).unwrap(), 0);

        assert_eq!(handle.writes(), vec![vec![118, 0, 0, 0]]);
        assert_eq!(handle.events().len(), 3);
    }

    #[test]
    fn test_mock_injected_failures() {
        let handle = MockBus::new();
        let mut bus = handle.clone();
        handle.fail_opcode(50);
        handle.fail_reads();

        assert!(bus.write_to_reg(0x08, 1, &[50, 3, 0, 9]).is_err());
        assert!(bus.write_to_reg(0x08, 1, &[105, 0, 0, 0]).is_ok());
        assert!(bus.read_byte(0x08).is_err());
        assert_eq!(handle.writes(), vec![vec![105, 0, 0, 0]]);
    }
}
