//! Register-level sensor transactions
//!
//! Every device driver in this module is written against [`RegisterAccess`],
//! a single-byte register read/write contract. [`DirectDevice`] implements it
//! with one bus exchange per operation; [`SensorHub`] implements it for a
//! device that is only reachable through the LSM6DSO's embedded I2C master.
//! Drivers therefore do not know, or care, which path they are on.

pub mod lps22hh;
pub mod lsm6dso;
mod sensor_hub;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use lps22hh::{BaroConfig, BaroStatus, LPS22HH_ADDRESS, LPS22HH_WHO_AM_I, Lps22hh};
pub use lsm6dso::{
    AccelFullScale, GyroFullScale, ImuStatus, LSM6DSO_ADDRESS, LSM6DSO_WHO_AM_I, Lsm6dso,
};
pub use sensor_hub::SensorHub;

use embedded_hal::i2c::{Error as _, ErrorKind, I2c};
use log::{error, warn};
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: bus transfer failed during {operation} ({kind:?})")]
    Bus {
        sensor: &'static str,
        operation: &'static str,
        kind: ErrorKind,
    },
    #[error("{sensor}: timed out waiting for {operation}")]
    Timeout {
        sensor: &'static str,
        operation: &'static str,
    },
    #[error("{sensor}: unexpected identity {found:#04x}, expected {expected:#04x}")]
    IdentityMismatch {
        sensor: &'static str,
        expected: u8,
        found: u8,
    },
    #[error("{sensor}: invalid argument for {operation}")]
    InvalidArgument {
        sensor: &'static str,
        operation: &'static str,
    },
}

impl SensorError {
    /// Whether trying the same operation again later can succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Bus { .. } | Self::Timeout { .. })
    }
}

/// Single-byte register access to one device.
pub trait RegisterAccess {
    /// Device name used in errors and logs.
    fn name(&self) -> &'static str;

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), SensorError>;

    fn read_reg(&mut self, reg: u8) -> Result<u8, SensorError>;

    /// Read `reg`, apply `f` and write the result back.
    fn update_reg(&mut self, reg: u8, f: impl FnOnce(u8) -> u8) -> Result<u8, SensorError> {
        let value = f(self.read_reg(reg)?);
        self.write_reg(reg, value)?;
        Ok(value)
    }
}

impl<R: RegisterAccess + ?Sized> RegisterAccess for &mut R {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), SensorError> {
        (**self).write_reg(reg, value)
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, SensorError> {
        (**self).read_reg(reg)
    }
}

/// Poll `reg` until every bit of `mask` is set (`want_set`) or clear.
///
/// Gives up after `limit` reads. Returns the last value read so callers can
/// inspect the other status bits.
pub fn wait_for_bits<R: RegisterAccess + ?Sized>(
    regs: &mut R,
    reg: u8,
    mask: u8,
    want_set: bool,
    limit: u32,
    operation: &'static str,
) -> Result<u8, SensorError> {
    for _ in 0..limit.max(1) {
        let value = regs.read_reg(reg)?;
        let bits = value & mask;
        if (want_set && bits == mask) || (!want_set && bits == 0) {
            return Ok(value);
        }
    }

    warn!("{}: gave up on {} after {} polls", regs.name(), operation, limit);
    Err(SensorError::Timeout {
        sensor: regs.name(),
        operation,
    })
}

/// A device addressed directly on the shared bus.
pub struct DirectDevice<I> {
    bus: I,
    address: u8,
    name: &'static str,
}

impl<I: I2c> DirectDevice<I> {
    pub const fn new(bus: I, address: u8, name: &'static str) -> Self {
        Self { bus, address, name }
    }

    fn bus_error(&self, operation: &'static str, reg: u8, kind: ErrorKind) -> SensorError {
        error!(
            "{} {} of register {:#04x} failed: {:?}",
            self.name, operation, reg, kind
        );
        SensorError::Bus {
            sensor: self.name,
            operation,
            kind,
        }
    }
}

impl<I: I2c> RegisterAccess for DirectDevice<I> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), SensorError> {
        self.bus
            .write(self.address, &[reg, value])
            .map_err(|e| self.bus_error("register write", reg, e.kind()))
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, SensorError> {
        let mut value = [0u8; 1];
        self.bus
            .write_read(self.address, &[reg], &mut value)
            .map_err(|e| self.bus_error("register read", reg, e.kind()))?;
        Ok(value[0])
    }
}

/// Combine little-endian register bytes into a signed 16-bit sample.
pub(crate) const fn le_i16(low: u8, high: u8) -> i16 {
    i16::from_le_bytes([low, high])
}
