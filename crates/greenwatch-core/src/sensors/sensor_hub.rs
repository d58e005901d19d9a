//! Register access to a device behind the LSM6DSO embedded I2C master
//!
//! The LPS22HH on the sensor board is wired to the IMU's auxiliary bus and is
//! not addressable from the host. Every access is staged in the IMU's
//! sensor-hub bank as a one-shot slave-0 transaction:
//!
//! ```text
//! write: enter, program slave 0, stage data, trigger, poll done, master off, leave
//! read:  enter, program slave 0, trigger, poll done, master off, leave,
//!        enter, poll new data, read SENSOR_HUB_1, leave
//! ```
//!
//! One proxied access costs six or more IMU register operations. The
//! [`SensorHub`] holds the IMU mutably for its whole lifetime, so direct and
//! proxied transactions can never interleave.

use super::lsm6dso::{
    Lsm6dso, MASTER_ON, SENS_HUB_ENDOP, SHUB_PU_EN, SLAVE0_NACK, WR_ONCE_DONE, WRITE_ONCE,
    hub_regs,
};
use super::{RegisterAccess, SensorError, wait_for_bits};
use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use log::{debug, warn};

/// `SLAVE0_CONFIG` with one byte to read
const SLAVE0_READ_ONE: u8 = 0x01;
/// `SLAVE0_CONFIG` for a write-once transaction
const SLAVE0_WRITE: u8 = 0x00;

const MASTER_TRIGGER: u8 = WRITE_ONCE | SHUB_PU_EN | MASTER_ON;
const MASTER_IDLE: u8 = SHUB_PU_EN;

/// A device reached through the IMU's slave-0 channel.
pub struct SensorHub<'a, R> {
    imu: &'a mut Lsm6dso<R>,
    address: u8,
    name: &'static str,
}

impl<'a, R: RegisterAccess> SensorHub<'a, R> {
    pub fn new(imu: &'a mut Lsm6dso<R>, address: u8, name: &'static str) -> Self {
        Self { imu, address, name }
    }

    fn nack(&self, operation: &'static str) -> SensorError {
        warn!("{}: no acknowledge on the auxiliary bus", self.name);
        SensorError::Bus {
            sensor: self.name,
            operation,
            kind: ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
        }
    }

    /// Start the programmed one-shot transaction and wait for it to finish.
    ///
    /// Runs inside the hub bank. The master is switched off again even when
    /// the completion poll fails.
    fn trigger<T: RegisterAccess>(regs: &mut T, limit: u32) -> Result<u8, SensorError> {
        regs.write_reg(hub_regs::MASTER_CONFIG, MASTER_TRIGGER)?;
        let done = wait_for_bits(
            regs,
            hub_regs::STATUS_MASTER,
            WR_ONCE_DONE,
            true,
            limit,
            "sensor hub transaction",
        );
        let idle = regs.write_reg(hub_regs::MASTER_CONFIG, MASTER_IDLE);
        let status = done?;
        idle?;
        Ok(status)
    }
}

impl<R: RegisterAccess> RegisterAccess for SensorHub<'_, R> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), SensorError> {
        let address = self.address;
        debug!("{}: proxied write {:#04x} = {:#04x}", self.name, reg, value);

        let status = self.imu.with_hub_bank(|regs, limit| {
            regs.write_reg(hub_regs::SLV0_ADD, address << 1)?;
            regs.write_reg(hub_regs::SLV0_SUBADD, reg)?;
            regs.write_reg(hub_regs::SLAVE0_CONFIG, SLAVE0_WRITE)?;
            regs.write_reg(hub_regs::DATAWRITE_SLV0, value)?;
            Self::trigger(regs, limit)
        })?;

        if status & SLAVE0_NACK != 0 {
            return Err(self.nack("proxied register write"));
        }
        Ok(())
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, SensorError> {
        let address = self.address;

        let status = self.imu.with_hub_bank(|regs, limit| {
            regs.write_reg(hub_regs::SLV0_ADD, (address << 1) | 0x01)?;
            regs.write_reg(hub_regs::SLV0_SUBADD, reg)?;
            regs.write_reg(hub_regs::SLAVE0_CONFIG, SLAVE0_READ_ONE)?;
            Self::trigger(regs, limit)
        })?;

        if status & SLAVE0_NACK != 0 {
            return Err(self.nack("proxied register read"));
        }

        let value = self.imu.with_hub_bank(|regs, limit| {
            wait_for_bits(
                regs,
                hub_regs::STATUS_MASTER,
                SENS_HUB_ENDOP,
                true,
                limit,
                "sensor hub data",
            )?;
            regs.read_reg(hub_regs::SENSOR_HUB_1)
        })?;

        debug!("{}: proxied read {:#04x} = {:#04x}", self.name, reg, value);
        Ok(value)
    }
}
