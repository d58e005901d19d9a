//! LPS22HH barometer
//!
//! The driver only needs [`RegisterAccess`]; on the sensor board it is always
//! wrapped around a [`SensorHub`](super::SensorHub).

use super::{RegisterAccess, SensorError, le_i16, wait_for_bits};
use log::info;

/// 7-bit bus address with SA0 tied high.
pub const LPS22HH_ADDRESS: u8 = 0x5C;

/// Fixed content of `WHO_AM_I`.
pub const LPS22HH_WHO_AM_I: u8 = 0xB3;

const SENSOR: &str = "LPS22HH";

pub mod regs {
    pub const WHO_AM_I: u8 = 0x0F;
    pub const CTRL_REG1: u8 = 0x10;
    pub const CTRL_REG2: u8 = 0x11;
    pub const STATUS: u8 = 0x27;
    pub const PRESS_OUT_XL: u8 = 0x28;
    pub const PRESS_OUT_L: u8 = 0x29;
    pub const PRESS_OUT_H: u8 = 0x2A;
    pub const TEMP_OUT_L: u8 = 0x2B;
    pub const TEMP_OUT_H: u8 = 0x2C;
}

/// `CTRL_REG2` software reset, self-clearing.
pub const SWRESET: u8 = 1 << 2;
/// `CTRL_REG2` register address auto-increment.
pub const IF_ADD_INC: u8 = 1 << 4;

/// Decoded `STATUS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BaroStatus {
    pub pressure_ready: bool,
    pub temperature_ready: bool,
    pub pressure_overrun: bool,
    pub temperature_overrun: bool,
}

impl BaroStatus {
    pub const fn from_bits(bits: u8) -> Self {
        Self {
            pressure_ready: bits & 0x01 != 0,
            temperature_ready: bits & 0x02 != 0,
            pressure_overrun: bits & 0x10 != 0,
            temperature_overrun: bits & 0x20 != 0,
        }
    }

    pub const fn all_ready(&self) -> bool {
        self.pressure_ready && self.temperature_ready
    }
}

/// `CTRL_REG1` contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaroConfig {
    /// Output data rate code, 0 (one-shot) to 7 (200 Hz)
    pub odr: u8,
    pub low_pass: bool,
    /// LPF bandwidth ODR/20 instead of ODR/9
    pub low_pass_narrow: bool,
    pub block_data_update: bool,
}

impl Default for BaroConfig {
    fn default() -> Self {
        Self {
            odr: 1,
            low_pass: false,
            low_pass_narrow: false,
            block_data_update: true,
        }
    }
}

pub struct Lps22hh<R> {
    regs: R,
    poll_limit: u32,
}

impl<R: RegisterAccess> Lps22hh<R> {
    pub const fn new(regs: R, poll_limit: u32) -> Self {
        Self { regs, poll_limit }
    }

    pub fn reset(&mut self) -> Result<(), SensorError> {
        self.regs.write_reg(regs::CTRL_REG2, SWRESET | IF_ADD_INC)?;
        wait_for_bits(
            &mut self.regs,
            regs::CTRL_REG2,
            SWRESET,
            false,
            self.poll_limit,
            "software reset",
        )?;
        info!("{}: reset complete", SENSOR);
        Ok(())
    }

    pub fn check_who_am_i(&mut self) -> Result<(), SensorError> {
        let found = self.regs.read_reg(regs::WHO_AM_I)?;
        if found != LPS22HH_WHO_AM_I {
            return Err(SensorError::IdentityMismatch {
                sensor: SENSOR,
                expected: LPS22HH_WHO_AM_I,
                found,
            });
        }
        Ok(())
    }

    pub fn configure(&mut self, config: BaroConfig) -> Result<(), SensorError> {
        if config.odr >> 3 != 0 {
            return Err(SensorError::InvalidArgument {
                sensor: SENSOR,
                operation: "output data rate",
            });
        }
        let value = (config.odr << 4)
            | ((config.low_pass as u8) << 3)
            | ((config.low_pass_narrow as u8) << 2)
            | ((config.block_data_update as u8) << 1);
        self.regs.write_reg(regs::CTRL_REG1, value)
    }

    pub fn status(&mut self) -> Result<BaroStatus, SensorError> {
        self.regs.read_reg(regs::STATUS).map(BaroStatus::from_bits)
    }

    pub fn read_temperature_raw(&mut self) -> Result<i16, SensorError> {
        let low = self.regs.read_reg(regs::TEMP_OUT_L)?;
        let high = self.regs.read_reg(regs::TEMP_OUT_H)?;
        Ok(le_i16(low, high))
    }

    /// Temperature in °C (100 LSB/°C).
    pub fn read_temperature_celsius(&mut self) -> Result<f32, SensorError> {
        Ok(self.read_temperature_raw()? as f32 / 100.0)
    }

    /// Signed 24-bit pressure sample.
    pub fn read_pressure_raw(&mut self) -> Result<i32, SensorError> {
        let xl = self.regs.read_reg(regs::PRESS_OUT_XL)?;
        let l = self.regs.read_reg(regs::PRESS_OUT_L)?;
        let h = self.regs.read_reg(regs::PRESS_OUT_H)?;
        // Place the sample in the top 24 bits so the shift sign-extends it
        Ok(i32::from_le_bytes([0, xl, l, h]) >> 8)
    }

    /// Pressure in hPa (4096 LSB/hPa).
    pub fn read_pressure_hpa(&mut self) -> Result<f32, SensorError> {
        Ok(self.read_pressure_raw()? as f32 / 4096.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::lsm6dso::{LSM6DSO_ADDRESS, Lsm6dso};
    use crate::sensors::sim::{SimBoard, SimBus};
    use crate::sensors::{DirectDevice, SensorHub};

    fn imu(board: &SimBoard) -> Lsm6dso<DirectDevice<SimBus>> {
        Lsm6dso::new(DirectDevice::new(board.bus(), LSM6DSO_ADDRESS, "LSM6DSO"), 8)
    }

    #[test]
    fn test_identity_through_hub() {
        let board = SimBoard::new();
        let mut imu = imu(&board);
        let mut baro = Lps22hh::new(SensorHub::new(&mut imu, LPS22HH_ADDRESS, SENSOR), 8);

        assert_eq!(baro.check_who_am_i(), Ok(()));
    }

    #[test]
    fn test_reset_waits_for_swreset_to_clear() {
        let board = SimBoard::new();
        board.set_baro_reset_latency(2);
        let mut imu = imu(&board);
        let mut baro = Lps22hh::new(SensorHub::new(&mut imu, LPS22HH_ADDRESS, SENSOR), 8);

        assert_eq!(baro.reset(), Ok(()));
        assert_eq!(board.baro_register(regs::CTRL_REG2), IF_ADD_INC);
    }

    #[test]
    fn test_configure_rejects_wide_odr() {
        let board = SimBoard::new();
        let mut imu = imu(&board);
        let mut baro = Lps22hh::new(SensorHub::new(&mut imu, LPS22HH_ADDRESS, SENSOR), 8);

        assert!(matches!(
            baro.configure(BaroConfig {
                odr: 8,
                ..BaroConfig::default()
            }),
            Err(SensorError::InvalidArgument { .. })
        ));
        assert!(board.ops().is_empty());

        baro.configure(BaroConfig::default()).unwrap();
        assert_eq!(board.baro_register(regs::CTRL_REG1), 0x12);
    }

    #[test]
    fn test_scaled_readings() {
        let board = SimBoard::new();
        board.set_baro_pressure_raw(1013 * 4096);
        board.set_baro_temperature_raw(2150);
        let mut imu = imu(&board);
        let mut baro = Lps22hh::new(SensorHub::new(&mut imu, LPS22HH_ADDRESS, SENSOR), 8);

        let hpa = baro.read_pressure_hpa().unwrap();
        let celsius = baro.read_temperature_celsius().unwrap();
        assert!((hpa - 1013.0).abs() < 1e-3);
        assert!((celsius - 21.5).abs() < 1e-4);
    }

    #[test]
    fn test_negative_pressure_sample_is_sign_extended() {
        let board = SimBoard::new();
        board.set_baro_pressure_raw(-4096);
        let mut imu = imu(&board);
        let mut baro = Lps22hh::new(SensorHub::new(&mut imu, LPS22HH_ADDRESS, SENSOR), 8);

        assert_eq!(baro.read_pressure_raw(), Ok(-4096));
    }

    #[test]
    fn test_status_read_through_hub_reports_overrun() {
        let board = SimBoard::new();
        board.set_baro_register(regs::STATUS, 0x11);
        let mut imu = imu(&board);
        let mut baro = Lps22hh::new(SensorHub::new(&mut imu, LPS22HH_ADDRESS, SENSOR), 8);

        let status = baro.status().unwrap();
        assert!(status.pressure_ready);
        assert!(status.pressure_overrun);
        assert!(!status.temperature_ready);
        assert!(!status.all_ready());
    }

    #[test]
    fn test_status_bits() {
        let status = BaroStatus::from_bits(0x33);
        assert!(status.all_ready());
        assert!(status.pressure_overrun);
        assert!(status.temperature_overrun);
        assert!(!BaroStatus::from_bits(0x01).all_ready());
    }
}
