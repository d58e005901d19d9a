//! LSM6DSO 6-axis IMU
//!
//! Register names follow the LSM6DSO datasheet
//! (<https://www.st.com/resource/en/datasheet/lsm6dso.pdf>).

use super::{RegisterAccess, SensorError, le_i16, wait_for_bits};
use log::{debug, info};

/// 7-bit bus address with SA0 tied to ground.
pub const LSM6DSO_ADDRESS: u8 = 0x6A;

/// Fixed content of `WHO_AM_I`.
pub const LSM6DSO_WHO_AM_I: u8 = 0x6C;

const SENSOR: &str = "LSM6DSO";

/// Main-bank registers.
pub mod regs {
    pub const FUNC_CFG_ACCESS: u8 = 0x01;
    pub const PIN_CTRL: u8 = 0x02;
    pub const WHO_AM_I: u8 = 0x0F;
    pub const CTRL1_XL: u8 = 0x10;
    pub const CTRL2_G: u8 = 0x11;
    pub const CTRL3_C: u8 = 0x12;
    pub const CTRL8_XL: u8 = 0x17;
    pub const CTRL9_XL: u8 = 0x18;
    pub const STATUS_REG: u8 = 0x1E;
    pub const OUT_TEMP_L: u8 = 0x20;
    pub const OUT_TEMP_H: u8 = 0x21;
    pub const OUTX_L_G: u8 = 0x22;
    pub const OUTX_L_A: u8 = 0x28;
}

/// Sensor-hub bank registers, visible while `FUNC_CFG_ACCESS.SHUB_REG_ACCESS` is set.
pub mod hub_regs {
    pub const SENSOR_HUB_1: u8 = 0x02;
    pub const MASTER_CONFIG: u8 = 0x14;
    pub const SLV0_ADD: u8 = 0x15;
    pub const SLV0_SUBADD: u8 = 0x16;
    pub const SLAVE0_CONFIG: u8 = 0x17;
    pub const DATAWRITE_SLV0: u8 = 0x21;
    pub const STATUS_MASTER: u8 = 0x22;
}

/// `FUNC_CFG_ACCESS` bit selecting the sensor-hub bank.
pub const SHUB_REG_ACCESS: u8 = 1 << 6;
/// `CTRL3_C` software reset, cleared by hardware when done.
pub const SW_RESET: u8 = 1 << 0;
/// `CTRL8_XL` full-scale mode: code 1 means ±2 g instead of ±16 g.
pub const XL_FS_MODE: u8 = 1 << 1;
/// `CTRL9_XL` MIPI I3C interface disable.
pub const I3C_DISABLE: u8 = 1 << 1;

/// `MASTER_CONFIG` bits.
pub const MASTER_ON: u8 = 1 << 2;
pub const SHUB_PU_EN: u8 = 1 << 3;
pub const WRITE_ONCE: u8 = 1 << 6;

/// `STATUS_MASTER` bits.
pub const SENS_HUB_ENDOP: u8 = 1 << 0;
pub const SLAVE0_NACK: u8 = 1 << 3;
pub const WR_ONCE_DONE: u8 = 1 << 7;

/// Decoded `STATUS_REG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImuStatus {
    pub accel_ready: bool,
    pub gyro_ready: bool,
    pub temperature_ready: bool,
}

impl ImuStatus {
    pub const fn from_bits(bits: u8) -> Self {
        Self {
            accel_ready: bits & 0x01 != 0,
            gyro_ready: bits & 0x02 != 0,
            temperature_ready: bits & 0x04 != 0,
        }
    }

    pub const fn all_ready(&self) -> bool {
        self.accel_ready && self.gyro_ready && self.temperature_ready
    }
}

/// Accelerometer full-scale selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelFullScale {
    G2,
    G4,
    G8,
    G16,
}

impl AccelFullScale {
    pub const fn from_g(g: u16) -> Option<Self> {
        match g {
            2 => Some(Self::G2),
            4 => Some(Self::G4),
            8 => Some(Self::G8),
            16 => Some(Self::G16),
            _ => None,
        }
    }

    /// `CTRL1_XL.FS_XL` code
    const fn code(self) -> u8 {
        match self {
            Self::G2 => 0,
            Self::G16 => 1,
            Self::G4 => 2,
            Self::G8 => 3,
        }
    }

    /// Sensitivity in mg/LSB for an `FS_XL` code and the `XL_FS_MODE` bit.
    pub const fn sensitivity(code: u8, fs_mode: bool) -> f32 {
        match code & 0x03 {
            0 => 0.061,
            1 if fs_mode => 0.061,
            1 => 0.488,
            2 => 0.122,
            _ => 0.244,
        }
    }
}

/// Gyroscope full-scale selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GyroFullScale {
    Dps125,
    Dps250,
    Dps500,
    Dps1000,
    Dps2000,
}

impl GyroFullScale {
    pub const fn from_dps(dps: u16) -> Option<Self> {
        match dps {
            125 => Some(Self::Dps125),
            250 => Some(Self::Dps250),
            500 => Some(Self::Dps500),
            1000 => Some(Self::Dps1000),
            2000 => Some(Self::Dps2000),
            _ => None,
        }
    }

    /// `CTRL2_G` bits 3:1 (`FS_G` and `FS_125`)
    const fn bits(self) -> u8 {
        match self {
            Self::Dps125 => 0b001 << 1,
            Self::Dps250 => 0b000 << 1,
            Self::Dps500 => 0b010 << 1,
            Self::Dps1000 => 0b100 << 1,
            Self::Dps2000 => 0b110 << 1,
        }
    }

    /// Sensitivity in mdps/LSB decoded from a `CTRL2_G` value.
    pub const fn sensitivity(ctrl2_g: u8) -> f32 {
        if ctrl2_g & 0x02 != 0 {
            return 4.375;
        }
        match (ctrl2_g >> 2) & 0x03 {
            0 => 8.75,
            1 => 17.5,
            2 => 35.0,
            _ => 70.0,
        }
    }
}

pub struct Lsm6dso<R> {
    regs: R,
    poll_limit: u32,
}

impl<R: RegisterAccess> Lsm6dso<R> {
    pub const fn new(regs: R, poll_limit: u32) -> Self {
        Self { regs, poll_limit }
    }

    pub fn poll_limit(&self) -> u32 {
        self.poll_limit
    }

    /// Issue a software reset and wait for the device to clear the bit.
    pub fn reset(&mut self) -> Result<(), SensorError> {
        self.regs.write_reg(regs::CTRL3_C, SW_RESET)?;
        wait_for_bits(
            &mut self.regs,
            regs::CTRL3_C,
            SW_RESET,
            false,
            self.poll_limit,
            "software reset",
        )?;
        info!("{}: reset complete", SENSOR);
        Ok(())
    }

    pub fn check_who_am_i(&mut self) -> Result<(), SensorError> {
        let found = self.regs.read_reg(regs::WHO_AM_I)?;
        if found != LSM6DSO_WHO_AM_I {
            return Err(SensorError::IdentityMismatch {
                sensor: SENSOR,
                expected: LSM6DSO_WHO_AM_I,
                found,
            });
        }
        Ok(())
    }

    /// Configure output data rate (4-bit code), full scale and LPF2 of the accelerometer.
    pub fn configure_accel(
        &mut self,
        odr: u8,
        full_scale: AccelFullScale,
        lpf2: bool,
    ) -> Result<(), SensorError> {
        if odr >> 4 != 0 {
            return Err(SensorError::InvalidArgument {
                sensor: SENSOR,
                operation: "accelerometer output data rate",
            });
        }
        let value = (odr << 4) | (full_scale.code() << 2) | ((lpf2 as u8) << 1);
        self.regs.write_reg(regs::CTRL1_XL, value)
    }

    /// Configure output data rate (4-bit code) and full scale of the gyroscope.
    pub fn configure_gyro(
        &mut self,
        odr: u8,
        full_scale: GyroFullScale,
    ) -> Result<(), SensorError> {
        if odr >> 4 != 0 {
            return Err(SensorError::InvalidArgument {
                sensor: SENSOR,
                operation: "gyroscope output data rate",
            });
        }
        self.regs
            .write_reg(regs::CTRL2_G, (odr << 4) | full_scale.bits())
    }

    pub fn status(&mut self) -> Result<ImuStatus, SensorError> {
        self.regs
            .read_reg(regs::STATUS_REG)
            .map(ImuStatus::from_bits)
    }

    pub fn read_temperature_raw(&mut self) -> Result<i16, SensorError> {
        let low = self.regs.read_reg(regs::OUT_TEMP_L)?;
        let high = self.regs.read_reg(regs::OUT_TEMP_H)?;
        Ok(le_i16(low, high))
    }

    /// Die temperature in °C (256 LSB/°C, zero at 25 °C).
    pub fn read_temperature_celsius(&mut self) -> Result<f32, SensorError> {
        let raw = self.read_temperature_raw()?;
        Ok(raw as f32 / 256.0 + 25.0)
    }

    fn read_axes(&mut self, first: u8) -> Result<[i16; 3], SensorError> {
        let mut axes = [0i16; 3];
        for (i, axis) in axes.iter_mut().enumerate() {
            let reg = first + 2 * i as u8;
            let low = self.regs.read_reg(reg)?;
            let high = self.regs.read_reg(reg + 1)?;
            *axis = le_i16(low, high);
        }
        Ok(axes)
    }

    pub fn read_accel_raw(&mut self) -> Result<[i16; 3], SensorError> {
        self.read_axes(regs::OUTX_L_A)
    }

    pub fn read_gyro_raw(&mut self) -> Result<[i16; 3], SensorError> {
        self.read_axes(regs::OUTX_L_G)
    }

    /// Linear acceleration in mg, scaled by the full scale currently configured.
    pub fn read_accel_mg(&mut self) -> Result<[f32; 3], SensorError> {
        let ctrl1_xl = self.regs.read_reg(regs::CTRL1_XL)?;
        let ctrl8_xl = self.regs.read_reg(regs::CTRL8_XL)?;
        let scale = AccelFullScale::sensitivity(ctrl1_xl >> 2, ctrl8_xl & XL_FS_MODE != 0);
        debug!("{}: accelerometer sensitivity {} mg/LSB", SENSOR, scale);

        let raw = self.read_accel_raw()?;
        Ok(raw.map(|v| v as f32 * scale))
    }

    /// Angular rate in mdps, scaled by the full scale currently configured.
    pub fn read_gyro_mdps(&mut self) -> Result<[f32; 3], SensorError> {
        let ctrl2_g = self.regs.read_reg(regs::CTRL2_G)?;
        let scale = GyroFullScale::sensitivity(ctrl2_g);

        let raw = self.read_gyro_raw()?;
        Ok(raw.map(|v| v as f32 * scale))
    }

    /// Turn off the MIPI I3C interface so the auxiliary pins serve the sensor hub.
    pub fn disable_i3c(&mut self) -> Result<(), SensorError> {
        self.regs
            .update_reg(regs::CTRL9_XL, |v| v | I3C_DISABLE)
            .map(|_| ())
    }

    /// Run `f` with the sensor-hub bank selected.
    ///
    /// The bank is left again whether or not `f` succeeds, so direct accesses
    /// after this call always see the main bank. The first error wins.
    pub fn with_hub_bank<T>(
        &mut self,
        f: impl FnOnce(&mut R, u32) -> Result<T, SensorError>,
    ) -> Result<T, SensorError> {
        self.regs.write_reg(regs::FUNC_CFG_ACCESS, SHUB_REG_ACCESS)?;
        let result = f(&mut self.regs, self.poll_limit);
        let left = self.regs.write_reg(regs::FUNC_CFG_ACCESS, 0);
        let value = result?;
        left?;
        Ok(value)
    }

    /// Prepare the embedded I2C master: I3C off, internal pull-ups on, master idle.
    pub fn init_sensor_hub(&mut self) -> Result<(), SensorError> {
        self.disable_i3c()?;
        self.with_hub_bank(|regs, _| regs.write_reg(hub_regs::MASTER_CONFIG, SHUB_PU_EN))?;
        info!("{}: sensor hub ready", SENSOR);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::DirectDevice;
    use crate::sensors::sim::{BusOp, SimBoard};

    fn imu(board: &SimBoard) -> Lsm6dso<DirectDevice<crate::sensors::sim::SimBus>> {
        Lsm6dso::new(
            DirectDevice::new(board.bus(), LSM6DSO_ADDRESS, "LSM6DSO"),
            10,
        )
    }

    #[test]
    fn test_who_am_i() {
        let board = SimBoard::new();
        assert_eq!(imu(&board).check_who_am_i(), Ok(()));

        board.set_imu_register(regs::WHO_AM_I, 0x69);
        assert_eq!(
            imu(&board).check_who_am_i(),
            Err(SensorError::IdentityMismatch {
                sensor: "LSM6DSO",
                expected: 0x6C,
                found: 0x69
            })
        );
    }

    #[test]
    fn test_reset_polls_until_bit_clears() {
        let board = SimBoard::new();
        board.set_imu_reset_latency(3);

        assert_eq!(imu(&board).reset(), Ok(()));

        let ops = board.ops();
        assert_eq!(
            ops[0],
            BusOp::Write {
                address: LSM6DSO_ADDRESS,
                reg: regs::CTRL3_C,
                value: SW_RESET
            }
        );
        // Three reads with the bit still set, then the one that sees it clear
        assert_eq!(ops.len(), 1 + 4);
    }

    #[test]
    fn test_reset_gives_up_when_bit_never_clears() {
        let board = SimBoard::new();
        board.set_imu_reset_latency(u32::MAX);

        assert!(matches!(
            imu(&board).reset(),
            Err(SensorError::Timeout { .. })
        ));
    }

    #[test]
    fn test_configure_accel_encodes_full_scale() {
        let board = SimBoard::new();
        imu(&board)
            .configure_accel(1, AccelFullScale::G4, false)
            .unwrap();
        assert_eq!(board.imu_register(regs::CTRL1_XL), 0x18);

        assert!(matches!(
            imu(&board).configure_accel(0x10, AccelFullScale::G2, false),
            Err(SensorError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_accel_scale_follows_current_full_scale() {
        let board = SimBoard::new();
        board.set_accel_raw([1000, -1000, 2000]);
        let mut imu = imu(&board);

        imu.configure_accel(1, AccelFullScale::G2, false).unwrap();
        let at_2g = imu.read_accel_mg().unwrap();
        assert!((at_2g[0] - 61.0).abs() < 1e-3);

        // Reconfigured behind the driver's back: the next read must notice
        board.set_imu_register(regs::CTRL1_XL, (1 << 4) | (2 << 2));
        let at_4g = imu.read_accel_mg().unwrap();
        assert!((at_4g[0] - 122.0).abs() < 1e-3);
        assert!((at_4g[1] + 122.0).abs() < 1e-3);
        assert!((at_4g[2] - 244.0).abs() < 1e-3);
    }

    #[test]
    fn test_accel_16g_code_honours_fs_mode() {
        assert_eq!(AccelFullScale::sensitivity(1, false), 0.488);
        assert_eq!(AccelFullScale::sensitivity(1, true), 0.061);
    }

    #[test]
    fn test_gyro_reads_gyro_registers_with_its_own_scale() {
        let board = SimBoard::new();
        board.set_gyro_raw([100, 0, -100]);
        board.set_accel_raw([1, 1, 1]);
        let mut imu = imu(&board);

        imu.configure_gyro(1, GyroFullScale::Dps500).unwrap();
        let rate = imu.read_gyro_mdps().unwrap();
        assert!((rate[0] - 1750.0).abs() < 1e-3);
        assert!((rate[2] + 1750.0).abs() < 1e-3);

        imu.configure_gyro(1, GyroFullScale::Dps125).unwrap();
        let rate = imu.read_gyro_mdps().unwrap();
        assert!((rate[0] - 437.5).abs() < 1e-3);
    }

    #[test]
    fn test_temperature_offset() {
        let board = SimBoard::new();
        board.set_imu_temperature_raw(512);
        let celsius = imu(&board).read_temperature_celsius().unwrap();
        assert!((celsius - 27.0).abs() < 1e-6);
    }

    #[test]
    fn test_failed_scaled_read_leaves_nothing_behind() {
        let board = SimBoard::new();
        board.set_accel_raw([10, 10, 10]);
        board.inject_nacks(1);

        let mut out = [0.0f32; 3];
        if let Ok(v) = imu(&board).read_accel_mg() {
            out = v;
        }
        assert_eq!(out, [0.0; 3]);
    }

    #[test]
    fn test_hub_bank_is_left_when_body_fails() {
        let board = SimBoard::new();
        let mut imu = imu(&board);

        let result: Result<(), _> = imu.with_hub_bank(|_, _| {
            Err(SensorError::Timeout {
                sensor: "test",
                operation: "body",
            })
        });

        assert!(result.is_err());
        assert_eq!(
            board.ops().last(),
            Some(&BusOp::Write {
                address: LSM6DSO_ADDRESS,
                reg: regs::FUNC_CFG_ACCESS,
                value: 0
            })
        );
        assert!(!board.in_hub_bank());
    }

    #[test]
    fn test_init_sensor_hub_disables_i3c_and_enables_pull_ups() {
        let board = SimBoard::new();
        imu(&board).init_sensor_hub().unwrap();

        assert_eq!(board.imu_register(regs::CTRL9_XL) & I3C_DISABLE, I3C_DISABLE);
        assert_eq!(board.hub_register(hub_regs::MASTER_CONFIG), SHUB_PU_EN);
        assert!(!board.in_hub_bank());
    }
}
