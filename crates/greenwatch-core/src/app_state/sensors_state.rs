//! Sensor ownership, boot and per-cycle reads

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{error, info, warn};

use crate::bring_up::BringUp;
use crate::config::{AdcConfig, Config};
use crate::sampling::SampleSource;
use crate::sensors::{
    AccelFullScale, BaroConfig, DirectDevice, GyroFullScale, LPS22HH_ADDRESS, LSM6DSO_ADDRESS,
    Lps22hh, Lsm6dso, SensorError, SensorHub,
};
use crate::storage::Channel;

type Imu<I> = Lsm6dso<DirectDevice<I>>;
type Baro<'a, I> = Lps22hh<SensorHub<'a, DirectDevice<I>>>;

/// All sensors on the board, reached over one bus.
///
/// The IMU owns the bus handle. The barometer only exists for the duration of
/// a read, borrowing the IMU as its proxy, so the two access paths can never
/// overlap.
pub struct SensorsState<I> {
    imu: Imu<I>,
    imu_ready: bool,
    baro_ready: bool,
    light_raw: Option<u16>,
    adc: AdcConfig,
}

impl<I: I2c> SensorsState<I> {
    pub fn new(bus: I, config: &Config) -> Self {
        Self {
            imu: Lsm6dso::new(
                DirectDevice::new(bus, LSM6DSO_ADDRESS, "LSM6DSO"),
                config.poll_limit,
            ),
            imu_ready: false,
            baro_ready: false,
            light_raw: None,
            adc: config.adc,
        }
    }

    fn baro(&mut self) -> Baro<'_, I> {
        let poll_limit = self.imu.poll_limit();
        Lps22hh::new(
            SensorHub::new(&mut self.imu, LPS22HH_ADDRESS, "LPS22HH"),
            poll_limit,
        )
    }

    fn setup_imu(&mut self) -> Result<(), SensorError> {
        self.imu.check_who_am_i()?;
        self.imu.reset()?;
        self.imu.configure_accel(1, AccelFullScale::G4, false)?;
        self.imu.configure_gyro(1, GyroFullScale::Dps500)?;
        self.imu.init_sensor_hub()
    }

    fn setup_baro(&mut self) -> Result<(), SensorError> {
        let mut baro = self.baro();
        baro.check_who_am_i()?;
        baro.reset()?;
        baro.configure(BaroConfig::default())
    }

    /// Identify, reset and configure both sensors, then wait for their data.
    ///
    /// A sensor that fails any step stays out of sampling; boot never aborts.
    pub fn boot<D: DelayNs>(&mut self, config: &Config, delay: &mut D) {
        let imu_setup = self.setup_imu();
        if let Err(e) = &imu_setup {
            error!("IMU setup failed: {}", e);
        }

        // The barometer is only reachable through the IMU's sensor hub
        let baro_setup = match imu_setup {
            Ok(()) => self.setup_baro(),
            Err(e) => Err(e),
        };
        if let Err(e) = &baro_setup {
            error!("Barometer setup failed: {}", e);
        }

        if imu_setup.is_ok() {
            let imu = &mut self.imu;
            self.imu_ready = BringUp::new("LSM6DSO", config.bring_up)
                .run(|| imu.status().map(|s| s.all_ready()), delay);
        }
        if baro_setup.is_ok() {
            let mut baro = self.baro();
            let ready = BringUp::new("LPS22HH", config.bring_up)
                .run(|| baro.status().map(|s| s.all_ready()), delay);
            self.baro_ready = ready;
        }

        if self.imu_ready {
            self.self_test();
        }
        info!(
            "Sensors: IMU {}, barometer {}",
            if self.imu_ready { "ready" } else { "unavailable" },
            if self.baro_ready { "ready" } else { "unavailable" }
        );
    }

    /// Log one reading of every IMU channel.
    fn self_test(&mut self) {
        match self.imu.read_accel_mg() {
            Ok([x, y, z]) => info!("Acceleration: {:.3}, {:.3}, {:.3} mg", x, y, z),
            Err(e) => warn!("Self test: {}", e),
        }
        match self.imu.read_gyro_mdps() {
            Ok([x, y, z]) => info!("Angular rate: {:.3}, {:.3}, {:.3} mdps", x, y, z),
            Err(e) => warn!("Self test: {}", e),
        }
        match self.imu.read_temperature_celsius() {
            Ok(t) => info!("IMU temperature: {:.3} *C", t),
            Err(e) => warn!("Self test: {}", e),
        }
    }

    pub const fn imu_ready(&self) -> bool {
        self.imu_ready
    }

    pub const fn baro_ready(&self) -> bool {
        self.baro_ready
    }

    /// Latest ADC conversion, as delivered by the ADC interrupt.
    pub fn set_light_raw(&mut self, raw: Option<u16>) {
        self.light_raw = raw;
    }

    pub fn read_temperature(&mut self) -> Result<f32, SensorError> {
        self.baro().read_temperature_celsius()
    }

    pub fn read_pressure(&mut self) -> Result<f32, SensorError> {
        self.baro().read_pressure_hpa()
    }

    pub fn read_light(&self) -> Option<f32> {
        self.light_raw.map(|raw| self.adc.to_volts(raw as u32))
    }
}

impl<I: I2c> SampleSource for SensorsState<I> {
    fn sample(&mut self, channel: Channel) -> Option<f32> {
        let reading = match channel {
            Channel::Temperature | Channel::Pressure if !self.baro_ready => return None,
            Channel::Temperature => self.read_temperature(),
            Channel::Pressure => self.read_pressure(),
            Channel::Light => return self.read_light(),
        };

        reading
            .map_err(|e| warn!("{} unavailable this cycle: {}", channel.label(), e))
            .ok()
    }
}
