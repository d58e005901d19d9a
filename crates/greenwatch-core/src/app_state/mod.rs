//! Application-wide state and error types for GreenWatch

mod hardware;
mod sensors_state;

pub use hardware::*;
pub use sensors_state::*;

use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use embedded_io::{Read, ReadReady};
use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use crate::config::Config;
use crate::menu::{Menu, MenuView, Render, SettingChange};
use crate::sampling::Sampler;
use crate::work_queue::{WorkId, WorkQueue};

/// Bytes taken from the serial port per menu input chunk.
pub const SERIAL_CHUNK: usize = 32;

/// Serial receive interrupt work item.
pub const SERIAL_RX: WorkId = WorkId::new(0);

/// Number of deferred work items.
pub const WORK_ITEMS: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppRunState {
    Uninitialized,
    /// Running with every sensor available
    Running,
    /// Running with at least one sensor left out after bring-up
    Degraded,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppError {
    #[error("Serial error: {0:?}")]
    Serial(embedded_io::ErrorKind),
    #[error("Failed to start the sampling timer")]
    Timer,
    #[error("Failed to start the ADC")]
    Adc,
    #[error("Failed to render the menu")]
    Render,
}

/// State shared with interrupt handlers.
///
/// Handlers only store into these atomics; the main loop takes them.
pub struct Signals {
    sample_due: AtomicBool,
    light_valid: AtomicBool,
    light_raw: AtomicU16,
}

impl Default for Signals {
    fn default() -> Self {
        Self::new()
    }
}

impl Signals {
    pub const fn new() -> Self {
        Self {
            sample_due: AtomicBool::new(false),
            light_valid: AtomicBool::new(false),
            light_raw: AtomicU16::new(0),
        }
    }

    /// Sampling timer interrupt.
    pub fn on_timer_tick(&self) {
        self.sample_due.store(true, Ordering::Release);
    }

    /// ADC completion interrupt.
    pub fn on_adc_sample(&self, raw: u16) {
        self.light_raw.store(raw, Ordering::Relaxed);
        self.light_valid.store(true, Ordering::Release);
    }

    /// Clear the sampling flag, returning whether it was set.
    pub fn take_sample_due(&self) -> bool {
        self.sample_due.swap(false, Ordering::AcqRel)
    }

    pub fn latest_light_raw(&self) -> Option<u16> {
        self.light_valid
            .load(Ordering::Acquire)
            .then(|| self.light_raw.load(Ordering::Relaxed))
    }
}

/// Main application state container
///
/// Owned by the main loop and handed to every work item. Nothing in here is
/// touched from interrupt context.
pub struct AppState<I, S, R> {
    pub run_state: AppRunState,
    pub config: Config,
    pub sensors: SensorsState<I>,
    pub sampler: Sampler,
    pub menu: Menu,
    serial: S,
    renderer: R,
    signals: &'static Signals,
    last_error: Option<AppError>,
}

impl<I, S, R> AppState<I, S, R>
where
    I: I2c,
    S: Read + ReadReady,
    R: Render,
{
    /// Work item callbacks, indexed by [`WorkId`].
    pub const WORK_CALLBACKS: [fn(&mut Self); WORK_ITEMS] = [Self::on_serial_rx];

    pub fn new(bus: I, serial: S, renderer: R, signals: &'static Signals, config: Config) -> Self {
        let config = config.sanitized();
        Self {
            run_state: AppRunState::Uninitialized,
            sensors: SensorsState::new(bus, &config),
            sampler: Sampler::new(config.log_depth as usize),
            menu: Menu::new(),
            config,
            serial,
            renderer,
            signals,
            last_error: None,
        }
    }

    /// Bring the sensors up and draw the first menu page.
    pub fn boot<D: DelayNs>(&mut self, delay: &mut D) {
        info!("GreenWatch real-time core starting");
        self.sensors.boot(&self.config, delay);

        self.run_state = if self.sensors.imu_ready() && self.sensors.baro_ready() {
            AppRunState::Running
        } else {
            AppRunState::Degraded
        };
        info!("Run state: {:?}", self.run_state);

        self.render();
    }

    /// Serial receive work: feed every pending byte to the menu.
    fn on_serial_rx(&mut self) {
        let mut chunk = [0u8; SERIAL_CHUNK];
        loop {
            match self.serial.read_ready() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    self.record(AppError::Serial(embedded_io::Error::kind(&e)));
                    break;
                }
            }

            let count = match self.serial.read(&mut chunk) {
                Ok(0) => break,
                Ok(count) => count,
                Err(e) => {
                    self.record(AppError::Serial(embedded_io::Error::kind(&e)));
                    break;
                }
            };
            if let Some(change) = self.menu.handle_input(&chunk[..count]) {
                self.apply(change);
            }
        }
    }

    fn apply(&mut self, change: SettingChange) {
        match change {
            SettingChange::SampleInterval(interval) => self.config.sample_interval = interval,
            SettingChange::LogDepth(depth) => {
                self.config.log_depth = depth;
                self.sampler.request_depth(depth as usize);
            }
        }
    }

    fn record(&mut self, err: AppError) {
        error!("{}", err);
        self.last_error = Some(err);
    }

    pub fn last_error(&self) -> Option<AppError> {
        self.last_error
    }

    /// Draw the menu if it needs it.
    pub fn render(&mut self) {
        let view = MenuView::new(self.sampler.live(), self.sampler.logs(), &self.config);
        if self.menu.render(&mut self.renderer, &view).is_err() {
            self.record(AppError::Render);
        }
    }

    /// One main-loop pass: deferred work, sampling, then drawing.
    pub fn service(&mut self, work: &WorkQueue<Self, WORK_ITEMS>) {
        let ran = work.drain_all(self);
        if ran > 0 {
            debug!("Ran {} work items", ran);
        }

        if self.signals.take_sample_due() {
            self.sensors.set_light_raw(self.signals.latest_light_raw());
            self.sampler
                .on_tick(&mut self.sensors, self.config.sample_interval);
            if self.menu.state().shows_live_values() {
                self.menu.mark_dirty();
            }
        }

        self.render();
    }

    /// Sleep, service, repeat.
    pub fn run<P: Platform>(&mut self, work: &WorkQueue<Self, WORK_ITEMS>, platform: &mut P) {
        while platform.keep_running() {
            platform.wait_for_interrupt();
            self.service(work);
        }
        warn!("Main loop stopped");
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn serial_mut(&mut self) -> &mut S {
        &mut self.serial
    }
}
