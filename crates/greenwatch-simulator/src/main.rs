//! Host simulator for the GreenWatch real-time core.
//!
//! Runs the core against a register-level model of the sensor board. The
//! terminal stands in for the UI serial port: type a menu key (or a value
//! while editing a setting) and press Enter. Diagnostics go to stderr through
//! `env_logger`; set `RUST_LOG=debug` for per-cycle detail.
//!
//! Settings are read from a TOML file (`greenwatch.toml` in the working
//! directory, or the path in `GREENWATCH_CONFIG`) using the field names of
//! [`Config`]; missing fields keep their defaults:
//!
//! ```toml
//! sample_interval = 2
//! tick_ms = 500
//!
//! [bring_up]
//! retry_count = 5
//! ```
//!
//! Single values can then be overridden from the environment or a `.env` file:
//!
//! | Variable                      | Meaning                        |
//! |-------------------------------|--------------------------------|
//! | `GREENWATCH_SAMPLE_INTERVAL`  | Ticks between logged samples   |
//! | `GREENWATCH_LOG_DEPTH`        | Samples kept per log           |
//! | `GREENWATCH_TICK_MS`          | Sampling timer period          |
//! | `GREENWATCH_POLL_LIMIT`       | Status polls per hub access    |
//! | `GREENWATCH_BRING_UP_RETRIES` | Readiness polls at boot        |
//! | `GREENWATCH_BRING_UP_BACKOFF` | Wait between readiness polls   |
//!
//! Press Ctrl-D to quit.

use std::io::{BufRead, Write as _};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use embedded_io::{ErrorType, Read, ReadReady};
use log::{debug, error, info, warn};

use greenwatch_core::app_state::{
    Adc, AppState, InterruptHandlers, PeriodicTimer, Platform, SERIAL_RX, Signals, WORK_ITEMS,
    start_interrupt_sources,
};
use greenwatch_core::config::{AdcConfig, Config};
use greenwatch_core::menu::{MenuView, Render, RenderAction, SettingField};
use greenwatch_core::sensors::sim::{SimBoard, SimBus};
use greenwatch_core::storage::Channel;
use greenwatch_core::work_queue::WorkQueue;

// ---------------------------------------------------------------------------
// Interrupt-shared state
// ---------------------------------------------------------------------------

type App = AppState<SimBus, StdinSerial, TerminalRenderer>;

static SIGNALS: Signals = Signals::new();
static WORK: WorkQueue<App, WORK_ITEMS> = WorkQueue::new(App::WORK_CALLBACKS);

/// Raw ADC code of the simulated light sensor, written by the main thread.
static LIGHT_LEVEL: AtomicU16 = AtomicU16::new(0);

/// Cleared when stdin closes.
static RUNNING: AtomicBool = AtomicBool::new(true);

fn on_timer() {
    SIGNALS.on_timer_tick();
}

fn on_adc_sample(raw: u16) {
    SIGNALS.on_adc_sample(raw);
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

fn env_override<T: FromStr>(name: &str, target: &mut T) {
    let Ok(value) = std::env::var(name) else {
        return;
    };
    match value.trim().parse() {
        Ok(parsed) => *target = parsed,
        Err(_) => warn!("Ignoring {}={:?}: not a valid value", name, value),
    }
}

const DEFAULT_CONFIG_PATH: &str = "greenwatch.toml";

fn parse_config(text: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(text)
}

fn read_config_file() -> Config {
    let (path, explicit) = match std::env::var("GREENWATCH_CONFIG") {
        Ok(path) => (path, true),
        Err(_) => (DEFAULT_CONFIG_PATH.to_owned(), false),
    };

    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
            return Config::default();
        }
        Err(e) => {
            warn!("Failed to read {}: {}; using defaults", path, e);
            return Config::default();
        }
    };

    match parse_config(&text) {
        Ok(config) => {
            info!("Loaded configuration from {}", path);
            config
        }
        Err(e) => {
            warn!("Invalid configuration in {}: {}; using defaults", path, e);
            Config::default()
        }
    }
}

fn load_config() -> Config {
    match dotenvy::dotenv() {
        Ok(path) => info!("Loaded overrides from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Failed to read .env: {}", e),
    }

    let mut config = read_config_file();
    env_override("GREENWATCH_SAMPLE_INTERVAL", &mut config.sample_interval);
    env_override("GREENWATCH_LOG_DEPTH", &mut config.log_depth);
    env_override("GREENWATCH_TICK_MS", &mut config.tick_ms);
    env_override("GREENWATCH_POLL_LIMIT", &mut config.poll_limit);
    env_override("GREENWATCH_BRING_UP_RETRIES", &mut config.bring_up.retry_count);
    env_override("GREENWATCH_BRING_UP_BACKOFF", &mut config.bring_up.backoff_ms);

    let config = config.sanitized();
    match toml::to_string(&config) {
        Ok(text) => debug!("Effective configuration:\n{}", text),
        Err(e) => warn!("Failed to format configuration: {}", e),
    }
    config
}

// ---------------------------------------------------------------------------
// Peripheral stand-ins
// ---------------------------------------------------------------------------

/// Blocking delay on the host clock.
struct HostDelay;

impl DelayNs for HostDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(ns as u64));
    }
}

/// Periodic timer backed by a thread that calls the handler as its "interrupt".
struct ThreadTimer;

impl PeriodicTimer for ThreadTimer {
    type Error = std::io::Error;

    fn start_periodic(&mut self, interval_ms: u32, on_expiry: fn()) -> Result<(), Self::Error> {
        let period = Duration::from_millis(interval_ms as u64);
        thread::Builder::new()
            .name("timer".into())
            .spawn(move || {
                loop {
                    thread::sleep(period);
                    on_expiry();
                }
            })
            .map(|_| ())
    }
}

/// ADC converting [`LIGHT_LEVEL`] on a thread.
struct ThreadAdc;

impl Adc for ThreadAdc {
    type Error = std::io::Error;

    fn start_periodic(
        &mut self,
        config: &AdcConfig,
        on_sample: fn(u16),
    ) -> Result<(), Self::Error> {
        let period = Duration::from_millis(config.interval_ms as u64);
        thread::Builder::new()
            .name("adc".into())
            .spawn(move || {
                loop {
                    on_sample(LIGHT_LEVEL.load(Ordering::Relaxed));
                    thread::sleep(period);
                }
            })
            .map(|_| ())
    }
}

/// UI serial port fed line by line from stdin.
///
/// A reader thread plays the receive interrupt: every line it forwards also
/// submits the serial work item.
struct StdinSerial {
    lines: Receiver<Vec<u8>>,
    pending: Option<Vec<u8>>,
}

impl StdinSerial {
    fn spawn() -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new().name("uart-rx".into()).spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().split(b'\n') {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
                WORK.submit(SERIAL_RX);
            }
            RUNNING.store(false, Ordering::Release);
        })?;

        Ok(Self {
            lines: rx,
            pending: None,
        })
    }
}

impl ErrorType for StdinSerial {
    type Error = embedded_io::ErrorKind;
}

impl ReadReady for StdinSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        if self.pending.is_none() {
            match self.lines.try_recv() {
                Ok(line) => self.pending = Some(line),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
            }
        }
        Ok(self.pending.is_some())
    }
}

impl Read for StdinSerial {
    /// Hand out at most one line per call so each line is one menu input.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if !self.read_ready()? {
            return Ok(0);
        }
        let Some(mut line) = self.pending.take() else {
            return Ok(0);
        };

        let count = line.len().min(buf.len());
        buf[..count].copy_from_slice(&line[..count]);
        if count < line.len() {
            self.pending = Some(line.split_off(count));
        }
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

const RULE: &str = "------------------------------------------";

/// Draws menu pages on stdout the way a serial terminal would show them.
struct TerminalRenderer {
    out: std::io::Stdout,
}

impl TerminalRenderer {
    fn reading(&mut self, channel: Channel, value: Option<f32>) -> std::io::Result<()> {
        let label = format!("{}:", channel.label());
        match value {
            Some(v) => writeln!(self.out, "{:<15}{:.3} [{}]", label, v, channel.unit()),
            None => writeln!(self.out, "{:<15}unavailable", label),
        }
    }

    fn draw(&mut self, action: RenderAction, view: &MenuView<'_>) -> std::io::Result<()> {
        // Clear screen, cursor home
        write!(self.out, "\x1b[2J\x1b[H")?;
        writeln!(self.out, "{}", RULE)?;

        match action {
            RenderAction::TopMenu => {
                writeln!(self.out, "{:-^42}", "GreenWatch")?;
                writeln!(self.out, "{}", RULE)?;
                writeln!(self.out, "[1] - Temperature Report - Current")?;
                writeln!(self.out, "[2] - Temperature Report - Logged data")?;
                writeln!(self.out, "[3] - Pressure Report - Current")?;
                writeln!(self.out, "[4] - Pressure Report - Logged data")?;
                writeln!(self.out, "[5] - Ambient Light Report - Current")?;
                writeln!(self.out, "[6] - Ambient Light Report - Logged data")?;
                writeln!(self.out, "[7] - Full Report - Current")?;
                writeln!(self.out, "[8] - Settings")?;
            }
            RenderAction::Current(channel) => {
                self.reading(channel, view.current(channel))?;
                writeln!(self.out, "[X] - Go back")?;
            }
            RenderAction::Log(channel) => {
                writeln!(self.out, "{} log:", channel.label())?;
                writeln!(self.out, "{}", RULE)?;
                for entry in view.log_entries(channel) {
                    writeln!(
                        self.out,
                        "T-{:>6.1} s:     {:.3} [{}]",
                        entry.age_ms as f32 / 1000.0,
                        entry.value,
                        channel.unit()
                    )?;
                }
                writeln!(self.out, "{}", RULE)?;
                writeln!(self.out, "[X] - Go back")?;
            }
            RenderAction::FullReport => {
                for channel in Channel::ALL {
                    self.reading(channel, view.current(channel))?;
                }
                writeln!(self.out, "[X] - Go back")?;
            }
            RenderAction::Settings => {
                writeln!(self.out, "[1] - Change logging interval")?;
                writeln!(self.out, "[2] - Change no. logged data display")?;
                writeln!(self.out, "[X] - Go back")?;
            }
            RenderAction::Edit(field) => {
                let range = field.range();
                let unit = match field {
                    SettingField::SampleInterval => "s",
                    SettingField::LogDepth => "samples",
                };
                writeln!(
                    self.out,
                    "Current {}: {} {}",
                    field.label(),
                    view.setting(field),
                    unit
                )?;
                writeln!(self.out, "Enter a value from {} to {}.", range.min, range.max)?;
                writeln!(self.out, "A valid value returns you to the previous menu.")?;
                writeln!(self.out, "[X] - Go back")?;
            }
        }

        writeln!(self.out, "{}", RULE)?;
        self.out.flush()
    }
}

impl Render for TerminalRenderer {
    type Error = std::io::Error;

    fn render(&mut self, action: RenderAction, view: &MenuView<'_>) -> Result<(), Self::Error> {
        self.draw(action, view)
    }
}

// ---------------------------------------------------------------------------
// Simulated environment
// ---------------------------------------------------------------------------

/// Wait-for-interrupt on the host: a short sleep, after which the board's
/// sensor outputs follow a slowly varying synthetic environment.
struct HostPlatform {
    board: SimBoard,
    started: Instant,
}

impl HostPlatform {
    fn update_environment(&self) {
        let t = self.started.elapsed().as_secs_f64();

        // 18-24 °C, 1005-1021 hPa, light following a fast "cloud" cycle
        let celsius = 21.0 + 3.0 * (t / 90.0).sin() + 0.3 * (t / 7.0).cos();
        let hpa = 1013.0 + 8.0 * (t / 240.0).sin();
        let light = 0.5 + 0.4 * (t / 30.0).sin();

        self.board.set_baro_temperature_raw((celsius * 100.0) as i16);
        self.board.set_baro_pressure_raw((hpa * 4096.0) as i32);
        self.board.set_imu_temperature_raw(((celsius - 25.0) * 256.0) as i16);
        self.board.set_accel_raw([12, -8, 8190]);
        self.board.set_gyro_raw([3, -2, 1]);
        self.board.set_light_raw((light * 4095.0) as u16);
        LIGHT_LEVEL.store(self.board.light_raw(), Ordering::Relaxed);
    }
}

impl Platform for HostPlatform {
    fn wait_for_interrupt(&mut self) {
        thread::sleep(Duration::from_millis(10));
        self.update_environment();
    }

    fn keep_running(&self) -> bool {
        RUNNING.load(Ordering::Acquire)
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();
    info!("Starting GreenWatch simulator");

    let config = load_config();
    info!(
        "Sampling every {} ms, logging every {} ticks, {} samples per log",
        config.tick_ms, config.sample_interval, config.log_depth
    );

    let board = SimBoard::new();
    let mut platform = HostPlatform {
        board: board.clone(),
        started: Instant::now(),
    };
    platform.update_environment();

    let serial = match StdinSerial::spawn() {
        Ok(serial) => serial,
        Err(e) => {
            error!("Failed to open the UI serial port: {}", e);
            return;
        }
    };
    let renderer = TerminalRenderer {
        out: std::io::stdout(),
    };

    let mut app = App::new(board.bus(), serial, renderer, &SIGNALS, config);
    app.boot(&mut HostDelay);

    let handlers = InterruptHandlers {
        on_timer,
        on_adc_sample,
    };
    let started = start_interrupt_sources(&mut ThreadTimer, &mut ThreadAdc, &app.config, handlers);
    if let Err(e) = started {
        error!("{}", e);
        return;
    }

    app.run(&WORK, &mut platform);
    if let Some(e) = app.last_error() {
        warn!("Last error during the run: {}", e);
    }
    info!("Simulator exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = parse_config(
            r#"
            sample_interval = 2
            tick_ms = 500

            [bring_up]
            retry_count = 5
            "#,
        )
        .unwrap();

        let defaults = Config::default();
        assert_eq!(config.sample_interval, 2);
        assert_eq!(config.tick_ms, 500);
        assert_eq!(config.bring_up.retry_count, 5);
        assert_eq!(config.bring_up.backoff_ms, defaults.bring_up.backoff_ms);
        assert_eq!(config.log_depth, defaults.log_depth);
        assert_eq!(config.adc, defaults.adc);
    }

    #[test]
    fn test_config_with_wrong_type_is_rejected() {
        assert!(parse_config("log_depth = \"deep\"").is_err());
    }

    #[test]
    fn test_formatted_config_reads_back() {
        let config = Config {
            log_depth: 7,
            ..Config::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert_eq!(parse_config(&text).unwrap(), config);
    }
}
