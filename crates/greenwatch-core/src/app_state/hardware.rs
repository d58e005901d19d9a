//! Interrupt sources and idle handling
//!
//! The peripheral drivers of the target are consumed through these traits.
//! Handlers registered here run in interrupt context and must only touch
//! [`Signals`](super::Signals) or submit work items.

use core::fmt::Debug;

use log::{error, info};

use super::AppError;
use crate::config::{AdcConfig, Config};

/// Periodic hardware timer.
pub trait PeriodicTimer {
    type Error: Debug;

    /// Call `on_expiry` from interrupt context every `interval_ms`.
    fn start_periodic(&mut self, interval_ms: u32, on_expiry: fn()) -> Result<(), Self::Error>;
}

/// Free-running ADC.
pub trait Adc {
    type Error: Debug;

    /// Convert the channels in `config.channel_mask` every `config.interval_ms`
    /// and hand each result to `on_sample` from interrupt context.
    fn start_periodic(
        &mut self,
        config: &AdcConfig,
        on_sample: fn(u16),
    ) -> Result<(), Self::Error>;
}

/// Core-level services of the target.
pub trait Platform {
    /// Sleep until the next interrupt.
    fn wait_for_interrupt(&mut self);

    /// Whether the main loop should keep going. The firmware never stops.
    fn keep_running(&self) -> bool {
        true
    }
}

/// Interrupt handlers the target wires to its static [`Signals`](super::Signals).
#[derive(Clone, Copy)]
pub struct InterruptHandlers {
    pub on_timer: fn(),
    pub on_adc_sample: fn(u16),
}

/// Start the sampling timer and the light ADC.
pub fn start_interrupt_sources<T: PeriodicTimer, A: Adc>(
    timer: &mut T,
    adc: &mut A,
    config: &Config,
    handlers: InterruptHandlers,
) -> Result<(), AppError> {
    adc.start_periodic(&config.adc, handlers.on_adc_sample)
        .map_err(|e| {
            error!("Failed to start ADC: {:?}", e);
            AppError::Adc
        })?;
    info!(
        "ADC running: channel mask {:#x}, every {} ms",
        config.adc.channel_mask, config.adc.interval_ms
    );

    timer
        .start_periodic(config.tick_ms, handlers.on_timer)
        .map_err(|e| {
            error!("Failed to start sampling timer: {:?}", e);
            AppError::Timer
        })?;
    info!("Sampling timer running every {} ms", config.tick_ms);

    Ok(())
}
