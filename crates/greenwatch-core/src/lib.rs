//! Hardware-independent real-time core for the GreenWatch sensor node
//!
//! This crate contains the logic that runs on the OS-less companion core:
//! the interrupt-safe deferred work queue, register-level sensor transactions
//! (including reaching the barometer through the IMU's sensor hub), sensor
//! bring-up, the bounded sample history, the sampling orchestrator and the
//! serial menu state machine.
//!
//! Peripheral drivers are consumed through `embedded-hal`, `embedded-io` and
//! the small traits in [`app_state`]. Tests run on the host with `std`.

#![cfg_attr(not(test), no_std)]

#[cfg(all(feature = "sim", not(test)))]
extern crate std;

pub mod app_state;
pub mod bring_up;
pub mod config;
pub mod menu;
pub mod sampling;
pub mod sensors;
pub mod storage;
pub mod work_queue;
