//! Host-testable core of the tempsound firmware.
//!
//! Everything with sequencing logic, failure handling or data
//! transformation lives here so it can be exercised on the host:
//!
//! - [`ble`] - advertising payload, press counter, connection lifecycle
//!   controller and the event coordinator that drives them.
//! - [`sensor`] - frame codec, fixed-point renderer, failure policy and
//!   the acquisition loop.
//! - [`ui`] - LED and button boundary.
//!
//! Usage: `cargo test`
//!
//! Note: The embedded binary uses main.rs with #![no_std] and #![no_main]
//! and only adds the platform adapters on top of this crate.

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible to every module.
#[macro_use]
mod fmt;

pub mod ble;
pub mod config;
pub mod error;
pub mod sensor;
pub mod ui;

pub use error::Error;
