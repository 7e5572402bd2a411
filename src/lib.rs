//! Driver for the Sensirion SCD4x CO2, temperature and humidity sensors over
//! [`embedded-hal`] I2C, blocking or async.
//!
//! Every command goes through a retrying executor: transient bus faults are
//! retried with a fixed back-off, and the number of consecutive failures is
//! kept for health monitoring.
//!
//! ## Features
//!
//! - `log`: diagnostics through the `log` facade.
//! - `defmt`: diagnostics through `defmt`, and `defmt::Format` on public types.
//!
//! [`embedded-hal`]: https://github.com/rust-embedded/embedded-hal

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

#[cfg(all(feature = "defmt", feature = "log"))]
compile_error!("Features \"defmt\" and \"log\" are mutually exclusive and cannot be enabled together");

#[macro_use]
mod fmt;

#[cfg(test)]
mod debug_utils;
pub mod scd4x;
mod sensirion;

pub use scd4x::asynchronous::AsyncSCD4x;
pub use scd4x::{InitReport, Measurement, Mode, SCD4x, SerialNumber, SingleShot, Variant};
pub use sensirion::{Checksum, Config, Error, RetryPolicy};
