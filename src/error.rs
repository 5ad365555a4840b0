//! Custom error types for the acquisition layer.
//!
//! This module defines the primary error type, `SensorError`, shared by the
//! bus port, the device driver, and the scheduler. Using the `thiserror`
//! crate, it provides one consistent surface for everything that can go
//! wrong between a register transaction and a delivered sample.
//!
//! ## Error Hierarchy
//!
//! - **`Transport`**: the bus I/O underneath a register transaction failed.
//! - **`IdentityMismatch`**: a device answered, but its identity byte is not
//!   the expected part. The byte read is carried in the error and also
//!   recorded on the driver for diagnostics.
//! - **`NotInitialized`**: an operation was attempted on a channel whose
//!   enable state is off. Surfaced as a hard error during startup and as a
//!   contained, logged error inside the acquisition loop.
//! - **`Framing`**: a burst read returned a byte count inconsistent with the
//!   6-byte packet framing. Never silently truncated into samples.
//! - **`NoDataYet`**: the device FIFO held no packets. This is an expected
//!   outcome when the polling cadence outpaces the configured data rate and
//!   is not treated as a failure by the scheduler.
//! - **`Config`** / **`Io`** / **`Encode`**: ambient plumbing around
//!   configuration loading, sockets, and telemetry serialization.

use thiserror::Error;

use crate::sample::SensorChannel;

/// Convenience alias for results using the acquisition error type.
pub type SensorResult<T> = std::result::Result<T, SensorError>;

/// Errors produced by the acquisition layer.
#[derive(Error, Debug)]
pub enum SensorError {
    /// The bus transport failed underneath a register transaction.
    #[error("Register transport error: {0}")]
    Transport(String),

    /// A device answered the identity read with the wrong byte.
    #[error("Device identity mismatch: expected {expected:#04x}, found {found:#04x}")]
    IdentityMismatch {
        /// Identity byte the driver was built for.
        expected: u8,
        /// Identity byte the device actually reported.
        found: u8,
    },

    /// Operation attempted on a channel that is not enabled.
    #[error("{0} channel is not initialized")]
    NotInitialized(SensorChannel),

    /// A burst read returned a byte count that breaks packet framing.
    #[error("Burst framing violated: requested {expected} bytes, device returned {actual}")]
    Framing {
        /// Byte count the read asked for.
        expected: usize,
        /// Byte count the transport delivered.
        actual: usize,
    },

    /// The device FIFO held no packets. Expected when polling faster than
    /// the configured output data rate; not a failure.
    #[error("No data buffered yet")]
    NoDataYet,

    /// Configuration failed to load or validate.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error from the telemetry endpoint or configuration files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Telemetry frame serialization failed.
    #[error("Telemetry encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SensorError {
    /// True for the empty-FIFO outcome, which callers tolerate rather than
    /// report.
    pub fn is_no_data(&self) -> bool {
        matches!(self, SensorError::NoDataYet)
    }
}
