//! # Fusion DAQ Core Library
//!
//! Acquisition layer for an FXOS8700 hybrid accelerometer/magnetometer:
//! register-level device control, FIFO burst draining into circular
//! sample buffers, and a drift-compensated scheduler that feeds the
//! buffered samples to a fusion stage on a fixed deadline grid. The
//! binary (`main.rs`) wires a simulated bus into the same pipeline so the
//! whole service runs without hardware.
//!
//! ## Crate Structure
//!
//! - **`bus`**: The `RegisterBus` trait the driver speaks through, plus
//!   masked read-modify-write application of register lists.
//! - **`registers`**: FXOS8700 register map, scale factors, output data
//!   rates, and the canonical configuration sequences.
//! - **`device`**: The `Fxos8700` driver state machine and the
//!   `SensorDriver` trait the scheduler drives.
//! - **`sample`**: Sample decoding, conditioning, and the circular
//!   buffers acquisition writes into.
//! - **`fusion`**: The per-period conditioning/fusion stage seam.
//! - **`scheduler`**: The deadline grid and the acquisition loop.
//! - **`status`**: Coalescing system status tracking with a pluggable
//!   indicator.
//! - **`control`**: Telemetry frames and the TCP control endpoint.
//! - **`config`**: Layered settings (defaults, TOML file, environment).
//! - **`error`**: The `SensorError` enum shared across the crate.
//! - **`mock`**: Simulated register bus for tests and hardware-free runs.

pub mod bus;
pub mod config;
pub mod control;
pub mod device;
pub mod error;
pub mod fusion;
pub mod mock;
pub mod registers;
pub mod sample;
pub mod scheduler;
pub mod status;

pub use config::Settings;
pub use error::{SensorError, SensorResult};
pub use scheduler::Scheduler;
