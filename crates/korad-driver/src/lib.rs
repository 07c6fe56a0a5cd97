//! Korad Power Supply Driver
//!
//! This crate drives a Korad bench power supply over its delimiter-free
//! ASCII protocol without blocking the caller.
//!
//! # Architecture
//!
//! - **Discovery**: finds the supply among the serial ports by USB ID and the
//!   `*IDN?` handshake
//! - **DeviceHandle**: cloneable, queues commands from any task
//! - **Device**: owns the port and runs the drive loop that sends the queued
//!   commands one at a time and delivers converted replies to callbacks
//!
//! # Example
//!
//! ```rust,no_run
//! use korad_driver::{Device, DriveOutcome};
//!
//! # async fn run() -> Result<(), korad_driver::DriverError> {
//! let mut device = Device::discover().await?;
//!
//! device.set_voltage(12.0)?;
//! device.set_current(0.5)?;
//! device.output_on()?;
//! device.get_actual_voltage(|_, cmd| {
//!     if let Some(volts) = cmd.result().and_then(|r| r.as_float()) {
//!         println!("Output at {:.2} V", volts);
//!     }
//! })?;
//!
//! let outcome = device.drive().await?;
//! assert_eq!(outcome, DriveOutcome::Idle);
//! device.close();
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod queue;

pub use command::{Command, Completed, Completion};
pub use config::DriverConfig;
pub use device::{Device, DeviceHandle, DeviceInfo, DriveOutcome};
pub use discovery::{connect_with, discover_with};
pub use error::{ConfigError, DriverError};
pub use queue::CommandQueue;

// Re-export the protocol types callers need to read results
pub use korad_protocol::{Arg, DeviceStatus, Reply};
