//! Korad Serial Port Detection Library
//!
//! This crate provides serial port enumeration, USB ID classification and
//! the `*IDN?` identification handshake for Korad bench power supplies.
//!
//! # Example
//!
//! ```rust,no_run
//! use korad_detect::PortScanner;
//!
//! let scanner = PortScanner::new();
//! let ports = scanner.enumerate_ports().unwrap();
//!
//! for port in ports {
//!     println!("Found port: {}", port.port);
//! }
//! ```

pub mod backend;
pub mod error;
pub mod probe;
pub mod scanner;
pub mod usb_ids;

pub use backend::{LinkSettings, PortBackend, SystemPorts};
pub use error::DetectError;
pub use probe::{IdentityProber, MatchSource, ProbeConfig, ProbeResult};
pub use scanner::{PortScanner, ScannerConfig, SerialPortInfo};
pub use usb_ids::{classify_port, PortClassification, UsbId};
