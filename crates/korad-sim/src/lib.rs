//! Korad Power Supply Simulation Library
//!
//! This crate provides a simulation layer for testing the driver without a
//! physical power supply. It includes:
//!
//! - **VirtualPsu**: Parses the command stream and answers like the real
//!   firmware, quirks included
//! - **run_virtual_psu**: Serves a `VirtualPsu` over any async stream
//!
//! # Example
//!
//! ```rust
//! use korad_sim::VirtualPsu;
//!
//! let mut psu = VirtualPsu::new();
//! psu.push_bytes(b"VSET1:12.34OUT1VSET1?");
//!
//! assert!(psu.output());
//! assert_eq!(psu.take_output().unwrap(), b"12.34");
//! ```

pub mod psu;
pub mod psu_task;

pub use psu::{Preset, VirtualPsu, VirtualPsuConfig, PRESET_COUNT};
pub use psu_task::run_virtual_psu;
