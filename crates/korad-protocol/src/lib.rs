//! Korad Protocol Library
//!
//! This crate describes the ASCII command protocol spoken by Korad-style
//! bench power supplies (KA3005P and relatives):
//!
//! - **Command catalog**: every supported command, its wire template and
//!   what kind of reply it produces
//! - **Known devices**: models recognized by USB ID and identity string
//! - **Rendering**: printf-style templates bounded to the device's command
//!   buffer
//! - **Conversion**: raw reply bytes to typed [`Reply`] values
//!
//! The protocol has no delimiters. Queries are answered with a fixed number
//! of bytes, setters are not answered at all.
//!
//! # Example
//!
//! ```rust
//! use korad_protocol::{convert, lookup, Arg, Reply};
//!
//! let set = lookup("VSET1:").unwrap();
//! assert_eq!(set.render(&[Arg::Float(12.34)]).unwrap(), b"VSET1:12.34");
//!
//! let get = lookup("VOUT1?").unwrap();
//! assert_eq!(convert(get, b"12.34"), Reply::Float(12.34));
//! ```

pub mod catalog;
pub mod convert;
pub mod error;
pub mod format;
pub mod models;

pub use catalog::{lookup, mnemonic, CommandId, CommandSpec, Conversion, Quirk, COMMANDS};
pub use convert::{convert, parse_float, DeviceStatus, Reply};
pub use error::{FormatError, ProtocolError};
pub use format::{Arg, MAX_COMMAND_LENGTH};
pub use models::{KnownDevice, IDENTITY_LENGTH, KNOWN_DEVICES};
