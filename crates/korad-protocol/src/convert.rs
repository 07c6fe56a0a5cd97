//! Reply conversion
//!
//! Turns the raw bytes accumulated for a command into a typed [`Reply`]
//! according to the command's [`Conversion`].

use crate::catalog::{CommandSpec, Conversion};

/// Typed result of a completed query
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Reply {
    /// Verbatim reply bytes
    Raw(Vec<u8>),
    /// Decimal reply; `NaN` when the device sent something unparsable
    Float(f32),
    /// Decoded status byte
    Status(DeviceStatus),
}

impl Reply {
    /// Returns the numeric value, if this is a float reply
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Reply::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the decoded status, if this is a status reply
    pub fn as_status(&self) -> Option<&DeviceStatus> {
        match self {
            Reply::Status(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the raw bytes, if this is a raw reply
    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            Reply::Raw(b) => Some(b),
            _ => None,
        }
    }

    /// Returns a raw reply as text, without trailing NUL padding
    pub fn as_text(&self) -> Option<String> {
        self.as_raw().map(|b| {
            let end = b.iter().rposition(|&c| c != 0).map_or(0, |p| p + 1);
            String::from_utf8_lossy(&b[..end]).into_owned()
        })
    }
}

/// Decoded `STATUS?` byte
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceStatus {
    /// Constant-current mode (bit 0 clear); constant-voltage otherwise
    pub constant_current: bool,
    /// Beeper enabled (bit 4)
    pub beep: bool,
    /// Over-current protection enabled (bit 5)
    pub ocp: bool,
    /// Output enabled (bit 6)
    pub output: bool,
    /// Over-voltage protection enabled (bit 7); only reported while the output is on
    pub ovp: Option<bool>,
}

impl DeviceStatus {
    pub fn from_byte(byte: u8) -> Self {
        let bit = |n: u8| byte & (1 << n) != 0;
        let output = bit(6);
        Self {
            constant_current: !bit(0),
            beep: bit(4),
            ocp: bit(5),
            output,
            ovp: output.then(|| bit(7)),
        }
    }
}

impl From<u8> for DeviceStatus {
    fn from(byte: u8) -> Self {
        Self::from_byte(byte)
    }
}

/// Convert raw reply bytes for `spec`
pub fn convert(spec: &CommandSpec, raw: &[u8]) -> Reply {
    match spec.conversion {
        Conversion::None => {
            let mut bytes = vec![0u8; spec.reply_length];
            let n = raw.len().min(spec.reply_length);
            bytes[..n].copy_from_slice(&raw[..n]);
            Reply::Raw(bytes)
        }
        Conversion::Float => Reply::Float(parse_float(raw)),
        Conversion::StatusBits => match raw.first() {
            Some(&byte) => Reply::Status(DeviceStatus::from_byte(byte)),
            None => Reply::Status(DeviceStatus::default()),
        },
    }
}

/// Parse the leading decimal literal of `raw`
///
/// Leading whitespace and NUL bytes are skipped and anything after the
/// literal is ignored. Returns `NaN` when no digits are found.
pub fn parse_float(raw: &[u8]) -> f32 {
    let start = raw
        .iter()
        .position(|b| !b.is_ascii_whitespace() && *b != 0)
        .unwrap_or(raw.len());
    let text = &raw[start..];

    let mut end = 0;
    if matches!(text.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_digits = count_digits(&text[end..]);
    end += int_digits;
    let mut frac_digits = 0;
    if text.get(end) == Some(&b'.') {
        frac_digits = count_digits(&text[end + 1..]);
        end += 1 + frac_digits;
    }
    if int_digits + frac_digits == 0 {
        return f32::NAN;
    }
    if matches!(text.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(text.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = count_digits(&text[exp_end.min(text.len())..]);
        if exp_digits > 0 {
            end = exp_end + exp_digits;
        }
    }

    std::str::from_utf8(&text[..end])
        .ok()
        .and_then(|s| s.parse::<f32>().ok())
        .unwrap_or(f32::NAN)
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}
