//! printf-style template rendering
//!
//! The command catalog describes parameterised commands with C-style
//! templates such as `VSET1:%02.2f` or `OUT%u`. This module renders those
//! templates against a list of typed arguments, refusing anything that would
//! not fit the device's command buffer instead of truncating it.

use std::iter::Peekable;
use std::str::Chars;

use crate::error::FormatError;

/// Longest command the device accepts in a single write
pub const MAX_COMMAND_LENGTH: usize = 49;

/// A single template argument
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Arg {
    /// Consumed by `%u`, `%d` and `%i`
    Unsigned(u32),
    /// Consumed by `%f`
    Float(f64),
}

impl From<u32> for Arg {
    fn from(v: u32) -> Self {
        Arg::Unsigned(v)
    }
}

impl From<u16> for Arg {
    fn from(v: u16) -> Self {
        Arg::Unsigned(v.into())
    }
}

impl From<u8> for Arg {
    fn from(v: u8) -> Self {
        Arg::Unsigned(v.into())
    }
}

impl From<bool> for Arg {
    fn from(v: bool) -> Self {
        Arg::Unsigned(u32::from(v))
    }
}

impl From<f32> for Arg {
    fn from(v: f32) -> Self {
        Arg::Float(v.into())
    }
}

impl From<f64> for Arg {
    fn from(v: f64) -> Self {
        Arg::Float(v)
    }
}

/// One parsed `%[flags][width][.precision]conv` directive
#[derive(Debug, Default)]
struct Directive {
    zero_pad: bool,
    left_align: bool,
    width: Option<usize>,
    precision: Option<usize>,
    conversion: char,
}

impl Directive {
    /// Parse a directive; the leading `%` has already been consumed
    fn parse(chars: &mut Peekable<Chars<'_>>) -> Result<Self, FormatError> {
        let mut directive = Directive::default();

        while let Some(&c) = chars.peek() {
            match c {
                '0' => directive.zero_pad = true,
                '-' => directive.left_align = true,
                _ => break,
            }
            chars.next();
        }

        directive.width = take_number(chars);

        if chars.peek() == Some(&'.') {
            chars.next();
            directive.precision = Some(take_number(chars).unwrap_or(0));
        }

        match chars.next() {
            Some(c @ ('u' | 'd' | 'i' | 'f' | '%')) => directive.conversion = c,
            Some(c) => return Err(FormatError::BadDirective(format!("%{c}"))),
            None => return Err(FormatError::BadDirective("%".into())),
        }

        Ok(directive)
    }

    /// Format a single argument according to this directive
    fn format(&self, index: usize, arg: Arg) -> Result<String, FormatError> {
        let body = match (self.conversion, arg) {
            ('u' | 'd' | 'i', Arg::Unsigned(v)) => {
                let digits = v.to_string();
                match self.precision {
                    Some(p) if p > digits.len() => format!("{}{}", "0".repeat(p - digits.len()), digits),
                    _ => digits,
                }
            }
            ('f', Arg::Float(v)) => format!("{:.*}", self.precision.unwrap_or(6), v),
            (directive, _) => return Err(FormatError::ArgumentMismatch { index, directive }),
        };

        Ok(self.pad(body))
    }

    fn pad(&self, body: String) -> String {
        let width = match self.width {
            Some(w) if w > body.len() => w,
            _ => return body,
        };
        let fill = width - body.len();

        if self.left_align {
            format!("{}{}", body, " ".repeat(fill))
        } else if self.zero_pad && body.bytes().all(|b| b.is_ascii_digit() || b == b'.' || b == b'-') {
            match body.strip_prefix('-') {
                Some(rest) => format!("-{}{}", "0".repeat(fill), rest),
                None => format!("{}{}", "0".repeat(fill), body),
            }
        } else {
            format!("{}{}", " ".repeat(fill), body)
        }
    }
}

fn take_number(chars: &mut Peekable<Chars<'_>>) -> Option<usize> {
    let mut value: Option<usize> = None;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        value = Some(value.unwrap_or(0).saturating_mul(10).saturating_add(d as usize));
        chars.next();
    }
    value
}

fn check_length(length: usize) -> Result<(), FormatError> {
    if length > MAX_COMMAND_LENGTH {
        return Err(FormatError::TooLong {
            length,
            limit: MAX_COMMAND_LENGTH,
        });
    }
    Ok(())
}

/// Render `template` with `args`
///
/// Every argument must be consumed and the result must fit within
/// [`MAX_COMMAND_LENGTH`] bytes.
pub fn render_template(template: &str, args: &[Arg]) -> Result<Vec<u8>, FormatError> {
    let mut out = String::with_capacity(template.len() + 8);
    let mut chars = template.chars().peekable();
    let mut next_arg = 0usize;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let directive = Directive::parse(&mut chars)?;
        if directive.conversion == '%' {
            out.push('%');
            continue;
        }

        let arg = *args
            .get(next_arg)
            .ok_or(FormatError::MissingArgument { index: next_arg })?;
        out.push_str(&directive.format(next_arg, arg)?);
        next_arg += 1;

        check_length(out.len())?;
    }

    if next_arg < args.len() {
        return Err(FormatError::UnusedArguments(args.len() - next_arg));
    }

    check_length(out.len())?;
    Ok(out.into_bytes())
}

/// Render a literal (template-less) command
pub fn render_literal(text: &str, args: &[Arg]) -> Result<Vec<u8>, FormatError> {
    if !args.is_empty() {
        return Err(FormatError::UnusedArguments(args.len()));
    }
    check_length(text.len())?;
    Ok(text.as_bytes().to_vec())
}
