//! Queued commands
//!
//! A [`Command`] pairs the rendered wire bytes with its catalog entry and
//! collects the reply once the drive loop has read it.

use std::fmt;

use korad_protocol::{lookup, Arg, CommandSpec, Reply};

use crate::device::DeviceHandle;
use crate::error::DriverError;

/// Completion callback, invoked once on the driving task after the command
/// has left the queue
pub type Completion = Box<dyn FnOnce(&DeviceHandle, &Command) + Send>;

/// A command waiting in, or just taken from, the queue
pub struct Command {
    spec: &'static CommandSpec,
    wire: Vec<u8>,
    sent: bool,
    result: Option<Reply>,
    on_complete: Option<Completion>,
}

impl Command {
    /// Render a command from its mnemonic and arguments
    pub fn new(mnemonic: &str, args: &[Arg]) -> Result<Self, DriverError> {
        let spec = lookup(mnemonic)?;
        Self::from_spec(spec, args)
    }

    /// Render a command for a known catalog entry
    pub fn from_spec(spec: &'static CommandSpec, args: &[Arg]) -> Result<Self, DriverError> {
        let wire = spec.render(args)?;
        Ok(Self {
            spec,
            wire,
            sent: false,
            result: None,
            on_complete: None,
        })
    }

    /// Attach a completion callback
    pub fn with_completion(mut self, on_complete: Completion) -> Self {
        self.on_complete = Some(on_complete);
        self
    }

    pub fn spec(&self) -> &'static CommandSpec {
        self.spec
    }

    pub fn mnemonic(&self) -> &'static str {
        self.spec.mnemonic
    }

    /// Bytes written to the device
    pub fn wire(&self) -> &[u8] {
        &self.wire
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Whether the device answers this command
    pub fn expects_reply(&self) -> bool {
        self.spec.has_reply
    }

    /// Converted reply; always `None` for commands without one
    pub fn result(&self) -> Option<&Reply> {
        self.result.as_ref()
    }

    pub(crate) fn mark_sent(&mut self) {
        self.sent = true;
    }

    pub(crate) fn set_result(&mut self, reply: Reply) {
        self.result = Some(reply);
    }

    pub(crate) fn take_completion(&mut self) -> Option<Completion> {
        self.on_complete.take()
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("mnemonic", &self.spec.mnemonic)
            .field("wire", &String::from_utf8_lossy(&self.wire))
            .field("sent", &self.sent)
            .field("result", &self.result)
            .field("has_completion", &self.on_complete.is_some())
            .finish()
    }
}

/// Outcome delivered through [`DeviceHandle::query`]
#[derive(Debug, Clone, PartialEq)]
pub struct Completed {
    pub mnemonic: &'static str,
    pub result: Option<Reply>,
}

impl From<&Command> for Completed {
    fn from(command: &Command) -> Self {
        Self {
            mnemonic: command.mnemonic(),
            result: command.result.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use korad_protocol::mnemonic;

    #[test]
    fn test_new_renders_wire() {
        let cmd = Command::new(mnemonic::SET_VOLTAGE, &[Arg::Float(12.34)]).unwrap();
        assert_eq!(cmd.wire(), b"VSET1:12.34");
        assert!(!cmd.is_sent());
        assert!(!cmd.expects_reply());
        assert!(cmd.result().is_none());
    }

    #[test]
    fn test_query_expects_reply() {
        let cmd = Command::new(mnemonic::VOLTAGE_ACTUAL, &[]).unwrap();
        assert_eq!(cmd.wire(), b"VOUT1?");
        assert!(cmd.expects_reply());
    }

    #[test]
    fn test_unknown_mnemonic() {
        let err = Command::new("FOO", &[]).unwrap_err();
        assert!(matches!(err, DriverError::UnknownCommand(m) if m == "FOO"));
    }

    #[test]
    fn test_bad_arguments() {
        let err = Command::new(mnemonic::OUTPUT, &[]).unwrap_err();
        assert!(matches!(err, DriverError::Format(_)));
    }

    #[test]
    fn test_completion_taken_once() {
        let mut cmd = Command::new(mnemonic::OUTPUT, &[Arg::from(true)])
            .unwrap()
            .with_completion(Box::new(|_, _| {}));
        assert!(format!("{:?}", cmd).contains("has_completion: true"));
        assert!(cmd.take_completion().is_some());
        assert!(cmd.take_completion().is_none());
    }
}
