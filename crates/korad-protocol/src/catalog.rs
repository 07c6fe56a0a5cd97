//! Command catalog
//!
//! Every command the driver can send is described by a static
//! [`CommandSpec`]: how to render it, whether the device answers, how many
//! bytes the answer has and how those bytes are converted.

use tracing::{debug, trace};

use crate::error::{FormatError, ProtocolError};
use crate::format::{render_literal, render_template, Arg};
use crate::models::IDENTITY_LENGTH;

/// Identifies a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CommandId {
    /// Identity string query
    Identify,
    /// Status byte query
    Status,
    /// Query the voltage setpoint
    VoltageSetpoint,
    /// Set the voltage setpoint
    SetVoltage,
    /// Query the measured output voltage
    VoltageActual,
    /// Query the current limit
    CurrentSetpoint,
    /// Set the current limit
    SetCurrent,
    /// Query the measured output current
    CurrentActual,
    /// Enable/disable the output
    Output,
    /// Enable/disable over-voltage protection
    OverVoltageProtection,
    /// Enable/disable over-current protection
    OverCurrentProtection,
    /// Select the tracking mode
    Track,
    /// Recall a stored preset
    Recall,
    /// Store the current settings to a preset
    Save,
}

/// How the raw reply bytes are turned into a typed value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Conversion {
    /// Raw bytes, copied verbatim
    None,
    /// Decimal number
    Float,
    /// Status bit-field
    StatusBits,
}

/// Wire anomalies that need compensation after a reply is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Quirk {
    /// The device sends one extra byte after the declared reply
    TrailingByte,
}

/// Static description of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub id: CommandId,
    /// Catalog key, and the literal wire text when there is no template
    pub mnemonic: &'static str,
    /// printf-style template for parameterised commands
    pub template: Option<&'static str>,
    /// Whether the device answers this command
    pub has_reply: bool,
    /// Number of reply bytes to wait for
    pub reply_length: usize,
    pub conversion: Conversion,
    pub quirk: Option<Quirk>,
}

/// Mnemonics of all catalog entries
pub mod mnemonic {
    pub const IDENTIFY: &str = "*IDN?";
    pub const STATUS: &str = "STATUS?";
    pub const VOLTAGE_SETPOINT: &str = "VSET1?";
    pub const SET_VOLTAGE: &str = "VSET1:";
    pub const VOLTAGE_ACTUAL: &str = "VOUT1?";
    pub const CURRENT_SETPOINT: &str = "ISET1?";
    pub const SET_CURRENT: &str = "ISET1:";
    pub const CURRENT_ACTUAL: &str = "IOUT1?";
    pub const OUTPUT: &str = "OUT";
    pub const OVP: &str = "OVP";
    pub const OCP: &str = "OCP";
    pub const TRACK: &str = "TRACK";
    pub const RECALL: &str = "RCL";
    pub const SAVE: &str = "SAV";
}

const fn query(
    id: CommandId,
    mnemonic: &'static str,
    reply_length: usize,
    conversion: Conversion,
) -> CommandSpec {
    CommandSpec {
        id,
        mnemonic,
        template: None,
        has_reply: true,
        reply_length,
        conversion,
        quirk: None,
    }
}

const fn setter(id: CommandId, mnemonic: &'static str, template: &'static str) -> CommandSpec {
    CommandSpec {
        id,
        mnemonic,
        template: Some(template),
        has_reply: false,
        reply_length: 0,
        conversion: Conversion::None,
        quirk: None,
    }
}

/// The command catalog
pub static COMMANDS: &[CommandSpec] = &[
    query(CommandId::Identify, mnemonic::IDENTIFY, IDENTITY_LENGTH, Conversion::None),
    query(CommandId::Status, mnemonic::STATUS, 1, Conversion::StatusBits),
    query(CommandId::VoltageSetpoint, mnemonic::VOLTAGE_SETPOINT, 5, Conversion::Float),
    setter(CommandId::SetVoltage, mnemonic::SET_VOLTAGE, "VSET1:%02.2f"),
    query(CommandId::VoltageActual, mnemonic::VOLTAGE_ACTUAL, 5, Conversion::Float),
    CommandSpec {
        quirk: Some(Quirk::TrailingByte),
        ..query(CommandId::CurrentSetpoint, mnemonic::CURRENT_SETPOINT, 5, Conversion::Float)
    },
    setter(CommandId::SetCurrent, mnemonic::SET_CURRENT, "ISET1:%.3f"),
    query(CommandId::CurrentActual, mnemonic::CURRENT_ACTUAL, 5, Conversion::Float),
    setter(CommandId::Output, mnemonic::OUTPUT, "OUT%u"),
    setter(CommandId::OverVoltageProtection, mnemonic::OVP, "OVP%u"),
    setter(CommandId::OverCurrentProtection, mnemonic::OCP, "OCP%u"),
    setter(CommandId::Track, mnemonic::TRACK, "TRACK%u"),
    setter(CommandId::Recall, mnemonic::RECALL, "RCL%u"),
    setter(CommandId::Save, mnemonic::SAVE, "SAV%u"),
];

/// Look up a catalog entry by mnemonic
pub fn lookup(mnemonic: &str) -> Result<&'static CommandSpec, ProtocolError> {
    CommandSpec::by_mnemonic(mnemonic).ok_or_else(|| {
        debug!("Unknown command mnemonic {:?}", mnemonic);
        ProtocolError::UnknownCommand(mnemonic.to_string())
    })
}

impl CommandSpec {
    /// Find the entry for a mnemonic
    pub fn by_mnemonic(mnemonic: &str) -> Option<&'static CommandSpec> {
        COMMANDS.iter().find(|s| s.mnemonic == mnemonic)
    }

    /// Find the entry for an id
    pub fn by_id(id: CommandId) -> Option<&'static CommandSpec> {
        COMMANDS.iter().find(|s| s.id == id)
    }

    /// Render the wire bytes for this command
    pub fn render(&self, args: &[Arg]) -> Result<Vec<u8>, FormatError> {
        let wire = match self.template {
            Some(template) => render_template(template, args)?,
            None => render_literal(self.mnemonic, args)?,
        };
        trace!("Rendered {}: {:?}", self.mnemonic, String::from_utf8_lossy(&wire));
        Ok(wire)
    }

    /// Whether this command takes arguments
    pub fn is_parameterised(&self) -> bool {
        self.template.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::MAX_COMMAND_LENGTH;
    use proptest::prelude::*;

    #[test]
    fn test_lookup_known() {
        let spec = lookup("VOUT1?").unwrap();
        assert_eq!(spec.id, CommandId::VoltageActual);
        assert!(spec.has_reply);
        assert_eq!(spec.reply_length, 5);
        assert_eq!(spec.conversion, Conversion::Float);
    }

    #[test]
    fn test_lookup_unknown() {
        assert_eq!(
            lookup("FOO"),
            Err(ProtocolError::UnknownCommand("FOO".into()))
        );
    }

    #[test]
    fn test_every_id_has_one_entry() {
        for spec in COMMANDS {
            assert_eq!(CommandSpec::by_id(spec.id), Some(spec));
            assert_eq!(CommandSpec::by_mnemonic(spec.mnemonic), Some(spec));
        }
    }

    #[test]
    fn test_replies_have_length() {
        for spec in COMMANDS {
            assert_eq!(spec.has_reply, spec.reply_length > 0, "{}", spec.mnemonic);
        }
    }

    #[test]
    fn test_only_current_setpoint_has_quirk() {
        let quirky: Vec<_> = COMMANDS.iter().filter(|s| s.quirk.is_some()).collect();
        assert_eq!(quirky.len(), 1);
        assert_eq!(quirky[0].mnemonic, "ISET1?");
    }

    #[test]
    fn test_identify_waits_for_device_name() {
        let spec = lookup("*IDN?").unwrap();
        assert_eq!(spec.reply_length, "KORADKA3005PV2.0".len());
        assert_eq!(spec.render(&[]).unwrap(), b"*IDN?");
    }

    #[test]
    fn test_status_is_status_bits() {
        let spec = lookup("STATUS?").unwrap();
        assert_eq!(spec.reply_length, 1);
        assert_eq!(spec.conversion, Conversion::StatusBits);
    }

    #[test]
    fn test_render_setters() {
        let render = |m: &str, arg: Arg| lookup(m).unwrap().render(&[arg]).unwrap();
        assert_eq!(render("VSET1:", Arg::Float(12.34)), b"VSET1:12.34");
        assert_eq!(render("ISET1:", Arg::Float(0.5)), b"ISET1:0.500");
        assert_eq!(render("OUT", Arg::Unsigned(1)), b"OUT1");
        assert_eq!(render("OVP", Arg::Unsigned(0)), b"OVP0");
        assert_eq!(render("OCP", Arg::Unsigned(1)), b"OCP1");
        assert_eq!(render("TRACK", Arg::Unsigned(2)), b"TRACK2");
        assert_eq!(render("RCL", Arg::Unsigned(3)), b"RCL3");
        assert_eq!(render("SAV", Arg::Unsigned(4)), b"SAV4");
    }

    fn valid_args(spec: &CommandSpec) -> BoxedStrategy<Vec<Arg>> {
        match spec.template {
            Some(t) if t.ends_with('f') => (0.0f64..100_000.0).prop_map(|v| vec![Arg::Float(v)]).boxed(),
            Some(_) => any::<u32>().prop_map(|v| vec![Arg::Unsigned(v)]).boxed(),
            None => Just(Vec::new()).boxed(),
        }
    }

    fn spec_and_args() -> impl Strategy<Value = (&'static CommandSpec, Vec<Arg>)> {
        (0..COMMANDS.len()).prop_flat_map(|i| (Just(&COMMANDS[i]), valid_args(&COMMANDS[i])))
    }

    proptest! {
        #[test]
        fn rendered_commands_fit_and_use_template((spec, args) in spec_and_args()) {
            let wire = spec.render(&args).unwrap();
            prop_assert!(wire.len() <= MAX_COMMAND_LENGTH);
            prop_assert!(wire.starts_with(spec.mnemonic.as_bytes()));
            if spec.is_parameterised() {
                prop_assert_ne!(wire.as_slice(), spec.mnemonic.as_bytes());
            }
        }
    }
}
