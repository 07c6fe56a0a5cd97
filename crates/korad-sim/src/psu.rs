//! Virtual power supply
//!
//! Provides a simulated supply that parses the delimiter-free command
//! stream and produces protocol-accurate replies, including the trailing
//! byte the real firmware appends to `ISET1?`.

use std::collections::VecDeque;

use korad_protocol::{CommandId, CommandSpec, KNOWN_DEVICES};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Number of preset memories (M1-M5)
pub const PRESET_COUNT: usize = 5;

/// Configuration for creating a virtual supply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualPsuConfig {
    /// Reply to `*IDN?`
    pub identity: String,
    /// Initial voltage setpoint in volts
    pub voltage: f32,
    /// Initial current limit in amps
    pub current: f32,
    /// Resistive load on the output, in ohms
    pub load_ohms: f32,
    /// Append one extra byte to `ISET1?` replies like the real firmware
    pub trailing_byte_quirk: bool,
    /// Never answer anything
    pub mute: bool,
    /// Split replies into chunks of this size
    pub reply_chunk_size: Option<usize>,
    /// Pause between reply chunks
    pub chunk_delay_ms: u64,
}

impl Default for VirtualPsuConfig {
    fn default() -> Self {
        Self {
            identity: KNOWN_DEVICES[0].name.to_string(),
            voltage: 5.0,
            current: 1.0,
            load_ohms: 10.0,
            trailing_byte_quirk: true,
            mute: false,
            reply_chunk_size: None,
            chunk_delay_ms: 5,
        }
    }
}

/// One stored preset
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Preset {
    pub voltage: f32,
    pub current: f32,
}

/// A simulated Korad supply
#[derive(Debug)]
pub struct VirtualPsu {
    config: VirtualPsuConfig,
    voltage: f32,
    current: f32,
    output: bool,
    ovp: bool,
    ocp: bool,
    beep: bool,
    track: u32,
    presets: [Preset; PRESET_COUNT],
    /// Unparsed input
    buffer: Vec<u8>,
    /// Commands received, rendered as text
    received: Vec<String>,
    /// Pending reply bytes
    pending_output: VecDeque<Vec<u8>>,
}

impl VirtualPsu {
    /// Create a supply with default settings
    pub fn new() -> Self {
        Self::from_config(VirtualPsuConfig::default())
    }

    /// Create a supply from configuration
    pub fn from_config(config: VirtualPsuConfig) -> Self {
        Self {
            voltage: config.voltage,
            current: config.current,
            config,
            output: false,
            ovp: false,
            ocp: false,
            beep: true,
            track: 0,
            presets: [Preset::default(); PRESET_COUNT],
            buffer: Vec::new(),
            received: Vec::new(),
            pending_output: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &VirtualPsuConfig {
        &self.config
    }

    pub fn voltage(&self) -> f32 {
        self.voltage
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn output(&self) -> bool {
        self.output
    }

    pub fn ovp(&self) -> bool {
        self.ovp
    }

    pub fn ocp(&self) -> bool {
        self.ocp
    }

    pub fn track(&self) -> u32 {
        self.track
    }

    pub fn preset(&self, slot: usize) -> Option<Preset> {
        slot.checked_sub(1).and_then(|i| self.presets.get(i)).copied()
    }

    /// Commands received so far, in order
    pub fn received(&self) -> &[String] {
        &self.received
    }

    /// Whether the load pulls the supply into constant-current mode
    pub fn is_constant_current(&self) -> bool {
        self.output && self.voltage / self.config.load_ohms > self.current
    }

    /// Measured output voltage
    pub fn voltage_actual(&self) -> f32 {
        match (self.output, self.is_constant_current()) {
            (false, _) => 0.0,
            (true, false) => self.voltage,
            (true, true) => self.current * self.config.load_ohms,
        }
    }

    /// Measured output current
    pub fn current_actual(&self) -> f32 {
        if self.output {
            self.voltage_actual() / self.config.load_ohms
        } else {
            0.0
        }
    }

    /// Encode the `STATUS?` byte
    pub fn status_byte(&self) -> u8 {
        let mut status = 0u8;
        if !self.is_constant_current() {
            status |= 1 << 0;
        }
        if self.beep {
            status |= 1 << 4;
        }
        if self.ocp {
            status |= 1 << 5;
        }
        if self.output {
            status |= 1 << 6;
        }
        if self.ovp {
            status |= 1 << 7;
        }
        status
    }

    /// Feed bytes received from the host
    ///
    /// Each call is treated as ending on a command boundary, except for a
    /// trailing fragment that is still a prefix of some mnemonic.
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        loop {
            if self.buffer.is_empty() {
                break;
            }

            let Some(spec) = longest_mnemonic_prefix(&self.buffer) else {
                if is_partial_mnemonic(&self.buffer) {
                    break;
                }
                debug!("Virtual PSU discarding unexpected byte {:02X}", self.buffer[0]);
                self.buffer.remove(0);
                continue;
            };

            let mut end = spec.mnemonic.len();
            let mut argument = None;
            if spec.is_parameterised() {
                let digits = self.buffer[end..]
                    .iter()
                    .take_while(|b| b.is_ascii_digit() || **b == b'.')
                    .count();
                if digits == 0 {
                    if end == self.buffer.len() {
                        break;
                    }
                    debug!("Virtual PSU dropping {} without argument", spec.mnemonic);
                    self.buffer.drain(..end);
                    continue;
                }
                argument = std::str::from_utf8(&self.buffer[end..end + digits])
                    .ok()
                    .and_then(|s| s.parse::<f32>().ok());
                end += digits;
            }

            let text = String::from_utf8_lossy(&self.buffer[..end]).into_owned();
            self.buffer.drain(..end);
            debug!("Virtual PSU received {}", text);
            self.received.push(text);
            self.apply(spec.id, argument);
        }
    }

    fn apply(&mut self, id: CommandId, argument: Option<f32>) {
        let flag = argument.map(|v| v != 0.0).unwrap_or(false);
        let slot = argument.map(|v| v as usize).unwrap_or(0);

        match id {
            CommandId::Identify => self.reply(self.config.identity.clone().into_bytes()),
            CommandId::Status => self.reply(vec![self.status_byte()]),
            CommandId::VoltageSetpoint => self.reply(format_reading(self.voltage, 2)),
            CommandId::VoltageActual => self.reply(format_reading(self.voltage_actual(), 2)),
            CommandId::CurrentSetpoint => {
                let mut reply = format_reading(self.current, 3);
                if self.config.trailing_byte_quirk {
                    reply.push(b'\n');
                }
                self.reply(reply)
            }
            CommandId::CurrentActual => self.reply(format_reading(self.current_actual(), 3)),
            CommandId::SetVoltage => {
                if let Some(v) = argument {
                    self.voltage = v;
                }
            }
            CommandId::SetCurrent => {
                if let Some(v) = argument {
                    self.current = v;
                }
            }
            CommandId::Output => self.output = flag,
            CommandId::OverVoltageProtection => self.ovp = flag,
            CommandId::OverCurrentProtection => self.ocp = flag,
            CommandId::Track => self.track = slot as u32,
            CommandId::Save => {
                if let Some(preset) = slot.checked_sub(1).and_then(|i| self.presets.get_mut(i)) {
                    *preset = Preset {
                        voltage: self.voltage,
                        current: self.current,
                    };
                }
            }
            CommandId::Recall => {
                if let Some(preset) = self.preset(slot) {
                    self.voltage = preset.voltage;
                    self.current = preset.current;
                }
            }
        }
    }

    fn reply(&mut self, bytes: Vec<u8>) {
        if self.config.mute {
            return;
        }
        match self.config.reply_chunk_size {
            Some(size) if size > 0 => {
                for chunk in bytes.chunks(size) {
                    self.pending_output.push_back(chunk.to_vec());
                }
            }
            _ => self.pending_output.push_back(bytes),
        }
    }

    /// Take the next pending output bytes
    pub fn take_output(&mut self) -> Option<Vec<u8>> {
        self.pending_output.pop_front()
    }

    /// Check if there is pending output
    pub fn has_output(&self) -> bool {
        !self.pending_output.is_empty()
    }
}

impl Default for VirtualPsu {
    fn default() -> Self {
        Self::new()
    }
}

/// Five-character reading, as the front panel shows it
fn format_reading(value: f32, decimals: usize) -> Vec<u8> {
    format!("{:0width$.prec$}", value, width = 5, prec = decimals).into_bytes()
}

fn is_partial_mnemonic(buffer: &[u8]) -> bool {
    korad_protocol::COMMANDS
        .iter()
        .any(|s| s.mnemonic.len() > buffer.len() && s.mnemonic.as_bytes().starts_with(buffer))
}

/// Longest mnemonic the buffer starts with
fn longest_mnemonic_prefix(buffer: &[u8]) -> Option<&'static CommandSpec> {
    korad_protocol::COMMANDS
        .iter()
        .filter(|s| buffer.starts_with(s.mnemonic.as_bytes()))
        .max_by_key(|s| s.mnemonic.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drain(psu: &mut VirtualPsu) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(bytes) = psu.take_output() {
            out.extend(bytes);
        }
        out
    }

    #[test]
    fn test_identify() {
        let mut psu = VirtualPsu::new();
        psu.push_bytes(b"*IDN?");
        assert_eq!(drain(&mut psu), b"KORADKA3005PV2.0");
    }

    #[test]
    fn test_setters_are_silent() {
        let mut psu = VirtualPsu::new();
        psu.push_bytes(b"VSET1:12.34OUT1OVP1OCP1");
        assert!(!psu.has_output());
        assert_eq!(psu.voltage(), 12.34);
        assert!(psu.output());
        assert!(psu.ovp());
        assert!(psu.ocp());
        assert_eq!(psu.received(), ["VSET1:12.34", "OUT1", "OVP1", "OCP1"]);
    }

    #[test]
    fn test_readings() {
        let mut psu = VirtualPsu::new();
        psu.push_bytes(b"VSET1?VOUT1?");
        assert_eq!(drain(&mut psu), b"05.0000.00");

        psu.push_bytes(b"OUT1VOUT1?IOUT1?");
        assert_eq!(drain(&mut psu), b"05.000.500");
    }

    #[test]
    fn test_current_setpoint_has_trailing_byte() {
        let mut psu = VirtualPsu::new();
        psu.push_bytes(b"ISET1?");
        assert_eq!(drain(&mut psu), b"1.000\n");

        let mut psu = VirtualPsu::from_config(VirtualPsuConfig {
            trailing_byte_quirk: false,
            ..Default::default()
        });
        psu.push_bytes(b"ISET1?");
        assert_eq!(drain(&mut psu), b"1.000");
    }

    #[test]
    fn test_status_byte() {
        let mut psu = VirtualPsu::new();
        assert_eq!(psu.status_byte(), 0x11);
        psu.push_bytes(b"OUT1");
        assert_eq!(psu.status_byte(), 0x51);
        psu.push_bytes(b"VSET1:30.00");
        assert!(psu.is_constant_current());
        assert_eq!(psu.status_byte() & 0x01, 0);
    }

    #[test]
    fn test_presets() {
        let mut psu = VirtualPsu::new();
        psu.push_bytes(b"VSET1:3.30ISET1:0.250SAV2");
        psu.push_bytes(b"VSET1:12.00RCL2");
        assert_eq!(psu.voltage(), 3.3);
        assert_eq!(psu.current(), 0.25);
        assert_eq!(psu.preset(0), None);
        assert_eq!(psu.preset(6), None);
    }

    #[test]
    fn test_partial_mnemonic_waits() {
        let mut psu = VirtualPsu::new();
        psu.push_bytes(b"STAT");
        assert!(psu.received().is_empty());
        psu.push_bytes(b"US?");
        assert_eq!(psu.received(), ["STATUS?"]);
    }

    #[test]
    fn test_garbage_is_skipped() {
        let mut psu = VirtualPsu::new();
        psu.push_bytes(b"\r\nxyzTRACK1");
        assert_eq!(psu.received(), ["TRACK1"]);
        assert_eq!(psu.track(), 1);
    }

    #[test]
    fn test_setter_without_argument_is_dropped() {
        let mut psu = VirtualPsu::new();
        psu.push_bytes(b"OUTOVP1");
        assert_eq!(psu.received(), ["OVP1"]);
        assert!(!psu.output());
    }

    #[test]
    fn test_chunked_replies() {
        let mut psu = VirtualPsu::from_config(VirtualPsuConfig {
            reply_chunk_size: Some(2),
            ..Default::default()
        });
        psu.push_bytes(b"VOUT1?");
        assert_eq!(psu.take_output().unwrap(), b"00");
        assert_eq!(psu.take_output().unwrap(), b".0");
        assert_eq!(psu.take_output().unwrap(), b"0");
    }

    #[test]
    fn test_mute() {
        let mut psu = VirtualPsu::from_config(VirtualPsuConfig {
            mute: true,
            ..Default::default()
        });
        psu.push_bytes(b"*IDN?");
        assert!(!psu.has_output());
    }

    proptest! {
        #[test]
        fn prop_recovers_from_garbage(garbage in prop::collection::vec(any::<u8>(), 0..64)) {
            let mut psu = VirtualPsu::new();
            psu.push_bytes(&garbage);
            drain(&mut psu);

            psu.push_bytes(b"STATUS?");
            prop_assert_eq!(drain(&mut psu).len(), 1);
        }
    }
}
