//! Serial port enumeration
//!
//! Lists the system's serial ports with their USB metadata and filters out
//! the ones discovery should never open.

use serde::{Deserialize, Serialize};
use serialport::{available_ports, SerialPortType};
use tracing::{debug, info, trace};

use crate::error::DetectError;
use crate::usb_ids::{classify_port, PortClassification, UsbId};

/// Information about a serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., /dev/ttyACM0, COM3)
    pub port: String,
    /// USB Vendor ID (if USB)
    pub vid: Option<u16>,
    /// USB Product ID (if USB)
    pub pid: Option<u16>,
    /// USB serial number (if available)
    pub serial_number: Option<String>,
    /// USB manufacturer string
    pub manufacturer: Option<String>,
    /// USB product string
    pub product: Option<String>,
}

impl SerialPortInfo {
    /// Create from serialport crate's port info
    pub(crate) fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        match port_type {
            SerialPortType::UsbPort(usb) => Self {
                port: name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                serial_number: usb.serial_number.clone(),
                manufacturer: usb.manufacturer.clone(),
                product: usb.product.clone(),
            },
            _ => Self::plain(name),
        }
    }

    /// A port without USB metadata
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            port: name.into(),
            vid: None,
            pid: None,
            serial_number: None,
            manufacturer: None,
            product: None,
        }
    }

    /// A USB port with the given Vendor/Product ID
    pub fn usb(name: impl Into<String>, vid: u16, pid: u16) -> Self {
        Self {
            vid: Some(vid),
            pid: Some(pid),
            ..Self::plain(name)
        }
    }

    /// USB ID pair, if this is a USB port
    pub fn usb_id(&self) -> Option<UsbId> {
        match (self.vid, self.pid) {
            (Some(vid), Some(pid)) => Some(UsbId::new(vid, pid)),
            _ => None,
        }
    }

    pub fn is_usb(&self) -> bool {
        self.usb_id().is_some()
    }

    /// How the USB IDs classify this port
    pub fn classification(&self) -> PortClassification {
        classify_port(self.vid, self.pid).0
    }

    /// One-line summary of the USB metadata for logs
    ///
    /// e.g. `0416:5011 Nuvoton "USB Virtual COM" serial NT2009101400`
    pub fn describe(&self) -> String {
        let Some(id) = self.usb_id() else {
            return "no USB info".to_string();
        };
        let mut out = id.to_string();
        if let Some(manufacturer) = &self.manufacturer {
            out.push(' ');
            out.push_str(manufacturer);
        }
        if let Some(product) = &self.product {
            out.push_str(&format!(" \"{}\"", product));
        }
        if let Some(serial) = &self.serial_number {
            out.push_str(" serial ");
            out.push_str(serial);
        }
        out
    }
}

/// Which serial ports discovery should look at
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Skip ports whose name contains any of these
    pub skip_patterns: Vec<String>,
    /// Skip ports that carry no USB metadata (Korad supplies are all USB)
    pub usb_only: bool,
}

impl ScannerConfig {
    /// Skips the Bluetooth and debug console ports a bench PC tends to have
    pub fn bench() -> Self {
        Self {
            skip_patterns: vec!["Bluetooth".to_string(), "debug".to_string()],
            usb_only: false,
        }
    }
}

/// Lists the serial ports worth identifying
#[derive(Debug, Clone)]
pub struct PortScanner {
    config: ScannerConfig,
}

impl PortScanner {
    /// A scanner using [`ScannerConfig::bench`]
    pub fn new() -> Self {
        Self::with_config(ScannerConfig::bench())
    }

    pub fn with_config(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Enumerate the system's serial ports and drop the uninteresting ones
    pub fn enumerate_ports(&self) -> Result<Vec<SerialPortInfo>, DetectError> {
        let ports = available_ports().map_err(|e| DetectError::EnumerationFailed(e.to_string()))?;
        Ok(self.select(
            ports
                .into_iter()
                .map(|p| SerialPortInfo::from_serialport(p.port_name, &p.port_type)),
        ))
    }

    /// Apply the skip rules, keeping enumeration order
    pub fn select(&self, ports: impl IntoIterator<Item = SerialPortInfo>) -> Vec<SerialPortInfo> {
        let mut kept = Vec::new();
        for port in ports {
            if let Some(reason) = self.skip_reason(&port) {
                trace!("Skipping {} ({})", port.port, reason);
                continue;
            }
            debug!("Candidate {} [{:?}] {}", port.port, port.classification(), port.describe());
            kept.push(port);
        }

        let likely = kept.iter().filter(|p| p.classification().is_likely_psu()).count();
        info!(
            "{} candidate serial port(s), {} with a Korad USB ID",
            kept.len(),
            likely
        );
        kept
    }

    fn skip_reason(&self, port: &SerialPortInfo) -> Option<&'static str> {
        if self.config.usb_only && !port.is_usb() {
            return Some("not USB");
        }
        self.config
            .skip_patterns
            .iter()
            .any(|pattern| port.port.contains(pattern.as_str()))
            .then_some("name matches a skip pattern")
    }
}

impl Default for PortScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    #[test]
    fn test_serial_port_info_from_usb() {
        let usb_info = SerialPortType::UsbPort(UsbPortInfo {
            vid: 0x0416,
            pid: 0x5011,
            serial_number: Some("NT2009101400".to_string()),
            manufacturer: Some("Nuvoton".to_string()),
            product: Some("USB Virtual COM".to_string()),
        });

        let info = SerialPortInfo::from_serialport("/dev/ttyACM0".to_string(), &usb_info);

        assert_eq!(info.usb_id(), Some(UsbId::new(0x0416, 0x5011)));
        assert_eq!(info.manufacturer.as_deref(), Some("Nuvoton"));
        assert!(info.is_usb());
    }

    #[test]
    fn test_serial_port_info_from_native() {
        let info = SerialPortInfo::from_serialport("/dev/ttyS0".to_string(), &SerialPortType::Unknown);
        assert!(!info.is_usb());
        assert_eq!(info, SerialPortInfo::plain("/dev/ttyS0"));
    }

    #[test]
    fn test_bench_config_skips_bluetooth() {
        let scanner = PortScanner::new();
        let kept = scanner.select(vec![
            SerialPortInfo::plain("/dev/tty.Bluetooth-Incoming-Port"),
            SerialPortInfo::usb("/dev/ttyACM0", 0x0416, 0x5011),
            SerialPortInfo::plain("/dev/ttyS0"),
        ]);
        let names: Vec<_> = kept.iter().map(|p| p.port.as_str()).collect();
        assert_eq!(names, ["/dev/ttyACM0", "/dev/ttyS0"]);

        let scanner = PortScanner::with_config(ScannerConfig::default());
        assert_eq!(scanner.select(vec![SerialPortInfo::plain("/dev/tty.Bluetooth-Incoming-Port")]).len(), 1);
    }

    #[test]
    fn test_usb_only_keeps_order() {
        let scanner = PortScanner::with_config(ScannerConfig {
            usb_only: true,
            ..ScannerConfig::bench()
        });
        let kept = scanner.select(vec![
            SerialPortInfo::usb("/dev/ttyUSB0", 0x0403, 0x6001),
            SerialPortInfo::plain("/dev/ttyS0"),
            SerialPortInfo::usb("/dev/ttyACM0", 0x0416, 0x5011),
        ]);
        let names: Vec<_> = kept.iter().map(|p| p.port.as_str()).collect();
        assert_eq!(names, ["/dev/ttyUSB0", "/dev/ttyACM0"]);
        assert_eq!(kept[1].classification(), PortClassification::KnownPsu);
    }

    #[test]
    fn test_describe_usb_metadata() {
        let port = SerialPortInfo {
            serial_number: Some("NT2009101400".to_string()),
            manufacturer: Some("Nuvoton".to_string()),
            product: Some("USB Virtual COM".to_string()),
            ..SerialPortInfo::usb("/dev/ttyACM0", 0x0416, 0x5011)
        };
        assert_eq!(port.describe(), "0416:5011 Nuvoton \"USB Virtual COM\" serial NT2009101400");
        assert_eq!(SerialPortInfo::usb("COM3", 0x1a86, 0x7523).describe(), "1a86:7523");
        assert_eq!(SerialPortInfo::plain("/dev/ttyS0").describe(), "no USB info");
    }

    #[test]
    fn test_config_defaults_when_fields_missing() {
        let config: ScannerConfig = serde_json::from_str(r#"{"usb_only": true}"#).unwrap();
        assert!(config.usb_only);
        assert!(config.skip_patterns.is_empty());
    }
}
