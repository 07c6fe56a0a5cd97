//! USB Vendor/Product ID classification
//!
//! Korad supplies enumerate through a Nuvoton USB virtual COM bridge. Other
//! USB-to-serial adapters are common on a bench too, so ports are classified
//! before probing to make logs readable and to let callers filter.

use korad_protocol::KnownDevice;

/// USB Vendor ID / Product ID pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UsbId {
    pub vid: u16,
    pub pid: u16,
}

impl UsbId {
    pub const fn new(vid: u16, pid: u16) -> Self {
        Self { vid, pid }
    }

    /// The known power supply using this ID, if any
    pub fn known_device(&self) -> Option<&'static KnownDevice> {
        KnownDevice::by_usb_id(self.vid, self.pid)
    }
}

impl std::fmt::Display for UsbId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vid, self.pid)
    }
}

/// Nuvoton (built into Korad supplies)
pub mod nuvoton {
    use super::UsbId;

    pub const VID: u16 = 0x0416;

    pub const VIRTUAL_COM: UsbId = UsbId::new(VID, 0x5011);
}

/// FTDI (Future Technology Devices International)
pub mod ftdi {
    pub const VID: u16 = 0x0403;

    /// All known FTDI product IDs
    pub const ALL_PIDS: &[u16] = &[0x6001, 0x6010, 0x6011, 0x6014, 0x6015];
}

/// Silicon Labs CP210x
pub mod cp210x {
    pub const VID: u16 = 0x10C4;

    /// All known CP210x product IDs
    pub const ALL_PIDS: &[u16] = &[0xEA60, 0xEA70, 0xEA71];
}

/// WCH CH340/CH341
pub mod ch340 {
    pub const VID: u16 = 0x1A86;

    /// All known CH340/341 product IDs
    pub const ALL_PIDS: &[u16] = &[0x7523, 0x5523];
}

/// Prolific PL2303
pub mod prolific {
    pub const VID: u16 = 0x067B;

    /// All known Prolific product IDs
    pub const ALL_PIDS: &[u16] = &[0x2303];
}

/// Check if a VID/PID is a known generic serial adapter
pub fn is_known_serial_adapter(vid: u16, pid: u16) -> bool {
    match vid {
        ftdi::VID => ftdi::ALL_PIDS.contains(&pid),
        cp210x::VID => cp210x::ALL_PIDS.contains(&pid),
        ch340::VID => ch340::ALL_PIDS.contains(&pid),
        prolific::VID => prolific::ALL_PIDS.contains(&pid),
        _ => false,
    }
}

/// Get adapter type name from VID
pub fn adapter_name(vid: u16) -> Option<&'static str> {
    match vid {
        nuvoton::VID => Some("Nuvoton"),
        ftdi::VID => Some("FTDI"),
        cp210x::VID => Some("CP210x"),
        ch340::VID => Some("CH340"),
        prolific::VID => Some("PL2303"),
        _ => None,
    }
}

/// Port classification by USB metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PortClassification {
    /// USB ID of a known power supply
    KnownPsu,
    /// Known serial adapter (FTDI, CP210x, CH340, PL2303); could be anything
    KnownAdapter,
    /// Non-USB or unrecognized device
    Unknown,
}

impl PortClassification {
    /// Returns true if the USB ID alone suggests a power supply
    pub fn is_likely_psu(&self) -> bool {
        matches!(self, Self::KnownPsu)
    }
}

/// Classify a port based on USB IDs
///
/// Returns the classification tier and an optional hint string for display
/// (e.g., "KORADKA3005PV2.0", "FTDI")
pub fn classify_port(vid: Option<u16>, pid: Option<u16>) -> (PortClassification, Option<&'static str>) {
    let (Some(v), Some(p)) = (vid, pid) else {
        return (PortClassification::Unknown, None);
    };

    if let Some(device) = KnownDevice::by_usb_id(v, p) {
        return (PortClassification::KnownPsu, Some(device.name));
    }

    if is_known_serial_adapter(v, p) {
        return (PortClassification::KnownAdapter, adapter_name(v));
    }

    (PortClassification::Unknown, adapter_name(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_korad_is_known_psu() {
        let (class, hint) = classify_port(Some(0x0416), Some(0x5011));
        assert_eq!(class, PortClassification::KnownPsu);
        assert_eq!(hint, Some("KORADKA3005PV2.0"));
        assert!(class.is_likely_psu());
        assert!(nuvoton::VIRTUAL_COM.known_device().is_some());
    }

    #[test]
    fn test_adapter_classification() {
        let (class, hint) = classify_port(Some(0x0403), Some(0x6001));
        assert_eq!(class, PortClassification::KnownAdapter);
        assert_eq!(hint, Some("FTDI"));
        assert!(!class.is_likely_psu());
    }

    #[test]
    fn test_unknown_classification() {
        assert_eq!(classify_port(None, None), (PortClassification::Unknown, None));
        assert_eq!(
            classify_port(Some(0x0416), Some(0x0001)),
            (PortClassification::Unknown, Some("Nuvoton"))
        );
    }

    #[test]
    fn test_usb_id_display() {
        assert_eq!(UsbId::new(0x0416, 0x5011).to_string(), "0416:5011");
    }

    proptest! {
        #[test]
        fn prop_known_psu_iff_catalog_match(vid: u16, pid: u16) {
            let (class, _) = classify_port(Some(vid), Some(pid));
            prop_assert_eq!(class.is_likely_psu(), KnownDevice::by_usb_id(vid, pid).is_some());
            prop_assert_eq!(UsbId::new(vid, pid).to_string().len(), 9);
        }
    }
}
