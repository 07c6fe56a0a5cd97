//! Known power supply models
//!
//! This module contains the power supplies the driver recognizes, keyed by
//! the USB IDs of their built-in serial bridge and by the identity string
//! they return for `*IDN?`.

/// A power supply model the driver knows how to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct KnownDevice {
    /// Display name, also the identity string prefix returned by `*IDN?`
    pub name: &'static str,
    /// USB Vendor ID of the device's serial bridge
    pub vendor_id: u16,
    /// USB Product ID of the device's serial bridge
    pub product_id: u16,
}

/// All known models
pub const KNOWN_DEVICES: &[KnownDevice] = &[KnownDevice::new("KORADKA3005PV2.0", 0x0416, 0x5011)];

/// Number of identity bytes to wait for when the model is not known yet
pub const IDENTITY_LENGTH: usize = longest_name(KNOWN_DEVICES);

const fn longest_name(devices: &[KnownDevice]) -> usize {
    let mut longest = 0;
    let mut i = 0;
    while i < devices.len() {
        if devices[i].name.len() > longest {
            longest = devices[i].name.len();
        }
        i += 1;
    }
    longest
}

impl KnownDevice {
    pub const fn new(name: &'static str, vendor_id: u16, product_id: u16) -> Self {
        Self {
            name,
            vendor_id,
            product_id,
        }
    }

    /// Look up a model by its USB Vendor/Product ID
    pub fn by_usb_id(vendor_id: u16, product_id: u16) -> Option<&'static KnownDevice> {
        KNOWN_DEVICES
            .iter()
            .find(|d| d.vendor_id == vendor_id && d.product_id == product_id)
    }

    /// Find the first model whose name matches an identity reply
    pub fn by_identity(reply: &[u8]) -> Option<&'static KnownDevice> {
        KNOWN_DEVICES.iter().find(|d| d.matches_identity(reply))
    }

    /// Check an identity reply against this model's name
    ///
    /// The reply is read with the name length as its budget, so it matches
    /// when it is a non-empty prefix of the name.
    pub fn matches_identity(&self, reply: &[u8]) -> bool {
        !reply.is_empty() && self.name.as_bytes().starts_with(reply)
    }

    /// Number of identity bytes this model sends
    pub fn identity_length(&self) -> usize {
        self.name.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_usb_id() {
        let dev = KnownDevice::by_usb_id(0x0416, 0x5011).unwrap();
        assert_eq!(dev.name, "KORADKA3005PV2.0");
        assert!(KnownDevice::by_usb_id(0x0403, 0x6001).is_none());
    }

    #[test]
    fn test_identity_length_is_longest_name() {
        let longest = KNOWN_DEVICES.iter().map(|d| d.name.len()).max().unwrap();
        assert_eq!(IDENTITY_LENGTH, longest);
    }

    #[test]
    fn test_matches_identity() {
        let dev = &KNOWN_DEVICES[0];
        assert!(dev.matches_identity(b"KORADKA3005PV2.0"));
        assert!(dev.matches_identity(b"KORAD"));
        assert!(!dev.matches_identity(b""));
        assert!(!dev.matches_identity(b"UNKNOWN"));
        assert!(!dev.matches_identity(b"KORADKA3005PV2.0X"));
    }

    #[test]
    fn test_by_identity() {
        assert!(KnownDevice::by_identity(b"KORADKA3005PV2.0").is_some());
        assert!(KnownDevice::by_identity(b"UNKNOWN").is_none());
    }
}
