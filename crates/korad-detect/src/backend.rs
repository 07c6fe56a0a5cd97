//! Port backends
//!
//! Discovery only needs two things from the outside world: a list of
//! candidate ports and a way to open one as an async byte stream. The
//! [`PortBackend`] trait captures exactly that, so real serial ports and
//! simulated links go through the same discovery path.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::debug;

use crate::error::DetectError;
use crate::scanner::{PortScanner, SerialPortInfo};

/// Framing used to open a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Timeout applied by the serial driver to blocking operations
    pub timeout: Duration,
}

impl LinkSettings {
    /// 9600 baud, 8N1, XON/XOFF
    pub const fn korad() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::Software,
            timeout: Duration::from_millis(100),
        }
    }
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self::korad()
    }
}

/// Source of candidate ports
pub trait PortBackend {
    /// Stream type produced by [`PortBackend::open`]
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// List candidate ports in probe order
    fn enumerate_ports(&self) -> Result<Vec<SerialPortInfo>, DetectError>;

    /// Open and configure a port; dropping the stream closes it
    fn open(&self, port: &SerialPortInfo, settings: &LinkSettings) -> Result<Self::Stream, DetectError>;
}

/// The host's serial ports, opened through tokio-serial
///
/// Must be used from within a tokio runtime.
#[derive(Default)]
pub struct SystemPorts {
    scanner: PortScanner,
}

impl SystemPorts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scanner(scanner: PortScanner) -> Self {
        Self { scanner }
    }
}

impl PortBackend for SystemPorts {
    type Stream = SerialStream;

    fn enumerate_ports(&self) -> Result<Vec<SerialPortInfo>, DetectError> {
        self.scanner.enumerate_ports()
    }

    fn open(&self, port: &SerialPortInfo, settings: &LinkSettings) -> Result<SerialStream, DetectError> {
        debug!("Opening {} at {} baud", port.port, settings.baud_rate);

        tokio_serial::new(port.port.as_str(), settings.baud_rate)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(settings.stop_bits)
            .flow_control(settings.flow_control)
            .timeout(settings.timeout)
            .open_native_async()
            .map_err(|e| DetectError::OpenFailed {
                port: port.port.clone(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_korad_framing() {
        let settings = LinkSettings::default();
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.data_bits, DataBits::Eight);
        assert_eq!(settings.parity, Parity::None);
        assert_eq!(settings.stop_bits, StopBits::One);
        assert_eq!(settings.flow_control, FlowControl::Software);
    }
}
