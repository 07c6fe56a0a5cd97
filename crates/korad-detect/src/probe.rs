//! Identification handshake
//!
//! This module sends `*IDN?` to an open port and compares the identity
//! string against the known-device catalog. A USB ID match is only a
//! candidate; the handshake has the final word.

use std::io::ErrorKind;
use std::time::Duration;

use korad_protocol::{mnemonic, KnownDevice, IDENTITY_LENGTH};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

/// How a device was recognized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    /// USB ID matched and the identity string confirmed it
    UsbId,
    /// Identity string alone matched a catalog entry
    Handshake,
}

/// Result of a successful identification
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// Identified model
    pub device: &'static KnownDevice,
    pub source: MatchSource,
    /// Raw identity bytes as read
    pub identity: Vec<u8>,
}

/// Configuration for probing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Timeout for each identity read attempt
    pub read_timeout_ms: u64,
    /// Number of read attempts before giving up on a short identity
    pub max_read_attempts: u32,
}

impl ProbeConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 40,
            max_read_attempts: 100,
        }
    }
}

/// Power supply identity prober
#[derive(Debug, Default)]
pub struct IdentityProber {
    config: ProbeConfig,
}

impl IdentityProber {
    /// Create a new prober with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a prober with custom configuration
    pub fn with_config(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// Run the handshake on an open stream
    ///
    /// `usb_match` is the catalog entry suggested by the port's USB ID, if
    /// any. When present the identity must confirm it; otherwise the whole
    /// catalog is searched.
    pub async fn identify<S>(
        &self,
        stream: &mut S,
        usb_match: Option<&'static KnownDevice>,
    ) -> Option<ProbeResult>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let expected = usb_match.map_or(IDENTITY_LENGTH, KnownDevice::identity_length);

        trace!("Sending identity probe");
        if let Err(e) = Self::send_probe(stream).await {
            warn!("Failed to write identity probe: {}", e);
            return None;
        }

        let identity = match self.read_identity(stream, expected).await {
            Ok(identity) => identity,
            Err(e) => {
                debug!("Identity read error: {}", e);
                return None;
            }
        };
        trace!("Identity response: {:?}", String::from_utf8_lossy(&identity));

        if identity.is_empty() {
            debug!("No response to identity probe");
            return None;
        }

        let result = match usb_match {
            Some(device) if device.matches_identity(&identity) => ProbeResult {
                device,
                source: MatchSource::UsbId,
                identity,
            },
            Some(device) => {
                debug!(
                    "USB ID suggested {} but identity was {:?}",
                    device.name,
                    String::from_utf8_lossy(&identity)
                );
                return None;
            }
            None => ProbeResult {
                device: KnownDevice::by_identity(&identity)?,
                source: MatchSource::Handshake,
                identity,
            },
        };

        info!(
            "Identified {} via {}",
            result.device.name,
            match result.source {
                MatchSource::UsbId => "USB ID and handshake",
                MatchSource::Handshake => "handshake",
            }
        );
        Some(result)
    }

    async fn send_probe<S>(stream: &mut S) -> std::io::Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        stream.write_all(mnemonic::IDENTIFY.as_bytes()).await?;
        stream.flush().await
    }

    /// Accumulate up to `expected` identity bytes
    ///
    /// Short reads and read timeouts are retried until the attempt budget
    /// runs out; whatever was gathered by then is returned.
    pub async fn read_identity<S>(&self, stream: &mut S, expected: usize) -> std::io::Result<Vec<u8>>
    where
        S: AsyncRead + Unpin,
    {
        let mut identity = vec![0u8; expected];
        let mut filled = 0;

        for _ in 0..self.config.max_read_attempts {
            if filled >= expected {
                break;
            }
            match timeout(self.config.read_timeout(), stream.read(&mut identity[filled..])).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => filled += n,
                Ok(Err(e)) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Ok(Err(e)) => return Err(e),
                Err(_) => {}
            }
        }

        identity.truncate(filled);
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_prober() -> IdentityProber {
        IdentityProber::with_config(ProbeConfig {
            read_timeout_ms: 5,
            max_read_attempts: 4,
        })
    }

    #[test]
    fn test_probe_config_default() {
        let config = ProbeConfig::default();
        assert_eq!(config.read_timeout(), Duration::from_millis(40));
        assert_eq!(config.max_read_attempts, 100);
    }

    #[tokio::test]
    async fn test_identify_by_handshake() {
        let (mut host, mut device) = tokio::io::duplex(64);
        device.write_all(b"KORADKA3005PV2.0").await.unwrap();

        let result = fast_prober().identify(&mut host, None).await.unwrap();
        assert_eq!(result.device.name, "KORADKA3005PV2.0");
        assert_eq!(result.source, MatchSource::Handshake);

        let mut probe = [0u8; 5];
        device.read_exact(&mut probe).await.unwrap();
        assert_eq!(&probe, b"*IDN?");
    }

    #[tokio::test]
    async fn test_identify_confirms_usb_match() {
        let (mut host, mut device) = tokio::io::duplex(64);
        device.write_all(b"KORADKA3005PV2.0").await.unwrap();

        let usb = KnownDevice::by_usb_id(0x0416, 0x5011);
        let result = fast_prober().identify(&mut host, usb).await.unwrap();
        assert_eq!(result.source, MatchSource::UsbId);
    }

    #[tokio::test]
    async fn test_usb_match_rejected_by_identity() {
        let (mut host, mut device) = tokio::io::duplex(64);
        device.write_all(b"UNKNOWN").await.unwrap();

        let usb = KnownDevice::by_usb_id(0x0416, 0x5011);
        assert!(fast_prober().identify(&mut host, usb).await.is_none());
    }

    #[tokio::test]
    async fn test_silent_port_is_rejected() {
        let (mut host, _device) = tokio::io::duplex(64);
        assert!(fast_prober().identify(&mut host, None).await.is_none());
    }

    #[tokio::test]
    async fn test_short_reads_accumulate() {
        let (mut host, mut device) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            for chunk in [&b"KORAD"[..], b"KA3005", b"PV2.0"] {
                device.write_all(chunk).await.unwrap();
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            device
        });

        let prober = IdentityProber::with_config(ProbeConfig {
            read_timeout_ms: 50,
            max_read_attempts: 10,
        });
        let identity = prober.read_identity(&mut host, IDENTITY_LENGTH).await.unwrap();
        assert_eq!(identity, b"KORADKA3005PV2.0");
        let _ = writer.await;
    }
}
