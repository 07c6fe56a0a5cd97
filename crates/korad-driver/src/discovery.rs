//! Discovery engine
//!
//! Walks the candidate ports in order, opens each one with Korad framing and
//! runs the identification handshake. The first port that identifies as a
//! known supply becomes a [`Device`]; every other port is closed again.

use korad_detect::{classify_port, IdentityProber, LinkSettings, PortBackend, SerialPortInfo, SystemPorts};
use tokio_serial::SerialStream;
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::device::{Device, DeviceInfo};
use crate::error::DriverError;

/// Find the first supported power supply offered by `backend`
pub async fn discover_with<B>(backend: &B, config: DriverConfig) -> Result<Device<B::Stream>, DriverError>
where
    B: PortBackend,
{
    let ports = match backend.enumerate_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!("Port enumeration failed: {}", e);
            return Err(DriverError::NotFound);
        }
    };

    info!("Probing {} serial port(s)", ports.len());
    let prober = IdentityProber::with_config(config.probe.clone());

    for port in &ports {
        match probe_port(backend, &prober, port).await {
            Ok(Some(found)) => {
                info!(
                    "Found {} on {}",
                    found.info.model_name().unwrap_or("power supply"),
                    port.port
                );
                return Ok(Device::new(found.stream, found.info, config));
            }
            Ok(None) => debug!("No supported device on {}", port.port),
            Err(e) => warn!("Skipping {}: {}", port.port, e),
        }
    }

    info!("No supported power supply found");
    Err(DriverError::NotFound)
}

/// Open a specific port and confirm a supported supply is attached
pub async fn connect_with<B>(
    backend: &B,
    port: &SerialPortInfo,
    config: DriverConfig,
) -> Result<Device<B::Stream>, DriverError>
where
    B: PortBackend,
{
    let prober = IdentityProber::with_config(config.probe.clone());
    match probe_port(backend, &prober, port).await? {
        Some(found) => Ok(Device::new(found.stream, found.info, config)),
        None => Err(DriverError::NotFound),
    }
}

struct Found<S> {
    stream: S,
    info: DeviceInfo,
}

async fn probe_port<B>(
    backend: &B,
    prober: &IdentityProber,
    port: &SerialPortInfo,
) -> Result<Option<Found<B::Stream>>, DriverError>
where
    B: PortBackend,
{
    let (class, hint) = classify_port(port.vid, port.pid);
    debug!(
        "Probing {} ({:?}, {}): {}",
        port.port,
        class,
        hint.unwrap_or("unrecognized"),
        port.describe()
    );

    let usb_match = port.usb_id().and_then(|id| id.known_device());
    let mut stream = backend.open(port, &LinkSettings::korad())?;

    match prober.identify(&mut stream, usb_match).await {
        Some(result) => Ok(Some(Found {
            stream,
            info: DeviceInfo::from_probe(port.port.clone(), &result),
        })),
        // Dropping the stream closes the port
        None => Ok(None),
    }
}

impl Device<SerialStream> {
    /// Discover a supply on the host's serial ports with default settings
    pub async fn discover() -> Result<Self, DriverError> {
        Self::discover_with_config(DriverConfig::default()).await
    }

    /// Discover a supply on the host's serial ports
    pub async fn discover_with_config(config: DriverConfig) -> Result<Self, DriverError> {
        discover_with(&SystemPorts::new(), config).await
    }
}
