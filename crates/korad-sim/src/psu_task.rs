//! Virtual power supply task
//!
//! Runs a [`VirtualPsu`] against an async byte stream, typically one half of
//! `tokio::io::duplex()`, so the driver can be exercised end to end without
//! hardware.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::VirtualPsu;

/// Serve the wire protocol on `stream` until the host closes it
///
/// Returns the supply so tests can inspect its final state.
pub async fn run_virtual_psu<S>(mut stream: S, mut psu: VirtualPsu) -> io::Result<VirtualPsu>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 256];
    let chunk_delay = Duration::from_millis(psu.config().chunk_delay_ms);
    let chunked = psu.config().reply_chunk_size.is_some();

    info!("Starting virtual PSU task ({})", psu.config().identity);

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            debug!("Virtual PSU stream closed");
            break;
        }

        psu.push_bytes(&buf[..n]);

        while let Some(bytes) = psu.take_output() {
            debug!("Virtual PSU replying {:02X?}", bytes);
            stream.write_all(&bytes).await?;
            stream.flush().await?;
            if chunked && psu.has_output() {
                tokio::time::sleep(chunk_delay).await;
            }
        }
    }

    Ok(psu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VirtualPsuConfig;

    #[tokio::test]
    async fn test_task_answers_and_returns_state() {
        let (mut host, device) = tokio::io::duplex(1024);
        let task = tokio::spawn(run_virtual_psu(device, VirtualPsu::new()));

        host.write_all(b"OUT1").await.unwrap();
        host.write_all(b"STATUS?").await.unwrap();

        let mut status = [0u8; 1];
        host.read_exact(&mut status).await.unwrap();
        assert_eq!(status[0] & 0x40, 0x40);

        drop(host);
        let psu = task.await.unwrap().unwrap();
        assert!(psu.output());
        assert_eq!(psu.received(), ["OUT1", "STATUS?"]);
    }

    #[tokio::test]
    async fn test_task_chunks_replies() {
        let (mut host, device) = tokio::io::duplex(1024);
        let psu = VirtualPsu::from_config(VirtualPsuConfig {
            reply_chunk_size: Some(3),
            chunk_delay_ms: 1,
            ..Default::default()
        });
        let task = tokio::spawn(run_virtual_psu(device, psu));

        host.write_all(b"*IDN?").await.unwrap();
        let mut identity = [0u8; 16];
        host.read_exact(&mut identity).await.unwrap();
        assert_eq!(&identity, b"KORADKA3005PV2.0");

        drop(host);
        task.await.unwrap().unwrap();
    }
}
