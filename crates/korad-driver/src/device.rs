//! Device and transport state machine
//!
//! A [`Device`] owns the serial stream and runs the drive loop. Commands are
//! queued through a cloneable [`DeviceHandle`] from any task; the loop writes
//! the head command, gathers its reply across as many reads as it takes,
//! converts it and hands the finished command to its completion callback.
//!
//! Exactly one command is in flight at a time. The loop returns when it is
//! stopped, when nothing has happened for `idle_tick_limit` ticks, or on an
//! I/O failure.

use std::fmt;
use std::io::{self, ErrorKind};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use korad_detect::{MatchSource, ProbeResult};
use korad_protocol::{convert, mnemonic, Arg, CommandSpec, KnownDevice, Quirk};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{oneshot, Notify};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::command::{Command, Completed, Completion};
use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::queue::CommandQueue;

/// Why [`Device::drive`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveOutcome {
    /// The stop flag was set
    Stopped,
    /// Too many consecutive ticks passed without progress
    Idle,
}

/// Result of a single drive loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickState {
    /// Queue empty, idle wait timed out
    NoCommand,
    /// Head command is waiting for reply bytes that have not arrived
    ReadAgain,
    /// Something was written, read, completed, or the loop was woken
    Progress,
}

/// Where a device was found and what it is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Port name, e.g. `/dev/ttyACM0`
    pub port: String,
    /// Matched catalog entry
    pub model: Option<&'static KnownDevice>,
    pub matched_by: Option<MatchSource>,
}

impl DeviceInfo {
    /// Info for a stream that was not identified
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            model: None,
            matched_by: None,
        }
    }

    pub(crate) fn from_probe(port: impl Into<String>, probe: &ProbeResult) -> Self {
        Self {
            port: port.into(),
            model: Some(probe.device),
            matched_by: Some(probe.source),
        }
    }

    /// Model name, if identified
    pub fn model_name(&self) -> Option<&'static str> {
        self.model.map(|m| m.name)
    }
}

/// State shared between the drive loop and every handle
#[derive(Debug, Default)]
struct Shared {
    queue: Mutex<CommandQueue>,
    stop: AtomicBool,
    wake: Notify,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, CommandQueue> {
        // A panicking callback never runs under the lock, so the queue is intact
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable sender side of a device
///
/// Every method only touches the shared queue and never blocks on I/O, so
/// handles can be used from any task or thread while the drive loop runs.
#[derive(Debug, Clone, Default)]
pub struct DeviceHandle {
    shared: Arc<Shared>,
}

impl DeviceHandle {
    fn new() -> Self {
        Self::default()
    }

    /// Queue a command by mnemonic
    ///
    /// Unknown mnemonics and bad arguments are rejected without touching the
    /// queue, as is anything sent after [`DeviceHandle::stop`].
    pub fn send(
        &self,
        mnemonic: &str,
        args: &[Arg],
        on_complete: Option<Completion>,
    ) -> Result<(), DriverError> {
        let mut command = Command::new(mnemonic, args)?;
        if let Some(on_complete) = on_complete {
            command = command.with_completion(on_complete);
        }
        self.enqueue(command)
    }

    /// Queue a command and receive its outcome through a channel
    pub fn query(&self, mnemonic: &str, args: &[Arg]) -> Result<oneshot::Receiver<Completed>, DriverError> {
        let (tx, rx) = oneshot::channel();
        self.send_with(mnemonic, args, move |_, command| {
            let _ = tx.send(Completed::from(command));
        })?;
        Ok(rx)
    }

    /// Append an already rendered command and wake the drive loop
    ///
    /// Fails with [`DriverError::Stopped`] once the device is stopped or
    /// closed, since the command would never be written.
    pub fn enqueue(&self, command: Command) -> Result<(), DriverError> {
        if self.is_stopped() {
            debug!("Rejecting {}, device stopped", command.mnemonic());
            return Err(DriverError::Stopped);
        }
        debug!("Queueing {}", command.mnemonic());
        self.shared.queue().push_back(command);
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Number of commands waiting, including the one in flight
    pub fn pending(&self) -> usize {
        self.shared.queue().len()
    }

    /// Ask the drive loop to return at the start of its next tick
    ///
    /// In-flight I/O is not interrupted. The flag stays set, and later sends
    /// fail with [`DriverError::Stopped`].
    pub fn stop(&self) {
        debug!("Stop requested");
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stop.load(Ordering::SeqCst)
    }

    /// Queue a command with a completion closure
    pub fn send_with<F>(&self, mnemonic: &str, args: &[Arg], on_complete: F) -> Result<(), DriverError>
    where
        F: FnOnce(&DeviceHandle, &Command) + Send + 'static,
    {
        self.send(mnemonic, args, Some(Box::new(on_complete)))
    }

    /// Set the output voltage (V)
    pub fn set_voltage(&self, volts: f32) -> Result<(), DriverError> {
        self.send(mnemonic::SET_VOLTAGE, &[volts.into()], None)
    }

    /// Set the current limit (A)
    pub fn set_current(&self, amps: f32) -> Result<(), DriverError> {
        self.send(mnemonic::SET_CURRENT, &[amps.into()], None)
    }

    /// Query the voltage setpoint
    pub fn get_maximum_voltage<F>(&self, on_complete: F) -> Result<(), DriverError>
    where
        F: FnOnce(&DeviceHandle, &Command) + Send + 'static,
    {
        self.send_with(mnemonic::VOLTAGE_SETPOINT, &[], on_complete)
    }

    /// Query the current limit
    pub fn get_maximum_current<F>(&self, on_complete: F) -> Result<(), DriverError>
    where
        F: FnOnce(&DeviceHandle, &Command) + Send + 'static,
    {
        self.send_with(mnemonic::CURRENT_SETPOINT, &[], on_complete)
    }

    /// Query the measured output voltage
    pub fn get_actual_voltage<F>(&self, on_complete: F) -> Result<(), DriverError>
    where
        F: FnOnce(&DeviceHandle, &Command) + Send + 'static,
    {
        self.send_with(mnemonic::VOLTAGE_ACTUAL, &[], on_complete)
    }

    /// Query the measured output current
    pub fn get_actual_current<F>(&self, on_complete: F) -> Result<(), DriverError>
    where
        F: FnOnce(&DeviceHandle, &Command) + Send + 'static,
    {
        self.send_with(mnemonic::CURRENT_ACTUAL, &[], on_complete)
    }

    pub fn get_status<F>(&self, on_complete: F) -> Result<(), DriverError>
    where
        F: FnOnce(&DeviceHandle, &Command) + Send + 'static,
    {
        self.send_with(mnemonic::STATUS, &[], on_complete)
    }

    pub fn identify<F>(&self, on_complete: F) -> Result<(), DriverError>
    where
        F: FnOnce(&DeviceHandle, &Command) + Send + 'static,
    {
        self.send_with(mnemonic::IDENTIFY, &[], on_complete)
    }

    pub fn output(&self, on: bool) -> Result<(), DriverError> {
        self.send(mnemonic::OUTPUT, &[on.into()], None)
    }

    pub fn output_on(&self) -> Result<(), DriverError> {
        self.output(true)
    }

    pub fn output_off(&self) -> Result<(), DriverError> {
        self.output(false)
    }

    /// Enable or disable over-voltage protection
    pub fn ovp(&self, on: bool) -> Result<(), DriverError> {
        self.send(mnemonic::OVP, &[on.into()], None)
    }

    pub fn ovp_on(&self) -> Result<(), DriverError> {
        self.ovp(true)
    }

    pub fn ovp_off(&self) -> Result<(), DriverError> {
        self.ovp(false)
    }

    /// Enable or disable over-current protection
    pub fn ocp(&self, on: bool) -> Result<(), DriverError> {
        self.send(mnemonic::OCP, &[on.into()], None)
    }

    pub fn ocp_on(&self) -> Result<(), DriverError> {
        self.ocp(true)
    }

    pub fn ocp_off(&self) -> Result<(), DriverError> {
        self.ocp(false)
    }

    /// Select the tracking mode (0 independent, 1 series, 2 parallel)
    pub fn track(&self, mode: u32) -> Result<(), DriverError> {
        self.send(mnemonic::TRACK, &[mode.into()], None)
    }

    /// Store the current settings to a preset slot
    pub fn save(&self, slot: u32) -> Result<(), DriverError> {
        self.send(mnemonic::SAVE, &[slot.into()], None)
    }

    /// Recall a preset slot
    pub fn recall(&self, slot: u32) -> Result<(), DriverError> {
        self.send(mnemonic::RECALL, &[slot.into()], None)
    }
}

/// A connected power supply
///
/// Generic over the stream so simulated links can stand in for a serial
/// port. Dereferences to its [`DeviceHandle`].
pub struct Device<S> {
    stream: S,
    info: DeviceInfo,
    handle: DeviceHandle,
    config: DriverConfig,
    buffer: Vec<u8>,
    cursor: usize,
    poisoned: bool,
}

impl<S> fmt::Debug for Device<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("info", &self.info)
            .field("cursor", &self.cursor)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

impl<S> Device<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an open stream
    pub fn new(stream: S, info: DeviceInfo, config: DriverConfig) -> Self {
        let buffer = vec![0u8; config.receive_buffer_size];
        Self {
            stream,
            info,
            handle: DeviceHandle::new(),
            config,
            buffer,
            cursor: 0,
            poisoned: false,
        }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// A handle for queueing commands from other tasks
    pub fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    /// Reply bytes accumulated for the head command
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Whether a buffer overflow is waiting for [`Device::reset`]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Run the transport state machine
    ///
    /// Returns `Stopped` once the stop flag is seen and `Idle` after
    /// `idle_tick_limit` consecutive ticks without progress. Either way the
    /// device stays usable and `drive` may be called again.
    pub async fn drive(&mut self) -> Result<DriveOutcome, DriverError> {
        let mut idle_ticks = 0u32;

        loop {
            if self.handle.is_stopped() {
                info!("Drive loop stopped on {}", self.info.port);
                return Ok(DriveOutcome::Stopped);
            }
            if self.poisoned {
                return Err(DriverError::BufferOverflow {
                    capacity: self.buffer.len(),
                });
            }

            match self.tick().await? {
                TickState::Progress => idle_ticks = 0,
                TickState::NoCommand | TickState::ReadAgain => {
                    idle_ticks += 1;
                    if idle_ticks >= self.config.idle_tick_limit {
                        debug!("No progress for {} ticks on {}", idle_ticks, self.info.port);
                        return Ok(DriveOutcome::Idle);
                    }
                }
            }
        }
    }

    async fn tick(&mut self) -> Result<TickState, DriverError> {
        // Wire bytes are only copied out while the head still needs writing
        let head = self
            .handle
            .shared
            .queue()
            .front()
            .map(|c| (c.spec(), (!c.is_sent()).then(|| c.wire().to_vec())));

        match head {
            None => Ok(wait_for_command(&self.handle.shared, self.config.idle_wait()).await),
            Some((spec, Some(wire))) => self.send_head(spec, &wire).await,
            Some((spec, None)) => self.receive_head(spec).await,
        }
    }

    async fn send_head(&mut self, spec: &'static CommandSpec, wire: &[u8]) -> Result<TickState, DriverError> {
        debug!("Sending {:?}", String::from_utf8_lossy(wire));

        match timeout(self.config.write_timeout(), write_all(&mut self.stream, wire)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Write error on {}: {}", self.info.port, e);
                return Err(DriverError::WriteError(e.to_string()));
            }
            Err(_) => {
                warn!("Write timed out on {}", self.info.port);
                return Err(DriverError::WriteError("write timed out".to_string()));
            }
        }

        let finished = {
            let mut queue = self.handle.shared.queue();
            if let Some(head) = queue.front_mut() {
                head.mark_sent();
            }
            if spec.has_reply {
                None
            } else {
                queue.pop_front()
            }
        };

        if let Some(command) = finished {
            self.complete(command);
        }
        Ok(TickState::Progress)
    }

    async fn receive_head(&mut self, spec: &'static CommandSpec) -> Result<TickState, DriverError> {
        let capacity = self.buffer.len();
        if self.cursor >= capacity {
            return Err(self.overflow());
        }

        let end = spec.reply_length.clamp(self.cursor + 1, capacity);
        let read = timeout(
            self.config.read_timeout(),
            self.stream.read(&mut self.buffer[self.cursor..end]),
        )
        .await;

        match read {
            Err(_) => return Ok(TickState::ReadAgain),
            Ok(Ok(0)) => {
                warn!("Connection closed on {}", self.info.port);
                return Err(DriverError::ReadError("connection closed".to_string()));
            }
            Ok(Ok(n)) => {
                trace!("Read {} bytes: {:02X?}", n, &self.buffer[self.cursor..self.cursor + n]);
                self.cursor += n;
            }
            Ok(Err(e)) if is_transient(&e) => return Ok(TickState::ReadAgain),
            Ok(Err(e)) => {
                warn!("Read error on {}: {}", self.info.port, e);
                return Err(DriverError::ReadError(e.to_string()));
            }
        }

        if self.cursor < spec.reply_length {
            if self.cursor >= capacity {
                return Err(self.overflow());
            }
            return Ok(TickState::Progress);
        }

        let reply = convert(spec, &self.buffer[..self.cursor]);
        if spec.quirk == Some(Quirk::TrailingByte) {
            self.drain_trailing_byte().await;
        }
        self.cursor = 0;

        let finished = self.handle.shared.queue().pop_front();
        if let Some(mut command) = finished {
            command.set_result(reply);
            self.complete(command);
        }
        Ok(TickState::Progress)
    }

    /// Consume the extra byte the firmware appends to some replies
    async fn drain_trailing_byte(&mut self) {
        let mut byte = [0u8; 1];
        match timeout(self.config.quirk_drain_timeout(), self.stream.read(&mut byte)).await {
            Ok(Ok(1)) => trace!("Discarded trailing byte {:02X}", byte[0]),
            _ => debug!("Expected trailing byte did not arrive"),
        }
    }

    /// Give up on the head command; it completes without a result
    fn overflow(&mut self) -> DriverError {
        let capacity = self.buffer.len();
        warn!("Receive buffer overflow on {} ({} bytes)", self.info.port, capacity);
        self.poisoned = true;

        let abandoned = self.handle.shared.queue().pop_front();
        if let Some(command) = abandoned {
            self.complete(command);
        }
        DriverError::BufferOverflow { capacity }
    }

    fn complete(&self, mut command: Command) {
        debug!("Completed {}: {:?}", command.mnemonic(), command.result());
        if let Some(on_complete) = command.take_completion() {
            on_complete(&self.handle, &command);
        }
    }

    /// Ask the drive loop to return; see [`DeviceHandle::stop`]
    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Clear a buffer overflow and discard any partial reply
    ///
    /// Input already waiting on the port belongs to the abandoned reply and
    /// is read and dropped, so the next queued command starts clean. Gives
    /// up after `idle_tick_limit` reads if the port keeps talking.
    pub async fn reset(&mut self) {
        if self.poisoned || self.cursor > 0 {
            info!("Resetting receive state on {}", self.info.port);
        }
        self.poisoned = false;
        self.cursor = 0;

        let mut discarded = 0usize;
        for _ in 0..self.config.idle_tick_limit.max(1) {
            match timeout(self.config.quirk_drain_timeout(), self.stream.read(&mut self.buffer)).await {
                Ok(Ok(n)) if n > 0 => discarded += n,
                _ => break,
            }
        }
        if discarded > 0 {
            debug!("Discarded {} stale bytes on {}", discarded, self.info.port);
        }
    }

    /// Close the port and discard every queued command
    ///
    /// Completion callbacks of discarded commands are not run. Returns the
    /// number of commands dropped.
    pub fn close(self) -> usize {
        let Self {
            stream, info, handle, ..
        } = self;
        drop(stream);

        handle.shared.stop.store(true, Ordering::SeqCst);
        let discarded = handle.shared.queue().drain().len();
        info!("Closed {} ({} queued commands discarded)", info.port, discarded);
        discarded
    }
}

impl<S> Deref for Device<S> {
    type Target = DeviceHandle;

    fn deref(&self) -> &DeviceHandle {
        &self.handle
    }
}

async fn wait_for_command(shared: &Shared, idle_wait: Duration) -> TickState {
    match timeout(idle_wait, shared.wake.notified()).await {
        Ok(()) => TickState::Progress,
        Err(_) => TickState::NoCommand,
    }
}

async fn write_all<S>(stream: &mut S, wire: &[u8]) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(wire).await?;
    stream.flush().await
}

fn is_transient(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted)
}
