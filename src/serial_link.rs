use std::io;
use std::io::ErrorKind;
use std::io::Read;
use std::io::Write;
use std::thread;
use std::time::Duration;

use serial::core::SerialDevice;
use serial::core::SerialPortSettings;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::protocol::{unframe, Command};

#[derive(Debug, Error)]
pub enum LinkError
{
    #[error("Failed to open {port}: {source}")]
    Open { port: String, source: serial::Error },
    #[error("Failed to configure {port}: {source}")]
    Configure { port: String, source: serial::Error },
    #[error("Failed to send {command}: {source}")]
    Write { command: String, source: io::Error },
    #[error("Failed to read from serial link: {0}")]
    Read(#[source] io::Error),
    #[error("Serial link is not open")]
    Closed
}

/// Anything bytes can be exchanged with
pub trait Port: Read + Write + Send {}

impl<T: Read + Write + Send> Port for T {}

#[derive(Debug, Clone)]
pub struct LinkSettings
{
    pub port: String,
    pub baud_rate: usize,
    pub read_timeout: Duration,
    // The controller resets when the port is opened and ignores input
    // until it has booted.
    pub settle: Duration
}

impl Default for LinkSettings
{
    fn default() -> LinkSettings
    {
        LinkSettings {
            port: String::from("/dev/ttyACM0"),
            baud_rate: 9600,
            read_timeout: Duration::from_millis(100),
            settle: Duration::from_secs(2)
        }
    }
}

const READ_CHUNK: usize = 64;
const DISCARD_LIMIT: usize = 64;

/// Newline separated text over a byte port.
///
/// Reads never block longer than the port's own timeout. Partial lines are
/// kept until the rest arrives.
pub struct SerialLink
{
    name: String,
    port: Option<Box<dyn Port>>,
    pending: Vec<u8>
}

impl SerialLink
{
    pub fn new(name: &str, port: Box<dyn Port>) -> SerialLink
    {
        SerialLink {name: String::from(name), port: Some(port), pending: Vec::new()}
    }

    pub fn name(&self) -> &str
    {
        &self.name
    }

    pub fn is_open(&self) -> bool
    {
        self.port.is_some()
    }

    pub fn send(&mut self, command: &Command) -> Result<(), LinkError>
    {
        let port = self.port.as_mut().ok_or(LinkError::Closed)?;
        let line = format!("{}\n", command);
        port.write_all(line.as_bytes())
            .and_then(|_| port.flush())
            .map_err(|e| LinkError::Write {command: command.to_string(), source: e})?;
        info!("=> device: {}", command);
        Ok(())
    }

    /// Payload of the next protocol frame, if a complete one has arrived.
    ///
    /// Lines that are not framed as `<...>` are logged and dropped.
    pub fn receive_line(&mut self) -> Result<Option<String>, LinkError>
    {
        if let Some(payload) = self.next_frame() {
            return Ok(Some(payload));
        }
        let port = self.port.as_mut().ok_or(LinkError::Closed)?;
        let mut buf = [0u8; READ_CHUNK];
        match port.read(&mut buf) {
            Ok(n) => self.pending.extend_from_slice(&buf[..n]),
            Err(ref e) if e.kind() == ErrorKind::TimedOut
                || e.kind() == ErrorKind::WouldBlock
                || e.kind() == ErrorKind::Interrupted => {},
            Err(e) => return Err(LinkError::Read(e))
        }
        Ok(self.next_frame())
    }

    /// Drops everything received so far, returns the number of bytes dropped.
    ///
    /// Reads until the port times out, or at most `DISCARD_LIMIT` chunks when
    /// the device keeps talking.
    pub fn discard_input(&mut self) -> Result<usize, LinkError>
    {
        let mut dropped = self.pending.len();
        self.pending.clear();
        let port = self.port.as_mut().ok_or(LinkError::Closed)?;
        let mut buf = [0u8; READ_CHUNK];
        for _ in 0..DISCARD_LIMIT {
            match port.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => dropped += n,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {},
                Err(ref e) if e.kind() == ErrorKind::TimedOut
                    || e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(LinkError::Read(e))
            }
        }
        if dropped > 0 {
            debug!("Discarded {} stale bytes from {}", dropped, self.name);
        }
        Ok(dropped)
    }

    fn next_frame(&mut self) -> Option<String>
    {
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match unframe(line) {
                Some(payload) => {
                    debug!("<= device: {}", payload);
                    return Some(String::from(payload));
                },
                None => warn!("Ignoring malformed line from device: '{}'", line)
            }
        }
        None
    }

    /// Safe to call any number of times
    pub fn close(&mut self)
    {
        if self.port.take().is_some() {
            self.pending.clear();
            info!("Closed serial link {}", self.name);
        }
    }
}

impl Drop for SerialLink
{
    fn drop(&mut self)
    {
        self.close();
    }
}

/// Opens links on demand
pub trait Connector: Send
{
    fn connect(&mut self) -> Result<SerialLink, LinkError>;
}

pub struct SerialConnector
{
    settings: LinkSettings
}

impl SerialConnector
{
    pub fn new(settings: LinkSettings) -> SerialConnector
    {
        SerialConnector {settings}
    }
}

impl Connector for SerialConnector
{
    fn connect(&mut self) -> Result<SerialLink, LinkError>
    {
        let name = &self.settings.port;
        let mut serport = serial::open(name)
            .map_err(|e| LinkError::Open {port: name.clone(), source: e})?;
        let configure = |serport: &mut serial::SystemPort| -> serial::Result<()> {
            let mut settings = serport.read_settings()?;
            settings.set_baud_rate(serial::BaudRate::from_speed(self.settings.baud_rate))?;
            settings.set_char_size(serial::Bits8);
            settings.set_parity(serial::ParityNone);
            settings.set_stop_bits(serial::Stop1);
            settings.set_flow_control(serial::FlowNone);
            serport.write_settings(&settings)?;
            serport.set_timeout(self.settings.read_timeout)
        };
        configure(&mut serport)
            .map_err(|e| LinkError::Configure {port: name.clone(), source: e})?;
        thread::sleep(self.settings.settle);
        info!("Opened serial link {} at {} baud", name, self.settings.baud_rate);
        Ok(SerialLink::new(name, Box::new(serport)))
    }
}
