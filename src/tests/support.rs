use std::collections::VecDeque;
use std::fs;
use std::io;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime};

use super::super::{
    capture::{CaptureError, CaptureSink},
    image_dirs::Clock,
    protocol::Command,
    run_machine::CommandSink,
    serial_link::{Connector, LinkError, SerialLink}
};

/// Turns one command line written by the host into the lines the device prints back
pub type Responder = Box<dyn FnMut(&str) -> Vec<String> + Send>;

#[derive(Default)]
struct PortState
{
    incoming: VecDeque<u8>,
    written: Vec<u8>,
    fail_writes: bool,
    fail_reads: bool,
    responder: Option<Responder>
}

/// In-memory serial port. Reads time out after a few milliseconds when empty.
#[derive(Clone, Default)]
pub struct ScriptedPort
{
    state: Arc<Mutex<PortState>>
}

impl ScriptedPort
{
    pub fn new() -> ScriptedPort
    {
        ScriptedPort::default()
    }

    pub fn with_responder(responder: Responder) -> ScriptedPort
    {
        let port = ScriptedPort::new();
        port.state.lock().unwrap().responder = Some(responder);
        port
    }

    pub fn push_bytes(&self, bytes: &[u8])
    {
        self.state.lock().unwrap().incoming.extend(bytes.iter());
    }

    pub fn push_line(&self, line: &str)
    {
        self.push_bytes(format!("{}\n", line).as_bytes());
    }

    pub fn written_lines(&self) -> Vec<String>
    {
        String::from_utf8_lossy(&self.state.lock().unwrap().written)
            .lines()
            .map(String::from)
            .collect()
    }

    pub fn fail_writes(&self, fail: bool)
    {
        self.state.lock().unwrap().fail_writes = fail;
    }

    pub fn fail_reads(&self, fail: bool)
    {
        self.state.lock().unwrap().fail_reads = fail;
    }
}

impl Read for ScriptedPort
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>
    {
        {
            let mut state = self.state.lock().unwrap();
            if state.fail_reads {
                return Err(io::Error::new(ErrorKind::BrokenPipe, "device unplugged"));
            }
            if !state.incoming.is_empty() {
                let n = buf.len().min(state.incoming.len());
                for b in buf.iter_mut().take(n) {
                    *b = state.incoming.pop_front().unwrap();
                }
                return Ok(n);
            }
        }
        thread::sleep(Duration::from_millis(2));
        Err(io::Error::new(ErrorKind::TimedOut, "Operation timed out"))
    }
}

impl Write for ScriptedPort
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>
    {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "write failed"));
        }
        state.written.extend_from_slice(buf);
        let text = String::from_utf8_lossy(buf).into_owned();
        if let Some(mut responder) = state.responder.take() {
            for line in text.lines() {
                for reply in responder(line) {
                    state.incoming.extend(reply.as_bytes());
                    state.incoming.push_back(b'\n');
                }
            }
            state.responder = Some(responder);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()>
    {
        Ok(())
    }
}

/// Stage with `stations` stations that answers the way the firmware does
pub fn simulated_stage(stations: usize) -> Responder
{
    let mut moves = 0;
    Box::new(move |line: &str| {
        let mut replies = Vec::new();
        match line {
            "START" | "NEXT_CYCLE" => moves = 0,
            "NEXT_MOVE" => {}
            "END" => return vec![String::from("<DONE>")],
            "ABORT" => return vec![String::from("<ABORTED>")],
            _ => return replies
        }
        moves += 1;
        replies.push(String::from("<MOVE_COMPLETED>"));
        if moves == stations {
            replies.push(String::from("<CYCLE_COMPLETED>"));
        }
        replies
    })
}

pub struct ScriptedConnector
{
    pub port: ScriptedPort,
    pub connects: Arc<AtomicUsize>,
    pub fail: bool
}

impl ScriptedConnector
{
    pub fn new(port: &ScriptedPort) -> ScriptedConnector
    {
        ScriptedConnector {
            port: port.clone(),
            connects: Arc::new(AtomicUsize::new(0)),
            fail: false
        }
    }
}

impl Connector for ScriptedConnector
{
    fn connect(&mut self) -> Result<SerialLink, LinkError>
    {
        if self.fail {
            return Err(LinkError::Open {
                port: String::from("/dev/null"),
                source: serial::Error::new(serial::ErrorKind::NoDevice, "no such device")
            });
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(SerialLink::new("scripted", Box::new(self.port.clone())))
    }
}

#[derive(Default)]
pub struct CameraLog
{
    pub photos: Vec<PathBuf>,
    pub releases: usize
}

/// Writes an empty file for every capture and remembers the path
#[derive(Clone, Default)]
pub struct RecordingCamera
{
    pub log: Arc<Mutex<CameraLog>>,
    pub fail: bool
}

impl RecordingCamera
{
    pub fn new() -> RecordingCamera
    {
        RecordingCamera::default()
    }

    pub fn failing() -> RecordingCamera
    {
        RecordingCamera {
            fail: true,
            ..RecordingCamera::default()
        }
    }

    pub fn photos(&self) -> Vec<PathBuf>
    {
        self.log.lock().unwrap().photos.clone()
    }

    pub fn releases(&self) -> usize
    {
        self.log.lock().unwrap().releases
    }
}

impl CaptureSink for RecordingCamera
{
    fn capture(&mut self, path: &Path) -> Result<(), CaptureError>
    {
        self.log.lock().unwrap().photos.push(path.to_path_buf());
        if self.fail {
            return Err(CaptureError::Failed {
                path: path.to_path_buf(),
                status: String::from("exit status: 1"),
                detail: String::from("no camera")
            });
        }
        fs::write(path, b"").map_err(|e| CaptureError::Spawn {
            program: String::from("recording camera"),
            source: e
        })
    }

    fn release(&mut self)
    {
        self.log.lock().unwrap().releases += 1;
    }
}

/// Starts at 2025-03-03 12:00:00 and advances one second per reading
#[derive(Default)]
pub struct SteppingClock
{
    ticks: AtomicI64
}

pub fn start_time() -> NaiveDateTime
{
    NaiveDate::from_ymd_opt(2025, 3, 3)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

impl Clock for SteppingClock
{
    fn now(&self) -> NaiveDateTime
    {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst);
        start_time() + chrono::Duration::seconds(tick)
    }
}

/// Command sink that only records
#[derive(Default)]
pub struct SentCommands
{
    pub commands: Vec<Command>,
    pub fail: bool
}

impl CommandSink for SentCommands
{
    fn send(&mut self, command: &Command) -> Result<(), LinkError>
    {
        if self.fail {
            return Err(LinkError::Closed);
        }
        self.commands.push(command.clone());
        Ok(())
    }
}

pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool
{
    let deadline = Instant::now() + timeout;
    while !condition() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
    true
}
