//! Owns the serial link, the camera and the listener thread of a run.
//!
//! Calls from the operator return right away. While a run is active the
//! listener thread is the only reader of the link and the only writer of the
//! run state; it is told to stop through a channel.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::capture::{CaptureError, CaptureSink, Crop, StillCamera};
use crate::error::ControllerError;
use crate::image_dirs::{allocate_manual_directory, manual_photo_path, Clock, LocalClock};
use crate::position_grid::{Position, PositionGrid};
use crate::protocol::{Command, Message};
use crate::run_machine::{CommandSink, Phase, RunConfig, RunMachine, RunStatus};
use crate::scan_config::ScanConfig;
use crate::serial_link::{Connector, LinkError, SerialConnector, SerialLink};

#[derive(Debug, Clone)]
pub struct ControllerSettings
{
    pub images_root: PathBuf,
    // Pause between polls when nothing was received
    pub poll_pause: Duration,
    pub join_timeout: Duration
}

impl Default for ControllerSettings
{
    fn default() -> ControllerSettings
    {
        ControllerSettings {
            images_root: PathBuf::from("images"),
            poll_pause: Duration::from_millis(100),
            join_timeout: Duration::from_secs(2)
        }
    }
}

type SharedLink = Arc<Mutex<Option<SerialLink>>>;
type SharedCamera = Arc<Mutex<Option<Box<dyn CaptureSink>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T>
{
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Control
{
    Stop
}

struct Listener
{
    control: Sender<Control>,
    handle: JoinHandle<()>
}

pub struct RunController
{
    grid: PositionGrid,
    clock: Arc<dyn Clock>,
    settings: ControllerSettings,
    connector: Box<dyn Connector>,
    link: SharedLink,
    camera: SharedCamera,
    status: Arc<Mutex<RunStatus>>,
    listener: Option<Listener>,
    shut_down: bool
}

impl RunController
{
    pub fn new(grid: PositionGrid,
               connector: Box<dyn Connector>,
               camera: Box<dyn CaptureSink>,
               clock: Arc<dyn Clock>,
               settings: ControllerSettings) -> RunController
    {
        RunController {
            grid,
            clock,
            settings,
            connector,
            link: Arc::new(Mutex::new(None)),
            camera: Arc::new(Mutex::new(Some(camera))),
            status: Arc::new(Mutex::new(RunStatus::default())),
            listener: None,
            shut_down: false
        }
    }

    /// Controller for the real device and camera described by `config`
    pub fn from_config(config: &ScanConfig) -> Result<RunController, ControllerError>
    {
        let grid = config.grid.to_grid()
            .map_err(|e| ControllerError::InvalidConfig(e.to_string()))?;
        let camera = StillCamera::new(&config.camera.program,
                                      config.camera.extra_args.clone(),
                                      Crop::centered(config.camera.crop_fraction),
                                      config.camera.timeout_ms);
        Ok(RunController::new(grid,
                              Box::new(SerialConnector::new(config.serial.to_settings())),
                              Box::new(camera),
                              Arc::new(LocalClock),
                              config.controller_settings()))
    }

    pub fn grid(&self) -> &PositionGrid
    {
        &self.grid
    }

    pub fn status(&self) -> RunStatus
    {
        lock(&self.status).clone()
    }

    pub fn is_running(&self) -> bool
    {
        match &self.listener {
            Some(listener) => !listener.handle.is_finished(),
            None => false
        }
    }

    /// Starts a run and the listener that drives it
    pub fn start(&mut self, config: RunConfig) -> Result<(), ControllerError>
    {
        config.validate()?;
        if self.shut_down {
            return Err(ControllerError::ShutDown);
        }
        if self.is_running() {
            warn!("Start ignored, a run is already active");
            return Err(ControllerError::AlreadyRunning);
        }
        self.reap_listener();
        self.ensure_link()?;

        let mut machine = RunMachine::new(self.grid.clone(), self.clock.clone());
        {
            let mut shared = lock(&self.link);
            let link = shared.as_mut().ok_or(LinkError::Closed)?;
            // Replies to an earlier run must not be taken for answers to this one.
            if let Err(e) = link.discard_input() {
                error!("{}", e);
                link.close();
                return Err(e.into());
            }
            machine.begin(config, &self.settings.images_root, link)?;
        }
        *lock(&self.status) = machine.status();

        let (control, commands) = mpsc::channel();
        let link = self.link.clone();
        let camera = self.camera.clone();
        let status = self.status.clone();
        let poll_pause = self.settings.poll_pause;
        let spawned = thread::Builder::new()
            .name(String::from("device-listener"))
            .spawn(move || listen(machine, link, camera, status, commands, poll_pause));
        match spawned {
            Ok(handle) => {
                self.listener = Some(Listener {control, handle});
                Ok(())
            },
            Err(e) => {
                error!("Failed to start listener: {}", e);
                lock(&self.status).phase = Phase::Aborted;
                Err(ControllerError::Io(e))
            }
        }
    }

    /// Sends `ABORT` and stops the listener. Harmless when no run is active.
    pub fn abort(&mut self)
    {
        if self.shut_down {
            warn!("Abort ignored, controller is shut down");
            return;
        }
        if let Err(e) = self.send_command(&Command::Abort) {
            error!("{}", e);
        }
        if let Some(listener) = &self.listener {
            // The listener may already have ended on its own.
            let _ = listener.control.send(Control::Stop);
        }
    }

    /// Moves the stage to one station outside of a run
    pub fn manual_move(&mut self, row: &str, column: &str) -> Result<(), ControllerError>
    {
        if self.shut_down {
            return Err(ControllerError::ShutDown);
        }
        if self.is_running() {
            return Err(ControllerError::AlreadyRunning);
        }
        if !self.grid.contains(row, column) {
            return Err(ControllerError::InvalidPosition {row: String::from(row),
                                                         column: String::from(column)});
        }
        self.send_command(&Command::MoveTo(Position::new(row, column)))
            .map_err(|e| {
                error!("{}", e);
                ControllerError::from(e)
            })
    }

    /// Takes one photo outside of a run, returns where it was stored
    pub fn capture_manual(&mut self) -> Result<PathBuf, ControllerError>
    {
        if self.shut_down {
            return Err(ControllerError::ShutDown);
        }
        if self.is_running() {
            return Err(ControllerError::AlreadyRunning);
        }
        let now = self.clock.now();
        let dir = allocate_manual_directory(&self.settings.images_root, &now)?;
        let path = manual_photo_path(&dir, &now);
        let mut camera = lock(&self.camera);
        let camera = camera.as_mut().ok_or(CaptureError::Unavailable)?;
        match camera.capture(&path) {
            Ok(()) => {
                info!("Manual photo taken: {}", path.display());
                Ok(path)
            },
            Err(e) => {
                error!("Manual photo failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Waits for the listener of the current run to end
    pub fn wait_for_listener(&mut self, timeout: Duration) -> bool
    {
        let finished = match &self.listener {
            Some(listener) => wait_finished(&listener.handle, timeout),
            None => true
        };
        if finished {
            self.reap_listener();
        }
        finished
    }

    /// Stops the listener, closes the link and releases the camera.
    ///
    /// Only the first call does anything.
    pub fn shutdown(&mut self)
    {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        if let Some(listener) = self.listener.take() {
            if !listener.handle.is_finished() {
                warn!("Shutting down while a run is active");
            }
            let _ = listener.control.send(Control::Stop);
            if wait_finished(&listener.handle, self.settings.join_timeout) {
                join(listener.handle);
            } else {
                warn!("Listener did not stop within {:?}, abandoning it",
                      self.settings.join_timeout);
            }
        }
        if let Some(mut link) = lock(&self.link).take() {
            link.close();
        }
        if let Some(mut camera) = lock(&self.camera).take() {
            camera.release();
        }
        info!("Controller shut down");
    }

    fn reap_listener(&mut self)
    {
        if let Some(listener) = self.listener.take() {
            if listener.handle.is_finished() {
                join(listener.handle);
            } else {
                self.listener = Some(listener);
            }
        }
    }

    fn ensure_link(&mut self) -> Result<(), LinkError>
    {
        let mut link = lock(&self.link);
        if link.as_ref().map_or(false, |l| l.is_open()) {
            return Ok(());
        }
        match self.connector.connect() {
            Ok(opened) => {
                *link = Some(opened);
                Ok(())
            },
            Err(e) => {
                error!("{}", e);
                Err(e)
            }
        }
    }

    fn send_command(&mut self, command: &Command) -> Result<(), LinkError>
    {
        self.ensure_link()?;
        LinkSink(&self.link).send(command)
    }
}

impl Drop for RunController
{
    fn drop(&mut self)
    {
        self.shutdown();
    }
}

fn wait_finished(handle: &JoinHandle<()>, timeout: Duration) -> bool
{
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
    true
}

fn join(handle: JoinHandle<()>)
{
    if handle.join().is_err() {
        error!("Listener panicked");
    }
}

struct LinkSink<'a>(&'a Mutex<Option<SerialLink>>);

impl CommandSink for LinkSink<'_>
{
    fn send(&mut self, command: &Command) -> Result<(), LinkError>
    {
        match lock(self.0).as_mut() {
            Some(link) => link.send(command),
            None => Err(LinkError::Closed)
        }
    }
}

struct CameraSink<'a>(&'a Mutex<Option<Box<dyn CaptureSink>>>);

impl CaptureSink for CameraSink<'_>
{
    fn capture(&mut self, path: &Path) -> Result<(), CaptureError>
    {
        match lock(self.0).as_mut() {
            Some(camera) => camera.capture(path),
            None => Err(CaptureError::Unavailable)
        }
    }
}

fn listen(mut machine: RunMachine,
          link: SharedLink,
          camera: SharedCamera,
          status: Arc<Mutex<RunStatus>>,
          commands: Receiver<Control>,
          poll_pause: Duration)
{
    info!("Listening for device messages");
    loop {
        match commands.try_recv() {
            Ok(Control::Stop) | Err(TryRecvError::Disconnected) => {
                machine.abort();
                *lock(&status) = machine.status();
                break;
            },
            Err(TryRecvError::Empty) => {}
        }
        let received = match lock(&link).as_mut() {
            Some(link) => link.receive_line(),
            None => Err(LinkError::Closed)
        };
        match received {
            Ok(Some(payload)) => {
                let message = Message::parse(&payload);
                machine.handle(&message, &mut LinkSink(&link), &mut CameraSink(&camera));
                *lock(&status) = machine.status();
            },
            Ok(None) => thread::sleep(poll_pause),
            Err(e) => {
                machine.link_lost(&e);
                // Closed so that the next operation opens the port again
                if let Some(link) = lock(&link).as_mut() {
                    link.close();
                }
                *lock(&status) = machine.status();
            }
        }
        if machine.phase().is_terminal() {
            break;
        }
    }
    info!("Listener stopped ({:?})", machine.phase());
}
