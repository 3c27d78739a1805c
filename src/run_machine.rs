//! The move / photograph / acknowledge protocol.
//!
//! The machine never waits for a particular reply. It reacts to whichever
//! frame arrives next; frames that make no sense in the current phase are
//! logged and dropped. The photo for a station is taken before the device is
//! told to move on, so the stage holds still while the camera works.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::capture::CaptureSink;
use crate::error::ControllerError;
use crate::image_dirs::{allocate_cycle_directory, allocate_run_directory, photo_path, Clock};
use crate::position_grid::PositionGrid;
use crate::protocol::{Command, Message};
use crate::serial_link::{LinkError, SerialLink};

/// Where commands for the device go
pub trait CommandSink
{
    fn send(&mut self, command: &Command) -> Result<(), LinkError>;
}

impl CommandSink for SerialLink
{
    fn send(&mut self, command: &Command) -> Result<(), LinkError>
    {
        SerialLink::send(self, command)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase
{
    #[default]
    Idle,
    AwaitingMoveCompletion,
    AwaitingCycleCompletion,
    Finished,
    Aborted,
    TimedOut
}

impl Phase
{
    pub fn is_active(&self) -> bool
    {
        matches!(self, Phase::AwaitingMoveCompletion | Phase::AwaitingCycleCompletion)
    }

    pub fn is_terminal(&self) -> bool
    {
        matches!(self, Phase::Finished | Phase::Aborted | Phase::TimedOut)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig
{
    pub repeats: usize,
    // Only used for the generated device configuration, the device does the waiting.
    pub pause_millis: u64
}

impl RunConfig
{
    pub fn validate(&self) -> Result<(), ControllerError>
    {
        if self.repeats < 1 {
            return Err(ControllerError::InvalidConfig(
                format!("repeats must be at least 1, got {}", self.repeats)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunState
{
    pub move_count: usize,
    pub cycle_count: usize,
    pub run_directory: PathBuf,
    pub cycle_directory: PathBuf
}

/// Copy of the machine's state for observers
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunStatus
{
    pub phase: Phase,
    pub move_count: usize,
    pub cycle_count: usize,
    pub run_directory: Option<PathBuf>,
    pub cycle_directory: Option<PathBuf>
}

pub struct RunMachine
{
    grid: PositionGrid,
    clock: Arc<dyn Clock>,
    config: RunConfig,
    phase: Phase,
    state: Option<RunState>
}

impl RunMachine
{
    pub fn new(grid: PositionGrid, clock: Arc<dyn Clock>) -> RunMachine
    {
        RunMachine {
            grid,
            clock,
            config: RunConfig {repeats: 1, pause_millis: 0},
            phase: Phase::Idle,
            state: None
        }
    }

    pub fn phase(&self) -> Phase
    {
        self.phase
    }

    pub fn state(&self) -> Option<&RunState>
    {
        self.state.as_ref()
    }

    pub fn config(&self) -> &RunConfig
    {
        &self.config
    }

    pub fn status(&self) -> RunStatus
    {
        let mut status = RunStatus {phase: self.phase, ..RunStatus::default()};
        if let Some(state) = &self.state {
            status.move_count = state.move_count;
            status.cycle_count = state.cycle_count;
            status.run_directory = Some(state.run_directory.clone());
            status.cycle_directory = Some(state.cycle_directory.clone());
        }
        status
    }

    /// Sets up the directories of a new run and sends `START`.
    ///
    /// The machine is left as it was if any step fails.
    pub fn begin(&mut self, config: RunConfig, images_root: &Path, link: &mut dyn CommandSink)
                 -> Result<(), ControllerError>
    {
        if self.phase.is_active() {
            return Err(ControllerError::AlreadyRunning);
        }
        config.validate()?;
        let run_directory = allocate_run_directory(images_root, &self.clock.now())?;
        let cycle_directory = allocate_cycle_directory(&run_directory, 0)?;
        link.send(&Command::Start)?;
        info!("Run started in {}: {} cycle(s) of {} stations",
              run_directory.display(), config.repeats, self.grid.total_stations());
        self.config = config;
        self.state = Some(RunState {move_count: 0, cycle_count: 0, run_directory, cycle_directory});
        self.phase = Phase::AwaitingMoveCompletion;
        Ok(())
    }

    pub fn handle(&mut self, message: &Message, link: &mut dyn CommandSink, camera: &mut dyn CaptureSink)
    {
        info!("<= device: {}", message);
        match (self.phase, message) {
            (Phase::AwaitingMoveCompletion, Message::MoveCompleted) =>
                self.move_completed(link, camera),
            (Phase::AwaitingCycleCompletion, Message::CycleCompleted) =>
                self.cycle_completed(link),
            (phase, Message::Aborted) if phase.is_active() => {
                warn!("Device aborted the run");
                self.phase = Phase::Aborted;
            },
            (phase, Message::Timeout) if phase.is_active() => {
                error!("Device timed out, run stopped");
                self.phase = Phase::TimedOut;
            },
            (phase, message) =>
                warn!("Unexpected message {} while {:?}, ignored", message, phase)
        }
    }

    /// Stops an active run on request of the operator. `ABORT` is sent by the caller.
    pub fn abort(&mut self)
    {
        if self.phase.is_active() {
            info!("Run aborted");
            self.phase = Phase::Aborted;
        }
    }

    /// Stops an active run after the link to the device failed
    pub fn link_lost(&mut self, err: &LinkError)
    {
        if self.phase.is_active() {
            error!("Lost serial link, run stopped: {}", err);
            self.phase = Phase::Aborted;
        }
    }

    fn move_completed(&mut self, link: &mut dyn CommandSink, camera: &mut dyn CaptureSink)
    {
        let total = self.grid.total_stations();
        let state = match self.state.as_mut() {
            Some(state) => state,
            None => return
        };
        if state.move_count >= total {
            warn!("Move completed beyond the last station, ignored");
            return;
        }
        let position = self.grid.position_for(state.move_count);
        let path = photo_path(&state.cycle_directory, &self.clock.now(), &position);
        info!("Photo {}/{} at {}", state.move_count + 1, total, position);
        match camera.capture(&path) {
            Ok(()) => info!("Photo taken: {}", path.display()),
            Err(e) => error!("Photo at {} failed: {}", position, e)
        }
        state.move_count += 1;
        if state.move_count < total {
            send(link, &Command::NextMove);
        } else {
            info!("Cycle {} done, waiting for device", state.cycle_count);
            self.phase = Phase::AwaitingCycleCompletion;
        }
    }

    fn cycle_completed(&mut self, link: &mut dyn CommandSink)
    {
        let repeats = self.config.repeats;
        let state = match self.state.as_mut() {
            Some(state) => state,
            None => return
        };
        state.cycle_count += 1;
        if state.cycle_count >= repeats {
            send(link, &Command::End);
            info!("All {} cycle(s) completed", repeats);
            self.phase = Phase::Finished;
            return;
        }
        match allocate_cycle_directory(&state.run_directory, state.cycle_count) {
            Ok(dir) => {
                info!("Cycle {} of {} in {}", state.cycle_count + 1, repeats, dir.display());
                state.cycle_directory = dir;
                state.move_count = 0;
                send(link, &Command::NextCycle);
                self.phase = Phase::AwaitingMoveCompletion;
            },
            Err(e) => {
                error!("Cannot create cycle directory, run stopped: {}", e);
                send(link, &Command::Abort);
                self.phase = Phase::Aborted;
            }
        }
    }
}

// No retries: a lost command is logged and the run carries on.
fn send(link: &mut dyn CommandSink, command: &Command)
{
    if let Err(e) = link.send(command) {
        error!("{}", e);
    }
}
