use std::io;

use thiserror::Error;

use crate::capture::CaptureError;
use crate::serial_link::LinkError;

#[derive(Debug, Error)]
pub enum ControllerError
{
    #[error("Invalid run configuration: {0}")]
    InvalidConfig(String),
    #[error("A run is already active")]
    AlreadyRunning,
    #[error("Controller has been shut down")]
    ShutDown,
    #[error("No station {row}{column} in the grid")]
    InvalidPosition { row: String, column: String },
    #[error(transparent)]
    Connection(#[from] LinkError),
    #[error("Failed to create image directory: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Capture(#[from] CaptureError)
}
