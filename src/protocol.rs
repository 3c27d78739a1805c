//! Wire vocabulary spoken with the stage controller.
//!
//! The host sends bare words terminated by a newline. The device answers
//! with lines of the form `<PAYLOAD>`; anything else it prints is debug
//! output and not part of the protocol.

use std::fmt;

use crate::position_grid::Position;

/// Host to device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command
{
    Start,
    NextMove,
    NextCycle,
    Abort,
    End,
    MoveTo(Position)
}

impl fmt::Display for Command
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Command::Start => write!(f, "START"),
            Command::NextMove => write!(f, "NEXT_MOVE"),
            Command::NextCycle => write!(f, "NEXT_CYCLE"),
            Command::Abort => write!(f, "ABORT"),
            Command::End => write!(f, "END"),
            Command::MoveTo(pos) => write!(f, "MOVE_{}{}", pos.row, pos.column)
        }
    }
}

/// Device to host, decoded from a frame payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message
{
    MoveCompleted,
    CycleCompleted,
    Aborted,
    Timeout,
    Done,
    Unknown(String)
}

impl Message
{
    pub fn parse(payload: &str) -> Message
    {
        match payload {
            "MOVE_COMPLETED" => Message::MoveCompleted,
            "CYCLE_COMPLETED" => Message::CycleCompleted,
            "ABORTED" => Message::Aborted,
            "TIMEOUT" => Message::Timeout,
            "DONE" => Message::Done,
            other => Message::Unknown(String::from(other))
        }
    }
}

impl fmt::Display for Message
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Message::MoveCompleted => write!(f, "MOVE_COMPLETED"),
            Message::CycleCompleted => write!(f, "CYCLE_COMPLETED"),
            Message::Aborted => write!(f, "ABORTED"),
            Message::Timeout => write!(f, "TIMEOUT"),
            Message::Done => write!(f, "DONE"),
            Message::Unknown(s) => write!(f, "{}", s)
        }
    }
}

/// Returns the payload of a `<PAYLOAD>` line, or `None` if the line is not a frame
pub fn unframe(line: &str) -> Option<&str>
{
    let line = line.trim();
    if line.len() >= 2 && line.starts_with('<') && line.ends_with('>') {
        Some(&line[1..line.len() - 1])
    } else {
        None
    }
}
