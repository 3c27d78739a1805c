//! Where photographs go.
//!
//! ```text
//! <root>/run_<YYYYMMDD_HHMMSS>/cycle_<NN>/<YYYYMMDD_HHMMSS>_<ROW><COL>.jpg
//! <root>/manual_<YYYYMMDD>/manual_<YYYYMMDD_HHMMSS>.jpg
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};

use crate::position_grid::Position;

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const DAY_FORMAT: &str = "%Y%m%d";

/// Source of wall clock time
pub trait Clock: Send + Sync
{
    fn now(&self) -> NaiveDateTime;
}

pub struct LocalClock;

impl Clock for LocalClock
{
    fn now(&self) -> NaiveDateTime
    {
        Local::now().naive_local()
    }
}

pub fn stamp(time: &NaiveDateTime) -> String
{
    time.format(STAMP_FORMAT).to_string()
}

fn create(dir: PathBuf) -> io::Result<PathBuf>
{
    fs::create_dir_all(&dir)
        .map_err(|e| io::Error::new(e.kind(), format!("{}: {}", dir.display(), e)))?;
    Ok(dir)
}

/// Creates `<base_dir>/run_<timestamp>`
pub fn allocate_run_directory(base_dir: &Path, timestamp: &NaiveDateTime) -> io::Result<PathBuf>
{
    create(base_dir.join(format!("run_{}", stamp(timestamp))))
}

/// Creates `<run_dir>/cycle_<NN>`. Existing directories are reused.
pub fn allocate_cycle_directory(run_dir: &Path, cycle_index: usize) -> io::Result<PathBuf>
{
    create(run_dir.join(format!("cycle_{:02}", cycle_index)))
}

pub fn photo_path(cycle_dir: &Path, timestamp: &NaiveDateTime, position: &Position) -> PathBuf
{
    cycle_dir.join(format!("{}_{}.jpg", stamp(timestamp), position))
}

/// Creates `<base_dir>/manual_<YYYYMMDD>`
pub fn allocate_manual_directory(base_dir: &Path, timestamp: &NaiveDateTime) -> io::Result<PathBuf>
{
    create(base_dir.join(format!("manual_{}", timestamp.format(DAY_FORMAT))))
}

pub fn manual_photo_path(manual_dir: &Path, timestamp: &NaiveDateTime) -> PathBuf
{
    manual_dir.join(format!("manual_{}.jpg", stamp(timestamp)))
}
