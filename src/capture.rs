use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CaptureError
{
    #[error("Failed to run {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("Capture of {} failed ({status}): {detail}", .path.display())]
    Failed { path: PathBuf, status: String, detail: String },
    #[error("Camera not available")]
    Unavailable
}

/// Something that can put a photograph at a path
pub trait CaptureSink: Send
{
    fn capture(&mut self, path: &Path) -> Result<(), CaptureError>;

    /// Give the camera back. Called once when the controller shuts down.
    fn release(&mut self) {}
}

/// Centred crop, given as the fraction of the sensor width and height kept
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crop
{
    fraction: f64
}

impl Crop
{
    /// Fractions outside (0, 1] are clamped
    pub fn centered(fraction: f64) -> Crop
    {
        let fraction = if fraction.is_nan() || fraction <= 0.0 {
            1.0
        } else {
            fraction.min(1.0)
        };
        Crop {fraction}
    }

    pub fn fraction(&self) -> f64
    {
        self.fraction
    }

    /// Normalised (x, y, width, height) of the region of interest
    pub fn region(&self) -> (f64, f64, f64, f64)
    {
        let offset = (1.0 - self.fraction) / 2.0;
        (offset, offset, self.fraction, self.fraction)
    }
}

/// Takes stills by running an external capture program, e.g. `rpicam-still`
pub struct StillCamera
{
    program: String,
    extra_args: Vec<String>,
    crop: Crop,
    timeout_ms: u64
}

impl StillCamera
{
    pub fn new(program: &str, extra_args: Vec<String>, crop: Crop, timeout_ms: u64) -> StillCamera
    {
        StillCamera {program: String::from(program), extra_args, crop, timeout_ms}
    }

    pub fn arguments(&self, path: &Path) -> Vec<String>
    {
        let (x, y, w, h) = self.crop.region();
        let mut args = vec![
            String::from("--nopreview"),
            String::from("--timeout"), self.timeout_ms.to_string(),
            String::from("--roi"), format!("{},{},{},{}", x, y, w, h),
        ];
        args.extend(self.extra_args.iter().cloned());
        args.push(String::from("--output"));
        args.push(path.display().to_string());
        args
    }
}

impl CaptureSink for StillCamera
{
    fn capture(&mut self, path: &Path) -> Result<(), CaptureError>
    {
        let args = self.arguments(path);
        debug!("Running {} {}", self.program, args.join(" "));
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| CaptureError::Spawn {program: self.program.clone(), source: e})?;
        if !output.status.success() {
            return Err(CaptureError::Failed {
                path: path.to_path_buf(),
                status: output.status.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string()
            });
        }
        Ok(())
    }
}
