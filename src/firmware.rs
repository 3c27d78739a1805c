//! Device side configuration and the `arduino-cli` steps that build it in.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::info;

use crate::run_machine::RunConfig;

pub const REPEATS_PLACEHOLDER: &str = "{{REPEATS_PLACEHOLDER}}";
pub const PAUSE_PLACEHOLDER: &str = "{{PAUSE_PLACEHOLDER}}";

#[derive(Debug, Error)]
pub enum FirmwareError
{
    #[error("Failed to read template {}: {source}", .path.display())]
    Template { path: PathBuf, source: io::Error },
    #[error("Failed to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("Failed to run {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("{step} failed ({status}): {detail}")]
    Step { step: String, status: String, detail: String },
    #[error("Pause of {minutes} minutes is too long")]
    PauseTooLong { minutes: u64 }
}

const MILLIS_PER_MINUTE: u64 = 60_000;

pub fn pause_millis_from_minutes(minutes: u64) -> Result<u64, FirmwareError>
{
    minutes.checked_mul(MILLIS_PER_MINUTE).ok_or(FirmwareError::PauseTooLong {minutes})
}

/// Replaces the placeholders in `template`, nothing else is interpreted
pub fn render_device_config(template: &str, config: &RunConfig) -> String
{
    template
        .replace(REPEATS_PLACEHOLDER, &config.repeats.to_string())
        .replace(PAUSE_PLACEHOLDER, &config.pause_millis.to_string())
}

pub fn write_device_config(template: &Path, output: &Path, config: &RunConfig) -> Result<(), FirmwareError>
{
    let content = fs::read_to_string(template)
        .map_err(|e| FirmwareError::Template {path: template.to_path_buf(), source: e})?;
    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .map_err(|e| FirmwareError::Write {path: dir.to_path_buf(), source: e})?;
    }
    fs::write(output, render_device_config(&content, config))
        .map_err(|e| FirmwareError::Write {path: output.to_path_buf(), source: e})?;
    info!("Device configuration written to {} ({} repeats, {} ms pause)",
          output.display(), config.repeats, config.pause_millis);
    Ok(())
}

const AVR_CORE: &str = "arduino:avr";

pub struct ArduinoCli
{
    program: String,
    fqbn: String
}

impl ArduinoCli
{
    pub fn new(program: &str, fqbn: &str) -> ArduinoCli
    {
        ArduinoCli {program: String::from(program), fqbn: String::from(fqbn)}
    }

    pub fn compile_args(&self, sketch_dir: &Path) -> Vec<String>
    {
        vec![String::from("compile"), String::from("--fqbn"), self.fqbn.clone(),
             sketch_dir.display().to_string()]
    }

    pub fn upload_args(&self, port: &str, sketch_dir: &Path) -> Vec<String>
    {
        vec![String::from("upload"), String::from("-p"), String::from(port),
             String::from("--fqbn"), self.fqbn.clone(), sketch_dir.display().to_string()]
    }

    pub fn compile(&self, sketch_dir: &Path) -> Result<(), FirmwareError>
    {
        info!("Compiling {}", sketch_dir.display());
        self.run("compile", &self.compile_args(sketch_dir))?;
        info!("Compiled");
        Ok(())
    }

    pub fn upload(&self, port: &str, sketch_dir: &Path) -> Result<(), FirmwareError>
    {
        info!("Uploading {} to {}", sketch_dir.display(), port);
        self.run("upload", &self.upload_args(port, sketch_dir))?;
        info!("Uploaded");
        Ok(())
    }

    /// Installs the AVR core unless `arduino-cli core list` already shows it
    pub fn ensure_core_installed(&self) -> Result<(), FirmwareError>
    {
        self.run("core update-index", &[String::from("core"), String::from("update-index")])?;
        let installed = self.run("core list", &[String::from("core"), String::from("list")])?;
        if installed.contains(AVR_CORE) {
            info!("{} core already installed", AVR_CORE);
            return Ok(());
        }
        info!("Installing {} core", AVR_CORE);
        self.run("core install",
                 &[String::from("core"), String::from("install"), String::from(AVR_CORE)])?;
        Ok(())
    }

    fn run(&self, step: &str, args: &[String]) -> Result<String, FirmwareError>
    {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| FirmwareError::Spawn {program: self.program.clone(), source: e})?;
        if !output.status.success() {
            return Err(FirmwareError::Step {
                step: String::from(step),
                status: output.status.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string()
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
