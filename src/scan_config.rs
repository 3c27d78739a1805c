use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::controller::ControllerSettings;
use crate::position_grid::{EmptyAxis, PositionGrid};
use crate::serial_link::LinkSettings;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SerialConfig
{
    pub port: String,
    pub baud_rate: usize,
    pub read_timeout_ms: u64,
    pub settle_ms: u64 // Controller boot time after opening
}

impl Default for SerialConfig
{
    fn default() -> SerialConfig
    {
        let defaults = LinkSettings::default();
        SerialConfig {
            port: defaults.port,
            baud_rate: defaults.baud_rate,
            read_timeout_ms: defaults.read_timeout.as_millis() as u64,
            settle_ms: defaults.settle.as_millis() as u64
        }
    }
}

impl SerialConfig
{
    pub fn to_settings(&self) -> LinkSettings
    {
        LinkSettings {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            settle: Duration::from_millis(self.settle_ms)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GridConfig
{
    pub columns: Vec<String>,
    pub rows: Vec<String>
}

impl Default for GridConfig
{
    // 24 well plate
    fn default() -> GridConfig
    {
        GridConfig {
            columns: ["1", "2", "3", "4", "5", "6"].iter().map(|s| s.to_string()).collect(),
            rows: ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect()
        }
    }
}

impl GridConfig
{
    pub fn to_grid(&self) -> Result<PositionGrid, EmptyAxis>
    {
        PositionGrid::new(self.columns.clone(), self.rows.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig
{
    pub program: String,
    pub extra_args: Vec<String>,
    pub crop_fraction: f64,
    pub timeout_ms: u64
}

impl Default for CameraConfig
{
    fn default() -> CameraConfig
    {
        CameraConfig {
            program: String::from("rpicam-still"),
            extra_args: Vec::new(),
            crop_fraction: 0.5,
            timeout_ms: 1000
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FirmwareConfig
{
    pub template: PathBuf,
    pub output: PathBuf,
    pub arduino_cli: String,
    pub fqbn: String,
    pub sketch_dir: PathBuf
}

impl Default for FirmwareConfig
{
    fn default() -> FirmwareConfig
    {
        FirmwareConfig {
            template: PathBuf::from("config_template.h"),
            output: PathBuf::from("firmware/config.h"),
            arduino_cli: String::from("arduino-cli"),
            fqbn: String::from("arduino:avr:uno"),
            sketch_dir: PathBuf::from("firmware")
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenerConfig
{
    pub poll_pause_ms: u64,
    pub join_timeout_ms: u64
}

impl Default for ListenerConfig
{
    fn default() -> ListenerConfig
    {
        ListenerConfig {poll_pause_ms: 100, join_timeout_ms: 2000}
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig
{
    pub serial: SerialConfig,
    pub grid: GridConfig,
    pub images_root: PathBuf,
    pub camera: CameraConfig,
    pub firmware: FirmwareConfig,
    pub listener: ListenerConfig
}

impl Default for ScanConfig
{
    fn default() -> ScanConfig
    {
        ScanConfig {
            serial: SerialConfig::default(),
            grid: GridConfig::default(),
            images_root: PathBuf::from("images"),
            camera: CameraConfig::default(),
            firmware: FirmwareConfig::default(),
            listener: ListenerConfig::default()
        }
    }
}

impl ScanConfig
{
    pub fn controller_settings(&self) -> ControllerSettings
    {
        ControllerSettings {
            images_root: self.images_root.clone(),
            poll_pause: Duration::from_millis(self.listener.poll_pause_ms),
            join_timeout: Duration::from_millis(self.listener.join_timeout_ms)
        }
    }
}
