use std::fs::File;
use std::io::BufReader;
use std::io::Read;

use thiserror::Error;

use crate::scan_config::ScanConfig;

#[derive(Debug, Error)]
pub enum ConfigError
{
    #[error("Failed to open file: {0}")]
    Open(#[source] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String)
}

pub fn parse_config<R: Read>(reader: R) -> Result<ScanConfig, ConfigError>
{
    let config: ScanConfig = serde_json::from_reader(reader).map_err(ConfigError::Parse)?;
    if let Err(e) = config.grid.to_grid() {
        return Err(ConfigError::Invalid(e.to_string()));
    }
    if !(config.camera.crop_fraction > 0.0 && config.camera.crop_fraction <= 1.0) {
        return Err(ConfigError::Invalid(
            format!("crop fraction {} not in (0, 1]", config.camera.crop_fraction)));
    }
    Ok(config)
}

pub fn read_config(file_name: &str) -> Result<ScanConfig, ConfigError>
{
    let file = File::open(file_name).map_err(ConfigError::Open)?;
    parse_config(BufReader::new(file))
}
