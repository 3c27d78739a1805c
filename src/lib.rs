pub mod capture;
pub mod controller;
pub mod error;
pub mod firmware;
pub mod image_dirs;
pub mod interrupt;
pub mod position_grid;
pub mod protocol;
pub mod run_machine;
pub mod scan_config;
pub mod scan_config_parser;
pub mod serial_link;

#[cfg(test)]
mod tests;
