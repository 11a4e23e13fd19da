use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct MachineConfig {
    pub master_pic: u16,
    pub slave_pic: Option<u16>,
    pub video: bool,
    pub font_rom: Option<PathBuf>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            master_pic: 0x20,
            slave_pic: Some(0xA0),
            video: true,
            font_rom: None,
        }
    }
}

impl MachineConfig {
    /// Bare machine: a single interrupt controller and nothing else.
    pub fn builder() -> MachineConfig {
        Self {
            master_pic: 0x20,
            slave_pic: None,
            video: false,
            font_rom: None,
        }
    }

    pub fn set_master_pic(mut self, base: u16) -> Self {
        self.master_pic = base;
        self
    }

    pub fn set_slave_pic(mut self, base: u16) -> Self {
        self.slave_pic = Some(base);
        self
    }

    pub fn enable_video(mut self) -> Self {
        self.video = true;
        self
    }

    pub fn set_font_rom<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.font_rom = Some(path.into());
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
