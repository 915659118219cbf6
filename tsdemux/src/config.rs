//! Configuration file.
//!
//! ```toml
//! [demux]
//! standards = "isdb"
//! check_crc = true
//! notify_repeats = false
//! ignore_next = false
//!
//! [logging]
//! log_dir = "logs"
//! retention_days = 7
//! level = "info"
//!
//! [output]
//! format = "summary"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tsdemux_core::{DemuxConfig, Standards};

use crate::output::OutputFormat;

/// File looked up in the current directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "tsdemux.toml";

/// Standards used when neither the command line nor the file sets them.
pub const DEFAULT_STANDARDS: Standards = Standards::DVB;

/// Configuration file format.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub demux: DemuxSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Deserialize, Default)]
pub struct DemuxSection {
    pub standards: Option<Standards>,
    pub check_crc: Option<bool>,
    pub notify_repeats: Option<bool>,
    pub ignore_next: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LoggingSection {
    pub log_dir: Option<String>,
    pub retention_days: Option<u64>,
    pub level: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct OutputSection {
    pub format: Option<OutputFormat>,
}

impl ConfigFile {
    /// Demux configuration; `standards` from the command line wins.
    pub fn demux_config(&self, standards: Option<Standards>) -> DemuxConfig {
        let defaults = DemuxConfig::default();
        DemuxConfig {
            check_crc: self.demux.check_crc.unwrap_or(defaults.check_crc),
            notify_repeats: self.demux.notify_repeats.unwrap_or(defaults.notify_repeats),
            ignore_next: self.demux.ignore_next.unwrap_or(defaults.ignore_next),
            standards: standards
                .or(self.demux.standards)
                .unwrap_or(DEFAULT_STANDARDS),
        }
    }
}

pub fn load_config(path: &Path) -> Result<ConfigFile, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Explicit path, else `tsdemux.toml` if it exists.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit.map(Path::to_path_buf).or_else(|| {
        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            Some(default_path)
        } else {
            None
        }
    })
}
