//! Configuration management for the G-code console.
//!
//! Handles:
//! - Command-line argument parsing
//! - The optional TOML config file

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Command-line arguments for the G-code console
#[derive(Debug, Default, Parser)]
#[command(name = "gcode-console")]
#[command(about = "Feed host G-code lines to the command dispatcher")]
#[command(version)]
pub struct Args {
    /// Config file to load instead of the default location
    #[arg(long, help = "Path to a TOML config file")]
    pub config: Option<PathBuf>,

    /// Use grbl-style response text
    #[arg(long, help = "Answer in grbl dialect")]
    pub grbl: bool,

    /// Log each parsed command
    #[arg(long, help = "Log parsed commands at debug level")]
    pub echo: bool,

    /// Log level for the console
    #[arg(long, help = "Log level (trace, debug, info, warn, error)")]
    pub log_level: Option<String>,

    /// Read lines from a file instead of stdin
    #[arg(long, help = "G-code file to stream")]
    pub input: Option<PathBuf>,

    /// Directory that backs `/sd/`
    #[arg(long, help = "Directory used as the SD card for M28/M29 and rm")]
    pub sd_root: Option<PathBuf>,
}

/// Contents of the TOML config file
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub grbl_mode: bool,
    pub echo: bool,
    pub log_level: Option<String>,
    pub sd_root: Option<PathBuf>,
}

/// Combined configuration from all sources
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// grbl response dialect
    pub grbl_mode: bool,
    /// Log parsed commands
    pub echo: bool,
    /// Log level
    pub log_level: String,
    /// Input file, stdin when `None`
    pub input: Option<PathBuf>,
    /// SD card directory, uploads fail when `None`
    pub sd_root: Option<PathBuf>,
    /// Config file that was loaded, if any
    pub config_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grbl_mode: false,
            echo: false,
            log_level: "info".to_string(),
            input: None,
            sd_root: None,
            config_file: None,
        }
    }
}

impl Config {
    /// Create configuration from command-line arguments
    pub fn from_args_and_env() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    /// Create configuration from explicit arguments (useful for testing)
    ///
    /// An explicit `--config` must exist; the default location is only
    /// used when present. Command-line flags override the file.
    pub fn from_args(args: Args) -> Result<Self> {
        let path = match args.config {
            Some(path) => Some(path),
            None => Self::default_config_path().filter(|p| p.is_file()),
        };

        let file = match &path {
            Some(path) => Self::load_file(path)?,
            None => ConfigFile::default(),
        };

        Ok(Config {
            grbl_mode: args.grbl || file.grbl_mode,
            echo: args.echo || file.echo,
            log_level: args
                .log_level
                .or(file.log_level)
                .unwrap_or_else(|| "info".to_string()),
            input: args.input,
            sd_root: args.sd_root.or(file.sd_root),
            config_file: path,
        })
    }

    /// Parse a config file
    pub fn load_file(path: &Path) -> Result<ConfigFile> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// `<config dir>/gcode-console/config.toml`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gcode-console").join("config.toml"))
    }
}
