//! Configuration module for AimLens.
//!
//! This module provides the flat settings document shared by the runner and
//! the magnifier process:
//! - `hotkeys`: key-combo strings for the global hotkeys
//! - `crosshair`: crosshair overlay appearance
//! - `magnifier`: capture and display parameters for the magnifier
//!
//! The configuration is stored as `config.json`. Loading never fails: a
//! missing or broken file yields the built-in defaults, and a broken section
//! only resets that section.
//!
//! # Example
//!
//! ```rust,no_run
//! use aimlens_core::config::{resolve_config_path, load_config_from, save_config};
//!
//! let path = resolve_config_path(None).unwrap();
//! let mut config = load_config_from(&path);
//! config.magnifier.set_zoom(3.0);
//! save_config(&path, &config).expect("Failed to save config");
//! ```

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, warn};

/// File name of the settings document
pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to determine user data directory")]
    NoDataDirectory,
    #[error("failed to create data directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Resampling algorithm used to scale the captured region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Interpolation {
    Nearest,
    #[default]
    Linear,
    Cubic,
    Lanczos,
}

impl Interpolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interpolation::Nearest => "nearest",
            Interpolation::Linear => "linear",
            Interpolation::Cubic => "cubic",
            Interpolation::Lanczos => "lanczos",
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interpolation {
    type Err = std::convert::Infallible;

    /// Unknown names map to `Linear`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "nearest" => Interpolation::Nearest,
            "cubic" => Interpolation::Cubic,
            "lanczos" => Interpolation::Lanczos,
            _ => Interpolation::Linear,
        })
    }
}

impl From<String> for Interpolation {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(mode) => mode,
            Err(never) => match never {},
        }
    }
}

impl From<Interpolation> for String {
    fn from(value: Interpolation) -> Self {
        value.as_str().to_string()
    }
}

/// Magnifier parameters
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MagnifierConfig {
    /// Side of the square screen region sampled each frame
    pub capture_size: u32,
    /// Side of the square magnifier window
    pub display_size: u32,
    /// Zoom factor the settings layer derives `capture_size` from
    pub zoom: f32,
    pub target_fps: u32,
    pub interpolation: Interpolation,
    /// 1-based monitor number, 0 = whole virtual desktop
    pub monitor_index: u32,
    #[serde(alias = "use_cuda")]
    pub use_gpu: bool,
    pub offset_x: i32,
    pub offset_y: i32,
}

impl Default for MagnifierConfig {
    fn default() -> Self {
        MagnifierConfig {
            capture_size: 150,
            display_size: 300,
            zoom: 2.0,
            target_fps: 60,
            interpolation: Interpolation::Linear,
            monitor_index: 1,
            use_gpu: false,
            offset_x: 0,
            offset_y: 0,
        }
    }
}

impl MagnifierConfig {
    /// Replace non-positive sizes and rates with their defaults
    pub fn sanitized(mut self) -> Self {
        let defaults = MagnifierConfig::default();
        if self.capture_size == 0 {
            self.capture_size = defaults.capture_size;
        }
        if self.display_size == 0 {
            self.display_size = defaults.display_size;
        }
        if self.target_fps == 0 {
            self.target_fps = defaults.target_fps;
        }
        if !(self.zoom.is_finite() && self.zoom > 0.0) {
            self.zoom = defaults.zoom;
        }
        self
    }

    /// Set the zoom factor and derive `capture_size = display_size / zoom`,
    /// truncated
    pub fn set_zoom(&mut self, zoom: f32) {
        if !(zoom.is_finite() && zoom > 0.0) {
            return;
        }
        self.zoom = zoom;
        let derived = (self.display_size as f32 / zoom).trunc();
        self.capture_size = (derived as u32).max(1);
    }
}

/// Key-combo strings, e.g. `"ctrl+alt+x"` or `"f1"`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct HotkeyConfig {
    /// Show/hide the crosshair overlay
    pub toggle: String,
    /// Show/hide the magnifier
    pub magnifier: String,
    /// Quit the runner; empty disables it
    pub exit: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        HotkeyConfig {
            toggle: "f1".to_string(),
            magnifier: "f2".to_string(),
            exit: "ctrl+alt+escape".to_string(),
        }
    }
}

/// Crosshair shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrosshairShape {
    #[default]
    Cross,
    Dot,
    Circle,
    CircleDot,
    Chevron,
    CrossNoDot,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct CrosshairConfig {
    #[serde(rename = "type")]
    pub shape: CrosshairShape,
    pub r: u8,
    pub g: u8,
    pub b: u8,
    /// Window opacity, 0-255
    pub alpha: u8,
    pub size: f32,
    pub thickness: f32,
    pub gap: f32,
    pub dot_size: f32,
}

impl Default for CrosshairConfig {
    fn default() -> Self {
        CrosshairConfig {
            shape: CrosshairShape::Cross,
            r: 0,
            g: 255,
            b: 0,
            alpha: 255,
            size: 15.0,
            thickness: 2.0,
            gap: 5.0,
            dot_size: 2.0,
        }
    }
}

/// The whole settings document
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct AppConfig {
    pub hotkeys: HotkeyConfig,
    pub crosshair: CrosshairConfig,
    pub magnifier: MagnifierConfig,
}

impl AppConfig {
    /// Parse a settings document section by section.
    /// A section that is missing or does not match its schema keeps its defaults.
    pub fn from_json_lenient(contents: &str) -> Self {
        let value: serde_json::Value = match serde_json::from_str(contents) {
            Ok(value) => value,
            Err(e) => {
                warn!("Config is not valid JSON, using defaults: {}", e);
                return AppConfig::default();
            }
        };

        AppConfig {
            hotkeys: section(&value, "hotkeys"),
            crosshair: section(&value, "crosshair"),
            magnifier: section::<MagnifierConfig>(&value, "magnifier").sanitized(),
        }
    }
}

fn section<T>(value: &serde_json::Value, name: &str) -> T
where
    T: for<'de> Deserialize<'de> + Default,
{
    let Some(raw) = value.get(name) else {
        return T::default();
    };
    match T::deserialize(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Config section '{}' is invalid, using defaults: {}", name, e);
            T::default()
        }
    }
}

/// Get the application's data directory, creating it if needed
pub fn get_data_directory() -> Result<PathBuf, ConfigError> {
    let project_dirs = ProjectDirs::from("", "", "AimLens").ok_or(ConfigError::NoDataDirectory)?;
    let data_dir = project_dirs.data_dir();

    fs::create_dir_all(data_dir).map_err(|source| ConfigError::CreateDirectory {
        path: data_dir.to_path_buf(),
        source,
    })?;

    Ok(data_dir.to_path_buf())
}

/// Pick the config file: explicit path, then `./config.json` if it exists,
/// then the data directory.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Ok(local);
    }

    Ok(get_data_directory()?.join(CONFIG_FILE_NAME))
}

/// Load configuration from `path`.
/// Returns defaults if the file doesn't exist or can't be read.
pub fn load_config_from(path: &Path) -> AppConfig {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            debug!("No readable config at {}: {}", path.display(), e);
            return AppConfig::default();
        }
    };

    AppConfig::from_json_lenient(&contents)
}

/// Save configuration to `path` as pretty-printed JSON
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    let json = serde_json::to_string_pretty(config)?;

    fs::write(path, json).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Notices edits to the config file by polling its modification time
pub struct ConfigWatcher {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl ConfigWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last_modified = modified_time(&path);
        Self {
            path,
            last_modified,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file changed since the previous poll.
    /// Creation and deletion count as changes.
    pub fn poll(&mut self) -> bool {
        let current = modified_time(&self.path);
        if current == self.last_modified {
            return false;
        }
        self.last_modified = current;
        true
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}
