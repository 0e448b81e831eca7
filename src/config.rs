//! Server configuration
//!
//! Reads settings from ~/.config/computer-tool-server/config.toml. `WIDTH`,
//! `HEIGHT` and `DISPLAY_NUM` in the environment override the file.

use crate::tools::computer::ComputerSettings;
use crate::tools::ToolVersion;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BIND: &str = "[::]:8081";

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address
    pub bind: String,
    /// Tool group to serve
    pub tool_version: ToolVersion,
    /// X display number passed to xdotool as DISPLAY=:<n>
    pub display_num: Option<u32>,
    /// Screen width in pixels; detected from the primary monitor when unset
    pub width: Option<u32>,
    /// Screen height in pixels; detected from the primary monitor when unset
    pub height: Option<u32>,
    /// Scale screenshots and coordinates down to XGA/WXGA/FWXGA
    pub scaling: bool,
    /// Settle time before the screenshot that follows an input action
    pub screenshot_delay_ms: u64,
    /// List of disabled action names (all others are enabled)
    pub disabled: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            tool_version: ToolVersion::default(),
            display_num: None,
            width: None,
            height: None,
            scaling: true,
            screenshot_delay_ms: 2000,
            disabled: Vec::new(),
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("computer-tool-server").join("config.toml"))
    }

    /// Load config from file, or return default if not found, then apply the environment
    pub fn load() -> Self {
        let mut config = Self::load_file();
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    /// Load config from file only, or return default if not found
    pub fn load_file() -> Self {
        let Some(path) = Self::path() else {
            tracing::warn!("Could not determine config directory, using defaults");
            return Self::default();
        };

        if !path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", path);
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::error!("Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::error!("Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to file
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Override screen settings from `WIDTH`, `HEIGHT` and `DISPLAY_NUM`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |name: &str, slot: &mut Option<u32>| {
            if let Some(raw) = lookup(name) {
                match raw.trim().parse() {
                    Ok(value) => *slot = Some(value),
                    Err(_) => tracing::warn!("Ignoring {}={:?}: not a number", name, raw),
                }
            }
        };

        read("WIDTH", &mut self.width);
        read("HEIGHT", &mut self.height);
        read("DISPLAY_NUM", &mut self.display_num);
    }

    /// Check if an action is enabled
    pub fn is_enabled(&self, action: &str) -> bool {
        !self.disabled.iter().any(|a| a == action)
    }

    /// Enable an action (remove from disabled list)
    pub fn enable(&mut self, action: &str) {
        self.disabled.retain(|a| a != action);
    }

    /// Disable an action (add to disabled list)
    pub fn disable(&mut self, action: &str) {
        if self.is_enabled(action) {
            self.disabled.push(action.to_string());
        }
    }

    /// Screen geometry, when both dimensions are configured
    pub fn geometry(&self) -> Option<(u32, u32)> {
        self.width.zip(self.height)
    }

    /// True when `display_num` is set and `$DISPLAY` (e.g. `:1`, `host:1.0`)
    /// names a different display. Screen capture follows `$DISPLAY`.
    pub fn display_mismatch(&self, display_env: Option<&str>) -> bool {
        let Some(wanted) = self.display_num else {
            return false;
        };
        let current = display_env
            .and_then(|d| d.rsplit_once(':'))
            .and_then(|(_, rest)| rest.split('.').next())
            .and_then(|n| n.parse::<u32>().ok());
        current != Some(wanted)
    }

    pub fn computer_settings(&self, geometry: Option<(u32, u32)>) -> ComputerSettings {
        ComputerSettings {
            display_num: self.display_num,
            geometry,
            scaling: self.scaling,
            screenshot_delay: Duration::from_millis(self.screenshot_delay_ms),
            disabled: self.disabled.clone(),
        }
    }
}
