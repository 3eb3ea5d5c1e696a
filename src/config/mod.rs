//! Configuration management module
//!
//! Handles loading, validation, and management of application configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::output::BufferLimits;
use crate::resize::TerminalMetrics;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Logging level
    pub log_level: String,

    /// File-based logging configuration
    pub log: LogConfig,

    /// Scrollback limits applied to every session buffer
    pub buffer: BufferConfig,

    /// Terminal geometry defaults and cell metrics
    pub terminal: TerminalConfig,

    /// Event bus sizing
    #[serde(default)]
    pub event_bus: EventBusConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Absolute or relative path to the log file
    pub file_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Raw bytes retained per session
    pub scrollback_bytes: usize,

    /// Rendered lines retained per session
    pub scrollback_lines: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub default_cols: u16,
    pub default_rows: u16,
    pub cell_width: f32,
    pub cell_height: f32,
    pub padding: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Upstream channel capacity
    pub capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log: LogConfig::default(),
            buffer: BufferConfig::default(),
            terminal: TerminalConfig::default(),
            event_bus: EventBusConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file_path: "logs/terminoda.log".to_string(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        let limits = BufferLimits::default();
        Self {
            scrollback_bytes: limits.scrollback_bytes,
            scrollback_lines: limits.scrollback_lines,
        }
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        let metrics = TerminalMetrics::default();
        Self {
            default_cols: 80,
            default_rows: 24,
            cell_width: metrics.cell_width,
            cell_height: metrics.cell_height,
            padding: metrics.padding,
        }
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

impl BufferConfig {
    pub fn limits(&self) -> BufferLimits {
        BufferLimits {
            scrollback_bytes: self.scrollback_bytes,
            scrollback_lines: self.scrollback_lines,
        }
    }
}

impl TerminalConfig {
    pub fn metrics(&self) -> TerminalMetrics {
        TerminalMetrics {
            cell_width: self.cell_width,
            cell_height: self.cell_height,
            padding: self.padding,
        }
    }
}

impl Config {
    /// Load configuration from file with environment variable overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        // TERMINODA_LOG_LEVEL - logging level
        if let Ok(log_level) = env::var("TERMINODA_LOG_LEVEL") {
            self.log_level = log_level;
        }

        // TERMINODA_LOG_FILE_PATH - logging destination file
        if let Ok(file_path) = env::var("TERMINODA_LOG_FILE_PATH") {
            if !file_path.trim().is_empty() {
                self.log.file_path = file_path;
            }
        }

        // TERMINODA_SCROLLBACK_BYTES - raw bytes kept per session
        if let Ok(bytes) = env::var("TERMINODA_SCROLLBACK_BYTES") {
            if let Ok(value) = bytes.parse::<usize>() {
                self.buffer.scrollback_bytes = value;
            }
        }

        // TERMINODA_SCROLLBACK_LINES - rendered lines kept per session
        if let Ok(lines) = env::var("TERMINODA_SCROLLBACK_LINES") {
            if let Ok(value) = lines.parse::<usize>() {
                self.buffer.scrollback_lines = value;
            }
        }

        // TERMINODA_CELL_WIDTH / TERMINODA_CELL_HEIGHT - font cell size in pixels
        if let Ok(width) = env::var("TERMINODA_CELL_WIDTH") {
            if let Ok(value) = width.parse::<f32>() {
                self.terminal.cell_width = value;
            }
        }
        if let Ok(height) = env::var("TERMINODA_CELL_HEIGHT") {
            if let Ok(value) = height.parse::<f32>() {
                self.terminal.cell_height = value;
            }
        }

        // TERMINODA_EVENT_BUS_CAPACITY - upstream channel size
        if let Ok(capacity) = env::var("TERMINODA_EVENT_BUS_CAPACITY") {
            if let Ok(value) = capacity.parse::<usize>() {
                self.event_bus.capacity = value;
            }
        }
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory: {}", parent.display())
                })?;
            }
        }

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let (config, error) = Self::load_with_fallback(path);
        if let Some(err) = error {
            tracing::warn!("Failed to load config: {}, using defaults", err);
        }
        config
    }

    /// Like [`load_or_default`](Self::load_or_default), but hands the load error back
    /// instead of logging it
    pub fn load_with_fallback<P: AsRef<Path>>(path: P) -> (Self, Option<anyhow::Error>) {
        match Self::load_from_file(path) {
            Ok(config) => (config, None),
            Err(err) => {
                let mut config = Self::default();
                config.apply_env_overrides();
                (config, Some(err))
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.log.file_path.trim().is_empty() {
            anyhow::bail!("Log file path must not be empty");
        }

        if self.buffer.scrollback_bytes == 0 {
            anyhow::bail!("buffer.scrollback_bytes must be greater than 0");
        }

        if self.buffer.scrollback_lines == 0 {
            anyhow::bail!("buffer.scrollback_lines must be greater than 0");
        }

        if self.terminal.default_cols == 0 || self.terminal.default_rows == 0 {
            anyhow::bail!("terminal.default_cols and terminal.default_rows must be greater than 0");
        }

        if self.terminal.cell_width <= 0.0 || self.terminal.cell_height <= 0.0 {
            anyhow::bail!("terminal cell size must be positive");
        }

        if self.terminal.padding < 0.0 {
            anyhow::bail!("terminal.padding must not be negative");
        }

        if self.event_bus.capacity == 0 {
            anyhow::bail!("event_bus.capacity must be greater than 0");
        }

        Ok(())
    }

    /// Apply a `key = value` change; returns an error for unknown keys or bad values
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let key_normalized = key.to_ascii_lowercase().replace('-', "_");
        match key_normalized.as_str() {
            "buffer.scrollback_lines" => {
                let parsed: usize = value
                    .parse()
                    .with_context(|| format!("Invalid buffer.scrollback_lines value: {}", value))?;
                if parsed == 0 {
                    anyhow::bail!("buffer.scrollback_lines must be greater than 0");
                }
                self.buffer.scrollback_lines = parsed;
            }
            "terminal.cell_width" | "terminal.cell_height" => {
                let parsed: f32 = value
                    .parse()
                    .with_context(|| format!("Invalid {} value: {}", key_normalized, value))?;
                if parsed <= 0.0 {
                    anyhow::bail!("{} must be positive", key_normalized);
                }
                if key_normalized == "terminal.cell_width" {
                    self.terminal.cell_width = parsed;
                } else {
                    self.terminal.cell_height = parsed;
                }
            }
            other => anyhow::bail!("Unsupported config key: {}", other),
        }
        Ok(())
    }

    /// Display formatted configuration
    pub fn display(&self) -> Result<()> {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(self).context("Failed to serialize configuration")?);
        Ok(())
    }

    /// Display configuration summary
    pub fn display_summary(&self) -> Result<()> {
        println!("Configuration loaded successfully");
        println!(
            "  scrollback: {} bytes / {} lines",
            self.buffer.scrollback_bytes, self.buffer.scrollback_lines
        );
        println!(
            "  terminal: {}x{} (cell {}x{}px)",
            self.terminal.default_cols,
            self.terminal.default_rows,
            self.terminal.cell_width,
            self.terminal.cell_height
        );
        println!("  log file: {}", self.log.file_path);
        Ok(())
    }

    /// Display configuration management help
    pub fn display_help() -> Result<()> {
        println!("Configuration management commands:");
        println!("  terminoda config show    - Show current configuration");
        println!("  terminoda config set <key> <value> - Set configuration value");
        println!("  terminoda config reset   - Reset to default configuration");
        println!("Settable keys: buffer.scrollback_lines, terminal.cell_width, terminal.cell_height");
        Ok(())
    }

    /// Handle configuration command against the file at `path`
    pub fn handle_command<P: AsRef<Path>>(
        action: &Option<crate::cli::ConfigAction>,
        path: P,
    ) -> Result<()> {
        match action {
            Some(crate::cli::ConfigAction::Show) => {
                let config = Config::load_or_default(&path);
                config.display()?;
            }
            Some(crate::cli::ConfigAction::Set { key, value }) => {
                let mut config = Config::load_or_default(&path);
                config.set_value(key, value)?;
                config.validate()?;
                config.save_to_file(&path)?;
                println!("Updated {} = {}", key, value);
            }
            Some(crate::cli::ConfigAction::Reset) => {
                let default_config = Config::default();
                default_config.save_to_file(&path)?;
                default_config.display()?;
            }
            None => {
                Config::display_help()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.terminal.default_cols, 80);
        assert_eq!(config.buffer.limits(), BufferLimits::default());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(config.buffer.scrollback_lines, deserialized.buffer.scrollback_lines);
        assert_eq!(config.log.file_path, deserialized.log.file_path);
    }

    #[test]
    fn test_config_file_operations() {
        let mut config = Config::default();
        config.buffer.scrollback_lines = 500;
        let temp_file = NamedTempFile::new().unwrap();

        config.save_to_file(temp_file.path()).unwrap();

        let loaded_config = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(loaded_config.buffer.scrollback_lines, 500);
    }

    #[test]
    fn test_set_value() {
        let mut config = Config::default();
        config.set_value("buffer.scrollback_lines", "2000").unwrap();
        config.set_value("terminal.cell-width", "10.5").unwrap();

        assert_eq!(config.buffer.scrollback_lines, 2000);
        assert_eq!(config.terminal.cell_width, 10.5);
        assert!(config.set_value("terminal.cell_height", "0").is_err());
        assert!(config.set_value("unknown.key", "1").is_err());
    }

    #[test]
    fn test_partial_file_uses_section_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(
            temp_file.path(),
            "log_level = \"debug\"\n[log]\nfile_path = \"t.log\"\n[buffer]\nscrollback_lines = 42\n[terminal]\n",
        )
        .unwrap();

        let config = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.buffer.scrollback_lines, 42);
        assert_eq!(config.buffer.scrollback_bytes, BufferLimits::default().scrollback_bytes);
        assert_eq!(config.event_bus.capacity, 1024);
    }

    #[test]
    fn test_missing_file_falls_back_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let (config, error) = Config::load_with_fallback(dir.path().join("absent.toml"));

        let err = error.unwrap();
        assert!(format!("{:#}", err).contains("absent.toml"));
        assert_eq!(config.buffer.scrollback_lines, BufferLimits::default().scrollback_lines);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.event_bus.capacity = 0;
        assert!(config.validate().is_err());
    }
}
