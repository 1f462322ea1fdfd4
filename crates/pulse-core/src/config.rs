use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub console: ConsoleConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// Base size of the visible window and the step it grows by.
    pub window_base_limit: usize,
    /// How many records at each end of the window count as "near" that edge.
    pub edge_threshold: usize,
    /// Fetch batch hint passed to the record store.
    pub fetch_batch_size: usize,
    pub criteria_debounce_ms: u64,
    pub filter_term_throttle_ms: u64,
    pub refresh_event_capacity: usize,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            window_base_limit: 100,
            edge_threshold: 5,
            fetch_batch_size: 100,
            criteria_debounce_ms: 500,
            filter_term_throttle_ms: 250,
            refresh_event_capacity: 64,
        }
    }
}

impl ConsoleConfig {
    pub fn criteria_debounce(&self) -> Duration {
        Duration::from_millis(self.criteria_debounce_ms)
    }

    pub fn filter_term_throttle(&self) -> Duration {
        Duration::from_millis(self.filter_term_throttle_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// Retention cap; 0 keeps every record.
    pub max_records: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "console".to_string(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.console.window_base_limit == 0 {
            return Err(ConfigError::Invalid(
                "console.window_base_limit must be at least 1".into(),
            ));
        }
        if self.console.edge_threshold == 0 {
            return Err(ConfigError::Invalid(
                "console.edge_threshold must be at least 1".into(),
            ));
        }
        if self.console.fetch_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "console.fetch_batch_size must be at least 1".into(),
            ));
        }
        if self.console.refresh_event_capacity == 0 {
            return Err(ConfigError::Invalid(
                "console.refresh_event_capacity must be at least 1".into(),
            ));
        }
        match self.logging.level.to_lowercase().trim() {
            "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::Invalid(
                    "logging.level must be one of debug, info, warn, error".into(),
                ))
            }
        }
        match self.logging.format.to_lowercase().trim() {
            "console" | "json" => {}
            _ => {
                return Err(ConfigError::Invalid(
                    "logging.format must be one of console, json".into(),
                ))
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct PartialConfig {
    #[serde(default)]
    console: PartialConsoleConfig,
    #[serde(default)]
    store: PartialStoreConfig,
    #[serde(default)]
    logging: PartialLoggingConfig,
}

#[derive(Debug, Default, Deserialize)]
struct PartialConsoleConfig {
    #[serde(default)]
    window_base_limit: Option<usize>,
    #[serde(default)]
    edge_threshold: Option<usize>,
    #[serde(default)]
    fetch_batch_size: Option<usize>,
    #[serde(default)]
    criteria_debounce_ms: Option<u64>,
    #[serde(default)]
    filter_term_throttle_ms: Option<u64>,
    #[serde(default)]
    refresh_event_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialStoreConfig {
    #[serde(default)]
    max_records: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialLoggingConfig {
    #[serde(default)]
    level: String,
    #[serde(default)]
    format: String,
}

/// Load config with precedence defaults < config file < `PULSE_*` environment.
///
/// An explicit path that cannot be read is an error; a missing default file is not.
pub fn load_config(config_file: Option<&str>) -> Result<(Config, Option<PathBuf>), ConfigError> {
    let mut cfg = Config::default();

    let explicit = config_file
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from);

    let (path_to_try, used) = if let Some(path) = explicit {
        (Some(path), true)
    } else {
        (default_config_path(), false)
    };

    let mut loaded_from = None;
    if let Some(path) = path_to_try {
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                apply_yaml(&mut cfg, &text)?;
                loaded_from = Some(path);
            }
            Err(err) => {
                if used {
                    return Err(ConfigError::Read { path, source: err });
                }
            }
        }
    }

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    cfg.validate()?;
    Ok((cfg, loaded_from))
}

/// Merge a YAML document into `cfg`; absent keys keep their current value.
pub fn apply_yaml(cfg: &mut Config, text: &str) -> Result<(), ConfigError> {
    let parsed: PartialConfig = serde_yaml::from_str(text)?;
    apply_partial(cfg, parsed);
    Ok(())
}

fn apply_partial(cfg: &mut Config, partial: PartialConfig) {
    let console = partial.console;
    if let Some(value) = console.window_base_limit {
        cfg.console.window_base_limit = value;
    }
    if let Some(value) = console.edge_threshold {
        cfg.console.edge_threshold = value;
    }
    if let Some(value) = console.fetch_batch_size {
        cfg.console.fetch_batch_size = value;
    }
    if let Some(value) = console.criteria_debounce_ms {
        cfg.console.criteria_debounce_ms = value;
    }
    if let Some(value) = console.filter_term_throttle_ms {
        cfg.console.filter_term_throttle_ms = value;
    }
    if let Some(value) = console.refresh_event_capacity {
        cfg.console.refresh_event_capacity = value;
    }
    if let Some(value) = partial.store.max_records {
        cfg.store.max_records = value;
    }
    if !partial.logging.level.trim().is_empty() {
        cfg.logging.level = partial.logging.level.trim().to_string();
    }
    if !partial.logging.format.trim().is_empty() {
        cfg.logging.format = partial.logging.format.trim().to_string();
    }
}

/// Apply `PULSE_*` overrides read through `lookup`.
pub fn apply_env_overrides<F>(cfg: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(level) = read("PULSE_LOG_LEVEL") {
        cfg.logging.level = level.trim().to_string();
    }
    if let Some(format) = read("PULSE_LOG_FORMAT") {
        cfg.logging.format = format.trim().to_string();
    }
    if let Some(raw) = read("PULSE_WINDOW_BASE_LIMIT") {
        cfg.console.window_base_limit = parse_env("PULSE_WINDOW_BASE_LIMIT", &raw)?;
    }
    if let Some(raw) = read("PULSE_FETCH_BATCH_SIZE") {
        cfg.console.fetch_batch_size = parse_env("PULSE_FETCH_BATCH_SIZE", &raw)?;
    }
    if let Some(raw) = read("PULSE_STORE_MAX_RECORDS") {
        cfg.store.max_records = parse_env("PULSE_STORE_MAX_RECORDS", &raw)?;
    }
    Ok(())
}

fn parse_env(key: &'static str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim().parse::<usize>().map_err(|_| ConfigError::Env {
        key,
        value: raw.to_string(),
    })
}

fn default_config_path() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.trim().is_empty() {
            return Some(PathBuf::from(xdg).join("pulse").join("config.yaml"));
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        if !home.trim().is_empty() {
            return Some(
                Path::new(&home)
                    .join(".config")
                    .join("pulse")
                    .join("config.yaml"),
            );
        }
    }
    None
}
