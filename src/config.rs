use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigLoadError;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserOptions {
    pub headless: bool,
    pub disable_images: bool,
    pub user_agent: String,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        BrowserOptions {
            headless: false,
            disable_images: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Typed view of the merged configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub max_results: usize,
    /// Seconds, applied to every element wait.
    pub timeout: u64,
    pub download_path: PathBuf,
    pub search_history_file: PathBuf,
    /// Reserved. Nothing retries yet.
    pub max_retries: u32,
    /// Pacing bounds in seconds.
    pub wait_time: (f64, f64),
    pub browser_options: BrowserOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            max_results: 20,
            timeout: 10,
            download_path: PathBuf::from("downloads"),
            search_history_file: PathBuf::from("search_history.json"),
            max_retries: 3,
            wait_time: (1.0, 3.0),
            browser_options: BrowserOptions::default(),
        }
    }
}

/// Defaults overlaid with `config.json`.
///
/// The overlay is shallow: a top level key in the file replaces the default
/// value wholesale, including nested objects such as `browserOptions`.
#[derive(Debug, Clone)]
pub struct Configuration {
    path: PathBuf,
    values: Map<String, Value>,
    settings: Settings,
}

impl Configuration {
    /// Loads `path`, writing the defaults there first if it does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref().to_path_buf();
        let defaults = default_values()?;

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No config file at {:?}. Writing defaults.", path);
                write_defaults(&path, &defaults)?;
                return Self::from_values(path, defaults);
            }
            Err(e) => {
                error!("Failed to read config file {:?}: {}", path, e);
                return Err(ConfigLoadError::Io { path, source: e });
            }
        };

        let overrides = match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                error!("Config file {:?} is not a JSON object", path);
                return Err(ConfigLoadError::NotAnObject { path });
            }
            Err(e) => {
                error!("Failed to parse config file {:?}: {}", path, e);
                return Err(ConfigLoadError::Parse { path, source: e });
            }
        };

        let mut values = defaults;
        for (key, value) in overrides {
            values.insert(key, value);
        }
        info!("Loaded config from {:?}", path);
        Self::from_values(path, values)
    }

    fn from_values(path: PathBuf, values: Map<String, Value>) -> Result<Self, ConfigLoadError> {
        let mut settings: Settings = serde_json::from_value(Value::Object(values.clone()))
            .map_err(|e| {
                error!("Config {:?} has an invalid value: {}", path, e);
                ConfigLoadError::Invalid(e)
            })?;
        let (min, max) = settings.wait_time;
        for bound in [min, max] {
            if let Err(e) = Duration::try_from_secs_f64(bound) {
                error!("Config {:?} has an unusable waitTime bound {}: {}", path, bound, e);
                return Err(ConfigLoadError::OutOfRange {
                    key: "waitTime",
                    message: format!("{} seconds: {}", bound, e),
                });
            }
        }
        if min > max {
            settings.wait_time = (max, min);
        }
        Ok(Configuration { path, values, settings })
    }

    /// Raw merged value for `key`, `None` when the key is unknown.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn default_values() -> Result<Map<String, Value>, ConfigLoadError> {
    match serde_json::to_value(Settings::default()).map_err(ConfigLoadError::Invalid)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

fn write_defaults(path: &Path, defaults: &Map<String, Value>) -> Result<(), ConfigLoadError> {
    let json = serde_json::to_string_pretty(defaults).map_err(ConfigLoadError::Invalid)?;
    fs::write(path, json).map_err(|e| {
        error!("Failed to write default config to {:?}: {}", path, e);
        ConfigLoadError::Io {
            path: path.to_path_buf(),
            source: e,
        }
    })
}
