use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::persistence::StoreFormat;

pub const KEY_AUTOSAVE_SECS: &str = "TOPOFLOW_AUTOSAVE_SECS";
pub const KEY_AUTOSAVE: &str = "TOPOFLOW_AUTOSAVE";
pub const KEY_LIVE_MODE: &str = "TOPOFLOW_LIVE_MODE";
pub const KEY_AUTO_LAYOUT: &str = "TOPOFLOW_AUTO_LAYOUT";
pub const KEY_STORE_DIR: &str = "TOPOFLOW_STORE_DIR";
pub const KEY_STORE_FORMAT: &str = "TOPOFLOW_STORE_FORMAT";
pub const KEY_LOG_LEVEL: &str = "TOPOFLOW_LOG_LEVEL";

const KEY_PREFIX: &str = "TOPOFLOW_";

/// Key/value settings backend.
#[async_trait]
#[typetag::serde]
pub trait ConfigSource: Send + Sync {
    async fn as_vec(&self) -> Vec<(String, String)> {
        let mut pairs = vec![];
        for key in self.keys().await {
            if let Some(value) = self.get(&key).await {
                pairs.push((key, value));
            }
        }
        pairs
    }
    async fn keys(&self) -> Vec<String>;
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str) -> Result<(), String>;
    async fn del(&self, key: &str);
    fn clone_box(&self) -> Box<dyn ConfigSource>;
    fn debug_box(&self) -> String;
}

#[derive(Serialize, Deserialize)]
pub struct Config(pub Box<dyn ConfigSource>);

impl Config {
    pub fn into_inner(self) -> Box<dyn ConfigSource> {
        self.0
    }
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Config(self.0.clone_box())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.debug_box())
    }
}

/// Reads `TOPOFLOW_*` variables from the process environment, optionally
/// seeded from a `.env` file. Read-only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvConfigSource {
    env_file: Option<PathBuf>,
}

impl EnvConfigSource {
    pub fn new(env_file: Option<PathBuf>) -> Box<Self> {
        if let Some(path) = &env_file {
            match dotenvy::from_path(path) {
                Ok(()) => info!("Loaded .env from {}", path.display()),
                Err(e) => warn!(error = %e, "could not load .env from {}", path.display()),
            }
        }
        Box::new(Self { env_file })
    }
}

#[typetag::serde]
#[async_trait]
impl ConfigSource for EnvConfigSource {
    async fn keys(&self) -> Vec<String> {
        env::vars()
            .map(|(k, _)| k)
            .filter(|k| k.starts_with(KEY_PREFIX))
            .collect()
    }

    async fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }

    async fn set(&self, key: &str, _value: &str) -> Result<(), String> {
        Err(format!("cannot set `{}`: the environment source is read-only", key))
    }

    async fn del(&self, key: &str) {
        warn!(%key, "ignoring delete on the read-only environment source");
    }

    fn clone_box(&self) -> Box<dyn ConfigSource> {
        Box::new(self.clone())
    }

    fn debug_box(&self) -> String {
        match &self.env_file {
            Some(path) => format!("EnvConfigSource({})", path.display()),
            None => "EnvConfigSource".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MapConfigSource {
    #[schemars(with = "std::collections::HashMap<String, String>")]
    map: DashMap<String, String>,
}

impl MapConfigSource {
    pub fn new() -> Box<Self> {
        Box::new(Self::default())
    }

    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Box<Self> {
        let source = Self::default();
        for (k, v) in entries {
            source.map.insert(k.to_string(), v.to_string());
        }
        Box::new(source)
    }
}

#[typetag::serde]
#[async_trait]
impl ConfigSource for MapConfigSource {
    async fn keys(&self) -> Vec<String> {
        self.map.iter().map(|entry| entry.key().clone()).collect()
    }

    async fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).map(|v| v.clone())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), String> {
        self.map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, key: &str) {
        self.map.remove(key);
    }

    fn clone_box(&self) -> Box<dyn ConfigSource> {
        Box::new(self.clone())
    }

    fn debug_box(&self) -> String {
        format!("MapConfigSource({} entries)", self.map.len())
    }
}

/// Engine settings resolved from a [`Config`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub autosave_secs: u64,
    pub autosave_enabled: bool,
    pub live_mode: bool,
    pub auto_layout: bool,
    pub store_dir: PathBuf,
    pub store_yaml: bool,
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            autosave_secs: 30,
            autosave_enabled: true,
            live_mode: true,
            auto_layout: false,
            store_dir: PathBuf::from("./topoflow/flows"),
            store_yaml: false,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Missing keys keep their defaults; malformed ones are logged and
    /// ignored.
    pub async fn load(config: &Config) -> Self {
        let defaults = Self::default();
        let source: &dyn ConfigSource = &*config.0;

        let autosave_secs = match read::<u64>(source, KEY_AUTOSAVE_SECS).await {
            Some(0) => {
                warn!(key = KEY_AUTOSAVE_SECS, "autosave period must be positive; using default");
                defaults.autosave_secs
            }
            Some(secs) => secs,
            None => defaults.autosave_secs,
        };

        let store_yaml = match source.get(KEY_STORE_FORMAT).await {
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "yaml" | "yml" => true,
                "json" => false,
                other => {
                    warn!(key = KEY_STORE_FORMAT, value = other, "unknown store format; using json");
                    false
                }
            },
            None => defaults.store_yaml,
        };

        Self {
            autosave_secs,
            autosave_enabled: read_bool(source, KEY_AUTOSAVE).await.unwrap_or(defaults.autosave_enabled),
            live_mode: read_bool(source, KEY_LIVE_MODE).await.unwrap_or(defaults.live_mode),
            auto_layout: read_bool(source, KEY_AUTO_LAYOUT).await.unwrap_or(defaults.auto_layout),
            store_dir: source
                .get(KEY_STORE_DIR)
                .await
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.store_dir),
            store_yaml,
            log_level: source
                .get(KEY_LOG_LEVEL)
                .await
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.log_level),
        }
    }

    pub fn autosave_period(&self) -> Duration {
        Duration::from_secs(self.autosave_secs)
    }

    pub fn store_format(&self) -> StoreFormat {
        if self.store_yaml { StoreFormat::Yaml } else { StoreFormat::Json }
    }
}

async fn read<T: FromStr>(source: &dyn ConfigSource, key: &str) -> Option<T> {
    let raw = source.get(key).await?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(%key, value = %raw, "malformed setting; using default");
            None
        }
    }
}

async fn read_bool(source: &dyn ConfigSource, key: &str) -> Option<bool> {
    let raw = source.get(key).await?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(%key, value = %raw, "malformed flag; using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::write;
    use tempfile::tempdir;

    #[tokio::test]
    async fn map_source_basic() {
        let source = MapConfigSource::new();
        source.set("foo", "bar").await.unwrap();
        assert_eq!(source.get("foo").await, Some("bar".to_string()));
        source.set("foo", "baz").await.unwrap();
        assert_eq!(source.as_vec().await, vec![("foo".to_string(), "baz".to_string())]);
        source.del("foo").await;
        assert_eq!(source.get("foo").await, None);
    }

    #[tokio::test]
    async fn defaults_when_nothing_is_set() {
        let config = Config(MapConfigSource::new());
        assert_eq!(EngineConfig::load(&config).await, EngineConfig::default());
    }

    #[tokio::test]
    async fn reads_every_key() {
        let config = Config(MapConfigSource::with_entries([
            (KEY_AUTOSAVE_SECS, "5"),
            (KEY_AUTOSAVE, "off"),
            (KEY_LIVE_MODE, "false"),
            (KEY_AUTO_LAYOUT, "1"),
            (KEY_STORE_DIR, "/tmp/flows"),
            (KEY_STORE_FORMAT, "YAML"),
            (KEY_LOG_LEVEL, "debug"),
        ]));
        let engine = EngineConfig::load(&config).await;
        assert_eq!(engine.autosave_period(), Duration::from_secs(5));
        assert!(!engine.autosave_enabled);
        assert!(!engine.live_mode);
        assert!(engine.auto_layout);
        assert_eq!(engine.store_dir, PathBuf::from("/tmp/flows"));
        assert_eq!(engine.store_format(), StoreFormat::Yaml);
        assert_eq!(engine.log_level, "debug");
    }

    #[tokio::test]
    async fn malformed_values_fall_back() {
        let config = Config(MapConfigSource::with_entries([
            (KEY_AUTOSAVE_SECS, "soon"),
            (KEY_LIVE_MODE, "maybe"),
        ]));
        let engine = EngineConfig::load(&config).await;
        assert_eq!(engine.autosave_secs, 30);
        assert!(engine.live_mode);

        let zero = Config(MapConfigSource::with_entries([(KEY_AUTOSAVE_SECS, "0")]));
        assert_eq!(EngineConfig::load(&zero).await.autosave_secs, 30);
    }

    #[tokio::test]
    async fn env_source_reads_dotenv_file() {
        let dir = tempdir().unwrap();
        let env_path = dir.path().join(".env");
        write(&env_path, "TOPOFLOW_TEST_DOTENV_KEY=from-file\n").unwrap();

        let source = EnvConfigSource::new(Some(env_path));
        assert_eq!(source.get("TOPOFLOW_TEST_DOTENV_KEY").await, Some("from-file".to_string()));
        assert!(source.keys().await.contains(&"TOPOFLOW_TEST_DOTENV_KEY".to_string()));
        assert!(source.set("TOPOFLOW_TEST_DOTENV_KEY", "x").await.is_err());
    }

    #[test]
    fn config_round_trips_through_typetag() {
        let config = Config(MapConfigSource::with_entries([(KEY_LOG_LEVEL, "warn")]));
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(format!("{:?}", back), "MapConfigSource(1 entries)");
    }
}
