use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{io_error_at, CacheError, Result};

pub const DEFAULT_CACHE_DIR_NAME: &str = "global-model-cache";
pub const DEFAULT_CACHE_FILE_NAME: &str = "global-model-cache.bin.zst";

pub const ENV_CACHE_DIR: &str = "MODEL_CACHE_DIR";
pub const ENV_CACHE_DISABLED: &str = "MODEL_CACHE_DISABLED";
pub const ENV_SAVE_DELAY_MS: &str = "MODEL_CACHE_SAVE_DELAY_MS";

/// Settings for the global model cache slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false the cache is never installed and lookups report it as unavailable.
    pub enabled: bool,
    /// Directory holding the cache file. Defaults to the user cache directory.
    pub cache_dir: Option<PathBuf>,
    pub file_name: String,
    /// Version of the model's serialized shape. Bump it when the model changes.
    pub model_version: u32,
    /// Quiet period a burst of save requests must reach before the save runs.
    pub save_delay_ms: u64,
    /// Upper bound on how long a burst may postpone its save.
    pub max_save_delay_ms: u64,
    /// Write a pending save before the writer thread exits.
    pub flush_on_shutdown: bool,
    pub compression_level: i32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_dir: None,
            file_name: DEFAULT_CACHE_FILE_NAME.to_string(),
            model_version: 1,
            save_delay_ms: 1_000,
            max_save_delay_ms: 10_000,
            flush_on_shutdown: true,
            compression_level: 3,
        }
    }
}

impl CacheConfig {
    /// Loads a JSON config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(error) => return Err(io_error_at("read cache config", path, error)),
        };
        let config: Self = serde_json::from_str(&data).map_err(|error| {
            CacheError::Config(format!(
                "failed to parse cache config {}: {error}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `MODEL_CACHE_*` environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(ENV_CACHE_DIR).filter(|value| !value.trim().is_empty()) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(disabled) = lookup(ENV_CACHE_DISABLED) {
            if matches!(disabled.trim(), "1" | "true" | "yes") {
                self.enabled = false;
            }
        }
        if let Some(delay) = lookup(ENV_SAVE_DELAY_MS) {
            match delay.trim().parse::<u64>() {
                Ok(value) => self.save_delay_ms = value,
                Err(error) => {
                    tracing::warn!("ignoring {ENV_SAVE_DELAY_MS}={delay}: {error}");
                }
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let name = self.file_name.trim();
        if name.is_empty() || name == "." || name == ".." {
            return Err(CacheError::Config(format!(
                "invalid cache file name {:?}",
                self.file_name
            )));
        }
        if name.contains('/') || name.contains('\\') {
            return Err(CacheError::Config(format!(
                "cache file name must not contain path separators: {:?}",
                self.file_name
            )));
        }
        if !zstd::compression_level_range().contains(&self.compression_level) {
            return Err(CacheError::Config(format!(
                "compression level {} out of range",
                self.compression_level
            )));
        }
        Ok(())
    }

    /// Resolves the full path of the cache file.
    pub fn cache_path(&self) -> Result<PathBuf> {
        let dir = match &self.cache_dir {
            Some(dir) => dir.clone(),
            None => dirs::cache_dir()
                .map(|dir| dir.join(DEFAULT_CACHE_DIR_NAME))
                .ok_or_else(|| {
                    CacheError::Config("no user cache directory available".to_string())
                })?,
        };
        Ok(dir.join(&self.file_name))
    }

    pub fn save_delay(&self) -> Duration {
        Duration::from_millis(self.save_delay_ms)
    }

    pub fn max_save_delay(&self) -> Duration {
        Duration::from_millis(self.max_save_delay_ms.max(self.save_delay_ms))
    }
}
