use crate::Result;
use crate::lock::{LockOption, RetryPolicy, TableLock};
use crate::table::TableOptions;
use crate::tsm::CacheConfig;
use camino::{Utf8Path, Utf8PathBuf};
use core::time::Duration;
use ohno::{IntoAppError, app_err};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;

/// The default configuration TOML content, embedded from `default_config.toml`
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../../default_config.toml");

/// Name of the configuration file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "tilestore.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// How tables are locked
    #[serde(default = "default_lock_option")]
    pub lock_option: LockOption,

    /// How often an auto lock checks whether another process wants it
    #[serde(default = "default_inspection_interval", with = "humantime_serde")]
    pub inspection_interval: Duration,

    /// Longest wait for a lock; zero waits forever
    #[serde(default, with = "humantime_serde")]
    pub max_wait: Duration,

    /// Time between two lock attempts
    #[serde(default = "default_retry_interval", with = "humantime_serde")]
    pub retry_interval: Duration,

    /// Upper bound in bytes for the tile cache of one hypercube, 0 for no bound
    #[serde(default)]
    pub max_cache_size: u64,

    /// Tiles cached per hypercube when no explicit size is set
    #[serde(default = "default_cache_buckets")]
    pub default_cache_buckets: usize,
}

const fn default_lock_option() -> LockOption {
    LockOption::AutoLocking
}

const fn default_inspection_interval() -> Duration {
    Duration::from_secs(5)
}

const fn default_retry_interval() -> Duration {
    Duration::from_secs(1)
}

const fn default_cache_buckets() -> usize {
    32
}

impl Config {
    /// Load configuration from a file or use defaults
    pub fn load(dir: &Utf8Path, config_path: Option<&Utf8PathBuf>) -> Result<Self> {
        let (final_path, text) = if let Some(path) = config_path {
            let text = fs::read_to_string(path).into_app_err_with(|| format!("reading tilestore configuration file '{path}'"))?;
            (path.clone(), text)
        } else {
            let path = dir.join(CONFIG_FILE_NAME);
            match fs::read_to_string(&path) {
                Ok(text) => (path, text),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Ok(Self::default());
                }
                Err(e) => return Err(e).into_app_err_with(|| format!("reading tilestore configuration file '{path}'")),
            }
        };

        let config: Self = toml::from_str(&text).into_app_err_with(|| format!("parsing configuration file '{final_path}'"))?;
        config.validate()?;

        Ok(config)
    }

    /// Save the default configuration to a TOML file
    pub fn save_default(output_path: &Utf8Path) -> Result<()> {
        fs::write(output_path, DEFAULT_CONFIG_TOML).into_app_err_with(|| format!("writing default configuration to {output_path}"))?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.retry_interval.is_zero() {
            return Err(app_err!("retry_interval must be greater than zero"));
        }

        if self.default_cache_buckets == 0 {
            return Err(app_err!("default_cache_buckets must be at least 1"));
        }

        Ok(())
    }

    /// The locking settings for tables.
    #[must_use]
    pub const fn table_lock(&self) -> TableLock {
        TableLock::with_interval(self.lock_option, self.inspection_interval, self.max_wait)
    }

    /// Everything needed to create or open a table.
    #[must_use]
    pub const fn table_options(&self) -> TableOptions {
        TableOptions {
            lock: self.table_lock(),
            retry: RetryPolicy::new(self.retry_interval),
            cache: CacheConfig {
                max_cache_size: self.max_cache_size,
                default_cache_buckets: self.default_cache_buckets,
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG_TOML).expect("default_config.toml should be valid TOML that deserializes to Config")
    }
}
