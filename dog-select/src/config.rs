use std::path::PathBuf;
use std::time::Duration;

use crate::{SelectError, SelectResult};

/// Default environment prefix for [`SelectConfig::from_env`]
pub const ENV_PREFIX: &str = "DOG_SELECT__";

/// Configuration for select transfers
#[derive(Debug, Clone)]
pub struct SelectConfig {
    /// Largest declared source size accepted by the precheck
    pub source_size_limit: u64,

    /// Largest number of bytes the scratch file may hold
    pub local_size_limit: u64,

    /// Attempts per task, including the first
    pub max_try_time: u32,

    /// Pause between a failed attempt and the next one
    pub retry_delay: Duration,

    /// Naming template for the destination key.
    /// Placeholders: `{key}`, `{dirname}`, `{basename}`, `{extname}`
    pub target_key_template: String,

    /// Directory scratch files are created in when no explicit path is given
    pub scratch_dir: PathBuf,
}

impl Default for SelectConfig {
    fn default() -> Self {
        Self {
            source_size_limit: 5 * 1024 * 1024 * 1024, // 5GB
            local_size_limit: 512 * 1024 * 1024, // 512MB
            max_try_time: 3,
            retry_delay: Duration::from_millis(500),
            target_key_template: "{dirname}{basename}.{extname}".to_string(),
            scratch_dir: std::env::temp_dir(),
        }
    }
}

impl SelectConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_size_limit(mut self, bytes: u64) -> Self {
        self.source_size_limit = bytes;
        self
    }

    pub fn with_local_size_limit(mut self, bytes: u64) -> Self {
        self.local_size_limit = bytes;
        self
    }

    pub fn with_max_try_time(mut self, attempts: u32) -> Self {
        self.max_try_time = attempts;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_target_key_template<S: Into<String>>(mut self, template: S) -> Self {
        self.target_key_template = template.into();
        self
    }

    pub fn with_scratch_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Load overrides from the process environment.
    ///
    /// `DOG_SELECT__MAX_TRY_TIME=5` sets `max_try_time`.
    pub fn from_env(prefix: &str) -> SelectResult<Self> {
        Self::from_vars(prefix, std::env::vars())
    }

    /// Apply `PREFIX__KEY=value` overrides on top of the defaults.
    /// Unrelated variables are ignored.
    pub fn from_vars<I, K, V>(prefix: &str, vars: I) -> SelectResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(prefix) else {
                continue;
            };
            let value = value.as_ref().trim();

            match name.to_ascii_lowercase().as_str() {
                "source_size_limit" => config.source_size_limit = parse_number(name, value)?,
                "local_size_limit" => config.local_size_limit = parse_number(name, value)?,
                "max_try_time" => config.max_try_time = parse_number(name, value)?,
                "retry_delay_ms" => {
                    config.retry_delay = Duration::from_millis(parse_number(name, value)?)
                }
                "target_key_template" => config.target_key_template = value.to_string(),
                "scratch_dir" => config.scratch_dir = PathBuf::from(value),
                _ => {}
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no task could run with
    pub fn validate(&self) -> SelectResult<()> {
        if self.max_try_time == 0 {
            return Err(SelectError::invalid("max_try_time must be at least 1"));
        }
        if self.target_key_template.trim().is_empty() {
            return Err(SelectError::invalid("target_key_template must not be empty"));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> SelectResult<T> {
    value
        .parse()
        .map_err(|_| SelectError::invalid(format!("{} must be a number, got {:?}", name, value)))
}
