//! Destination and batching configuration
//!
//! Both halves deserialize from JSON with defaults for everything except the
//! destination identity. Durations are expressed in milliseconds on the wire.

use super::error::{HookError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Default capacity of the ingestion queue and of a single batch
pub const DEFAULT_BUFFER_SIZE: usize = 32768;

/// Default period of the timer flush
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Default socket timeout for the HTTP transport
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

fn default_user() -> String {
    "default".to_string()
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            user: default_user(),
            password: String::new(),
        }
    }
}

/// Where and how records are persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    pub database: String,
    pub table: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Persisted fields, in positional order
    pub columns: Vec<String>,
    #[serde(default)]
    pub credentials: Credentials,
    /// Gzip request bodies
    #[serde(default)]
    pub compression: bool,
    #[serde(default = "default_timeout", with = "millis")]
    pub timeout: Duration,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8123
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl ClickHouseConfig {
    pub fn new(
        database: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<String>,
    ) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            host: default_host(),
            port: default_port(),
            columns,
            credentials: Credentials::default(),
            compression: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Credentials {
            user: user.into(),
            password: password.into(),
        };
        self
    }

    #[must_use]
    pub fn with_compression(mut self, enable: bool) -> Self {
        self.compression = enable;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `database.table`
    pub fn table_ref(&self) -> String {
        format!("{}.{}", self.database, self.table)
    }

    /// `host:port`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        const COMPONENT: &str = "ClickHouseConfig";

        if self.database.trim().is_empty() {
            return Err(HookError::config(COMPONENT, "database must not be empty"));
        }
        if self.table.trim().is_empty() {
            return Err(HookError::config(COMPONENT, "table must not be empty"));
        }
        if self.host.trim().is_empty() {
            return Err(HookError::config(COMPONENT, "host must not be empty"));
        }
        if self.columns.is_empty() {
            return Err(HookError::config(COMPONENT, "at least one column is required"));
        }

        let mut seen = HashSet::with_capacity(self.columns.len());
        for column in &self.columns {
            if column.trim().is_empty() {
                return Err(HookError::config(COMPONENT, "column names must not be empty"));
            }
            if !seen.insert(column.as_str()) {
                return Err(HookError::config(
                    COMPONENT,
                    format!("duplicate column '{}'", column),
                ));
            }
        }

        if self.timeout.is_zero() {
            return Err(HookError::config(COMPONENT, "timeout must be positive"));
        }

        // Credentials travel as HTTP header values
        let has_control = |value: &str| value.chars().any(|c| c.is_control() && c != '\t');
        if has_control(&self.credentials.user) || has_control(&self.credentials.password) {
            return Err(HookError::config(
                COMPONENT,
                "credentials must not contain control characters",
            ));
        }

        Ok(())
    }
}

/// Queue, batch and timer settings of the batching engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_buffer_size")]
    pub queue_capacity: usize,
    /// A batch reaching this many records is flushed at once
    #[serde(default = "default_buffer_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_flush_interval", with = "millis")]
    pub flush_interval: Duration,
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_flush_interval() -> Duration {
    DEFAULT_FLUSH_INTERVAL
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_BUFFER_SIZE,
            max_batch_size: DEFAULT_BUFFER_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        const COMPONENT: &str = "BatchConfig";

        if self.queue_capacity == 0 {
            return Err(HookError::config(COMPONENT, "queue_capacity must be positive"));
        }
        if self.max_batch_size == 0 {
            return Err(HookError::config(COMPONENT, "max_batch_size must be positive"));
        }
        if self.flush_interval.is_zero() {
            return Err(HookError::config(COMPONENT, "flush_interval must be positive"));
        }
        Ok(())
    }
}

/// Full hook configuration as loaded from a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookConfig {
    pub clickhouse: ClickHouseConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

impl HookConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: HookConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            HookError::config(
                "HookConfig",
                format!("cannot read '{}': {}", path.display(), e),
            )
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.clickhouse.validate()?;
        self.batch.validate()
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
