use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::EngineError;

/// Everything the engine needs, assembled once at startup and passed down
/// explicitly. Core code never reads the process environment.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub database: DatabaseConfig,
    pub broker: BrokerConfig,
    pub ingest: IngestSettings,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub user: String,
    pub password: String,
    pub database: String,
    pub host: String,
    pub port: u16,
    /// Target table, validated as a plain SQL identifier.
    pub table: String,
    pub connect_timeout: Duration,
    /// Upper bound for BEGIN + INSERT + COMMIT of one reading.
    pub insert_timeout: Duration,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("table", &self.table)
            .field("connect_timeout", &self.connect_timeout)
            .field("insert_timeout", &self.insert_timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub topic_filter: String,
    pub keep_alive: Duration,
    /// Fixed client id; `None` derives one from the process id.
    pub client_id: Option<String>,
    /// Pause between a transport error and the next reconnect attempt.
    pub reconnect_delay: Duration,
}

impl BrokerConfig {
    /// `host:port`, used in log lines and errors.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Minimum spacing between two stored readings of the same topic.
    pub update_frequency: Duration,
}

// ---------------------------------------------------------------------------
// Tunables: optional TOML file, every key has a default
// ---------------------------------------------------------------------------

/// Non-secret settings, parsed from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tunables {
    #[serde(default)]
    pub ingest: IngestTunables,
    #[serde(default)]
    pub broker: BrokerTunables,
    #[serde(default)]
    pub database: DatabaseTunables,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestTunables {
    #[serde(default = "default_update_frequency_secs")]
    pub update_frequency_secs: u64,
}

impl Default for IngestTunables {
    fn default() -> Self {
        Self {
            update_frequency_secs: default_update_frequency_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerTunables {
    #[serde(default = "default_topic_filter")]
    pub topic_filter: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

impl Default for BrokerTunables {
    fn default() -> Self {
        Self {
            topic_filter: default_topic_filter(),
            keep_alive_secs: default_keep_alive_secs(),
            client_id: None,
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseTunables {
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_insert_timeout_secs")]
    pub insert_timeout_secs: u64,
}

impl Default for DatabaseTunables {
    fn default() -> Self {
        Self {
            table: default_table(),
            connect_timeout_secs: default_connect_timeout_secs(),
            insert_timeout_secs: default_insert_timeout_secs(),
        }
    }
}

fn default_update_frequency_secs() -> u64 {
    300
}
fn default_topic_filter() -> String {
    "aquariums/#".into()
}
fn default_keep_alive_secs() -> u64 {
    60
}
fn default_reconnect_delay_ms() -> u64 {
    1000
}
fn default_table() -> String {
    "aquariums".into()
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_insert_timeout_secs() -> u64 {
    10
}

impl Tunables {
    /// Load tunables from a TOML file.
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::Config(format!("{path}: {e}")))?;
        Self::parse(&content).map_err(|e| e.with_context(path))
    }

    /// Parse tunables from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, EngineError> {
        toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_MQTT_PORT: u16 = 1883;

/// Required variables, in the order they are reported when missing.
const REQUIRED: [&str; 5] = ["db_user", "db_password", "database", "db_host", "mqtt_host"];

impl IngestConfig {
    /// Assemble from the process environment plus tunables.
    pub fn from_env(tunables: Tunables) -> Result<Self, EngineError> {
        Self::assemble(|key| std::env::var(key).ok(), tunables)
    }

    /// Assemble from any key lookup. Empty values count as missing.
    pub fn assemble<F>(lookup: F, tunables: Tunables) -> Result<Self, EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<&'static str> = REQUIRED
            .iter()
            .copied()
            .filter(|key| get(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::MissingSettings(missing));
        }

        let required = |key: &'static str| get(key).ok_or(EngineError::MissingSettings(vec![key]));
        let port = |key: &str, default: u16| match get(key) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| EngineError::Config(format!("{key}: '{raw}': {e}"))),
        };

        let database = DatabaseConfig {
            user: required("db_user")?,
            password: required("db_password")?,
            database: required("database")?,
            host: required("db_host")?,
            port: port("db_port", DEFAULT_DB_PORT)?,
            table: tunables.database.table,
            connect_timeout: Duration::from_secs(tunables.database.connect_timeout_secs),
            insert_timeout: Duration::from_secs(tunables.database.insert_timeout_secs),
        };
        let broker = BrokerConfig {
            host: required("mqtt_host")?,
            port: port("mqtt_port", DEFAULT_MQTT_PORT)?,
            topic_filter: tunables.broker.topic_filter,
            keep_alive: Duration::from_secs(tunables.broker.keep_alive_secs),
            client_id: tunables.broker.client_id.filter(|id| !id.is_empty()),
            reconnect_delay: Duration::from_millis(tunables.broker.reconnect_delay_ms),
        };
        let ingest = IngestSettings {
            update_frequency: Duration::from_secs(tunables.ingest.update_frequency_secs),
        };

        let config = Self { database, broker, ingest };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), EngineError> {
        validate_identifier(&self.database.table).map_err(|e| e.with_context("database.table"))?;
        if self.database.insert_timeout.is_zero() {
            return Err(EngineError::Config("database.insert_timeout_secs must be > 0".into()));
        }
        if self.database.connect_timeout.is_zero() {
            return Err(EngineError::Config("database.connect_timeout_secs must be > 0".into()));
        }
        if self.broker.keep_alive < Duration::from_secs(5) {
            return Err(EngineError::Config("broker.keep_alive_secs must be >= 5".into()));
        }
        if self.broker.topic_filter.is_empty() {
            return Err(EngineError::Config("broker.topic_filter must not be empty".into()));
        }
        Ok(())
    }
}

/// Accept `name` or `schema.name`, each part `[A-Za-z_][A-Za-z0-9_]*`.
fn validate_identifier(ident: &str) -> Result<(), EngineError> {
    let parts: Vec<&str> = ident.split('.').collect();
    let valid_part = |part: &str| {
        let mut chars = part.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    if parts.len() > 2 || !parts.iter().all(|p| valid_part(p)) {
        return Err(EngineError::Config(format!("'{ident}' is not a plain SQL identifier")));
    }
    Ok(())
}
