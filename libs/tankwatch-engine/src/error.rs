use rumqttc::{ClientError, ConnectReturnCode, ConnectionError};

/// Environment variables the server reads, in the order they are reported.
pub const ENV_HELP: &str =
    "db_user, db_password, database, db_host, db_port (optional), mqtt_host, mqtt_port (optional)";

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error(
        "missing required settings: {}. Make sure all of the variables are set: {}",
        .0.join(", "),
        ENV_HELP
    )]
    MissingSettings(Vec<&'static str>),
}

impl EngineError {
    /// Add context to the error.
    ///
    /// `Config` gets the context prepended to its message, other variants
    /// are returned unchanged.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            EngineError::Config(msg) => EngineError::Config(format!("{ctx}: {msg}")),
            other => other,
        }
    }
}

/// Per-message failure that drops the message before it reaches the store.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("malformed topic '{topic}': expected <namespace>/<tank>/<sensor>")]
    MalformedTopic { topic: String },

    #[error("payload on '{topic}' is not valid UTF-8: {source}")]
    PayloadDecode {
        topic: String,
        #[source]
        source: std::str::Utf8Error,
    },
}

/// Broker-side failure. Reported, never fatal: the session keeps polling and
/// the transport reconnects.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("connection refused for MQTT server {broker}: {source}")]
    Refused {
        broker: String,
        #[source]
        source: std::io::Error,
    },

    #[error("MQTT server {broker} rejected the connection: {code:?}")]
    Rejected {
        broker: String,
        code: ConnectReturnCode,
    },

    #[error("MQTT connection to {broker} failed: {source}")]
    Connection {
        broker: String,
        #[source]
        source: ConnectionError,
    },

    #[error("subscribe to '{filter}' failed: {source}")]
    Subscribe {
        filter: String,
        #[source]
        source: ClientError,
    },
}

impl SessionError {
    /// Sort a transport error into the refused / rejected / other buckets.
    pub fn classify(broker: &str, error: ConnectionError) -> Self {
        match error {
            ConnectionError::Io(source)
                if source.kind() == std::io::ErrorKind::ConnectionRefused =>
            {
                SessionError::Refused { broker: broker.to_string(), source }
            }
            ConnectionError::ConnectionRefused(code) => SessionError::Rejected {
                broker: broker.to_string(),
                code,
            },
            source => SessionError::Connection { broker: broker.to_string(), source },
        }
    }
}
