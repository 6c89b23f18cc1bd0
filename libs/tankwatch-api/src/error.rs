use std::fmt;
use std::time::Duration;

/// Underlying cause carried by a [`PersistError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Which step of a write attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Begin,
    Insert,
    Commit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Connect => f.write_str("connect"),
            Stage::Begin => f.write_str("begin"),
            Stage::Insert => f.write_str("insert"),
            Stage::Commit => f.write_str("commit"),
        }
    }
}

/// Error returned by every store operation.
///
/// Never retried by the writer. The dispatcher logs it and moves on to the
/// next message.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("{stage} failed: {source}")]
    Store {
        stage: Stage,
        #[source]
        source: BoxError,
    },

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },
}

impl PersistError {
    pub fn connect(source: impl Into<BoxError>) -> Self {
        Self::Store { stage: Stage::Connect, source: source.into() }
    }

    pub fn begin(source: impl Into<BoxError>) -> Self {
        Self::Store { stage: Stage::Begin, source: source.into() }
    }

    pub fn insert(source: impl Into<BoxError>) -> Self {
        Self::Store { stage: Stage::Insert, source: source.into() }
    }

    pub fn commit(source: impl Into<BoxError>) -> Self {
        Self::Store { stage: Stage::Commit, source: source.into() }
    }

    pub fn timeout(stage: Stage, after: Duration) -> Self {
        Self::Timeout { stage, after }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Self::Store { stage, .. } | Self::Timeout { stage, .. } => *stage,
        }
    }
}
