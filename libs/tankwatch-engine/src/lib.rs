pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod rate_limit;
pub mod session;
pub mod topic;
pub mod writer;

#[cfg(test)]
mod testing;

pub use bootstrap::Engine;
pub use error::{DispatchError, EngineError, SessionError};
