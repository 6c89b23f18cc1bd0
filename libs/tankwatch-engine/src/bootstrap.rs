use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use tankwatch_api::StoreConnector;

use crate::clock::SystemClock;
use crate::config::IngestConfig;
use crate::dispatch::Dispatcher;
use crate::rate_limit::RateLimiter;
use crate::session::{Session, SessionHandler, SessionState};
use crate::writer::ScopedWriter;

/// The running engine: one subscription session feeding the dispatcher.
pub struct Engine {
    handle: tokio::task::JoinHandle<()>,
    shutdown: CancellationToken,
    state: watch::Receiver<SessionState>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl Engine {
    /// Wire writer → dispatcher → session and spawn the session task.
    ///
    /// Must be called inside a tokio runtime. Does not wait for the broker:
    /// connection failures are reported by the session and retried there.
    pub fn bootstrap(config: IngestConfig, connector: Arc<dyn StoreConnector>) -> Self {
        let writer = ScopedWriter::new(
            connector,
            config.database.connect_timeout,
            config.database.insert_timeout,
        );
        let dispatcher = Dispatcher::new(
            RateLimiter::new(config.ingest.update_frequency),
            Arc::new(writer),
            Arc::new(SystemClock),
        );
        let db = &config.database;
        tracing::info!(
            update_frequency = ?config.ingest.update_frequency,
            database = %format!("{}:{}/{}", db.host, db.port, db.database),
            table = %db.table,
            "dispatcher ready"
        );

        Self::spawn(Session::new(&config.broker), Arc::new(dispatcher))
    }

    /// Spawn an already built session with any handler.
    pub fn spawn(session: Session, handler: Arc<dyn SessionHandler>) -> Self {
        let shutdown = CancellationToken::new();
        let state = session.state();
        let handle = tokio::spawn(session.run(handler, shutdown.clone()));
        Self {
            handle,
            shutdown,
            state,
        }
    }

    /// Watch the session state (Disconnected / Connecting / Connected).
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Graceful shutdown: stop the session and wait for it.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "session task failed");
        }
        tracing::info!("engine shut down");
    }
}
