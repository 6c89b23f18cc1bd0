use std::sync::Arc;
use std::time::Duration;

use tankwatch_api::error::Stage;
use tankwatch_api::{
    BoxFuture, PersistError, Reading, ReadingWriter, StoreConnection, StoreConnector,
};

/// Upper bound for releasing a connection once its statements are done or
/// have timed out. A close that overruns is abandoned.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Writes one reading per connection: connect → BEGIN → INSERT → COMMIT → close.
///
/// The connection is closed exactly once on every path that opened one,
/// including failed and timed-out statements, and the close itself is
/// bounded by [`CLOSE_TIMEOUT`]. Nothing is retried.
pub struct ScopedWriter {
    connector: Arc<dyn StoreConnector>,
    connect_timeout: Duration,
    insert_timeout: Duration,
}

impl ScopedWriter {
    pub fn new(
        connector: Arc<dyn StoreConnector>,
        connect_timeout: Duration,
        insert_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            connect_timeout,
            insert_timeout,
        }
    }

    async fn write_scoped(&self, reading: &Reading) -> Result<(), PersistError> {
        let mut conn = tokio::time::timeout(self.connect_timeout, self.connector.connect())
            .await
            .map_err(|_| PersistError::timeout(Stage::Connect, self.connect_timeout))??;

        let statement = insert_and_commit(conn.as_mut(), reading);
        let outcome = tokio::time::timeout(self.insert_timeout, statement).await;

        if tokio::time::timeout(CLOSE_TIMEOUT, conn.close()).await.is_err() {
            tracing::warn!(after = ?CLOSE_TIMEOUT, "connection close timed out, abandoned");
        }

        match outcome {
            Ok(result) => result,
            Err(_) => Err(PersistError::timeout(Stage::Insert, self.insert_timeout)),
        }
    }
}

async fn insert_and_commit(
    conn: &mut dyn StoreConnection,
    reading: &Reading,
) -> Result<(), PersistError> {
    conn.begin().await?;
    conn.insert(reading).await?;
    conn.commit().await
}

impl ReadingWriter for ScopedWriter {
    fn write<'a>(&'a self, reading: &'a Reading) -> BoxFuture<'a, Result<(), PersistError>> {
        Box::pin(self.write_scoped(reading))
    }
}
