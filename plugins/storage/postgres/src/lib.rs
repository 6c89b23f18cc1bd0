use std::fmt;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_postgres::{Client, Config, NoTls};

use tankwatch_api::{BoxFuture, PersistError, Reading, StoreConnection, StoreConnector};

/// How long `close` waits for the driver task to wind down before aborting it.
const DRIVER_GRACE: Duration = Duration::from_secs(1);

/// Connection settings for one PostgreSQL database.
#[derive(Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Target table; must already be a validated identifier.
    pub table: String,
    pub connect_timeout: Duration,
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("database", &self.database)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

/// Opens a fresh, unpooled connection per write.
pub struct PostgresConnector {
    config: Config,
    insert_sql: String,
}

impl PostgresConnector {
    pub fn new(cfg: &PostgresConfig) -> Self {
        let mut config = Config::new();
        config
            .host(&cfg.host)
            .port(cfg.port)
            .user(&cfg.user)
            .password(&cfg.password)
            .dbname(&cfg.database)
            .connect_timeout(cfg.connect_timeout)
            .application_name("tankwatch");

        Self {
            config,
            insert_sql: insert_statement(&cfg.table),
        }
    }
}

/// Values are always bound as parameters; only the table name is spliced in.
fn insert_statement(table: &str) -> String {
    format!("INSERT INTO {table} (time, tank, sensor, value) VALUES ($1, $2, $3, $4)")
}

impl StoreConnector for PostgresConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn StoreConnection>, PersistError>> {
        Box::pin(async move {
            let (client, connection) =
                self.config.connect(NoTls).await.map_err(PersistError::connect)?;

            let driver = tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::warn!(error = %e, "postgres connection error");
                }
            });

            Ok(Box::new(PostgresConnection {
                client,
                driver,
                insert_sql: self.insert_sql.clone(),
            }) as Box<dyn StoreConnection>)
        })
    }
}

struct PostgresConnection {
    client: Client,
    driver: JoinHandle<()>,
    insert_sql: String,
}

impl StoreConnection for PostgresConnection {
    fn begin(&mut self) -> BoxFuture<'_, Result<(), PersistError>> {
        Box::pin(async move {
            self.client.batch_execute("BEGIN").await.map_err(PersistError::begin)
        })
    }

    fn insert<'a>(&'a mut self, reading: &'a Reading) -> BoxFuture<'a, Result<(), PersistError>> {
        Box::pin(async move {
            // The column is `timestamp` without time zone; store UTC wall time.
            let time = reading.time.naive_utc();
            self.client
                .execute(
                    self.insert_sql.as_str(),
                    &[&time, &reading.tank, &reading.sensor, &reading.value],
                )
                .await
                .map(|_| ())
                .map_err(PersistError::insert)
        })
    }

    fn commit(&mut self) -> BoxFuture<'_, Result<(), PersistError>> {
        Box::pin(async move {
            self.client.batch_execute("COMMIT").await.map_err(PersistError::commit)
        })
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let PostgresConnection { client, mut driver, .. } = *self;
            // Dropping the client ends the driver task; an open transaction is rolled back.
            drop(client);
            // A driver with a request still in flight waits for its response
            // before exiting, which never comes from a stalled server.
            match tokio::time::timeout(DRIVER_GRACE, &mut driver).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "postgres driver task failed"),
                Err(_) => {
                    driver.abort();
                    tracing::warn!(after = ?DRIVER_GRACE, "postgres driver did not stop, aborted");
                }
            }
        })
    }
}
