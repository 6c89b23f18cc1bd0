use std::future::Future;
use std::pin::Pin;

use crate::error::PersistError;
use crate::reading::Reading;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Opens connections to the relational store.
///
/// The engine never pools connections: every admitted reading gets a fresh
/// connection from here, which the writer releases with
/// [`StoreConnection::close`] once the insert is done.
pub trait StoreConnector: Send + Sync {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn StoreConnection>, PersistError>>;
}

/// A single open connection, owned by one write attempt.
///
/// `close` consumes the connection, so it can be released only once.
pub trait StoreConnection: Send {
    /// Open an explicit transaction.
    fn begin(&mut self) -> BoxFuture<'_, Result<(), PersistError>>;

    /// Insert one reading with bound parameters.
    fn insert<'a>(&'a mut self, reading: &'a Reading) -> BoxFuture<'a, Result<(), PersistError>>;

    /// Commit the open transaction.
    fn commit(&mut self) -> BoxFuture<'_, Result<(), PersistError>>;

    /// Release the connection and every handle attached to it.
    /// An uncommitted transaction is rolled back by the store.
    fn close(self: Box<Self>) -> BoxFuture<'static, ()>;
}

/// Persists readings. The dispatcher only knows this trait.
pub trait ReadingWriter: Send + Sync {
    fn write<'a>(&'a self, reading: &'a Reading) -> BoxFuture<'a, Result<(), PersistError>>;
}
