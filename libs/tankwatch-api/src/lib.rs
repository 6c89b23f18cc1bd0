pub mod error;
pub mod reading;
pub mod store;

pub use error::{BoxError, PersistError};
pub use reading::Reading;
pub use store::{BoxFuture, ReadingWriter, StoreConnection, StoreConnector};
