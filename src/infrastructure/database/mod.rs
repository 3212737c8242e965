pub mod connection;
pub mod record_store;

pub use connection::DatabaseConnection;
pub use record_store::SqliteRecordStore;
