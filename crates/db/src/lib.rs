pub mod connection;
pub mod migrations;
pub mod stores;

pub use connection::{connect_with_settings, DbPool};
pub use stores::{open_store, CsvRecordStore, SheetError, SqlRecordStore};
