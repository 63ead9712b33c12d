// Stream database (rusqlite)

pub mod schema;
pub mod stream_database;

pub use stream_database::SqliteStreamStore;
