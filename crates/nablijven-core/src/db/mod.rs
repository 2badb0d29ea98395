//! Local durable store: mirrors of remote records and the pending-operations log

mod connection;
mod memory_store;
mod migrations;
pub mod mirror;
mod sqlite_store;
mod store;

pub use connection::Database;
pub use memory_store::MemoryStore;
pub use mirror::MirrorRecord;
pub use sqlite_store::SqliteStore;
pub use store::{LocalStore, MirrorCollection};
