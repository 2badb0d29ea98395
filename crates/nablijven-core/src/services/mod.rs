//! Application services built on the store, the remote API and the sync engine

mod records;

pub use records::{Listing, RecordService, Source, WriteReceipt};
