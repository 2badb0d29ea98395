//! nablijven-core - Offline-first sync for the Nablijven detention register
//!
//! This crate contains the record models, the local durable store, the remote
//! API client and the sync engine with its connectivity observer and status
//! reporter. The `nablijven` CLI is a thin layer over it.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod sync;
pub mod util;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
pub use models::{Detention, PendingOperation, Student};
