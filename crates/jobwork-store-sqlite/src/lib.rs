//! SQLite backend for the job-work voucher store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Each voucher is one row holding its
//! event log as JSON next to denormalised counters for querying.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
