//! Core types and pure logic for job-work voucher tracking.
//!
//! This crate has no HTTP or database dependencies and never logs.
//! Everything that decides a voucher's status or quantities lives here as
//! plain functions over values; storage backends and the API call in.

pub mod error;
pub mod event;
pub mod ledger;
pub mod quantity;
pub mod statement;
pub mod status;
pub mod store;
pub mod totals;
pub mod update;
pub mod voucher;
pub mod voucher_no;

pub use error::{Error, Result};
pub use status::resolve_status;
pub use totals::{Totals, compute_totals};
pub use update::{UpdateOutcome, VoucherUpdate, build_voucher_update};
