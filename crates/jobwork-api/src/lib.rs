//! JSON REST API for job-work vouchers.
//!
//! Exposes an axum [`Router`] backed by any
//! [`jobwork_core::store::VoucherStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", jobwork_api::api_router(store.clone()))
//! ```

pub mod admin;
pub mod error;
pub mod etag;
pub mod vouchers;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use jobwork_core::store::VoucherStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: VoucherStore + 'static,
{
  Router::new()
    // Vouchers
    .route("/vouchers", get(vouchers::list::<S>).post(vouchers::create::<S>))
    .route("/vouchers/by-no/{*voucher_no}", get(vouchers::get_by_no::<S>))
    .route("/vouchers/{id}", get(vouchers::get_one::<S>))
    .route("/vouchers/{id}/events", post(vouchers::append::<S>))
    .route("/vouchers/{id}/totals", get(vouchers::totals::<S>))
    .route("/vouchers/{id}/statement/{vendor_id}", get(vouchers::statement::<S>))
    .route("/vouchers/{id}/repair", post(vouchers::repair::<S>))
    // Admin
    .route("/admin/rerun-status", post(admin::rerun_status::<S>))
    .route("/admin/backup", get(admin::export::<S>).post(admin::import::<S>))
    .with_state(store)
}
