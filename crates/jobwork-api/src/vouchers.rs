//! Handlers for `/vouchers` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/vouchers` | Optional `status`, `created_by`, `party`, `limit`, `offset` |
//! | `POST` | `/vouchers` | Body: [`NewVoucher`]; returns 201 + voucher |
//! | `GET`  | `/vouchers/{id}` | 404 if not found; sets `ETag` |
//! | `GET`  | `/vouchers/by-no/{*voucher_no}` | Lookup by voucher number |
//! | `POST` | `/vouchers/{id}/events` | Body: [`NewEvent`]; honours `If-Match` |
//! | `GET`  | `/vouchers/{id}/totals` | Counters re-derived from the log |
//! | `GET`  | `/vouchers/{id}/statement/{vendor_id}` | [`VendorStatement`] |
//! | `POST` | `/vouchers/{id}/repair` | [`RepairOutcome`] |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::{HeaderMap, StatusCode, header},
  response::IntoResponse,
};
use jobwork_core::{
  event::NewEvent,
  resolve_status,
  statement::{VendorStatement, vendor_statement},
  store::{RepairOutcome, VoucherQuery, VoucherStore},
  totals::{Tally, Totals},
  voucher::{NewVoucher, Voucher, VoucherStatus},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  error::ApiError,
  etag::{compute_etag, if_match_admits},
};

async fn fetch<S: VoucherStore>(store: &S, id: Uuid) -> Result<Voucher, ApiError> {
  store
    .get_voucher(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("voucher {id} not found")))
}

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
  pub status:     Option<VoucherStatus>,
  pub created_by: Option<String>,
  /// Any party that appears on the voucher: sender, receiver or actor.
  pub party:      Option<String>,
  pub limit:      Option<usize>,
  pub offset:     Option<usize>,
}

/// `GET /vouchers[?status=...][&created_by=...][&party=...][&limit=...][&offset=...]`
pub async fn list<S: VoucherStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Voucher>>, ApiError> {
  let query = VoucherQuery {
    status:     params.status,
    created_by: params.created_by,
    party:      params.party,
    limit:      params.limit,
    offset:     params.offset,
  };
  let vouchers = store.list_vouchers(&query).await.map_err(ApiError::from_store)?;
  Ok(Json(vouchers))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /vouchers`: creates the voucher with its initial dispatch.
pub async fn create<S: VoucherStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<NewVoucher>,
) -> Result<impl IntoResponse, ApiError> {
  if body.created_by_user_id.trim().is_empty() {
    return Err(ApiError::BadRequest("created_by_user_id is required".into()));
  }
  let voucher = store.create_voucher(body).await.map_err(ApiError::from_store)?;
  let etag    = compute_etag(voucher.voucher_id, 0);
  Ok((StatusCode::CREATED, [(header::ETAG, etag)], Json(voucher)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /vouchers/{id}`
pub async fn get_one<S: VoucherStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
  // Revision first: a write landing in between leaves the ETag stale, never
  // ahead of the body.
  let revision = store
    .revision(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("voucher {id} not found")))?;
  let voucher = fetch(store.as_ref(), id).await?;
  Ok(([(header::ETAG, compute_etag(id, revision))], Json(voucher)))
}

/// `GET /vouchers/by-no/{*voucher_no}`
pub async fn get_by_no<S: VoucherStore>(
  State(store): State<Arc<S>>,
  Path(voucher_no): Path<String>,
) -> Result<Json<Voucher>, ApiError> {
  let voucher = store
    .get_voucher_by_no(&voucher_no)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("voucher {voucher_no} not found")))?;
  Ok(Json(voucher))
}

// ─── Append ───────────────────────────────────────────────────────────────────

/// `POST /vouchers/{id}/events`: returns the updated voucher and its new
/// `ETag`.
///
/// With `If-Match`, the append only happens if the voucher is still at the
/// revision the caller saw; otherwise 412.
pub async fn append<S: VoucherStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  headers: HeaderMap,
  Json(body): Json<NewEvent>,
) -> Result<impl IntoResponse, ApiError> {
  if body.user_id.trim().is_empty() {
    return Err(ApiError::BadRequest("user_id is required".into()));
  }

  let expected_revision = match headers.get(header::IF_MATCH) {
    None => None,
    Some(value) => {
      let value = value
        .to_str()
        .map_err(|_| ApiError::BadRequest("If-Match is not valid ASCII".into()))?;
      let current = store
        .revision(id)
        .await
        .map_err(ApiError::from_store)?
        .ok_or_else(|| ApiError::NotFound(format!("voucher {id} not found")))?;
      if !if_match_admits(value, &compute_etag(id, current)) {
        return Err(ApiError::PreconditionFailed(format!(
          "voucher {id} has changed since it was read"
        )));
      }
      Some(current)
    }
  };

  let voucher = store
    .append_event(id, body, expected_revision)
    .await
    .map_err(ApiError::from_store)?;
  let revision = store
    .revision(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("voucher {id} not found")))?;
  Ok(([(header::ETAG, compute_etag(id, revision))], Json(voucher)))
}

// ─── Totals ───────────────────────────────────────────────────────────────────

/// Counters folded fresh from the event log, with the derived quantities the
/// status rules use.
#[derive(Debug, Serialize, Deserialize)]
pub struct TotalsView {
  #[serde(flatten)]
  pub totals:          Totals,
  pub in_transit:      u64,
  pub expected_return: u64,
  /// Status implied by the latest event; `None` for an empty log.
  pub voucher_status:  Option<VoucherStatus>,
}

/// `GET /vouchers/{id}/totals`
pub async fn totals<S: VoucherStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<TotalsView>, ApiError> {
  let voucher = fetch(store.as_ref(), id).await?;

  let mut tally = Tally::default();
  tally.extend(&voucher.events);

  let voucher_status = voucher
    .latest_event()
    .map(|latest| resolve_status(&voucher, latest.event_type, None))
    .transpose()
    .map_err(|e| ApiError::Rejected(e.to_string()))?;

  Ok(Json(TotalsView {
    totals: tally.totals(),
    in_transit: tally.in_transit(),
    expected_return: tally.expected_return(),
    voucher_status,
  }))
}

// ─── Statement ────────────────────────────────────────────────────────────────

/// `GET /vouchers/{id}/statement/{vendor_id}`
pub async fn statement<S: VoucherStore>(
  State(store): State<Arc<S>>,
  Path((id, vendor_id)): Path<(Uuid, String)>,
) -> Result<Json<VendorStatement>, ApiError> {
  let voucher = fetch(store.as_ref(), id).await?;
  Ok(Json(vendor_statement(&voucher, &vendor_id)))
}

// ─── Repair ───────────────────────────────────────────────────────────────────

/// `POST /vouchers/{id}/repair`
pub async fn repair<S: VoucherStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<RepairOutcome>, ApiError> {
  let outcome = store.repair_status(id).await.map_err(ApiError::from_store)?;
  Ok(Json(outcome))
}
