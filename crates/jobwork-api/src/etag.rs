//! ETags for voucher resources.
//!
//! An ETag is a SHA-256 over the voucher id and its store revision, so it
//! changes on every write and never collides across vouchers.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Compute the quoted ETag for `voucher_id` at `revision`.
pub fn compute_etag(voucher_id: Uuid, revision: u64) -> String {
  let mut hasher = Sha256::new();
  hasher.update(voucher_id.as_bytes());
  hasher.update(revision.to_le_bytes());
  format!("\"{}\"", hex::encode(hasher.finalize()))
}

/// Whether an `If-Match` header value admits `etag`.
///
/// Accepts `*`, a comma-separated list, weak validators and unquoted values
/// sent by lenient clients.
pub fn if_match_admits(header: &str, etag: &str) -> bool {
  let bare = etag.trim_matches('"');
  header.split(',').map(str::trim).any(|candidate| {
    candidate == "*"
      || candidate.trim_start_matches("W/").trim_matches('"') == bare
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn etag_changes_with_revision() {
    let id = Uuid::new_v4();
    let a  = compute_etag(id, 0);
    assert_eq!(a, compute_etag(id, 0));
    assert_ne!(a, compute_etag(id, 1));
    assert_ne!(a, compute_etag(Uuid::new_v4(), 0));
    assert!(a.starts_with('"') && a.ends_with('"'));
    assert_eq!(a.len(), 66);
  }

  #[test]
  fn if_match_forms() {
    let etag = compute_etag(Uuid::nil(), 3);
    let bare = etag.trim_matches('"').to_owned();

    assert!(if_match_admits(&etag, &etag));
    assert!(if_match_admits(&bare, &etag));
    assert!(if_match_admits(&format!("W/{etag}"), &etag));
    assert!(if_match_admits(&format!("\"other\", {etag}"), &etag));
    assert!(if_match_admits("*", &etag));
    assert!(!if_match_admits("\"stale\"", &etag));
  }
}
