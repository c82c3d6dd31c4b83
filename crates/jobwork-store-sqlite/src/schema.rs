//! SQL schema for the voucher SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per voucher document. `events` is the append-only log as a JSON
-- array; the total_* columns are a cache of folding it.
CREATE TABLE IF NOT EXISTS vouchers (
    voucher_id               TEXT PRIMARY KEY,
    voucher_no               TEXT NOT NULL UNIQUE,
    voucher_status           TEXT NOT NULL,
    created_at               TEXT NOT NULL,   -- RFC 3339 UTC
    created_by_user_id       TEXT NOT NULL,
    item_details             TEXT NOT NULL,   -- JSON
    events                   TEXT NOT NULL DEFAULT '[]',
    total_dispatched         INTEGER NOT NULL DEFAULT 0,
    total_received           INTEGER NOT NULL DEFAULT 0,
    total_forwarded          INTEGER NOT NULL DEFAULT 0,
    total_missing_on_arrival INTEGER NOT NULL DEFAULT 0,
    total_damaged_on_arrival INTEGER NOT NULL DEFAULT 0,
    total_damaged_after_work INTEGER NOT NULL DEFAULT 0,
    admin_received_quantity  INTEGER NOT NULL DEFAULT 0,
    updated_at               TEXT NOT NULL,
    -- Bumped on every write; writers compare-and-swap on it.
    revision                 INTEGER NOT NULL DEFAULT 0
);

-- Last issued sequence number per voucher prefix and financial year.
CREATE TABLE IF NOT EXISTS voucher_sequences (
    prefix         TEXT NOT NULL,
    financial_year TEXT NOT NULL,   -- e.g. '2024-25'
    last_seq       INTEGER NOT NULL,
    PRIMARY KEY (prefix, financial_year)
);

-- Every party named on a voucher, for party filters. Only ever grows.
CREATE TABLE IF NOT EXISTS voucher_parties (
    voucher_id TEXT NOT NULL REFERENCES vouchers(voucher_id),
    party_id   TEXT NOT NULL,
    PRIMARY KEY (voucher_id, party_id)
);

CREATE INDEX IF NOT EXISTS vouchers_status_idx     ON vouchers(voucher_status);
CREATE INDEX IF NOT EXISTS vouchers_created_by_idx ON vouchers(created_by_user_id);
CREATE INDEX IF NOT EXISTS vouchers_created_at_idx ON vouchers(created_at);
CREATE INDEX IF NOT EXISTS voucher_parties_idx     ON voucher_parties(party_id);

PRAGMA user_version = 1;
";

/// Increment and return the next sequence number for `(?1 prefix, ?2 year)`.
pub const NEXT_SEQ: &str = "
INSERT INTO voucher_sequences (prefix, financial_year, last_seq)
VALUES (?1, ?2, 1)
ON CONFLICT (prefix, financial_year) DO UPDATE SET last_seq = last_seq + 1
RETURNING last_seq";

/// Raise the sequence for `(?1 prefix, ?2 year)` to at least `?3`.
pub const RAISE_SEQ: &str = "
INSERT INTO voucher_sequences (prefix, financial_year, last_seq)
VALUES (?1, ?2, ?3)
ON CONFLICT (prefix, financial_year)
DO UPDATE SET last_seq = MAX(last_seq, excluded.last_seq)";
