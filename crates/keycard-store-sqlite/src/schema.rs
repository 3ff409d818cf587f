//! SQL schema for the Keycard SQLite store.
//!
//! Migrations run once when the store is opened, gated on
//! `PRAGMA user_version`: migration `n` (1-based) is applied only when the
//! stored version is below `n`. Request-handling code never issues DDL.

/// Connection-level settings; applied outside any transaction.
pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
";

/// Ordered migrations. Append only; never edit a released entry.
pub const MIGRATIONS: &[&str] = &[
  // 1: holders, promotion codes, and the append-only audit tables.
  "
CREATE TABLE holders (
    holder_id      TEXT PRIMARY KEY,
    email          TEXT NOT NULL COLLATE NOCASE UNIQUE,
    name           TEXT,
    phone          TEXT,
    discount_pct   INTEGER NOT NULL CHECK (discount_pct BETWEEN 0 AND 100),
    pass_serial    TEXT NOT NULL UNIQUE,
    pass_delivered INTEGER NOT NULL DEFAULT 0,
    created_at     TEXT NOT NULL          -- RFC 3339 UTC, fixed width
);

CREATE TABLE promotion_codes (
    promo_id     TEXT PRIMARY KEY,
    code         TEXT NOT NULL UNIQUE,    -- upper-case
    description  TEXT NOT NULL DEFAULT '',
    discount_pct INTEGER NOT NULL CHECK (discount_pct BETWEEN 1 AND 100),
    max_uses     INTEGER NOT NULL DEFAULT 0 CHECK (max_uses >= 0),  -- 0 = unlimited
    current_uses INTEGER NOT NULL DEFAULT 0,
    active       INTEGER NOT NULL DEFAULT 1,
    expires_at   TEXT,
    created_by   TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    CHECK (current_uses >= 0 AND (max_uses = 0 OR current_uses <= max_uses))
);

-- Append-only. One row per successful redemption.
CREATE TABLE promotion_usage (
    usage_id     TEXT PRIMARY KEY,
    promo_id     TEXT NOT NULL REFERENCES promotion_codes(promo_id),
    code         TEXT NOT NULL,
    discount_pct INTEGER NOT NULL,
    holder_id    TEXT REFERENCES holders(holder_id),
    used_at      TEXT NOT NULL,
    ip_address   TEXT,
    user_agent   TEXT
);

-- Append-only. One row per serial lookup, matched or not.
CREATE TABLE scan_events (
    scan_id    TEXT PRIMARY KEY,
    holder_id  TEXT REFERENCES holders(holder_id),
    serial     TEXT NOT NULL,
    scanned_at TEXT NOT NULL,
    ip_address TEXT,
    user_agent TEXT
);

-- Append-only. One row per discount override.
CREATE TABLE discount_changes (
    change_id    TEXT PRIMARY KEY,
    holder_id    TEXT NOT NULL REFERENCES holders(holder_id),
    serial       TEXT NOT NULL,
    old_discount INTEGER NOT NULL,
    new_discount INTEGER NOT NULL,
    changed_at   TEXT NOT NULL,
    ip_address   TEXT,
    user_agent   TEXT
);

CREATE INDEX promotion_usage_promo_idx  ON promotion_usage(promo_id);
CREATE INDEX promotion_usage_used_idx   ON promotion_usage(used_at);
CREATE INDEX scan_events_serial_idx     ON scan_events(serial);
CREATE INDEX scan_events_scanned_idx    ON scan_events(scanned_at);
CREATE INDEX discount_changes_holder_idx ON discount_changes(holder_id);
",
];

/// The schema version a fully migrated database reports.
pub fn latest_version() -> i64 { MIGRATIONS.len() as i64 }
