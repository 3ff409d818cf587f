//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings
//! (`2025-01-31T09:15:00.000000Z`) so that SQL string comparison matches
//! chronological order; the promotion expiry check relies on this. UUIDs are
//! stored as hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, SubsecRound as _, Utc};
use keycard_core::{
  Percent,
  audit::{DiscountChange, Requester, ScanEvent},
  holder::Holder,
  promotion::{PromotionCode, PromotionUsage},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

/// The current time at storage precision, so values handed back to callers
/// compare equal to what a later read decodes.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Integers ─────────────────────────────────────────────────────────────────

pub fn decode_percent(column: &'static str, value: i64) -> Result<Percent> {
  Percent::new(value).map_err(|_| Error::Decode { column, value })
}

pub fn decode_count(column: &'static str, value: i64) -> Result<u32> {
  u32::try_from(value).map_err(|_| Error::Decode { column, value })
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const HOLDER_COLUMNS: &str = "holder_id, email, name, phone, discount_pct, \
   pass_serial, pass_delivered, created_at";

/// Raw values read directly from a `holders` row.
pub struct RawHolder {
  pub holder_id:      String,
  pub email:          String,
  pub name:           Option<String>,
  pub phone:          Option<String>,
  pub discount_pct:   i64,
  pub pass_serial:    String,
  pub pass_delivered: bool,
  pub created_at:     String,
}

impl RawHolder {
  /// Column order follows [`HOLDER_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      holder_id:      row.get(0)?,
      email:          row.get(1)?,
      name:           row.get(2)?,
      phone:          row.get(3)?,
      discount_pct:   row.get(4)?,
      pass_serial:    row.get(5)?,
      pass_delivered: row.get(6)?,
      created_at:     row.get(7)?,
    })
  }

  pub fn into_holder(self) -> Result<Holder> {
    Ok(Holder {
      holder_id:      decode_uuid(&self.holder_id)?,
      email:          self.email,
      name:           self.name,
      phone:          self.phone,
      discount_pct:   decode_percent("discount_pct", self.discount_pct)?,
      pass_serial:    self.pass_serial,
      pass_delivered: self.pass_delivered,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}

pub const PROMOTION_COLUMNS: &str = "promo_id, code, description, discount_pct, \
   max_uses, current_uses, active, expires_at, created_by, created_at";

/// Raw values read directly from a `promotion_codes` row.
pub struct RawPromotion {
  pub promo_id:     String,
  pub code:         String,
  pub description:  String,
  pub discount_pct: i64,
  pub max_uses:     i64,
  pub current_uses: i64,
  pub active:       bool,
  pub expires_at:   Option<String>,
  pub created_by:   String,
  pub created_at:   String,
}

impl RawPromotion {
  /// Column order follows [`PROMOTION_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      promo_id:     row.get(0)?,
      code:         row.get(1)?,
      description:  row.get(2)?,
      discount_pct: row.get(3)?,
      max_uses:     row.get(4)?,
      current_uses: row.get(5)?,
      active:       row.get(6)?,
      expires_at:   row.get(7)?,
      created_by:   row.get(8)?,
      created_at:   row.get(9)?,
    })
  }

  pub fn into_promotion(self) -> Result<PromotionCode> {
    Ok(PromotionCode {
      promo_id:     decode_uuid(&self.promo_id)?,
      code:         self.code,
      description:  self.description,
      discount_pct: decode_percent("discount_pct", self.discount_pct)?,
      max_uses:     decode_count("max_uses", self.max_uses)?,
      current_uses: decode_count("current_uses", self.current_uses)?,
      active:       self.active,
      expires_at:   self.expires_at.as_deref().map(decode_dt).transpose()?,
      created_by:   self.created_by,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

pub const USAGE_COLUMNS: &str =
  "usage_id, promo_id, code, discount_pct, holder_id, used_at, ip_address, user_agent";

/// Raw values read directly from a `promotion_usage` row.
pub struct RawUsage {
  pub usage_id:     String,
  pub promo_id:     String,
  pub code:         String,
  pub discount_pct: i64,
  pub holder_id:    Option<String>,
  pub used_at:      String,
  pub ip_address:   Option<String>,
  pub user_agent:   Option<String>,
}

impl RawUsage {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      usage_id:     row.get(0)?,
      promo_id:     row.get(1)?,
      code:         row.get(2)?,
      discount_pct: row.get(3)?,
      holder_id:    row.get(4)?,
      used_at:      row.get(5)?,
      ip_address:   row.get(6)?,
      user_agent:   row.get(7)?,
    })
  }

  pub fn into_usage(self) -> Result<PromotionUsage> {
    Ok(PromotionUsage {
      usage_id:     decode_uuid(&self.usage_id)?,
      promo_id:     decode_uuid(&self.promo_id)?,
      code:         self.code,
      discount_pct: decode_percent("discount_pct", self.discount_pct)?,
      holder_id:    self.holder_id.as_deref().map(decode_uuid).transpose()?,
      used_at:      decode_dt(&self.used_at)?,
      requester:    Requester {
        address:    self.ip_address,
        user_agent: self.user_agent,
      },
    })
  }
}

pub const SCAN_COLUMNS: &str =
  "scan_id, holder_id, serial, scanned_at, ip_address, user_agent";

/// Raw values read directly from a `scan_events` row.
pub struct RawScan {
  pub scan_id:    String,
  pub holder_id:  Option<String>,
  pub serial:     String,
  pub scanned_at: String,
  pub ip_address: Option<String>,
  pub user_agent: Option<String>,
}

impl RawScan {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      scan_id:    row.get(0)?,
      holder_id:  row.get(1)?,
      serial:     row.get(2)?,
      scanned_at: row.get(3)?,
      ip_address: row.get(4)?,
      user_agent: row.get(5)?,
    })
  }

  pub fn into_scan(self) -> Result<ScanEvent> {
    Ok(ScanEvent {
      scan_id:    decode_uuid(&self.scan_id)?,
      holder_id:  self.holder_id.as_deref().map(decode_uuid).transpose()?,
      serial:     self.serial,
      scanned_at: decode_dt(&self.scanned_at)?,
      requester:  Requester {
        address:    self.ip_address,
        user_agent: self.user_agent,
      },
    })
  }
}

pub const CHANGE_COLUMNS: &str = "change_id, holder_id, serial, old_discount, \
   new_discount, changed_at, ip_address, user_agent";

/// Raw values read directly from a `discount_changes` row.
pub struct RawChange {
  pub change_id:    String,
  pub holder_id:    String,
  pub serial:       String,
  pub old_discount: i64,
  pub new_discount: i64,
  pub changed_at:   String,
  pub ip_address:   Option<String>,
  pub user_agent:   Option<String>,
}

impl RawChange {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      change_id:    row.get(0)?,
      holder_id:    row.get(1)?,
      serial:       row.get(2)?,
      old_discount: row.get(3)?,
      new_discount: row.get(4)?,
      changed_at:   row.get(5)?,
      ip_address:   row.get(6)?,
      user_agent:   row.get(7)?,
    })
  }

  pub fn into_change(self) -> Result<DiscountChange> {
    Ok(DiscountChange {
      change_id:    decode_uuid(&self.change_id)?,
      holder_id:    decode_uuid(&self.holder_id)?,
      serial:       self.serial,
      old_discount: decode_percent("old_discount", self.old_discount)?,
      new_discount: decode_percent("new_discount", self.new_discount)?,
      changed_at:   decode_dt(&self.changed_at)?,
      requester:    Requester {
        address:    self.ip_address,
        user_agent: self.user_agent,
      },
    })
  }
}
