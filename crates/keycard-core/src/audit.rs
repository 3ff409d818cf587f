//! Append-only audit records and the requester context attached to them.
//!
//! Audit rows are written by the store as part of the operation they
//! describe and are never updated or deleted. Core logic never reads them
//! back; they exist for operators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Percent;

/// Who asked for an operation, as far as the transport can tell.
///
/// Passed explicitly into every operation that writes an audit row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
  /// Network address of the caller, if known.
  pub address:    Option<String>,
  pub user_agent: Option<String>,
}

/// One lookup of a pass serial, whether or not it resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEvent {
  pub scan_id:    Uuid,
  /// `None` when the serial did not match any holder.
  pub holder_id:  Option<Uuid>,
  pub serial:     String,
  pub scanned_at: DateTime<Utc>,
  pub requester:  Requester,
}

/// Input to [`crate::store::MembershipStore::record_scan`].
#[derive(Debug, Clone)]
pub struct NewScanEvent {
  pub holder_id: Option<Uuid>,
  pub serial:    String,
  pub requester: Requester,
}

/// One mutation of a holder's discount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountChange {
  pub change_id:    Uuid,
  pub holder_id:    Uuid,
  pub serial:       String,
  pub old_discount: Percent,
  pub new_discount: Percent,
  pub changed_at:   DateTime<Utc>,
  pub requester:    Requester,
}
