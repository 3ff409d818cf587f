//! Point-of-sale scans and operator discount overrides.
//!
//! Independent of enrollment: both operations key on the pass serial and
//! touch a single holder row, so they may run alongside enrollments freely.

use serde::Serialize;
use tracing::info;

use crate::{
  Error, Percent, Result,
  audit::{NewScanEvent, Requester, ScanEvent},
  holder::Holder,
  store::MembershipStore,
};

/// The before/after of a discount override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OldNew {
  pub old_discount: Percent,
  pub new_discount: Percent,
}

/// A resolved scan: the holder and the audit row written for the lookup.
#[derive(Debug, Clone)]
pub struct Scanned {
  pub holder: Holder,
  pub event:  ScanEvent,
}

/// Resolve a scanned serial to its holder.
///
/// A scan event is recorded for every lookup, including serials that match
/// nobody.
pub async fn lookup<S>(store: &S, serial: &str, requester: &Requester) -> Result<Scanned>
where
  S: MembershipStore,
{
  let serial = serial.trim();
  if serial.is_empty() {
    return Err(Error::MissingSerial);
  }

  let holder = store
    .find_holder_by_serial(serial.to_owned())
    .await
    .map_err(Error::store)?;

  let event = store
    .record_scan(NewScanEvent {
      holder_id: holder.as_ref().map(|h| h.holder_id),
      serial:    serial.to_owned(),
      requester: requester.clone(),
    })
    .await
    .map_err(Error::store)?;

  let holder = holder.ok_or_else(|| Error::HolderNotFound(serial.to_owned()))?;
  Ok(Scanned { holder, event })
}

/// Replace the discount on the pass carrying `serial`.
///
/// `new_discount` is range-checked before the store is touched, so an
/// out-of-range request never mutates anything.
pub async fn override_discount<S>(
  store: &S,
  serial: &str,
  new_discount: i64,
  requester: &Requester,
) -> Result<OldNew>
where
  S: MembershipStore,
{
  let serial = serial.trim();
  if serial.is_empty() {
    return Err(Error::MissingSerial);
  }
  let new_discount = Percent::new(new_discount)?;

  let change = store
    .update_discount(serial.to_owned(), new_discount, requester.clone())
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::HolderNotFound(serial.to_owned()))?;

  info!(
    holder_id = %change.holder_id,
    old = %change.old_discount,
    new = %change.new_discount,
    "discount overridden"
  );
  Ok(OldNew {
    old_discount: change.old_discount,
    new_discount: change.new_discount,
  })
}
