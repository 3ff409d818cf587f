//! Holder: one enrolled member entitled to a discount and a wallet pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{Error, Percent, Result, audit::Requester, store::MembershipStore};

/// Longest email address the store accepts.
pub const MAX_EMAIL_LEN: usize = 200;

/// A persisted holder record.
///
/// `email` and `pass_serial` are both unique across the store; email
/// uniqueness is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holder {
  pub holder_id:      Uuid,
  pub email:          String,
  pub name:           Option<String>,
  pub phone:          Option<String>,
  pub discount_pct:   Percent,
  /// Opaque token encoded in the pass barcode.
  pub pass_serial:    String,
  /// Set once a signed pass has been handed to the holder.
  pub pass_delivered: bool,
  /// Server-assigned; never changes after creation.
  pub created_at:     DateTime<Utc>,
}

impl Holder {
  /// Name shown on the pass, falling back to `fallback` when unset.
  pub fn display_name<'a>(&'a self, fallback: &'a str) -> &'a str {
    self.name.as_deref().unwrap_or(fallback)
  }
}

/// Input to [`crate::store::MembershipStore::insert_holder`].
/// `holder_id`, `created_at` and `pass_delivered` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewHolder {
  pub email:        String,
  pub name:         Option<String>,
  pub phone:        Option<String>,
  pub discount_pct: Percent,
  pub pass_serial:  String,
}

/// Operator edits to an existing holder. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolderUpdate {
  /// `Some(None)` clears the name.
  pub name:           Option<Option<String>>,
  pub discount_pct:   Option<Percent>,
  pub pass_delivered: Option<bool>,
}

/// An operator edit as received over the wire. A blank `name` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HolderEdit {
  pub name:           Option<String>,
  pub discount_pct:   Option<i64>,
  pub pass_delivered: Option<bool>,
}

impl HolderEdit {
  pub fn validate(self) -> Result<HolderUpdate> {
    Ok(HolderUpdate {
      name:           self.name.map(|n| normalize_optional(Some(&n))),
      discount_pct:   self.discount_pct.map(Percent::new).transpose()?,
      pass_delivered: self.pass_delivered,
    })
  }
}

/// Apply an operator edit to the holder with `holder_id`.
///
/// The edit is validated before the store is touched. A discount that
/// actually changes is recorded as a discount change, like a point-of-sale
/// override.
pub async fn update<S>(
  store: &S,
  holder_id: Uuid,
  edit: HolderEdit,
  requester: &Requester,
) -> Result<Holder>
where
  S: MembershipStore,
{
  let update = edit.validate()?;
  let holder = store
    .update_holder(holder_id, update, requester.clone())
    .await
    .map_err(Error::store)?
    .ok_or_else(|| Error::HolderNotFound(holder_id.to_string()))?;

  info!(
    holder_id = %holder.holder_id,
    discount = %holder.discount_pct,
    delivered = holder.pass_delivered,
    "holder updated"
  );
  Ok(holder)
}

/// Trim an email address and check its basic shape.
///
/// Case is preserved; uniqueness checks are case-insensitive at the store.
pub fn normalize_email(raw: &str) -> Result<String> {
  let email = raw.trim();
  let invalid = || Error::InvalidEmail(raw.to_owned());

  if email.is_empty()
    || email.len() > MAX_EMAIL_LEN
    || email.chars().any(char::is_whitespace)
  {
    return Err(invalid());
  }

  let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
  if local.is_empty() || domain.contains('@') {
    return Err(invalid());
  }
  if !domain.contains('.')
    || domain.starts_with('.')
    || domain.ends_with('.')
    || domain.contains("..")
  {
    return Err(invalid());
  }

  Ok(email.to_owned())
}

/// Trim an optional free-text field, mapping blank input to `None`.
pub fn normalize_optional(raw: Option<&str>) -> Option<String> {
  raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}
