//! Operator point-of-sale endpoints.

use axum::{
  Json,
  extract::{Query, State},
};
use chrono::{DateTime, Utc};
use keycard_core::{
  Error as CoreError, Percent,
  audit::ScanEvent,
  scan::{self, OldNew, Scanned},
  store::MembershipStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, Authenticated, ClientInfo, error::ApiError};

/// Shown when the holder enrolled without a name.
const UNNAMED: &str = "Member";

#[derive(Debug, Deserialize)]
pub struct ScanBody {
  pub serial: String,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
  pub holder_id:    Uuid,
  pub name:         String,
  pub email:        String,
  pub discount_pct: Percent,
  pub pass_serial:  String,
  pub member_since: DateTime<Utc>,
  pub scanned_at:   DateTime<Utc>,
}

impl From<Scanned> for ScanResponse {
  fn from(Scanned { holder: h, event }: Scanned) -> Self {
    Self {
      holder_id:    h.holder_id,
      name:         h.display_name(UNNAMED).to_owned(),
      discount_pct: h.discount_pct,
      member_since: h.created_at,
      scanned_at:   event.scanned_at,
      email:        h.email,
      pass_serial:  h.pass_serial,
    }
  }
}

/// `POST /scan`, body: `{"serial":"..."}`
pub async fn lookup<S>(
  _: Authenticated,
  State(state): State<AppState<S>>,
  ClientInfo(requester): ClientInfo,
  Json(body): Json<ScanBody>,
) -> Result<Json<ScanResponse>, ApiError>
where
  S: MembershipStore + 'static,
{
  let scanned = scan::lookup(state.store.as_ref(), &body.serial, &requester).await?;
  Ok(Json(scanned.into()))
}

#[derive(Debug, Deserialize)]
pub struct DiscountBody {
  pub serial:       String,
  pub new_discount: i64,
}

/// `POST /scan/discount`, body: `{"serial":"...","new_discount":40}`
pub async fn override_discount<S>(
  _: Authenticated,
  State(state): State<AppState<S>>,
  ClientInfo(requester): ClientInfo,
  Json(body): Json<DiscountBody>,
) -> Result<Json<OldNew>, ApiError>
where
  S: MembershipStore + 'static,
{
  let change = scan::override_discount(
    state.store.as_ref(),
    &body.serial,
    body.new_discount,
    &requester,
  )
  .await?;
  Ok(Json(change))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
  pub serial: Option<String>,
}

/// `GET /scans?serial=`: scan events for one serial, oldest first.
pub async fn history<S>(
  _: Authenticated,
  State(state): State<AppState<S>>,
  Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<ScanEvent>>, ApiError>
where
  S: MembershipStore + 'static,
{
  let serial = params
    .serial
    .as_deref()
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .ok_or(ApiError::MissingParameter("serial"))?;
  let events = state
    .store
    .list_scans(serial.to_owned())
    .await
    .map_err(CoreError::store)?;
  Ok(Json(events))
}
