//! `POST /enroll`

use axum::{Json, extract::State, http::StatusCode};
use keycard_core::{
  Percent,
  enrollment::{self, EnrollmentRequest},
  store::MembershipStore,
};
use serde::Serialize;

use crate::{AppState, ClientInfo, error::ApiError};

#[derive(Debug, Serialize)]
pub struct EnrollResponse {
  pub status:             &'static str,
  pub message:            String,
  /// Where the holder downloads their pass.
  pub download_reference: String,
  pub applied_discount:   Percent,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub applied_promo_code: Option<String>,
}

/// Body: `{"email": "...", "name"?: "...", "phone"?: "...", "promo_code"?: "..."}`
pub async fn handler<S>(
  State(state): State<AppState<S>>,
  ClientInfo(requester): ClientInfo,
  Json(body): Json<EnrollmentRequest>,
) -> Result<(StatusCode, Json<EnrollResponse>), ApiError>
where
  S: MembershipStore + 'static,
{
  let enrolled = enrollment::enroll(
    state.store.as_ref(),
    state.serials.as_ref(),
    &state.policy,
    body,
    &requester,
  )
  .await?;

  let holder = &enrolled.holder;
  let message = match &enrolled.applied_promo {
    Some(code) => format!(
      "Welcome! Promotion {code} applied: {} off.",
      holder.discount_pct
    ),
    None => format!("Welcome! Your membership discount is {}.", holder.discount_pct),
  };

  Ok((
    StatusCode::CREATED,
    Json(EnrollResponse {
      status: "success",
      message,
      download_reference: download_reference(&state.base_url, &holder.pass_serial),
      applied_discount: holder.discount_pct,
      applied_promo_code: enrolled.applied_promo,
    }),
  ))
}

fn download_reference(base_url: &str, serial: &str) -> String {
  format!("{}/passes?serial={serial}", base_url.trim_end_matches('/'))
}
