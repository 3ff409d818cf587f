//! `GET /passes?serial=`: build, sign and deliver a holder's pass.

use axum::{
  extract::{Query, State},
  http::{StatusCode, header},
  response::{IntoResponse, Response},
};
use keycard_core::{Error as CoreError, store::MembershipStore};
use keycard_pass::CONTENT_TYPE;
use serde::Deserialize;
use tracing::info;

use crate::{AppState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct PassParams {
  pub serial: Option<String>,
}

pub async fn download<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<PassParams>,
) -> Result<Response, ApiError>
where
  S: MembershipStore + 'static,
{
  let serial = params
    .serial
    .as_deref()
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .ok_or(ApiError::MissingParameter("serial"))?
    .to_owned();

  let holder = state
    .store
    .find_holder_by_serial(serial.clone())
    .await
    .map_err(CoreError::store)?
    .ok_or_else(|| CoreError::HolderNotFound(serial.clone()))?;

  let issuer = state.issuer.check()?;
  let holder_id = holder.holder_id;
  // Signing and asset reads are blocking file and crypto work.
  let archive = tokio::task::spawn_blocking(move || issuer.issue(&holder)).await??;

  state
    .store
    .mark_delivered(holder_id)
    .await
    .map_err(CoreError::store)?;
  info!(%serial, size = archive.len(), "pass issued");

  Ok(
    (
      StatusCode::OK,
      [
        (header::CONTENT_TYPE, CONTENT_TYPE.to_owned()),
        (
          header::CONTENT_DISPOSITION,
          format!("attachment; filename=\"{serial}.pkpass\""),
        ),
        (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate".to_owned()),
      ],
      archive,
    )
      .into_response(),
  )
}
