//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/holders[?email=]` | list, or look up one holder |
//! | `PATCH` | `/holders/{id}` | edit name, discount or delivered flag |

use axum::{
  Json,
  extract::{Path, Query, State},
  response::{IntoResponse, Response},
};
use keycard_core::{
  Error as CoreError,
  holder::{self, Holder, HolderEdit, normalize_email},
  store::MembershipStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, Authenticated, ClientInfo, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct HolderParams {
  pub email: Option<String>,
}

/// With `email`, the matching holder (404 if none); without, every holder,
/// newest first.
pub async fn handler<S>(
  _: Authenticated,
  State(state): State<AppState<S>>,
  Query(params): Query<HolderParams>,
) -> Result<Response, ApiError>
where
  S: MembershipStore + 'static,
{
  let Some(email) = params.email else {
    let holders = state
      .store
      .list_holders()
      .await
      .map_err(CoreError::store)?;
    return Ok(Json(holders).into_response());
  };

  let email = normalize_email(&email)?;
  let holder = state
    .store
    .find_holder_by_email(email.clone())
    .await
    .map_err(CoreError::store)?
    .ok_or(ApiError::NotFound(email))?;
  Ok(Json(holder).into_response())
}

/// Apply an operator edit. Fields left out of the body are unchanged; a
/// changed discount is recorded like a point-of-sale override.
pub async fn update<S>(
  _: Authenticated,
  State(state): State<AppState<S>>,
  ClientInfo(requester): ClientInfo,
  Path(id): Path<Uuid>,
  Json(edit): Json<HolderEdit>,
) -> Result<Json<Holder>, ApiError>
where
  S: MembershipStore + 'static,
{
  let holder = holder::update(state.store.as_ref(), id, edit, &requester).await?;
  Ok(Json(holder))
}
