//! Handlers for `/promotions` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/promotions/validate` | Public. Body: `{"code":"WELCOME10"}` |
//! | `GET`  | `/promotions` | Newest first |
//! | `POST` | `/promotions` | Body: [`NewPromotion`]; creator is the operator |
//! | `POST` | `/promotions/{id}/active` | Body: `{"active":false}` |
//! | `GET`  | `/promotions/{id}/usage` | Oldest first |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
};
use keycard_core::{
  Error as CoreError, Percent,
  promotion::{NewPromotion, PromotionCode, PromotionUsage},
  resolver,
  store::MembershipStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, Authenticated, error::ApiError};

// ─── Validate ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ValidateBody {
  pub code: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
  pub valid:        bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub discount_pct: Option<Percent>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description:  Option<String>,
  pub message:      String,
}

/// `POST /promotions/validate`: read-only; never consumes a use.
pub async fn validate<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<ValidateBody>,
) -> Result<Json<ValidateResponse>, ApiError>
where
  S: MembershipStore + 'static,
{
  let response = match resolver::validate(state.store.as_ref(), &body.code).await? {
    Some(promo) => ValidateResponse {
      valid:        true,
      discount_pct: Some(promo.discount_pct),
      description:  Some(promo.description),
      message:      format!("Code applies a {} discount.", promo.discount_pct),
    },
    None => ValidateResponse {
      valid:        false,
      discount_pct: None,
      description:  None,
      message:      "Invalid or expired promotion code.".into(),
    },
  };
  Ok(Json(response))
}

// ─── Administration ──────────────────────────────────────────────────────────

/// `GET /promotions`
pub async fn list<S>(
  _: Authenticated,
  State(state): State<AppState<S>>,
) -> Result<Json<Vec<PromotionCode>>, ApiError>
where
  S: MembershipStore + 'static,
{
  let promos = state
    .store
    .list_promotions()
    .await
    .map_err(CoreError::store)?;
  Ok(Json(promos))
}

/// `POST /promotions`
pub async fn create<S>(
  Authenticated(operator): Authenticated,
  State(state): State<AppState<S>>,
  Json(body): Json<NewPromotion>,
) -> Result<(StatusCode, Json<PromotionCode>), ApiError>
where
  S: MembershipStore + 'static,
{
  let input = NewPromotion { created_by: operator, ..body };
  let promo = resolver::create_promotion(state.store.as_ref(), input).await?;
  Ok((StatusCode::CREATED, Json(promo)))
}

#[derive(Debug, Deserialize)]
pub struct ActiveBody {
  pub active: bool,
}

/// `POST /promotions/{id}/active`
pub async fn set_active<S>(
  _: Authenticated,
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ActiveBody>,
) -> Result<Json<PromotionCode>, ApiError>
where
  S: MembershipStore + 'static,
{
  let promo = resolver::set_active(state.store.as_ref(), id, body.active).await?;
  Ok(Json(promo))
}

/// `GET /promotions/{id}/usage`
pub async fn usage<S>(
  _: Authenticated,
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<PromotionUsage>>, ApiError>
where
  S: MembershipStore + 'static,
{
  let usage = state
    .store
    .list_promotion_usage(id)
    .await
    .map_err(CoreError::store)?;
  Ok(Json(usage))
}
