//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error renders as `{"error": <message>, "kind": <kind>}`. Server-side
//! failures are logged with their cause and answered with a fixed message.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use keycard_core::{Error as CoreError, ErrorClass};
use keycard_pass::Error as PassError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unauthorized")]
  Unauthorized,

  #[error("missing parameter: {0}")]
  MissingParameter(&'static str),

  #[error("not found: {0}")]
  NotFound(String),

  #[error(transparent)]
  Core(#[from] CoreError),

  #[error(transparent)]
  Pass(#[from] PassError),

  #[error("pass worker failed: {0}")]
  Worker(#[from] tokio::task::JoinError),
}

impl ApiError {
  pub fn class(&self) -> ErrorClass {
    match self {
      Self::Unauthorized | Self::MissingParameter(_) => ErrorClass::Validation,
      Self::NotFound(_) => ErrorClass::NotFound,
      Self::Core(e) => e.class(),
      Self::Pass(e) => e.class(),
      Self::Worker(_) => ErrorClass::Crypto,
    }
  }

  /// Stable machine-readable discriminator.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Unauthorized => "unauthorized",
      Self::MissingParameter(_) | Self::Core(CoreError::MissingSerial) => {
        "missing-parameter"
      }
      Self::NotFound(_) => "not-found",
      Self::Core(CoreError::DuplicateEmail(_)) => "duplicate-email",
      Self::Pass(PassError::ConfigurationIncomplete(_)) => "configuration-incomplete",
      Self::Pass(PassError::CertificateMissing(_)) => "certificate-missing",
      Self::Pass(PassError::MissingAsset(_)) => "missing-asset",
      Self::Pass(_) | Self::Worker(_) => "signing-failed",
      Self::Core(e) => match e.class() {
        ErrorClass::Validation => "invalid-request",
        ErrorClass::Conflict => "conflict",
        ErrorClass::NotFound => "not-found",
        _ => "internal",
      },
    }
  }

  fn status(&self) -> StatusCode {
    match self {
      Self::Unauthorized => StatusCode::UNAUTHORIZED,
      _ => match self.class() {
        ErrorClass::Validation => StatusCode::BAD_REQUEST,
        ErrorClass::Conflict => StatusCode::CONFLICT,
        ErrorClass::NotFound => StatusCode::NOT_FOUND,
        ErrorClass::Configuration | ErrorClass::Asset => StatusCode::SERVICE_UNAVAILABLE,
        ErrorClass::Crypto | ErrorClass::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }

  fn public_message(&self) -> String {
    if !self.class().is_server_side() {
      return self.to_string();
    }
    match self.kind() {
      "configuration-incomplete" => "pass issuance is not configured",
      "certificate-missing" => "pass signing certificates are missing",
      "missing-asset" => "a required pass image is missing",
      "signing-failed" => "the pass could not be signed",
      _ => "internal server error",
    }
    .to_owned()
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    if self.class().is_server_side() {
      error!(kind = self.kind(), error = %self, "request failed");
    }

    let status = self.status();
    let body = Json(json!({ "error": self.public_message(), "kind": self.kind() }));
    let mut res = (status, body).into_response();
    if matches!(self, Self::Unauthorized) {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"keycard\""),
      );
    }
    res
  }
}
