//! Operator authentication for scan and admin routes.
//!
//! There is exactly one operator account, configured in the `[operator]`
//! section. Requests authenticate with HTTP Basic; the password is checked
//! against an argon2 PHC string.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use keycard_core::store::MembershipStore;
use serde::Deserialize;

use crate::{AppState, error::ApiError};

/// The `[operator]` section of the server configuration.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

impl OperatorConfig {
  /// Whether an account is set up at all. An unconfigured operator admits
  /// nobody.
  pub fn is_configured(&self) -> bool {
    !self.username.is_empty() && !self.password_hash.is_empty()
  }

  /// Check a username and password against this account.
  pub fn verify(&self, username: &str, password: &str) -> bool {
    if !self.is_configured() || username != self.username {
      return false;
    }
    PasswordHash::new(&self.password_hash).is_ok_and(|hash| {
      Argon2::default()
        .verify_password(password.as_bytes(), &hash)
        .is_ok()
    })
  }
}

impl std::fmt::Debug for OperatorConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("OperatorConfig")
      .field("username", &self.username)
      .finish_non_exhaustive()
  }
}

/// Present in a handler means the request came from the operator. Holds the
/// operator's username, recorded as the creator of promotions.
#[derive(Debug, Clone)]
pub struct Authenticated(pub String);

/// Username and password from an `Authorization: Basic` header.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
  let encoded = headers
    .get(header::AUTHORIZATION)?
    .to_str()
    .ok()?
    .strip_prefix("Basic ")?;
  let decoded = String::from_utf8(B64.decode(encoded.trim()).ok()?).ok()?;
  let (username, password) = decoded.split_once(':')?;
  Some((username.to_owned(), password.to_owned()))
}

/// Authenticate the request behind `headers` as `operator`, returning the
/// operator's username.
pub fn authenticate(headers: &HeaderMap, operator: &OperatorConfig) -> Result<String, ApiError> {
  let (username, password) = basic_credentials(headers).ok_or(ApiError::Unauthorized)?;
  if operator.verify(&username, &password) {
    Ok(username)
  } else {
    Err(ApiError::Unauthorized)
  }
}

impl<S> FromRequestParts<AppState<S>> for Authenticated
where
  S: MembershipStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    authenticate(&parts.headers, &state.operator).map(Authenticated)
  }
}
