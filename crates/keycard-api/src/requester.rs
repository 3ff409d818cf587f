//! Extraction of the caller's address and agent for audit records.

use std::{convert::Infallible, net::SocketAddr};

use axum::{
  extract::{ConnectInfo, FromRequestParts},
  http::{header, request::Parts},
};
use keycard_core::audit::Requester;

/// The [`Requester`] behind the current request.
///
/// The address is the first `X-Forwarded-For` entry when present, else the
/// peer address if the server was started with connect info.
#[derive(Debug, Clone)]
pub struct ClientInfo(pub Requester);

impl<S> FromRequestParts<S> for ClientInfo
where
  S: Send + Sync,
{
  type Rejection = Infallible;

  async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
    Ok(Self(requester_from(parts)))
  }
}

pub fn requester_from(parts: &Parts) -> Requester {
  let forwarded = parts
    .headers
    .get("x-forwarded-for")
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(',').next())
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .map(str::to_owned);
  let address = forwarded.or_else(|| {
    parts
      .extensions
      .get::<ConnectInfo<SocketAddr>>()
      .map(|ConnectInfo(addr)| addr.ip().to_string())
  });
  let user_agent = parts
    .headers
    .get(header::USER_AGENT)
    .and_then(|v| v.to_str().ok())
    .map(str::to_owned);

  Requester { address, user_agent }
}
