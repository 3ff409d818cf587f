//! JSON HTTP API for Keycard.
//!
//! Exposes an axum [`Router`] backed by any
//! [`keycard_core::store::MembershipStore`]. Enrollment, promotion validation
//! and pass download are public; everything under the operator routes needs
//! HTTP Basic credentials.
//!
//! | Method | Path | Auth |
//! |--------|------|------|
//! | `POST` | `/enroll` | – |
//! | `POST` | `/promotions/validate` | – |
//! | `GET`  | `/passes?serial=` | – |
//! | `POST` | `/scan` | operator |
//! | `POST` | `/scan/discount` | operator |
//! | `GET`  | `/scans?serial=` | operator |
//! | `GET`  | `/holders[?email=]` | operator |
//! | `PATCH` | `/holders/{id}` | operator |
//! | `GET`, `POST` | `/promotions` | operator |
//! | `POST` | `/promotions/{id}/active` | operator |
//! | `GET`  | `/promotions/{id}/usage` | operator |

pub mod auth;
pub mod enroll;
pub mod error;
pub mod holders;
pub mod passes;
pub mod promotions;
pub mod requester;
pub mod scan;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, patch, post},
};
use keycard_core::{enrollment::EnrollmentPolicy, serial::SerialSource, store::MembershipStore};
use keycard_pass::IssuerConfig;

pub use auth::{Authenticated, OperatorConfig};
pub use error::ApiError;
pub use requester::ClientInfo;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S> {
  pub store:    Arc<S>,
  pub serials:  Arc<dyn SerialSource>,
  pub policy:   EnrollmentPolicy,
  /// Checked on every download, so a fixed configuration takes effect without
  /// losing enrollments in the meantime.
  pub issuer:   Arc<IssuerConfig>,
  pub operator: Arc<OperatorConfig>,
  /// Public origin used to build download references.
  pub base_url: Arc<str>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      serials:  Arc::clone(&self.serials),
      policy:   self.policy,
      issuer:   Arc::clone(&self.issuer),
      operator: Arc::clone(&self.operator),
      base_url: Arc::clone(&self.base_url),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the Keycard router for `state`.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: MembershipStore + 'static,
{
  Router::new()
    // Public
    .route("/enroll", post(enroll::handler::<S>))
    .route("/promotions/validate", post(promotions::validate::<S>))
    .route("/passes", get(passes::download::<S>))
    // Operator
    .route("/scan", post(scan::lookup::<S>))
    .route("/scan/discount", post(scan::override_discount::<S>))
    .route("/scans", get(scan::history::<S>))
    .route("/holders", get(holders::handler::<S>))
    .route("/holders/{id}", patch(holders::update::<S>))
    .route("/promotions", get(promotions::list::<S>).post(promotions::create::<S>))
    .route("/promotions/{id}/active", post(promotions::set_active::<S>))
    .route("/promotions/{id}/usage", get(promotions::usage::<S>))
    .with_state(state)
}
