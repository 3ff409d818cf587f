//! Error types for `keycard-core`.

use thiserror::Error;

/// Coarse classification shared by every Keycard error type.
///
/// The HTTP layer maps classes to status codes; the class also decides
/// whether an error message is safe to show to an untrusted caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
  /// Bad input shape; a user-facing rejection.
  Validation,
  /// A uniqueness conflict or an exhausted retry budget.
  Conflict,
  NotFound,
  /// Missing or unreadable server configuration.
  Configuration,
  /// Key, certificate, or signing failure.
  Crypto,
  /// A mandatory static asset is missing.
  Asset,
  /// The store failed or is unavailable.
  Persistence,
}

impl ErrorClass {
  /// Whether the failure originates on the server side rather than in the
  /// caller's input.
  pub fn is_server_side(self) -> bool {
    matches!(
      self,
      Self::Configuration | Self::Crypto | Self::Asset | Self::Persistence
    )
  }
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid email address: {0:?}")]
  InvalidEmail(String),

  #[error("discount {0} is outside 0..=100")]
  DiscountOutOfRange(i64),

  #[error("invalid promotion: {0}")]
  InvalidPromotion(String),

  #[error("missing pass serial")]
  MissingSerial,

  #[error("email {0} is already enrolled")]
  DuplicateEmail(String),

  #[error("promotion code {0} already exists")]
  DuplicatePromotion(String),

  #[error("no free pass serial after {0} attempts")]
  SerialExhausted(usize),

  #[error("no holder matching {0:?}")]
  HolderNotFound(String),

  #[error("promotion not found: {0}")]
  PromotionNotFound(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a backend error.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }

  pub fn class(&self) -> ErrorClass {
    match self {
      Self::InvalidEmail(_)
      | Self::DiscountOutOfRange(_)
      | Self::InvalidPromotion(_)
      | Self::MissingSerial => ErrorClass::Validation,
      Self::DuplicateEmail(_)
      | Self::DuplicatePromotion(_)
      | Self::SerialExhausted(_) => ErrorClass::Conflict,
      Self::HolderNotFound(_) | Self::PromotionNotFound(_) => {
        ErrorClass::NotFound
      }
      Self::Store(_) => ErrorClass::Persistence,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
