//! Error types for pass packaging and signing.

use std::path::PathBuf;

use keycard_core::ErrorClass;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A required issuer setting is empty or absent.
  #[error("pass configuration incomplete: {0} is not set")]
  ConfigurationIncomplete(&'static str),

  #[error("certificate file missing: {}", .0.display())]
  CertificateMissing(PathBuf),

  #[error("required asset missing: {0}")]
  MissingAsset(String),

  /// The PKCS#12 container could not be opened, or holds no key/cert pair.
  #[error("cannot open signing key: {0}")]
  Key(String),

  #[error("invalid intermediate certificate: {0}")]
  Cert(String),

  #[error("signing failed: {0}")]
  Signing(String),

  #[error("cannot read {}: {source}", path.display())]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("archive error: {0}")]
  Archive(#[from] zip::result::ZipError),
}

impl Error {
  pub fn class(&self) -> ErrorClass {
    match self {
      Self::ConfigurationIncomplete(_)
      | Self::CertificateMissing(_)
      | Self::Io { .. } => ErrorClass::Configuration,
      Self::MissingAsset(_) => ErrorClass::Asset,
      Self::Key(_)
      | Self::Cert(_)
      | Self::Signing(_)
      | Self::Json(_)
      | Self::Archive(_) => ErrorClass::Crypto,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
