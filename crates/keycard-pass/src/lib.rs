//! Wallet pass packaging for Keycard.
//!
//! Renders a holder's `pass.json`, digests it alongside the static assets,
//! signs the manifest and zips the lot. Pure synchronous; no HTTP or
//! database dependencies.

pub mod archive;
pub mod assets;
pub mod config;
pub mod error;
pub mod manifest;
pub mod payload;
pub mod signer;

#[cfg(test)]
mod testing;

pub use archive::{CONTENT_TYPE, package};
pub use config::{Issuer, IssuerConfig};
pub use error::{Error, Result};
pub use payload::PassTemplate;
pub use signer::{ManifestSigner, Pkcs7Signer};
