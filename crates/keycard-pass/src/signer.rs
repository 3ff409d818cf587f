//! Detached PKCS#7 signatures over the manifest.
//!
//! Key material is read and decrypted per call and dropped when the call
//! returns. Nothing here logs.

use std::{
  io,
  path::{Path, PathBuf},
};

use openssl::{
  pkcs12::Pkcs12,
  pkcs7::{Pkcs7, Pkcs7Flags},
  stack::Stack,
  x509::X509,
};

use crate::{Error, Result};

/// Produces the `signature` member for a serialised manifest.
pub trait ManifestSigner: Send + Sync {
  fn sign(&self, manifest: &[u8]) -> Result<Vec<u8>>;
}

/// Sign `manifest` with the key and certificate in a PKCS#12 container,
/// embedding the signer certificate and `intermediate_pem` in the output.
///
/// The signature is detached and computed over the manifest bytes exactly as
/// given.
pub fn sign(
  manifest: &[u8],
  pkcs12_der: &[u8],
  intermediate_pem: &[u8],
  passphrase: &str,
) -> Result<Vec<u8>> {
  let parsed = Pkcs12::from_der(pkcs12_der)
    .and_then(|p| p.parse2(passphrase))
    .map_err(|e| Error::Key(e.to_string()))?;
  let (Some(pkey), Some(cert)) = (parsed.pkey, parsed.cert) else {
    return Err(Error::Key("container lacks a private key or certificate".into()));
  };

  let intermediate = X509::from_pem(intermediate_pem)
    .or_else(|_| X509::from_der(intermediate_pem))
    .map_err(|e| Error::Cert(e.to_string()))?;

  let signing = |e: openssl::error::ErrorStack| Error::Signing(e.to_string());
  let mut chain = Stack::new().map_err(signing)?;
  chain.push(intermediate).map_err(signing)?;

  Pkcs7::sign(
    &cert,
    &pkey,
    &chain,
    manifest,
    Pkcs7Flags::DETACHED | Pkcs7Flags::BINARY,
  )
  .and_then(|p7| p7.to_der())
  .map_err(signing)
}

/// A [`ManifestSigner`] that reads its key container and intermediate
/// certificate from disk on every call.
#[derive(Clone)]
pub struct Pkcs7Signer {
  pkcs12_path:       PathBuf,
  intermediate_path: PathBuf,
  passphrase:        String,
}

impl Pkcs7Signer {
  pub fn new(
    pkcs12_path: impl Into<PathBuf>,
    intermediate_path: impl Into<PathBuf>,
    passphrase: impl Into<String>,
  ) -> Self {
    Self {
      pkcs12_path:       pkcs12_path.into(),
      intermediate_path: intermediate_path.into(),
      passphrase:        passphrase.into(),
    }
  }
}

impl std::fmt::Debug for Pkcs7Signer {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Pkcs7Signer")
      .field("pkcs12_path", &self.pkcs12_path)
      .field("intermediate_path", &self.intermediate_path)
      .finish_non_exhaustive()
  }
}

impl ManifestSigner for Pkcs7Signer {
  fn sign(&self, manifest: &[u8]) -> Result<Vec<u8>> {
    let pkcs12 = read_certificate(&self.pkcs12_path)?;
    let intermediate = read_certificate(&self.intermediate_path)?;
    sign(manifest, &pkcs12, &intermediate, &self.passphrase)
  }
}

pub(crate) fn read_certificate(path: &Path) -> Result<Vec<u8>> {
  std::fs::read(path).map_err(|source| match source.kind() {
    io::ErrorKind::NotFound => Error::CertificateMissing(path.to_owned()),
    _ => Error::Io { path: path.to_owned(), source },
  })
}

#[cfg(test)]
mod tests {
  use openssl::x509::store::X509StoreBuilder;

  use super::*;
  use crate::testing::credentials;

  fn verify(signature: &[u8], manifest: &[u8]) -> bool {
    let creds = credentials();
    let mut trust = X509StoreBuilder::new().unwrap();
    trust.add_cert(creds.root.clone()).unwrap();
    let trust = trust.build();
    let extra = Stack::new().unwrap();

    Pkcs7::from_der(signature)
      .unwrap()
      .verify(&extra, &trust, Some(manifest), None, Pkcs7Flags::BINARY)
      .is_ok()
  }

  #[test]
  fn signature_verifies_against_the_chain() {
    let creds = credentials();
    let manifest = br#"{"pass.json":"00"}"#;
    let sig = sign(manifest, &creds.pkcs12_der, &creds.intermediate_pem, creds.passphrase)
      .unwrap();
    assert!(verify(&sig, manifest));
  }

  #[test]
  fn tampered_manifest_fails_verification() {
    let creds = credentials();
    let manifest = br#"{"pass.json":"00"}"#.to_vec();
    let sig = sign(&manifest, &creds.pkcs12_der, &creds.intermediate_pem, creds.passphrase)
      .unwrap();

    let mut tampered = manifest.clone();
    tampered[2] ^= 0x01;
    assert!(!verify(&sig, &tampered));
  }

  #[test]
  fn wrong_passphrase_is_a_key_error() {
    let creds = credentials();
    let err = sign(b"{}", &creds.pkcs12_der, &creds.intermediate_pem, "nope").unwrap_err();
    assert!(matches!(err, Error::Key(_)), "{err:?}");
  }

  #[test]
  fn garbage_intermediate_is_a_cert_error() {
    let creds = credentials();
    let err = sign(b"{}", &creds.pkcs12_der, b"not a certificate", creds.passphrase)
      .unwrap_err();
    assert!(matches!(err, Error::Cert(_)), "{err:?}");
  }

  #[test]
  fn file_signer_reports_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let signer = Pkcs7Signer::new(
      dir.path().join("pass.p12"),
      dir.path().join("wwdr.pem"),
      "secret",
    );
    let err = signer.sign(b"{}").unwrap_err();
    assert!(matches!(err, Error::CertificateMissing(_)), "{err:?}");
  }

  #[test]
  fn file_signer_reads_from_disk() {
    let creds = credentials();
    let dir = tempfile::tempdir().unwrap();
    let p12 = dir.path().join("pass.p12");
    let wwdr = dir.path().join("wwdr.pem");
    std::fs::write(&p12, &creds.pkcs12_der).unwrap();
    std::fs::write(&wwdr, &creds.intermediate_pem).unwrap();

    let signer = Pkcs7Signer::new(p12, wwdr, creds.passphrase);
    let sig = signer.sign(b"{}").unwrap();
    assert!(verify(&sig, b"{}"));
    assert!(!format!("{signer:?}").contains(creds.passphrase));
  }
}
