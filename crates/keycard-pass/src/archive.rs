//! Packaging: payload, assets, manifest and signature into one zip archive.

use std::io::{Cursor, Write as _};

use keycard_core::holder::Holder;
use tracing::debug;
use zip::{CompressionMethod, DateTime, ZipWriter, result::ZipError, write::SimpleFileOptions};

use crate::{
  Result,
  assets::AssetSet,
  manifest::Manifest,
  payload::{PassTemplate, render},
  signer::ManifestSigner,
};

pub const PASS_JSON: &str = "pass.json";
pub const MANIFEST_JSON: &str = "manifest.json";
pub const SIGNATURE: &str = "signature";

/// Media type of the produced archive.
pub const CONTENT_TYPE: &str = "application/vnd.apple.pkpass";

/// Build the signed archive for `holder`.
///
/// Members are written in a fixed order (`pass.json`, assets by name,
/// `manifest.json`, `signature`) with fixed timestamps, so the output only
/// varies with its inputs and the signature.
pub fn package<S>(
  template: &PassTemplate,
  holder: &Holder,
  assets: &AssetSet,
  signer: &S,
) -> Result<Vec<u8>>
where
  S: ManifestSigner + ?Sized,
{
  let payload = serde_json::to_vec_pretty(&render(template, holder))?;

  let manifest = Manifest::build(
    std::iter::once((PASS_JSON, payload.as_slice())).chain(assets.iter()),
  )
  .to_json()?;
  let signature = signer.sign(&manifest)?;

  let options = SimpleFileOptions::default()
    .compression_method(CompressionMethod::Deflated)
    .last_modified_time(DateTime::default());

  let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
  let members = std::iter::once((PASS_JSON, payload.as_slice()))
    .chain(assets.iter())
    .chain([(MANIFEST_JSON, manifest.as_slice()), (SIGNATURE, signature.as_slice())]);
  for (name, bytes) in members {
    zip.start_file(name, options)?;
    zip.write_all(bytes).map_err(ZipError::Io)?;
  }
  let bytes = zip.finish()?.into_inner();

  debug!(serial = %holder.pass_serial, size = bytes.len(), "pass packaged");
  Ok(bytes)
}
