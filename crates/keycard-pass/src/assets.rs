//! Static image members bundled into every pass.

use std::{collections::BTreeMap, io, path::Path};

use crate::{Error, Result};

/// Members every pass must carry.
pub const REQUIRED: &[&str] = &["icon.png", "logo.png"];

/// High-resolution variants, bundled when present.
pub const OPTIONAL: &[&str] = &["icon@2x.png", "logo@2x.png"];

/// Asset bytes keyed by member name, iterated in name order.
#[derive(Debug, Clone, Default)]
pub struct AssetSet(BTreeMap<String, Vec<u8>>);

impl AssetSet {
  /// Read the known assets from `dir`.
  ///
  /// Fails with [`Error::MissingAsset`] naming the first required file that
  /// does not exist.
  pub fn collect(dir: &Path) -> Result<Self> {
    let mut files = BTreeMap::new();
    for name in REQUIRED {
      let bytes = read(dir, name)?.ok_or_else(|| Error::MissingAsset((*name).into()))?;
      files.insert((*name).to_owned(), bytes);
    }
    for name in OPTIONAL {
      if let Some(bytes) = read(dir, name)? {
        files.insert((*name).to_owned(), bytes);
      }
    }
    Ok(Self(files))
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
    self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
  }

  pub fn names(&self) -> impl Iterator<Item = &str> { self.0.keys().map(String::as_str) }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

fn read(dir: &Path, name: &str) -> Result<Option<Vec<u8>>> {
  let path = dir.join(name);
  match std::fs::read(&path) {
    Ok(bytes) => Ok(Some(bytes)),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
    Err(source) => Err(Error::Io { path, source }),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn collects_required_and_present_optional() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["icon.png", "logo.png", "logo@2x.png", "unrelated.txt"] {
      std::fs::write(dir.path().join(name), name).unwrap();
    }

    let assets = AssetSet::collect(dir.path()).unwrap();
    let names: Vec<_> = assets.names().collect();
    assert_eq!(names, ["icon.png", "logo.png", "logo@2x.png"]);
  }

  #[test]
  fn missing_logo_is_reported_by_name() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("icon.png"), b"png").unwrap();

    let err = AssetSet::collect(dir.path()).unwrap_err();
    assert!(matches!(&err, Error::MissingAsset(name) if name == "logo.png"), "{err:?}");
  }
}
