//! The `manifest.json` member: a digest of every other archive member.

use std::collections::BTreeMap;

use sha1::{Digest as _, Sha1};

use crate::Result;

/// Member name to lowercase hex SHA-1 digest.
///
/// Keys are kept sorted, so the serialised form depends only on the member
/// contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest(BTreeMap<String, String>);

impl Manifest {
  pub fn build<'a>(members: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> Self {
    Self(
      members
        .into_iter()
        .map(|(name, bytes)| (name.to_owned(), hex::encode(Sha1::digest(bytes))))
        .collect(),
    )
  }

  pub fn digest(&self, name: &str) -> Option<&str> {
    self.0.get(name).map(String::as_str)
  }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn to_json(&self) -> Result<Vec<u8>> { Ok(serde_json::to_vec(&self.0)?) }
}
