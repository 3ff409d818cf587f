//! Issuer settings and the [`Issuer`] they produce once checked.

use std::path::{Path, PathBuf};

use keycard_core::holder::Holder;
use serde::Deserialize;

use crate::{
  Error, Result,
  archive::package,
  assets::AssetSet,
  payload::{Colors, PassTemplate},
  signer::Pkcs7Signer,
};

/// The `[pass]` section of the server configuration.
///
/// Every field may be absent at load time; [`IssuerConfig::check`] decides
/// whether the issuer can actually sign.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct IssuerConfig {
  pub pkcs12_path:       Option<PathBuf>,
  pub intermediate_path: Option<PathBuf>,
  pub pkcs12_password:   Option<String>,
  pub team_id:           Option<String>,
  pub pass_type_id:      Option<String>,
  pub assets_dir:        PathBuf,
  pub organization_name: String,
  pub description:       String,
  pub colors:            Colors,
  pub terms:             String,
  pub contact:           String,
}

impl Default for IssuerConfig {
  fn default() -> Self {
    Self {
      pkcs12_path:       None,
      intermediate_path: None,
      pkcs12_password:   None,
      team_id:           None,
      pass_type_id:      None,
      assets_dir:        PathBuf::from("assets"),
      organization_name: "Keycard".into(),
      description:       "Membership Card".into(),
      colors:            Colors::default(),
      terms:             String::new(),
      contact:           String::new(),
    }
  }
}

impl std::fmt::Debug for IssuerConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("IssuerConfig")
      .field("pkcs12_path", &self.pkcs12_path)
      .field("intermediate_path", &self.intermediate_path)
      .field("pkcs12_password", &self.pkcs12_password.as_ref().map(|_| "<redacted>"))
      .field("team_id", &self.team_id)
      .field("pass_type_id", &self.pass_type_id)
      .field("assets_dir", &self.assets_dir)
      .field("organization_name", &self.organization_name)
      .finish_non_exhaustive()
  }
}

impl IssuerConfig {
  /// Check that every signing setting is present and both certificate files
  /// exist.
  pub fn check(&self) -> Result<Issuer> {
    let pkcs12_path = required_path(&self.pkcs12_path, "pkcs12_path")?;
    let intermediate_path = required_path(&self.intermediate_path, "intermediate_path")?;
    let password = required(&self.pkcs12_password, "pkcs12_password")?;
    let team_id = required(&self.team_id, "team_id")?;
    let pass_type_id = required(&self.pass_type_id, "pass_type_id")?;

    for path in [pkcs12_path, intermediate_path] {
      if !path.is_file() {
        return Err(Error::CertificateMissing(path.to_owned()));
      }
    }

    Ok(Issuer {
      template:   PassTemplate {
        organization_name: self.organization_name.clone(),
        description:       self.description.clone(),
        pass_type_id:      pass_type_id.to_owned(),
        team_id:           team_id.to_owned(),
        colors:            self.colors.clone(),
        terms:             self.terms.clone(),
        contact:           self.contact.clone(),
      },
      signer:     Pkcs7Signer::new(pkcs12_path, intermediate_path, password),
      assets_dir: self.assets_dir.clone(),
    })
  }
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str> {
  value
    .as_deref()
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .ok_or(Error::ConfigurationIncomplete(name))
}

fn required_path<'a>(value: &'a Option<PathBuf>, name: &'static str) -> Result<&'a Path> {
  value
    .as_deref()
    .filter(|p| !p.as_os_str().is_empty())
    .ok_or(Error::ConfigurationIncomplete(name))
}

/// A fully configured pass issuer.
#[derive(Debug, Clone)]
pub struct Issuer {
  template:   PassTemplate,
  signer:     Pkcs7Signer,
  assets_dir: PathBuf,
}

impl Issuer {
  pub fn template(&self) -> &PassTemplate { &self.template }

  /// Read the asset directory; fails if a required asset is missing.
  pub fn assets(&self) -> Result<AssetSet> { AssetSet::collect(&self.assets_dir) }

  /// Build and sign the archive for `holder`.
  pub fn issue(&self, holder: &Holder) -> Result<Vec<u8>> {
    let assets = self.assets()?;
    package(&self.template, holder, &assets, &self.signer)
  }
}
