//! Server configuration, deserialised from `config.toml` and `KEYCARD_*`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use keycard_api::OperatorConfig;
use keycard_core::{Percent, enrollment::DEFAULT_DISCOUNT};
use keycard_pass::IssuerConfig;
use serde::Deserialize;

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  /// Public origin used in download references.
  pub base_url:   String,
  pub operator:   OperatorConfig,
  pub enrollment: EnrollmentConfig,
  pub pass:       IssuerConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".into(),
      port:       8080,
      store_path: PathBuf::from("keycard.db"),
      base_url:   "http://localhost:8080".into(),
      operator:   OperatorConfig::default(),
      enrollment: EnrollmentConfig::default(),
      pass:       IssuerConfig::default(),
    }
  }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct EnrollmentConfig {
  /// Discount for holders enrolling without a usable promotion code.
  pub default_discount: i64,
}

impl Default for EnrollmentConfig {
  fn default() -> Self {
    Self { default_discount: i64::from(DEFAULT_DISCOUNT.get()) }
  }
}

impl EnrollmentConfig {
  pub fn default_discount(&self) -> anyhow::Result<Percent> {
    Percent::new(self.default_discount).context("invalid enrollment.default_discount")
  }
}

/// Layer the optional TOML file at `path` under `KEYCARD_*` variables.
///
/// Nested keys use a double underscore, e.g. `KEYCARD_PASS__TEAM_ID`.
pub fn load(path: &Path) -> anyhow::Result<ServerConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix("KEYCARD")
        .prefix_separator("_")
        .separator("__"),
    )
    .build()
    .context("failed to read config file")?;

  settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")
}
