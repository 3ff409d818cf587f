//! Keycard server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered with
//! `KEYCARD_*` environment variables, opens the SQLite store, seeds the
//! default promotion codes into an empty store, and serves the JSON API.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `operator.password_hash`:
//!
//! ```text
//! cargo run -p keycard-server -- hash-password
//! ```

mod config;

use std::{
  net::SocketAddr,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHash, PasswordHasher, password_hash::SaltString};
use clap::{Parser, Subcommand};
use keycard_api::AppState;
use keycard_core::{enrollment::EnrollmentPolicy, resolver, serial::RandomSerials};
use keycard_store_sqlite::SqliteStore;
use rand_core::OsRng;
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

#[derive(Parser)]
#[command(author, version, about = "Keycard membership pass server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml", global = true)]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Default)]
enum Command {
  /// Serve the HTTP API (default).
  #[default]
  Serve,
  /// Print the argon2 hash for a password entered on stdin and exit.
  HashPassword,
  /// Validate the configuration, signing files and pass assets, then exit.
  CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  match cli.command.unwrap_or_default() {
    Command::HashPassword => hash_password(),
    Command::CheckConfig => check_config(&config::load(&cli.config)?),
    Command::Serve => serve(config::load(&cli.config)?).await,
  }
}

async fn serve(cfg: ServerConfig) -> anyhow::Result<()> {
  let policy = EnrollmentPolicy {
    default_discount: cfg.enrollment.default_discount()?,
  };

  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  resolver::seed_defaults(&store)
    .await
    .context("failed to seed default promotion codes")?;

  // Enrollment works without signing credentials; downloads report the gap.
  if let Err(e) = cfg.pass.check() {
    warn!(error = %e, "pass issuance is not ready");
  }
  if !cfg.operator.is_configured() {
    warn!("no operator configured; scan and admin routes will reject every request");
  }

  let state = AppState {
    store:    Arc::new(store),
    serials:  Arc::new(RandomSerials),
    policy,
    issuer:   Arc::new(cfg.pass.clone()),
    operator: Arc::new(cfg.operator.clone()),
    base_url: Arc::from(cfg.base_url.as_str()),
  };

  let app = keycard_api::router(state).layer(TraceLayer::new_for_http());
  let address = format!("{}:{}", cfg.host, cfg.port);

  info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(
    listener,
    app.into_make_service_with_connect_info::<SocketAddr>(),
  )
  .with_graceful_shutdown(shutdown_signal())
  .await
  .context("server error")?;

  info!("server stopped");
  Ok(())
}

fn hash_password() -> anyhow::Result<()> {
  let password = read_password()?;
  let salt = SaltString::generate(&mut OsRng);
  let hash = Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
    .to_string();
  println!("{hash}");
  Ok(())
}

fn check_config(cfg: &ServerConfig) -> anyhow::Result<()> {
  cfg.enrollment.default_discount()?;
  PasswordHash::new(&cfg.operator.password_hash)
    .map_err(|e| anyhow::anyhow!("operator.password_hash is not a PHC string: {e}"))?;

  let issuer = cfg.pass.check().context("pass configuration")?;
  let assets = issuer.assets().context("pass assets")?;
  println!(
    "configuration OK: team {}, pass type {}, {} assets ({})",
    issuer.template().team_id,
    issuer.template().pass_type_id,
    assets.len(),
    assets.names().collect::<Vec<_>>().join(", "),
  );
  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = signal::ctrl_c().await {
      warn!(error = %e, "failed to install Ctrl+C handler");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
      Ok(mut sig) => {
        sig.recv().await;
      }
      Err(e) => {
        warn!(error = %e, "failed to install SIGTERM handler");
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    () = ctrl_c => info!("ctrl_c signal received"),
    () = terminate => info!("terminate signal received"),
  }
}
