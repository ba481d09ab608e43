//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::{AppConfig, EngineConfig};

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    service = %config.service.name,
    share_floor = %config.market.share_floor,
    dispute_window_s = config.market.dispute_window_seconds,
    admins = config.roles.admins.len(),
    resolvers = config.roles.resolvers.len(),
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig =
    toml::from_str(content).with_context(|| "Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Service identity and scheduling cadence
/// - Liquidity bounds, share floor and trade minimum
/// - Fee rates and vote rules (via the engine record)
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.service.name.is_empty(),
    "service.name must not be empty"
  );
  anyhow::ensure!(
    config.service.aggregation_interval_seconds > 0,
    "aggregation_interval_seconds must be positive"
  );
  anyhow::ensure!(
    config.persistence.snapshot_interval_seconds > 0,
    "snapshot_interval_seconds must be positive"
  );
  anyhow::ensure!(
    !config.persistence.data_dir.is_empty(),
    "persistence.data_dir must not be empty"
  );
  anyhow::ensure!(
    config.roles.admins.iter().all(|a| !a.is_empty()),
    "roles.admins contains an empty id"
  );
  anyhow::ensure!(
    config.roles.resolvers.iter().all(|r| !r.is_empty()),
    "roles.resolvers contains an empty id"
  );

  EngineConfig::from_app(config, 1).context("Invalid engine rules")?;

  Ok(())
}
