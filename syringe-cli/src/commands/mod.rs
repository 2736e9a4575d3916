//! Command handlers -- one module per subcommand

pub mod config;
pub mod list_projects;
pub mod list_repos;
pub mod run;

use std::path::Path;

use syringe_core::config::SyringeConfig;

use crate::error::CliError;

/// Load the effective configuration for a command.
///
/// File values are overridden by `SYRINGE_*` environment variables, then by the
/// `--log-level` flag, and the result is validated.
pub(crate) async fn load_config(
    config_path: &Path,
    log_level: Option<&str>,
) -> Result<SyringeConfig, CliError> {
    let mut config = SyringeConfig::from_file(config_path).await?;
    config.apply_env_overrides();
    if let Some(level) = log_level {
        config.general.log_level = level.to_owned();
    }
    config.validate()?;
    Ok(config)
}
