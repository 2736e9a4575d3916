//! CLI-specific error types and exit code mapping

use syringe_core::error::{ErrorKind, SyringeError};
use syringe_pipeline::PhylumError;
use syringe_vcs::VcsError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error.
    #[error("{0}")]
    Core(#[from] SyringeError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                   |
    /// |------|-------------------------------------------|
    /// | 0    | Success (including runs with partial failures) |
    /// | 1    | General / command error                   |
    /// | 2    | Configuration error                       |
    /// | 3    | Backend or registry listing failed        |
    /// | 10   | IO error                                  |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Io(_) => 10,
            Self::Core(e) => match e.kind() {
                ErrorKind::Config => 2,
                ErrorKind::BackendUnavailable
                | ErrorKind::AuthenticationError
                | ErrorKind::RateLimited
                | ErrorKind::NotFound
                | ErrorKind::RegistryUnavailable => 3,
                _ => 1,
            },
            Self::JsonSerialize(_) | Self::Command(_) => 1,
        }
    }
}

impl From<VcsError> for CliError {
    fn from(e: VcsError) -> Self {
        Self::Core(e.into())
    }
}

impl From<PhylumError> for CliError {
    fn from(e: PhylumError) -> Self {
        Self::Core(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syringe_core::error::{BackendError, ConfigError};

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("bad".to_owned());
        assert_eq!(err.exit_code(), 2);

        let err: CliError = SyringeError::from(ConfigError::FileNotFound {
            path: "syringe.toml".to_owned(),
        })
        .into();
        assert_eq!(err.exit_code(), 2, "core config errors map to 2");
    }

    #[test]
    fn test_exit_code_listing_failures() {
        let err: CliError = SyringeError::from(BackendError::Authentication("401".to_owned())).into();
        assert_eq!(err.exit_code(), 3);

        let err: CliError = PhylumError::Registry {
            command: "phylum project list --json".to_owned(),
            reason: "exit 1".to_owned(),
        }
        .into();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_vcs_config_is_config() {
        let err: CliError = VcsError::Config {
            field: "vcs.owner".to_owned(),
            reason: "required".to_owned(),
        }
        .into();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_io_error() {
        let err = CliError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"));
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn test_error_display_command() {
        let err = CliError::Command("unknown section: foo".to_owned());
        assert_eq!(err.to_string(), "unknown section: foo");
    }
}
