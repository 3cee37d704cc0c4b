use stampede::core::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Unable to parse config file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unable to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to serialize the run snapshot: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error(transparent)]
    Engine(#[from] stampede::Error),
}

impl RuntimeError {
    /// Process exit status: 2 when the run could not be configured, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_)
            | Self::ConfigFile { .. }
            | Self::Read { .. }
            | Self::Engine(stampede::Error::Config(_)) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_problems_exit_with_two() {
        assert_eq!(RuntimeError::Config(ConfigError::NoTargets).exit_code(), 2);
        assert_eq!(
            RuntimeError::Engine(stampede::Error::Config(ConfigError::NoScenarios)).exit_code(),
            2
        );
        let read = RuntimeError::Read {
            path: PathBuf::from("/nope"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(read.exit_code(), 2);

        let write = RuntimeError::Write {
            path: PathBuf::from("/nope"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(write.exit_code(), 1);
    }
}
