use thiserror::Error;

/// Malformed or inconsistent run configuration. Always detected before any load is generated.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No scenarios configured.")]
    NoScenarios,

    #[error("Target list is empty.")]
    NoTargets,

    #[error("{targets} targets but {distributions} distribution entries.")]
    DistributionMismatch { targets: usize, distributions: usize },

    #[error("Distribution weights sum to zero.")]
    ZeroWeights,

    #[error("Scenario name must not be empty.")]
    EmptyName,

    #[error("Duplicate scenario name `{0}`.")]
    DuplicateScenario(String),

    #[error("Scenario `{scenario}`: {reason}")]
    InvalidScenario { scenario: String, reason: String },

    #[error("Invalid endpoint url `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Malformed target manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Malformed target `{0}`.")]
    MalformedTarget(String),

    #[error("Report interval must be non-zero.")]
    ZeroReportInterval,
}

impl ConfigError {
    pub(crate) fn scenario(scenario: &str, reason: impl Into<String>) -> Self {
        Self::InvalidScenario {
            scenario: scenario.to_string(),
            reason: reason.into(),
        }
    }
}
