use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An endpoint under test.
///
/// Manifests use `{"hostname": ..., "ip": ...}` records; `address` is the host (name or IP) the
/// requests are sent to and `hostname` is the label results are reported under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    pub hostname: String,
    #[serde(alias = "ip")]
    pub address: String,
}

impl Target {
    pub fn new(hostname: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            address: address.into(),
        }
    }

    /// A target labelled by its own address.
    pub fn from_address(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            hostname: address.clone(),
            address,
        }
    }

    /// Parse a JSON manifest: an ordered array of `{hostname, ip}` records.
    pub fn from_manifest(json: &str) -> Result<Vec<Target>, ConfigError> {
        let targets: Vec<Target> = serde_json::from_str(json)?;
        if targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        for target in &targets {
            target.validate()?;
        }
        Ok(targets)
    }

    /// Parse a comma separated list of addresses, e.g. the `TARGETS` environment value.
    pub fn from_list(list: &str) -> Result<Vec<Target>, ConfigError> {
        let targets = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Target::from_address)
            .collect::<Vec<_>>();

        if targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        for target in &targets {
            target.validate()?;
        }
        Ok(targets)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let bad = |s: &str| s.is_empty() || s.chars().any(char::is_whitespace);
        if bad(&self.hostname) || bad(&self.address) {
            Err(ConfigError::MalformedTarget(format!(
                "{}/{}",
                self.hostname, self.address
            )))
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hostname == self.address {
            write!(f, "{}", self.address)
        } else {
            write!(f, "{} ({})", self.hostname, self.address)
        }
    }
}
