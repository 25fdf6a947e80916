use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Upstream data providers known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Financial Modeling Prep style ratio REST API.
    Fmp,
    /// Yahoo Finance style info/history API.
    Yahoo,
}

impl ProviderId {
    pub const ALL: [Self; 2] = [Self::Fmp, Self::Yahoo];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fmp => "fmp",
            Self::Yahoo => "yahoo",
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fmp" => Ok(Self::Fmp),
            "yahoo" => Ok(Self::Yahoo),
            other => Err(ValidationError::InvalidProvider {
                value: other.to_owned(),
            }),
        }
    }
}

/// Parses a comma separated provider preference list such as `fmp,yahoo`.
pub fn parse_provider_order(value: &str) -> Result<Vec<ProviderId>, ValidationError> {
    value
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(ProviderId::from_str)
        .collect()
}
