//! Atlassian Resource Identifiers.
//!
//! Format: `ari:cloud:<owner>:<cloudId>:<resourceType>/<a>/<b>`. The cloud id
//! may be empty (global resources such as built-in metric definitions); every
//! other segment must be present.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const PREFIX: &str = "ari:cloud:";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid ARI: {0}")]
pub struct InvalidAriError(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ari {
    pub resource_owner: String,
    pub cloud_id: String,
    pub resource_type: String,
    /// `<a>/<b>`
    pub resource_id: String,
}

impl Ari {
    pub fn parse(value: &str) -> Result<Self, InvalidAriError> {
        let invalid = || InvalidAriError(value.to_string());

        let rest = value.strip_prefix(PREFIX).ok_or_else(invalid)?;

        let mut parts = rest.splitn(3, ':');
        let (Some(owner), Some(cloud_id), Some(resource)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        if owner.is_empty() || resource.contains(':') {
            return Err(invalid());
        }

        let segments: Vec<&str> = resource.split('/').collect();
        let [resource_type, first, second] = segments.as_slice() else {
            return Err(invalid());
        };
        if [resource_type, first, second].iter().any(|s| s.is_empty()) {
            return Err(invalid());
        }

        Ok(Self {
            resource_owner: owner.to_string(),
            cloud_id: cloud_id.to_string(),
            resource_type: (*resource_type).to_string(),
            resource_id: format!("{first}/{second}"),
        })
    }
}

impl FromStr for Ari {
    type Err = InvalidAriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Ari {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{PREFIX}{}:{}:{}/{}",
            self.resource_owner, self.cloud_id, self.resource_type, self.resource_id
        )
    }
}
