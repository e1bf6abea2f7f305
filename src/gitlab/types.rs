use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Group role a token carries. Only the two roles that can manage hooks are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Maintainer,
    Owner,
}

impl AccessLevel {
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            50 => Some(Self::Owner),
            40 => Some(Self::Maintainer),
            _ => None,
        }
    }

    pub fn level(self) -> u8 {
        match self {
            Self::Maintainer => 40,
            Self::Owner => 50,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Maintainer => "maintainer",
            Self::Owner => "owner",
        }
    }
}

/// A GitLab namespace connected to the integration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GitlabGroup {
    pub id: u64,
    pub name: String,
    pub path: String,
    pub full_name: String,
    #[serde(default)]
    pub full_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupAccessToken {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Raw GitLab access level (40 = Maintainer, 50 = Owner)
    pub access_level: u8,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub revoked: bool,
    pub expires_at: Option<NaiveDate>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Namespace {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub full_path: String,
}

/// A GitLab repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GitlabProject {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub default_branch: Option<String>,
    pub namespace: Namespace,
    pub web_url: String,
    #[serde(default)]
    pub path_with_namespace: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeRequestState {
    Opened,
    Merged,
    Closed,
    Locked,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    pub iid: u64,
    #[serde(default)]
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub state: MergeRequestState,
    pub target_branch: String,
    pub source_branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: u64,
    #[serde(default)]
    pub iid: Option<u64>,
    pub status: String,
    #[serde(rename = "ref")]
    pub ref_: String,
    #[serde(default)]
    pub sha: String,
    pub web_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Environment classification used to pick which deployments are reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentTier {
    Production,
    Staging,
    Testing,
    Development,
    #[default]
    #[serde(other)]
    Other,
}

impl EnvironmentTier {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "production" => Self::Production,
            "staging" => Self::Staging,
            "testing" => Self::Testing,
            "development" => Self::Development,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub tier: EnvironmentTier,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: u64,
    pub iid: u64,
    pub status: String,
    #[serde(rename = "ref", default)]
    pub ref_: String,
    #[serde(default)]
    pub sha: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub environment: Environment,
    /// The CI job that ran the deployment
    #[serde(default)]
    pub deployable: Option<Deployable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployable {
    pub id: u64,
    #[serde(default)]
    pub pipeline: Option<DeployablePipeline>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployablePipeline {
    pub id: u64,
    pub web_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitlabHook {
    pub id: u64,
    pub url: String,
    #[serde(default)]
    pub push_events: bool,
    #[serde(default)]
    pub merge_requests_events: bool,
    #[serde(default)]
    pub pipeline_events: bool,
    #[serde(default)]
    pub deployment_events: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchCommit {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub commit: BranchCommit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectVariable {
    pub key: String,
    pub value: String,
}
