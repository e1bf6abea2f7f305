//! GitLab webhook payloads.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{IntegrationError, Result};
use crate::gitlab::types::{Deployable, Deployment, Environment, EnvironmentTier, Pipeline};

/// A webhook delivery, dispatched on `object_kind`.
#[derive(Debug, Clone)]
pub enum GitlabEvent {
    Push(PushEvent),
    MergeRequest(MergeRequestEvent),
    Pipeline(PipelineEvent),
    Deployment(DeploymentEvent),
    Unrecognized(String),
}

impl GitlabEvent {
    /// Malformed JSON, a missing `object_kind` or a known kind with the wrong
    /// shape are all payload errors. Unknown kinds are not.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| IntegrationError::ParseWebhookEventPayload(e.to_string()))?;

        let kind = value
            .get("object_kind")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                IntegrationError::ParseWebhookEventPayload("missing object_kind".to_string())
            })?
            .to_string();

        let event = match kind.as_str() {
            "push" => serde_json::from_value(value).map(Self::Push),
            "merge_request" => serde_json::from_value(value).map(Self::MergeRequest),
            "pipeline" => serde_json::from_value(value).map(Self::Pipeline),
            "deployment" => serde_json::from_value(value).map(Self::Deployment),
            _ => return Ok(Self::Unrecognized(kind)),
        };

        event.map_err(|e| IntegrationError::ParseWebhookEventPayload(format!("{kind}: {e}")))
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Push(_) => "push",
            Self::MergeRequest(_) => "merge_request",
            Self::Pipeline(_) => "pipeline",
            Self::Deployment(_) => "deployment",
            Self::Unrecognized(kind) => kind,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HookProject {
    pub id: u64,
    pub name: String,
    pub web_url: String,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub path_with_namespace: Option<String>,
}

impl HookProject {
    pub fn is_default_branch(&self, branch: &str) -> bool {
        self.default_branch.as_deref() == Some(branch)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushCommit {
    pub id: String,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    pub before: String,
    pub after: String,
    #[serde(rename = "ref")]
    pub ref_: String,
    pub project: HookProject,
    #[serde(default)]
    pub commits: Vec<PushCommit>,
}

impl PushEvent {
    /// Branch name, or `None` for tag pushes.
    pub fn branch(&self) -> Option<&str> {
        self.ref_.strip_prefix("refs/heads/")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeRequestAttributes {
    pub iid: u64,
    pub target_branch: String,
    pub source_branch: String,
    pub state: String,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeRequestEvent {
    pub project: HookProject,
    pub object_attributes: MergeRequestAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineAttributes {
    pub id: u64,
    #[serde(default)]
    pub iid: Option<u64>,
    #[serde(rename = "ref")]
    pub ref_: String,
    #[serde(default)]
    pub sha: String,
    pub status: String,
    #[serde(deserialize_with = "gitlab_time")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "optional_gitlab_time")]
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineEvent {
    pub project: HookProject,
    pub object_attributes: PipelineAttributes,
}

impl PipelineEvent {
    /// The pipeline as the REST API would describe it.
    pub fn to_pipeline(&self) -> Pipeline {
        let attributes = &self.object_attributes;
        Pipeline {
            id: attributes.id,
            iid: attributes.iid,
            status: attributes.status.clone(),
            ref_: attributes.ref_.clone(),
            sha: attributes.sha.clone(),
            web_url: crate::gitlab::links::pipeline_url(&self.project.web_url, attributes.id),
            created_at: attributes.created_at,
            updated_at: attributes.finished_at.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentEvent {
    pub deployment_id: u64,
    #[serde(default)]
    pub deployable_id: Option<u64>,
    pub status: String,
    #[serde(deserialize_with = "gitlab_time")]
    pub status_changed_at: DateTime<Utc>,
    pub environment: String,
    #[serde(default)]
    pub environment_tier: Option<String>,
    #[serde(rename = "ref", default)]
    pub ref_: String,
    #[serde(default)]
    pub short_sha: String,
    pub project: HookProject,
}

impl DeploymentEvent {
    /// The deployment as the REST API would describe it. The environment id
    /// is not part of the payload and must be looked up separately.
    pub fn to_deployment(&self, environment_id: u64, tier: EnvironmentTier) -> Deployment {
        Deployment {
            id: self.deployment_id,
            iid: self.deployment_id,
            status: self.status.clone(),
            ref_: self.ref_.clone(),
            sha: self.short_sha.clone(),
            created_at: self.status_changed_at,
            updated_at: self.status_changed_at,
            environment: Environment {
                id: environment_id,
                name: self.environment.clone(),
                tier,
                state: None,
            },
            deployable: self.deployable_id.map(|id| Deployable { id, pipeline: None }),
        }
    }
}

/// Webhook timestamps come as RFC 3339, `2016-08-12 15:23:28 UTC` or
/// `2021-04-28 21:50:00 +0200` depending on the hook.
fn parse_gitlab_time(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Some(time.with_timezone(&Utc));
    }
    if let Some(naive) = value.strip_suffix(" UTC") {
        return NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S")
            .ok()
            .map(|t| t.and_utc());
    }
    DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S %z")
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn gitlab_time<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_gitlab_time(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized timestamp: {raw}")))
}

fn optional_gitlab_time<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_gitlab_time(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognized timestamp: {raw}"))),
        None => Ok(None),
    }
}
