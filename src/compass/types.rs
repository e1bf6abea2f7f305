use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cac::{CompassYaml, ComponentType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub type_id: Option<String>,
    /// Present when the component is managed by a `compass.yml` file
    #[serde(default)]
    pub data_manager: Option<DataManager>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataManager {
    pub ecosystem_app_id: Option<String>,
    pub external_source_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentLinkInput {
    #[serde(rename = "type")]
    pub link_type: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateComponentInput {
    pub name: String,
    pub description: Option<String>,
    pub component_type: ComponentType,
    pub labels: Vec<String>,
    pub links: Vec<ComponentLinkInput>,
}

/// Push a `compass.yml` file's content onto the component it names.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncComponentInput {
    pub config: CompassYaml,
    /// GitLab project id
    pub external_source_id: String,
    pub file_path: String,
    pub file_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnlinkComponentInput {
    pub component_id: String,
    pub external_source_id: String,
    pub file_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildState {
    InProgress,
    Successful,
    Failed,
    Cancelled,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentState {
    Pending,
    InProgress,
    Successful,
    Failed,
    Cancelled,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvironmentCategory {
    Production,
    Staging,
    Testing,
    Development,
    Unmapped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRef {
    pub pipeline_id: String,
    pub url: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildEvent {
    pub external_event_source_id: String,
    pub display_name: String,
    pub description: String,
    pub url: String,
    pub update_sequence_number: i64,
    pub last_updated: DateTime<Utc>,
    pub state: BuildState,
    pub pipeline: PipelineRef,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentEnvironment {
    pub category: EnvironmentCategory,
    pub display_name: String,
    pub environment_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentEvent {
    pub external_event_source_id: String,
    pub display_name: String,
    pub description: String,
    pub url: String,
    pub update_sequence_number: i64,
    pub last_updated: DateTime<Utc>,
    pub deployment_sequence_number: u64,
    pub state: DeploymentState,
    pub environment: DeploymentEnvironment,
    pub pipeline: PipelineRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValue {
    pub metric_definition_id: String,
    /// GitLab project id
    pub external_metric_source_id: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}
