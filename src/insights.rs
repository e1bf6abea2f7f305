//! Mapping from GitLab CI data to Compass events and metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::compass::types::{
    BuildEvent, BuildState, DeploymentEnvironment, DeploymentEvent, DeploymentState,
    EnvironmentCategory, MetricValue, PipelineRef,
};
use crate::gitlab::links;
use crate::gitlab::types::{Deployment, EnvironmentTier, MergeRequest, Pipeline};

const MAX_LABEL_LENGTH: usize = 40;

/// Current metric values for one project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetrics {
    /// Minutes
    pub merge_request_cycle_time: Option<u64>,
    pub open_merge_requests: Option<u64>,
}

impl ProjectMetrics {
    pub fn to_metric_values(
        &self,
        project_id: u64,
        cycle_time_metric_id: &str,
        open_merge_requests_metric_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Vec<MetricValue> {
        [
            (cycle_time_metric_id, self.merge_request_cycle_time),
            (open_merge_requests_metric_id, self.open_merge_requests),
        ]
        .into_iter()
        .filter_map(|(metric_definition_id, value)| {
            value.map(|value| MetricValue {
                metric_definition_id: metric_definition_id.to_string(),
                external_metric_source_id: project_id.to_string(),
                value: value as f64,
                timestamp,
            })
        })
        .collect()
    }
}

/// Average time from creation to merge over merged merge requests, in whole
/// minutes rounded up. 0 when nothing was merged.
pub fn merge_request_cycle_time(merge_requests: &[MergeRequest]) -> u64 {
    let durations: Vec<i64> = merge_requests
        .iter()
        .filter_map(|mr| mr.merged_at.map(|merged| (merged - mr.created_at).num_seconds()))
        .collect();

    if durations.is_empty() {
        return 0;
    }

    let average_seconds = durations.iter().sum::<i64>() as f64 / durations.len() as f64;
    (average_seconds / 60.0).ceil().max(0.0) as u64
}

/// Lowercase, hyphenate spaces and cap at 40 characters.
pub fn format_labels<I, S>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    labels
        .into_iter()
        .map(|label| {
            label
                .as_ref()
                .to_lowercase()
                .replace(' ', "-")
                .chars()
                .take(MAX_LABEL_LENGTH)
                .collect()
        })
        .collect()
}

pub fn build_state(status: &str) -> BuildState {
    match status {
        "running" | "pending" | "created" => BuildState::InProgress,
        "success" => BuildState::Successful,
        "failed" => BuildState::Failed,
        "canceled" | "skipped" => BuildState::Cancelled,
        _ => BuildState::Unknown,
    }
}

pub fn deployment_state(status: &str) -> DeploymentState {
    match status {
        "running" => DeploymentState::InProgress,
        "success" => DeploymentState::Successful,
        "failed" => DeploymentState::Failed,
        "canceled" => DeploymentState::Cancelled,
        "created" => DeploymentState::Pending,
        _ => DeploymentState::Unknown,
    }
}

pub fn environment_category(tier: EnvironmentTier) -> EnvironmentCategory {
    match tier {
        EnvironmentTier::Production => EnvironmentCategory::Production,
        EnvironmentTier::Staging => EnvironmentCategory::Staging,
        EnvironmentTier::Testing => EnvironmentCategory::Testing,
        EnvironmentTier::Development => EnvironmentCategory::Development,
        EnvironmentTier::Other => EnvironmentCategory::Unmapped,
    }
}

fn is_finished(state: BuildState) -> bool {
    matches!(
        state,
        BuildState::Successful | BuildState::Failed | BuildState::Cancelled
    )
}

pub fn build_event(project_id: u64, project_name: &str, pipeline: &Pipeline) -> BuildEvent {
    let state = build_state(&pipeline.status);
    let display_name = format!("{project_name} pipeline {}", pipeline.id);

    BuildEvent {
        external_event_source_id: project_id.to_string(),
        display_name: display_name.clone(),
        description: format!("Pipeline on {}", pipeline.ref_),
        url: pipeline.web_url.clone(),
        update_sequence_number: pipeline.updated_at.timestamp_millis(),
        last_updated: pipeline.updated_at,
        state,
        pipeline: PipelineRef {
            pipeline_id: pipeline.id.to_string(),
            url: pipeline.web_url.clone(),
            display_name,
        },
        started_at: pipeline.created_at,
        completed_at: is_finished(state).then_some(pipeline.updated_at),
    }
}

pub fn deployment_event(
    project_id: u64,
    project_web_url: &str,
    deployment: &Deployment,
    tier: EnvironmentTier,
) -> DeploymentEvent {
    let environment = &deployment.environment;
    let environment_url = links::environment_url(project_web_url, environment.id);
    let pipeline = deployment
        .deployable
        .as_ref()
        .and_then(|deployable| deployable.pipeline.as_ref());
    let (pipeline_id, pipeline_url) = match pipeline {
        Some(p) => (p.id.to_string(), p.web_url.clone()),
        None => (deployment.id.to_string(), environment_url.clone()),
    };

    DeploymentEvent {
        external_event_source_id: project_id.to_string(),
        display_name: format!("{} deployment {}", environment.name, deployment.iid),
        description: format!("Deployment of {} to {}", deployment.ref_, environment.name),
        url: environment_url,
        update_sequence_number: deployment.updated_at.timestamp_millis(),
        last_updated: deployment.updated_at,
        deployment_sequence_number: deployment.iid,
        state: deployment_state(&deployment.status),
        environment: DeploymentEnvironment {
            category: environment_category(tier),
            display_name: environment.name.clone(),
            environment_id: environment.id.to_string(),
        },
        pipeline: PipelineRef {
            display_name: format!("pipeline {pipeline_id}"),
            pipeline_id,
            url: pipeline_url,
        },
    }
}

/// Tiers whose deployments are reported. A comma separated override wins
/// over the defaults; unknown names in it are ignored.
pub fn allowed_tiers(send_staging_events: bool, override_list: Option<&str>) -> Vec<EnvironmentTier> {
    if let Some(list) = override_list {
        let tiers: Vec<EnvironmentTier> = list
            .split(',')
            .map(str::trim)
            .filter_map(|name| {
                let tier = EnvironmentTier::parse(name);
                (tier != EnvironmentTier::Other || name.eq_ignore_ascii_case("other")).then_some(tier)
            })
            .collect();
        if !tiers.is_empty() {
            return tiers;
        }
    }

    let mut tiers = vec![EnvironmentTier::Production];
    if send_staging_events {
        tiers.push(EnvironmentTier::Staging);
    }
    tiers
}
