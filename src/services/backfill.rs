//! Historical build/deployment events and current metrics for a project.
//!
//! Each of the four pieces (builds, deployments, cycle time, open merge
//! requests) degrades to an empty value on failure, so one broken endpoint
//! never hides the others.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{debug, info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{groups, AppContext, ProjectRef};
use crate::compass::types::{BuildEvent, DeploymentEvent};
use crate::error::{IntegrationError, Result};
use crate::fan_out;
use crate::gitlab::client::{DeploymentFilter, MergeRequestFilter, PipelineFilter};
use crate::gitlab::pagination::fetch_paginated_data;
use crate::gitlab::types::{EnvironmentTier, GitlabProject};
use crate::insights::{self, ProjectMetrics};
use crate::metrics;
use crate::platform::{keys, storage, QueuedJob};

/// Project variable overriding which environment tiers are reported.
pub const DEPLOYMENT_TIERS_VARIABLE: &str = "COMPASS_DEPLOYMENT_TIERS";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillData {
    pub builds: Vec<BuildEvent>,
    pub deployments: Vec<DeploymentEvent>,
    pub metrics: ProjectMetrics,
}

pub fn history_start(days: u32) -> DateTime<Utc> {
    Utc::now() - ChronoDuration::days(i64::from(days))
}

pub async fn project_allowed_tiers(ctx: &AppContext, token: &str, project_id: u64) -> Vec<EnvironmentTier> {
    let variable = fan_out::each_or_default(
        ctx.gitlab
            .get_project_variable(token, project_id, DEPLOYMENT_TIERS_VARIABLE),
        "Deployment tier variable lookup",
    )
    .await;
    insights::allowed_tiers(
        ctx.settings.send_staging_events,
        variable.as_ref().map(|v| v.value.as_str()),
    )
}

pub async fn get_builds(
    ctx: &AppContext,
    token: &str,
    project: &ProjectRef,
    since: DateTime<Utc>,
) -> Result<Vec<BuildEvent>> {
    let Some(branch) = project.default_branch.as_deref() else {
        return Ok(Vec::new());
    };
    let project_id = project.id;
    let filter = PipelineFilter {
        ref_: Some(branch.to_string()),
        updated_after: Some(since),
    };

    let pipelines = fetch_paginated_data(
        move |page, per_page, filter| ctx.gitlab.get_pipelines(token, project_id, page, per_page, filter),
        filter,
        1,
        ctx.settings.per_page,
    )
    .await?;

    Ok(pipelines
        .iter()
        .map(|pipeline| insights::build_event(project_id, &project.name, pipeline))
        .collect())
}

pub async fn get_deployments(
    ctx: &AppContext,
    token: &str,
    project: &ProjectRef,
    since: DateTime<Utc>,
    tiers: &[EnvironmentTier],
) -> Result<Vec<DeploymentEvent>> {
    let project_id = project.id;
    let per_page = ctx.settings.per_page;

    let environments = fetch_paginated_data(
        move |page, per_page, ()| ctx.gitlab.get_environments(token, project_id, page, per_page),
        (),
        1,
        per_page,
    )
    .await?;

    let selected = environments
        .iter()
        .filter(|environment| tiers.contains(&environment.tier));

    let per_environment = fan_out::all_settled(selected.map(|environment| async move {
        let filter = DeploymentFilter {
            environment: Some(environment.name.clone()),
            updated_after: Some(since),
            status: None,
        };
        let deployments = fetch_paginated_data(
            move |page, per_page, filter| {
                ctx.gitlab
                    .get_deployments(token, project_id, page, per_page, filter)
            },
            filter,
            1,
            per_page,
        )
        .await?;

        Ok::<_, IntegrationError>(
            deployments
                .iter()
                .map(|deployment| {
                    insights::deployment_event(project_id, &project.web_url, deployment, environment.tier)
                })
                .collect::<Vec<_>>(),
        )
    }))
    .await?;

    Ok(per_environment.into_iter().flatten().collect())
}

pub async fn get_project_metrics(
    ctx: &AppContext,
    token: &str,
    project: &ProjectRef,
    since: DateTime<Utc>,
) -> ProjectMetrics {
    let Some(branch) = project.default_branch.as_deref() else {
        return ProjectMetrics::default();
    };
    let project_id = project.id;

    let cycle_time = fan_out::each_or_default(
        async {
            let merged = fetch_paginated_data(
                move |page, per_page, filter| {
                    ctx.gitlab
                        .get_merge_requests(token, project_id, page, per_page, filter)
                },
                MergeRequestFilter::merged_into(branch, since),
                1,
                ctx.settings.per_page,
            )
            .await?;
            Ok::<_, IntegrationError>(Some(insights::merge_request_cycle_time(&merged)))
        },
        "Merge request cycle time",
    );

    let open_merge_requests = fan_out::each_or_default(
        async {
            ctx.gitlab
                .get_open_merge_request_count(token, project_id, branch)
                .await
                .map(Some)
        },
        "Open merge request count",
    );

    let (merge_request_cycle_time, open_merge_requests) = tokio::join!(cycle_time, open_merge_requests);
    ProjectMetrics {
        merge_request_cycle_time,
        open_merge_requests,
    }
}

pub async fn get_backfill_data(
    ctx: &AppContext,
    token: &str,
    project: &ProjectRef,
    days: u32,
) -> BackfillData {
    let since = history_start(days);
    let tiers = project_allowed_tiers(ctx, token, project.id).await;

    let (builds, deployments, metrics) = tokio::join!(
        fan_out::each_or_default(get_builds(ctx, token, project, since), "Build history"),
        fan_out::each_or_default(
            get_deployments(ctx, token, project, since, &tiers),
            "Deployment history"
        ),
        get_project_metrics(ctx, token, project, since),
    );

    BackfillData {
        builds,
        deployments,
        metrics,
    }
}

/// Send a project's history and metrics to Compass.
pub async fn backfill_project(ctx: &AppContext, token: &str, project: &ProjectRef) -> Result<()> {
    let data = get_backfill_data(ctx, token, project, ctx.settings.backfill_days).await;
    debug!(
        "Backfilling {}: {} builds, {} deployments",
        project.name,
        data.builds.len(),
        data.deployments.len()
    );

    fan_out::all_settled(data.builds.iter().map(|event| ctx.compass.insert_build_event(event))).await?;
    metrics::increment_compass_events("build", data.builds.len() as u64);

    fan_out::all_settled(
        data.deployments
            .iter()
            .map(|event| ctx.compass.insert_deployment_event(event)),
    )
    .await?;
    metrics::increment_compass_events("deployment", data.deployments.len() as u64);

    let values = data.metrics.to_metric_values(
        project.id,
        &ctx.settings.cycle_time_metric_id,
        &ctx.settings.open_merge_requests_metric_id,
        Utc::now(),
    );
    fan_out::all_settled(values.iter().map(|value| ctx.compass.insert_metric_value(value))).await?;
    metrics::increment_compass_events("metric", values.len() as u64);

    Ok(())
}

pub async fn fetch_all_group_projects(
    ctx: &AppContext,
    token: &str,
    group_id: u64,
) -> Result<Vec<GitlabProject>> {
    fetch_paginated_data(
        move |page, per_page, ()| ctx.gitlab.get_group_projects(token, group_id, page, per_page, None),
        (),
        1,
        ctx.settings.per_page,
    )
    .await
}

/// Random start delay, uniform in `0..=max_jitter_seconds`.
pub fn backfill_delay(max_jitter_seconds: u64) -> Duration {
    Duration::from_secs(rand::rng().random_range(0..=max_jitter_seconds))
}

/// Queue the one-off backfill job when the feature is enabled.
pub async fn schedule_backfill(ctx: &AppContext) -> Result<Option<String>> {
    if !ctx.settings.enable_backfill {
        debug!("Backfill disabled");
        return Ok(None);
    }

    let delay = backfill_delay(ctx.settings.max_jitter_seconds);
    info!("Scheduling backfill in {}s", delay.as_secs());
    ctx.queue.push(QueuedJob::Backfill, Some(delay)).await.map(Some)
}

/// Returns `false` when the stored schema version is already current.
pub async fn run_backfill_job(ctx: &AppContext) -> Result<bool> {
    let current = ctx.settings.backfill_schema_version;
    let stored: Option<u32> = storage::get_as(ctx.store.as_ref(), keys::BACKFILL_SCHEMA_VERSION).await?;
    if stored.is_some_and(|version| version >= current) {
        return Ok(false);
    }

    for group in groups::get_connected_groups(ctx).await? {
        let token = ctx.group_token(group.id).await?;
        let projects = fetch_all_group_projects(ctx, &token, group.id).await?;
        info!("Backfilling {} projects of group {}", projects.len(), group.name);

        for project in &projects {
            let external_id = project.id.to_string();
            match ctx.compass.get_component_by_external_alias(&external_id).await {
                Ok(Some(_)) => {
                    if let Err(e) = backfill_project(ctx, &token, &ProjectRef::from(project)).await {
                        warn!("Backfill of {} failed: {e}", project.path_with_namespace);
                    }
                }
                Ok(None) => debug!("{} has no component, skipping", project.path_with_namespace),
                Err(e) => warn!("Component lookup for {} failed: {e}", project.path_with_namespace),
            }
        }
    }

    storage::set_as(ctx.store.as_ref(), keys::BACKFILL_SCHEMA_VERSION, &current).await?;
    info!("Backfill complete for schema version {current}");
    Ok(true)
}
