//! Turning pipeline, deployment and merge request hooks into Compass events
//! and metric values.

use chrono::Utc;
use log::debug;

use super::{backfill, AppContext, ProjectRef};
use crate::error::Result;
use crate::fan_out;
use crate::gitlab::pagination::fetch_paginated_data;
use crate::gitlab::types::EnvironmentTier;
use crate::insights;
use crate::metrics;
use crate::webhook::events::{DeploymentEvent, HookProject, MergeRequestEvent, PipelineEvent};

async fn has_component(ctx: &AppContext, project: &HookProject) -> Result<bool> {
    let component = ctx
        .compass
        .get_component_by_external_alias(&project.id.to_string())
        .await?;
    if component.is_none() {
        debug!("{} has no component, dropping event", project.web_url);
    }
    Ok(component.is_some())
}

/// Returns whether a build event was sent.
pub async fn handle_pipeline(ctx: &AppContext, event: &PipelineEvent) -> Result<bool> {
    let project = &event.project;
    if !project.is_default_branch(&event.object_attributes.ref_) {
        debug!("Ignoring pipeline on {}", event.object_attributes.ref_);
        return Ok(false);
    }
    if !has_component(ctx, project).await? {
        return Ok(false);
    }

    let build = insights::build_event(project.id, &project.name, &event.to_pipeline());
    ctx.compass.insert_build_event(&build).await?;
    metrics::increment_compass_events("build", 1);
    Ok(true)
}

/// Returns whether a deployment event was sent.
pub async fn handle_deployment(ctx: &AppContext, group_id: u64, event: &DeploymentEvent) -> Result<bool> {
    let project = &event.project;
    if !has_component(ctx, project).await? {
        return Ok(false);
    }

    let token = ctx.group_token(group_id).await?;
    let project_id = project.id;
    let environments = fetch_paginated_data(
        |page, per_page, ()| ctx.gitlab.get_environments(&token, project_id, page, per_page),
        (),
        1,
        ctx.settings.per_page,
    )
    .await?;
    let environment = environments.iter().find(|e| e.name == event.environment);

    let tier = event
        .environment_tier
        .as_deref()
        .map(EnvironmentTier::parse)
        .or(environment.map(|e| e.tier))
        .unwrap_or_default();

    let allowed = backfill::project_allowed_tiers(ctx, &token, project_id).await;
    if !allowed.contains(&tier) {
        debug!("Ignoring deployment to {} ({tier:?})", event.environment);
        return Ok(false);
    }

    // The payload has no environment id; 0 stands in when the environment
    // is no longer listed.
    let environment_id = environment.map_or(0, |e| e.id);
    let deployment = event.to_deployment(environment_id, tier);
    let compass_event = insights::deployment_event(project_id, &project.web_url, &deployment, tier);
    ctx.compass.insert_deployment_event(&compass_event).await?;
    metrics::increment_compass_events("deployment", 1);
    Ok(true)
}

/// Recompute the merge request metrics after a change targeting the
/// default branch. Returns the number of metric values sent.
pub async fn handle_merge_request(ctx: &AppContext, group_id: u64, event: &MergeRequestEvent) -> Result<usize> {
    let project = &event.project;
    if !project.is_default_branch(&event.object_attributes.target_branch) {
        return Ok(0);
    }
    if !has_component(ctx, project).await? {
        return Ok(0);
    }

    let token = ctx.group_token(group_id).await?;
    let since = backfill::history_start(ctx.settings.backfill_days);
    let project_metrics = backfill::get_project_metrics(ctx, &token, &ProjectRef::from(project), since).await;

    let values = project_metrics.to_metric_values(
        project.id,
        &ctx.settings.cycle_time_metric_id,
        &ctx.settings.open_merge_requests_metric_id,
        Utc::now(),
    );
    fan_out::all_settled(values.iter().map(|value| ctx.compass.insert_metric_value(value))).await?;
    metrics::increment_compass_events("metric", values.len() as u64);
    Ok(values.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compass::types::{BuildState, DeploymentState, EnvironmentCategory};
    use crate::services::testing::{connect, fixture, FakeCompass};
    use crate::webhook::events::GitlabEvent;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn project(url: &str) -> serde_json::Value {
        json!({
            "id": 42,
            "name": "billing",
            "web_url": format!("{url}/platform/billing"),
            "default_branch": "main"
        })
    }

    fn pipeline(url: &str, ref_: &str) -> PipelineEvent {
        let body = json!({
            "object_kind": "pipeline",
            "object_attributes": {
                "id": 31, "ref": ref_, "sha": "abc", "status": "running",
                "created_at": "2024-01-01 10:00:00 UTC"
            },
            "project": project(url)
        });
        match GitlabEvent::parse(body.to_string().as_bytes()).unwrap() {
            GitlabEvent::Pipeline(event) => event,
            other => panic!("unexpected {}", other.kind()),
        }
    }

    fn deployment(url: &str, tier: Option<&str>) -> DeploymentEvent {
        let body = json!({
            "object_kind": "deployment",
            "status": "success",
            "status_changed_at": "2024-01-01 10:00:00 UTC",
            "deployment_id": 15,
            "environment": "prod",
            "environment_tier": tier,
            "ref": "main",
            "short_sha": "abc",
            "project": project(url)
        });
        match GitlabEvent::parse(body.to_string().as_bytes()).unwrap() {
            GitlabEvent::Deployment(event) => event,
            other => panic!("unexpected {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn pipeline_on_default_branch_becomes_build_event() {
        let server = Server::new_async().await;
        let f = fixture(&server.url(), FakeCompass::with_component("42", "component-1"));

        assert!(!handle_pipeline(&f.ctx, &pipeline(&server.url(), "feature")).await.unwrap());
        assert!(handle_pipeline(&f.ctx, &pipeline(&server.url(), "main")).await.unwrap());

        let builds = f.compass.builds.lock().unwrap();
        assert_eq!(builds.len(), 1);
        assert_eq!(builds[0].state, BuildState::InProgress);
        assert_eq!(builds[0].completed_at, None);
    }

    #[tokio::test]
    async fn events_for_projects_without_component_are_dropped() {
        let server = Server::new_async().await;
        let f = fixture(&server.url(), FakeCompass::default());
        assert!(!handle_pipeline(&f.ctx, &pipeline(&server.url(), "main")).await.unwrap());
        assert!(f.compass.builds.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deployment_tier_falls_back_to_environment_list() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v4/projects/42/environments")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"id":5,"name":"prod","tier":"production"}]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v4/projects/42/variables/COMPASS_DEPLOYMENT_TIERS")
            .with_status(404)
            .create_async()
            .await;

        let f = fixture(&server.url(), FakeCompass::with_component("42", "component-1"));
        connect(&f.store, 7).await;

        assert!(handle_deployment(&f.ctx, 7, &deployment(&server.url(), None)).await.unwrap());
        let deployments = f.compass.deployments.lock().unwrap();
        assert_eq!(deployments[0].state, DeploymentState::Successful);
        assert_eq!(deployments[0].environment.category, EnvironmentCategory::Production);
        assert_eq!(deployments[0].environment.environment_id, "5");
    }

    #[tokio::test]
    async fn deployments_outside_allowed_tiers_are_skipped() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v4/projects/42/environments")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"[{"id":5,"name":"prod","tier":"production"}]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/v4/projects/42/variables/COMPASS_DEPLOYMENT_TIERS")
            .with_status(200)
            .with_body(r#"{"key":"COMPASS_DEPLOYMENT_TIERS","value":"testing"}"#)
            .create_async()
            .await;

        let f = fixture(&server.url(), FakeCompass::with_component("42", "component-1"));
        connect(&f.store, 7).await;

        assert!(!handle_deployment(&f.ctx, 7, &deployment(&server.url(), Some("staging")))
            .await
            .unwrap());
        assert!(f.compass.deployments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn merge_request_into_default_branch_sends_metrics() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v4/projects/42/merge_requests")
            .match_query(Matcher::UrlEncoded("state".into(), "merged".into()))
            .with_status(200)
            .with_body(
                r#"[{"iid":1,"created_at":"2024-01-01T10:00:00Z","merged_at":"2024-01-01T10:30:00Z",
                    "state":"merged","target_branch":"main","source_branch":"a"}]"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/api/v4/projects/42/merge_requests")
            .match_query(Matcher::UrlEncoded("state".into(), "opened".into()))
            .with_status(200)
            .with_header("x-total", "3")
            .with_body("[]")
            .create_async()
            .await;

        let f = fixture(&server.url(), FakeCompass::with_component("42", "component-1"));
        connect(&f.store, 7).await;
        let event: MergeRequestEvent = serde_json::from_value(json!({
            "project": project(&server.url()),
            "object_attributes": {
                "iid": 1, "target_branch": "main", "source_branch": "a",
                "state": "merged", "action": "merge"
            }
        }))
        .unwrap();

        assert_eq!(handle_merge_request(&f.ctx, 7, &event).await.unwrap(), 2);
        let values = f.compass.metric_values.lock().unwrap();
        let by_id = |id: &str| values.iter().find(|v| v.metric_definition_id == id).map(|v| v.value);
        assert_eq!(by_id(&f.ctx.settings.cycle_time_metric_id), Some(30.0));
        assert_eq!(by_id(&f.ctx.settings.open_merge_requests_metric_id), Some(3.0));
    }
}
