use chrono::{DateTime, SecondsFormat, Utc};

use super::core::{GitlabClient, QueryParams};
use crate::error::Result;
use crate::gitlab::pagination::Page;
use crate::gitlab::types::{Deployment, Environment, Pipeline};

#[derive(Debug, Clone, Default)]
pub struct PipelineFilter {
    pub ref_: Option<String>,
    pub updated_after: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct DeploymentFilter {
    pub environment: Option<String>,
    pub updated_after: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

fn timestamp(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

impl GitlabClient {
    pub async fn get_pipelines(
        &self,
        token: &str,
        project_id: u64,
        page: u32,
        per_page: u32,
        filter: PipelineFilter,
    ) -> Result<Page<Pipeline>> {
        let path = QueryParams::new()
            .push_opt("ref", filter.ref_.as_deref())
            .push_opt("updated_after", timestamp(filter.updated_after))
            .push("page", page)
            .push("per_page", per_page)
            .apply(&format!("projects/{project_id}/pipelines"));
        self.get_json(&path, token).await
    }

    pub async fn get_environments(
        &self,
        token: &str,
        project_id: u64,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Environment>> {
        let path = QueryParams::new()
            .push("page", page)
            .push("per_page", per_page)
            .apply(&format!("projects/{project_id}/environments"));
        self.get_json(&path, token).await
    }

    pub async fn get_deployments(
        &self,
        token: &str,
        project_id: u64,
        page: u32,
        per_page: u32,
        filter: DeploymentFilter,
    ) -> Result<Page<Deployment>> {
        // GitLab requires order_by=updated_at when filtering on updated_after.
        let path = QueryParams::new()
            .push_opt("environment", filter.environment.as_deref())
            .push_opt("status", filter.status.as_deref())
            .push_opt("updated_after", timestamp(filter.updated_after))
            .push("order_by", "updated_at")
            .push("page", page)
            .push("per_page", per_page)
            .apply(&format!("projects/{project_id}/deployments"));
        self.get_json(&path, token).await
    }
}
