//! On-demand history for a repository link added to a component.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::backfill::{self, BackfillData};
use super::{groups, AppContext, ProjectRef};
use crate::compass::types::{BuildEvent, DeploymentEvent};
use crate::error::{IntegrationError, Result};
use crate::gitlab::links;
use crate::gitlab::types::GitlabProject;
use crate::insights::ProjectMetrics;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEvents {
    pub builds: Vec<BuildEvent>,
    pub deployments: Vec<DeploymentEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataProviderResponse {
    pub external_source_id: String,
    pub events: ProviderEvents,
    pub metrics: ProjectMetrics,
}

impl DataProviderResponse {
    fn new(project_id: u64, data: BackfillData) -> Self {
        Self {
            external_source_id: project_id.to_string(),
            events: ProviderEvents {
                builds: data.builds,
                deployments: data.deployments,
            },
            metrics: data.metrics,
        }
    }
}

/// Find the project behind `url` with the token of whichever connected group
/// can see it.
async fn resolve_project(ctx: &AppContext, path: &str) -> Result<(String, GitlabProject)> {
    for group in groups::get_connected_groups(ctx).await? {
        let token = ctx.group_token(group.id).await?;
        match ctx.gitlab.get_project(&token, path).await {
            Ok(project) => return Ok((token, project)),
            Err(err) if err.is_not_found() => {
                debug!("{path} is not visible to group {}", group.id);
            }
            Err(err) => return Err(err),
        }
    }

    Err(IntegrationError::NotFound(format!(
        "No connected group can access {path}"
    )))
}

pub async fn get_data_for_url(ctx: &AppContext, url: &str) -> Result<DataProviderResponse> {
    let path = links::project_path_from_url(ctx.gitlab.base_url(), url)
        .ok_or_else(|| IntegrationError::NotFound(format!("{url} is not a project on this GitLab")))?;

    let (token, project) = resolve_project(ctx, &path).await?;
    let data = backfill::get_backfill_data(
        ctx,
        &token,
        &ProjectRef::from(&project),
        ctx.settings.backfill_days,
    )
    .await;

    info!(
        "Data provider for {path}: {} builds, {} deployments",
        data.builds.len(),
        data.deployments.len()
    );
    Ok(DataProviderResponse::new(project.id, data))
}
