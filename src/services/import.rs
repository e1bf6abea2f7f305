//! Bulk import of GitLab projects as Compass components.

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::AppContext;
use crate::cac::ComponentType;
use crate::compass::types::{ComponentLinkInput, CreateComponentInput};
use crate::error::{IntegrationError, Result};
use crate::fan_out;
use crate::gitlab::client::MergeRequestFilter;
use crate::gitlab::pagination::fetch_paginated_data;
use crate::gitlab::types::GitlabProject;
use crate::insights;
use crate::platform::{keys, storage, ImportProjectJob, JobStats, QueuedJob};

/// Branches the integration opens when it proposes a `compass.yml` file.
pub const COMPASS_MR_BRANCH_PREFIX: &str = "compass-files";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportableProject {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    pub web_url: String,
    pub default_branch: Option<String>,
    pub labels: Vec<String>,
    pub has_component: bool,
    pub has_open_compass_mr: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectsPage {
    pub projects: Vec<ImportableProject>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedImport {
    pub project_id: u64,
    pub name: String,
    pub error: String,
    pub failed_at: String,
}

/// Topics plus the language with the largest share of the repository.
async fn project_labels(ctx: &AppContext, token: &str, project: &GitlabProject) -> Vec<String> {
    let languages = fan_out::each_or_default(
        ctx.gitlab.get_project_languages(token, project.id),
        "Project language lookup",
    )
    .await;

    let primary = languages
        .into_iter()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(language, _)| language);

    insights::format_labels(project.topics.iter().cloned().chain(primary))
}

async fn has_open_compass_mr(ctx: &AppContext, token: &str, project: &GitlabProject) -> Result<bool> {
    let Some(branch) = project.default_branch.as_deref() else {
        return Ok(false);
    };
    let project_id = project.id;

    let open = fetch_paginated_data(
        move |page, per_page, filter| {
            ctx.gitlab
                .get_merge_requests(token, project_id, page, per_page, filter)
        },
        MergeRequestFilter::open_into(branch),
        1,
        ctx.settings.per_page,
    )
    .await?;

    Ok(open
        .iter()
        .any(|mr| mr.source_branch.starts_with(COMPASS_MR_BRANCH_PREFIX)))
}

async fn to_importable(ctx: &AppContext, token: &str, project: &GitlabProject) -> Result<ImportableProject> {
    let external_id = project.id.to_string();
    let (labels, component, open_mr) = tokio::join!(
        project_labels(ctx, token, project),
        ctx.compass.get_component_by_external_alias(&external_id),
        has_open_compass_mr(ctx, token, project),
    );

    Ok(ImportableProject {
        id: project.id,
        name: project.name.clone(),
        description: project.description.clone(),
        web_url: project.web_url.clone(),
        default_branch: project.default_branch.clone(),
        labels,
        has_component: component?.is_some(),
        has_open_compass_mr: open_mr?,
    })
}

/// One page of a group's projects with their import state.
pub async fn get_group_projects(
    ctx: &AppContext,
    group_id: u64,
    page: u32,
    search: Option<&str>,
) -> Result<ProjectsPage> {
    let token = ctx.group_token(group_id).await?;
    let response = ctx
        .gitlab
        .get_group_projects(&token, group_id, page, ctx.settings.per_page, search)
        .await?;
    let total = response.total().unwrap_or(response.data.len() as u64);

    let projects = fan_out::all_settled(
        response
            .data
            .iter()
            .map(|project| to_importable(ctx, &token, project)),
    )
    .await?;

    Ok(ProjectsPage { projects, total })
}

async fn stored_job_ids(ctx: &AppContext, key: &str) -> Result<Vec<String>> {
    Ok(storage::get_as(ctx.store.as_ref(), key).await?.unwrap_or_default())
}

/// Queue one import job per project and remember the job ids. The ids of the
/// group's previous import are forgotten.
pub async fn import_projects(
    ctx: &AppContext,
    group_id: u64,
    projects: &[ImportableProject],
) -> Result<Vec<String>> {
    let job_ids = fan_out::all_settled(projects.iter().map(|project| {
        let job = ImportProjectJob {
            group_id,
            project_id: project.id,
            name: project.name.clone(),
            description: project.description.clone(),
            web_url: project.web_url.clone(),
            labels: project.labels.clone(),
        };
        ctx.queue.push(QueuedJob::ImportProject(job), None)
    }))
    .await?;

    let key = keys::import_job_ids(group_id);
    let previous = stored_job_ids(ctx, &key).await?;
    ctx.queue.forget(&previous).await?;
    storage::set_as(ctx.store.as_ref(), &key, &job_ids).await?;

    info!("Queued {} imports for group {group_id}", job_ids.len());
    Ok(job_ids)
}

/// Job counts over the last import of every connected group.
pub async fn get_import_status(ctx: &AppContext) -> Result<JobStats> {
    let mut job_ids = Vec::new();
    for (_, value) in ctx.store.query_prefix(keys::IMPORT_JOB_IDS_PREFIX).await? {
        let ids: Vec<String> = serde_json::from_value(value)?;
        job_ids.extend(ids);
    }

    let stats = fan_out::all_settled(job_ids.iter().map(|id| ctx.queue.get_stats(id))).await?;
    let mut total = JobStats::default();
    for s in stats {
        total += s;
    }
    Ok(total)
}

async fn create_project_component(ctx: &AppContext, job: &ImportProjectJob) -> Result<()> {
    let input = CreateComponentInput {
        name: job.name.clone(),
        description: job.description.clone(),
        component_type: ComponentType::Service,
        labels: job.labels.clone(),
        links: vec![ComponentLinkInput {
            link_type: "REPOSITORY".to_string(),
            url: job.web_url.clone(),
            name: None,
        }],
    };

    let component = ctx.compass.create_component(&input).await?;
    ctx.compass
        .create_external_alias(&component.id, &job.project_id.to_string())
        .await?;
    debug!("Created component {} for project {}", component.id, job.project_id);
    Ok(())
}

/// Runs inside the job queue. A failure is recorded for the import screen
/// and still returned so the queue counts it as failed.
pub async fn run_import_job(ctx: &AppContext, job: &ImportProjectJob) -> Result<()> {
    let Err(err) = create_project_component(ctx, job).await else {
        return Ok(());
    };

    warn!("Import of project {} failed: {err}", job.project_id);
    let record = FailedImport {
        project_id: job.project_id,
        name: job.name.clone(),
        error: err.to_string(),
        failed_at: Utc::now().to_rfc3339(),
    };
    let key = keys::failed_import(job.group_id, job.project_id);
    storage::set_as(ctx.store.as_ref(), &key, &record).await?;
    Err(err)
}

pub async fn get_failed_imports(ctx: &AppContext) -> Result<Vec<FailedImport>> {
    ctx.store
        .query_prefix(keys::FAILED_IMPORT_PREFIX)
        .await?
        .into_iter()
        .map(|(_, value)| serde_json::from_value(value).map_err(IntegrationError::from))
        .collect()
}

async fn delete_prefix(ctx: &AppContext, prefix: &str) -> Result<()> {
    for (key, _) in ctx.store.query_prefix(prefix).await? {
        ctx.store.delete(&key).await?;
    }
    Ok(())
}

async fn forget_job_ids(ctx: &AppContext, key: &str) -> Result<()> {
    let ids = stored_job_ids(ctx, key).await?;
    ctx.queue.forget(&ids).await?;
    ctx.store.delete(key).await
}

/// Forget failure records and the job ids of the last import of every group.
pub async fn clear_import_results(ctx: &AppContext) -> Result<()> {
    for (key, _) in ctx.store.query_prefix(keys::IMPORT_JOB_IDS_PREFIX).await? {
        forget_job_ids(ctx, &key).await?;
    }
    delete_prefix(ctx, keys::FAILED_IMPORT_PREFIX).await
}

/// Drop one group's import state, used when the group is disconnected.
pub async fn forget_group_imports(ctx: &AppContext, group_id: u64) -> Result<()> {
    forget_job_ids(ctx, &keys::import_job_ids(group_id)).await?;
    delete_prefix(ctx, &keys::group_failed_imports(group_id)).await
}
