//! Keeping components in step with `compass.yml` files on the default branch.

use indexmap::IndexMap;
use log::{debug, info, warn};
use std::collections::HashSet;

use super::AppContext;
use crate::cac::{self, ComponentType};
use crate::compass::types::{SyncComponentInput, UnlinkComponentInput};
use crate::error::Result;
use crate::fan_out;
use crate::gitlab::links;
use crate::metrics;
use crate::webhook::events::{PushCommit, PushEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
    Upserted,
    Removed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub synced: usize,
    pub unlinked: usize,
    pub skipped: usize,
}

/// Net config file changes of a push, in first-seen order. A later commit's
/// change to the same path replaces an earlier one, and a file both created
/// and deleted within the push is dropped.
pub fn collect_cac_changes(commits: &[PushCommit]) -> IndexMap<String, FileChange> {
    let mut changes = IndexMap::new();
    let mut created_here = HashSet::new();

    for commit in commits {
        for path in commit.added.iter().filter(|p| cac::check_cac_filename(p)) {
            if !changes.contains_key(path) {
                created_here.insert(path.clone());
            }
            changes.insert(path.clone(), FileChange::Upserted);
        }
        for path in commit.modified.iter().filter(|p| cac::check_cac_filename(p)) {
            changes.insert(path.clone(), FileChange::Upserted);
        }
        for path in commit.removed.iter().filter(|p| cac::check_cac_filename(p)) {
            if created_here.contains(path) {
                changes.shift_remove(path);
            } else {
                changes.insert(path.clone(), FileChange::Removed);
            }
        }
    }

    changes
}

enum Outcome {
    Synced,
    Unlinked,
    Skipped,
}

async fn sync_file(ctx: &AppContext, token: &str, event: &PushEvent, branch: &str, path: &str) -> Result<Outcome> {
    let project = &event.project;
    let content = ctx
        .gitlab
        .get_file_content(token, project.id, path, &event.after)
        .await?;

    let config = match cac::load_config(&content, ComponentType::Service) {
        Ok(config) => config,
        Err(errors) => {
            warn!(
                "Skipping invalid {path} in {}: {}",
                project.web_url,
                errors.join("; ")
            );
            return Ok(Outcome::Skipped);
        }
    };

    ctx.compass
        .sync_component_with_file(&SyncComponentInput {
            config,
            external_source_id: project.id.to_string(),
            file_path: path.to_string(),
            file_url: links::file_url(&project.web_url, branch, path),
        })
        .await?;
    Ok(Outcome::Synced)
}

async fn unlink_file(ctx: &AppContext, token: &str, event: &PushEvent, path: &str) -> Result<Outcome> {
    let project = &event.project;
    let content = match ctx
        .gitlab
        .get_file_content(token, project.id, path, &event.before)
        .await
    {
        Ok(content) => content,
        Err(err) if err.is_not_found() => {
            debug!("Removed {path} did not exist at {}", event.before);
            return Ok(Outcome::Skipped);
        }
        Err(err) => return Err(err),
    };

    let component_id = serde_yaml::from_str::<serde_yaml::Value>(&content)
        .ok()
        .and_then(|doc| doc.get("id").and_then(|id| id.as_str()).map(str::to_string));
    let Some(component_id) = component_id else {
        warn!("Removed {path} in {} had no component id", project.web_url);
        return Ok(Outcome::Skipped);
    };

    ctx.compass
        .unlink_component(&UnlinkComponentInput {
            component_id,
            external_source_id: project.id.to_string(),
            file_path: path.to_string(),
        })
        .await?;
    Ok(Outcome::Unlinked)
}

/// Apply the config file changes of a push to the default branch. Pushes to
/// other branches and tags are ignored.
pub async fn handle_push(ctx: &AppContext, group_id: u64, event: &PushEvent) -> Result<SyncSummary> {
    let Some(branch) = event.branch() else {
        debug!("Ignoring tag push to {}", event.project.web_url);
        return Ok(SyncSummary::default());
    };
    if !event.project.is_default_branch(branch) {
        debug!("Ignoring push to non-default branch {branch}");
        return Ok(SyncSummary::default());
    }

    let changes = collect_cac_changes(&event.commits);
    if changes.is_empty() {
        return Ok(SyncSummary::default());
    }

    let token = ctx.group_token(group_id).await?;
    let token = token.as_str();
    let outcomes = fan_out::all_settled(changes.iter().map(|(path, change)| async move {
        match change {
            FileChange::Upserted => sync_file(ctx, token, event, branch, path).await,
            FileChange::Removed => unlink_file(ctx, token, event, path).await,
        }
    }))
    .await?;

    let mut summary = SyncSummary::default();
    for outcome in outcomes {
        match outcome {
            Outcome::Synced => summary.synced += 1,
            Outcome::Unlinked => summary.unlinked += 1,
            Outcome::Skipped => summary.skipped += 1,
        }
    }
    metrics::increment_compass_events("config-sync", (summary.synced + summary.unlinked) as u64);

    info!(
        "Config files of {}: {} synced, {} unlinked, {} skipped",
        event.project.web_url, summary.synced, summary.unlinked, summary.skipped
    );
    Ok(summary)
}
