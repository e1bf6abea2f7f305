use log::debug;
use reqwest::Method;
use serde::Serialize;

use super::core::{GitlabClient, RequestConfig};
use crate::error::{IntegrationError, Result};
use crate::gitlab::types::GitlabHook;

/// Body of a group hook registration.
#[derive(Debug, Clone, Serialize)]
pub struct HookRegistration {
    pub url: String,
    pub token: String,
    pub push_events: bool,
    pub merge_requests_events: bool,
    pub pipeline_events: bool,
    pub deployment_events: bool,
    pub enable_ssl_verification: bool,
}

impl HookRegistration {
    /// Every event kind the integration consumes.
    pub fn all_events(url: String, token: String) -> Self {
        Self {
            url,
            token,
            push_events: true,
            merge_requests_events: true,
            pipeline_events: true,
            deployment_events: true,
            enable_ssl_verification: true,
        }
    }
}

impl GitlabClient {
    /// `None` when the hook no longer exists.
    pub async fn get_group_webhook(
        &self,
        token: &str,
        group_id: u64,
        hook_id: u64,
    ) -> Result<Option<GitlabHook>> {
        match self
            .get_json(&format!("groups/{group_id}/hooks/{hook_id}"), token)
            .await
        {
            Ok(response) => Ok(Some(response.data)),
            Err(err) if err.is_not_found() => {
                debug!("Hook {hook_id} not found on group {group_id}");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn register_group_webhook(
        &self,
        token: &str,
        group_id: u64,
        registration: &HookRegistration,
    ) -> Result<GitlabHook> {
        let body = serde_json::to_value(registration)?;
        self.call(
            Method::POST,
            &format!("groups/{group_id}/hooks"),
            token,
            RequestConfig::default(),
            Some(&body),
        )
        .await?
        .map(|response| response.data)
        .ok_or_else(|| IntegrationError::NotFound("GitLab did not return the created hook".to_string()))
    }

    pub async fn delete_group_webhook(&self, token: &str, group_id: u64, hook_id: u64) -> Result<()> {
        self.call::<serde_json::Value>(
            Method::DELETE,
            &format!("groups/{group_id}/hooks/{hook_id}"),
            token,
            RequestConfig::default(),
            None,
        )
        .await?;
        Ok(())
    }
}
