use log::{debug, error, warn};
use serde::Serialize;
use serde_json::{json, Value};

use super::events::GitlabEvent;
use crate::error::{IntegrationError, Result};
use crate::metrics::{self, WebhookStage};
use crate::services::{config_sync, events, webhooks, AppContext};

/// One delivery as it reached the receiver.
#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    /// `groupId` query parameter
    pub group_id: Option<u64>,
    /// `x-gitlab-token` header
    pub signature: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub message: String,
    pub success: bool,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl WebhookResponse {
    fn processed(kind: &str) -> Self {
        Self {
            message: "Processed webhook event".to_string(),
            success: true,
            status_code: 200,
            parameters: Some(json!({ "objectKind": kind })),
        }
    }

    fn failed(err: &IntegrationError) -> Self {
        let (status_code, message) = match err {
            IntegrationError::ValidateWebhookSignature => (403, "Invalid webhook secret"),
            IntegrationError::ParseWebhookEventPayload(_) => (400, "Invalid event format"),
            _ => (500, "Failed to process webhook event"),
        };
        Self {
            message: message.to_string(),
            success: false,
            status_code,
            parameters: None,
        }
    }
}

async fn dispatch(ctx: &AppContext, group_id: u64, event: &GitlabEvent) -> Result<()> {
    match event {
        GitlabEvent::Push(push) => {
            config_sync::handle_push(ctx, group_id, push).await?;
        }
        GitlabEvent::MergeRequest(merge_request) => {
            events::handle_merge_request(ctx, group_id, merge_request).await?;
        }
        GitlabEvent::Pipeline(pipeline) => {
            events::handle_pipeline(ctx, pipeline).await?;
        }
        GitlabEvent::Deployment(deployment) => {
            events::handle_deployment(ctx, group_id, deployment).await?;
        }
        GitlabEvent::Unrecognized(kind) => debug!("Ignoring {kind} event"),
    }
    Ok(())
}

async fn process(ctx: &AppContext, request: &WebhookRequest) -> Result<String> {
    // Without a group there is no stored signature to compare against.
    let group_id = request
        .group_id
        .ok_or(IntegrationError::ValidateWebhookSignature)?;
    webhooks::verify_webhook_signature(ctx.store.as_ref(), group_id, request.signature.as_deref()).await?;

    let event = GitlabEvent::parse(&request.body)?;
    dispatch(ctx, group_id, &event).await?;
    Ok(event.kind().to_string())
}

/// Verify, parse and dispatch one delivery. Never fails; the outcome is the
/// response envelope.
pub async fn handle_webhook(ctx: &AppContext, request: WebhookRequest) -> WebhookResponse {
    metrics::increment_webhook_stage(WebhookStage::Start);

    match process(ctx, &request).await {
        Ok(kind) => {
            metrics::increment_webhook_stage(WebhookStage::End);
            metrics::increment_webhook_processed(&kind);
            WebhookResponse::processed(&kind)
        }
        Err(err) => {
            metrics::increment_webhook_stage(WebhookStage::Fail);
            let response = WebhookResponse::failed(&err);
            if response.status_code == 500 {
                error!("Webhook for group {:?} failed: {err}", request.group_id);
            } else {
                warn!("Rejected webhook for group {:?}: {err}", request.group_id);
            }
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{connect, fixture, FakeCompass};
    use mockito::{Matcher, Server};

    fn request(signature: Option<&str>, body: Value) -> WebhookRequest {
        WebhookRequest {
            group_id: Some(7),
            signature: signature.map(str::to_string),
            body: body.to_string().into_bytes(),
        }
    }

    fn pipeline_body(url: &str) -> Value {
        json!({
            "object_kind": "pipeline",
            "object_attributes": {
                "id": 31, "ref": "main", "sha": "abc", "status": "success",
                "created_at": "2024-01-01 10:00:00 UTC",
                "finished_at": "2024-01-01 10:05:00 UTC"
            },
            "project": {
                "id": 42, "name": "billing",
                "web_url": format!("{url}/platform/billing"),
                "default_branch": "main"
            }
        })
    }

    #[tokio::test]
    async fn wrong_or_missing_signature_is_forbidden() {
        let server = Server::new_async().await;
        let f = fixture(&server.url(), FakeCompass::default());
        connect(&f.store, 7).await;

        for signature in [Some("nope"), None] {
            let response = handle_webhook(&f.ctx, request(signature, json!({}))).await;
            assert_eq!(response.status_code, 403);
            assert_eq!(response.message, "Invalid webhook secret");
            assert!(!response.success);
        }

        let no_group = WebhookRequest {
            group_id: None,
            ..request(Some("sig"), json!({}))
        };
        assert_eq!(handle_webhook(&f.ctx, no_group).await.status_code, 403);
    }

    #[tokio::test]
    async fn malformed_payload_is_bad_request() {
        let server = Server::new_async().await;
        let f = fixture(&server.url(), FakeCompass::default());
        connect(&f.store, 7).await;

        let garbage = WebhookRequest {
            body: b"not json".to_vec(),
            ..request(Some("sig"), json!({}))
        };
        let response = handle_webhook(&f.ctx, garbage).await;
        assert_eq!(response.status_code, 400);
        assert_eq!(response.message, "Invalid event format");
    }

    #[tokio::test]
    async fn unknown_kinds_are_acknowledged() {
        let server = Server::new_async().await;
        let f = fixture(&server.url(), FakeCompass::default());
        connect(&f.store, 7).await;

        let before = metrics::webhook_processed_count("issue");
        let response = handle_webhook(&f.ctx, request(Some("sig"), json!({"object_kind": "issue"}))).await;
        assert_eq!(response.status_code, 200);
        assert_eq!(response.message, "Processed webhook event");
        assert!(metrics::webhook_processed_count("issue") > before);
    }

    #[tokio::test]
    async fn pipeline_event_reaches_compass() {
        let server = Server::new_async().await;
        let f = fixture(&server.url(), FakeCompass::with_component("42", "component-1"));
        connect(&f.store, 7).await;

        let response = handle_webhook(&f.ctx, request(Some("sig"), pipeline_body(&server.url()))).await;
        assert!(response.success);
        assert_eq!(response.parameters, Some(json!({"objectKind": "pipeline"})));
        assert_eq!(f.compass.builds.lock().unwrap().len(), 1);

        let envelope = serde_json::to_value(&response).unwrap();
        assert_eq!(envelope["statusCode"], 200);
    }

    #[tokio::test]
    async fn downstream_failure_is_internal_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v4/projects/42/repository/files/compass.yml/raw")
            .match_query(Matcher::Any)
            .with_status(502)
            .create_async()
            .await;

        let f = fixture(&server.url(), FakeCompass::default());
        connect(&f.store, 7).await;

        let body = json!({
            "object_kind": "push",
            "before": "a", "after": "b", "ref": "refs/heads/main",
            "project": {
                "id": 42, "name": "billing",
                "web_url": format!("{}/platform/billing", server.url()),
                "default_branch": "main"
            },
            "commits": [{"id": "b", "added": [], "modified": ["compass.yml"], "removed": []}]
        });
        let response = handle_webhook(&f.ctx, request(Some("sig"), body)).await;
        assert_eq!(response.status_code, 500);
        assert_eq!(response.message, "Failed to process webhook event");
        assert_eq!(response.parameters, None);
    }
}
