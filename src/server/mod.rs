//! # HTTP Server
//!
//! Endpoints:
//! - `POST /webhook?groupId=` - GitLab webhook receiver
//! - `POST /data-provider` - history and metrics for a repository URL
//! - `/resolver/...` - group, import and config validation actions
//! - `/metrics` - Prometheus metrics in text format
//! - `/healthz` - liveness check (always returns 200)

mod resolvers;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use log::{error, info};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::services::AppContext;
use crate::webhook::{self, WebhookRequest};

pub const SIGNATURE_HEADER: &str = "x-gitlab-token";

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/data-provider", post(resolvers::data_provider))
        .route("/resolver/groups", get(resolvers::list_groups))
        .route("/resolver/groups/connect", post(resolvers::connect_group))
        .route("/resolver/groups/{id}", delete(resolvers::disconnect_group))
        .route("/resolver/groups/{id}/rotate-token", post(resolvers::rotate_token))
        .route("/resolver/groups/{id}/rotate-webhook", post(resolvers::rotate_webhook))
        .route("/resolver/groups/{id}/webhook", post(resolvers::complete_webhook_setup))
        .route("/resolver/groups/{id}/projects", get(resolvers::group_projects))
        .route("/resolver/groups/{id}/import", post(resolvers::import_projects))
        .route("/resolver/import/status", get(resolvers::import_status))
        .route(
            "/resolver/import/failed",
            get(resolvers::failed_imports).delete(resolvers::clear_imports),
        )
        .route("/resolver/validate-config", post(resolvers::validate_config))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(ctx)
}

pub async fn start_server(bind: &str, ctx: Arc<AppContext>) -> Result<(), anyhow::Error> {
    let listener = TcpListener::bind(bind).await?;
    info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, router(ctx)).await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct WebhookQuery {
    #[serde(rename = "groupId")]
    group_id: Option<String>,
}

async fn webhook_handler(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let request = WebhookRequest {
        group_id: query.group_id.and_then(|id| id.trim().parse().ok()),
        signature: headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body: body.to_vec(),
    };

    let response = webhook::handle_webhook(&ctx, request).await;
    let status = StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response))
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = crate::metrics::REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            format!("Failed to encode metrics: {}", e).into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{connect, fixture, FakeCompass};
    use mockito::Server;
    use serde_json::{json, Value};

    async fn serve(ctx: Arc<AppContext>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(ctx)).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn webhook_route_reads_group_and_signature() {
        let gitlab = Server::new_async().await;
        let f = fixture(&gitlab.url(), FakeCompass::default());
        connect(&f.store, 7).await;
        let base = serve(f.ctx.clone()).await;
        let client = reqwest::Client::new();

        let accepted = client
            .post(format!("{base}/webhook?groupId=7"))
            .header(SIGNATURE_HEADER, "sig")
            .body(r#"{"object_kind":"issue"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(accepted.status().as_u16(), 200);
        let body: Value = accepted.json().await.unwrap();
        assert_eq!(body["message"], "Processed webhook event");
        assert_eq!(body["success"], true);

        let rejected = client
            .post(format!("{base}/webhook?groupId=7"))
            .header(SIGNATURE_HEADER, "forged")
            .body("{}")
            .send()
            .await
            .unwrap();
        assert_eq!(rejected.status().as_u16(), 403);
    }

    #[tokio::test]
    async fn resolver_routes_use_envelope() {
        let gitlab = Server::new_async().await;
        let f = fixture(&gitlab.url(), FakeCompass::default());
        connect(&f.store, 7).await;
        let base = serve(f.ctx.clone()).await;
        let client = reqwest::Client::new();

        let groups: Value = client
            .get(format!("{base}/resolver/groups"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(groups["success"], true);
        assert_eq!(groups["statusCode"], 200);
        assert_eq!(groups["data"][0]["id"], 7);

        let status = client
            .get(format!("{base}/resolver/import/status"))
            .send()
            .await
            .unwrap();
        assert_eq!(status.status().as_u16(), 200);
        let status: Value = status.json().await.unwrap();
        assert_eq!(status["data"], json!({"success": 0, "inProgress": 0, "failed": 0}));
    }

    #[tokio::test]
    async fn malformed_resolver_requests_use_envelope() {
        let gitlab = Server::new_async().await;
        let f = fixture(&gitlab.url(), FakeCompass::default());
        let base = serve(f.ctx.clone()).await;
        let client = reqwest::Client::new();

        let bad_body = client
            .post(format!("{base}/resolver/groups/connect"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(bad_body.status().as_u16(), 400);
        let body: Value = bad_body.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["statusCode"], 400);
        assert_eq!(body["errors"][0]["errorType"], "INVALID_REQUEST");

        let bad_id = client
            .delete(format!("{base}/resolver/groups/abc"))
            .send()
            .await
            .unwrap();
        assert_eq!(bad_id.status().as_u16(), 400);
        let body: Value = bad_id.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["statusCode"], 400);

        let bad_page = client
            .get(format!("{base}/resolver/groups/7/projects?page=abc"))
            .send()
            .await
            .unwrap();
        assert_eq!(bad_page.status().as_u16(), 400);
        let body: Value = bad_page.json().await.unwrap();
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn health_and_metrics_respond() {
        let gitlab = Server::new_async().await;
        let f = fixture(&gitlab.url(), FakeCompass::default());
        let base = serve(f.ctx.clone()).await;

        let health = reqwest::get(format!("{base}/healthz")).await.unwrap();
        assert_eq!(health.status().as_u16(), 200);

        let metrics = reqwest::get(format!("{base}/metrics")).await.unwrap();
        assert_eq!(metrics.status().as_u16(), 200);
    }
}
