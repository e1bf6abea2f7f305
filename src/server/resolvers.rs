//! Resolver endpoints behind the admin pages.
//!
//! Every response is wrapped in [`ResolverResponse`]; failures carry the
//! error message and, where one exists, a machine-readable `errorType`.

use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use log::warn;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;

use crate::cac::{self, ComponentType};
use crate::error::{IntegrationError, Result};
use crate::services::import::ImportableProject;
use crate::services::{data_provider, groups, import, webhooks, AppContext};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverResponse<T> {
    pub success: bool,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ResolverError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ResolverResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            status_code: 200,
            errors: None,
            data: Some(data),
        }
    }

    pub fn error(err: &IntegrationError) -> Self {
        Self {
            success: false,
            status_code: err.status_code(),
            errors: Some(vec![ResolverError {
                message: err.to_string(),
                error_type: err.error_type(),
            }]),
            data: None,
        }
    }
}

impl ResolverResponse<()> {
    /// A request axum could not decode.
    pub fn rejected(status: StatusCode, message: String) -> Self {
        Self {
            success: false,
            status_code: status.as_u16(),
            errors: Some(vec![ResolverError {
                message,
                error_type: Some("INVALID_REQUEST".to_string()),
            }]),
            data: None,
        }
    }
}

impl<T> From<Result<T>> for ResolverResponse<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => {
                warn!("Resolver call failed: {err}");
                Self::error(&err)
            }
        }
    }
}

impl<T: Serialize> IntoResponse for ResolverResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

type Ctx = State<Arc<AppContext>>;

// Extractors whose rejections use the resolver envelope instead of axum's
// plain-text bodies.

pub struct Body<T>(pub T);

impl<S, T> FromRequest<S> for Body<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ResolverResponse<()>;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| Body(value))
            .map_err(|r| ResolverResponse::rejected(r.status(), r.body_text()))
    }
}

pub struct GroupId(pub u64);

impl<S: Send + Sync> FromRequestParts<S> for GroupId {
    type Rejection = ResolverResponse<()>;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> std::result::Result<Self, Self::Rejection> {
        Path::<u64>::from_request_parts(parts, state)
            .await
            .map(|Path(id)| GroupId(id))
            .map_err(|r| ResolverResponse::rejected(r.status(), r.body_text()))
    }
}

pub struct Params<T>(pub T);

impl<S, T> FromRequestParts<S> for Params<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ResolverResponse<()>;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> std::result::Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| Params(value))
            .map_err(|r| ResolverResponse::rejected(r.status(), r.body_text()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub token: String,
    pub token_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSetupRequest {
    pub webhook_id: u64,
    pub webhook_secret_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ProjectsQuery {
    #[serde(default = "first_page")]
    pub page: u32,
    pub search: Option<String>,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub projects: Vec<ImportableProject>,
}

#[derive(Debug, Deserialize)]
pub struct DataProviderRequest {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

pub async fn data_provider(
    State(ctx): Ctx,
    Body(request): Body<DataProviderRequest>,
) -> ResolverResponse<data_provider::DataProviderResponse> {
    data_provider::get_data_for_url(&ctx, &request.url).await.into()
}

pub async fn list_groups(State(ctx): Ctx) -> ResolverResponse<Vec<groups::ConnectedGroup>> {
    groups::get_connected_groups(&ctx).await.into()
}

pub async fn connect_group(
    State(ctx): Ctx,
    Body(request): Body<TokenRequest>,
) -> ResolverResponse<groups::ConnectedGroup> {
    groups::connect_group(&ctx, &request.token, &request.token_name)
        .await
        .into()
}

pub async fn rotate_token(
    State(ctx): Ctx,
    GroupId(group_id): GroupId,
    Body(request): Body<TokenRequest>,
) -> ResolverResponse<()> {
    groups::rotate_token(&ctx, group_id, &request.token, &request.token_name)
        .await
        .into()
}

pub async fn rotate_webhook(State(ctx): Ctx, GroupId(group_id): GroupId) -> ResolverResponse<Option<u64>> {
    webhooks::rotate_webhook(&ctx, group_id).await.into()
}

pub async fn complete_webhook_setup(
    State(ctx): Ctx,
    GroupId(group_id): GroupId,
    Body(request): Body<WebhookSetupRequest>,
) -> ResolverResponse<()> {
    groups::complete_maintainer_setup(&ctx, group_id, request.webhook_id, &request.webhook_secret_token)
        .await
        .into()
}

pub async fn disconnect_group(State(ctx): Ctx, GroupId(group_id): GroupId) -> ResolverResponse<()> {
    groups::disconnect_group(&ctx, group_id).await.into()
}

pub async fn group_projects(
    State(ctx): Ctx,
    GroupId(group_id): GroupId,
    Params(query): Params<ProjectsQuery>,
) -> ResolverResponse<import::ProjectsPage> {
    import::get_group_projects(&ctx, group_id, query.page, query.search.as_deref())
        .await
        .into()
}

pub async fn import_projects(
    State(ctx): Ctx,
    GroupId(group_id): GroupId,
    Body(request): Body<ImportRequest>,
) -> ResolverResponse<Vec<String>> {
    import::import_projects(&ctx, group_id, &request.projects)
        .await
        .into()
}

pub async fn import_status(State(ctx): Ctx) -> ResolverResponse<crate::platform::JobStats> {
    import::get_import_status(&ctx).await.into()
}

pub async fn failed_imports(State(ctx): Ctx) -> ResolverResponse<Vec<import::FailedImport>> {
    import::get_failed_imports(&ctx).await.into()
}

pub async fn clear_imports(State(ctx): Ctx) -> ResolverResponse<()> {
    import::clear_import_results(&ctx).await.into()
}

/// Validate a `compass.yml` body. An invalid file is still a successful call.
pub async fn validate_config(body: String) -> ResolverResponse<ValidationResult> {
    let errors = match cac::load_config(&body, ComponentType::Service) {
        Ok(_) => Vec::new(),
        Err(errors) => errors,
    };
    ResolverResponse::ok(ValidationResult {
        valid: errors.is_empty(),
        errors,
    })
}
