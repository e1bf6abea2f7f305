use async_trait::async_trait;
use graphql_client::{QueryBody, Response as GraphQLResponse};
use log::{debug, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use url::Url;

use super::queries;
use super::types::{
    BuildEvent, Component, CreateComponentInput, DeploymentEvent, MetricValue,
    SyncComponentInput, UnlinkComponentInput,
};
use super::CompassApi;
use crate::config::CompassConfig;
use crate::error::{IntegrationError, Result};

const RETRY_DELAY_SECONDS: u64 = 2;
const MAX_CONCURRENT_REQUESTS: usize = 50;
const EXPERIMENTAL_HEADER: &str = "X-ExperimentalApi";
const EXPERIMENTAL_VALUE: &str = "compass-beta";

/// GraphQL client for the Compass gateway.
pub struct CompassClient {
    client: Client,
    gateway_url: Url,
    cloud_id: String,
    app_id: String,
    api_token: Option<String>,
    max_retries: u32,
    retry_delay: Duration,
    semaphore: Arc<Semaphore>,
}

impl CompassClient {
    pub fn new(config: &CompassConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("compass-gitlab/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IntegrationError::Config(format!("Failed to create HTTP client: {e}")))?;

        let gateway_url = Url::parse(&config.gateway_url)
            .map_err(|e| IntegrationError::Config(format!("Invalid Compass gateway URL: {e}")))?;

        Ok(Self {
            client,
            gateway_url,
            cloud_id: config.cloud_id.clone(),
            app_id: config.app_id.clone(),
            api_token: config.api_token.clone(),
            max_retries: config.max_retries,
            retry_delay: Duration::from_secs(RETRY_DELAY_SECONDS),
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS)),
        })
    }

    #[cfg(test)]
    fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header(EXPERIMENTAL_HEADER, EXPERIMENTAL_VALUE);
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Execute a GraphQL operation, retrying on rate limits and server errors.
    async fn execute<T>(
        &self,
        query: &'static str,
        operation_name: &'static str,
        variables: Value,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| IntegrationError::Compass(e.to_string()))?;

        let body = QueryBody {
            variables,
            query,
            operation_name,
        };

        let mut retry_count = 0;
        loop {
            debug!("Compass {operation_name} (attempt {})", retry_count + 1);
            let request = self.auth_request(self.client.post(self.gateway_url.clone()).json(&body));

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) if (e.is_connect() || e.is_timeout()) && retry_count < self.max_retries => {
                    warn!(
                        "Network error calling Compass ({e}), retrying in {}s ({}/{})...",
                        self.retry_delay.as_secs(),
                        retry_count + 1,
                        self.max_retries
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    retry_count += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            if status == 429 || status.is_server_error() {
                if retry_count >= self.max_retries {
                    return Err(IntegrationError::Compass(format!(
                        "{operation_name} failed with status {status} after {} retries",
                        self.max_retries
                    )));
                }
                warn!(
                    "Compass returned {status} for {operation_name}, retry {}/{}...",
                    retry_count + 1,
                    self.max_retries
                );
                tokio::time::sleep(self.retry_delay).await;
                retry_count += 1;
                continue;
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read error response".to_string());
                return Err(IntegrationError::Compass(format!(
                    "{operation_name} failed with status {status}: {error_text}"
                )));
            }

            let response_body: GraphQLResponse<T> = response.json().await?;
            if let Some(errors) = response_body.errors.filter(|errors| !errors.is_empty()) {
                return Err(IntegrationError::Compass(format!(
                    "{operation_name}: {}",
                    errors
                        .iter()
                        .map(|e| e.message.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )));
            }

            return response_body.data.ok_or_else(|| {
                IntegrationError::Compass(format!("{operation_name} returned no data"))
            });
        }
    }

    /// Run a mutation and check its `success` flag.
    async fn mutate(
        &self,
        query: &'static str,
        operation_name: &'static str,
        field: &str,
        variables: Value,
    ) -> Result<Value> {
        let data: Value = self.execute(query, operation_name, variables).await?;
        mutation_payload(data, field)
    }
}

/// Extract `compass.<field>` and fail when the payload reports errors.
fn mutation_payload(mut data: Value, field: &str) -> Result<Value> {
    let payload = data
        .get_mut("compass")
        .and_then(|compass| compass.get_mut(field))
        .map(Value::take)
        .ok_or_else(|| IntegrationError::Compass(format!("{field} returned no payload")))?;

    if payload.get("success").and_then(Value::as_bool) == Some(true) {
        return Ok(payload);
    }

    let messages = payload
        .get("errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "unknown error".to_string());

    Err(IntegrationError::Compass(format!("{field} failed: {messages}")))
}

fn tier_field(input: &SyncComponentInput) -> Option<Value> {
    input.config.tier().map(|tier| {
        json!({
            "definition": "compass:tier",
            "value": [tier.to_string()],
        })
    })
}

fn lifecycle_field(input: &SyncComponentInput) -> Option<Value> {
    let lifecycle = input.config.fields.as_ref()?.lifecycle.as_ref()?;
    Some(json!({
        "definition": "compass:lifecycle",
        "value": [lifecycle],
    }))
}

#[async_trait]
impl CompassApi for CompassClient {
    async fn get_component_by_external_alias(&self, external_id: &str) -> Result<Option<Component>> {
        let data: Value = self
            .execute(
                queries::COMPONENT_BY_EXTERNAL_ALIAS,
                "componentByExternalAlias",
                json!({
                    "cloudId": self.cloud_id,
                    "externalId": external_id,
                    "externalSource": self.app_id,
                }),
            )
            .await?;

        let result = &data["compass"]["componentByExternalAlias"];
        match result.get("__typename").and_then(Value::as_str) {
            Some("CompassComponent") => Ok(Some(serde_json::from_value(result.clone())?)),
            Some("QueryError") => {
                let status = result["extensions"][0]["statusCode"].as_u64();
                if status == Some(404) {
                    Ok(None)
                } else {
                    Err(IntegrationError::Compass(format!(
                        "componentByExternalAlias: {}",
                        result["message"].as_str().unwrap_or("unknown error")
                    )))
                }
            }
            _ => Ok(None),
        }
    }

    async fn create_component(&self, input: &CreateComponentInput) -> Result<Component> {
        let payload = self
            .mutate(
                queries::CREATE_COMPONENT,
                "createComponent",
                "createComponent",
                json!({
                    "cloudId": self.cloud_id,
                    "input": {
                        "name": input.name,
                        "description": input.description,
                        "typeId": input.component_type.as_type_id(),
                        "labels": input.labels,
                        "links": input.links,
                    }
                }),
            )
            .await?;

        let details = payload
            .get("componentDetails")
            .cloned()
            .ok_or_else(|| IntegrationError::Compass("createComponent returned no component".to_string()))?;
        Ok(serde_json::from_value(details)?)
    }

    async fn create_external_alias(&self, component_id: &str, external_id: &str) -> Result<()> {
        self.mutate(
            queries::CREATE_EXTERNAL_ALIAS,
            "createComponentExternalAlias",
            "createComponentExternalAlias",
            json!({
                "input": {
                    "componentId": component_id,
                    "externalAlias": {
                        "externalId": external_id,
                        "externalSource": self.app_id,
                    }
                }
            }),
        )
        .await?;
        Ok(())
    }

    async fn sync_component_with_file(&self, input: &SyncComponentInput) -> Result<()> {
        let config = &input.config;
        let fields: Vec<Value> = [tier_field(input), lifecycle_field(input)]
            .into_iter()
            .flatten()
            .collect();

        self.mutate(
            queries::UPDATE_COMPONENT,
            "updateComponent",
            "updateComponent",
            json!({
                "input": {
                    "id": config.id,
                    "name": config.name,
                    "description": config.description,
                    "ownerId": config.owner_id,
                    "fields": fields,
                    "dataManager": {
                        "ecosystemAppId": self.app_id,
                        "externalSourceURL": input.file_url,
                    },
                }
            }),
        )
        .await?;

        for link in &config.links {
            self.mutate(
                queries::CREATE_COMPONENT_LINK,
                "createComponentLink",
                "createComponentLink",
                json!({
                    "input": {
                        "componentId": config.id,
                        "link": {
                            "type": link.link_type.to_uppercase(),
                            "url": link.url,
                            "name": link.name,
                        }
                    }
                }),
            )
            .await
            .or_else(|e| {
                // Compass rejects links that already exist on the component
                warn!("Skipping link {} on {}: {e}", link.url, config.id);
                Ok::<_, IntegrationError>(Value::Null)
            })?;
        }

        self.create_external_alias(&config.id, &input.external_source_id)
            .await
            .or_else(|e| {
                debug!("External alias for {} not created: {e}", config.id);
                Ok(())
            })
    }

    async fn unlink_component(&self, input: &UnlinkComponentInput) -> Result<()> {
        self.mutate(
            queries::DETACH_DATA_MANAGER,
            "detachComponentDataManager",
            "detachComponentDataManager",
            json!({ "input": { "componentId": input.component_id } }),
        )
        .await?;

        self.mutate(
            queries::DELETE_EXTERNAL_ALIAS,
            "deleteComponentExternalAlias",
            "deleteComponentExternalAlias",
            json!({
                "input": {
                    "componentId": input.component_id,
                    "externalAlias": {
                        "externalId": input.external_source_id,
                        "externalSource": self.app_id,
                    }
                }
            }),
        )
        .await
        .map(|_| ())
    }

    async fn insert_build_event(&self, event: &BuildEvent) -> Result<()> {
        self.mutate(
            queries::CREATE_EVENT,
            "createEvent",
            "createEvent",
            json!({ "input": { "cloudId": self.cloud_id, "event": { "build": event } } }),
        )
        .await?;
        Ok(())
    }

    async fn insert_deployment_event(&self, event: &DeploymentEvent) -> Result<()> {
        self.mutate(
            queries::CREATE_EVENT,
            "createEvent",
            "createEvent",
            json!({ "input": { "cloudId": self.cloud_id, "event": { "deployment": event } } }),
        )
        .await?;
        Ok(())
    }

    async fn insert_metric_value(&self, value: &MetricValue) -> Result<()> {
        self.mutate(
            queries::INSERT_METRIC_VALUE,
            "insertMetricValueByExternalId",
            "insertMetricValueByExternalId",
            json!({
                "input": {
                    "cloudId": self.cloud_id,
                    "metricDefinitionId": value.metric_definition_id,
                    "externalMetricSourceId": value.external_metric_source_id,
                    "value": { "value": value.value, "timestamp": value.timestamp },
                }
            }),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cac::ComponentType;
    use mockito::{Matcher, Server};

    fn client(server: &Server, max_retries: u32) -> CompassClient {
        let config = CompassConfig {
            gateway_url: format!("{}/graphql", server.url()),
            cloud_id: "cloud-1".to_string(),
            app_id: "app-1".to_string(),
            api_token: Some("secret".to_string()),
            max_retries,
            ..CompassConfig::default()
        };
        CompassClient::new(&config)
            .unwrap()
            .with_retry_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn missing_alias_is_none() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/graphql")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_body(
                r#"{"data":{"compass":{"componentByExternalAlias":{
                    "__typename":"QueryError","message":"not found",
                    "extensions":[{"statusCode":404}]}}}}"#,
            )
            .create_async()
            .await;

        let found = client(&server, 0)
            .get_component_by_external_alias("42")
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn create_component_returns_details() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/graphql")
            .match_body(Matcher::PartialJson(json!({
                "operationName": "createComponent",
                "variables": {"cloudId": "cloud-1", "input": {"typeId": "SERVICE", "name": "billing"}}
            })))
            .with_status(200)
            .with_body(
                r#"{"data":{"compass":{"createComponent":{"success":true,"errors":[],
                    "componentDetails":{"id":"ari:cloud:compass:cloud-1:component/a/b","name":"billing"}}}}}"#,
            )
            .create_async()
            .await;

        let input = CreateComponentInput {
            name: "billing".to_string(),
            description: None,
            component_type: ComponentType::Service,
            labels: vec!["rust".to_string()],
            links: Vec::new(),
        };
        let component = client(&server, 0).create_component(&input).await.unwrap();
        assert_eq!(component.id, "ari:cloud:compass:cloud-1:component/a/b");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unsuccessful_payload_is_an_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/graphql")
            .with_status(200)
            .with_body(
                r#"{"data":{"compass":{"createComponentExternalAlias":{"success":false,
                    "errors":[{"message":"alias taken"}]}}}}"#,
            )
            .create_async()
            .await;

        let err = client(&server, 0)
            .create_external_alias("c", "42")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("alias taken"));
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_reported() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/graphql")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let err = client(&server, 2)
            .create_external_alias("c", "42")
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::Compass(_)));
        mock.assert_async().await;
    }

    #[test]
    fn payload_without_errors_list_still_fails() {
        let data = json!({"compass": {"createEvent": {"success": false}}});
        let err = mutation_payload(data, "createEvent").unwrap_err();
        assert_eq!(err.to_string(), "Compass request failed: createEvent failed: unknown error");
    }
}
