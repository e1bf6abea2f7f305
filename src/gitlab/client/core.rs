use indexmap::IndexMap;
use log::{debug, info};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Instant;
use url::Url;

use crate::error::{IntegrationError, Result};

pub const TOTAL_COUNT_HEADER: &str = "x-total";

/// How the response body should be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContentType {
    #[default]
    Json,
    /// Body is handed back verbatim as a JSON string value (file contents).
    RawText,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestConfig {
    pub content_type: ContentType,
}

impl RequestConfig {
    pub fn raw_text() -> Self {
        Self {
            content_type: ContentType::RawText,
        }
    }
}

/// Parsed body plus the response headers GitLab sent with it.
#[derive(Debug)]
pub struct GitlabResponse<T> {
    pub data: T,
    pub headers: HeaderMap,
}

impl<T> GitlabResponse<T> {
    /// Value of the `x-total` header, if present and numeric.
    pub fn total(&self) -> Option<u64> {
        self.headers
            .get(TOTAL_COUNT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
    }
}

/// Ordered `key=value&...` query string builder.
#[derive(Debug, Clone, Default)]
pub struct QueryParams(IndexMap<String, String>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, key: &str, value: impl ToString) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    pub fn push_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.push(key, value),
            None => self,
        }
    }

    pub fn encode(&self) -> String {
        self.0
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Append the encoded query to `path`, leaving it untouched when empty.
    pub fn apply(&self, path: &str) -> String {
        if self.0.is_empty() {
            path.to_string()
        } else {
            format!("{path}?{}", self.encode())
        }
    }
}

/// Logs the request duration when dropped, whichever way the call ends.
struct RequestTimer {
    method: Method,
    path: String,
    started: Instant,
}

impl RequestTimer {
    fn start(method: &Method, path: &str) -> Self {
        debug!("GitLab {method} {path} started");
        Self {
            method: method.clone(),
            path: path.to_string(),
            started: Instant::now(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        info!(
            "GitLab {} {} took {}ms",
            self.method,
            self.path,
            self.started.elapsed().as_millis()
        );
    }
}

/// Single chokepoint for every GitLab v4 REST call.
#[derive(Clone)]
pub struct GitlabClient {
    client: Client,
    api_url: Url,
    base_url: String,
}

impl GitlabClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("compass-gitlab/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IntegrationError::Config(format!("Failed to create HTTP client: {e}")))?;

        let base = Url::parse(base_url)
            .map_err(|e| IntegrationError::Config(format!("Invalid base URL: {e}")))?;

        let api_url = base
            .join("api/v4/")
            .map_err(|e| IntegrationError::Config(format!("Invalid API base URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Instance URL without the API suffix (e.g. `https://gitlab.com`).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform one API call.
    ///
    /// Returns `None` for `204 No Content`. Any status of 300 or above becomes
    /// [`IntegrationError::GitlabHttpMethod`].
    pub async fn call<T>(
        &self,
        method: Method,
        path: &str,
        token: &str,
        config: RequestConfig,
        body: Option<&serde_json::Value>,
    ) -> Result<Option<GitlabResponse<T>>>
    where
        T: DeserializeOwned,
    {
        let _timer = RequestTimer::start(&method, path);

        let url = self
            .api_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| IntegrationError::Config(format!("Invalid request path {path}: {e}")))?;

        let mut request = self
            .client
            .request(method, url)
            .header("PRIVATE-TOKEN", token);

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.as_u16() >= 300 {
            let body = response.text().await.unwrap_or_default();
            return Err(IntegrationError::GitlabHttpMethod {
                status: status.as_u16(),
                status_text: status_text(status, &body),
            });
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let headers = response.headers().clone();
        let data = match config.content_type {
            ContentType::Json => response.json::<T>().await?,
            ContentType::RawText => {
                let text = response.text().await?;
                serde_json::from_value(serde_json::Value::String(text))?
            }
        };

        Ok(Some(GitlabResponse { data, headers }))
    }

    /// `GET` a JSON resource that must have a body.
    pub(super) async fn get_json<T>(&self, path: &str, token: &str) -> Result<GitlabResponse<T>>
    where
        T: DeserializeOwned,
    {
        self.call(Method::GET, path, token, RequestConfig::default(), None)
            .await?
            .ok_or_else(|| IntegrationError::NotFound(format!("GitLab returned no content for {path}")))
    }
}

/// GitLab error bodies are usually `{"message": ...}` or `{"error": ...}`.
fn status_text(status: StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .or_else(|| value.get("error"))
                .map(|m| match m {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
        });

    match from_json {
        Some(text) => text,
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => status
            .canonical_reason()
            .unwrap_or("Unknown status")
            .to_string(),
    }
}
