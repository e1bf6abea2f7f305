//! Integration services shared by the webhook receiver, the resolver
//! endpoints, background jobs and the CLI.

pub mod backfill;
pub mod config_sync;
pub mod data_provider;
pub mod events;
pub mod groups;
pub mod import;
pub mod webhooks;

use async_trait::async_trait;
use log::info;
use std::sync::Arc;

use crate::compass::CompassApi;
use crate::config::Config;
use crate::error::{IntegrationError, Result};
use crate::gitlab::types::GitlabProject;
use crate::gitlab::GitlabClient;
use crate::metrics;
use crate::platform::{keys, JobHandler, JobQueue, KeyValueStore, QueuedJob};
use crate::webhook::events::HookProject;

/// Values derived from [`Config`] once at start-up.
#[derive(Debug, Clone)]
pub struct Settings {
    pub per_page: u32,
    pub webhook_url: String,
    pub send_staging_events: bool,
    pub enable_backfill: bool,
    pub backfill_schema_version: u32,
    pub backfill_days: u32,
    pub max_jitter_seconds: u64,
    pub cycle_time_metric_id: String,
    pub open_merge_requests_metric_id: String,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            per_page: config.gitlab.per_page,
            webhook_url: config.webhook_url(),
            send_staging_events: config.features.send_staging_events,
            enable_backfill: config.features.enable_backfill,
            backfill_schema_version: config.backfill.schema_version,
            backfill_days: config.backfill.days,
            max_jitter_seconds: config.backfill.max_jitter_seconds,
            cycle_time_metric_id: config.compass.cycle_time_metric_id.clone(),
            open_merge_requests_metric_id: config.compass.open_merge_requests_metric_id.clone(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// The parts of a GitLab project the services work with.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRef {
    pub id: u64,
    pub name: String,
    pub web_url: String,
    pub default_branch: Option<String>,
}

impl From<&GitlabProject> for ProjectRef {
    fn from(project: &GitlabProject) -> Self {
        Self {
            id: project.id,
            name: project.name.clone(),
            web_url: project.web_url.clone(),
            default_branch: project.default_branch.clone(),
        }
    }
}

impl From<&HookProject> for ProjectRef {
    fn from(project: &HookProject) -> Self {
        Self {
            id: project.id,
            name: project.name.clone(),
            web_url: project.web_url.clone(),
            default_branch: project.default_branch.clone(),
        }
    }
}

/// Everything a request or job needs, built once and shared.
pub struct AppContext {
    pub gitlab: GitlabClient,
    pub compass: Arc<dyn CompassApi>,
    pub store: Arc<dyn KeyValueStore>,
    pub queue: Arc<dyn JobQueue>,
    pub settings: Settings,
}

impl AppContext {
    /// Stored access token of a connected group.
    pub async fn group_token(&self, group_id: u64) -> Result<String> {
        self.store
            .get_secret(&keys::token(group_id))
            .await?
            .ok_or_else(|| IntegrationError::NotFound(format!("No token stored for group {group_id}")))
    }
}

/// Runs queued jobs against a shared context.
pub struct ContextJobHandler(pub Arc<AppContext>);

#[async_trait]
impl JobHandler for ContextJobHandler {
    async fn handle(&self, job: QueuedJob) -> Result<()> {
        let kind = job.kind();
        let result = match job {
            QueuedJob::ImportProject(job) => import::run_import_job(&self.0, &job).await,
            QueuedJob::Backfill => backfill::run_backfill_job(&self.0).await.map(|ran| {
                if !ran {
                    info!("Backfill already applied for this schema version");
                }
            }),
        };
        metrics::increment_jobs(kind, result.is_ok());
        result
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for service tests.

    use super::*;
    use crate::compass::types::{
        BuildEvent, Component, CreateComponentInput, DeploymentEvent, MetricValue,
        SyncComponentInput, UnlinkComponentInput,
    };
    use crate::platform::{JobStats, LocalStore};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records every call; components are looked up from `components`.
    #[derive(Default)]
    pub struct FakeCompass {
        pub components: Mutex<Vec<(String, Component)>>,
        pub created: Mutex<Vec<CreateComponentInput>>,
        pub aliases: Mutex<Vec<(String, String)>>,
        pub synced: Mutex<Vec<SyncComponentInput>>,
        pub unlinked: Mutex<Vec<UnlinkComponentInput>>,
        pub builds: Mutex<Vec<BuildEvent>>,
        pub deployments: Mutex<Vec<DeploymentEvent>>,
        pub metric_values: Mutex<Vec<MetricValue>>,
        pub fail_create: bool,
    }

    impl FakeCompass {
        pub fn with_component(external_id: &str, component_id: &str) -> Self {
            let fake = Self::default();
            fake.components.lock().unwrap().push((
                external_id.to_string(),
                Component {
                    id: component_id.to_string(),
                    name: "billing".to_string(),
                    description: None,
                    type_id: Some("SERVICE".to_string()),
                    data_manager: None,
                },
            ));
            fake
        }
    }

    #[async_trait]
    impl CompassApi for FakeCompass {
        async fn get_component_by_external_alias(&self, external_id: &str) -> Result<Option<Component>> {
            Ok(self
                .components
                .lock()
                .unwrap()
                .iter()
                .find(|(id, _)| id == external_id)
                .map(|(_, c)| c.clone()))
        }

        async fn create_component(&self, input: &CreateComponentInput) -> Result<Component> {
            if self.fail_create {
                return Err(IntegrationError::Compass("create rejected".to_string()));
            }
            self.created.lock().unwrap().push(input.clone());
            Ok(Component {
                id: format!("ari:cloud:compass:c:component/x/{}", input.name),
                name: input.name.clone(),
                description: input.description.clone(),
                type_id: Some(input.component_type.as_type_id().to_string()),
                data_manager: None,
            })
        }

        async fn create_external_alias(&self, component_id: &str, external_id: &str) -> Result<()> {
            self.aliases
                .lock()
                .unwrap()
                .push((component_id.to_string(), external_id.to_string()));
            Ok(())
        }

        async fn sync_component_with_file(&self, input: &SyncComponentInput) -> Result<()> {
            self.synced.lock().unwrap().push(input.clone());
            Ok(())
        }

        async fn unlink_component(&self, input: &UnlinkComponentInput) -> Result<()> {
            self.unlinked.lock().unwrap().push(input.clone());
            Ok(())
        }

        async fn insert_build_event(&self, event: &BuildEvent) -> Result<()> {
            self.builds.lock().unwrap().push(event.clone());
            Ok(())
        }

        async fn insert_deployment_event(&self, event: &DeploymentEvent) -> Result<()> {
            self.deployments.lock().unwrap().push(event.clone());
            Ok(())
        }

        async fn insert_metric_value(&self, value: &MetricValue) -> Result<()> {
            self.metric_values.lock().unwrap().push(value.clone());
            Ok(())
        }
    }

    /// Queue that only records what was pushed.
    #[derive(Default)]
    pub struct RecordingQueue {
        pub jobs: Mutex<Vec<(QueuedJob, Option<Duration>)>>,
        pub stats: Mutex<std::collections::HashMap<String, JobStats>>,
    }

    #[async_trait]
    impl JobQueue for RecordingQueue {
        async fn push(&self, job: QueuedJob, delay: Option<Duration>) -> Result<String> {
            let mut jobs = self.jobs.lock().unwrap();
            jobs.push((job, delay));
            Ok(format!("job-{}", jobs.len()))
        }

        async fn get_stats(&self, job_id: &str) -> Result<JobStats> {
            Ok(self.stats.lock().unwrap().get(job_id).copied().unwrap_or_default())
        }

        async fn forget(&self, job_ids: &[String]) -> Result<()> {
            let mut stats = self.stats.lock().unwrap();
            for id in job_ids {
                stats.remove(id);
            }
            Ok(())
        }
    }

    pub struct Fixture {
        pub ctx: Arc<AppContext>,
        pub compass: Arc<FakeCompass>,
        pub queue: Arc<RecordingQueue>,
        pub store: Arc<LocalStore>,
    }

    pub fn fixture(gitlab_url: &str, compass: FakeCompass) -> Fixture {
        let compass = Arc::new(compass);
        let queue = Arc::new(RecordingQueue::default());
        let store = Arc::new(LocalStore::in_memory());
        let settings = Settings {
            webhook_url: "https://hooks.example.com/webhook".to_string(),
            ..Settings::default()
        };
        let ctx = Arc::new(AppContext {
            gitlab: GitlabClient::new(gitlab_url).unwrap(),
            compass: compass.clone(),
            store: store.clone(),
            queue: queue.clone(),
            settings,
        });
        Fixture {
            ctx,
            compass,
            queue,
            store,
        }
    }

    /// Store a connected group with a token and webhook signature.
    pub async fn connect(store: &LocalStore, group_id: u64) {
        store
            .set(&keys::group(group_id), serde_json::json!("platform"))
            .await
            .unwrap();
        store.set_secret(&keys::token(group_id), "glpat-token").await.unwrap();
        store
            .set_secret(&keys::webhook_signature(group_id), "sig")
            .await
            .unwrap();
    }
}
