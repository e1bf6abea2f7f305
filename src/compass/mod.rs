//! Compass catalog access.

pub mod client;
mod queries;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use types::{
    BuildEvent, Component, CreateComponentInput, DeploymentEvent, MetricValue,
    SyncComponentInput, UnlinkComponentInput,
};

pub use client::CompassClient;

/// Operations the integration performs against the catalog.
#[async_trait]
pub trait CompassApi: Send + Sync {
    /// `None` when no component carries the alias.
    async fn get_component_by_external_alias(&self, external_id: &str) -> Result<Option<Component>>;

    async fn create_component(&self, input: &CreateComponentInput) -> Result<Component>;

    async fn create_external_alias(&self, component_id: &str, external_id: &str) -> Result<()>;

    /// Apply a `compass.yml` file to the component it names and mark the
    /// component as managed by that file.
    async fn sync_component_with_file(&self, input: &SyncComponentInput) -> Result<()>;

    /// Release a component whose `compass.yml` was removed.
    async fn unlink_component(&self, input: &UnlinkComponentInput) -> Result<()>;

    async fn insert_build_event(&self, event: &BuildEvent) -> Result<()>;

    async fn insert_deployment_event(&self, event: &DeploymentEvent) -> Result<()>;

    async fn insert_metric_value(&self, value: &MetricValue) -> Result<()>;
}
