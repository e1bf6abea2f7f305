mod core;
mod groups;
mod hooks;
mod merge_requests;
mod pipelines;
mod projects;

pub use self::core::{GitlabClient, GitlabResponse};
pub use self::hooks::HookRegistration;
pub use self::merge_requests::MergeRequestFilter;
pub use self::pipelines::{DeploymentFilter, PipelineFilter};
