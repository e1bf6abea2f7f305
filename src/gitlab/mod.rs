pub mod client;
pub mod links;
pub mod pagination;
pub mod types;

pub use client::GitlabClient;
