//! GitLab webhook receiver.

pub mod events;
mod handler;

pub use handler::{handle_webhook, WebhookRequest};
