//! Group webhook registration and signature checks.

use log::{debug, info, warn};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::json;

use super::AppContext;
use crate::error::{IntegrationError, Result};
use crate::gitlab::client::HookRegistration;
use crate::gitlab::types::AccessLevel;
use crate::platform::{keys, storage, KeyValueStore};

const SIGNATURE_LENGTH: usize = 32;

pub fn generate_signature() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SIGNATURE_LENGTH)
        .map(char::from)
        .collect()
}

/// Hook URL registered for a group; the group id travels in the query.
pub fn group_webhook_url(base: &str, group_id: u64) -> String {
    format!("{base}?groupId={group_id}")
}

/// Compare the `x-gitlab-token` header with the stored signature. A missing
/// stored signature or a missing header is a mismatch.
pub async fn verify_webhook_signature(
    store: &dyn KeyValueStore,
    group_id: u64,
    claimed: Option<&str>,
) -> Result<()> {
    let stored = store.get_secret(&keys::webhook_signature(group_id)).await?;
    match (stored.as_deref(), claimed) {
        (Some(expected), Some(claimed)) if expected.as_bytes() == claimed.as_bytes() => Ok(()),
        _ => Err(IntegrationError::ValidateWebhookSignature),
    }
}

/// Register a new hook with a fresh signature and store both.
pub async fn setup_webhook(ctx: &AppContext, group_id: u64, token: &str) -> Result<u64> {
    let signature = generate_signature();
    let registration = HookRegistration::all_events(
        group_webhook_url(&ctx.settings.webhook_url, group_id),
        signature.clone(),
    );

    let hook = ctx
        .gitlab
        .register_group_webhook(token, group_id, &registration)
        .await?;

    storage::set_as(ctx.store.as_ref(), &keys::webhook_id(group_id), &hook.id).await?;
    ctx.store
        .set_secret(&keys::webhook_signature(group_id), &signature)
        .await?;

    info!("Registered webhook {} for group {group_id}", hook.id);
    Ok(hook.id)
}

/// Delete a hook, treating an already deleted hook as success.
pub async fn delete_webhook(ctx: &AppContext, token: &str, group_id: u64, hook_id: u64) -> Result<()> {
    match ctx.gitlab.delete_group_webhook(token, group_id, hook_id).await {
        Ok(()) => Ok(()),
        Err(err) if err.is_not_found() => {
            debug!("Webhook {hook_id} of group {group_id} was already gone");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Replace the group's hook and signature. Only an owner token can manage
/// hooks; for any other role the group goes back to waiting for a hook added
/// by hand and `None` is returned.
pub async fn rotate_webhook(ctx: &AppContext, group_id: u64) -> Result<Option<u64>> {
    let token = ctx.group_token(group_id).await?;
    let role: Option<AccessLevel> = storage::get_as(ctx.store.as_ref(), &keys::token_role(group_id)).await?;

    if role != Some(AccessLevel::Owner) {
        info!("Group {group_id} cannot manage hooks; waiting for a manual webhook");
        ctx.store
            .set(&keys::connect_in_progress(group_id), json!(true))
            .await?;
        return Ok(None);
    }

    let existing: Option<u64> = storage::get_as(ctx.store.as_ref(), &keys::webhook_id(group_id)).await?;
    if let Some(hook_id) = existing {
        if let Err(e) = delete_webhook(ctx, &token, group_id, hook_id).await {
            warn!("Could not delete webhook {hook_id} of group {group_id}: {e}");
            return Err(e);
        }
    }

    setup_webhook(ctx, group_id, &token).await.map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::LocalStore;
    use crate::services::testing::{connect, fixture, FakeCompass};
    use mockito::{Matcher, Server};

    #[test]
    fn signatures_are_random_alphanumeric() {
        let a = generate_signature();
        let b = generate_signature();
        assert_eq!(a.len(), SIGNATURE_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn signature_must_match_stored_value() {
        let store = LocalStore::in_memory();
        store.set_secret("webhook-sign-5", "expected").await.unwrap();

        assert!(verify_webhook_signature(&store, 5, Some("expected")).await.is_ok());
        for claimed in [Some("wrong"), Some(""), None] {
            let err = verify_webhook_signature(&store, 5, claimed).await.unwrap_err();
            assert!(matches!(err, IntegrationError::ValidateWebhookSignature));
        }

        let err = verify_webhook_signature(&store, 6, Some("expected")).await.unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[tokio::test]
    async fn rotation_replaces_hook_and_signature() {
        let mut server = Server::new_async().await;
        let deleted = server
            .mock("DELETE", "/api/v4/groups/7/hooks/3")
            .with_status(404)
            .create_async()
            .await;
        let created = server
            .mock("POST", "/api/v4/groups/7/hooks")
            .match_body(Matcher::PartialJson(json!({
                "url": "https://hooks.example.com/webhook?groupId=7"
            })))
            .with_status(201)
            .with_body(r#"{"id":4,"url":"https://hooks.example.com/webhook?groupId=7"}"#)
            .create_async()
            .await;

        let f = fixture(&server.url(), FakeCompass::default());
        connect(&f.store, 7).await;
        f.store.set("token-role-7", json!("owner")).await.unwrap();
        f.store.set("webhook-id-7", json!(3)).await.unwrap();

        assert_eq!(rotate_webhook(&f.ctx, 7).await.unwrap(), Some(4));
        assert_eq!(f.store.get("webhook-id-7").await.unwrap(), Some(json!(4)));
        let signature = f.store.get_secret("webhook-sign-7").await.unwrap().unwrap();
        assert_ne!(signature, "sig");

        deleted.assert_async().await;
        created.assert_async().await;
    }

    #[tokio::test]
    async fn maintainer_rotation_leaves_gitlab_alone() {
        let mut server = Server::new_async().await;
        let deleted = server
            .mock("DELETE", Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let created = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let f = fixture(&server.url(), FakeCompass::default());
        connect(&f.store, 7).await;
        f.store.set("token-role-7", json!("maintainer")).await.unwrap();
        f.store.set("webhook-id-7", json!(3)).await.unwrap();

        assert_eq!(rotate_webhook(&f.ctx, 7).await.unwrap(), None);
        assert_eq!(f.store.get("connect-in-progress-7").await.unwrap(), Some(json!(true)));
        assert_eq!(f.store.get("webhook-id-7").await.unwrap(), Some(json!(3)));

        deleted.assert_async().await;
        created.assert_async().await;
    }
}
