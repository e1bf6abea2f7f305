//! Connecting GitLab groups through group access tokens.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{import, webhooks, AppContext};
use crate::error::{IntegrationError, InvalidGroupTokenReason, Result};
use crate::gitlab::types::{AccessLevel, GitlabGroup};
use crate::platform::{keys, storage};

/// Scopes a group access token needs for everything the integration does.
pub const REQUIRED_SCOPES: [&str; 2] = ["api", "write_repository"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedGroup {
    pub id: u64,
    pub name: String,
    pub role: Option<AccessLevel>,
    /// A maintainer token cannot create hooks; the hook is added by hand
    pub webhook_setup_in_progress: bool,
}

fn invalid(reason: InvalidGroupTokenReason) -> IntegrationError {
    IntegrationError::InvalidGroupToken(reason)
}

/// Find the group the token belongs to and check the token's name, scopes
/// and role.
pub async fn validate_group_token(
    ctx: &AppContext,
    token: &str,
    token_name: &str,
) -> Result<(GitlabGroup, AccessLevel)> {
    let groups = ctx
        .gitlab
        .get_groups(token, Some(AccessLevel::Maintainer))
        .await
        .map_err(|e| {
            warn!("Group lookup with the provided token failed: {e}");
            invalid(InvalidGroupTokenReason::IncorrectToken)
        })?;

    // The token's own group is the top-most one it can see.
    let group = groups
        .into_iter()
        .min_by_key(|group| group.full_path.matches('/').count())
        .ok_or_else(|| invalid(InvalidGroupTokenReason::IncorrectToken))?;

    let tokens = ctx
        .gitlab
        .get_group_access_tokens(token, group.id)
        .await
        .map_err(|e| {
            warn!("Access token lookup for group {} failed: {e}", group.id);
            invalid(InvalidGroupTokenReason::IncorrectToken)
        })?;

    let access_token = tokens
        .iter()
        .find(|t| t.name == token_name && t.active && !t.revoked)
        .ok_or_else(|| invalid(InvalidGroupTokenReason::TokenName))?;

    let has_scopes = REQUIRED_SCOPES
        .iter()
        .all(|scope| access_token.scopes.iter().any(|s| s == scope));
    if !has_scopes {
        return Err(invalid(InvalidGroupTokenReason::IncorrectScopes));
    }

    let role = AccessLevel::from_level(access_token.access_level)
        .ok_or_else(|| invalid(InvalidGroupTokenReason::IncorrectToken))?;

    Ok((group, role))
}

async fn store_token(ctx: &AppContext, group_id: u64, token: &str, role: AccessLevel) -> Result<()> {
    ctx.store.set_secret(&keys::token(group_id), token).await?;
    ctx.store
        .set(&keys::token_role(group_id), json!(role.as_str()))
        .await
}

/// Connect the token's group. An owner's hook is registered before anything
/// is stored, so a failed registration leaves no trace of the group.
pub async fn connect_group(ctx: &AppContext, token: &str, token_name: &str) -> Result<ConnectedGroup> {
    let (group, role) = validate_group_token(ctx, token, token_name).await?;

    let in_progress = match role {
        AccessLevel::Owner => {
            webhooks::setup_webhook(ctx, group.id, token).await?;
            false
        }
        AccessLevel::Maintainer => {
            ctx.store
                .set(&keys::connect_in_progress(group.id), json!(true))
                .await?;
            true
        }
    };

    store_token(ctx, group.id, token, role).await?;
    ctx.store.set(&keys::group(group.id), json!(group.name)).await?;

    info!("Connected group {} ({}) as {}", group.name, group.id, role.as_str());
    Ok(ConnectedGroup {
        id: group.id,
        name: group.name,
        role: Some(role),
        webhook_setup_in_progress: in_progress,
    })
}

/// Store a hook a maintainer created by hand and finish connecting.
pub async fn complete_maintainer_setup(
    ctx: &AppContext,
    group_id: u64,
    webhook_id: u64,
    signature: &str,
) -> Result<()> {
    if ctx.store.get(&keys::group(group_id)).await?.is_none() {
        return Err(IntegrationError::NotFound(format!("Group {group_id} is not connected")));
    }

    storage::set_as(ctx.store.as_ref(), &keys::webhook_id(group_id), &webhook_id).await?;
    ctx.store
        .set_secret(&keys::webhook_signature(group_id), signature)
        .await?;
    ctx.store.delete(&keys::connect_in_progress(group_id)).await?;

    info!("Webhook {webhook_id} set up for group {group_id}");
    Ok(())
}

/// Replace the stored token. The new token must belong to the same group.
pub async fn rotate_token(ctx: &AppContext, group_id: u64, token: &str, token_name: &str) -> Result<()> {
    let (group, role) = validate_group_token(ctx, token, token_name).await?;
    if group.id != group_id {
        warn!("Token for group {} offered for group {group_id}", group.id);
        return Err(invalid(InvalidGroupTokenReason::IncorrectToken));
    }

    store_token(ctx, group_id, token, role).await?;
    info!("Rotated token for group {group_id}");
    Ok(())
}

/// Remove the group's hook, its secrets and every stored record of the group,
/// import state included.
pub async fn disconnect_group(ctx: &AppContext, group_id: u64) -> Result<()> {
    let hook_id: Option<u64> = storage::get_as(ctx.store.as_ref(), &keys::webhook_id(group_id)).await?;
    let role: Option<AccessLevel> = storage::get_as(ctx.store.as_ref(), &keys::token_role(group_id)).await?;

    if let (Some(hook_id), Some(AccessLevel::Owner)) = (hook_id, role) {
        let token = ctx.group_token(group_id).await?;
        webhooks::delete_webhook(ctx, &token, group_id, hook_id).await?;
    }

    for key in keys::group_keys(group_id) {
        ctx.store.delete(&key).await?;
    }
    for key in keys::group_secret_keys(group_id) {
        ctx.store.delete_secret(&key).await?;
    }
    import::forget_group_imports(ctx, group_id).await?;

    info!("Disconnected group {group_id}");
    Ok(())
}

pub async fn get_connected_groups(ctx: &AppContext) -> Result<Vec<ConnectedGroup>> {
    let mut groups = Vec::new();

    for (key, value) in ctx.store.query_prefix(keys::GROUP_PREFIX).await? {
        let Some(id) = keys::group_id_from_key(&key) else {
            continue;
        };
        let role: Option<AccessLevel> = storage::get_as(ctx.store.as_ref(), &keys::token_role(id)).await?;
        let in_progress = ctx
            .store
            .get(&keys::connect_in_progress(id))
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        groups.push(ConnectedGroup {
            id,
            name: value.as_str().unwrap_or_default().to_string(),
            role,
            webhook_setup_in_progress: in_progress,
        });
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::KeyValueStore;
    use crate::services::testing::{fixture, FakeCompass};
    use mockito::{Matcher, Server, ServerGuard};

    async fn gitlab_with_token(scopes: &str, access_level: u8) -> ServerGuard {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v4/groups")
            .match_query(Matcher::UrlEncoded("min_access_level".into(), "40".into()))
            .with_status(200)
            .with_body(
                r#"[{"id":8,"name":"billing","path":"billing","full_name":"platform / billing","full_path":"platform/billing"},
                    {"id":7,"name":"platform","path":"platform","full_name":"platform","full_path":"platform"}]"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/api/v4/groups/7/access_tokens")
            .with_status(200)
            .with_body(format!(
                r#"[{{"id":1,"name":"compass","scopes":{scopes},"access_level":{access_level},"active":true,"revoked":false,"expires_at":null}}]"#
            ))
            .create_async()
            .await;
        server
    }

    #[tokio::test]
    async fn rejected_token_is_incorrect_token() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v4/groups")
            .match_query(Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let f = fixture(&server.url(), FakeCompass::default());
        let err = connect_group(&f.ctx, "bad", "compass").await.unwrap_err();
        assert_eq!(err.error_type().as_deref(), Some("INCORRECT_TOKEN"));
    }

    #[tokio::test]
    async fn wrong_name_and_missing_scopes() {
        let server = gitlab_with_token(r#"["api"]"#, 50).await;
        let f = fixture(&server.url(), FakeCompass::default());

        let err = connect_group(&f.ctx, "t", "other").await.unwrap_err();
        assert_eq!(err.error_type().as_deref(), Some("TOKEN_NAME"));

        let err = connect_group(&f.ctx, "t", "compass").await.unwrap_err();
        assert_eq!(err.error_type().as_deref(), Some("INCORRECT_SCOPES"));
        assert!(f.store.get("group-7").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn maintainer_connect_waits_for_manual_hook() {
        let server = gitlab_with_token(r#"["api","write_repository"]"#, 40).await;
        let f = fixture(&server.url(), FakeCompass::default());

        let group = connect_group(&f.ctx, "glpat-x", "compass").await.unwrap();
        assert_eq!(group.id, 7);
        assert!(group.webhook_setup_in_progress);
        assert_eq!(f.store.get_secret("token-7").await.unwrap().as_deref(), Some("glpat-x"));

        complete_maintainer_setup(&f.ctx, 7, 12, "manual-sig").await.unwrap();
        let groups = get_connected_groups(&f.ctx).await.unwrap();
        assert_eq!(
            groups,
            vec![ConnectedGroup {
                id: 7,
                name: "platform".to_string(),
                role: Some(AccessLevel::Maintainer),
                webhook_setup_in_progress: false,
            }]
        );
    }

    #[tokio::test]
    async fn owner_connect_registers_hook_and_disconnect_cleans_up() {
        let mut server = gitlab_with_token(r#"["api","write_repository","read_api"]"#, 50).await;
        server
            .mock("POST", "/api/v4/groups/7/hooks")
            .with_status(201)
            .with_body(r#"{"id":21,"url":"https://hooks.example.com/webhook?groupId=7"}"#)
            .create_async()
            .await;
        let deleted = server
            .mock("DELETE", "/api/v4/groups/7/hooks/21")
            .with_status(204)
            .create_async()
            .await;

        let f = fixture(&server.url(), FakeCompass::default());
        let group = connect_group(&f.ctx, "glpat-x", "compass").await.unwrap();
        assert!(!group.webhook_setup_in_progress);
        assert!(f.store.get_secret("webhook-sign-7").await.unwrap().is_some());

        f.store.set("import-job-ids-7", json!(["job-1"])).await.unwrap();
        f.store.set("failed-import-7-42", json!({"projectId": 42})).await.unwrap();
        f.store.set("failed-import-8-43", json!({"projectId": 43})).await.unwrap();

        disconnect_group(&f.ctx, 7).await.unwrap();
        deleted.assert_async().await;
        assert!(get_connected_groups(&f.ctx).await.unwrap().is_empty());
        assert!(f.store.get("failed-import-7-42").await.unwrap().is_none());
        assert!(f.store.get("failed-import-8-43").await.unwrap().is_some());
        for key in keys::group_keys(7) {
            assert!(f.store.get(&key).await.unwrap().is_none(), "{key} left behind");
        }
        for key in keys::group_secret_keys(7) {
            assert!(f.store.get_secret(&key).await.unwrap().is_none(), "{key} left behind");
        }
    }

    #[tokio::test]
    async fn rotate_token_requires_same_group() {
        let server = gitlab_with_token(r#"["api","write_repository"]"#, 50).await;
        let f = fixture(&server.url(), FakeCompass::default());

        let err = rotate_token(&f.ctx, 99, "glpat-new", "compass").await.unwrap_err();
        assert!(matches!(
            err,
            IntegrationError::InvalidGroupToken(InvalidGroupTokenReason::IncorrectToken)
        ));

        rotate_token(&f.ctx, 7, "glpat-new", "compass").await.unwrap();
        assert_eq!(f.store.get_secret("token-7").await.unwrap().as_deref(), Some("glpat-new"));
    }

    #[tokio::test]
    async fn failed_hook_registration_stores_nothing() {
        let mut server = gitlab_with_token(r#"["api","write_repository"]"#, 50).await;
        server
            .mock("POST", "/api/v4/groups/7/hooks")
            .with_status(500)
            .create_async()
            .await;

        let f = fixture(&server.url(), FakeCompass::default());
        assert!(connect_group(&f.ctx, "glpat", "compass").await.is_err());

        assert!(get_connected_groups(&f.ctx).await.unwrap().is_empty());
        for key in keys::group_keys(7) {
            assert!(f.store.get(&key).await.unwrap().is_none(), "{key} left behind");
        }
        for key in keys::group_secret_keys(7) {
            assert!(f.store.get_secret(&key).await.unwrap().is_none(), "{key} left behind");
        }
    }
}
