use crate::account;
use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};

/// account.link — derive and store the access token for a workspace.
///
/// Params: { workspace, userId? }. `userId` falls back to the configured
/// upstream user id. The stored token becomes the Bearer sent upstream
/// for this workspace.
pub async fn link(params: Value, ctx: &AppContext) -> Result<Value> {
    let workspace = params["workspace"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("INVALID_PARAMS: missing workspace"))?;
    let user_id = params["userId"]
        .as_str()
        .unwrap_or(&ctx.config.upstream.user_id);

    let token = account::derive_token(user_id, workspace);
    let link = ctx
        .storage
        .upsert_account_link(workspace, user_id, &token)
        .await?;

    Ok(json!({
        "workspace": link.workspace,
        "userId": link.user_id,
        "token": link.token,
        "linkedAt": link.linked_at,
    }))
}

/// account.validate — check a token against the workspace derivation.
///
/// Params: { workspace, token, userId? }. The user id is resolved from
/// the params, then the stored link, then the configured default.
pub async fn validate(params: Value, ctx: &AppContext) -> Result<Value> {
    let workspace = params["workspace"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("INVALID_PARAMS: missing workspace"))?;
    let token = params["token"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("INVALID_PARAMS: missing token"))?;

    let user_id = match params["userId"].as_str() {
        Some(user_id) => user_id.to_string(),
        None => match ctx.storage.get_account_link(workspace).await? {
            Some(link) => link.user_id,
            None => ctx.config.upstream.user_id.clone(),
        },
    };

    let valid = account::validate_token(&user_id, workspace, token);
    Ok(json!({ "valid": valid }))
}

/// account.get — the stored link for a workspace, if any.
///
/// Params: { workspace }.
pub async fn get(params: Value, ctx: &AppContext) -> Result<Value> {
    let workspace = params["workspace"]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("INVALID_PARAMS: missing workspace"))?;

    Ok(match ctx.storage.get_account_link(workspace).await? {
        Some(link) => json!({
            "linked": true,
            "workspace": link.workspace,
            "userId": link.user_id,
            "token": link.token,
            "linkedAt": link.linked_at,
        }),
        None => json!({ "linked": false }),
    })
}
