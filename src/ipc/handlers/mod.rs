pub mod account;
pub mod chat;
pub mod daemon;
pub mod edit;
pub mod editor;
pub mod files;
pub mod inline;
pub mod review;
pub mod workspace;

use crate::AppContext;
use serde_json::Value;

/// Bearer token for the request's workspace, when one is linked.
///
/// Called with the raw params before they are deserialized. A missing or
/// unlinked `workspace` is not an error — upstream calls fall back to the
/// configured default user id.
pub(crate) async fn workspace_bearer(params: &Value, ctx: &AppContext) -> Option<String> {
    let workspace = params.get("workspace").and_then(Value::as_str)?;
    ctx.storage
        .get_account_link(workspace)
        .await
        .ok()
        .flatten()
        .map(|link| link.token)
}
