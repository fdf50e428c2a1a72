use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

/// Methods that may wait on the extension or on file I/O for a while. The
/// stdin loop runs these as tasks; their responses can overtake later ones.
pub fn runs_detached(method: &str) -> bool {
    matches!(method, "extension.probe" | "report.processFile")
}

pub async fn handle_request(state: &AppState, req: Request) -> serde_json::Value {
    tracing::debug!(id = %req.id, method = %req.method, "request");
    if let Some(resp) = handlers::core::try_handle(state, &req).await {
        return resp;
    }
    if let Some(resp) = handlers::config::try_handle(state, &req).await {
        return resp;
    }
    if let Some(resp) = handlers::permission::try_handle(state, &req).await {
        return resp;
    }
    if let Some(resp) = handlers::report::try_handle(state, &req).await {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
