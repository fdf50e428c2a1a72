use crate::ipc::error::{err, failure, ok};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use crate::permission::GrantOutcome;
use serde_json::json;
use std::path::PathBuf;

async fn handle_status(state: &AppState, req: &Request) -> serde_json::Value {
    let status = state.controller.refresh_permission().await;
    let auto = state.controller.gate().is_auto_capable().await;
    ok(&req.id, json!({ "status": status, "autoCapable": auto }))
}

async fn handle_grant(state: &AppState, req: &Request) -> serde_json::Value {
    let path = match required_str(req, "path") {
        Ok(p) => PathBuf::from(p),
        Err(e) => return e,
    };
    match state.controller.grant_permission(&path).await {
        Ok(GrantOutcome::Granted(record)) => ok(
            &req.id,
            json!({ "granted": true, "name": record.name, "createdAt": record.created_at }),
        ),
        Ok(GrantOutcome::Denied(s)) => ok(&req.id, json!({ "granted": false, "state": s })),
        Ok(GrantOutcome::Unsupported) => err(
            &req.id,
            "unsupported",
            "directory access is not available on this runtime",
            None,
        ),
        Err(e) => failure(&req.id, &e),
    }
}

async fn handle_focus(state: &AppState, req: &Request) -> serde_json::Value {
    let status = state.controller.refresh_permission().await;
    ok(&req.id, json!({ "status": status }))
}

pub async fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "permission.status" => Some(handle_status(state, req).await),
        "permission.grant" => Some(handle_grant(state, req).await),
        "page.focus" => Some(handle_focus(state, req).await),
        _ => None,
    }
}
