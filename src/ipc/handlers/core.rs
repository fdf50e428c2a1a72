use crate::ipc::error::ok;
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_health(state: &AppState, req: &Request) -> serde_json::Value {
    let snap = state.controller.snapshot();
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "origin": state.settings.origin,
            "phase": snap.phase,
            "extension": snap.extension,
        }),
    )
}

fn handle_state_get(state: &AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, state.controller.snapshot())
}

pub async fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "state.get" => Some(handle_state_get(state, req)),
        _ => None,
    }
}
