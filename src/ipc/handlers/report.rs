use crate::ipc::error::{failure, ok};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

async fn handle_probe(state: &AppState, req: &Request) -> serde_json::Value {
    let status = state.controller.probe_extension().await;
    ok(&req.id, json!({ "extension": status }))
}

fn handle_download(state: &AppState, req: &Request) -> serde_json::Value {
    match state.controller.request_download() {
        Ok(generation) => ok(&req.id, json!({ "generation": generation })),
        Err(e) => failure(&req.id, &e),
    }
}

async fn handle_process_file(state: &AppState, req: &Request) -> serde_json::Value {
    let path = match required_str(req, "path") {
        Ok(p) => PathBuf::from(p),
        Err(e) => return e,
    };
    match state.controller.process_file(&path).await {
        Ok(outcome) => ok(
            &req.id,
            json!({
                "records": outcome.records,
                "artifact": outcome.artifact,
                "downloaded": outcome.downloaded.map(|p| p.to_string_lossy().to_string()),
            }),
        ),
        Err(e) => failure(&req.id, &e),
    }
}

async fn handle_artifact_download(state: &AppState, req: &Request) -> serde_json::Value {
    match state.controller.download_artifact().await {
        Ok(path) => ok(&req.id, json!({ "path": path.to_string_lossy() })),
        Err(e) => failure(&req.id, &e),
    }
}

pub async fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "extension.probe" => Some(handle_probe(state, req).await),
        "report.download" => Some(handle_download(state, req)),
        "report.processFile" => Some(handle_process_file(state, req).await),
        "artifact.download" => Some(handle_artifact_download(state, req).await),
        _ => None,
    }
}
