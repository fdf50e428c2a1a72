use crate::ipc::error::{err, failure, ok};
use crate::ipc::helpers::{optional_str, required_index};
use crate::ipc::types::{AppState, Request};
use crate::report::{ConfigEditError, ReportConfig};
use serde_json::json;

fn config_result(state: &AppState) -> serde_json::Value {
    let config = state.controller.config();
    let blank: Vec<_> = config
        .blank_fields()
        .into_iter()
        .map(|(tab, field)| json!({ "tabIndex": tab, "fieldIndex": field }))
        .collect();
    json!({ "config": config, "blankFields": blank })
}

fn handle_get(state: &AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, config_result(state))
}

fn handle_set(state: &AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("config") else {
        return err(&req.id, "bad_params", "missing config", None);
    };
    let config: ReportConfig = match serde_json::from_value(raw.clone()) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "bad_params", format!("invalid config: {e}"), None),
    };
    state.controller.set_config(config);
    ok(&req.id, config_result(state))
}

fn handle_reset(state: &AppState, req: &Request) -> serde_json::Value {
    state.controller.set_config(ReportConfig::default());
    ok(&req.id, config_result(state))
}

fn handle_set_report_name(state: &AppState, req: &Request) -> serde_json::Value {
    let Some(name) = optional_str(req, "reportName") else {
        return err(&req.id, "bad_params", "missing reportName", None);
    };
    state.controller.update_config(|c| c.set_report_name(name));
    ok(&req.id, config_result(state))
}

fn handle_add_tab(state: &AppState, req: &Request) -> serde_json::Value {
    let tab_id = optional_str(req, "tabId").unwrap_or("").to_string();
    let index = state.controller.update_config(|c| c.add_tab(tab_id));
    let mut result = config_result(state);
    result["tabIndex"] = json!(index);
    ok(&req.id, result)
}

fn handle_remove_tab(state: &AppState, req: &Request) -> serde_json::Value {
    let tab = match required_index(req, "tabIndex") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match state.controller.update_config(|c| c.remove_tab(tab)) {
        Ok(_) => ok(&req.id, config_result(state)),
        Err(e) => failure(&req.id, &e),
    }
}

fn handle_add_field(state: &AppState, req: &Request) -> serde_json::Value {
    let tab = match required_index(req, "tabIndex") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = optional_str(req, "name");
    let value = optional_str(req, "value");
    let added = state.controller.update_config(|c| {
        let field = c.add_field(tab)?;
        c.update_field(tab, field, name, value)?;
        Ok::<_, ConfigEditError>(field)
    });
    match added {
        Ok(field) => {
            let mut result = config_result(state);
            result["fieldIndex"] = json!(field);
            ok(&req.id, result)
        }
        Err(e) => failure(&req.id, &e),
    }
}

fn handle_update_field(state: &AppState, req: &Request) -> serde_json::Value {
    let tab = match required_index(req, "tabIndex") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let field = match required_index(req, "fieldIndex") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = optional_str(req, "name");
    let value = optional_str(req, "value");
    match state
        .controller
        .update_config(|c| c.update_field(tab, field, name, value))
    {
        Ok(()) => ok(&req.id, config_result(state)),
        Err(e) => failure(&req.id, &e),
    }
}

fn handle_remove_field(state: &AppState, req: &Request) -> serde_json::Value {
    let tab = match required_index(req, "tabIndex") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let field = match required_index(req, "fieldIndex") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match state.controller.update_config(|c| c.remove_field(tab, field)) {
        Ok(_) => ok(&req.id, config_result(state)),
        Err(e) => failure(&req.id, &e),
    }
}

pub async fn try_handle(state: &AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "config.get" => Some(handle_get(state, req)),
        "config.set" => Some(handle_set(state, req)),
        "config.reset" => Some(handle_reset(state, req)),
        "config.setReportName" => Some(handle_set_report_name(state, req)),
        "config.addTab" => Some(handle_add_tab(state, req)),
        "config.removeTab" => Some(handle_remove_tab(state, req)),
        "config.addField" => Some(handle_add_field(state, req)),
        "config.updateField" => Some(handle_update_field(state, req)),
        "config.removeField" => Some(handle_remove_field(state, req)),
        _ => None,
    }
}
