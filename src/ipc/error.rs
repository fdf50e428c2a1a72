use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::Display;

use crate::bridge::BridgeError;
use crate::controller::ProcessError;
use crate::report::ConfigEditError;
use crate::store::StorageError;

/// Component errors that surface on the wire as `{code, message}`.
pub trait ErrorCode: Display {
    fn code(&self) -> &'static str;
}

impl ErrorCode for ProcessError {
    fn code(&self) -> &'static str {
        ProcessError::code(self)
    }
}

impl ErrorCode for ConfigEditError {
    fn code(&self) -> &'static str {
        "out_of_range"
    }
}

impl ErrorCode for StorageError {
    fn code(&self) -> &'static str {
        "storage_failed"
    }
}

impl ErrorCode for BridgeError {
    fn code(&self) -> &'static str {
        "send_failed"
    }
}

pub fn ok(id: &str, result: impl Serialize) -> Value {
    match serde_json::to_value(result) {
        Ok(result) => json!({ "id": id, "ok": true, "result": result }),
        Err(e) => err(id, "encode_failed", e, None),
    }
}

pub fn err(id: &str, code: &str, message: impl Display, details: Option<Value>) -> Value {
    let mut error = json!({ "code": code, "message": message.to_string() });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({ "id": id, "ok": false, "error": error })
}

pub fn failure(id: &str, e: &impl ErrorCode) -> Value {
    err(id, e.code(), e, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_errors_keep_their_codes() {
        let resp = failure("7", &ConfigEditError::FieldOutOfRange { tab: 1, field: 4 });
        assert_eq!(resp["id"], "7");
        assert_eq!(resp["ok"], false);
        assert_eq!(resp["error"]["code"], "out_of_range");
        assert_eq!(resp["error"]["message"], "field index 4 out of range for tab 1");
        assert!(resp["error"].get("details").is_none());

        let resp = failure("8", &ProcessError::NoArtifact);
        assert_eq!(resp["error"]["code"], "no_artifact");
    }

    #[test]
    fn ok_serializes_typed_results() {
        let resp = ok("1", crate::report::ReportConfig::default());
        assert_eq!(resp["ok"], true);
        assert_eq!(resp["result"]["reportname"], "9.1.06");
    }
}
