#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

pub fn fixture_path(rel: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join(rel)
}

pub fn sample_report() -> String {
    std::fs::read_to_string(fixture_path("fixtures/examinatoren.html")).expect("read fixture")
}

pub fn spawn_sidecar(data_dir: &Path, output_dir: &Path) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    spawn_sidecar_with(data_dir, output_dir, &[])
}

pub fn spawn_sidecar_with(
    data_dir: &Path,
    output_dir: &Path,
    extra: &[&str],
) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_examinatord");
    let mut cmd = Command::new(exe);
    for (key, _) in std::env::vars() {
        if key.starts_with("EXAMINATORD_") {
            cmd.env_remove(key);
        }
    }
    let mut child = cmd
        .arg("--data-dir")
        .arg(data_dir)
        .arg("--output-dir")
        .arg(output_dir)
        .args(extra)
        .arg("serve")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn examinatord");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn send_line(stdin: &mut ChildStdin, value: &serde_json::Value) {
    writeln!(stdin, "{}", value).expect("write line");
    stdin.flush().expect("flush line");
}

/// Reads stdout until a line satisfies `pred`. Events and envelopes the
/// sidecar pushes in between are skipped.
pub fn read_until(
    reader: &mut BufReader<ChildStdout>,
    pred: impl Fn(&serde_json::Value) -> bool,
) -> serde_json::Value {
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).expect("read line");
        assert!(n > 0, "sidecar closed stdout");
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse json line");
        if pred(&value) {
            return value;
        }
    }
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    send_line(stdin, &json!({ "id": id, "method": method, "params": params }));
    read_until(reader, |v| v.get("id").and_then(|v| v.as_str()) == Some(id))
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}

pub fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

/// Reads stdout until responses for all `ids` arrived and returns the ids in
/// the order their responses were written.
pub fn response_order(reader: &mut BufReader<ChildStdout>, ids: &[&str]) -> Vec<String> {
    let mut seen = Vec::new();
    while seen.len() < ids.len() {
        let line = read_until(reader, |v| {
            v.get("id")
                .and_then(|v| v.as_str())
                .is_some_and(|id| ids.contains(&id))
        });
        seen.push(line["id"].as_str().unwrap_or_default().to_string());
    }
    seen
}
