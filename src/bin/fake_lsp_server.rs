//! A scripted, Content-Length-framed JSON-RPC server used only by the
//! integration test suite (see `tests/support/mod.rs`). Not shipped as
//! part of the `lspc` CLI — it exists purely to give the transport layer
//! a real subprocess to talk to in tests.
//!
//! Reads a JSON script naming `argv[1]`: a sequence of steps, each of which
//! consumes one incoming framed message (optionally replying to it if it
//! was a request) and then emits zero or more notifications.

use serde::Deserialize;
use serde_json::Value;
use std::io::{self, BufRead, Read, Write};
use std::time::Duration;

#[derive(Deserialize)]
struct Script {
    steps: Vec<Step>,
}

#[derive(Deserialize)]
struct Step {
    /// Present when this step should consume one incoming message first.
    /// The value itself isn't matched against — it only documents intent
    /// for readers of the script file.
    #[serde(default)]
    expect_method: Option<String>,
    /// If the consumed message carried an `id`, reply with this result.
    #[serde(default)]
    respond: Option<Value>,
    #[serde(default)]
    notifications: Vec<NotificationStep>,
    /// Stop processing further steps (used after `exit`).
    #[serde(default)]
    exit_after: bool,
}

#[derive(Deserialize)]
struct NotificationStep {
    method: String,
    params: Value,
    #[serde(default)]
    delay_ms: u64,
}

fn main() {
    let script_path = std::env::args().nth(1).expect("usage: fake_lsp_server <script.json>");
    let script_text = std::fs::read_to_string(&script_path).expect("read fake lsp script");
    let script: Script = serde_json::from_str(&script_text).expect("parse fake lsp script");

    let stdin = io::stdin();
    let mut reader = io::BufReader::new(stdin.lock());
    let stdout = io::stdout();
    let mut writer = stdout.lock();

    for step in script.steps {
        if step.expect_method.is_some() {
            let Some(body) = read_frame(&mut reader) else {
                break;
            };
            let incoming: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
            if let (Some(result), Some(id)) = (&step.respond, incoming.get("id").cloned()) {
                write_frame(
                    &mut writer,
                    &serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": result }),
                );
            }
        }

        for note in &step.notifications {
            if note.delay_ms > 0 {
                std::thread::sleep(Duration::from_millis(note.delay_ms));
            }
            write_frame(
                &mut writer,
                &serde_json::json!({ "jsonrpc": "2.0", "method": note.method, "params": note.params }),
            );
        }

        if step.exit_after {
            break;
        }
    }
}

fn read_frame<R: BufRead>(reader: &mut R) -> Option<Vec<u8>> {
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).ok()?;
        if n == 0 {
            return None;
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some(value) = trimmed.strip_prefix("Content-Length: ") {
            content_length = value.trim().parse().ok();
        }
    }
    let length = content_length?;
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).ok()?;
    Some(body)
}

fn write_frame<W: Write>(writer: &mut W, value: &Value) {
    let body = serde_json::to_vec(value).expect("serialize fake lsp frame");
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let _ = writer.write_all(header.as_bytes());
    let _ = writer.write_all(&body);
    let _ = writer.flush();
}
