#[path = "support/mod.rs"]
mod support;

use lspc::handlers::hover::NO_HOVER_MESSAGE;
use lspc::registry::DiagnosticsReadyPredicate;
use lspc::session::SessionManager;
use serde_json::json;
use std::time::Duration;

/// Scenario 5: hovering a symbol that resolves via `documentSymbol` renders
/// the exact `Location:` prefix spec §8 names, 1-based.
#[tokio::test]
async fn hover_on_known_symbol_reports_its_location() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("simple-module.py");
    std::fs::write(&file, "def add(a, b):\n    return a + b\n").unwrap();
    let uri = support::file_uri(&file);

    let mut steps = support::handshake_steps();
    steps.push(json!({
        "expect_method": "textDocument/didOpen"
    }));
    steps.push(json!({
        "expect_method": "textDocument/documentSymbol",
        "respond": [{
            "name": "add",
            "location": {
                "uri": uri,
                "range": {"start": {"line": 0, "character": 4}, "end": {"line": 0, "character": 7}}
            }
        }]
    }));
    steps.push(json!({
        "expect_method": "textDocument/hover",
        "respond": { "contents": { "kind": "markdown", "value": "```python\ndef add(a, b)\n```" } }
    }));
    steps.push(json!({ "expect_method": "textDocument/didClose" }));

    let script = support::write_script(tmp.path(), "hover_add.json", json!({ "steps": steps }));
    let descriptor = support::fake_descriptor("pylsp", "python", ".py", &script, DiagnosticsReadyPredicate::PublishDiagnostics);
    let session = SessionManager::new(support::registry_with(descriptor));

    let text = lspc::handlers::hover::hover(&session, &file, "add", Duration::from_secs(2))
        .await
        .unwrap();

    let expected_prefix = format!("Location: {}:1:5", file.display());
    assert!(text.starts_with(&expected_prefix), "got: {text}");
    assert!(text.contains("def add(a, b)"));
}

/// Scenario 6: a symbol that isn't present anywhere in `documentSymbol`
/// falls back to the exact fixed message, not an error.
#[tokio::test]
async fn hover_on_absent_symbol_falls_back_to_fixed_message() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("simple-module.py");
    std::fs::write(&file, "def add(a, b):\n    return a + b\n").unwrap();

    let mut steps = support::handshake_steps();
    steps.push(json!({ "expect_method": "textDocument/didOpen" }));
    steps.push(json!({
        "expect_method": "textDocument/documentSymbol",
        "respond": [{
            "name": "add",
            "location": {
                "uri": support::file_uri(&file),
                "range": {"start": {"line": 0, "character": 4}, "end": {"line": 0, "character": 7}}
            }
        }]
    }));
    steps.push(json!({ "expect_method": "textDocument/didClose" }));

    let script = support::write_script(tmp.path(), "hover_absent.json", json!({ "steps": steps }));
    let descriptor = support::fake_descriptor("pylsp", "python", ".py", &script, DiagnosticsReadyPredicate::PublishDiagnostics);
    let session = SessionManager::new(support::registry_with(descriptor));

    let text = lspc::handlers::hover::hover(&session, &file, "NonExistentSymbol", Duration::from_secs(2))
        .await
        .unwrap();

    assert_eq!(text, NO_HOVER_MESSAGE);
}

/// Hovering a file with no registered server falls back the same way an
/// empty `documentSymbol` result would, rather than failing the request.
#[tokio::test]
async fn hover_on_unknown_extension_falls_back_rather_than_failing() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("notes.txt");
    std::fs::write(&file, "no server for this\n").unwrap();

    let session = SessionManager::new(lspc::registry::Registry::builtin());
    let text = lspc::handlers::hover::hover(&session, &file, "anything", Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(text, NO_HOVER_MESSAGE);
}
