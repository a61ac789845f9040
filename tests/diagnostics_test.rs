#[path = "support/mod.rs"]
mod support;

use lspc::registry::DiagnosticsReadyPredicate;
use lspc::session::SessionManager;
use serde_json::json;
use std::time::Duration;

/// Scenario 1: a clean file reports no diagnostics.
#[tokio::test]
async fn go_valid_file_reports_no_diagnostics() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("simple-function.go");
    std::fs::write(&file, "package main\n\nfunc main() {}\n").unwrap();
    let uri = support::file_uri(&file);

    let mut steps = support::handshake_steps();
    steps.push(json!({
        "expect_method": "textDocument/didOpen",
        "notifications": [{
            "method": "textDocument/publishDiagnostics",
            "params": { "uri": uri, "version": 1, "diagnostics": [] }
        }]
    }));
    steps.push(json!({ "expect_method": "textDocument/didClose" }));

    let script = support::write_script(tmp.path(), "go_valid.json", json!({ "steps": steps }));
    let descriptor = support::fake_descriptor("gopls", "go", ".go", &script, DiagnosticsReadyPredicate::PublishDiagnostics);
    let session = SessionManager::new(support::registry_with(descriptor));

    let outcome = lspc::handlers::diagnostics::diagnostics(&session, &file, Duration::from_secs(2))
        .await
        .unwrap();

    assert!(outcome.lines.is_empty());
    assert!(!outcome.has_issues);
}

/// Scenario 2: the exact compiler diagnostic line from the spec's Go
/// type-error fixture.
#[tokio::test]
async fn go_type_error_matches_exact_wire_format() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("type-error.go");
    std::fs::write(&file, "package main\n\nfunc main() {\n\tvar n int\n\t_ = n\n\tn = \"hello world\"\n}\n").unwrap();
    let uri = support::file_uri(&file);

    let mut steps = support::handshake_steps();
    steps.push(json!({
        "expect_method": "textDocument/didOpen",
        "notifications": [{
            "method": "textDocument/publishDiagnostics",
            "params": {
                "uri": uri,
                "version": 1,
                "source": "compiler",
                "diagnostics": [{
                    "range": {"start": {"line": 5, "character": 13}, "end": {"line": 5, "character": 30}},
                    "severity": 1,
                    "message": "cannot use \"hello world\" (untyped string constant) as int value in variable declaration",
                    "code": "IncompatibleAssign"
                }]
            }
        }]
    }));
    steps.push(json!({ "expect_method": "textDocument/didClose" }));

    let script = support::write_script(tmp.path(), "go_type_error.json", json!({ "steps": steps }));
    let descriptor = support::fake_descriptor("gopls", "go", ".go", &script, DiagnosticsReadyPredicate::PublishDiagnostics);
    let session = SessionManager::new(support::registry_with(descriptor));

    let outcome = lspc::handlers::diagnostics::diagnostics(&session, &file, Duration::from_secs(2))
        .await
        .unwrap();

    assert!(outcome.has_issues);
    assert_eq!(
        outcome.lines,
        vec!["[compiler] ERROR at line 6, column 14: cannot use \"hello world\" (untyped string constant) as int value in variable declaration [IncompatibleAssign]"]
    );
}

/// Scenario 3: a large payload (>=100 diagnostics) round-trips intact, with
/// no truncation or reparse artifact leaking into the formatted output.
#[tokio::test]
async fn typescript_large_payload_preserves_every_diagnostic() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("large-payload.ts");
    std::fs::write(&file, "// large payload fixture\n").unwrap();
    let uri = support::file_uri(&file);

    let diagnostics: Vec<Value> = (0..120)
        .map(|i| {
            json!({
                "range": {"start": {"line": i, "character": 0}, "end": {"line": i, "character": 5}},
                "severity": 1,
                "message": format!("type error number {i}"),
                "code": i
            })
        })
        .collect();

    let mut steps = support::handshake_steps();
    steps.push(json!({
        "expect_method": "textDocument/didOpen",
        "notifications": [{
            "method": "textDocument/publishDiagnostics",
            "params": { "uri": uri, "version": 1, "source": "typescript", "diagnostics": diagnostics }
        }]
    }));
    steps.push(json!({ "expect_method": "textDocument/didClose" }));

    let script = support::write_script(tmp.path(), "ts_large.json", json!({ "steps": steps }));
    let descriptor = support::fake_descriptor(
        "typescript-language-server",
        "typescript",
        ".ts",
        &script,
        DiagnosticsReadyPredicate::QuiescenceWindow(Duration::from_millis(50)),
    );
    let session = SessionManager::new(support::registry_with(descriptor));

    let outcome = lspc::handlers::diagnostics::diagnostics(&session, &file, Duration::from_secs(2))
        .await
        .unwrap();

    assert!(outcome.has_issues);
    let matching = outcome.lines.iter().filter(|l| l.starts_with("[typescript] ERROR")).count();
    assert!(matching >= 100, "expected at least 100 typescript errors, got {matching}");
    assert!(outcome.lines.iter().all(|l| !l.contains("JSON Parse error")));
}

/// Scenario 4: the exact two-line stderr rendering for a JSON syntax error.
#[tokio::test]
async fn json_syntax_error_matches_exact_two_line_output() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("syntax-error.json");
    std::fs::write(&file, "{\n  \"a\": 1\n  \"b\" 2\n}\n\n").unwrap();
    let uri = support::file_uri(&file);

    let mut steps = support::handshake_steps();
    steps.push(json!({
        "expect_method": "textDocument/didOpen",
        "notifications": [{
            "method": "textDocument/publishDiagnostics",
            "params": {
                "uri": uri,
                "version": 1,
                "source": "json",
                "diagnostics": [
                    {
                        "range": {"start": {"line": 2, "character": 22}, "end": {"line": 2, "character": 23}},
                        "severity": 1,
                        "message": "Property expected",
                        "code": 513
                    },
                    {
                        "range": {"start": {"line": 4, "character": 0}, "end": {"line": 4, "character": 1}},
                        "severity": 1,
                        "message": "Value expected",
                        "code": 516
                    }
                ]
            }
        }]
    }));
    steps.push(json!({ "expect_method": "textDocument/didClose" }));

    let script = support::write_script(tmp.path(), "json_syntax.json", json!({ "steps": steps }));
    let descriptor = support::fake_descriptor(
        "vscode-json-language-server",
        "json",
        ".json",
        &script,
        DiagnosticsReadyPredicate::PublishDiagnostics,
    );
    let session = SessionManager::new(support::registry_with(descriptor));

    let outcome = lspc::handlers::diagnostics::diagnostics(&session, &file, Duration::from_secs(2))
        .await
        .unwrap();

    assert_eq!(
        outcome.lines.join("\n"),
        "[json] ERROR at line 3, column 23: Property expected [513]\n[json] ERROR at line 5, column 1: Value expected [516]"
    );
}

/// The quiescence predicate must wait out an intermediate batch and report
/// only the final one once no further notification arrives within the window.
#[tokio::test]
async fn quiescence_window_waits_for_the_final_batch() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("main.rs");
    std::fs::write(&file, "fn main() {}\n").unwrap();
    let uri = support::file_uri(&file);

    let mut steps = support::handshake_steps();
    steps.push(json!({
        "expect_method": "textDocument/didOpen",
        "notifications": [
            {
                "method": "textDocument/publishDiagnostics",
                "params": { "uri": uri, "version": 1, "source": "rustc", "diagnostics": [
                    {"range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 1}}, "severity": 2, "message": "stale pass", "code": "E0000"}
                ]}
            },
            {
                "method": "textDocument/publishDiagnostics",
                "params": { "uri": uri, "version": 1, "source": "rustc", "diagnostics": [
                    {"range": {"start": {"line": 1, "character": 0}, "end": {"line": 1, "character": 1}}, "severity": 1, "message": "final pass", "code": "E0001"}
                ]},
                "delay_ms": 60
            }
        ]
    }));
    steps.push(json!({ "expect_method": "textDocument/didClose" }));

    let script = support::write_script(tmp.path(), "quiescence.json", json!({ "steps": steps }));
    let descriptor = support::fake_descriptor(
        "rust-analyzer",
        "rust",
        ".rs",
        &script,
        DiagnosticsReadyPredicate::QuiescenceWindow(Duration::from_millis(150)),
    );
    let session = SessionManager::new(support::registry_with(descriptor));

    let outcome = lspc::handlers::diagnostics::diagnostics(&session, &file, Duration::from_secs(2))
        .await
        .unwrap();

    assert_eq!(outcome.lines.len(), 1);
    assert!(outcome.lines[0].contains("final pass"));
}

/// A server that never publishes diagnostics times out cleanly rather than
/// hanging, and the document is still closed afterward (no leaked state).
#[tokio::test]
async fn timeout_with_no_notification_returns_empty_and_closes_the_document() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("slow.py");
    std::fs::write(&file, "def f():\n    pass\n").unwrap();

    let mut steps = support::handshake_steps();
    steps.push(json!({ "expect_method": "textDocument/didOpen" }));
    steps.push(json!({ "expect_method": "textDocument/didClose" }));

    let script = support::write_script(tmp.path(), "timeout.json", json!({ "steps": steps }));
    let descriptor = support::fake_descriptor("pylsp", "python", ".py", &script, DiagnosticsReadyPredicate::PublishDiagnostics);
    let session = SessionManager::new(support::registry_with(descriptor));

    let outcome = lspc::handlers::diagnostics::diagnostics(&session, &file, Duration::from_millis(150))
        .await
        .unwrap();

    assert!(outcome.lines.is_empty());
    assert!(!outcome.has_issues);

    let summaries = session.list_instances().await;
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].open_documents, 0);
}

/// An unrecognised extension is not an error — it resolves to a clean result.
#[tokio::test]
async fn unknown_extension_reports_clean_rather_than_failing() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("notes.txt");
    std::fs::write(&file, "just text\n").unwrap();

    let session = SessionManager::new(lspc::registry::Registry::builtin());
    let outcome = lspc::handlers::diagnostics::diagnostics(&session, &file, Duration::from_secs(1))
        .await
        .unwrap();

    assert!(outcome.lines.is_empty());
    assert!(!outcome.has_issues);
}
