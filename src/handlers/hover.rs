//! `hover <file> <symbol>` handler (spec §4.5).

use crate::error::LspcError;
use crate::session::{OpenDocument, ServerInstance, SessionManager};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const NO_HOVER_MESSAGE: &str = "No hover information found for the symbol.";

/// Resolve `symbol` to document positions via `documentSymbol`, hover each
/// exact match, and aggregate. `NoDescriptor` resolves to the same fallback
/// text a real "no match" result would produce (spec §7).
pub async fn hover(
    session: &SessionManager,
    file: &Path,
    symbol: &str,
    timeout: Duration,
) -> Result<String, LspcError> {
    let instance = match session.ensure_server(file).await {
        Ok(instance) => instance,
        Err(LspcError::NoDescriptor(_)) => return Ok(NO_HOVER_MESSAGE.to_string()),
        Err(e) => return Err(e),
    };

    let doc = instance.open_document(file).await?;
    let result = hover_for_document(&instance, &doc, file, symbol, timeout).await;
    instance.close_document(&doc).await;
    result
}

async fn hover_for_document(
    instance: &Arc<ServerInstance>,
    doc: &OpenDocument,
    file: &Path,
    symbol: &str,
    timeout: Duration,
) -> Result<String, LspcError> {
    let symbols = tokio::time::timeout(
        timeout,
        instance.send_request(
            "textDocument/documentSymbol",
            json!({ "textDocument": { "uri": doc.uri } }),
        ),
    )
    .await
    .map_err(|_| LspcError::Timeout)??;

    let positions = matching_positions(&symbols, symbol);
    if positions.is_empty() {
        return Ok(NO_HOVER_MESSAGE.to_string());
    }

    let mut sections = Vec::new();
    for (line, character) in positions {
        let hover_result = tokio::time::timeout(
            timeout,
            instance.send_request(
                "textDocument/hover",
                json!({
                    "textDocument": { "uri": doc.uri },
                    "position": { "line": line, "character": character }
                }),
            ),
        )
        .await
        .map_err(|_| LspcError::Timeout)??;

        if let Some(text) = render_hover(&hover_result, file, line, character) {
            sections.push(text);
        }
    }

    if sections.is_empty() {
        Ok(NO_HOVER_MESSAGE.to_string())
    } else {
        Ok(sections.join("\n\n"))
    }
}

/// Walk a `documentSymbol` result — either a flat `SymbolInformation[]` or a
/// nested `DocumentSymbol[]` tree — collecting 0-based `(line, character)`
/// selection-range starts for every symbol named exactly `symbol`.
fn matching_positions(value: &Value, symbol: &str) -> Vec<(u64, u64)> {
    let mut out = Vec::new();
    if let Some(items) = value.as_array() {
        for item in items {
            collect(item, symbol, &mut out);
        }
    }
    out
}

fn collect(item: &Value, symbol: &str, out: &mut Vec<(u64, u64)>) {
    if item.get("name").and_then(Value::as_str) == Some(symbol) {
        let start = item
            .get("selectionRange")
            .or_else(|| item.get("location").and_then(|l| l.get("range")))
            .and_then(|r| r.get("start"));
        if let Some(start) = start {
            let line = start.get("line").and_then(Value::as_u64);
            let character = start.get("character").and_then(Value::as_u64);
            if let (Some(line), Some(character)) = (line, character) {
                out.push((line, character));
            }
        }
    }
    if let Some(children) = item.get("children").and_then(Value::as_array) {
        for child in children {
            collect(child, symbol, out);
        }
    }
}

/// Render one hover result as `Location: <file>:<line>:<col>` followed by
/// its contents (line/col rendered 1-based). `None` for an empty hover.
fn render_hover(value: &Value, file: &Path, line: u64, character: u64) -> Option<String> {
    if value.is_null() {
        return None;
    }
    let text = hover_contents_text(value.get("contents")?)?;
    Some(format!(
        "Location: {}:{}:{}\n{}",
        file.display(),
        line + 1,
        character + 1,
        text
    ))
}

fn hover_contents_text(contents: &Value) -> Option<String> {
    let text = match contents {
        Value::String(s) => s.clone(),
        Value::Object(_) => contents.get("value").and_then(Value::as_str)?.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Object(_) => item.get("value").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => return None,
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_positions_finds_nested_document_symbol() {
        let value = json!([
            {
                "name": "Outer",
                "selectionRange": {"start": {"line": 0, "character": 4}, "end": {"line": 0, "character": 9}},
                "children": [
                    {
                        "name": "add",
                        "selectionRange": {"start": {"line": 3, "character": 8}, "end": {"line": 3, "character": 11}},
                        "children": []
                    }
                ]
            }
        ]);
        let positions = matching_positions(&value, "add");
        assert_eq!(positions, vec![(3, 8)]);
    }

    #[test]
    fn matching_positions_finds_flat_symbol_information() {
        let value = json!([
            {
                "name": "add",
                "location": {
                    "uri": "file:///tmp/a.py",
                    "range": {"start": {"line": 0, "character": 4}, "end": {"line": 0, "character": 7}}
                }
            }
        ]);
        assert_eq!(matching_positions(&value, "add"), vec![(0, 4)]);
    }

    #[test]
    fn matching_positions_is_case_sensitive_and_exact() {
        let value = json!([{"name": "Add"}, {"name": "added"}]);
        assert!(matching_positions(&value, "add").is_empty());
    }

    #[test]
    fn render_hover_formats_location_header_1_based() {
        let hover = json!({"contents": {"kind": "markdown", "value": "def add(a, b)"}});
        let text = render_hover(&hover, Path::new("tests/fixtures/python/valid/simple-module.py"), 0, 4).unwrap();
        assert!(text.starts_with("Location: tests/fixtures/python/valid/simple-module.py:1:5\n"));
        assert!(text.ends_with("def add(a, b)"));
    }

    #[test]
    fn render_hover_returns_none_for_null_result() {
        assert!(render_hover(&Value::Null, Path::new("a.py"), 0, 0).is_none());
    }
}
