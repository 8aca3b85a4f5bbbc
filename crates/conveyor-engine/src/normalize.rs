//! Argument and output normalization.
//!
//! Model-produced arguments arrive as loosely typed JSON; scripts emit
//! loosely structured text. These helpers bring both into predictable
//! shapes before execution and routing.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use conveyor_core::DiagnosticSink;

/// Normalize a single string argument: structured JSON is parsed through,
/// relative path-like strings are anchored under the base directory.
fn normalize_string(s: &str, base_dir: &Path) -> Value {
    if let Ok(parsed) = serde_json::from_str::<Value>(s) {
        if parsed.is_object() || parsed.is_array() {
            return parsed;
        }
    }
    if looks_like_path(s) && !is_absolute(s) {
        return Value::String(base_dir.join(s).to_string_lossy().into_owned());
    }
    Value::String(s.to_string())
}

fn looks_like_path(s: &str) -> bool {
    s.contains('/') || s.contains('\\')
}

fn is_absolute(s: &str) -> bool {
    if s.starts_with('/') {
        return true;
    }
    // Windows drive prefix, e.g. "C:\".
    let mut chars = s.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(c), Some(':')) if c.is_ascii_alphabetic()
    )
}

/// Normalize every argument value in a call payload.
pub fn normalize_args(args: &Value, base_dir: &Path) -> Value {
    match args {
        Value::String(s) => normalize_string(s, base_dir),
        Value::Object(map) => {
            let normalized: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), normalize_args(v, base_dir)))
                .collect();
            Value::Object(normalized)
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| normalize_args(v, base_dir)).collect())
        }
        other => other.clone(),
    }
}

/// Resolve a function's working directory against the base directory.
pub fn resolve_working_dir(working_dir: Option<&str>, base_dir: &Path) -> PathBuf {
    match working_dir {
        Some(dir) if !dir.is_empty() => {
            let p = Path::new(dir);
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base_dir.join(p)
            }
        }
        _ => base_dir.to_path_buf(),
    }
}

/// Decode a process payload: JSON when it parses, plain string otherwise.
pub fn decode_output(payload: &str) -> Value {
    serde_json::from_str(payload).unwrap_or_else(|_| Value::String(payload.to_string()))
}

/// Reshape an outbound result object before handing it to downstream
/// routing:
///
/// - a `results` field is aliased to `result` when `result` is absent;
/// - a `result` holding a JSON-encoded string is unwrapped, at most
///   twice, for doubly encoded payloads.
///
/// If both unwrap attempts fail to parse, the original value is kept and
/// a diagnostic is emitted.
pub fn reshape_send_output(value: Value, diag: &dyn DiagnosticSink) -> Value {
    let Value::Object(mut map) = value else {
        return value;
    };

    if !map.contains_key("result") {
        if let Some(results) = map.remove("results") {
            map.insert("result".to_string(), results);
        }
    }

    if let Some(Value::String(s)) = map.get("result") {
        let s = s.clone();
        match serde_json::from_str::<Value>(&s) {
            Ok(Value::String(inner)) => match serde_json::from_str::<Value>(&inner) {
                Ok(parsed) => {
                    map.insert("result".to_string(), parsed);
                }
                Err(_) => {
                    debug!("inner result string is not JSON, keeping as-is");
                    diag.emit("result payload is not valid JSON, forwarding raw text");
                }
            },
            Ok(parsed) => {
                map.insert("result".to_string(), parsed);
            }
            Err(_) => {
                diag.emit("result payload is not valid JSON, forwarding raw text");
            }
        }
    }

    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NullSink;
    impl DiagnosticSink for NullSink {
        fn emit(&self, _message: &str) {}
    }

    #[test]
    fn test_json_string_arg_is_parsed() {
        let base = Path::new("/base");
        let args = json!({ "payload": "{\"a\": 1}" });
        let out = normalize_args(&args, base);
        assert_eq!(out, json!({ "payload": { "a": 1 } }));
    }

    #[test]
    fn test_relative_path_is_anchored() {
        let base = Path::new("/base");
        let args = json!({ "file": "out/video.mp4" });
        let out = normalize_args(&args, base);
        assert_eq!(out, json!({ "file": "/base/out/video.mp4" }));
    }

    #[test]
    fn test_absolute_paths_kept() {
        let base = Path::new("/base");
        assert_eq!(
            normalize_args(&json!("/abs/p.txt"), base),
            json!("/abs/p.txt")
        );
        assert_eq!(
            normalize_args(&json!("C:\\abs\\p.txt"), base),
            json!("C:\\abs\\p.txt")
        );
    }

    #[test]
    fn test_plain_strings_untouched() {
        let base = Path::new("/base");
        assert_eq!(normalize_args(&json!("hello"), base), json!("hello"));
        assert_eq!(normalize_args(&json!(42), base), json!(42));
        assert_eq!(normalize_args(&json!(true), base), json!(true));
    }

    #[test]
    fn test_nested_arrays_normalized() {
        let base = Path::new("/base");
        let args = json!({ "files": ["a/b.txt", "/abs.txt"] });
        let out = normalize_args(&args, base);
        assert_eq!(out, json!({ "files": ["/base/a/b.txt", "/abs.txt"] }));
    }

    #[test]
    fn test_resolve_working_dir() {
        let base = Path::new("/base");
        assert_eq!(resolve_working_dir(None, base), PathBuf::from("/base"));
        assert_eq!(
            resolve_working_dir(Some("scripts"), base),
            PathBuf::from("/base/scripts")
        );
        assert_eq!(
            resolve_working_dir(Some("/opt/tools"), base),
            PathBuf::from("/opt/tools")
        );
    }

    #[test]
    fn test_decode_output() {
        assert_eq!(decode_output("{\"k\":1}"), json!({ "k": 1 }));
        assert_eq!(decode_output("not json"), json!("not json"));
    }

    #[test]
    fn test_results_aliased_to_result() {
        let out = reshape_send_output(json!({ "results": [1, 2] }), &NullSink);
        assert_eq!(out, json!({ "result": [1, 2] }));
    }

    #[test]
    fn test_result_takes_precedence_over_results() {
        let out = reshape_send_output(json!({ "result": 1, "results": 2 }), &NullSink);
        assert_eq!(out["result"], json!(1));
    }

    #[test]
    fn test_double_encoded_result_unwrapped() {
        let inner = "{\"a\":1}";
        let once = serde_json::to_string(inner).unwrap();
        let out = reshape_send_output(json!({ "result": once }), &NullSink);
        assert_eq!(out, json!({ "result": { "a": 1 } }));
    }

    #[test]
    fn test_single_encoded_result_unwrapped() {
        let out = reshape_send_output(json!({ "result": "{\"a\":1}" }), &NullSink);
        assert_eq!(out, json!({ "result": { "a": 1 } }));
    }

    #[test]
    fn test_unparseable_result_kept() {
        let out = reshape_send_output(json!({ "result": "plain words" }), &NullSink);
        assert_eq!(out, json!({ "result": "plain words" }));
    }
}
