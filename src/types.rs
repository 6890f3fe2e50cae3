//! The trace data model and the consumer-facing message types.
//!
//! Wire field names are camelCase, matching what the tracer sends and what
//! the persisted cache files contain.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::render::RenderedElement;
use crate::value::{HeapObject, NamedValue, Value};

/// One call-stack frame: the frame's name plus its named locals, in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub frame_name: String,
    pub locals: Vec<NamedValue>,
}

/// One execution snapshot, immutable once produced.
///
/// `stack` is ordered innermost first. `heap` maps address strings to the
/// objects reachable from this snapshot; `ref` values resolve only against
/// this element's own table. `stdout` holds output captured since the
/// previous element. A present `traceback` marks a raised error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceElement {
    pub line: i64,
    pub file_path: PathBuf,
    pub stack: Vec<StackFrame>,
    pub heap: IndexMap<String, HeapObject>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

impl TraceElement {
    /// Resolves a `ref` value against this element's heap table.
    pub fn resolve<'a>(&'a self, value: &Value) -> Option<&'a HeapObject> {
        match value {
            Value::Ref(address) => self.heap.get(address.to_string().as_str()),
            _ => None,
        }
    }
}

/// The full (or growing) sequence of snapshots, in execution order.
pub type Trace = Vec<TraceElement>;

/// A playback navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationAction {
    First,
    Prev,
    Next,
    Last,
}

/// An inbound command from the consumer driving playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackCommand {
    Navigate(NavigationAction),
    Seek(usize),
}

/// Which navigation buttons the consumer should enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonsState {
    pub next: bool,
    pub prev: bool,
    pub first: bool,
    pub last: bool,
}

/// The rendered element at the current index, with playback position.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentUpdate {
    pub trace_complete: bool,
    pub element: RenderedElement,
    pub index: usize,
    pub length: usize,
}

/// One outbound update to the consumer (editor/panel side).
///
/// Serialized as a single JSON object tagged with `command`, so a consumer
/// can dispatch on it the way a webview message handler would.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum UiUpdate {
    ButtonsState(ButtonsState),
    Content(ContentUpdate),
    /// Move the single-line highlight to `line` of `file_path`, opening the
    /// file read-focused if it is not already open.
    #[serde(rename_all = "camelCase")]
    Highlight { file_path: PathBuf, line: i64 },
    ClearHighlight,
    /// Tracer log output (stdout/stderr chunks and lifecycle notes).
    Log { text: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_element_json() -> serde_json::Value {
        json!({
            "line": 3,
            "filePath": "/work/example.py",
            "stack": [
                {
                    "frameName": "<module>",
                    "locals": [
                        {"name": "x", "type": "int", "value": 1},
                        {"name": "xs", "type": "ref", "value": 140230},
                    ],
                }
            ],
            "heap": {
                "140230": {"type": "list", "value": [{"type": "int", "value": 1}]},
            },
            "stdout": "hello\n",
        })
    }

    #[test]
    fn test_trace_element_from_wire() {
        let element: TraceElement = serde_json::from_value(sample_element_json()).unwrap();
        assert_eq!(element.line, 3);
        assert_eq!(element.file_path, PathBuf::from("/work/example.py"));
        assert_eq!(element.stack.len(), 1);
        assert_eq!(element.stack[0].frame_name, "<module>");
        assert_eq!(element.stack[0].locals[0].name, "x");
        assert_eq!(element.stdout, "hello\n");
        assert!(element.traceback.is_none());
    }

    #[test]
    fn test_reference_resolution() {
        let element: TraceElement = serde_json::from_value(sample_element_json()).unwrap();
        let reference = &element.stack[0].locals[1].value;
        let object = element.resolve(reference).expect("address present in heap");
        assert_eq!(object.text_repr(), "[1]");

        // Non-reference values never resolve.
        assert!(element.resolve(&Value::Int(1)).is_none());
        // Dangling addresses resolve to nothing rather than failing.
        assert!(element.resolve(&Value::Ref(1)).is_none());
    }

    #[test]
    fn test_traceback_is_optional_and_round_trips() {
        let mut wire = sample_element_json();
        wire["traceback"] = json!("Traceback (most recent call last): ...");
        let element: TraceElement = serde_json::from_value(wire.clone()).unwrap();
        assert!(element.traceback.is_some());
        assert_eq!(serde_json::to_value(&element).unwrap(), wire);

        // Absent traceback stays absent after a round trip.
        let element: TraceElement = serde_json::from_value(sample_element_json()).unwrap();
        let back = serde_json::to_value(&element).unwrap();
        assert!(back.get("traceback").is_none());
    }

    #[test]
    fn test_ui_update_tagging() {
        let update = UiUpdate::ButtonsState(ButtonsState {
            next: true,
            prev: false,
            first: false,
            last: true,
        });
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"command": "buttonsState", "next": true, "prev": false, "first": false, "last": true})
        );

        let update = UiUpdate::Highlight {
            file_path: PathBuf::from("/work/example.py"),
            line: 3,
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"command": "highlight", "filePath": "/work/example.py", "line": 3})
        );

        assert_eq!(
            serde_json::to_value(&UiUpdate::ClearHighlight).unwrap(),
            json!({"command": "clearHighlight"})
        );
    }
}
