//! Projection of trace elements into display structures.
//!
//! The projection is a pure transform: the playback controller feeds it one
//! element at a time and forwards the result inside content updates. Editor
//! integrations supply their own markup projector; [`TextProjector`] is the
//! built-in plain-text one.

use serde::Serialize;

use crate::types::TraceElement;
use crate::value::Value;

/// The display form of one trace element.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedElement {
    pub file_name: String,
    pub line_number: i64,
    pub frames: String,
    pub objects: String,
    pub stdout: String,
}

pub trait RenderProjector: Send {
    fn project(&self, element: &TraceElement) -> RenderedElement;
}

/// Plain-text projection: one block per stack frame, one line per heap
/// object, references shown as `*<address>` next to the resolved object.
#[derive(Debug, Default)]
pub struct TextProjector;

impl RenderProjector for TextProjector {
    fn project(&self, element: &TraceElement) -> RenderedElement {
        let mut frames = String::new();
        for frame in &element.stack {
            frames.push_str(&frame.frame_name);
            frames.push('\n');
            for local in &frame.locals {
                frames.push_str("  ");
                frames.push_str(&local.name);
                frames.push_str(" = ");
                frames.push_str(&local.value.text_repr());
                if let Value::Ref(_) = local.value {
                    if let Some(object) = element.resolve(&local.value) {
                        frames.push_str("  ");
                        frames.push_str(&object.text_repr());
                    }
                }
                frames.push('\n');
            }
        }

        let mut objects = String::new();
        for (address, object) in &element.heap {
            objects.push_str(address);
            objects.push_str(": ");
            objects.push_str(&object.text_repr());
            objects.push('\n');
        }
        if let Some(traceback) = &element.traceback {
            objects.push_str(traceback);
            objects.push('\n');
        }

        let file_name = element
            .file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| element.file_path.display().to_string());

        RenderedElement {
            file_name,
            line_number: element.line,
            frames,
            objects,
            stdout: element.stdout.clone(),
        }
    }
}
