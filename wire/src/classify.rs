//! Message classifier: `RawMessage` → `OutputEvent`.
//!
//! [`classify`] is total. Each of the five broadcast tags maps to its own
//! variant; the tag alone decides the variant, and missing or ill-typed
//! fields inside the content fall back to empty values. Every other tag
//! becomes a `Failure` of kind [`UNKNOWN_MESSAGE_TYPE`] so that unexpected
//! protocol traffic shows up in the collected events instead of vanishing.

use serde_json::Value;

use crate::event::{LifecyclePhase, MimeBundle, OutputEvent, Payload, StreamChannel};
use crate::message::{
    RawMessage, MSG_DISPLAY_DATA, MSG_ERROR, MSG_EXECUTE_RESULT, MSG_STATUS, MSG_STREAM,
};

/// `Failure.kind` for a message whose type tag is not recognized.
pub const UNKNOWN_MESSAGE_TYPE: &str = "unknown-message-type";

/// Classify one raw message.
#[must_use]
pub fn classify(raw: &RawMessage) -> OutputEvent {
    let content = &raw.content;
    match raw.msg_type() {
        MSG_STATUS => OutputEvent::LifecycleMarker {
            phase: LifecyclePhase::from_state(str_field(content, "execution_state")),
        },
        MSG_STREAM => OutputEvent::StreamText {
            channel: StreamChannel::from_name(str_field(content, "name")),
            text: str_field(content, "text").to_string(),
        },
        MSG_EXECUTE_RESULT => OutputEvent::Result {
            payloads: mime_bundle(content),
            execution_index: content
                .get("execution_count")
                .and_then(Value::as_i64)
                .unwrap_or_default(),
            metadata: content
                .get("metadata")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        },
        MSG_DISPLAY_DATA => OutputEvent::DisplayData {
            payloads: mime_bundle(content),
        },
        MSG_ERROR => OutputEvent::Failure {
            kind: str_field(content, "ename").to_string(),
            message: str_field(content, "evalue").to_string(),
            trace: content
                .get("traceback")
                .and_then(Value::as_array)
                .map(|lines| {
                    lines
                        .iter()
                        .map(|line| match line {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect()
                })
                .unwrap_or_default(),
        },
        other => OutputEvent::Failure {
            kind: UNKNOWN_MESSAGE_TYPE.to_string(),
            message: format!("unrecognized message type: {other:?}"),
            trace: vec![content.to_string()],
        },
    }
}

fn str_field<'a>(content: &'a Value, key: &str) -> &'a str {
    content.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn mime_bundle(content: &Value) -> MimeBundle {
    let Some(data) = content.get("data").and_then(Value::as_object) else {
        return MimeBundle::new();
    };
    data.iter()
        .map(|(mime, value)| {
            let payload = match value {
                Value::String(s) => Payload::Text(s.clone()),
                other => Payload::Structured(other.clone()),
            };
            (mime.clone(), payload)
        })
        .collect()
}
