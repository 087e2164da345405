//! Raw protocol frames as delivered by a kernel's broadcast channel.
//!
//! A [`RawMessage`] is deliberately loose: `content` stays an untyped JSON
//! value so that a frame with missing or unexpected fields still reaches the
//! classifier instead of failing at deserialization time.

use serde::{Deserialize, Serialize};

/// Lifecycle status (`execution_state` = `busy` / `idle`).
pub const MSG_STATUS: &str = "status";
/// Text written to a named output stream.
pub const MSG_STREAM: &str = "stream";
/// The result of an execution, keyed by MIME type.
pub const MSG_EXECUTE_RESULT: &str = "execute_result";
/// Rich output not tied to an execution index.
pub const MSG_DISPLAY_DATA: &str = "display_data";
/// An execution failure with name, value, and traceback lines.
pub const MSG_ERROR: &str = "error";

/// Control-channel request: run code.
pub const MSG_EXECUTE_REQUEST: &str = "execute_request";
/// Control-channel reply to [`MSG_EXECUTE_REQUEST`].
pub const MSG_EXECUTE_REPLY: &str = "execute_reply";
/// Control-channel request: readiness handshake.
pub const MSG_KERNEL_INFO_REQUEST: &str = "kernel_info_request";
/// Control-channel reply to [`MSG_KERNEL_INFO_REQUEST`].
pub const MSG_KERNEL_INFO_REPLY: &str = "kernel_info_reply";
/// Control-channel request: terminate the kernel.
pub const MSG_SHUTDOWN_REQUEST: &str = "shutdown_request";

/// Message header: identity and type tag.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Unique id of this message.
    #[serde(default)]
    pub msg_id: String,
    /// Type tag (e.g. `"stream"`).
    #[serde(default)]
    pub msg_type: String,
}

/// Header of the request that caused a message.
///
/// Kernels send `{}` for messages with no originating request, so every
/// field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParentHeader {
    /// Id of the originating request, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,
}

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Identity and type tag.
    #[serde(default)]
    pub header: MessageHeader,
    /// Correlation to the originating request.
    #[serde(default)]
    pub parent_header: ParentHeader,
    /// Type-specific body. Kept untyped until classification.
    #[serde(default)]
    pub content: serde_json::Value,
}

impl RawMessage {
    /// Build a message with the given type tag and content.
    #[must_use]
    pub fn new(msg_type: &str, content: serde_json::Value) -> Self {
        Self {
            header: MessageHeader {
                msg_id: String::new(),
                msg_type: msg_type.to_string(),
            },
            parent_header: ParentHeader::default(),
            content,
        }
    }

    /// Set the message's own id.
    #[must_use]
    pub fn with_id(mut self, msg_id: impl Into<String>) -> Self {
        self.header.msg_id = msg_id.into();
        self
    }

    /// Set the id of the originating request.
    #[must_use]
    pub fn with_parent(mut self, parent_msg_id: impl Into<String>) -> Self {
        self.parent_header.msg_id = Some(parent_msg_id.into());
        self
    }

    /// The message type tag.
    #[must_use]
    pub fn msg_type(&self) -> &str {
        &self.header.msg_type
    }

    /// The id of the originating request, if the kernel supplied one.
    #[must_use]
    pub fn parent_msg_id(&self) -> Option<&str> {
        self.parent_header
            .msg_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    // -----------------------------------------------------------------------
    // Constructors for the five broadcast message shapes
    // -----------------------------------------------------------------------

    /// `status` with the given `execution_state`.
    #[must_use]
    pub fn status(execution_state: &str) -> Self {
        Self::new(
            MSG_STATUS,
            serde_json::json!({ "execution_state": execution_state }),
        )
    }

    /// `stream` with a stream name and text.
    #[must_use]
    pub fn stream(name: &str, text: &str) -> Self {
        Self::new(MSG_STREAM, serde_json::json!({ "name": name, "text": text }))
    }

    /// `execute_result` with an execution count and MIME data mapping.
    #[must_use]
    pub fn execute_result(execution_count: i64, data: serde_json::Value) -> Self {
        Self::new(
            MSG_EXECUTE_RESULT,
            serde_json::json!({
                "execution_count": execution_count,
                "data": data,
                "metadata": {},
            }),
        )
    }

    /// `display_data` with a MIME data mapping.
    #[must_use]
    pub fn display_data(data: serde_json::Value) -> Self {
        Self::new(
            MSG_DISPLAY_DATA,
            serde_json::json!({ "data": data, "metadata": {} }),
        )
    }

    /// `error` with name, value, and traceback lines.
    #[must_use]
    pub fn error(ename: &str, evalue: &str, traceback: &[&str]) -> Self {
        Self::new(
            MSG_ERROR,
            serde_json::json!({
                "ename": ename,
                "evalue": evalue,
                "traceback": traceback,
            }),
        )
    }
}
