//! Normalized result units.
//!
//! [`OutputEvent`] is the tagged-variant model every later stage consumes.
//! Its serialized form uses the variant and attribute names verbatim
//! (`StreamText`, `executionIndex`, ...) so persisted run records can be
//! compared offline without a schema translation step.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One MIME payload value.
///
/// Kernels send most representations as strings (plain text, markup,
/// base64-encoded images). JSON-valued representations such as
/// `application/json` are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// A string representation.
    Text(String),
    /// Any non-string JSON representation.
    Structured(serde_json::Value),
}

impl Payload {
    /// The string form, if this payload is textual.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }
}

/// MIME type → payload. Keys are unique by construction.
pub type MimeBundle = BTreeMap<String, Payload>;

/// Output stream name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamChannel {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
    /// A stream name the protocol does not define.
    Other(String),
}

impl StreamChannel {
    /// Map a protocol stream name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "stdout" => Self::Stdout,
            "stderr" => Self::Stderr,
            other => Self::Other(other.to_string()),
        }
    }

    /// The protocol stream name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
            Self::Other(name) => name,
        }
    }
}

/// Kernel lifecycle phase carried by a `status` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecyclePhase {
    /// The kernel started processing a request.
    Busy,
    /// The kernel finished all outstanding work.
    Idle,
    /// Any other `execution_state` (e.g. `starting`). Never counts as idle.
    Unrecognized(String),
}

impl LifecyclePhase {
    /// Map a protocol `execution_state` value.
    #[must_use]
    pub fn from_state(state: &str) -> Self {
        match state {
            "busy" => Self::Busy,
            "idle" => Self::Idle,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

/// A normalized result unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OutputEvent {
    /// Text written to an output stream.
    StreamText {
        /// Which stream.
        channel: StreamChannel,
        /// The text exactly as sent.
        text: String,
    },
    /// The result of an execution.
    Result {
        /// MIME type → representation.
        payloads: MimeBundle,
        /// The kernel's execution counter for this result.
        #[serde(rename = "executionIndex")]
        execution_index: i64,
        /// Protocol metadata mapping, passed through opaquely.
        #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
        metadata: serde_json::Map<String, serde_json::Value>,
    },
    /// Rich output not tied to an execution index.
    DisplayData {
        /// MIME type → representation.
        payloads: MimeBundle,
    },
    /// An execution error, or a message the classifier could not place.
    Failure {
        /// Error name (`ename`), or `unknown-message-type`.
        kind: String,
        /// Error value / human-readable detail.
        message: String,
        /// Traceback lines in kernel order.
        trace: Vec<String>,
    },
    /// Busy/idle transition. Consumed by the collection loop.
    LifecycleMarker {
        /// The reported phase.
        phase: LifecyclePhase,
    },
}

impl OutputEvent {
    /// Variant name as it appears in serialized records.
    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::StreamText { .. } => "StreamText",
            Self::Result { .. } => "Result",
            Self::DisplayData { .. } => "DisplayData",
            Self::Failure { .. } => "Failure",
            Self::LifecycleMarker { .. } => "LifecycleMarker",
        }
    }

    /// MIME payloads, for `Result` and `DisplayData`.
    #[must_use]
    pub fn payloads(&self) -> Option<&MimeBundle> {
        match self {
            Self::Result { payloads, .. } | Self::DisplayData { payloads } => Some(payloads),
            _ => None,
        }
    }

    /// Whether this event is surfaced to callers (everything but lifecycle
    /// markers).
    #[must_use]
    pub fn is_surfaced(&self) -> bool {
        !matches!(self, Self::LifecycleMarker { .. })
    }
}
