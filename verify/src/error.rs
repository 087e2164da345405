//! Typed payload failures.

use serde::Serialize;

/// A payload could not be decoded or did not carry the expected binary
/// signature. Reported per payload; never aborts inspection of others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum EncodingError {
    /// The payload text is not valid base64.
    #[error("invalid base64 payload: {detail}")]
    InvalidBase64 { detail: String },
    /// The decoded bytes do not start with the expected signature.
    #[error("binary signature mismatch: expected {expected_hex}, found {actual_hex}")]
    SignatureMismatch {
        /// Hex of the expected leading bytes.
        expected_hex: String,
        /// Hex of the actual leading bytes (at most the signature's length).
        actual_hex: String,
    },
    /// A payload expected to be a string was structured JSON.
    #[error("payload for {mime} is not a text value")]
    NotText { mime: String },
}
