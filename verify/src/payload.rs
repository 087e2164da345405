//! MIME payload inspection.
//!
//! Three MIME keys are significant: [`MIME_TEXT_PLAIN`] and
//! [`MIME_TEXT_HTML`] get text diagnostics, [`MIME_IMAGE_PNG`] is base64
//! decoded and checked against the PNG signature. Every other key is passed
//! through as [`PayloadFinding::Opaque`].
//!
//! Signature checks are structural sanity checks on the leading bytes, not
//! full format validation.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Serialize;

use outcheck_wire::{MimeBundle, Payload};

use crate::error::EncodingError;
use crate::text::{inspect_text, TextDiagnostics};

/// Plain-text representation.
pub const MIME_TEXT_PLAIN: &str = "text/plain";
/// Styled-markup representation.
pub const MIME_TEXT_HTML: &str = "text/html";
/// Base64-encoded PNG image.
pub const MIME_IMAGE_PNG: &str = "image/png";

/// PNG file signature.
pub const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
/// PDF header.
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";
/// GIF header (both `GIF87a` and `GIF89a`).
pub const GIF_SIGNATURE: &[u8] = b"GIF8";
/// JPEG start-of-image marker.
pub const JPEG_SIGNATURE: &[u8] = &[0xff, 0xd8, 0xff];

/// Binary container formats recognized by [`ContainerFormat::detect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Png,
    Pdf,
    Gif,
    Jpeg,
}

impl ContainerFormat {
    const ALL: [Self; 4] = [Self::Png, Self::Pdf, Self::Gif, Self::Jpeg];

    /// Leading byte signature.
    #[must_use]
    pub fn signature(self) -> &'static [u8] {
        match self {
            Self::Png => PNG_SIGNATURE,
            Self::Pdf => PDF_SIGNATURE,
            Self::Gif => GIF_SIGNATURE,
            Self::Jpeg => JPEG_SIGNATURE,
        }
    }

    /// Identify the container from leading bytes.
    #[must_use]
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|format| validate_container_format(bytes, format.signature()))
    }
}

/// Decode a base64 payload.
///
/// ASCII whitespace is removed first (kernels and notebook files sometimes
/// wrap long base64 at fixed columns); the remainder must be canonical,
/// padded, standard-alphabet base64.
///
/// # Errors
///
/// Returns [`EncodingError::InvalidBase64`] for any invalid input. Partial
/// output is never returned.
pub fn decode_binary(payload_text: &str) -> Result<Vec<u8>, EncodingError> {
    let compact: Vec<u8> = payload_text
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    BASE64
        .decode(&compact)
        .map_err(|e| EncodingError::InvalidBase64 {
            detail: e.to_string(),
        })
}

/// Whether `bytes` begins with `expected_magic`.
#[must_use]
pub fn validate_container_format(bytes: &[u8], expected_magic: &[u8]) -> bool {
    bytes.starts_with(expected_magic)
}

/// Like [`validate_container_format`], but reports the mismatching bytes.
///
/// # Errors
///
/// Returns [`EncodingError::SignatureMismatch`] with hex of the expected
/// signature and of the same number of actual leading bytes.
pub fn check_container_format(bytes: &[u8], expected_magic: &[u8]) -> Result<(), EncodingError> {
    if validate_container_format(bytes, expected_magic) {
        return Ok(());
    }
    let shown = &bytes[..bytes.len().min(expected_magic.len())];
    Err(EncodingError::SignatureMismatch {
        expected_hex: hex::encode(expected_magic),
        actual_hex: hex::encode(shown),
    })
}

/// Outcome of inspecting one MIME payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PayloadFinding {
    /// A text representation with its diagnostics.
    Text(TextDiagnostics),
    /// A binary image that decoded and carried the expected signature.
    Binary {
        /// Decoded length in bytes.
        decoded_length: usize,
        /// Detected container.
        format: ContainerFormat,
    },
    /// Decoding or signature validation failed.
    Invalid(EncodingError),
    /// A key the inspector does not interpret.
    Opaque,
}

/// One payload's inspection result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayloadReport {
    /// The MIME key.
    pub mime: String,
    /// What was found.
    pub finding: PayloadFinding,
}

/// Inspect one payload under its MIME key.
#[must_use]
pub fn inspect_payload(mime: &str, payload: &Payload) -> PayloadFinding {
    match mime {
        MIME_TEXT_PLAIN | MIME_TEXT_HTML => match payload.as_text() {
            Some(text) => PayloadFinding::Text(inspect_text(text)),
            None => PayloadFinding::Invalid(EncodingError::NotText {
                mime: mime.to_string(),
            }),
        },
        MIME_IMAGE_PNG => {
            let Some(text) = payload.as_text() else {
                return PayloadFinding::Invalid(EncodingError::NotText {
                    mime: mime.to_string(),
                });
            };
            match decode_binary(text)
                .and_then(|bytes| check_container_format(&bytes, PNG_SIGNATURE).map(|()| bytes))
            {
                Ok(bytes) => PayloadFinding::Binary {
                    decoded_length: bytes.len(),
                    format: ContainerFormat::Png,
                },
                Err(e) => PayloadFinding::Invalid(e),
            }
        }
        _ => PayloadFinding::Opaque,
    }
}

/// Inspect every payload of an event, in key order. A failing payload does
/// not stop inspection of the rest.
#[must_use]
pub fn inspect_payloads(payloads: &MimeBundle) -> Vec<PayloadReport> {
    payloads
        .iter()
        .map(|(mime, payload)| PayloadReport {
            mime: mime.clone(),
            finding: inspect_payload(mime, payload),
        })
        .collect()
}
