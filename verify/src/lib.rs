//! Outcheck Verify: payload inspection and reference comparison.
//!
//! Three independent, pure pieces:
//!
//! - [`payload`]: base64 decoding and binary container signature checks
//! - [`text`]: byte/character diagnostics and fixed-width hex dumps
//! - [`diff`]: line and character divergence reports against reference text
//!
//! Nothing here performs I/O or keeps state between calls. Failures are
//! returned as structured values ([`EncodingError`], [`diff::DiffReport`])
//! carrying the exact position or bytes involved.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod diff;
pub mod error;
pub mod payload;
pub mod text;

pub use error::EncodingError;
