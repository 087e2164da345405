//! Outcheck Wire: the broadcast-channel message model.
//!
//! This crate owns the boundary between raw kernel protocol frames and the
//! normalized result units the rest of the workspace reasons about. It has
//! no I/O and no clocks; every function here is pure.
//!
//! # Crate dependency graph
//!
//! ```text
//! outcheck_wire  ←  outcheck_verify  ←  outcheck_harness
//! (messages,         (payloads, text     (sessions, transports,
//!  classifier)        diagnostics, diff)  collection, scenarios)
//! ```
//!
//! # Key types
//!
//! - [`RawMessage`]: one broadcast frame (header, parent header, content)
//! - [`OutputEvent`]: the normalized, tagged result unit
//! - [`classify`]: total mapping from `RawMessage` to `OutputEvent`

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod classify;
pub mod event;
pub mod message;

pub use classify::{classify, UNKNOWN_MESSAGE_TYPE};
pub use event::{LifecyclePhase, MimeBundle, OutputEvent, Payload, StreamChannel};
pub use message::{MessageHeader, ParentHeader, RawMessage};
