//! Outcheck harness: drives a kernel process and checks what it emits.
//!
//! ```text
//! Session::connect → await_ready → submit ─┐
//!                                          ▼
//!                    collect (classify each broadcast message) → Execution
//!                                          ▼
//!                    scenario::verify_execution (payload + diff checks) → Findings
//! ```
//!
//! The harness does NOT interpret kernel output itself: classification lives
//! in `outcheck-wire`, decoding and diffing in `outcheck-verify`. Kernels are
//! reached only through the [`transport`] traits.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod canon;
pub mod collect;
pub mod config;
pub mod error;
pub mod logging;
pub mod record;
pub mod scenario;
pub mod scripted;
pub mod session;
pub mod stdio;
pub mod transport;

pub use collect::{collect, CollectPolicy, Execution, TerminalStatus};
pub use error::{ReadinessError, SessionError, StartupError, SubmitError, TransportError};
pub use session::{with_session, Session, SubmissionId};
