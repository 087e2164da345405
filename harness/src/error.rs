//! Typed harness errors.
//!
//! Fatal conditions are errors: [`StartupError`] aborts the run,
//! [`ReadinessError`] makes the session unusable. A collection timeout is not
//! an error at all; it is the `TimedOut` terminal status of an
//! `Execution`, which keeps its partial events.

/// The kernel process could not be started.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartupError {
    /// The launcher has no command registered for this identifier.
    #[error("unknown kernel identifier: {kernel_id}")]
    UnknownKernel { kernel_id: String },
    /// Spawning the process or wiring its channels failed.
    #[error("failed to spawn kernel {kernel_id}: {detail}")]
    Spawn { kernel_id: String, detail: String },
}

/// The readiness handshake did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadinessError {
    /// No readiness signal within the timeout.
    #[error("kernel {kernel_id} not ready after {waited_ms} ms")]
    Timeout { kernel_id: String, waited_ms: u64 },
    /// The kernel's channels closed during the handshake.
    #[error("kernel {kernel_id} exited before becoming ready")]
    Disconnected { kernel_id: String },
    /// The handshake request could not be sent.
    #[error("readiness handshake with {kernel_id} failed: {detail}")]
    Transport { kernel_id: String, detail: String },
    /// The session was already shut down.
    #[error("session for {kernel_id} is shut down")]
    ShutDown { kernel_id: String },
}

/// Channel-level failure inside a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The kernel side of the channel is gone.
    #[error("kernel channel disconnected")]
    Disconnected,
    /// Writing a request frame failed.
    #[error("failed to send request: {detail}")]
    Send { detail: String },
}

/// A submission was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// `await_ready` has not succeeded on this session.
    #[error("session for {kernel_id} is not ready")]
    NotReady { kernel_id: String },
    /// The session was shut down.
    #[error("session for {kernel_id} is shut down")]
    ShutDown { kernel_id: String },
    /// The request frame could not be delivered.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failure of a scoped session run (connect → ready → body → shutdown).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Readiness(#[from] ReadinessError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
}
