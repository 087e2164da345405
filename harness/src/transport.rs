//! Transport contract: the minimal interface a kernel connection must
//! provide.
//!
//! The session driver and collection loop talk to kernels only through these
//! traits. Transports own process and channel wiring; they do NOT classify
//! messages, count idle markers, or apply timeouts beyond the single wait
//! they are asked to perform.

use std::time::Duration;

use outcheck_wire::RawMessage;

use crate::error::{StartupError, TransportError};

/// A live connection to one kernel process.
///
/// Implementations must be `Send` so independent sessions can run on
/// separate threads.
pub trait KernelTransport: Send {
    /// Send one execute request on the control channel. Must not wait for
    /// any reply.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the frame cannot be written.
    fn send_execute(&mut self, msg_id: &str, code: &str) -> Result<(), TransportError>;

    /// Advance the readiness handshake, waiting at most `timeout`.
    ///
    /// Returns `Ok(true)` once the kernel has answered, `Ok(false)` if the
    /// wait elapsed first. Called repeatedly until it succeeds or the
    /// caller's overall readiness budget runs out.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Disconnected`] if the kernel went away.
    fn probe_ready(&mut self, timeout: Duration) -> Result<bool, TransportError>;

    /// Next broadcast message, waiting at most `timeout`. `Ok(None)` means
    /// nothing arrived in time.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Disconnected`] once the channel is closed
    /// and drained.
    fn recv_broadcast(&mut self, timeout: Duration) -> Result<Option<RawMessage>, TransportError>;

    /// Whether the kernel process is still running.
    fn is_alive(&mut self) -> bool;

    /// Release the process and channels. Must be idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the process could not be reaped.
    fn shutdown(&mut self) -> Result<(), TransportError>;
}

/// Starts kernels by identifier.
pub trait KernelLauncher {
    /// Start the kernel named `kernel_id` and return its transport.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError`] if the identifier is unknown or the process
    /// cannot be spawned.
    fn launch(&self, kernel_id: &str) -> Result<Box<dyn KernelTransport>, StartupError>;
}
