//! Session driver: one owned connection to a kernel process.
//!
//! # Lifecycle
//!
//! ```text
//! connect() → await_ready() → [submit() → collect()] × N → shutdown()
//! ```
//!
//! A session refuses submissions until `await_ready` has succeeded.
//! `shutdown` is idempotent and also runs from `Drop`, so the kernel process
//! is released on every exit path, including panics inside collection.
//! [`with_session`] packages the whole lifecycle around a closure.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use outcheck_wire::RawMessage;
use tracing::{debug, info, warn};

use crate::error::{ReadinessError, SessionError, StartupError, SubmitError, TransportError};
use crate::transport::{KernelLauncher, KernelTransport};

/// Longest single readiness probe. Bounds how late a timeout is noticed.
const READY_PROBE_SLICE: Duration = Duration::from_millis(250);

/// Correlates broadcast messages with one submission.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmissionId {
    token: String,
    sequence: u64,
}

impl SubmissionId {
    /// The opaque request id sent to the kernel.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Position of this submission within its session (1-based).
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl std::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} ({})", self.sequence, self.token)
    }
}

/// One live connection to a kernel.
pub struct Session {
    kernel_id: String,
    transport: Option<Box<dyn KernelTransport>>,
    ready: bool,
    submissions: u64,
    outstanding: BTreeMap<u64, String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("kernel_id", &self.kernel_id)
            .field("live", &self.is_live())
            .field("ready", &self.ready)
            .field("submissions", &self.submissions)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Start the kernel named `kernel_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError`] if the launcher cannot start it.
    pub fn connect(launcher: &dyn KernelLauncher, kernel_id: &str) -> Result<Self, StartupError> {
        let transport = launcher.launch(kernel_id)?;
        info!(kernel_id, "kernel session connected");
        Ok(Self {
            kernel_id: kernel_id.to_string(),
            transport: Some(transport),
            ready: false,
            submissions: 0,
            outstanding: BTreeMap::new(),
        })
    }

    /// The identifier the kernel was launched with.
    #[must_use]
    pub fn kernel_id(&self) -> &str {
        &self.kernel_id
    }

    /// Whether the session still holds its kernel connection.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.transport.is_some()
    }

    /// Whether the kernel process itself is still running.
    pub fn kernel_running(&mut self) -> bool {
        self.transport
            .as_mut()
            .is_some_and(|transport| transport.is_alive())
    }

    /// Whether the readiness handshake has completed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Number of submissions made so far.
    #[must_use]
    pub fn submission_count(&self) -> u64 {
        self.submissions
    }

    /// Block until the kernel answers the readiness handshake or `timeout`
    /// elapses.
    ///
    /// # Errors
    ///
    /// Returns [`ReadinessError`] on timeout, disconnect, or send failure.
    /// The session stays unready; callers must not submit to it.
    pub fn await_ready(&mut self, timeout: Duration) -> Result<(), ReadinessError> {
        if self.ready {
            return Ok(());
        }
        let kernel_id = self.kernel_id.clone();
        let Some(transport) = self.transport.as_mut() else {
            return Err(ReadinessError::ShutDown { kernel_id });
        };

        let started = Instant::now();
        loop {
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                warn!(kernel_id = %kernel_id, ?timeout, "kernel readiness timed out");
                return Err(ReadinessError::Timeout {
                    kernel_id,
                    waited_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                });
            }
            let slice = (timeout - elapsed).min(READY_PROBE_SLICE);
            match transport.probe_ready(slice) {
                Ok(true) => {
                    self.ready = true;
                    info!(kernel_id = %kernel_id, elapsed = ?started.elapsed(), "kernel ready");
                    return Ok(());
                }
                Ok(false) => {}
                Err(TransportError::Disconnected) => {
                    warn!(kernel_id = %kernel_id, "kernel disconnected during readiness handshake");
                    return Err(ReadinessError::Disconnected { kernel_id });
                }
                Err(e) => {
                    warn!(kernel_id = %kernel_id, error = %e, "readiness handshake failed");
                    return Err(ReadinessError::Transport {
                        kernel_id,
                        detail: e.to_string(),
                    });
                }
            }
        }
    }

    /// Send `code` for execution and return its correlation id. Does not
    /// wait for any output.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] if the session is not ready, is shut down, or
    /// the request cannot be sent.
    pub fn submit(&mut self, code: &str) -> Result<SubmissionId, SubmitError> {
        let Some(transport) = self.transport.as_mut() else {
            return Err(SubmitError::ShutDown {
                kernel_id: self.kernel_id.clone(),
            });
        };
        if !self.ready {
            return Err(SubmitError::NotReady {
                kernel_id: self.kernel_id.clone(),
            });
        }

        let token = uuid::Uuid::new_v4().to_string();
        transport.send_execute(&token, code)?;
        self.submissions += 1;
        let id = SubmissionId {
            token,
            sequence: self.submissions,
        };
        self.outstanding.insert(id.sequence, code.to_string());
        debug!(kernel_id = %self.kernel_id, submission = %id, "code submitted");
        Ok(id)
    }

    /// Release the kernel. Safe to call any number of times.
    pub fn shutdown(&mut self) {
        let Some(mut transport) = self.transport.take() else {
            return;
        };
        self.ready = false;
        match transport.shutdown() {
            Ok(()) => info!(kernel_id = %self.kernel_id, "kernel session shut down"),
            Err(e) => warn!(kernel_id = %self.kernel_id, error = %e, "kernel shutdown reported an error"),
        }
    }

    /// Next broadcast message for the collection loop.
    pub(crate) fn next_broadcast(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<RawMessage>, TransportError> {
        match self.transport.as_mut() {
            Some(transport) => transport.recv_broadcast(timeout),
            None => Err(TransportError::Disconnected),
        }
    }

    /// Take the source code recorded for a submission.
    pub(crate) fn take_code(&mut self, id: &SubmissionId) -> String {
        self.outstanding.remove(&id.sequence).unwrap_or_default()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Run `body` against a freshly connected, ready session, then shut it down.
///
/// The session is released whether `body` returns normally or panics, and
/// also when readiness fails.
///
/// # Errors
///
/// Returns [`SessionError`] if connect or readiness fails; `body` is not run
/// in that case.
pub fn with_session<T>(
    launcher: &dyn KernelLauncher,
    kernel_id: &str,
    ready_timeout: Duration,
    body: impl FnOnce(&mut Session) -> T,
) -> Result<T, SessionError> {
    let mut session = Session::connect(launcher, kernel_id)?;
    session.await_ready(ready_timeout)?;
    let out = body(&mut session);
    session.shutdown();
    Ok(out)
}
