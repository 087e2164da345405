//! In-memory kernel: a transport that replays queued broadcast messages.
//!
//! Used to drive the session driver and collection loop without a process.
//! A [`ScriptHandle`] is shared between the test and the transport, so the
//! test can inspect what was submitted and queue more output after launch.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use outcheck_wire::RawMessage;

use crate::error::{StartupError, TransportError};
use crate::transport::{KernelLauncher, KernelTransport};

#[derive(Debug, Default)]
struct ScriptState {
    broadcast: VecDeque<RawMessage>,
    replies: VecDeque<Vec<RawMessage>>,
    probes_until_ready: Option<u32>,
    probes: u32,
    disconnect_when_drained: bool,
    submitted: Vec<(String, String)>,
    shutdowns: u32,
}

/// Shared control surface of a scripted kernel.
#[derive(Debug, Clone)]
pub struct ScriptHandle(Arc<Mutex<ScriptState>>);

impl Default for ScriptHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptHandle {
    /// A kernel that is ready on the first probe and has no output queued.
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(ScriptState {
            probes_until_ready: Some(1),
            ..ScriptState::default()
        })))
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue one broadcast message now.
    pub fn push_broadcast(&self, message: RawMessage) {
        self.lock().broadcast.push_back(message);
    }

    /// Queue a batch of messages to be broadcast when the next execute
    /// request arrives. Each gets the request id as its parent.
    pub fn queue_reply(&self, messages: Vec<RawMessage>) {
        self.lock().replies.push_back(messages);
    }

    /// Report ready only on the `n`-th probe (`n >= 1`).
    pub fn ready_after_probes(&self, n: u32) {
        self.lock().probes_until_ready = Some(n.max(1));
    }

    /// Never answer the readiness handshake.
    pub fn never_ready(&self) {
        self.lock().probes_until_ready = None;
    }

    /// Report `Disconnected` once the broadcast queue is empty.
    pub fn disconnect_when_drained(&self) {
        self.lock().disconnect_when_drained = true;
    }

    /// Messages still queued.
    #[must_use]
    pub fn remaining_broadcast(&self) -> usize {
        self.lock().broadcast.len()
    }

    /// `(msg_id, code)` of every execute request received.
    #[must_use]
    pub fn submitted(&self) -> Vec<(String, String)> {
        self.lock().submitted.clone()
    }

    /// Number of `shutdown` calls that released the transport.
    #[must_use]
    pub fn shutdown_count(&self) -> u32 {
        self.lock().shutdowns
    }
}

/// Transport backed by a [`ScriptHandle`].
#[derive(Debug)]
pub struct ScriptedTransport {
    handle: ScriptHandle,
    closed: bool,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new(handle: ScriptHandle) -> Self {
        Self {
            handle,
            closed: false,
        }
    }
}

impl KernelTransport for ScriptedTransport {
    fn send_execute(&mut self, msg_id: &str, code: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Disconnected);
        }
        let mut state = self.handle.lock();
        state.submitted.push((msg_id.to_string(), code.to_string()));
        if let Some(batch) = state.replies.pop_front() {
            state
                .broadcast
                .extend(batch.into_iter().map(|m| m.with_parent(msg_id)));
        }
        Ok(())
    }

    fn probe_ready(&mut self, timeout: Duration) -> Result<bool, TransportError> {
        if self.closed {
            return Err(TransportError::Disconnected);
        }
        let ready = {
            let mut state = self.handle.lock();
            state.probes += 1;
            state.probes_until_ready.is_some_and(|n| state.probes >= n)
        };
        if !ready {
            std::thread::sleep(timeout);
        }
        Ok(ready)
    }

    fn recv_broadcast(&mut self, timeout: Duration) -> Result<Option<RawMessage>, TransportError> {
        if self.closed {
            return Err(TransportError::Disconnected);
        }
        let (next, disconnect) = {
            let mut state = self.handle.lock();
            (state.broadcast.pop_front(), state.disconnect_when_drained)
        };
        match next {
            Some(message) => Ok(Some(message)),
            None if disconnect => Err(TransportError::Disconnected),
            None => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }

    fn is_alive(&mut self) -> bool {
        !self.closed
    }

    fn shutdown(&mut self) -> Result<(), TransportError> {
        if !self.closed {
            self.closed = true;
            self.handle.lock().shutdowns += 1;
        }
        Ok(())
    }
}

/// Launches scripted kernels for a fixed set of identifiers.
#[derive(Debug, Clone)]
pub struct ScriptedLauncher {
    kernels: BTreeSet<String>,
    handle: ScriptHandle,
}

impl ScriptedLauncher {
    /// Every launch of a known id shares `handle`.
    #[must_use]
    pub fn new(handle: ScriptHandle) -> Self {
        Self {
            kernels: BTreeSet::new(),
            handle,
        }
    }

    /// Register an identifier.
    #[must_use]
    pub fn with_kernel(mut self, kernel_id: &str) -> Self {
        self.kernels.insert(kernel_id.to_string());
        self
    }
}

impl KernelLauncher for ScriptedLauncher {
    fn launch(&self, kernel_id: &str) -> Result<Box<dyn KernelTransport>, StartupError> {
        if !self.kernels.contains(kernel_id) {
            return Err(StartupError::UnknownKernel {
                kernel_id: kernel_id.to_string(),
            });
        }
        Ok(Box::new(ScriptedTransport::new(self.handle.clone())))
    }
}
