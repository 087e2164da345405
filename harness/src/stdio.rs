//! Process-backed transport: a kernel speaking JSON lines over stdio.
//!
//! # Wire format
//!
//! One JSON object per line in each direction:
//!
//! ```text
//! {"channel":"shell"|"iopub"|"control","header":{...},"parent_header":{...},"content":{...}}
//! ```
//!
//! Requests (`kernel_info_request`, `execute_request`, `shutdown_request`)
//! are written to the child's stdin. A reader thread parses stdout and routes
//! `iopub` frames to the broadcast channel and `shell`/`control` frames to
//! the reply channel. Malformed lines, including ones that are not UTF-8,
//! are logged and skipped. Replies outside the readiness handshake are
//! discarded. The child's stderr is inherited.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use outcheck_wire::message::{
    MSG_EXECUTE_REQUEST, MSG_KERNEL_INFO_REPLY, MSG_KERNEL_INFO_REQUEST, MSG_SHUTDOWN_REQUEST,
};
use outcheck_wire::RawMessage;

use crate::error::{StartupError, TransportError};
use crate::transport::{KernelLauncher, KernelTransport};

/// Default time a kernel gets to exit after `shutdown_request`.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

const EXIT_POLL: Duration = Duration::from_millis(10);

/// How to start one kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KernelCommand {
    /// Executable path.
    pub program: PathBuf,
    /// Arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

impl KernelCommand {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Frame channel tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Shell,
    Iopub,
    Control,
}

/// One line on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub channel: Channel,
    #[serde(flatten)]
    pub message: RawMessage,
}

/// Starts kernels from a table of commands keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct StdioLauncher {
    commands: BTreeMap<String, KernelCommand>,
    shutdown_grace: Option<Duration>,
}

impl StdioLauncher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `kernel_id`.
    #[must_use]
    pub fn with_kernel(mut self, kernel_id: &str, command: KernelCommand) -> Self {
        self.commands.insert(kernel_id.to_string(), command);
        self
    }

    /// Override [`DEFAULT_SHUTDOWN_GRACE`].
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = Some(grace);
        self
    }

    /// Launcher for every kernel in `commands`.
    #[must_use]
    pub fn from_commands(commands: BTreeMap<String, KernelCommand>, grace: Duration) -> Self {
        Self {
            commands,
            shutdown_grace: Some(grace),
        }
    }
}

impl KernelLauncher for StdioLauncher {
    fn launch(&self, kernel_id: &str) -> Result<Box<dyn KernelTransport>, StartupError> {
        let command = self
            .commands
            .get(kernel_id)
            .ok_or_else(|| StartupError::UnknownKernel {
                kernel_id: kernel_id.to_string(),
            })?;
        let transport = StdioTransport::spawn(
            kernel_id,
            command,
            self.shutdown_grace.unwrap_or(DEFAULT_SHUTDOWN_GRACE),
        )?;
        Ok(Box::new(transport))
    }
}

/// A running kernel child process.
#[derive(Debug)]
pub struct StdioTransport {
    kernel_id: String,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    iopub: Receiver<RawMessage>,
    shell: Receiver<RawMessage>,
    reader: Option<JoinHandle<()>>,
    info_request: Option<String>,
    grace: Duration,
}

impl StdioTransport {
    /// Spawn `command` and start its reader thread.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError::Spawn`] if the process cannot be started or its
    /// pipes are unavailable.
    pub fn spawn(
        kernel_id: &str,
        command: &KernelCommand,
        grace: Duration,
    ) -> Result<Self, StartupError> {
        let spawn_err = |detail: String| StartupError::Spawn {
            kernel_id: kernel_id.to_string(),
            detail,
        };

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| spawn_err(format!("{}: {e}", command.program.display())))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(spawn_err("child pipes unavailable".to_string()));
        };

        let (iopub_tx, iopub) = mpsc::channel();
        let (shell_tx, shell) = mpsc::channel();
        let reader_id = kernel_id.to_string();
        let reader = std::thread::Builder::new()
            .name(format!("kernel-reader-{kernel_id}"))
            .spawn(move || read_frames(&reader_id, stdout, &iopub_tx, &shell_tx))
            .map_err(|e| {
                let _ = child.kill();
                let _ = child.wait();
                spawn_err(format!("reader thread: {e}"))
            })?;

        debug!(kernel_id, pid = child.id(), "kernel process spawned");
        Ok(Self {
            kernel_id: kernel_id.to_string(),
            child: Some(child),
            stdin: Some(stdin),
            iopub,
            shell,
            reader: Some(reader),
            info_request: None,
            grace,
        })
    }

    fn send(&mut self, channel: Channel, message: RawMessage) -> Result<(), TransportError> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(TransportError::Disconnected);
        };
        let frame = Frame { channel, message };
        let mut line = serde_json::to_string(&frame).map_err(|e| TransportError::Send {
            detail: e.to_string(),
        })?;
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .and_then(|()| stdin.flush())
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::BrokenPipe => TransportError::Disconnected,
                _ => TransportError::Send {
                    detail: e.to_string(),
                },
            })
    }
}

fn read_frames(
    kernel_id: &str,
    stdout: impl std::io::Read,
    iopub: &Sender<RawMessage>,
    shell: &Sender<RawMessage>,
) {
    let mut reader = BufReader::new(stdout);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(kernel_id, error = %e, "kernel stdout read failed");
                break;
            }
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        // Invalid UTF-8 is a parse error here, not a read error.
        let frame: Frame = match serde_json::from_slice(&line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(kernel_id, error = %e, "skipping malformed kernel frame");
                continue;
            }
        };
        trace!(kernel_id, channel = ?frame.channel, msg_type = frame.message.msg_type(), "frame received");
        let target = match frame.channel {
            Channel::Iopub => iopub,
            Channel::Shell | Channel::Control => shell,
        };
        if target.send(frame.message).is_err() {
            break;
        }
    }
    debug!(kernel_id, "kernel stdout closed");
}

/// Discard replies that arrive outside the readiness handshake
/// (`execute_reply`, `shutdown_reply`). Returns how many were dropped.
fn drain_replies(kernel_id: &str, shell: &Receiver<RawMessage>) -> usize {
    let mut drained = 0;
    while let Ok(reply) = shell.try_recv() {
        trace!(kernel_id, msg_type = reply.msg_type(), "discarding shell reply");
        drained += 1;
    }
    drained
}

fn new_msg_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl KernelTransport for StdioTransport {
    fn send_execute(&mut self, msg_id: &str, code: &str) -> Result<(), TransportError> {
        let message = RawMessage::new(
            MSG_EXECUTE_REQUEST,
            serde_json::json!({ "code": code, "silent": false }),
        )
        .with_id(msg_id);
        self.send(Channel::Shell, message)
    }

    fn probe_ready(&mut self, timeout: Duration) -> Result<bool, TransportError> {
        let request_id = match &self.info_request {
            Some(id) => id.clone(),
            None => {
                let id = new_msg_id();
                let request = RawMessage::new(MSG_KERNEL_INFO_REQUEST, serde_json::json!({}))
                    .with_id(id.clone());
                self.send(Channel::Shell, request)?;
                self.info_request = Some(id.clone());
                id
            }
        };

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.shell.recv_timeout(remaining) {
                Ok(reply)
                    if reply.msg_type() == MSG_KERNEL_INFO_REPLY
                        && reply.parent_msg_id() == Some(request_id.as_str()) =>
                {
                    return Ok(true);
                }
                Ok(other) => {
                    trace!(kernel_id = %self.kernel_id, msg_type = other.msg_type(), "ignoring reply during handshake");
                }
                Err(RecvTimeoutError::Timeout) => return Ok(false),
                Err(RecvTimeoutError::Disconnected) => return Err(TransportError::Disconnected),
            }
        }
    }

    fn recv_broadcast(&mut self, timeout: Duration) -> Result<Option<RawMessage>, TransportError> {
        drain_replies(&self.kernel_id, &self.shell);
        match self.iopub.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }

    fn is_alive(&mut self) -> bool {
        self.child
            .as_mut()
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }

    fn shutdown(&mut self) -> Result<(), TransportError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let request = RawMessage::new(MSG_SHUTDOWN_REQUEST, serde_json::json!({ "restart": false }))
            .with_id(new_msg_id());
        if let Err(e) = self.send(Channel::Control, request) {
            debug!(kernel_id = %self.kernel_id, error = %e, "shutdown request not delivered");
        }
        self.stdin = None;

        let deadline = Instant::now() + self.grace;
        let mut exited = false;
        while Instant::now() < deadline {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(kernel_id = %self.kernel_id, %status, "kernel exited");
                    exited = true;
                    break;
                }
                Ok(None) => std::thread::sleep(EXIT_POLL),
                Err(_) => break,
            }
        }

        let mut result = Ok(());
        if !exited {
            warn!(kernel_id = %self.kernel_id, grace = ?self.grace, "kernel did not exit in time; killing");
            let _ = child.kill();
            if let Err(e) = child.wait() {
                result = Err(TransportError::Send {
                    detail: format!("failed to reap kernel: {e}"),
                });
            }
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        result
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}
