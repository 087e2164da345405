//! Collection loop: broadcast messages → one immutable `Execution`.
//!
//! # Termination
//!
//! The loop reads one message at a time, waiting at most
//! `per_message_timeout` for each. It stops when:
//!
//! - the `idle_threshold`-th idle marker arrives → `Completed`
//! - `overall_timeout` has elapsed → `TimedOut`
//! - the broadcast channel closes → `Errored`
//!
//! An empty per-message wait is not a failure; the loop keeps going until
//! the overall budget runs out. Partial events are kept for every terminal
//! status. Nothing after the terminating idle marker is read, so it stays
//! queued for the next submission.
//!
//! `idle_threshold` is caller policy. Some kernels emit an idle marker for
//! a setup phase before the one that ends the real work; callers that know
//! this ask for the Nth idle.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use outcheck_wire::{classify, LifecyclePhase, OutputEvent, RawMessage};

use crate::error::TransportError;
use crate::session::{Session, SubmissionId};

/// Default overall wait per execution.
pub const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_secs(15);
/// Default wait for any single broadcast message.
pub const DEFAULT_PER_MESSAGE_TIMEOUT: Duration = Duration::from_secs(2);
/// Default number of idle markers that end an execution.
pub const DEFAULT_IDLE_THRESHOLD: u32 = 1;

/// Caller policy for one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectPolicy {
    /// Upper bound on the whole collection.
    pub overall_timeout: Duration,
    /// Upper bound on each individual wait.
    pub per_message_timeout: Duration,
    /// Idle markers required for completion. Values below 1 act as 1.
    pub idle_threshold: u32,
    /// Skip messages whose parent id names a different submission.
    pub correlate_parent: bool,
    /// Message types skipped before classification (recorded, not dropped).
    pub ignored_message_types: Vec<String>,
}

impl Default for CollectPolicy {
    fn default() -> Self {
        Self {
            overall_timeout: DEFAULT_OVERALL_TIMEOUT,
            per_message_timeout: DEFAULT_PER_MESSAGE_TIMEOUT,
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            correlate_parent: false,
            ignored_message_types: Vec::new(),
        }
    }
}

impl CollectPolicy {
    /// Default policy with the given overall timeout.
    #[must_use]
    pub fn with_timeout(overall_timeout: Duration) -> Self {
        Self {
            overall_timeout,
            ..Self::default()
        }
    }

    /// Set the idle threshold.
    #[must_use]
    pub fn idle_threshold(mut self, idle_threshold: u32) -> Self {
        self.idle_threshold = idle_threshold;
        self
    }

    /// Set the per-message timeout.
    #[must_use]
    pub fn per_message_timeout(mut self, per_message_timeout: Duration) -> Self {
        self.per_message_timeout = per_message_timeout;
        self
    }

    /// Skip messages correlated to other submissions.
    #[must_use]
    pub fn correlate_parent(mut self, correlate_parent: bool) -> Self {
        self.correlate_parent = correlate_parent;
        self
    }

    /// Skip (and record) messages of this type.
    #[must_use]
    pub fn ignore_message_type(mut self, msg_type: &str) -> Self {
        self.ignored_message_types.push(msg_type.to_string());
        self
    }
}

/// How an execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalStatus {
    /// The requested number of idle markers arrived.
    Completed,
    /// The overall timeout elapsed first.
    TimedOut,
    /// The kernel's broadcast channel closed first.
    Errored,
}

/// Why a message was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IgnoreReason {
    /// Its type is listed in `ignored_message_types`.
    CallerPolicy,
    /// It answers a different submission.
    ForeignParent { parent_msg_id: String },
    /// A status message with an `execution_state` other than busy/idle.
    UnrecognizedPhase { state: String },
}

/// A message the loop consumed without turning it into an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IgnoredMessage {
    /// The message's type tag.
    pub msg_type: String,
    /// Why it was skipped.
    pub reason: IgnoreReason,
}

/// One submission's collected output. Immutable once returned.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    submission_id: SubmissionId,
    code: String,
    events: Vec<OutputEvent>,
    status: TerminalStatus,
    idle_markers: u32,
    ignored: Vec<IgnoredMessage>,
    elapsed: Duration,
}

impl Execution {
    /// The submission this execution answers.
    #[must_use]
    pub fn submission_id(&self) -> &SubmissionId {
        &self.submission_id
    }

    /// The submitted source code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Surfaced events in delivery order.
    #[must_use]
    pub fn events(&self) -> &[OutputEvent] {
        &self.events
    }

    /// How the collection ended.
    #[must_use]
    pub fn status(&self) -> TerminalStatus {
        self.status
    }

    /// Idle markers consumed.
    #[must_use]
    pub fn idle_markers(&self) -> u32 {
        self.idle_markers
    }

    /// Messages consumed but not surfaced.
    #[must_use]
    pub fn ignored(&self) -> &[IgnoredMessage] {
        &self.ignored
    }

    /// Wall time spent collecting.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Accumulates one execution; consumed by `finish`, so nothing can be added
/// after the terminal status is set.
struct ExecutionBuilder {
    submission_id: SubmissionId,
    code: String,
    events: Vec<OutputEvent>,
    idle_markers: u32,
    ignored: Vec<IgnoredMessage>,
}

impl ExecutionBuilder {
    fn finish(self, status: TerminalStatus, elapsed: Duration) -> Execution {
        Execution {
            submission_id: self.submission_id,
            code: self.code,
            events: self.events,
            status,
            idle_markers: self.idle_markers,
            ignored: self.ignored,
            elapsed,
        }
    }
}

/// Collect the output of `submission` from `session`'s broadcast channel.
#[must_use]
pub fn collect(session: &mut Session, submission: &SubmissionId, policy: &CollectPolicy) -> Execution {
    let idle_threshold = policy.idle_threshold.max(1);
    let started = Instant::now();
    let mut builder = ExecutionBuilder {
        submission_id: submission.clone(),
        code: session.take_code(submission),
        events: Vec::new(),
        idle_markers: 0,
        ignored: Vec::new(),
    };

    let status = loop {
        let elapsed = started.elapsed();
        if elapsed >= policy.overall_timeout {
            break TerminalStatus::TimedOut;
        }
        let wait = policy.per_message_timeout.min(policy.overall_timeout - elapsed);

        let raw = match session.next_broadcast(wait) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                trace!(submission = %submission, ?wait, "no broadcast message within wait");
                continue;
            }
            Err(TransportError::Disconnected) => {
                warn!(submission = %submission, "broadcast channel closed before completion");
                break TerminalStatus::Errored;
            }
            Err(e) => {
                warn!(submission = %submission, error = %e, "broadcast receive failed");
                continue;
            }
        };

        if let Some(reason) = ignore_reason(&raw, submission, policy) {
            debug!(submission = %submission, msg_type = raw.msg_type(), ?reason, "message skipped");
            builder.ignored.push(IgnoredMessage {
                msg_type: raw.msg_type().to_string(),
                reason,
            });
            continue;
        }

        let event = classify(&raw);
        debug!(submission = %submission, event = event.variant_name(), "message classified");
        match event {
            OutputEvent::LifecycleMarker {
                phase: LifecyclePhase::Idle,
            } => {
                builder.idle_markers += 1;
                if builder.idle_markers >= idle_threshold {
                    break TerminalStatus::Completed;
                }
            }
            OutputEvent::LifecycleMarker {
                phase: LifecyclePhase::Busy,
            } => {}
            OutputEvent::LifecycleMarker {
                phase: LifecyclePhase::Unrecognized(state),
            } => builder.ignored.push(IgnoredMessage {
                msg_type: raw.msg_type().to_string(),
                reason: IgnoreReason::UnrecognizedPhase { state },
            }),
            surfaced => builder.events.push(surfaced),
        }
    };

    let execution = builder.finish(status, started.elapsed());
    info!(
        submission = %submission,
        status = ?execution.status,
        events = execution.events.len(),
        idle_markers = execution.idle_markers,
        elapsed = ?execution.elapsed,
        "collection finished"
    );
    execution
}

fn ignore_reason(
    raw: &RawMessage,
    submission: &SubmissionId,
    policy: &CollectPolicy,
) -> Option<IgnoreReason> {
    if policy
        .ignored_message_types
        .iter()
        .any(|t| t == raw.msg_type())
    {
        return Some(IgnoreReason::CallerPolicy);
    }
    if policy.correlate_parent {
        if let Some(parent) = raw.parent_msg_id() {
            if parent != submission.token() {
                return Some(IgnoreReason::ForeignParent {
                    parent_msg_id: parent.to_string(),
                });
            }
        }
    }
    None
}
