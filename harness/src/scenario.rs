//! Scenario runner: named code submissions checked against expectations.
//!
//! A [`Scenario`] is code, a collection policy, and a list of
//! [`Expectation`]s. Running it yields one [`Finding`] per expectation, each
//! carrying structured detail (a full [`DiffReport`], an [`EncodingError`],
//! or what was missing) rather than a bare pass/fail.

use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use outcheck_verify::diff::{diff_text, render_report, DiffReport};
use outcheck_verify::payload::{check_container_format, decode_binary};
use outcheck_verify::EncodingError;
use outcheck_wire::{OutputEvent, Payload, StreamChannel};

use crate::collect::{collect, CollectPolicy, Execution, TerminalStatus};
use crate::error::{SessionError, SubmitError};
use crate::record::RunRecord;
use crate::session::{with_session, Session};
use crate::transport::KernelLauncher;

/// One check against a collected execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Expectation {
    /// All text on `channel`, concatenated in order, equals `expected`.
    StreamText {
        channel: StreamChannel,
        expected: String,
    },
    /// The first payload under `mime` is text equal to `expected`.
    MimeText { mime: String, expected: String },
    /// Some event carries a payload under `mime`.
    MimePresent { mime: String },
    /// No event carries a payload under `mime`.
    MimeAbsent { mime: String },
    /// The first payload under `mime` is base64 of bytes starting with
    /// `magic`.
    BinaryImage { mime: String, magic: Vec<u8> },
    /// No `Failure` event was collected.
    NoFailures,
    /// The execution ended with this status.
    Status(TerminalStatus),
}

impl Expectation {
    /// Short label for reports.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::StreamText { channel, .. } => format!("stream {}", channel.as_str()),
            Self::MimeText { mime, .. } => format!("text {mime}"),
            Self::MimePresent { mime } => format!("present {mime}"),
            Self::MimeAbsent { mime } => format!("absent {mime}"),
            Self::BinaryImage { mime, .. } => format!("image {mime}"),
            Self::NoFailures => "no failures".to_string(),
            Self::Status(status) => format!("status {status:?}"),
        }
    }
}

/// Result of one expectation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FindingOutcome {
    Passed,
    /// Text differed; the report has every divergent line.
    DiffMismatch(DiffReport),
    /// A binary payload failed to decode or validate.
    Encoding(EncodingError),
    /// Something expected was not collected.
    Missing { detail: String },
    /// Something collected should not have been.
    Unexpected { detail: String },
}

/// One expectation and its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub expectation: Expectation,
    pub outcome: FindingOutcome,
}

impl Finding {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcome == FindingOutcome::Passed
    }
}

/// A named check of one code submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub name: String,
    pub code: String,
    pub policy: CollectPolicy,
    pub expectations: Vec<Expectation>,
}

impl Scenario {
    #[must_use]
    pub fn new(name: &str, code: &str) -> Self {
        Self {
            name: name.to_string(),
            code: code.to_string(),
            policy: CollectPolicy::default(),
            expectations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: CollectPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn expect(mut self, expectation: Expectation) -> Self {
        self.expectations.push(expectation);
        self
    }
}

/// A scenario's execution and findings.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOutcome {
    pub name: String,
    pub execution: Execution,
    pub findings: Vec<Finding>,
}

impl ScenarioOutcome {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.findings.iter().all(Finding::passed)
    }
}

/// Outcomes of a scenario suite, in run order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub outcomes: Vec<ScenarioOutcome>,
}

impl RunReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(ScenarioOutcome::passed)
    }

    /// Events of every scenario, keyed by name.
    #[must_use]
    pub fn record(&self) -> RunRecord {
        let mut record = RunRecord::new();
        for outcome in &self.outcomes {
            record.insert(&outcome.name, &outcome.execution);
        }
        record
    }

    /// Human-readable summary with full diff detail for failures.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for outcome in &self.outcomes {
            let verdict = if outcome.passed() { "PASS" } else { "FAIL" };
            let _ = writeln!(
                out,
                "{verdict} {} ({:?}, {} events)",
                outcome.name,
                outcome.execution.status(),
                outcome.execution.events().len()
            );
            for finding in outcome.findings.iter().filter(|f| !f.passed()) {
                let _ = writeln!(out, "  {}:", finding.expectation.label());
                match &finding.outcome {
                    FindingOutcome::Passed => {}
                    FindingOutcome::DiffMismatch(report) => {
                        for line in render_report(report).lines() {
                            let _ = writeln!(out, "    {line}");
                        }
                    }
                    FindingOutcome::Encoding(e) => {
                        let _ = writeln!(out, "    {e}");
                    }
                    FindingOutcome::Missing { detail } | FindingOutcome::Unexpected { detail } => {
                        let _ = writeln!(out, "    {detail}");
                    }
                }
            }
        }
        out
    }
}

/// Check `execution` against each expectation.
#[must_use]
pub fn verify_execution(execution: &Execution, expectations: &[Expectation]) -> Vec<Finding> {
    expectations
        .iter()
        .map(|expectation| Finding {
            outcome: check(execution, expectation),
            expectation: expectation.clone(),
        })
        .collect()
}

fn check(execution: &Execution, expectation: &Expectation) -> FindingOutcome {
    let events = execution.events();
    match expectation {
        Expectation::StreamText { channel, expected } => {
            let actual: String = events
                .iter()
                .filter_map(|e| match e {
                    OutputEvent::StreamText { channel: c, text } if c == channel => {
                        Some(text.as_str())
                    }
                    _ => None,
                })
                .collect();
            diff_outcome(&actual, expected)
        }
        Expectation::MimeText { mime, expected } => match first_payload(events, mime) {
            None => missing_mime(mime),
            Some(Payload::Text(actual)) => diff_outcome(actual, expected),
            Some(Payload::Structured(_)) => FindingOutcome::Encoding(EncodingError::NotText {
                mime: mime.clone(),
            }),
        },
        Expectation::MimePresent { mime } => match first_payload(events, mime) {
            Some(_) => FindingOutcome::Passed,
            None => missing_mime(mime),
        },
        Expectation::MimeAbsent { mime } => match first_payload(events, mime) {
            Some(_) => FindingOutcome::Unexpected {
                detail: format!("payload {mime} was emitted"),
            },
            None => FindingOutcome::Passed,
        },
        Expectation::BinaryImage { mime, magic } => match first_payload(events, mime) {
            None => missing_mime(mime),
            Some(payload) => {
                let Some(text) = payload.as_text() else {
                    return FindingOutcome::Encoding(EncodingError::NotText { mime: mime.clone() });
                };
                match decode_binary(text).and_then(|bytes| check_container_format(&bytes, magic)) {
                    Ok(()) => FindingOutcome::Passed,
                    Err(e) => FindingOutcome::Encoding(e),
                }
            }
        },
        Expectation::NoFailures => {
            let failures: Vec<String> = events
                .iter()
                .filter_map(|e| match e {
                    OutputEvent::Failure { kind, message, .. } => Some(format!("{kind}: {message}")),
                    _ => None,
                })
                .collect();
            if failures.is_empty() {
                FindingOutcome::Passed
            } else {
                FindingOutcome::Unexpected {
                    detail: failures.join("; "),
                }
            }
        }
        Expectation::Status(expected) => {
            if execution.status() == *expected {
                FindingOutcome::Passed
            } else {
                FindingOutcome::Unexpected {
                    detail: format!(
                        "ended {:?}, expected {expected:?}",
                        execution.status()
                    ),
                }
            }
        }
    }
}

fn first_payload<'a>(events: &'a [OutputEvent], mime: &str) -> Option<&'a Payload> {
    events
        .iter()
        .filter_map(OutputEvent::payloads)
        .find_map(|payloads| payloads.get(mime))
}

fn missing_mime(mime: &str) -> FindingOutcome {
    FindingOutcome::Missing {
        detail: format!("no payload under {mime}"),
    }
}

fn diff_outcome(actual: &str, expected: &str) -> FindingOutcome {
    let report = diff_text(actual, expected);
    if report.is_identical() {
        FindingOutcome::Passed
    } else {
        FindingOutcome::DiffMismatch(report)
    }
}

/// Submit, collect, and verify each scenario in order on one session.
///
/// # Errors
///
/// Returns [`SubmitError`] if a submission is refused; earlier outcomes are
/// discarded.
pub fn run_scenarios(session: &mut Session, scenarios: &[Scenario]) -> Result<RunReport, SubmitError> {
    let mut report = RunReport::default();
    for scenario in scenarios {
        let id = session.submit(&scenario.code)?;
        let execution = collect(session, &id, &scenario.policy);
        let findings = verify_execution(&execution, &scenario.expectations);
        let failed = findings.iter().filter(|f| !f.passed()).count();
        if failed == 0 {
            info!(scenario = %scenario.name, "scenario passed");
        } else {
            warn!(scenario = %scenario.name, failed, "scenario failed");
        }
        report.outcomes.push(ScenarioOutcome {
            name: scenario.name.clone(),
            execution,
            findings,
        });
    }
    Ok(report)
}

/// Run `scenarios` against a freshly launched `kernel_id`, shutting the
/// kernel down afterwards on every path.
///
/// # Errors
///
/// Returns [`SessionError`] on startup, readiness, or submission failure.
pub fn run_suite(
    launcher: &dyn KernelLauncher,
    kernel_id: &str,
    ready_timeout: Duration,
    scenarios: &[Scenario],
) -> Result<RunReport, SessionError> {
    let report = with_session(launcher, kernel_id, ready_timeout, |session| {
        run_scenarios(session, scenarios)
    })??;
    Ok(report)
}
