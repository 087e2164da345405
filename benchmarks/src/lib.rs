//! Shared input builders for outcheck benchmark suites.

use std::fmt::Write as _;
use std::time::Duration;

use outcheck_harness::collect::CollectPolicy;
use outcheck_harness::scripted::{ScriptHandle, ScriptedLauncher};
use outcheck_harness::session::Session;
use outcheck_wire::RawMessage;
use serde_json::json;

/// Kernel id registered by [`scripted_session`].
pub const BENCH_KERNEL_ID: &str = "bench";

/// A right-aligned table of `rows × cols` numeric cells with a header rule,
/// in the shape statistical kernels print.
#[must_use]
pub fn make_table(rows: usize, cols: usize) -> String {
    let mut out = String::new();
    for c in 0..cols {
        let _ = write!(out, "{:>12}", format!("var{c}"));
    }
    out.push('\n');
    out.push_str(&"-".repeat(12 * cols));
    for r in 0..rows {
        out.push('\n');
        for c in 0..cols {
            let _ = write!(out, "{:>12}", r * 31 + c * 7);
        }
    }
    out
}

/// `make_table` with one cell changed near the end.
#[must_use]
pub fn perturbed_table(rows: usize, cols: usize) -> String {
    let mut table = make_table(rows, cols);
    if let Some(pos) = table.rfind(|c: char| c.is_ascii_digit()) {
        table.replace_range(pos..=pos, "X");
    }
    table
}

/// One execution's worth of broadcast messages: `streams` stdout chunks, a
/// table result, and the bracketing lifecycle markers.
#[must_use]
pub fn execution_messages(streams: usize) -> Vec<RawMessage> {
    let mut messages = vec![RawMessage::status("busy")];
    messages.extend((0..streams).map(|i| RawMessage::stream("stdout", &format!("line {i}\n"))));
    messages.push(RawMessage::execute_result(
        1,
        json!({ "text/plain": make_table(10, 4), "text/html": "<table/>" }),
    ));
    messages.push(RawMessage::status("idle"));
    messages
}

/// A ready session over the scripted transport.
///
/// # Panics
///
/// Panics if the scripted kernel fails to start, which would be a bug in the
/// scripted transport.
#[must_use]
pub fn scripted_session() -> (Session, ScriptHandle) {
    let handle = ScriptHandle::new();
    let launcher = ScriptedLauncher::new(handle.clone()).with_kernel(BENCH_KERNEL_ID);
    let mut session = Session::connect(&launcher, BENCH_KERNEL_ID).expect("scripted connect");
    session
        .await_ready(Duration::from_secs(1))
        .expect("scripted readiness");
    (session, handle)
}

/// Collection policy that never waits in practice: every message is queued
/// before collection starts.
#[must_use]
pub fn bench_policy() -> CollectPolicy {
    CollectPolicy::with_timeout(Duration::from_secs(5)).per_message_timeout(Duration::from_millis(5))
}
