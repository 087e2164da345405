//! Runs the scripted scenario suite and prints deterministic output lines
//! for cross-process verification.
//!
//! Usage: `record_fixture`
//! Output: four lines, each `key=value`:
//!   `record_digest`=sha256:...
//!   `scenario_count`=3
//!   `event_count`=3
//!   `failed_findings`=1

use lock_tests::fixtures::{scripted_launcher, scripted_scenarios, FAKE_KERNEL_ID, READY_TIMEOUT};
use outcheck_harness::logging::init_tracing;
use outcheck_harness::scenario::run_suite;

fn main() {
    init_tracing("warn");
    let (launcher, _handle) = scripted_launcher();
    let report = run_suite(&launcher, FAKE_KERNEL_ID, READY_TIMEOUT, &scripted_scenarios())
        .expect("scripted suite failed to run");
    let record = report.record();

    let event_count: usize = record
        .scenario_names()
        .map(|name| record.events(name).map_or(0, <[_]>::len))
        .sum();
    let failed = report
        .outcomes
        .iter()
        .flat_map(|o| &o.findings)
        .filter(|f| !f.passed())
        .count();

    println!("record_digest={}", record.digest().expect("record digest"));
    println!("scenario_count={}", record.len());
    println!("event_count={event_count}");
    println!("failed_findings={failed}");
}
