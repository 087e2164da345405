//! Scenario suites end to end: fixture kernel → findings → run record on disk.

use std::path::Path;

use lock_tests::fixtures::{
    fake_kernel_launcher, scripted_launcher, scripted_scenarios, test_policy, FAKE_KERNEL_ID,
    READY_TIMEOUT,
};
use outcheck_harness::collect::TerminalStatus;
use outcheck_harness::record::{read_record_dir, write_record_dir};
use outcheck_harness::scenario::{run_suite, Expectation, FindingOutcome, Scenario};
use outcheck_verify::payload::PNG_SIGNATURE;
use outcheck_wire::OutputEvent;

fn fake_kernel() -> &'static Path {
    Path::new(env!("CARGO_BIN_EXE_fake_kernel"))
}

const EXPECTED_TABLE: &str = "      Source |       SS\n-------------+----------\n       Model |  1.52e+09\n    Residual |  4.43e+08";

fn stata_like_scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new("table-plain", "table")
            .with_policy(test_policy())
            .expect(Expectation::MimeText {
                mime: "text/plain".into(),
                expected: EXPECTED_TABLE.into(),
            })
            .expect(Expectation::MimeAbsent {
                mime: "text/html".into(),
            }),
        Scenario::new("table-html", "table-html")
            .with_policy(test_policy())
            .expect(Expectation::MimePresent {
                mime: "text/html".into(),
            })
            .expect(Expectation::MimePresent {
                mime: "text/plain".into(),
            }),
        Scenario::new("graph", "png")
            .with_policy(test_policy())
            .expect(Expectation::BinaryImage {
                mime: "image/png".into(),
                magic: PNG_SIGNATURE.to_vec(),
            })
            .expect(Expectation::NoFailures)
            .expect(Expectation::Status(TerminalStatus::Completed)),
    ]
}

#[test]
fn fixture_kernel_suite_passes() {
    let launcher = fake_kernel_launcher(fake_kernel(), &[]);
    let report = run_suite(&launcher, FAKE_KERNEL_ID, READY_TIMEOUT, &stata_like_scenarios())
        .unwrap();
    assert!(report.passed(), "{}", report.render());
    assert_eq!(report.outcomes.len(), 3);
}

#[test]
fn table_drift_is_pinpointed() {
    let launcher = fake_kernel_launcher(fake_kernel(), &[]);
    let drifted = EXPECTED_TABLE.replace("1.52e+09", "1.53e+09");
    let scenario = Scenario::new("table-drift", "table")
        .with_policy(test_policy())
        .expect(Expectation::MimeText {
            mime: "text/plain".into(),
            expected: drifted,
        });
    let report = run_suite(&launcher, FAKE_KERNEL_ID, READY_TIMEOUT, &[scenario]).unwrap();

    let FindingOutcome::DiffMismatch(diff) = &report.outcomes[0].findings[0].outcome else {
        panic!("expected diff mismatch: {}", report.render());
    };
    assert_eq!(diff.divergent_indices(), vec![2]);
    assert_eq!(diff.divergences[0].first_char_divergence, Some(19));
    assert!(report.render().contains("pos 19: actual='2' expected='3'"));
}

#[test]
fn run_record_survives_disk_roundtrip() {
    let launcher = fake_kernel_launcher(fake_kernel(), &[]);
    let report = run_suite(&launcher, FAKE_KERNEL_ID, READY_TIMEOUT, &stata_like_scenarios())
        .unwrap();
    let record = report.record();

    let dir = tempfile::tempdir().unwrap();
    let digest = write_record_dir(&record, dir.path()).unwrap();
    let back = read_record_dir(dir.path()).unwrap();
    assert_eq!(back, record);
    assert_eq!(back.digest().unwrap(), digest);

    let graph = back.events("graph").unwrap();
    assert!(matches!(&graph[..], [OutputEvent::DisplayData { payloads }] if payloads.contains_key("image/png")));
}

#[test]
fn scripted_suite_reports_the_failing_command() {
    let (launcher, handle) = scripted_launcher();
    let report = run_suite(&launcher, FAKE_KERNEL_ID, READY_TIMEOUT, &scripted_scenarios()).unwrap();
    assert_eq!(handle.shutdown_count(), 1);
    assert_eq!(handle.submitted().len(), 3);

    let failing: Vec<&str> = report
        .outcomes
        .iter()
        .filter(|o| !o.passed())
        .map(|o| o.name.as_str())
        .collect();
    assert_eq!(failing, vec!["fail"]);
}
