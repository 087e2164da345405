//! Session driver and collection loop against a real child process.
//!
//! Spawns the `fake_kernel` fixture binary through `StdioLauncher` and checks
//! readiness, collection, termination statuses, and process release.

use std::path::Path;
use std::time::{Duration, Instant};

use lock_tests::fixtures::{fake_kernel_launcher, test_policy, FAKE_KERNEL_ID, READY_TIMEOUT};
use outcheck_harness::collect::{collect, CollectPolicy, IgnoreReason, TerminalStatus};
use outcheck_harness::error::{ReadinessError, SessionError};
use outcheck_harness::session::{with_session, Session};
use outcheck_wire::{OutputEvent, StreamChannel, UNKNOWN_MESSAGE_TYPE};

fn fake_kernel() -> &'static Path {
    Path::new(env!("CARGO_BIN_EXE_fake_kernel"))
}

fn ready_session(args: &[&str]) -> Session {
    let launcher = fake_kernel_launcher(fake_kernel(), args);
    let mut session = Session::connect(&launcher, FAKE_KERNEL_ID).unwrap();
    session.await_ready(READY_TIMEOUT).unwrap();
    session
}

#[test]
fn print_completes_with_stdout_text() {
    let mut session = ready_session(&[]);
    let id = session.submit("print hello world").unwrap();
    let execution = collect(&mut session, &id, &test_policy());

    assert_eq!(execution.status(), TerminalStatus::Completed);
    assert_eq!(execution.code(), "print hello world");
    assert_eq!(
        execution.events(),
        &[OutputEvent::StreamText {
            channel: StreamChannel::Stdout,
            text: "hello world\n".into(),
        }]
    );
    assert!(session.kernel_running());
    session.shutdown();
    assert!(!session.is_live());
    assert!(!session.kernel_running());
}

#[test]
fn consecutive_submissions_stay_separate() {
    let mut session = ready_session(&[]);
    let policy = test_policy().correlate_parent(true);

    let first = session.submit("warn careful").unwrap();
    let first_exec = collect(&mut session, &first, &policy);
    let second = session.submit("table").unwrap();
    let second_exec = collect(&mut session, &second, &policy);

    assert_eq!((first.sequence(), second.sequence()), (1, 2));
    assert!(matches!(
        &first_exec.events()[..],
        [OutputEvent::StreamText { channel: StreamChannel::Stderr, .. }]
    ));
    match &second_exec.events()[..] {
        [OutputEvent::Result { execution_index, payloads, .. }] => {
            assert_eq!(*execution_index, 2);
            assert!(payloads.contains_key("text/plain"));
            assert!(!payloads.contains_key("text/html"));
        }
        other => panic!("unexpected events {other:?}"),
    }
    assert!(second_exec.ignored().is_empty());
}

#[test]
fn setup_idle_needs_threshold_two() {
    let mut session = ready_session(&[]);

    let id = session.submit("idle-twice").unwrap();
    let early = collect(&mut session, &id, &test_policy());
    assert_eq!(early.status(), TerminalStatus::Completed);
    assert!(early.events().is_empty());
    // The rest of that execution is still queued; drain it.
    let rest = collect(&mut session, &id, &test_policy());
    assert_eq!(rest.events().len(), 1);

    let id = session.submit("idle-twice").unwrap();
    let full = collect(&mut session, &id, &test_policy().idle_threshold(2));
    assert_eq!(full.status(), TerminalStatus::Completed);
    assert_eq!(full.idle_markers(), 2);
    assert_eq!(
        full.events(),
        &[OutputEvent::StreamText {
            channel: StreamChannel::Stdout,
            text: "after setup\n".into(),
        }]
    );
}

#[test]
fn unknown_message_type_surfaces_or_is_recorded() {
    let mut session = ready_session(&[]);

    let id = session.submit("echo").unwrap();
    let surfaced = collect(&mut session, &id, &test_policy());
    assert!(matches!(
        &surfaced.events()[..],
        [OutputEvent::Failure { kind, .. }] if kind == UNKNOWN_MESSAGE_TYPE
    ));

    let id = session.submit("echo").unwrap();
    let skipped = collect(
        &mut session,
        &id,
        &test_policy().ignore_message_type("execute_input"),
    );
    assert!(skipped.events().is_empty());
    assert_eq!(skipped.ignored().len(), 1);
    assert_eq!(skipped.ignored()[0].reason, IgnoreReason::CallerPolicy);
}

#[test]
fn malformed_frame_is_skipped() {
    let mut session = ready_session(&[]);
    let id = session.submit("garbage").unwrap();
    let execution = collect(&mut session, &id, &test_policy());
    assert_eq!(execution.status(), TerminalStatus::Completed);
    assert_eq!(execution.events().len(), 1);
}

#[test]
fn non_utf8_line_does_not_end_collection() {
    let mut session = ready_session(&[]);
    let id = session.submit("garbage-bytes").unwrap();
    let execution = collect(&mut session, &id, &test_policy());
    assert_eq!(execution.status(), TerminalStatus::Completed);
    assert!(matches!(
        execution.events(),
        [OutputEvent::StreamText { text, .. }] if text == "still here\n"
    ));

    let next = session.submit("print after").unwrap();
    let after = collect(&mut session, &next, &test_policy());
    assert_eq!(after.status(), TerminalStatus::Completed);
    assert_eq!(after.events().len(), 1);
}

#[test]
fn sessions_run_on_separate_threads() {
    let workers: Vec<_> = ["print left", "print right"]
        .into_iter()
        .map(|code| {
            let mut session = ready_session(&[]);
            std::thread::spawn(move || {
                let id = session.submit(code).unwrap();
                let execution = collect(&mut session, &id, &test_policy());
                session.shutdown();
                execution
            })
        })
        .collect();

    for (worker, expected) in workers.into_iter().zip(["left\n", "right\n"]) {
        let execution = worker.join().unwrap();
        assert_eq!(execution.status(), TerminalStatus::Completed);
        assert!(matches!(
            execution.events(),
            [OutputEvent::StreamText { text, .. }] if text == expected
        ));
    }
}

#[test]
fn silent_kernel_times_out_with_partial_events() {
    let mut session = ready_session(&[]);
    let id = session.submit("silent").unwrap();
    let policy = CollectPolicy::with_timeout(Duration::from_millis(400))
        .per_message_timeout(Duration::from_millis(50));
    let execution = collect(&mut session, &id, &policy);
    assert_eq!(execution.status(), TerminalStatus::TimedOut);
    assert!(execution.events().is_empty());
}

#[test]
fn exiting_kernel_ends_collection_as_errored() {
    let mut session = ready_session(&[]);
    let id = session.submit("exit").unwrap();
    let execution = collect(&mut session, &id, &test_policy());
    assert_eq!(execution.status(), TerminalStatus::Errored);

    let deadline = Instant::now() + Duration::from_secs(5);
    while session.kernel_running() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(!session.kernel_running());
}

#[test]
fn failure_event_carries_name_value_and_trace() {
    let mut session = ready_session(&[]);
    let id = session.submit("fail").unwrap();
    let execution = collect(&mut session, &id, &test_policy());
    assert_eq!(
        execution.events(),
        &[OutputEvent::Failure {
            kind: "r(111)".into(),
            message: "variable not found".into(),
            trace: vec!["r(111);".into()],
        }]
    );
}

#[test]
fn never_ready_kernel_fails_readiness_and_is_released() {
    let launcher = fake_kernel_launcher(fake_kernel(), &["--never-ready"]);
    let started = Instant::now();
    let err = with_session(&launcher, FAKE_KERNEL_ID, Duration::from_millis(300), |_| ())
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Readiness(ReadinessError::Timeout { .. })
    ));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn slow_start_is_awaited() {
    let session = ready_session(&["--ready-delay-ms", "300"]);
    assert!(session.is_ready());
}

#[test]
fn stubborn_kernel_is_killed_after_grace() {
    let mut session = ready_session(&["--ignore-shutdown"]);
    let started = Instant::now();
    session.shutdown();
    assert!(!session.is_live());
    assert!(started.elapsed() < Duration::from_secs(10));
}
