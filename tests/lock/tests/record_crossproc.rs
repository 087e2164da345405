//! Cross-process determinism of the run record digest.
//!
//! Spawns the `record_fixture` binary under three environment variants and
//! asserts identical output. Submission tokens are random per process, so
//! this also proves they never leak into the record.

use std::process::Command;

fn run_variant(work_dir: &std::path::Path, env_overrides: &[(&str, &str)]) -> String {
    let bin = env!("CARGO_BIN_EXE_record_fixture");
    let mut command = Command::new(bin);
    command
        .current_dir(work_dir)
        .env_remove("LC_ALL")
        .env_remove("LANG")
        .env_remove("RUST_LOG");
    for &(key, val) in env_overrides {
        command.env(key, val);
    }

    let output = command
        .output()
        .unwrap_or_else(|e| panic!("failed to spawn {bin} (overrides={env_overrides:?}): {e}"));
    assert!(
        output.status.success(),
        "record_fixture exited with {}: stderr={}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn record_digest_is_stable_across_processes() {
    let temp = tempfile::tempdir().unwrap();
    let manifest_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));

    let baseline = run_variant(manifest_dir, &[]);
    let relocated = run_variant(temp.path(), &[("LC_ALL", "C")]);
    let noisy = run_variant(manifest_dir, &[("LANG", "tr_TR.UTF-8"), ("RUST_LOG", "trace")]);

    assert_eq!(baseline, relocated);
    assert_eq!(baseline, noisy);

    let lines: Vec<&str> = baseline.lines().collect();
    assert_eq!(lines.len(), 4, "{baseline}");
    assert!(lines[0].starts_with("record_digest=sha256:"));
    assert_eq!(lines[1], "scenario_count=3");
    assert_eq!(lines[2], "event_count=3");
    assert_eq!(lines[3], "failed_findings=1");
}
