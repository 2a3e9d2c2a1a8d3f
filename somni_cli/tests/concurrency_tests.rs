//! Concurrency tests for the somni binary.
//!
//! These tests verify that multiple processes sharing one data directory:
//! - Never open two sessions for the same baby
//! - Never corrupt the session store

use assert_cmd::Command;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn cli(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("somni"));
    cmd.env("XDG_CONFIG_HOME", temp_dir.path().join("config"))
        .arg("--data-dir")
        .arg(temp_dir.path().join("data"));
    cmd
}

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

#[test]
fn test_concurrent_starts_open_one_session() {
    let temp_dir = std::sync::Arc::new(setup_test_dir());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let temp_dir = temp_dir.clone();
            thread::spawn(move || {
                cli(&temp_dir)
                    .args(["start", "--subject", "baby1", "--device"])
                    .arg(format!("device{}", i))
                    .timeout(Duration::from_secs(10))
                    .output()
                    .expect("Failed to run somni")
                    .status
                    .success()
            })
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|h| h.join().expect("Thread panicked"))
        .filter(|ok| *ok)
        .count();
    assert_eq!(successes, 1, "exactly one start may win");

    let store = temp_dir.path().join("data").join("sessions.jsonl");
    let content = std::fs::read_to_string(store).expect("Failed to read store");
    assert_eq!(content.lines().filter(|l| !l.is_empty()).count(), 1);
}

#[test]
fn test_no_store_corruption_under_load() {
    let temp_dir = std::sync::Arc::new(setup_test_dir());

    // Each baby gets its own start/end cycle, all running at once
    let handles: Vec<_> = (0..10)
        .map(|i| {
            let temp_dir = temp_dir.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(i * 5));
                let subject = format!("baby{}", i);
                cli(&temp_dir)
                    .args(["start", "--subject", subject.as_str()])
                    .timeout(Duration::from_secs(10))
                    .assert()
                    .success();
                cli(&temp_dir)
                    .args(["end", "--subject", subject.as_str()])
                    .timeout(Duration::from_secs(10))
                    .assert()
                    .success();
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let store = temp_dir.path().join("data").join("sessions.jsonl");
    let content = std::fs::read_to_string(store).expect("Failed to read store");

    let mut valid_count = 0;
    for line in content.lines() {
        if line.is_empty() {
            continue;
        }
        let parsed: serde_json::Value =
            serde_json::from_str(line).expect("store contains invalid JSON line");
        assert!(parsed["end_time"].is_string(), "session left open: {}", line);
        valid_count += 1;
    }

    assert_eq!(valid_count, 10, "Expected 10 completed sessions");
}
