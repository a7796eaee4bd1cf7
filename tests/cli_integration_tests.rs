/// Integration tests for the CLI interface
use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use std::io::Write;
use std::process::Command as StdCommand;
use tempfile::NamedTempFile;

/// Helper function to create a command for testing
fn cardnum_cmd() -> Command {
    Command::cargo_bin("pcsc-cardnum").expect("Failed to find pcsc-cardnum binary")
}

#[test]
fn test_help_command() {
    let mut cmd = cardnum_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("card numbers"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("read"))
        .stdout(predicate::str::contains("watch"));
}

#[test]
fn test_version_command() {
    let mut cmd = cardnum_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pcsc-cardnum"));
}

#[test]
fn test_status_command() {
    let mut cmd = cardnum_cmd();
    cmd.arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("PC/SC service"));
}

#[test]
fn test_list_command_basic() {
    let mut cmd = cardnum_cmd();
    cmd.arg("list").assert().success().stdout(
        predicate::str::contains("readers")
            .or(predicate::str::contains("No PCSC readers found"))
            .or(predicate::str::contains("PC/SC not supported")),
    );
}

#[test]
fn test_list_command_detailed() {
    let mut cmd = cardnum_cmd();
    cmd.arg("list").arg("--detailed").assert().success();
}

#[test]
fn test_invalid_command() {
    let mut cmd = cardnum_cmd();
    cmd.arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_read_invalid_reader() {
    let mut cmd = cardnum_cmd();
    cmd.arg("read")
        .arg("999") // Invalid reader index
        .assert()
        .failure();
}

#[test]
fn test_watch_zero_interval() {
    let mut cmd = cardnum_cmd();
    cmd.arg("watch")
        .arg("--interval")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("poll_interval_ms"));
}

#[test]
fn test_watch_zero_count() {
    let mut cmd = cardnum_cmd();
    cmd.arg("watch")
        .arg("--count")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--count must be at least 1"));
}

#[test]
fn test_watch_invalid_count() {
    let mut cmd = cardnum_cmd();
    cmd.arg("watch")
        .arg("--count")
        .arg("many")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid"));
}

#[test]
fn test_config_nonexistent_file() {
    let mut cmd = cardnum_cmd();
    cmd.arg("--config")
        .arg("nonexistent-config.json")
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn test_config_malformed_file() {
    let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
    writeln!(temp_file, "{{ not json").expect("Failed to write to temp file");

    let mut cmd = cardnum_cmd();
    cmd.arg("--config")
        .arg(temp_file.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config file"));
}

#[test]
fn test_config_rejects_zero_attempts() {
    let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
    writeln!(temp_file, r#"{{"connect_attempts": 0}}"#).expect("Failed to write to temp file");

    let mut cmd = cardnum_cmd();
    cmd.arg("--config")
        .arg(temp_file.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("connect_attempts"));
}

#[test]
fn test_config_partial_file() {
    let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
    writeln!(temp_file, r#"{{"poll_interval_ms": 250}}"#).expect("Failed to write to temp file");

    let mut cmd = cardnum_cmd();
    cmd.arg("--config")
        .arg(temp_file.path())
        .arg("status")
        .assert()
        .success();
}

#[test]
fn test_verbose_flag() {
    let mut cmd = cardnum_cmd();
    cmd.arg("--verbose").arg("list").assert().success();
}

#[test]
fn test_debug_flag() {
    let mut cmd = cardnum_cmd();
    cmd.arg("--debug").arg("list").assert().success();
}

// Helper function for checking if PCSC is available
fn is_pcsc_available() -> bool {
    StdCommand::new("pcscd").arg("--version").output().is_ok()
}

/// Test that requires actual PCSC readers (conditional)
#[test]
#[serial]
fn test_with_real_readers() {
    if !is_pcsc_available() {
        println!("Skipping PCSC integration test - no PCSC daemon available");
        return;
    }

    let mut cmd = cardnum_cmd();
    let output = cmd.arg("list").arg("--detailed").assert().success();

    // If we have a reader with a card, try a single read
    let stdout = String::from_utf8_lossy(&output.get_output().stdout);
    if stdout.contains("[0]") && stdout.contains("Card present") {
        let mut read_cmd = cardnum_cmd();
        read_cmd
            .arg("read")
            .arg("0")
            .timeout(std::time::Duration::from_secs(10))
            .assert()
            .code(predicate::in_iter([0, 1])); // Allow success or failure
    }
}

#[test]
#[ignore] // Requires a real reader and a card presented within the timeout
fn test_watch_single_card() {
    let history = NamedTempFile::new().expect("Failed to create temp file");

    let mut cmd = cardnum_cmd();
    cmd.arg("watch")
        .arg("--count")
        .arg("1")
        .arg("--history")
        .arg(history.path())
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success()
        .stdout(predicate::str::is_match("^[0-9A-F]+\n$").unwrap());
}

#[cfg(test)]
mod performance_tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_help_performance() {
        let start = Instant::now();
        let mut cmd = cardnum_cmd();
        cmd.arg("--help").assert().success();
        let duration = start.elapsed();

        // Help should be fast (less than 1 second)
        assert!(
            duration.as_secs() < 1,
            "Help command took too long: {duration:?}"
        );
    }

    #[test]
    fn test_status_performance() {
        let start = Instant::now();
        let mut cmd = cardnum_cmd();
        cmd.arg("status").assert().success();
        let duration = start.elapsed();

        // Status should complete within reasonable time (less than 5 seconds)
        assert!(
            duration.as_secs() < 5,
            "Status command took too long: {duration:?}"
        );
    }
}
