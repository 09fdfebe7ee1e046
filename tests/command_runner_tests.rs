//! Tests for the command runner
//!
//! These tests verify:
//! - Dry-run never spawns destructive commands
//! - Simulated output is chosen by operation
//! - Linear retry spawns exactly the expected number of times
//! - Missing programs are reported distinctly and never retried

use archstep::command::{CommandOutput, CommandRunner, CommandSpec, ProcessSpawner};
use archstep::config::{UserConfig, keys};
use archstep::dry_run::{Operation, SIMULATED_ROOT_UUID};
use archstep::error::InstallError;
use std::collections::VecDeque;
use std::io::{Error, ErrorKind};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// Spy spawner
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Exit(i32),
    Missing,
}

/// Plays back scripted outcomes and counts spawns; succeeds once the script runs out
#[derive(Default)]
struct SpySpawner {
    outcomes: Mutex<VecDeque<Outcome>>,
    spawns: AtomicU32,
}

impl SpySpawner {
    fn scripted(outcomes: impl IntoIterator<Item = Outcome>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            spawns: AtomicU32::new(0),
        })
    }

    fn failing_then_ok(failures: u32) -> Arc<Self> {
        Self::scripted((0..failures).map(|_| Outcome::Exit(1)))
    }

    fn spawns(&self) -> u32 {
        self.spawns.load(Ordering::SeqCst)
    }
}

impl ProcessSpawner for SpySpawner {
    fn spawn(&self, _spec: &CommandSpec) -> std::io::Result<CommandOutput> {
        self.spawns.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Exit(0));
        match outcome {
            Outcome::Missing => Err(Error::new(ErrorKind::NotFound, "No such file or directory")),
            Outcome::Exit(code) => Ok(CommandOutput {
                stdout: "real output\n".into(),
                stderr: if code == 0 { String::new() } else { "boom".into() },
                exit_code: Some(code),
                success: code == 0,
                simulated: false,
            }),
        }
    }
}

fn runner(dry_run: bool, spy: &Arc<SpySpawner>) -> CommandRunner {
    CommandRunner::new(dry_run)
        .with_spawner(spy.clone())
        .with_sleep(|_| {})
}

fn config() -> UserConfig {
    let mut config = UserConfig::default();
    config.set(keys::TARGET_DRIVE, "/dev/sda");
    config
}

// =============================================================================
// Dry run
// =============================================================================

#[test]
fn test_dry_run_destructive_commands_spawn_nothing() {
    let spy = SpySpawner::failing_then_ok(5);
    let runner = runner(true, &spy);

    for spec in [
        CommandSpec::new("wipefs", ["-af", "/dev/sda"]),
        CommandSpec::new("sgdisk", ["-Zo", "/dev/sda"]).retry(3, Duration::from_secs(1)),
        CommandSpec::new("pacstrap", ["-K", "/mnt", "base"]),
        CommandSpec::shell("curl -fsSL https://example.invalid | pacman-key --add -"),
    ] {
        let out = runner.run(&spec, &config()).unwrap();
        assert!(out.success);
        assert!(out.simulated);
    }
    assert_eq!(spy.spawns(), 0);
}

#[test]
fn test_dry_run_probe_output_follows_operation() {
    let spy = SpySpawner::failing_then_ok(0);
    let runner = runner(true, &spy);

    let out = runner
        .run(
            &CommandSpec::new("findmnt", ["-no", "UUID", "/mnt"]).probe(Operation::RootUuid),
            &config(),
        )
        .unwrap();
    assert_eq!(out.text(), SIMULATED_ROOT_UUID);

    let fstab = runner
        .run(
            &CommandSpec::new("genfstab", ["-U", "/mnt"])
                .capture()
                .operation(Operation::GenerateFstab),
            &config(),
        )
        .unwrap();
    assert!(fstab.stdout.contains(&format!("UUID={}", SIMULATED_ROOT_UUID)));
    assert_eq!(spy.spawns(), 0);
}

#[test]
fn test_dry_run_capture_without_operation_uses_placeholder() {
    let spy = SpySpawner::failing_then_ok(0);
    let out = runner(true, &spy)
        .run(&CommandSpec::new("blkid", ["/dev/sda2"]).capture(), &config())
        .unwrap();
    assert_eq!(out.stdout, "[DRY RUN SIMULATED OUTPUT FOR: blkid /dev/sda2]");
}

#[test]
fn test_dry_run_still_runs_read_only_commands() {
    let spy = SpySpawner::failing_then_ok(0);
    let out = runner(true, &spy)
        .run(
            &CommandSpec::new("lsblk", ["-dnpo", "NAME,SIZE,MODEL"])
                .read_only()
                .capture(),
            &config(),
        )
        .unwrap();
    assert!(!out.simulated);
    assert_eq!(out.stdout, "real output\n");
    assert_eq!(spy.spawns(), 1);
}

// =============================================================================
// Retry
// =============================================================================

#[test]
fn test_retry_succeeds_with_one_more_attempt_than_failures() {
    for k in 1..=4 {
        let spy = SpySpawner::failing_then_ok(k);
        let sleeps = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&sleeps);
        let runner = CommandRunner::new(false)
            .with_spawner(spy.clone())
            .with_sleep(move |d| recorded.lock().unwrap().push(d));

        let spec = CommandSpec::new("pacman", ["-Sy"]).retry(k + 1, Duration::from_secs(5));
        let out = runner.run(&spec, &config()).unwrap();

        assert!(out.success);
        assert_eq!(spy.spawns(), k + 1);
        assert_eq!(*sleeps.lock().unwrap(), vec![Duration::from_secs(5); k as usize]);
    }
}

#[test]
fn test_retry_fails_when_attempts_equal_failures() {
    for k in 1..=4 {
        let spy = SpySpawner::failing_then_ok(k);
        let runner = runner(false, &spy);

        let spec = CommandSpec::new("pacstrap", ["-K", "/mnt", "base"]).retry(k, Duration::from_secs(10));
        let err = runner.run(&spec, &config()).unwrap_err();

        assert_eq!(spy.spawns(), k);
        match err {
            InstallError::CommandFailed {
                command,
                code,
                attempts,
                stderr,
                ..
            } => {
                assert_eq!(command, "pacstrap -K /mnt base");
                assert_eq!(code, Some(1));
                assert_eq!(attempts, k);
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected CommandFailed, got {:?}", other),
        }
    }
}

#[test]
fn test_missing_program_is_not_retried() {
    let spy = SpySpawner::scripted([Outcome::Missing, Outcome::Exit(0)]);
    let err = runner(false, &spy)
        .run(
            &CommandSpec::new("sgdisk", ["-Zo", "/dev/sda"]).retry(3, Duration::from_secs(1)),
            &config(),
        )
        .unwrap_err();
    assert!(matches!(err, InstallError::CommandNotFound { ref program } if program == "sgdisk"));
    assert_eq!(spy.spawns(), 1);
}

#[test]
fn test_unchecked_failure_is_returned_without_retry() {
    let spy = SpySpawner::failing_then_ok(3);
    let out = runner(false, &spy)
        .run(
            &CommandSpec::new("vgchange", ["-an", "vg_arch"])
                .unchecked()
                .retry(3, Duration::from_secs(1)),
            &config(),
        )
        .unwrap();
    assert!(!out.success);
    assert_eq!(out.exit_code, Some(1));
    assert_eq!(spy.spawns(), 1);
}

#[test]
fn test_unchecked_failure_keeps_stderr_for_reporting() {
    let spy = SpySpawner::scripted([Outcome::Exit(32)]);
    let out = runner(false, &spy)
        .run(
            &CommandSpec::new("umount", ["-R", "/mnt"]).unchecked(),
            &config(),
        )
        .unwrap();
    assert!(!out.success);
    assert_eq!(out.exit_code, Some(32));
    assert_eq!(out.failure_stderr(), Some("boom"));
    assert_eq!(spy.spawns(), 1);
}
