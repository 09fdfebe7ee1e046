//! Tests for step orchestration
//!
//! These tests verify:
//! - Steps run in order and progress is saved after each one
//! - A failing step leaves the progress file pointing at it
//! - Resume and forced start-index planning
//! - `--no-verify` skips verification
//! - A complete dry run of the real steps spawns no destructive commands

use archstep::command::{CommandOutput, CommandRunner, CommandSpec, ProcessSpawner, Program};
use archstep::config::{UserConfig, keys};
use archstep::context::InstallContext;
use archstep::install_state::{InstallStep, STEP_COUNT};
use archstep::orchestrator::{Orchestrator, Step};
use archstep::progress::ProgressStore;
use archstep::ui::{Answer, ScriptedPrompter};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// =============================================================================
// Helpers
// =============================================================================

type Log = Arc<Mutex<Vec<(usize, Option<usize>)>>>;

/// Records its index and the saved step it saw on entry
struct RecordingStep {
    id: InstallStep,
    progress_file: PathBuf,
    log: Log,
    fail_run: bool,
    fail_verify: bool,
}

impl Step for RecordingStep {
    fn id(&self) -> InstallStep {
        self.id
    }

    fn run(&self, ctx: &mut InstallContext) -> anyhow::Result<()> {
        let saved = ProgressStore::new(&self.progress_file, false)
            .load()?
            .map(|p| p.current_step);
        self.log.lock().unwrap().push((self.id.index(), saved));
        ctx.config.set(keys::TARGET_DRIVE, "/dev/vda");
        if self.fail_run {
            anyhow::bail!("step {} failed on purpose", self.id);
        }
        Ok(())
    }

    fn verify(&self, _ctx: &InstallContext) -> anyhow::Result<()> {
        if self.fail_verify {
            anyhow::bail!("verification of {} failed on purpose", self.id);
        }
        Ok(())
    }
}

fn recording_steps(
    path: &PathBuf,
    log: &Log,
    fail_run: Option<InstallStep>,
    fail_verify: Option<InstallStep>,
) -> Vec<Box<dyn Step>> {
    InstallStep::all_steps()
        .iter()
        .map(|&id| {
            Box::new(RecordingStep {
                id,
                progress_file: path.clone(),
                log: Arc::clone(log),
                fail_run: fail_run == Some(id),
                fail_verify: fail_verify == Some(id),
            }) as Box<dyn Step>
        })
        .collect()
}

fn context() -> InstallContext {
    InstallContext::new(UserConfig::default(), true, Box::new(ScriptedPrompter::default()))
        .with_sleep(|_| {})
}

fn config_with_drive() -> UserConfig {
    let mut config = UserConfig::default();
    config.set(keys::TARGET_DRIVE, "/dev/sda");
    config
}

// =============================================================================
// Ordering and persistence
// =============================================================================

#[test]
fn test_full_run_persists_every_index_then_removes_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");
    let log: Log = Arc::default();
    let orchestrator = Orchestrator::with_steps(
        recording_steps(&path, &log, None, None),
        ProgressStore::new(&path, false),
    )
    .unwrap();

    let mut ctx = context();
    orchestrator.run_all(InstallStep::GatherConfig, &mut ctx).unwrap();

    let expected: Vec<(usize, Option<usize>)> = (0..STEP_COUNT)
        .map(|i| (i, if i == 0 { None } else { Some(i) }))
        .collect();
    assert_eq!(*log.lock().unwrap(), expected);
    assert!(!path.exists(), "progress file should be removed after the last step");
}

#[test]
fn test_failed_step_keeps_progress_at_that_step() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");
    let log: Log = Arc::default();
    let orchestrator = Orchestrator::with_steps(
        recording_steps(&path, &log, Some(InstallStep::MountFilesystems), None),
        ProgressStore::new(&path, false),
    )
    .unwrap();

    let mut ctx = context();
    let err = orchestrator
        .run_all(InstallStep::GatherConfig, &mut ctx)
        .unwrap_err();
    assert!(format!("{:#}", err).contains("failed on purpose"));

    let ran: Vec<usize> = log.lock().unwrap().iter().map(|(i, _)| *i).collect();
    assert_eq!(ran, vec![0, 1, 2, 3]);

    let saved = ProgressStore::new(&path, false).load().unwrap().unwrap();
    assert_eq!(saved.current_step, InstallStep::MountFilesystems.index());
    assert_eq!(saved.user_config.target_drive(), "/dev/vda");
}

#[test]
fn test_resume_runs_only_remaining_steps() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");
    let store = ProgressStore::new(&path, false);
    store.save(5, &config_with_drive()).unwrap();

    let log: Log = Arc::default();
    let orchestrator =
        Orchestrator::with_steps(recording_steps(&path, &log, None, None), store).unwrap();

    let plan = orchestrator.plan_start(None).unwrap();
    assert!(plan.resumed);
    assert_eq!(plan.step, InstallStep::GenerateFstab);
    assert_eq!(plan.config.target_drive(), "/dev/sda");

    let mut ctx = context();
    ctx.config = plan.config;
    orchestrator.run_all(plan.step, &mut ctx).unwrap();

    let ran: Vec<usize> = log.lock().unwrap().iter().map(|(i, _)| *i).collect();
    assert_eq!(ran, vec![5, 6, 7, 8]);
    assert!(!path.exists());
}

// =============================================================================
// Start planning
// =============================================================================

#[test]
fn test_forced_zero_resets_config_to_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");
    let store = ProgressStore::new(&path, false);
    let mut saved = config_with_drive();
    saved.set(keys::HOSTNAME, "oldbox");
    store.save(4, &saved).unwrap();

    let orchestrator = Orchestrator::new(store);
    let plan = orchestrator.plan_start(Some(0)).unwrap();
    assert_eq!(plan.step, InstallStep::GatherConfig);
    assert_eq!(plan.config, UserConfig::default());
    assert!(!plan.resumed);
}

#[test]
fn test_forced_index_keeps_saved_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");
    let store = ProgressStore::new(&path, false);
    store.save(2, &config_with_drive()).unwrap();

    let plan = Orchestrator::new(store).plan_start(Some(6)).unwrap();
    assert_eq!(plan.step, InstallStep::PreChrootFiles);
    assert_eq!(plan.config.target_drive(), "/dev/sda");
}

#[test]
fn test_forced_index_without_drive_starts_over() {
    let dir = TempDir::new().unwrap();
    let store = ProgressStore::new(dir.path().join("missing.json"), false);
    let plan = Orchestrator::new(store).plan_start(Some(4)).unwrap();
    assert_eq!(plan.step, InstallStep::GatherConfig);
    assert_eq!(plan.config, UserConfig::default());
}

#[test]
fn test_forced_index_out_of_range_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = ProgressStore::new(dir.path().join("p.json"), false);
    assert!(Orchestrator::new(store).plan_start(Some(STEP_COUNT)).is_err());
}

#[test]
fn test_with_steps_rejects_wrong_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("p.json");
    let log: Log = Arc::default();
    let mut steps = recording_steps(&path, &log, None, None);
    steps.swap(1, 2);
    assert!(Orchestrator::with_steps(steps, ProgressStore::new(&path, false)).is_err());

    let mut short = recording_steps(&path, &log, None, None);
    short.pop();
    assert!(Orchestrator::with_steps(short, ProgressStore::new(&path, false)).is_err());
}

// =============================================================================
// Verification
// =============================================================================

#[test]
fn test_failed_verification_stops_the_run() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");
    let log: Log = Arc::default();
    let orchestrator = Orchestrator::with_steps(
        recording_steps(&path, &log, None, Some(InstallStep::PacstrapSystem)),
        ProgressStore::new(&path, false),
    )
    .unwrap();

    let mut ctx = context();
    assert!(orchestrator.run_all(InstallStep::GatherConfig, &mut ctx).is_err());
    let saved = ProgressStore::new(&path, false).load().unwrap().unwrap();
    assert_eq!(saved.current_step, InstallStep::PacstrapSystem.index());
}

#[test]
fn test_no_verify_skips_verification() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");
    let log: Log = Arc::default();
    let orchestrator = Orchestrator::with_steps(
        recording_steps(&path, &log, None, Some(InstallStep::PacstrapSystem)),
        ProgressStore::new(&path, false),
    )
    .unwrap();

    let mut ctx = context().with_no_verify(true);
    orchestrator.run_all(InstallStep::GatherConfig, &mut ctx).unwrap();
    assert_eq!(log.lock().unwrap().len(), STEP_COUNT);
}

// =============================================================================
// Full dry run of the real steps
// =============================================================================

/// Records every program it is asked to start; always succeeds
#[derive(Default)]
struct SpySpawner {
    spawned: Mutex<Vec<String>>,
}

impl ProcessSpawner for SpySpawner {
    fn spawn(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput> {
        let name = match &spec.program {
            Program::Argv(argv) => argv.first().cloned().unwrap_or_default(),
            Program::Shell(line) => line.clone(),
        };
        self.spawned.lock().unwrap().push(name);
        Ok(CommandOutput {
            success: true,
            exit_code: Some(0),
            ..CommandOutput::default()
        })
    }
}

#[test]
fn test_dry_run_of_real_steps_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("target");
    let live = dir.path().join("live");
    let progress = dir.path().join("progress.json");

    let spy = Arc::new(SpySpawner::default());
    let runner = CommandRunner::new(true)
        .with_spawner(spy.clone())
        .with_sleep(|_| {});
    let prompter = ScriptedPrompter::new([
        Answer::Choice(0),
        Answer::Text("forge".into()),
        Answer::Text("ada".into()),
        Answer::Text("Europe/Berlin".into()),
        Answer::Choice(0),
        Answer::Text("2".into()),
        Answer::Yes,
    ]);

    let mut ctx = InstallContext::new(UserConfig::default(), true, Box::new(prompter))
        .with_runner(runner)
        .with_target_root(&target)
        .with_live_root(&live)
        .with_sleep(|_| {});

    let orchestrator = Orchestrator::new(ProgressStore::new(&progress, true));
    orchestrator.run_all(InstallStep::GatherConfig, &mut ctx).unwrap();

    assert_eq!(ctx.config.text(keys::HOSTNAME), "forge");
    assert_eq!(ctx.config.text(keys::USERNAME), "ada");
    assert_eq!(ctx.config.target_drive(), "/dev/sdX");

    // Only the read-only disk listing may run during a dry run
    let spawned = spy.spawned.lock().unwrap().clone();
    assert_eq!(spawned, vec!["lsblk".to_string()]);

    assert!(!target.exists());
    assert!(!live.exists());
    assert!(!progress.exists());
}

#[test]
fn test_declining_the_plan_stops_before_any_change() {
    let dir = TempDir::new().unwrap();
    let progress = dir.path().join("progress.json");
    let spy = Arc::new(SpySpawner::default());
    let runner = CommandRunner::new(true).with_spawner(spy.clone());
    let prompter = ScriptedPrompter::new([
        Answer::Choice(0),
        Answer::Text("forge".into()),
        Answer::Text("ada".into()),
        Answer::Text("Europe/Berlin".into()),
        Answer::Choice(0),
        Answer::Text("2".into()),
        Answer::No,
    ]);

    let mut ctx = InstallContext::new(UserConfig::default(), true, Box::new(prompter))
        .with_runner(runner)
        .with_target_root(dir.path().join("target"));

    let orchestrator = Orchestrator::new(ProgressStore::new(&progress, false));
    let err = orchestrator
        .run_all(InstallStep::GatherConfig, &mut ctx)
        .unwrap_err();

    let cause = archstep::error::InstallError::find_in(&err).unwrap();
    assert!(matches!(cause, archstep::error::InstallError::Declined { .. }));
    assert_eq!(cause.exit_code(), 0);
    assert!(!progress.exists());
    assert_eq!(ctx.config.text(keys::HOSTNAME), "forge");
}
