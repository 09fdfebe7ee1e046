//! Shared state handed to every step

use crate::command::{CommandOutput, CommandRunner, CommandSpec};
use crate::config::UserConfig;
use crate::error::Result;
use crate::layout::DiskLayout;
use crate::target_fs::TargetFs;
use crate::ui::Prompter;
use crate::verify::Verifier;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Mount point of the target system on the live ISO
pub const TARGET_ROOT: &str = "/mnt";

type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

/// Everything a step may read or change
pub struct InstallContext {
    pub config: UserConfig,
    pub dry_run: bool,
    pub no_verify: bool,
    pub runner: CommandRunner,
    pub prompter: Box<dyn Prompter>,
    /// The system being installed (`/mnt`)
    pub target: TargetFs,
    /// The running live environment (`/`)
    pub live: TargetFs,
    sleep: Sleeper,
}

impl InstallContext {
    pub fn new(config: UserConfig, dry_run: bool, prompter: Box<dyn Prompter>) -> Self {
        Self {
            config,
            dry_run,
            no_verify: false,
            runner: CommandRunner::new(dry_run),
            prompter,
            target: TargetFs::new(TARGET_ROOT, dry_run),
            live: TargetFs::new("/", dry_run),
            sleep: Arc::new(std::thread::sleep),
        }
    }

    pub fn with_no_verify(mut self, no_verify: bool) -> Self {
        self.no_verify = no_verify;
        self
    }

    pub fn with_runner(mut self, runner: CommandRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_target_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.target = TargetFs::new(root, self.dry_run);
        self
    }

    pub fn with_live_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.live = TargetFs::new(root, self.dry_run);
        self
    }

    /// Replace the delay used between verification and device polling attempts
    pub fn with_sleep(mut self, sleep: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleep = Arc::new(sleep);
        self
    }

    /// Run a command with the current config
    pub fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.runner.run(spec, &self.config)
    }

    pub fn verifier(&self) -> Verifier<'_> {
        Verifier::new(self.dry_run, self.prompter.as_ref(), &*self.sleep)
    }

    pub fn layout(&self) -> Result<DiskLayout> {
        DiskLayout::from_config(&self.config)
    }

    /// Target root as a command argument (`/mnt`)
    pub fn target_root(&self) -> String {
        self.target.root_arg()
    }

    /// Target-side path as a command argument (`/mnt/boot`)
    pub fn target_path(&self, path: &str) -> String {
        self.target.path(path).to_string_lossy().into_owned()
    }

    pub fn sleep(&self, duration: Duration) {
        (self.sleep)(duration);
    }
}
