//! archstep library
//!
//! A resumable, step-by-step Arch Linux installer: nine fixed steps run in
//! order, progress is saved after each one, every external command goes
//! through a dry-run aware runner with retry, and each step can verify its
//! own results.

pub mod cli;
pub mod command;
pub mod config;
pub mod context;
pub mod dry_run;
pub mod error;
pub mod hardware;
pub mod install_state;
pub mod layout;
pub mod orchestrator;
pub mod process_guard;
pub mod progress;
pub mod resolver;
pub mod retry;
pub mod sanity;
pub mod steps;
pub mod target_fs;
pub mod types;
pub mod ui;
pub mod verify;

// Re-export main types for convenience
pub use command::{CommandOutput, CommandRunner, CommandSpec, ProcessSpawner, SystemSpawner};
pub use config::{ConfigValue, UserConfig};
pub use context::InstallContext;
pub use dry_run::{DryRunOutputs, Operation, SimulatedSystem};
pub use error::{InstallError, Result};
pub use install_state::{InstallStep, InstallTransitionError, STEP_COUNT, StepCursor};
pub use orchestrator::{Orchestrator, StartPlan, Step};
pub use process_guard::{ChildRegistry, CommandProcessGroup};
pub use progress::{ProgressStore, ResumePoint};
pub use retry::{RetryPolicy, with_retry};
pub use ui::{Answer, Prompter, ScriptedPrompter, TerminalPrompter};
pub use verify::Verifier;
