//! External command execution
//!
//! Every process the installer starts goes through [`CommandRunner::run`]:
//!
//! - dry-run substitution for destructive commands
//! - linear retry on nonzero exit
//! - a spinner for uncaptured commands on a TTY
//! - process group isolation and registration for signal cleanup
//!
//! Spawning itself is behind [`ProcessSpawner`] so tests can count and fake
//! child processes.

use crate::config::UserConfig;
use crate::dry_run::{DryRunOutputs, Operation, SimulatedSystem, placeholder_output};
use crate::error::{InstallError, Result};
use crate::process_guard::{ChildRegistry, CommandProcessGroup};
use crate::retry::{RetryPolicy, with_retry};
use crate::ui;
use std::io::{ErrorKind, IsTerminal};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// What to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Program {
    /// Program and arguments, no shell involved
    Argv(Vec<String>),
    /// A `/bin/sh -c` command line
    Shell(String),
}

/// One external process invocation.
///
/// Defaults: destructive, checked, uncaptured, one attempt with a 3 s delay,
/// spinner on.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: Program,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Touches or depends on target-system state; simulated in dry runs
    pub destructive: bool,
    /// Collect stdout instead of passing it through to the terminal
    pub capture: bool,
    /// Nonzero exit is an error (and retried)
    pub check: bool,
    pub retry: RetryPolicy,
    pub show_spinner: bool,
    pub spinner_message: Option<String>,
    /// Selects the simulated output in dry runs
    pub operation: Option<Operation>,
}

impl CommandSpec {
    /// `program` with `args`
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = vec![program.to_string()];
        argv.extend(args.into_iter().map(Into::into));
        Self::from_program(Program::Argv(argv))
    }

    /// A shell command line
    pub fn shell(line: impl Into<String>) -> Self {
        Self::from_program(Program::Shell(line.into()))
    }

    fn from_program(program: Program) -> Self {
        Self {
            program,
            cwd: None,
            env: Vec::new(),
            destructive: true,
            capture: false,
            check: true,
            retry: RetryPolicy::once(),
            show_spinner: true,
            spinner_message: None,
            operation: None,
        }
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Read-only command against the live system; runs even in dry runs
    pub fn read_only(mut self) -> Self {
        self.destructive = false;
        self
    }

    pub fn capture(mut self) -> Self {
        self.capture = true;
        self
    }

    /// Nonzero exit is returned as a normal result
    pub fn unchecked(mut self) -> Self {
        self.check = false;
        self
    }

    pub fn retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry = RetryPolicy::new(attempts, delay);
        self
    }

    pub fn spinner(mut self, message: impl Into<String>) -> Self {
        self.spinner_message = Some(message.into());
        self
    }

    pub fn no_spinner(mut self) -> Self {
        self.show_spinner = false;
        self
    }

    pub fn operation(mut self, op: Operation) -> Self {
        self.operation = Some(op);
        self
    }

    /// Captured, unchecked query of target state, answered by `op` in dry runs
    pub fn probe(self, op: Operation) -> Self {
        self.capture().unchecked().operation(op)
    }

    /// Command line as shown to the user
    pub fn display(&self) -> String {
        match &self.program {
            Program::Argv(argv) => argv
                .iter()
                .map(|arg| quote_arg(arg))
                .collect::<Vec<_>>()
                .join(" "),
            Program::Shell(line) => line.clone(),
        }
    }

    /// First word of the command, for "not found" reporting
    pub fn program_name(&self) -> String {
        match &self.program {
            Program::Argv(argv) => argv.first().cloned().unwrap_or_default(),
            Program::Shell(line) => line.split_whitespace().next().unwrap_or_default().to_string(),
        }
    }
}

fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        "''".to_string()
    } else if arg.contains(|c: char| c.is_whitespace() || "'\"$;&|<>".contains(c)) {
        format!("'{}'", arg.replace('\'', r"'\''"))
    } else {
        arg.to_string()
    }
}

/// Result of a command that ran (or was simulated)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Empty unless the command was captured
    pub stdout: String,
    pub stderr: String,
    /// `None` if terminated by a signal
    pub exit_code: Option<i32>,
    pub success: bool,
    /// Produced by a dry run; nothing was executed
    pub simulated: bool,
}

impl CommandOutput {
    pub fn simulated(stdout: String) -> Self {
        Self {
            stdout,
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
            simulated: true,
        }
    }

    /// Trimmed stdout
    pub fn text(&self) -> &str {
        self.stdout.trim()
    }

    /// Trimmed stderr of a failed run, if it wrote any
    pub fn failure_stderr(&self) -> Option<&str> {
        let stderr = self.stderr.trim();
        (!self.success && !stderr.is_empty()).then_some(stderr)
    }
}

/// Starts a process and waits for it
pub trait ProcessSpawner: Send + Sync {
    /// Run `spec` to completion. A missing program must surface as
    /// `ErrorKind::NotFound`.
    fn spawn(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput>;
}

/// Real processes, each leading its own process group
#[derive(Debug, Default)]
pub struct SystemSpawner;

impl ProcessSpawner for SystemSpawner {
    fn spawn(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput> {
        let mut cmd = match &spec.program {
            Program::Argv(argv) => {
                let (program, args) = argv
                    .split_first()
                    .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "empty command"))?;
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
            Program::Shell(line) => {
                let mut cmd = Command::new("/bin/sh");
                cmd.arg("-c").arg(line);
                cmd
            }
        };

        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        cmd.envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(if spec.capture { Stdio::piped() } else { Stdio::inherit() })
            .stderr(Stdio::piped())
            .in_new_process_group();

        let child = cmd.spawn()?;
        let pid = child.id();
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.register(pid);
        }

        let waited = child.wait_with_output();

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.unregister(pid);
        }

        let output = waited?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            success: output.status.success(),
            simulated: false,
        })
    }
}

type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

/// Executes [`CommandSpec`]s with dry-run, retry and spinner handling
#[derive(Clone)]
pub struct CommandRunner {
    dry_run: bool,
    spawner: Arc<dyn ProcessSpawner>,
    outputs: Arc<dyn DryRunOutputs>,
    sleep: Sleeper,
}

impl std::fmt::Debug for CommandRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRunner")
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl CommandRunner {
    /// Real processes, simulated system for dry runs, real sleeps
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            spawner: Arc::new(SystemSpawner),
            outputs: Arc::new(SimulatedSystem),
            sleep: Arc::new(std::thread::sleep),
        }
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn ProcessSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn with_outputs(mut self, outputs: Arc<dyn DryRunOutputs>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_sleep(mut self, sleep: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleep = Arc::new(sleep);
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Run `spec`. `config` feeds dry-run simulation.
    ///
    /// # Errors
    ///
    /// - [`InstallError::CommandNotFound`] if the program does not exist (never retried)
    /// - [`InstallError::CommandFailed`] on nonzero exit with `check` on, after all attempts
    pub fn run(&self, spec: &CommandSpec, config: &UserConfig) -> Result<CommandOutput> {
        let command = spec.display();

        if self.dry_run && spec.destructive {
            ui::dry_run_command(&command);
            let stdout = if spec.capture {
                spec.operation
                    .as_ref()
                    .and_then(|op| self.outputs.output_for(op, config))
                    .unwrap_or_else(|| placeholder_output(&command))
            } else {
                String::new()
            };
            return Ok(CommandOutput::simulated(stdout));
        }

        if spec.capture {
            debug!("running: {}", command);
        } else {
            ui::command_info(&command);
        }

        let max = spec.retry.max_attempts();
        with_retry(
            spec.retry,
            &*self.sleep,
            |attempt| {
                let result = self.attempt(spec, &command, attempt);
                if result.is_err() && attempt < max {
                    ui::warn(&format!("Command failed (attempt {}/{}): {}", attempt, max, command));
                    ui::info(&format!("Retrying in {:?}...", spec.retry.delay));
                }
                result
            },
            |e| !matches!(e, InstallError::CommandNotFound { .. }),
        )
    }

    fn attempt(&self, spec: &CommandSpec, command: &str, attempt: u32) -> Result<CommandOutput> {
        let spinner = (spec.show_spinner && !spec.capture && std::io::stderr().is_terminal())
            .then(|| ui::create_spinner(spinner_text(spec, command)));

        let result = self.spawner.spawn(spec);

        if let Some(pb) = spinner {
            pb.finish_and_clear();
        }

        let output = result.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                InstallError::CommandNotFound {
                    program: spec.program_name(),
                }
            } else {
                InstallError::Io(e)
            }
        })?;

        if let Some(stderr) = output.failure_stderr() {
            ui::warn(&format!(
                "{} exited with {}:\n{}",
                command,
                output.exit_code.map_or("a signal".to_string(), |c| format!("code {}", c)),
                stderr
            ));
        }

        if spec.check && !output.success {
            info!(
                "command exited with {:?} on attempt {}: {}",
                output.exit_code, attempt, command
            );
            return Err(InstallError::CommandFailed {
                command: command.to_string(),
                code: output.exit_code,
                attempts: attempt,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }
}

fn spinner_text(spec: &CommandSpec, command: &str) -> String {
    if let Some(msg) = &spec.spinner_message {
        return msg.clone();
    }
    match command.char_indices().nth(70) {
        Some((cut, _)) => format!("Running '{}...'", &command[..cut]),
        None => format!("Running '{}'", command),
    }
}
