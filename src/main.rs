//! archstep - main entry point

use archstep::cli::Cli;
use archstep::context::{InstallContext, TARGET_ROOT};
use archstep::error::InstallError;
use archstep::install_state::InstallStep;
use archstep::orchestrator::{Orchestrator, print_duration};
use archstep::progress::ProgressStore;
use archstep::ui::{self, Prompter, TerminalPrompter};
use archstep::{process_guard, sanity};
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const DRY_RUN_FALLBACK_PROMPT: &str = "Run in DRY RUN mode instead?";
const START_PROMPT: &str = "Ready to begin the configuration process?";

/// Initialize tracing; `RUST_LOG` overrides the `-v` level
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(cli.log_level());
    info!("archstep starting up");

    // Children run in their own process groups, so Ctrl+C must be forwarded
    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }
    debug!("Signal handlers initialized");

    if cli.list_steps {
        for step in InstallStep::all_steps() {
            println!("{}:{}", step.index(), step.name());
        }
        return ExitCode::SUCCESS;
    }

    let started = Instant::now();
    let mut session = Session {
        dry_run: cli.dry_run,
        installing: false,
    };
    let code = match run(&cli, &mut session) {
        Ok(()) => 0,
        Err(e) => report_error(&e, &session, &cli),
    };
    print_duration(started);
    ExitCode::from(code)
}

/// How far a run got, for error reporting
#[derive(Debug, Clone, Copy)]
struct Session {
    dry_run: bool,
    /// Steps have started running
    installing: bool,
}

fn run(cli: &Cli, session: &mut Session) -> anyhow::Result<()> {
    let prompter = TerminalPrompter;

    if !session.dry_run && !sanity::is_running_as_root() {
        ui::error("A real installation must be run as root.");
        if prompter.confirm(DRY_RUN_FALLBACK_PROMPT, true)? {
            session.dry_run = true;
        } else {
            anyhow::bail!("Root privileges are required for a real installation");
        }
    }
    let dry_run = session.dry_run;

    sanity::run_preflight_checks(dry_run)?;
    ui::header(dry_run);

    let store = ProgressStore::new(cli.progress_file.clone(), dry_run);
    let orchestrator = Orchestrator::new(store);
    let plan = orchestrator.plan_start(cli.start_index())?;

    if plan.resumed {
        ui::info(&format!(
            "Resuming at step {} ({}) from {}",
            plan.step.index(),
            plan.step,
            orchestrator.store().path().display()
        ));
    }

    if plan.step == InstallStep::GatherConfig && !prompter.confirm(START_PROMPT, true)? {
        ui::info("Installation cancelled.");
        return Ok(());
    }

    let mut ctx = InstallContext::new(plan.config, dry_run, Box::new(prompter))
        .with_no_verify(cli.no_verify);
    session.installing = true;
    orchestrator.run_all(plan.step, &mut ctx)?;
    Ok(())
}

/// Print a failed run and pick the exit code
fn report_error(err: &anyhow::Error, session: &Session, cli: &Cli) -> u8 {
    let cause = InstallError::find_in(err);

    if let Some(InstallError::Declined { .. }) = cause {
        info!("run ended by declined confirmation");
        ui::info("Installation cancelled.");
        return 0;
    }

    error!("{:#}", err);
    ui::error(&format!("{:#}", err));

    if let Some(InstallError::CommandFailed { stdout, stderr, .. }) = cause {
        if !stdout.trim().is_empty() {
            eprintln!("--- stdout ---\n{}", stdout.trim_end());
        }
        if !stderr.trim().is_empty() {
            eprintln!("--- stderr ---\n{}", stderr.trim_end());
        }
    }

    if let Some((unmount, resume)) = recovery_hints(session, &cli.progress_file) {
        ui::warn(&unmount);
        ui::info(&resume);
    }

    cause.map_or(1, |e| e.exit_code() as u8)
}

/// Unmount and resume hints, only for live runs that reached the steps
fn recovery_hints(session: &Session, progress_file: &Path) -> Option<(String, String)> {
    if session.dry_run || !session.installing {
        return None;
    }
    Some((
        format!(
            "Filesystems may still be mounted. Run 'umount -R {}' before retrying.",
            TARGET_ROOT
        ),
        format!(
            "Progress is kept in {}; rerun archstep to resume.",
            progress_file.display()
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_hints_before_steps_start() {
        let session = Session {
            dry_run: false,
            installing: false,
        };
        assert!(recovery_hints(&session, Path::new("/tmp/p.json")).is_none());
    }

    #[test]
    fn test_no_hints_for_dry_run() {
        let session = Session {
            dry_run: true,
            installing: true,
        };
        assert!(recovery_hints(&session, Path::new("/tmp/p.json")).is_none());
    }

    #[test]
    fn test_hints_after_live_step_failure() {
        let session = Session {
            dry_run: false,
            installing: true,
        };
        let (unmount, resume) = recovery_hints(&session, Path::new("/tmp/p.json")).unwrap();
        assert!(unmount.contains("umount -R /mnt"));
        assert!(resume.contains("/tmp/p.json"));
    }
}
