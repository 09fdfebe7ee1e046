use clap::Parser;
use std::path::PathBuf;

use crate::install_state::STEP_COUNT;
use crate::progress::DEFAULT_PROGRESS_FILE;

/// archstep - resumable Arch Linux installer
#[derive(Parser, Debug)]
#[command(name = "archstep")]
#[command(about = "Step-by-step Arch Linux installer with resume, dry-run and verification")]
#[command(version)]
pub struct Cli {
    /// Dry-run mode: show what would be executed without making changes.
    ///
    /// Destructive commands (wipe, partition, mkfs, pacstrap, chroot) are
    /// echoed and simulated. Read-only probes such as lsblk still execute so
    /// the preview is realistic. The progress file is never written.
    #[arg(long)]
    pub dry_run: bool,

    /// Start at this step index (0-8), ignoring saved progress position
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u8).range(0..STEP_COUNT as i64))]
    pub step: Option<u8>,

    /// Skip post-step verification checks
    #[arg(long)]
    pub no_verify: bool,

    /// Where progress is saved between runs
    #[arg(long, value_name = "PATH", default_value = DEFAULT_PROGRESS_FILE)]
    pub progress_file: PathBuf,

    /// Print the step list as `index:name` and exit
    #[arg(long)]
    pub list_steps: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Forced start index, if any
    pub fn start_index(&self) -> Option<usize> {
        self.step.map(usize::from)
    }

    /// Default log directive for the verbosity level
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}
