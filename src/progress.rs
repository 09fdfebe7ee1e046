//! Persisted install progress
//!
//! After every completed step the orchestrator writes
//! `{"current_step": <next index>, "user_config": {...}}` to a JSON file. At
//! startup the file decides where a new run resumes. Anything unusable in
//! the file (bad JSON, out-of-range index, no target drive) sends the run
//! back to the first step and the file is deleted.

use crate::config::UserConfig;
use crate::error::Result;
use crate::install_state::{InstallStep, STEP_COUNT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default location on the live ISO
pub const DEFAULT_PROGRESS_FILE: &str = "/tmp/arch_install_progress.json";

/// On-disk shape of the progress file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedProgress {
    pub current_step: usize,
    pub user_config: UserConfig,
}

/// Outcome of reading the progress file at startup
#[derive(Debug, Clone, PartialEq)]
pub enum ResumePoint {
    /// No usable progress; start at the first step with default config
    Fresh,
    /// Saved progress found
    Resume {
        step: InstallStep,
        config: UserConfig,
    },
}

impl ResumePoint {
    /// Step index to start from
    pub fn index(&self) -> usize {
        match self {
            Self::Fresh => 0,
            Self::Resume { step, .. } => step.index(),
        }
    }
}

/// Reads, writes and removes the progress file.
///
/// In dry-run mode every write and delete is skipped so a preview never
/// disturbs a real install's resume state.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
    dry_run: bool,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            path: path.into(),
            dry_run,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Sibling file the next save is staged in
    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Write `current_step` and `config`, replacing any earlier file.
    ///
    /// The JSON is staged next to the target and renamed over it, so an
    /// interrupted save leaves the previous progress intact.
    pub fn save(&self, current_step: usize, config: &UserConfig) -> Result<()> {
        if self.dry_run {
            debug!(step = current_step, "dry run: progress not saved");
            return Ok(());
        }

        let progress = PersistedProgress {
            current_step,
            user_config: config.clone(),
        };
        let json = serde_json::to_string_pretty(&progress)?;
        let staging = self.staging_path();
        fs::write(&staging, json)?;
        if let Err(e) = fs::rename(&staging, &self.path) {
            let _ = fs::remove_file(&staging);
            return Err(e.into());
        }
        debug!(step = current_step, path = %self.path.display(), "progress saved");
        Ok(())
    }

    /// Read the file without judging its contents.
    ///
    /// `Ok(None)` when the file does not exist.
    pub fn load(&self) -> Result<Option<PersistedProgress>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Decide where to resume.
    ///
    /// Saved config is merged over `defaults`. Malformed files, indices
    /// outside `[0, STEP_COUNT)` and configs without a target drive all
    /// yield [`ResumePoint::Fresh`] and remove the stale file.
    pub fn resume_point(&self, defaults: &UserConfig) -> ResumePoint {
        let progress = match self.load() {
            Ok(Some(progress)) => progress,
            Ok(None) => return ResumePoint::Fresh,
            Err(e) => {
                warn!("Could not load progress file ({}). Starting from beginning.", e);
                self.discard();
                return ResumePoint::Fresh;
            }
        };

        let Some(step) = InstallStep::from_index(progress.current_step) else {
            warn!(
                "Invalid step {} in progress file (expected 0..{}). Starting from beginning.",
                progress.current_step, STEP_COUNT
            );
            self.discard();
            return ResumePoint::Fresh;
        };

        let mut config = defaults.clone();
        config.merge(progress.user_config);

        if !config.has_target_drive() {
            warn!("Saved progress is missing 'target_drive'. Restarting from configuration.");
            self.discard();
            return ResumePoint::Fresh;
        }

        info!("Found saved progress at step {} ({})", step.index(), step);
        ResumePoint::Resume { step, config }
    }

    /// Index form of [`resume_point`](Self::resume_point)
    pub fn resume_index(&self, defaults: &UserConfig) -> usize {
        self.resume_point(defaults).index()
    }

    /// Remove the progress file; a missing file is fine
    pub fn clear(&self) -> Result<()> {
        if self.dry_run {
            debug!("dry run: progress file left in place");
            return Ok(());
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "progress file removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal of a stale file
    fn discard(&self) {
        if let Err(e) = self.clear() {
            warn!("Could not remove stale progress file: {}", e);
        }
    }
}
