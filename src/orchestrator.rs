//! Step orchestration
//!
//! Runs the fixed step list from a start index to the end. After each step
//! succeeds (and verifies, unless `--no-verify`) the next index is saved; after
//! the last step the progress file is removed instead. The first error stops
//! the run and leaves the file pointing at the failed step.

use crate::config::UserConfig;
use crate::context::InstallContext;
use crate::error::InstallError;
use crate::install_state::{InstallStep, InstallTransitionError, STEP_COUNT, StepCursor};
use crate::progress::{ProgressStore, ResumePoint};
use crate::ui;
use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// One unit of the install sequence.
///
/// `run` may assume every earlier step succeeded. Work should be safe to
/// repeat: a failed run re-enters the same step next time.
pub trait Step {
    fn id(&self) -> InstallStep;

    fn run(&self, ctx: &mut InstallContext) -> Result<()>;

    /// Post-step checks; skipped with `--no-verify`
    fn verify(&self, _ctx: &InstallContext) -> Result<()> {
        Ok(())
    }
}

/// Where a run starts and with which config
#[derive(Debug, Clone, PartialEq)]
pub struct StartPlan {
    pub step: InstallStep,
    pub config: UserConfig,
    /// Saved progress was found and is being continued
    pub resumed: bool,
}

pub struct Orchestrator {
    steps: Vec<Box<dyn Step>>,
    store: ProgressStore,
}

impl Orchestrator {
    /// Orchestrator over the standard install steps
    pub fn new(store: ProgressStore) -> Self {
        Self {
            steps: crate::steps::all(),
            store,
        }
    }

    /// Orchestrator over custom steps.
    ///
    /// # Errors
    ///
    /// Fails unless `steps` holds exactly one step per [`InstallStep`], in order.
    pub fn with_steps(steps: Vec<Box<dyn Step>>, store: ProgressStore) -> Result<Self> {
        if steps.len() != STEP_COUNT {
            anyhow::bail!("expected {} steps, got {}", STEP_COUNT, steps.len());
        }
        for (i, step) in steps.iter().enumerate() {
            if step.id().index() != i {
                anyhow::bail!("step {} is at position {}", step.id(), i);
            }
        }
        Ok(Self { steps, store })
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    /// Decide the first step and config.
    ///
    /// Without `forced` this resumes saved progress (or starts fresh). A forced
    /// index keeps the restored config only when it is past step 0 and a
    /// target drive was saved; otherwise the run restarts at 0 with defaults.
    pub fn plan_start(&self, forced: Option<usize>) -> Result<StartPlan> {
        let defaults = UserConfig::default();
        let resume = self.store.resume_point(&defaults);

        let Some(index) = forced else {
            return Ok(match resume {
                ResumePoint::Fresh => StartPlan {
                    step: InstallStep::GatherConfig,
                    config: defaults,
                    resumed: false,
                },
                ResumePoint::Resume { step, config } => StartPlan {
                    step,
                    config,
                    resumed: true,
                },
            });
        };

        let step = InstallStep::from_index(index)
            .ok_or(InstallTransitionError::IndexOutOfRange { index })
            .map_err(InstallError::from)?;

        let restored = match resume {
            ResumePoint::Resume { config, .. } => config,
            ResumePoint::Fresh => defaults.clone(),
        };

        if step == InstallStep::GatherConfig || !restored.has_target_drive() {
            if step != InstallStep::GatherConfig {
                warn!(
                    "Forced start at step {} needs a saved target drive; starting from the beginning",
                    index
                );
                ui::warn("No saved configuration with a target drive; starting from step 0.");
            }
            return Ok(StartPlan {
                step: InstallStep::GatherConfig,
                config: defaults,
                resumed: false,
            });
        }

        info!("Forced start at step {} ({})", index, step);
        Ok(StartPlan {
            step,
            config: restored,
            resumed: true,
        })
    }

    /// Run every step from `start` to the end
    pub fn run_all(&self, start: InstallStep, ctx: &mut InstallContext) -> Result<()> {
        let mut cursor = StepCursor::starting_at(start);

        while let Some(id) = cursor.current() {
            let step = &self.steps[id.index()];
            ui::section(id.description());
            info!(step = %id, index = id.index(), "starting step");

            step.run(ctx)
                .with_context(|| format!("Step {} ({}) failed", id.index(), id))?;

            if ctx.no_verify {
                ui::step_info(&format!("Skipping {} verification as per --no-verify.", id));
            } else {
                step.verify(ctx)
                    .with_context(|| format!("Verification of step {} ({}) failed", id.index(), id))?;
            }

            let next = cursor.complete(id).map_err(InstallError::from)?;
            if next < STEP_COUNT {
                self.store
                    .save(next, &ctx.config)
                    .context("Failed to save progress")?;
            } else {
                self.store.clear().context("Failed to remove progress file")?;
            }
            info!(step = %id, "step complete");
        }

        Ok(())
    }
}

/// `1h 02m 03s` style duration
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {:02}m {:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}.{:01}s", s, elapsed.subsec_millis() / 100)
    }
}

/// Print how long the run took
pub fn print_duration(started: Instant) {
    ui::info(&format!("Total run time: {}", format_duration(started.elapsed())));
}
