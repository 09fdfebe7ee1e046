//! Install Step Sequence
//!
//! The installer runs a fixed, ordered list of steps. This module owns that
//! ordering and the cursor that walks it, so no caller can skip, repeat or
//! reorder steps by accident.
//!
//! # Step Flow
//!
//! ```text
//! gather_config (0)
//!     ↓
//! prepare_environment (1)
//!     ↓
//! partition_format (2)
//!     ↓
//! mount_filesystems (3)
//!     ↓
//! pacstrap_system (4)
//!     ↓
//! generate_fstab (5)
//!     ↓
//! pre_chroot_files (6)
//!     ↓
//! chroot_configure (7)
//!     ↓
//! cleanup (8)
//!     ↓
//! Finished (progress file removed)
//! ```
//!
//! The only way back is a full restart at `gather_config`.

use std::fmt;
use strum::{EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use thiserror::Error;

/// Installation steps in sequential order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(EnumString, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum InstallStep {
    /// Choose the target drive and confirm the plan
    GatherConfig = 0,
    /// Install live-environment tools and sync repositories
    PrepareEnvironment = 1,
    /// Wipe, partition, LVM and mkfs. DESTRUCTIVE.
    PartitionFormat = 2,
    /// Mount the new filesystems under the target root
    MountFilesystems = 3,
    /// Install packages with pacstrap
    PacstrapSystem = 4,
    /// Write /etc/fstab
    GenerateFstab = 5,
    /// Drop configuration files into the target before chroot
    PreChrootFiles = 6,
    /// Run the generated setup script inside arch-chroot
    ChrootConfigure = 7,
    /// Final checks and reboot instructions
    Cleanup = 8,
}

/// Number of steps in the sequence.
pub const STEP_COUNT: usize = 9;

impl InstallStep {
    /// Zero-based position of this step
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Look up a step by position. `None` when out of range.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::iter().nth(index)
    }

    /// Stable snake_case name, used in logs and `--list-steps`
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Returns true if this step wipes or formats disks
    #[inline]
    pub const fn is_destructive(self) -> bool {
        matches!(self, Self::PartitionFormat)
    }

    /// Returns true for the last step of the sequence
    #[inline]
    pub const fn is_last(self) -> bool {
        matches!(self, Self::Cleanup)
    }

    /// Returns the next step, or None after cleanup
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::GatherConfig => Some(Self::PrepareEnvironment),
            Self::PrepareEnvironment => Some(Self::PartitionFormat),
            Self::PartitionFormat => Some(Self::MountFilesystems),
            Self::MountFilesystems => Some(Self::PacstrapSystem),
            Self::PacstrapSystem => Some(Self::GenerateFstab),
            Self::GenerateFstab => Some(Self::PreChrootFiles),
            Self::PreChrootFiles => Some(Self::ChrootConfigure),
            Self::ChrootConfigure => Some(Self::Cleanup),
            Self::Cleanup => None,
        }
    }

    /// Human-readable section title
    pub const fn description(self) -> &'static str {
        match self {
            Self::GatherConfig => "Gathering System Configuration",
            Self::PrepareEnvironment => "Preparing Live Environment",
            Self::PartitionFormat => "Partitioning and Formatting",
            Self::MountFilesystems => "Mounting Filesystems",
            Self::PacstrapSystem => "Installing Base System (pacstrap)",
            Self::GenerateFstab => "Generating fstab",
            Self::PreChrootFiles => "Pre-chroot File Configuration",
            Self::ChrootConfigure => "Configuring System (chroot)",
            Self::Cleanup => "Finalizing Installation",
        }
    }

    /// All steps in order
    pub const fn all_steps() -> &'static [Self] {
        &[
            Self::GatherConfig,
            Self::PrepareEnvironment,
            Self::PartitionFormat,
            Self::MountFilesystems,
            Self::PacstrapSystem,
            Self::GenerateFstab,
            Self::PreChrootFiles,
            Self::ChrootConfigure,
            Self::Cleanup,
        ]
    }
}

impl fmt::Display for InstallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Errors that can occur while walking the step sequence
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallTransitionError {
    /// A step other than the current one reported completion
    #[error("Cannot complete {step}: the current step is {current}")]
    OutOfOrder {
        current: InstallStep,
        step: InstallStep,
    },

    /// Completion reported after the sequence already finished
    #[error("Cannot complete {step}: every step has already finished")]
    AlreadyFinished { step: InstallStep },

    /// Start index outside `[0, STEP_COUNT)`
    #[error("Step index {index} is out of range (0..{})", STEP_COUNT)]
    IndexOutOfRange { index: usize },
}

/// Forward-only cursor over the step sequence.
///
/// # Example
///
/// ```
/// use archstep::install_state::{InstallStep, StepCursor};
///
/// let mut cursor = StepCursor::starting_at(InstallStep::GatherConfig);
/// assert_eq!(cursor.complete(InstallStep::GatherConfig).unwrap(), 1);
/// assert_eq!(cursor.current(), Some(InstallStep::PrepareEnvironment));
///
/// // Cannot complete a step out of order
/// assert!(cursor.complete(InstallStep::Cleanup).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct StepCursor {
    current: Option<InstallStep>,
    /// Steps completed during this run, in order
    completed: Vec<InstallStep>,
}

impl StepCursor {
    /// Start the cursor at `step`
    pub fn starting_at(step: InstallStep) -> Self {
        Self {
            current: Some(step),
            completed: Vec::with_capacity(STEP_COUNT),
        }
    }

    /// Start the cursor at a raw index, rejecting anything out of range
    pub fn from_index(index: usize) -> Result<Self, InstallTransitionError> {
        InstallStep::from_index(index)
            .map(Self::starting_at)
            .ok_or(InstallTransitionError::IndexOutOfRange { index })
    }

    /// The step that runs next, or None once cleanup has completed
    #[inline]
    pub fn current(&self) -> Option<InstallStep> {
        self.current
    }

    /// Returns true once every step has completed
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.current.is_none()
    }

    /// Steps completed during this run
    pub fn completed(&self) -> &[InstallStep] {
        &self.completed
    }

    /// Record completion of `step` and move to the next one.
    ///
    /// Returns the index to persist as `current_step`: `step.index() + 1`.
    /// After cleanup that equals `STEP_COUNT`, which callers treat as "finished".
    ///
    /// # Errors
    ///
    /// - `AlreadyFinished` if the sequence is already done
    /// - `OutOfOrder` if `step` is not the current step
    pub fn complete(&mut self, step: InstallStep) -> Result<usize, InstallTransitionError> {
        let current = self
            .current
            .ok_or(InstallTransitionError::AlreadyFinished { step })?;

        if current != step {
            return Err(InstallTransitionError::OutOfOrder { current, step });
        }

        self.completed.push(step);
        self.current = step.next();
        Ok(step.index() + 1)
    }
}

impl From<InstallTransitionError> for crate::error::InstallError {
    fn from(err: InstallTransitionError) -> Self {
        crate::error::InstallError::InstallTransition(err.to_string())
    }
}
