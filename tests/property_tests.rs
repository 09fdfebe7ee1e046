//! Property-based tests for archstep
//!
//! These tests verify:
//! - Saved progress resumes at exactly the saved step
//! - Progress without a target drive always restarts at step 0
//! - Out-of-range indices are discarded
//! - Partition naming and config round-trips

use archstep::config::{UserConfig, keys};
use archstep::install_state::{InstallStep, STEP_COUNT};
use archstep::layout::partition_path;
use archstep::progress::{ProgressStore, ResumePoint};
use proptest::prelude::*;
use tempfile::TempDir;

fn hostname_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{2,20}"
}

fn drive_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "/dev/sd[a-z]".prop_map(String::from),
        "/dev/vd[a-z]".prop_map(String::from),
        (0u8..4).prop_map(|n| format!("/dev/nvme{}n1", n)),
    ]
}

// =============================================================================
// Resume properties
// =============================================================================

proptest! {
    /// save(i) then resume_index() == i for every valid step
    #[test]
    fn prop_resume_returns_saved_index(
        step in 0usize..STEP_COUNT,
        drive in drive_strategy(),
        hostname in hostname_strategy(),
    ) {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.json"), false);
        let mut config = UserConfig::default();
        config.set(keys::TARGET_DRIVE, drive.as_str());
        config.set(keys::HOSTNAME, hostname.as_str());
        store.save(step, &config).unwrap();

        prop_assert_eq!(store.resume_index(&UserConfig::default()), step);

        match store.resume_point(&UserConfig::default()) {
            ResumePoint::Resume { step: resumed, config: restored } => {
                prop_assert_eq!(resumed, InstallStep::from_index(step).unwrap());
                prop_assert_eq!(restored, config);
            }
            ResumePoint::Fresh => prop_assert!(false, "expected to resume at {}", step),
        }
    }

    /// No target drive in the saved config always means step 0
    #[test]
    fn prop_missing_drive_restarts_at_zero(step in 0usize..STEP_COUNT) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");
        let store = ProgressStore::new(&path, false);
        store.save(step, &UserConfig::default()).unwrap();

        prop_assert_eq!(store.resume_index(&UserConfig::default()), 0);
        prop_assert!(!path.exists(), "stale progress should be discarded");
    }

    /// Indices past the last step are treated as no progress
    #[test]
    fn prop_out_of_range_index_restarts_at_zero(step in STEP_COUNT..1000usize) {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path().join("progress.json"), false);
        let mut config = UserConfig::default();
        config.set(keys::TARGET_DRIVE, "/dev/sda");
        store.save(step, &config).unwrap();

        prop_assert_eq!(store.resume_index(&UserConfig::default()), 0);
    }

    /// Dry-run stores never create a file
    #[test]
    fn prop_dry_run_store_never_writes(step in 0usize..STEP_COUNT) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.json");
        let store = ProgressStore::new(&path, true);
        let mut config = UserConfig::default();
        config.set(keys::TARGET_DRIVE, "/dev/sda");
        store.save(step, &config).unwrap();
        prop_assert!(!path.exists());
    }
}

// =============================================================================
// Layout properties
// =============================================================================

proptest! {
    /// Disks ending in a digit get a `p` separator, others do not
    #[test]
    fn prop_partition_path_separator(drive in drive_strategy(), number in 1u32..16) {
        let path = partition_path(&drive, number);
        prop_assert!(path.starts_with(&drive));
        let suffix = &path[drive.len()..];
        if drive.ends_with(|c: char| c.is_ascii_digit()) {
            prop_assert_eq!(suffix, format!("p{}", number));
        } else {
            prop_assert_eq!(suffix, number.to_string());
        }
    }

    /// Step index and lookup agree
    #[test]
    fn prop_step_index_round_trip(index in 0usize..STEP_COUNT) {
        let step = InstallStep::from_index(index).unwrap();
        prop_assert_eq!(step.index(), index);
    }
}
