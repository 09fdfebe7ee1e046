//! The nine install steps, in execution order

pub mod chroot;
pub mod cleanup;
pub mod disk;
pub mod environment;
pub mod fstab;
pub mod gather;
pub mod mount;
pub mod pacstrap;
pub mod pre_chroot;

pub use chroot::ChrootConfigure;
pub use cleanup::Cleanup;
pub use disk::PartitionFormat;
pub use environment::PrepareEnvironment;
pub use fstab::GenerateFstab;
pub use gather::GatherConfig;
pub use mount::MountFilesystems;
pub use pacstrap::PacstrapSystem;
pub use pre_chroot::PreChrootFiles;

use crate::orchestrator::Step;

/// One boxed step per [`InstallStep`](crate::install_state::InstallStep), by index
pub fn all() -> Vec<Box<dyn Step>> {
    vec![
        Box::new(GatherConfig),
        Box::new(PrepareEnvironment),
        Box::new(PartitionFormat),
        Box::new(MountFilesystems),
        Box::new(PacstrapSystem),
        Box::new(GenerateFstab),
        Box::new(PreChrootFiles),
        Box::new(ChrootConfigure),
        Box::new(Cleanup),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install_state::{InstallStep, STEP_COUNT};

    #[test]
    fn test_steps_match_their_index() {
        let steps = all();
        assert_eq!(steps.len(), STEP_COUNT);
        for (i, step) in steps.iter().enumerate() {
            assert_eq!(step.id(), InstallStep::from_index(i).unwrap());
        }
    }
}
