//! Step 4: install the base system

use crate::command::CommandSpec;
use crate::config::keys;
use crate::context::InstallContext;
use crate::dry_run::Operation;
use crate::install_state::InstallStep;
use crate::orchestrator::Step;
use crate::resolver::resolve_packages;
use crate::ui;
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;

/// Directories that must exist in the target after pacstrap
const KEY_DIRECTORIES: &[&str] = &["/bin", "/etc", "/usr", "/boot"];

pub struct PacstrapSystem;

impl PacstrapSystem {
    fn package_installed(&self, ctx: &InstallContext, package: &str) -> Result<bool> {
        let root = ctx.target_root();
        let out = ctx.run(
            &CommandSpec::new("arch-chroot", [root.as_str(), "pacman", "-Q", package])
                .probe(Operation::QueryPackage {
                    package: package.to_string(),
                })
                .no_spinner(),
        )?;
        Ok(out.success && !out.text().is_empty())
    }
}

impl Step for PacstrapSystem {
    fn id(&self) -> InstallStep {
        InstallStep::PacstrapSystem
    }

    fn run(&self, ctx: &mut InstallContext) -> Result<()> {
        let packages = resolve_packages(&ctx.config)?;
        info!(count = packages.len(), "pacstrap packages resolved");
        ui::step_info(&format!("Installing {} packages:", packages.len()));
        ui::info(&packages.join(" "));

        let mut args = vec!["-K".to_string(), ctx.target_root()];
        args.extend(packages);
        ctx.run(
            &CommandSpec::new("pacstrap", args)
                .retry(2, Duration::from_secs(10))
                .spinner("Pacstrapping base system and packages"),
        )
        .context("pacstrap failed")?;
        ui::success("Base system installed.");
        Ok(())
    }

    fn verify(&self, ctx: &InstallContext) -> Result<()> {
        let verifier = ctx.verifier();
        for dir in KEY_DIRECTORIES {
            let present = ctx.dry_run || ctx.target.path(dir).is_dir();
            verifier.check(present, &format!("Directory {} exists in target", dir), true)?;
        }

        let kernel = ctx.config.text(keys::KERNEL);
        for package in ["base", kernel.as_str(), "lvm2", "mkinitcpio"] {
            let installed = self.package_installed(ctx, package)?;
            verifier.check(installed, &format!("Package {} is installed", package), true)?;
        }
        Ok(())
    }
}
