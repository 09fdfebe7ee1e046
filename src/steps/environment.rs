//! Step 1: prepare the live environment

use crate::command::CommandSpec;
use crate::config::keys;
use crate::context::InstallContext;
use crate::hardware;
use crate::install_state::InstallStep;
use crate::orchestrator::Step;
use crate::resolver::INSTALLER_TOOLS;
use crate::ui;
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::warn;

pub const OFFLINE_PROMPT: &str = "Internet connection check failed. Continue anyway?";

pub const SURFACE_KERNEL: &str = "linux-surface";
pub const SURFACE_KEY_URL: &str =
    "https://raw.githubusercontent.com/linux-surface/linux-surface/master/pkg/keys/surface.asc";
pub const SURFACE_KEY_ID: &str = "56C464BAAC421453";
pub const SURFACE_REPO_HEADER: &str = "[linux-surface]";
pub const SURFACE_REPO_BLOCK: &str = "\n[linux-surface]\nServer = https://pkg.surfacelinux.com/arch/\n";

pub struct PrepareEnvironment;

impl PrepareEnvironment {
    fn check_network(&self, ctx: &InstallContext) -> Result<()> {
        ui::step_info("Checking internet connection...");
        if ctx.dry_run {
            ui::info("[DRY RUN] Skipping internet connection check.");
            return Ok(());
        }
        if hardware::detect_internet().is_online() {
            ui::success("Internet connection is available.");
            return Ok(());
        }
        ui::error("Could not reach the package mirrors.");
        warn!("connectivity check failed");
        if ctx.prompter.confirm(OFFLINE_PROMPT, false)? {
            ui::warn("Continuing without a confirmed internet connection.");
            Ok(())
        } else {
            anyhow::bail!("Aborted: no internet connection")
        }
    }

    fn add_surface_repo(&self, ctx: &InstallContext) -> Result<()> {
        ui::step_info("Adding the linux-surface repository to the live environment...");
        ctx.run(
            &CommandSpec::shell(format!("curl -fsSL {} | pacman-key --add -", SURFACE_KEY_URL))
                .retry(3, Duration::from_secs(5))
                .spinner("Importing linux-surface signing key"),
        )?;
        ctx.run(&CommandSpec::new("pacman-key", ["--finger", SURFACE_KEY_ID]).no_spinner())?;
        ctx.run(&CommandSpec::new("pacman-key", ["--lsign-key", SURFACE_KEY_ID]).no_spinner())?;
        ctx.live
            .append_if_missing("/etc/pacman.conf", SURFACE_REPO_HEADER, SURFACE_REPO_BLOCK)
            .context("Failed to add the linux-surface repository")?;
        Ok(())
    }
}

impl Step for PrepareEnvironment {
    fn id(&self) -> InstallStep {
        InstallStep::PrepareEnvironment
    }

    fn run(&self, ctx: &mut InstallContext) -> Result<()> {
        self.check_network(ctx)?;

        ui::step_info("Synchronizing system clock...");
        ctx.run(&CommandSpec::new("timedatectl", ["set-ntp", "true"]).no_spinner())?;

        let mut install = vec!["-Sy", "--noconfirm", "--needed"];
        install.extend_from_slice(INSTALLER_TOOLS);
        ctx.run(
            &CommandSpec::new("pacman", install)
                .retry(2, Duration::from_secs(5))
                .spinner("Installing installer tools"),
        )
        .context("Failed to install installer tools")?;

        if ctx.config.text(keys::KERNEL) == SURFACE_KERNEL {
            self.add_surface_repo(ctx)?;
        }

        ctx.run(
            &CommandSpec::new("pacman", ["-Sy"])
                .retry(3, Duration::from_secs(5))
                .spinner("Refreshing package databases"),
        )
        .context("Failed to refresh package databases")?;
        Ok(())
    }
}
