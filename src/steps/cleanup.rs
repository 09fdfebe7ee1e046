//! Step 8: final checks and reboot instructions

use crate::command::CommandSpec;
use crate::context::InstallContext;
use crate::dry_run::Operation;
use crate::install_state::InstallStep;
use crate::orchestrator::Step;
use crate::steps::chroot::BOOT_ENTRY;
use crate::steps::fstab::{FSTAB_PATH, parse_fstab, root_entry};
use crate::ui;
use anyhow::{Context, Result};
use tracing::info;

/// `root=UUID=<x>` from a systemd-boot entry's `options` line
pub fn boot_entry_root_uuid(entry: &str) -> Option<String> {
    entry
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("options"))
        .flat_map(str::split_whitespace)
        .find_map(|token| token.strip_prefix("root=UUID="))
        .map(str::to_string)
}

pub struct Cleanup;

impl Cleanup {
    fn final_checks(&self, ctx: &InstallContext) -> Result<()> {
        ui::step_info("Running final integrity checks...");
        let verifier = ctx.verifier();

        let fstab = ctx.target.read(FSTAB_PATH).context("Failed to read fstab")?;
        let entries = parse_fstab(&fstab);
        let fstab_uuid = root_entry(&entries).and_then(|e| e.uuid()).map(str::to_string);

        let root = ctx.target_root();
        let mounted = ctx.run(
            &CommandSpec::new("findmnt", ["-no", "UUID", root.as_str()])
                .probe(Operation::RootUuid)
                .no_spinner(),
        )?;
        let mounted_uuid = mounted.text().lines().next().map(str::to_string);
        verifier.check(
            fstab_uuid.is_some() && fstab_uuid == mounted_uuid,
            "fstab root UUID matches the mounted root filesystem",
            true,
        )?;

        let entry = ctx.target.read(BOOT_ENTRY).unwrap_or_default();
        let entry_uuid = boot_entry_root_uuid(&entry);
        verifier.check(
            entry_uuid.is_some() && entry_uuid == fstab_uuid,
            "Boot entry root UUID matches fstab",
            true,
        )?;
        Ok(())
    }
}

impl Step for Cleanup {
    fn id(&self) -> InstallStep {
        InstallStep::Cleanup
    }

    fn run(&self, ctx: &mut InstallContext) -> Result<()> {
        if ctx.dry_run {
            ui::info("[DRY RUN] Skipping final integrity checks.");
        } else if ctx.no_verify {
            ui::step_info("Skipping final integrity checks as per --no-verify.");
        } else {
            self.final_checks(ctx)?;
        }

        ctx.run(&CommandSpec::new("sync", Vec::<String>::new()).no_spinner())?;
        info!("installation finished");

        if ctx.dry_run {
            ui::success("Dry run complete. No changes were made to any disk.");
            return Ok(());
        }
        let root = ctx.target_root();
        ui::success("Installation complete!");
        println!();
        ui::info("Next steps:");
        ui::info(&format!("  1. umount -R {}", root));
        ui::info("  2. reboot");
        ui::info("  3. Remove the installation media when the machine restarts.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_entry_root_uuid() {
        let entry = "title   Arch Linux\nlinux   /vmlinuz-linux\ninitrd  /initramfs-linux.img\noptions root=UUID=abcd-1234 rootflags=subvol=/@root rw\n";
        assert_eq!(boot_entry_root_uuid(entry).as_deref(), Some("abcd-1234"));
    }

    #[test]
    fn test_boot_entry_without_options() {
        assert_eq!(boot_entry_root_uuid("title Arch\n"), None);
    }
}
