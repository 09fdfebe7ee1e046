//! Step 2: partition, LVM and filesystems
//!
//! The drive is released first (unmount, swapoff, deactivate the volume
//! group) so a re-run after a partial failure starts from a clean disk.

use crate::command::CommandSpec;
use crate::context::InstallContext;
use crate::dry_run::Operation;
use crate::install_state::InstallStep;
use crate::layout::DiskLayout;
use crate::orchestrator::Step;
use crate::retry::RetryPolicy;
use crate::ui;
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Poll for partition device nodes after `partprobe`
const DEVICE_POLL: RetryPolicy = RetryPolicy::new(10, Duration::from_secs(1));

pub struct PartitionFormat;

impl PartitionFormat {
    fn release_drive(&self, ctx: &InstallContext, layout: &DiskLayout) -> Result<()> {
        ui::step_info(&format!("Releasing {} from earlier attempts...", layout.drive));
        let root = ctx.target_root();
        ctx.run(&CommandSpec::new("umount", ["-R", root.as_str()]).unchecked().no_spinner())?;
        if let Some(swap) = layout.swap_device() {
            ctx.run(&CommandSpec::new("swapoff", [swap]).unchecked().no_spinner())?;
        }
        ctx.run(
            &CommandSpec::new("vgchange", ["-an", layout.vg_name.as_str()])
                .unchecked()
                .no_spinner(),
        )?;
        ctx.run(
            &CommandSpec::new("vgremove", ["-ff", "-y", layout.vg_name.as_str()])
                .unchecked()
                .no_spinner(),
        )?;
        Ok(())
    }

    fn partition(&self, ctx: &InstallContext, layout: &DiskLayout) -> Result<()> {
        let drive = layout.drive.as_str();
        ui::step_info(&format!("Partitioning {}...", drive));
        ctx.run(&CommandSpec::new("wipefs", ["-af", drive]).no_spinner())?;
        ctx.run(&CommandSpec::new("sgdisk", ["-Zo", drive]).no_spinner())?;
        ctx.run(&CommandSpec::new(
            "sgdisk",
            [
                "-n".to_string(),
                format!("1:0:+{}", layout.efi_size),
                "-t".to_string(),
                "1:ef00".to_string(),
                "-c".to_string(),
                "1:EFI".to_string(),
                drive.to_string(),
            ],
        ))?;
        ctx.run(&CommandSpec::new(
            "sgdisk",
            ["-n", "2:0:0", "-t", "2:8e00", "-c", "2:LVM", drive],
        ))?;
        ctx.run(
            &CommandSpec::new("partprobe", [drive])
                .retry(3, Duration::from_secs(2))
                .no_spinner(),
        )?;

        if !ctx.dry_run {
            let efi = layout.efi_partition();
            let lvm = layout.lvm_partition();
            ctx.verifier().check_with_retry(
                "Partition device nodes appeared",
                true,
                DEVICE_POLL,
                || Path::new(&efi).exists() && Path::new(&lvm).exists(),
            )?;
        }
        Ok(())
    }

    fn create_lvm(&self, ctx: &InstallContext, layout: &DiskLayout) -> Result<()> {
        let pv = layout.lvm_partition();
        let vg = layout.vg_name.as_str();
        ui::step_info(&format!("Creating LVM volume group {} on {}...", vg, pv));
        ctx.run(&CommandSpec::new("pvcreate", ["-ff", "-y", pv.as_str()]))?;
        ctx.run(&CommandSpec::new("vgcreate", ["-y", vg, pv.as_str()]))?;

        if let Some(swap) = layout.swap_device() {
            ctx.run(&CommandSpec::new(
                "lvcreate",
                [
                    "-y",
                    "-L",
                    layout.swap_size_arg().as_str(),
                    "-n",
                    layout.swap_lv_name.as_str(),
                    vg,
                ],
            ))?;
            ctx.run(&CommandSpec::new("mkswap", [swap]))?;
        } else {
            ui::info("No disk swap requested; ZRAM will be used instead.");
        }

        ctx.run(&CommandSpec::new(
            "lvcreate",
            ["-y", "-l", "100%FREE", "-n", layout.root_lv_name.as_str(), vg],
        ))?;
        Ok(())
    }

    fn format(&self, ctx: &InstallContext, layout: &DiskLayout) -> Result<()> {
        ui::step_info("Creating filesystems...");
        ctx.run(&CommandSpec::new("mkfs.fat", ["-F32", layout.efi_partition().as_str()]))?;

        let root = layout.root_device();
        let (mkfs, force) = layout.filesystem.mkfs();
        ctx.run(&CommandSpec::new(mkfs, [force, root.as_str()]))?;

        let subvolumes = layout.subvolumes();
        if !subvolumes.is_empty() {
            let mnt = ctx.target_root();
            ctx.run(&CommandSpec::new("mount", [root.as_str(), mnt.as_str()]).no_spinner())?;
            for (subvol, _) in &subvolumes {
                let path = ctx.target_path(subvol);
                ctx.run(&CommandSpec::new("btrfs", ["subvolume", "create", path.as_str()]).no_spinner())?;
            }
            ctx.run(&CommandSpec::new("umount", [mnt.as_str()]).no_spinner())?;
        }
        Ok(())
    }

    fn filesystem_type(&self, ctx: &InstallContext, device: &str) -> Result<String> {
        let out = ctx.run(
            &CommandSpec::new("lsblk", ["-fno", "FSTYPE", device])
                .probe(Operation::ListFilesystems {
                    device: device.to_string(),
                })
                .no_spinner(),
        )?;
        Ok(out.text().lines().next().unwrap_or_default().trim().to_string())
    }
}

impl Step for PartitionFormat {
    fn id(&self) -> InstallStep {
        InstallStep::PartitionFormat
    }

    fn run(&self, ctx: &mut InstallContext) -> Result<()> {
        let layout = ctx.layout()?;
        info!(drive = %layout.drive, filesystem = %layout.filesystem, "partitioning");
        self.release_drive(ctx, &layout)?;
        self.partition(ctx, &layout).context("Partitioning failed")?;
        self.create_lvm(ctx, &layout).context("LVM setup failed")?;
        self.format(ctx, &layout).context("Formatting failed")?;
        ui::success("Disk layout created.");
        Ok(())
    }

    fn verify(&self, ctx: &InstallContext) -> Result<()> {
        let layout = ctx.layout()?;
        let verifier = ctx.verifier();

        for device in [layout.efi_partition(), layout.lvm_partition()] {
            let present = ctx.dry_run || Path::new(&device).exists();
            verifier.check(present, &format!("Partition {} exists", device), true)?;
        }

        let mut expected = vec![
            (layout.efi_partition(), "vfat"),
            (layout.lvm_partition(), "LVM2_member"),
            (layout.root_device(), layout.filesystem.to_string_static()),
        ];
        if let Some(swap) = layout.swap_device() {
            expected.push((swap, "swap"));
        }
        for (device, fstype) in expected {
            let actual = self.filesystem_type(ctx, &device)?;
            verifier.check(
                actual == fstype,
                &format!("{} is {} (found '{}')", device, fstype, actual),
                true,
            )?;
        }
        Ok(())
    }
}
