//! Step 3: mount the target under /mnt and activate swap

use crate::command::CommandSpec;
use crate::context::InstallContext;
use crate::dry_run::Operation;
use crate::install_state::InstallStep;
use crate::layout::{DiskLayout, MountSpec};
use crate::orchestrator::Step;
use crate::ui;
use anyhow::{Context, Result};
use std::fs;
use tracing::debug;

/// One row of `findmnt --output=TARGET,SOURCE,FSTYPE,OPTIONS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRow {
    pub target: String,
    pub source: String,
    pub fstype: String,
    pub options: String,
}

pub fn parse_findmnt(output: &str) -> Vec<MountRow> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            Some(MountRow {
                target: fields.next()?.to_string(),
                source: fields.next()?.to_string(),
                fstype: fields.next()?.to_string(),
                options: fields.next().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

/// Whether `row` satisfies `mount` (target already translated to the host path)
pub fn row_matches(row: &MountRow, mount: &MountSpec, layout: &DiskLayout) -> bool {
    if row.fstype != mount.fstype {
        return false;
    }
    if mount.fstype == "vfat" {
        return row.source == mount.source;
    }
    let mapper = format!("/dev/mapper/{}", layout.mapper_name(&layout.root_lv_name));
    let source_ok = row.source == mount.source || row.source.starts_with(&mapper);
    let subvol_ok = match mount.options.as_deref().and_then(subvol_option) {
        Some(subvol) => row
            .options
            .split(',')
            .any(|opt| opt == format!("subvol={}", subvol)),
        None => true,
    };
    source_ok && subvol_ok
}

fn subvol_option(options: &str) -> Option<&str> {
    options.split(',').find_map(|o| o.strip_prefix("subvol="))
}

pub struct MountFilesystems;

impl MountFilesystems {
    fn is_mounted(&self, ctx: &InstallContext, target: &str) -> Result<bool> {
        let out = ctx.run(
            &CommandSpec::new("findmnt", ["-no", "SOURCE", target])
                .probe(Operation::FindMount {
                    target: target.to_string(),
                })
                .no_spinner(),
        )?;
        Ok(out.success && !out.text().is_empty())
    }

    fn active_swaps(&self, ctx: &InstallContext) -> Result<Vec<String>> {
        let out = ctx.run(
            &CommandSpec::new("swapon", ["--show=NAME", "--noheadings"])
                .probe(Operation::ShowSwap)
                .no_spinner(),
        )?;
        Ok(out.text().lines().map(|l| l.trim().to_string()).collect())
    }

    /// `swapon` lists the kernel name (`/dev/dm-1`), so compare resolved paths
    fn swap_is_active(&self, active: &[String], device: &str) -> bool {
        let resolved = fs::canonicalize(device)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| device.to_string());
        active.iter().any(|name| name == device || *name == resolved)
    }

    fn mount_one(&self, ctx: &InstallContext, mount: &MountSpec) -> Result<()> {
        let target = ctx.target_path(&mount.target);
        if self.is_mounted(ctx, &target)? {
            ui::info(&format!("{} is already mounted, skipping", target));
            return Ok(());
        }
        if mount.target != "/" {
            ctx.target.mkdir(&mount.target)?;
        }
        let mut args: Vec<String> = Vec::new();
        if let Some(options) = &mount.options {
            args.push("-o".to_string());
            args.push(options.clone());
        }
        args.push(mount.source.clone());
        args.push(target);
        ctx.run(&CommandSpec::new("mount", args).no_spinner())
            .with_context(|| format!("Failed to mount {}", mount.source))?;
        Ok(())
    }
}

impl Step for MountFilesystems {
    fn id(&self) -> InstallStep {
        InstallStep::MountFilesystems
    }

    fn run(&self, ctx: &mut InstallContext) -> Result<()> {
        let layout = ctx.layout()?;
        ui::step_info(&format!("Mounting filesystems under {}...", ctx.target_root()));
        ctx.target.mkdir("/")?;
        for mount in layout.mounts() {
            self.mount_one(ctx, &mount)?;
        }

        if let Some(swap) = layout.swap_device() {
            let active = if ctx.dry_run { Vec::new() } else { self.active_swaps(ctx)? };
            if self.swap_is_active(&active, &swap) {
                ui::info(&format!("Swap {} is already active", swap));
            } else {
                ctx.run(&CommandSpec::new("swapon", [swap.as_str()]).no_spinner())?;
            }
        }
        ui::success("Filesystems mounted.");
        Ok(())
    }

    fn verify(&self, ctx: &InstallContext) -> Result<()> {
        let layout = ctx.layout()?;
        let verifier = ctx.verifier();
        let out = ctx.run(
            &CommandSpec::new(
                "findmnt",
                ["--real", "--noheadings", "--output=TARGET,SOURCE,FSTYPE,OPTIONS"],
            )
            .probe(Operation::FindMounts)
            .no_spinner(),
        )?;
        let rows = parse_findmnt(out.text());
        debug!(rows = rows.len(), "findmnt rows");

        for mount in layout.mounts() {
            let target = ctx.target_path(&mount.target);
            let ok = rows
                .iter()
                .any(|row| row.target == target && row_matches(row, &mount, &layout));
            verifier.check(
                ok,
                &format!("{} mounted on {} ({})", mount.source, target, mount.fstype),
                true,
            )?;
        }

        if let Some(swap) = layout.swap_device() {
            let active = self.active_swaps(ctx)?;
            let ok = !active.is_empty() && (ctx.dry_run || self.swap_is_active(&active, &swap));
            verifier.check(ok, &format!("Swap {} is active", swap), false)?;
        }
        Ok(())
    }
}
