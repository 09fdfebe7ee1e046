//! Step 5: generate /etc/fstab

use crate::command::CommandSpec;
use crate::context::InstallContext;
use crate::dry_run::Operation;
use crate::install_state::InstallStep;
use crate::orchestrator::Step;
use crate::ui;
use anyhow::{Context, Result};

pub const FSTAB_PATH: &str = "/etc/fstab";

/// A non-comment fstab line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    pub spec: String,
    pub mountpoint: String,
    pub fstype: String,
    pub options: String,
}

impl FstabEntry {
    /// `UUID=<x>` value, if the entry is addressed by UUID
    pub fn uuid(&self) -> Option<&str> {
        self.spec.strip_prefix("UUID=")
    }
}

pub fn parse_fstab(content: &str) -> Vec<FstabEntry> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            Some(FstabEntry {
                spec: fields.next()?.to_string(),
                mountpoint: fields.next()?.to_string(),
                fstype: fields.next()?.to_string(),
                options: fields.next().unwrap_or("defaults").to_string(),
            })
        })
        .collect()
}

pub fn root_entry(entries: &[FstabEntry]) -> Option<&FstabEntry> {
    entries.iter().find(|e| e.mountpoint == "/")
}

pub struct GenerateFstab;

impl GenerateFstab {
    fn genfstab(&self, ctx: &InstallContext) -> Result<String> {
        let root = ctx.target_root();
        let out = ctx.run(
            &CommandSpec::new("genfstab", ["-U", root.as_str()])
                .capture()
                .operation(Operation::GenerateFstab)
                .no_spinner(),
        )?;
        Ok(out.stdout)
    }

    /// The fstab to check: the written file, or in a dry run what would be written
    fn current_fstab(&self, ctx: &InstallContext) -> Result<String> {
        if ctx.dry_run {
            self.genfstab(ctx)
        } else {
            Ok(ctx.target.read(FSTAB_PATH)?)
        }
    }
}

impl Step for GenerateFstab {
    fn id(&self) -> InstallStep {
        InstallStep::GenerateFstab
    }

    fn run(&self, ctx: &mut InstallContext) -> Result<()> {
        ui::step_info("Generating fstab...");
        let fstab = self.genfstab(ctx).context("genfstab failed")?;
        if fstab.trim().is_empty() {
            anyhow::bail!("genfstab produced no output; is the target mounted?");
        }
        ctx.target.write(FSTAB_PATH, &fstab)?;
        Ok(())
    }

    fn verify(&self, ctx: &InstallContext) -> Result<()> {
        let layout = ctx.layout()?;
        let verifier = ctx.verifier();
        let content = self.current_fstab(ctx).context("Failed to read fstab")?;
        let entries = parse_fstab(&content);
        let root = root_entry(&entries);

        verifier.check(root.is_some(), "fstab has a root (/) entry", true)?;
        let Some(root) = root else {
            return Ok(());
        };
        let fstype = layout.filesystem.to_string_static();
        verifier.check(
            root.fstype == fstype,
            &format!("fstab root filesystem is {} (found {})", fstype, root.fstype),
            true,
        )?;
        verifier.check(root.uuid().is_some(), "fstab root entry uses a UUID", true)?;
        if let Some((subvol, _)) = layout.subvolumes().first() {
            let wanted = format!("subvol=/{}", subvol);
            verifier.check(
                root.options.split(',').any(|o| o == wanted),
                &format!("fstab root entry mounts {}", wanted),
                true,
            )?;
        }
        verifier.check(
            entries.iter().any(|e| e.mountpoint == "/boot"),
            "fstab has a /boot entry",
            true,
        )?;
        Ok(())
    }
}
