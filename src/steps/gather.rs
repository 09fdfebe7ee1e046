//! Step 0: choose the target drive and core settings

use crate::command::CommandSpec;
use crate::config::keys;
use crate::context::InstallContext;
use crate::dry_run::Operation;
use crate::error::InstallError;
use crate::install_state::InstallStep;
use crate::orchestrator::Step;
use crate::types::RootFilesystem;
use crate::ui;
use anyhow::{Context, Result};
use strum::IntoEnumIterator;
use tracing::{debug, info};

pub const PROCEED_PROMPT: &str = "Proceed with installation plan?";

/// Offered when a dry run finds no disks
pub const PLACEHOLDER_DISK: &str = "/dev/sdX";

/// A whole disk reported by `lsblk`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    pub name: String,
    pub size: String,
    pub model: String,
}

impl BlockDevice {
    pub fn label(&self) -> String {
        if self.model.is_empty() {
            format!("{} ({})", self.name, self.size)
        } else {
            format!("{} ({}, {})", self.name, self.size, self.model)
        }
    }
}

/// Parse `lsblk -dnpo NAME,SIZE,MODEL`, dropping loop, optical, zram and ram devices
pub fn parse_block_devices(output: &str) -> Vec<BlockDevice> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let name = fields.next()?;
            let size = fields.next().unwrap_or_default();
            let model = fields.collect::<Vec<_>>().join(" ");
            Some(BlockDevice {
                name: name.to_string(),
                size: size.to_string(),
                model,
            })
        })
        .filter(|dev| {
            let base = dev.name.trim_start_matches("/dev/");
            !["loop", "sr", "zram", "ram", "fd"]
                .iter()
                .any(|prefix| base.starts_with(prefix))
        })
        .collect()
}

pub struct GatherConfig;

impl GatherConfig {
    fn list_disks(&self, ctx: &InstallContext) -> Result<Vec<BlockDevice>> {
        let spec = CommandSpec::new("lsblk", ["-dnpo", "NAME,SIZE,MODEL"])
            .read_only()
            .probe(Operation::ListBlockDevices)
            .no_spinner();
        let out = ctx.run(&spec).context("Failed to list block devices")?;
        let mut disks = if out.success { parse_block_devices(&out.stdout) } else { Vec::new() };

        if disks.is_empty() && ctx.dry_run {
            ui::warn("No disks found; offering a placeholder for the dry run.");
            disks.push(BlockDevice {
                name: PLACEHOLDER_DISK.to_string(),
                size: "64G".to_string(),
                model: "placeholder".to_string(),
            });
        }
        debug!(count = disks.len(), "block devices found");
        Ok(disks)
    }

    fn select_drive(&self, ctx: &mut InstallContext) -> Result<()> {
        let disks = self.list_disks(ctx)?;
        if disks.is_empty() {
            anyhow::bail!(InstallError::config("No installable disks found"));
        }
        let labels: Vec<String> = disks.iter().map(BlockDevice::label).collect();
        let choice = ctx.prompter.select("Select the target drive", &labels)?;
        let drive = &disks[choice].name;
        info!(drive = %drive, "target drive selected");
        ctx.config.set(keys::TARGET_DRIVE, drive.as_str());
        Ok(())
    }

    fn ask_text(&self, ctx: &mut InstallContext, key: &str, prompt: &str) -> Result<()> {
        let current = ctx.config.text(key);
        let answer = ctx.prompter.input(prompt, &current)?;
        ctx.config.set(key, answer.trim());
        Ok(())
    }

    fn ask_filesystem(&self, ctx: &mut InstallContext) -> Result<()> {
        let current = ctx.config.root_filesystem().unwrap_or_default();
        let mut options: Vec<RootFilesystem> = vec![current];
        options.extend(RootFilesystem::iter().filter(|fs| *fs != current));
        let labels: Vec<String> = options.iter().map(ToString::to_string).collect();
        let choice = ctx.prompter.select("Root filesystem", &labels)?;
        ctx.config.set(keys::ROOT_FILESYSTEM, options[choice].to_string());
        Ok(())
    }

    fn print_summary(&self, ctx: &InstallContext) -> Result<()> {
        ui::section("Installation Plan Summary");
        if ctx.dry_run {
            ui::warn("[DRY RUN MODE - NO DISK CHANGES WILL BE MADE]");
        }
        let c = &ctx.config;
        let rows = [
            ("User", c.text(keys::USERNAME)),
            ("Hostname", c.text(keys::HOSTNAME)),
            ("Target Drive", c.target_drive()),
            ("Timezone", c.text(keys::TIMEZONE)),
            ("Locale", c.text(keys::LOCALE_LANG)),
            ("Keyboard", c.text(keys::VCONSOLE_KEYMAP)),
            ("Kernel", c.text(keys::KERNEL)),
            ("Desktop", c.text(keys::DESKTOP)),
            ("ZRAM Fraction", format!("{} (of total RAM)", c.text(keys::ZRAM_FRACTION))),
            ("CPU Optimization (makepkg)", format!("-march={}", c.text(keys::CPU_MARCH))),
            ("Monospace Font", c.text(keys::MONOSPACE_FONT_PKG)),
            (
                "Add Chaotic-AUR",
                if c.flag(keys::ADD_CHAOTIC_AUR) { "Yes" } else { "No" }.to_string(),
            ),
        ];
        for (label, value) in rows {
            ui::key_value(label, &value);
        }
        println!("{}", ctx.layout()?.summary());
        println!();
        ui::error("CRITICAL WARNING:");
        ui::error(&format!(
            "ALL DATA ON {} WILL BE PERMANENTLY ERASED (if not in dry run).",
            c.target_drive()
        ));
        Ok(())
    }
}

impl Step for GatherConfig {
    fn id(&self) -> InstallStep {
        InstallStep::GatherConfig
    }

    fn run(&self, ctx: &mut InstallContext) -> Result<()> {
        self.select_drive(ctx)?;
        self.ask_text(ctx, keys::HOSTNAME, "Hostname")?;
        self.ask_text(ctx, keys::USERNAME, "Username")?;
        self.ask_text(ctx, keys::TIMEZONE, "Timezone (e.g. Europe/Berlin)")?;
        self.ask_filesystem(ctx)?;
        self.ask_text(ctx, keys::SWAP_SIZE_GB, "Disk swap size in GiB (0 for ZRAM only)")?;

        ctx.config.validate().context("Invalid configuration")?;
        self.print_summary(ctx)?;

        if !ctx.prompter.confirm(PROCEED_PROMPT, false)? {
            ui::warn("Aborted by user.");
            return Err(InstallError::declined(PROCEED_PROMPT).into());
        }
        ui::step_info("Proceeding with installation...");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_block_devices() {
        let out = "/dev/sda 465.8G Samsung SSD 860\n/dev/loop0 795M \n/dev/nvme0n1 1T WD Black\n/dev/sr0 1024M DVD\n/dev/zram0 4G \n";
        let disks = parse_block_devices(out);
        let names: Vec<&str> = disks.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["/dev/sda", "/dev/nvme0n1"]);
        assert_eq!(disks[0].model, "Samsung SSD 860");
        assert_eq!(disks[0].label(), "/dev/sda (465.8G, Samsung SSD 860)");
    }

    #[test]
    fn test_label_without_model() {
        let dev = BlockDevice {
            name: "/dev/vda".into(),
            size: "20G".into(),
            model: String::new(),
        };
        assert_eq!(dev.label(), "/dev/vda (20G)");
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_block_devices("").is_empty());
    }
}
