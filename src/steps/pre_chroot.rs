//! Step 6: write configuration files into the target before chrooting

use crate::config::{UserConfig, keys};
use crate::context::InstallContext;
use crate::install_state::InstallStep;
use crate::orchestrator::Step;
use crate::target_fs::uncomment_line;
use crate::ui;
use anyhow::{Context, Result};

pub const LOADER_CONF: &str = "default arch.conf\ntimeout 3\nconsole-mode max\neditor no\n";
pub const WHEEL_RULE: &str = "%wheel ALL=(ALL:ALL) ALL";
pub const SUDOERS_DROPIN: &str = "/etc/sudoers.d/10-wheel";
pub const DCONF_PROFILE: &str = "user-db:user\nsystem-db:local\n";
pub const DCONF_HIDPI: &str = "/etc/dconf/db/local.d/00-hidpi-fractional-scaling";

pub fn hosts_file(hostname: &str) -> String {
    format!(
        "127.0.0.1\tlocalhost\n::1\t\tlocalhost\n127.0.1.1\t{0}.localdomain\t{0}\n",
        hostname
    )
}

pub fn zram_generator_conf(fraction: &str) -> String {
    format!(
        "[zram0]\nzram-fraction = {}\ncompression-algorithm = zstd\n",
        fraction
    )
}

pub fn gdm_autologin(username: &str) -> String {
    format!(
        "[daemon]\nAutomaticLoginEnable=True\nAutomaticLogin={}\n",
        username
    )
}

pub fn dconf_hidpi() -> &'static str {
    "[org/gnome/mutter]\nexperimental-features=['scale-monitor-framebuffer']\n"
}

pub fn editor_profile() -> &'static str {
    "export EDITOR=nvim\nexport VISUAL=nvim\n"
}

/// Point makepkg at the configured `-march`
pub fn tune_makepkg(content: &str, march: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    for line in content.lines() {
        if line.trim_start().starts_with("CFLAGS=") {
            out.push(
                line.replace("-march=x86-64 -mtune=generic", &format!("-march={} -mtune=native", march))
                    .replace("-march=x86-64 ", &format!("-march={} ", march)),
            );
        } else {
            out.push(line.to_string());
        }
    }
    let mut result = out.join("\n");
    if content.ends_with('\n') {
        result.push('\n');
    }
    result
}

/// Add the `lvm2` hook before `filesystems` in the HOOKS line
pub fn add_lvm2_hook(content: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("HOOKS=") && !trimmed.contains("lvm2") {
            let updated = if line.contains("block filesystems") {
                line.replacen("block filesystems", "block lvm2 filesystems", 1)
            } else {
                line.replacen("filesystems", "lvm2 filesystems", 1)
            };
            out.push(updated);
        } else {
            out.push(line.to_string());
        }
    }
    let mut result = out.join("\n");
    if content.ends_with('\n') {
        result.push('\n');
    }
    result
}

pub struct PreChrootFiles;

impl PreChrootFiles {
    fn write_locale(&self, ctx: &InstallContext) -> Result<()> {
        let c = &ctx.config;
        ctx.target
            .write("/etc/locale.gen", &format!("{}\n", c.text(keys::LOCALE_GEN)))?;
        ctx.target
            .write("/etc/locale.conf", &format!("LANG={}\n", c.text(keys::LOCALE_LANG)))?;
        ctx.target.write(
            "/etc/vconsole.conf",
            &format!("KEYMAP={}\n", c.text(keys::VCONSOLE_KEYMAP)),
        )?;
        Ok(())
    }

    fn write_network(&self, ctx: &InstallContext) -> Result<()> {
        let hostname = ctx.config.text(keys::HOSTNAME);
        ctx.target.write("/etc/hostname", &format!("{}\n", hostname))?;
        ctx.target.write("/etc/hosts", &hosts_file(&hostname))?;
        Ok(())
    }

    fn write_desktop(&self, ctx: &InstallContext, config: &UserConfig) -> Result<()> {
        if !config.desktop()?.is_graphical() {
            return Ok(());
        }
        ctx.target
            .write("/etc/gdm/custom.conf", &gdm_autologin(&config.text(keys::USERNAME)))?;
        ctx.target.write("/etc/dconf/profile/user", DCONF_PROFILE)?;
        ctx.target.write(DCONF_HIDPI, dconf_hidpi())?;
        Ok(())
    }

    fn tune_packaging(&self, ctx: &InstallContext) -> Result<()> {
        ctx.target
            .edit("/etc/pacman.conf", |c| uncomment_line(c, "Color"))?;
        ctx.target
            .edit("/etc/pacman.conf", |c| uncomment_line(c, "ParallelDownloads = 5"))?;
        let march = ctx.config.text(keys::CPU_MARCH);
        ctx.target
            .edit("/etc/makepkg.conf", |c| tune_makepkg(c, &march))?;
        Ok(())
    }
}

impl Step for PreChrootFiles {
    fn id(&self) -> InstallStep {
        InstallStep::PreChrootFiles
    }

    fn run(&self, ctx: &mut InstallContext) -> Result<()> {
        let config = ctx.config.clone();
        ui::step_info("Writing locale, console and hostname files...");
        self.write_locale(ctx)?;
        self.write_network(ctx)?;
        ctx.target
            .write_with_mode("/etc/profile.d/editor.sh", editor_profile(), 0o755)?;

        ui::step_info("Configuring systemd-boot loader...");
        ctx.target.write("/boot/loader/loader.conf", LOADER_CONF)?;

        self.write_desktop(ctx, &config)?;

        ui::step_info("Tuning pacman and makepkg...");
        self.tune_packaging(ctx)?;

        ui::step_info("Adding lvm2 to the initramfs hooks...");
        ctx.target
            .edit("/etc/mkinitcpio.conf", add_lvm2_hook)
            .context("Failed to update mkinitcpio.conf")?;

        ctx.target.write(
            "/etc/systemd/zram-generator.conf",
            &zram_generator_conf(&config.text(keys::ZRAM_FRACTION)),
        )?;

        ui::step_info("Granting the wheel group sudo access...");
        ctx.target
            .write_with_mode(SUDOERS_DROPIN, &format!("{}\n", WHEEL_RULE), 0o440)?;
        ctx.target
            .edit("/etc/sudoers", |c| uncomment_line(c, WHEEL_RULE))?;

        ui::success("Configuration files written.");
        Ok(())
    }

    fn verify(&self, ctx: &InstallContext) -> Result<()> {
        let verifier = ctx.verifier();
        let hooks_ok = ctx.dry_run
            || ctx
                .target
                .read("/etc/mkinitcpio.conf")
                .map(|c| c.lines().any(|l| l.trim_start().starts_with("HOOKS=") && l.contains("lvm2")))
                .unwrap_or(false);
        verifier.check(hooks_ok, "mkinitcpio HOOKS include lvm2", true)?;
        let loader_ok = ctx.dry_run || ctx.target.exists("/boot/loader/loader.conf");
        verifier.check(loader_ok, "systemd-boot loader.conf written", false)?;
        Ok(())
    }
}
