//! Step 7: configure the target from inside arch-chroot
//!
//! The setup script is rendered from an embedded template, copied into the
//! target and executed with `arch-chroot`. Passwords never reach the script
//! text or the progress file; they travel in the child's environment.

use crate::command::CommandSpec;
use crate::config::{UserConfig, keys};
use crate::context::InstallContext;
use crate::error::InstallError;
use crate::install_state::InstallStep;
use crate::layout::DiskLayout;
use crate::orchestrator::Step;
use crate::resolver::resolve_services;
use crate::ui;
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use tracing::{info, warn};

pub const TEMPLATE: &str = include_str!("../templates/chroot_setup.sh");
pub const SCRIPT_PATH: &str = "/chroot_script.sh";
pub const BOOT_ENTRY: &str = "/boot/loader/entries/arch.conf";

pub const USER_PASSWORD_ENV: &str = "ARCHSTEP_USER_PASSWORD";
pub const ROOT_PASSWORD_ENV: &str = "ARCHSTEP_ROOT_PASSWORD";

const PLACEHOLDER_PREFIX: &str = "__SETUP_";
const PLACEHOLDER_SUFFIX: &str = "__";

/// Escape for use inside single quotes
fn shell_quote_inner(value: &str) -> String {
    value.replace('\'', r"'\''")
}

fn placeholder(key: &str) -> String {
    format!("{}{}{}", PLACEHOLDER_PREFIX, key.to_ascii_uppercase(), PLACEHOLDER_SUFFIX)
}

/// Placeholder names still present in `text`
pub fn unresolved_placeholders(text: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    let mut rest = text;
    while let Some(start) = rest.find(PLACEHOLDER_PREFIX) {
        let after = &rest[start + PLACEHOLDER_PREFIX.len()..];
        let name_len = after
            .find(|c: char| !(c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_'))
            .unwrap_or(after.len());
        let name = after[..name_len].trim_end_matches('_');
        if !name.is_empty() {
            found.insert(name.to_string());
        }
        rest = &after[name_len..];
    }
    found
}

/// Values the template needs beyond the raw config
fn derived_values(config: &UserConfig, layout: &DiskLayout) -> crate::error::Result<Vec<(&'static str, String)>> {
    let rootflags = layout
        .subvolumes()
        .first()
        .map(|(subvol, _)| format!("rootflags=subvol=/{} ", subvol))
        .unwrap_or_default();
    Ok(vec![
        ("root_device", layout.root_device()),
        ("rootflags", rootflags),
        ("services", resolve_services(config)?.join(" ")),
    ])
}

/// Fill every `__SETUP_<KEY>__` placeholder in `template`.
///
/// # Errors
///
/// Fails when a placeholder has no matching config key or derived value.
pub fn render_script(template: &str, config: &UserConfig) -> crate::error::Result<String> {
    let layout = DiskLayout::from_config(config)?;
    let mut script = template.to_string();
    for (key, value) in config.iter() {
        script = script.replace(&placeholder(key), &shell_quote_inner(&value.to_string()));
    }
    for (key, value) in derived_values(config, &layout)? {
        script = script.replace(&placeholder(key), &shell_quote_inner(&value));
    }

    let missing = unresolved_placeholders(&script);
    if !missing.is_empty() {
        return Err(InstallError::config(format!(
            "Chroot script has unresolved placeholders: {}",
            missing.into_iter().collect::<Vec<_>>().join(", ")
        )));
    }
    Ok(script)
}

pub struct ChrootConfigure;

impl ChrootConfigure {
    fn password(&self, ctx: &InstallContext, env_var: &str, who: &str) -> Result<String> {
        if let Ok(value) = std::env::var(env_var)
            && !value.is_empty()
        {
            info!("using {} password from {}", who, env_var);
            return Ok(value);
        }
        if ctx.dry_run {
            return Ok(String::new());
        }
        let value = ctx
            .prompter
            .password(&format!("Password for {}", who))
            .with_context(|| format!("Failed to read the {} password", who))?;
        if value.is_empty() {
            anyhow::bail!(InstallError::config(format!("The {} password cannot be empty", who)));
        }
        Ok(value)
    }
}

impl Step for ChrootConfigure {
    fn id(&self) -> InstallStep {
        InstallStep::ChrootConfigure
    }

    fn run(&self, ctx: &mut InstallContext) -> Result<()> {
        let script = render_script(TEMPLATE, &ctx.config).context("Failed to render chroot script")?;

        let username = ctx.config.text(keys::USERNAME);
        let user_password = self.password(ctx, USER_PASSWORD_ENV, &format!("user '{}'", username))?;
        let root_password = self.password(ctx, ROOT_PASSWORD_ENV, "root")?;

        ctx.target.write_with_mode(SCRIPT_PATH, &script, 0o755)?;

        let root = ctx.target_root();
        let outcome = ctx.run(
            &CommandSpec::new("arch-chroot", [root.as_str(), "/bin/bash", SCRIPT_PATH])
                .env(USER_PASSWORD_ENV, user_password)
                .env(ROOT_PASSWORD_ENV, root_password)
                .no_spinner(),
        );

        if let Err(e) = ctx.target.remove(SCRIPT_PATH) {
            warn!("could not remove {}: {}", SCRIPT_PATH, e);
        }
        outcome.context("Chroot configuration script failed")?;
        ui::success("Chroot configuration complete.");
        Ok(())
    }

    fn verify(&self, ctx: &InstallContext) -> Result<()> {
        let verifier = ctx.verifier();
        let c = &ctx.config;
        let contains = |path: &str, needle: &str| {
            ctx.dry_run || ctx.target.read(path).map(|s| s.contains(needle)).unwrap_or(false)
        };
        let exists = |path: &str| ctx.dry_run || ctx.target.exists(path);

        let hostname = c.text(keys::HOSTNAME);
        verifier.check(contains("/etc/hostname", &hostname), "Hostname is set", true)?;
        verifier.check(contains("/etc/locale.conf", "LANG="), "Locale is configured", true)?;

        let home = format!("/home/{}", c.text(keys::USERNAME));
        verifier.check(exists(&home), &format!("Home directory {} exists", home), true)?;

        verifier.check(exists(BOOT_ENTRY), "systemd-boot entry exists", true)?;
        let kernel = c.text(keys::KERNEL);
        verifier.check(
            exists(&format!("/boot/vmlinuz-{}", kernel)),
            &format!("Kernel image vmlinuz-{} is present", kernel),
            true,
        )?;
        verifier.check(
            exists(&format!("/boot/initramfs-{}.img", kernel)),
            &format!("Initramfs for {} is present", kernel),
            true,
        )?;

        let microcode = c.text(keys::MICROCODE);
        if !microcode.trim().is_empty() {
            verifier.check(
                exists(&format!("/boot/{}.img", microcode)),
                &format!("Microcode image {}.img is present", microcode),
                false,
            )?;
        }
        if c.desktop()?.is_graphical() {
            verifier.check(
                exists(crate::steps::pre_chroot::DCONF_HIDPI),
                "dconf fractional scaling defaults exist",
                false,
            )?;
        }
        if c.flag(keys::ADD_CHAOTIC_AUR) {
            verifier.check(exists("/usr/bin/yay"), "yay is installed", false)?;
        }
        Ok(())
    }
}
