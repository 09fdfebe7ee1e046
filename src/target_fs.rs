//! File operations rooted at a directory
//!
//! Steps address files by their absolute path on the installed system
//! (`/etc/hostname`); a [`TargetFs`] maps that onto its root (`/mnt` for the
//! target, `/` for the live ISO). In dry-run mode nothing is touched: writes
//! print a preview, edits of existing files are skipped.

use crate::error::Result;
use crate::ui;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct TargetFs {
    root: PathBuf,
    dry_run: bool,
}

impl TargetFs {
    pub fn new(root: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            root: root.into(),
            dry_run,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root as a command-line argument
    pub fn root_arg(&self) -> String {
        self.root.to_string_lossy().into_owned()
    }

    /// Host path for `path` inside this root
    pub fn path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn shown(&self, path: &str) -> String {
        self.path(path).display().to_string()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.path(path).exists()
    }

    pub fn read(&self, path: &str) -> Result<String> {
        Ok(fs::read_to_string(self.path(path))?)
    }

    /// Create (or overwrite) a file, creating parent directories
    pub fn write(&self, path: &str, content: &str) -> Result<()> {
        let full = self.path(path);
        if self.dry_run {
            ui::write_preview(&self.shown(path), content);
            return Ok(());
        }
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full, content)?;
        ui::success(&format!("Written to file: {}", full.display()));
        Ok(())
    }

    /// [`write`](Self::write) then set permission bits
    pub fn write_with_mode(&self, path: &str, content: &str, mode: u32) -> Result<()> {
        self.write(path, content)?;
        self.set_mode(path, mode)
    }

    pub fn set_mode(&self, path: &str, mode: u32) -> Result<()> {
        if self.dry_run {
            ui::dry_run_command(&format!("chmod {:o} {}", mode, self.shown(path)));
            return Ok(());
        }
        fs::set_permissions(self.path(path), fs::Permissions::from_mode(mode))?;
        Ok(())
    }

    pub fn mkdir(&self, path: &str) -> Result<()> {
        if self.dry_run {
            ui::dry_run_command(&format!("mkdir -p {}", self.shown(path)));
            return Ok(());
        }
        fs::create_dir_all(self.path(path))?;
        debug!(path = %self.shown(path), "directory created");
        Ok(())
    }

    /// Delete a file; a missing file is fine
    pub fn remove(&self, path: &str) -> Result<()> {
        if self.dry_run {
            ui::dry_run_command(&format!("rm -f {}", self.shown(path)));
            return Ok(());
        }
        match fs::remove_file(self.path(path)) {
            Ok(()) => {
                debug!(path = %self.shown(path), "file removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Rewrite an existing file through `edit`.
    ///
    /// Returns `false` without touching anything when the file is missing, the
    /// edit changes nothing, or this is a dry run.
    pub fn edit<F>(&self, path: &str, edit: F) -> Result<bool>
    where
        F: FnOnce(&str) -> String,
    {
        if self.dry_run {
            ui::dry_run_command(&format!("edit {}", self.shown(path)));
            return Ok(false);
        }
        let current = match fs::read_to_string(self.path(path)) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                ui::warn(&format!("{} not found, skipping edit", self.shown(path)));
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        let updated = edit(&current);
        if updated == current {
            debug!(path = %self.shown(path), "already up to date");
            return Ok(false);
        }
        fs::write(self.path(path), updated)?;
        ui::success(&format!("Updated {}", self.shown(path)));
        Ok(true)
    }

    /// Append `block` unless `marker` already appears in the file
    pub fn append_if_missing(&self, path: &str, marker: &str, block: &str) -> Result<bool> {
        self.edit(path, |current| {
            if current.contains(marker) {
                current.to_string()
            } else {
                let sep = if current.is_empty() || current.ends_with('\n') { "" } else { "\n" };
                format!("{}{}{}", current, sep, block)
            }
        })
    }
}

/// Uncomment the first line that is exactly `# <line>` (ignoring surrounding space)
pub fn uncomment_line(content: &str, line: &str) -> String {
    let mut done = false;
    let mut out: Vec<String> = Vec::new();
    for current in content.lines() {
        let trimmed = current.trim();
        if !done
            && trimmed
                .strip_prefix('#')
                .is_some_and(|rest| rest.trim() == line)
        {
            out.push(line.to_string());
            done = true;
        } else {
            out.push(current.to_string());
        }
    }
    let mut result = out.join("\n");
    if content.ends_with('\n') {
        result.push('\n');
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_are_rooted() {
        let fs = TargetFs::new("/mnt", false);
        assert_eq!(fs.path("/etc/hostname"), PathBuf::from("/mnt/etc/hostname"));
        assert_eq!(fs.path("etc/hosts"), PathBuf::from("/mnt/etc/hosts"));
    }

    #[test]
    fn test_write_creates_parents_and_mode() {
        let dir = TempDir::new().unwrap();
        let fs_ = TargetFs::new(dir.path(), false);
        fs_.write_with_mode("/etc/sudoers.d/10-wheel", "%wheel ALL=(ALL:ALL) ALL\n", 0o440)
            .unwrap();
        let path = dir.path().join("etc/sudoers.d/10-wheel");
        assert_eq!(fs::read_to_string(&path).unwrap(), "%wheel ALL=(ALL:ALL) ALL\n");
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o440);
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pacman.conf"), "#Color\n").unwrap();
        let fs_ = TargetFs::new(dir.path(), true);

        fs_.write("/etc/hostname", "box\n").unwrap();
        fs_.mkdir("/home").unwrap();
        assert!(!fs_.edit("/pacman.conf", |_| "Color\n".into()).unwrap());

        assert!(!dir.path().join("etc").exists());
        assert!(!dir.path().join("home").exists());
        assert_eq!(fs::read_to_string(dir.path().join("pacman.conf")).unwrap(), "#Color\n");
    }

    #[test]
    fn test_edit_missing_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let fs_ = TargetFs::new(dir.path(), false);
        assert!(!fs_.edit("/etc/nope", |s| format!("{}x", s)).unwrap());
    }

    #[test]
    fn test_append_if_missing_is_idempotent() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pacman.conf"), "[core]").unwrap();
        let fs_ = TargetFs::new(dir.path(), false);

        assert!(fs_.append_if_missing("/pacman.conf", "[extra-repo]", "[extra-repo]\nServer = x\n").unwrap());
        assert!(!fs_.append_if_missing("/pacman.conf", "[extra-repo]", "[extra-repo]\nServer = x\n").unwrap());
        assert_eq!(
            fs::read_to_string(dir.path().join("pacman.conf")).unwrap(),
            "[core]\n[extra-repo]\nServer = x\n"
        );
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        assert!(TargetFs::new(dir.path(), false).remove("/chroot_script.sh").is_ok());
    }

    #[test]
    fn test_uncomment_line() {
        let sudoers = "root ALL=(ALL:ALL) ALL\n# %wheel ALL=(ALL:ALL) ALL\n";
        assert_eq!(
            uncomment_line(sudoers, "%wheel ALL=(ALL:ALL) ALL"),
            "root ALL=(ALL:ALL) ALL\n%wheel ALL=(ALL:ALL) ALL\n"
        );
        assert_eq!(uncomment_line("#Color\n", "Color"), "Color\n");
        assert_eq!(uncomment_line("Color\n", "Color"), "Color\n");
    }
}
