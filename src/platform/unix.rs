//! Linux and macOS integration
//!
//! Elevation goes through `pkexec` (graphical sessions) or `sudo`, re-running
//! the current executable with the same arguments and exiting with the
//! child's status. Everything else is plain files:
//!
//! - PATH: a line in the user's shell start-up file, or a system snippet
//!   (`/etc/profile.d/<app>.sh` on Linux, `/etc/paths.d/<app>` on macOS)
//! - shortcuts: an XDG `.desktop` entry
//! - OS registration: a JSON receipt under the data directory
//! - uninstaller: a JSON manifest inside the install directory

use super::{app_slug, binary_exists, InstallReceipt, LineStyle, PathListFile, Platform};
use crate::config::Config;
use crate::disk;
use crate::error::{ElevationError, PlatformError};
use serde::{Deserialize, Serialize};
use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Name of the uninstall manifest written into the install directory.
pub const UNINSTALL_MANIFEST: &str = ".setupflow-uninstall.json";

#[cfg(target_os = "macos")]
const SYSTEM_PREFIXES: &[&str] = &["/Applications", "/Library", "/System", "/usr", "/opt"];

#[cfg(not(target_os = "macos"))]
const SYSTEM_PREFIXES: &[&str] = &[
    "/usr", "/opt", "/etc", "/bin", "/sbin", "/lib", "/lib64", "/var", "/srv", "/boot",
];

/// pkexec exit codes for a dismissed or refused authentication dialog.
const PKEXEC_DISMISSED: i32 = 126;
const PKEXEC_NOT_AUTHORIZED: i32 = 127;

/// Whose files get modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallScope {
    /// The invoking user's home directory
    User,
    /// System-wide locations, requires root
    System,
    /// System when running as root, user otherwise
    #[default]
    Auto,
}

/// Every file location the platform layer writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnixLayout {
    pub user_profile: PathListFile,
    pub system_profile: PathListFile,
    pub user_applications: PathBuf,
    pub system_applications: PathBuf,
    pub user_data: PathBuf,
    pub system_data: PathBuf,
}

impl UnixLayout {
    /// Standard locations for a user with the given home and login shell.
    pub fn standard(home: &Path, shell: Option<&str>, slug: &str) -> Self {
        let shell_name = shell
            .and_then(|s| Path::new(s).file_name())
            .and_then(|n| n.to_str());
        let rc = match shell_name {
            Some("zsh") => ".zshrc",
            Some("bash") => ".bashrc",
            _ => ".profile",
        };

        let system_profile = if cfg!(target_os = "macos") {
            PathListFile::new(Path::new("/etc/paths.d").join(slug), LineStyle::Plain)
        } else {
            PathListFile::new(
                Path::new("/etc/profile.d").join(format!("{slug}.sh")),
                LineStyle::Export,
            )
        };

        Self {
            user_profile: PathListFile::new(home.join(rc), LineStyle::Export),
            system_profile,
            user_applications: home.join(".local/share/applications"),
            system_applications: PathBuf::from("/usr/share/applications"),
            user_data: home.join(".local/share").join(slug),
            system_data: Path::new("/var/lib").join(slug),
        }
    }

    /// Same shape as [`UnixLayout::standard`] but entirely below `root`.
    pub fn rooted(root: &Path, slug: &str) -> Self {
        let home = root.join("home");
        Self {
            user_profile: PathListFile::new(home.join(".profile"), LineStyle::Export),
            system_profile: PathListFile::new(
                root.join("etc/profile.d").join(format!("{slug}.sh")),
                LineStyle::Export,
            ),
            user_applications: home.join(".local/share/applications"),
            system_applications: root.join("usr/share/applications"),
            user_data: home.join(".local/share").join(slug),
            system_data: root.join("var/lib").join(slug),
        }
    }
}

/// What `register_uninstaller` leaves in the install directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UninstallManifest {
    #[serde(flatten)]
    pub receipt: InstallReceipt,
    pub receipt_file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desktop_entry: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct UnixPlatform {
    app_name: String,
    slug: String,
    layout: UnixLayout,
    scope: InstallScope,
    elevated: bool,
}

impl UnixPlatform {
    /// Standard layout for the invoking user, scope decided by privileges.
    pub fn for_current_user(app_name: &str) -> Result<Self, PlatformError> {
        let home = env::var_os("HOME")
            .map(PathBuf::from)
            .ok_or_else(|| PlatformError::Requirement("HOME is not set".to_string()))?;
        let shell = env::var("SHELL").ok();
        let slug = app_slug(app_name);
        let layout = UnixLayout::standard(&home, shell.as_deref(), &slug);
        Ok(Self::with_layout(app_name, layout, InstallScope::Auto))
    }

    pub fn with_layout(app_name: &str, layout: UnixLayout, scope: InstallScope) -> Self {
        Self {
            app_name: app_name.to_string(),
            slug: app_slug(app_name),
            layout,
            scope,
            elevated: nix::unistd::geteuid().is_root(),
        }
    }

    pub fn layout(&self) -> &UnixLayout {
        &self.layout
    }

    /// `Auto` resolved against the current privileges.
    pub fn scope(&self) -> InstallScope {
        match self.scope {
            InstallScope::Auto if self.elevated => InstallScope::System,
            InstallScope::Auto => InstallScope::User,
            fixed => fixed,
        }
    }

    fn is_system(&self) -> bool {
        self.scope() == InstallScope::System
    }

    fn path_file(&self) -> &PathListFile {
        if self.is_system() {
            &self.layout.system_profile
        } else {
            &self.layout.user_profile
        }
    }

    fn data_dir(&self) -> &Path {
        if self.is_system() {
            &self.layout.system_data
        } else {
            &self.layout.user_data
        }
    }

    fn applications_dir(&self) -> &Path {
        if self.is_system() {
            &self.layout.system_applications
        } else {
            &self.layout.user_applications
        }
    }

    pub fn receipt_file(&self) -> PathBuf {
        self.data_dir()
            .join("receipts")
            .join(format!("{}.json", self.slug))
    }

    pub fn desktop_entry(&self) -> PathBuf {
        self.applications_dir().join(format!("{}.desktop", self.slug))
    }

    fn desktop_entry_content(&self, config: &Config, exec: &Path) -> String {
        let mut entry = String::from("[Desktop Entry]\nType=Application\n");
        entry.push_str(&format!("Name={}\n", config.app_name));
        if let Some(publisher) = &config.publisher {
            entry.push_str(&format!("Comment={} {}\n", publisher, config.app_name));
        }
        entry.push_str(&format!("Exec=\"{}\"\n", exec.display()));
        entry.push_str(&format!("Path={}\n", config.install_dir.display()));
        entry.push_str("Terminal=false\n");
        entry
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PlatformError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

impl Platform for UnixPlatform {
    fn name(&self) -> &'static str {
        if cfg!(target_os = "macos") {
            "macos"
        } else {
            "unix"
        }
    }

    fn initialize(&mut self, config: &Config) -> Result<(), PlatformError> {
        self.scope = self.scope();
        log::info!(
            "Platform '{}' ready for {} ({:?} scope)",
            self.name(),
            config.app_name,
            self.scope
        );
        Ok(())
    }

    fn check_requirements(&self, config: &Config) -> Result<(), PlatformError> {
        if !config.install_dir.is_absolute() {
            return Err(PlatformError::Requirement(format!(
                "install directory {} is not absolute",
                config.install_dir.display()
            )));
        }
        match disk::nearest_existing_ancestor(&config.install_dir) {
            Some(anchor) if anchor.is_dir() => Ok(()),
            Some(anchor) => Err(PlatformError::Requirement(format!(
                "{} exists and is not a directory",
                anchor.display()
            ))),
            None => Err(PlatformError::Requirement(format!(
                "no existing parent for {}",
                config.install_dir.display()
            ))),
        }
    }

    fn is_elevated(&self) -> bool {
        self.elevated
    }

    fn requires_elevation(&self, target: &Path) -> bool {
        if SYSTEM_PREFIXES.iter().any(|prefix| target.starts_with(prefix)) {
            return true;
        }
        let Some(anchor) = disk::nearest_existing_ancestor(target) else {
            return false;
        };
        match disk::probe_writable(&anchor) {
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => true,
            Err(e) => {
                log::debug!("Write probe in {} failed: {}", anchor.display(), e);
                false
            }
            Ok(()) => false,
        }
    }

    fn request_elevation(&self) -> Result<(), ElevationError> {
        if self.elevated {
            return Ok(());
        }

        let graphical = env::var_os("DISPLAY").is_some() || env::var_os("WAYLAND_DISPLAY").is_some();
        let launcher = if graphical && binary_exists("pkexec") {
            "pkexec"
        } else if binary_exists("sudo") {
            "sudo"
        } else {
            return Err(ElevationError::Unavailable);
        };

        let exe = env::current_exe().map_err(|e| ElevationError::Failed(e.to_string()))?;
        let args: Vec<OsString> = env::args_os().skip(1).collect();
        let code = hand_off(OsStr::new(launcher), &exe, &args)?;
        log::info!("Elevated process finished with status {}", code);
        std::process::exit(code)
    }

    fn register_with_os(&self, receipt: &InstallReceipt) -> Result<(), PlatformError> {
        let file = self.receipt_file();
        write_json(&file, receipt)?;
        log::info!("Install receipt written to {}", file.display());
        Ok(())
    }

    fn create_shortcuts(&self, config: &Config) -> Result<(), PlatformError> {
        if cfg!(target_os = "macos") {
            return Err(PlatformError::Unsupported {
                platform: "macos",
                operation: "desktop shortcuts",
            });
        }
        let exec = config.executable_path().ok_or_else(|| {
            PlatformError::Requirement("shortcuts need an executable".to_string())
        })?;

        let entry = self.desktop_entry();
        if let Some(parent) = entry.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&entry, self.desktop_entry_content(config, &exec))?;
        log::info!("Desktop entry written to {}", entry.display());
        Ok(())
    }

    fn register_uninstaller(&self, receipt: &InstallReceipt) -> Result<(), PlatformError> {
        let desktop_entry = self.desktop_entry();
        let manifest = UninstallManifest {
            receipt: receipt.clone(),
            receipt_file: self.receipt_file(),
            path_file: receipt
                .path_entry
                .as_ref()
                .map(|_| self.path_file().path().to_path_buf()),
            desktop_entry: desktop_entry.exists().then_some(desktop_entry),
        };
        let file = receipt.install_dir.join(UNINSTALL_MANIFEST);
        write_json(&file, &manifest)?;
        log::info!("Uninstall manifest written to {}", file.display());
        Ok(())
    }

    fn add_to_path(&self, dir: &Path) -> Result<(), PlatformError> {
        self.path_file().add(dir)?;
        Ok(())
    }

    fn remove_from_path(&self, dir: &Path) -> Result<(), PlatformError> {
        self.path_file().remove(dir)?;
        Ok(())
    }

    fn is_in_path(&self, dir: &Path) -> Result<bool, PlatformError> {
        Ok(self.path_file().contains(dir)?)
    }
}

/// Run `exe` through `launcher` and return the elevated child's exit code.
///
/// sudo is asked to authenticate with `-v` first, so a rejected password
/// comes back as `Denied` instead of being mistaken for the child's status.
/// pkexec reports a refused dialog through its own exit codes.
fn hand_off(launcher: &OsStr, exe: &Path, args: &[OsString]) -> Result<i32, ElevationError> {
    let name = Path::new(launcher)
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or_default();
    let spawn_failed =
        |e: io::Error| ElevationError::Failed(format!("{}: {e}", launcher.to_string_lossy()));

    if name == "sudo" {
        let auth = Command::new(launcher).arg("-v").status().map_err(spawn_failed)?;
        if !auth.success() {
            log::warn!("sudo authentication failed ({})", auth);
            return Err(ElevationError::Denied);
        }
    }

    log::info!("Re-launching {} through {}", exe.display(), name);
    let status = Command::new(launcher)
        .arg(exe)
        .args(args)
        .status()
        .map_err(spawn_failed)?;

    match status.code() {
        Some(PKEXEC_DISMISSED | PKEXEC_NOT_AUTHORIZED) if name == "pkexec" => {
            Err(ElevationError::Denied)
        }
        Some(code) => Ok(code),
        None => Err(ElevationError::Failed(
            "elevated process was terminated by a signal".to_string(),
        )),
    }
}
