//! Platform integration layer
//!
//! Everything that touches the operating system in a way that is hard to
//! undo lives behind the [`Platform`] trait: privilege elevation, PATH
//! mutation, shortcuts, and registration with the OS.
//!
//! # Implementations
//!
//! | Type | Targets | PATH strategy |
//! |------|---------|---------------|
//! | `UnixPlatform` | Linux, macOS, other unix | shell start-up file (user), `/etc/profile.d` (Linux system), `/etc/paths.d` (macOS system) |
//! | `WindowsPlatform` | Windows | `HKCU\Environment\Path` |
//! | `NoopPlatform` | anything else, tests | in-memory list |
//!
//! Whatever the strategy, PATH edits obey one contract: adding twice leaves a
//! single entry, removal matches whole entries only, and `is_in_path`
//! reflects the persisted configuration.

mod noop;
mod path_list;
#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

pub use noop::NoopPlatform;
pub use path_list::{LineStyle, PathListFile};
#[cfg(unix)]
pub use unix::{InstallScope, UninstallManifest, UnixLayout, UnixPlatform, UNINSTALL_MANIFEST};
#[cfg(windows)]
pub use windows::WindowsPlatform;

use crate::config::Config;
use crate::error::{ElevationError, PlatformError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

/// What the OS registration and uninstaller entries record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub app_name: String,
    pub app_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    pub install_dir: PathBuf,
    pub components: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_entry: Option<PathBuf>,
    /// Seconds since the UNIX epoch
    pub installed_at: u64,
}

impl InstallReceipt {
    pub fn from_config(config: &Config) -> Self {
        let installed_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            app_name: config.app_name.clone(),
            app_version: config.app_version.clone(),
            publisher: config.publisher.clone(),
            install_dir: config.install_dir.clone(),
            components: config.selected_ids(),
            path_entry: config.path_entry(),
            installed_at,
        }
    }
}

/// Per-OS side effects.
pub trait Platform: Send {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Prepare for a session. Called once before anything else.
    fn initialize(&mut self, config: &Config) -> Result<(), PlatformError>;

    /// Refuse configurations this platform cannot honour.
    fn check_requirements(&self, config: &Config) -> Result<(), PlatformError>;

    fn is_elevated(&self) -> bool;

    /// Whether installing into `target` needs more privileges than the
    /// process has by default.
    fn requires_elevation(&self, target: &Path) -> bool;

    /// Re-launch the current process with elevated privileges.
    ///
    /// On success the original process exits and never returns from this
    /// call. Returns `Ok` without relaunching if already elevated.
    fn request_elevation(&self) -> Result<(), ElevationError>;

    fn register_with_os(&self, receipt: &InstallReceipt) -> Result<(), PlatformError>;

    fn create_shortcuts(&self, config: &Config) -> Result<(), PlatformError>;

    fn register_uninstaller(&self, receipt: &InstallReceipt) -> Result<(), PlatformError>;

    fn add_to_path(&self, dir: &Path) -> Result<(), PlatformError>;

    fn remove_from_path(&self, dir: &Path) -> Result<(), PlatformError>;

    fn is_in_path(&self, dir: &Path) -> Result<bool, PlatformError>;
}

/// Pick the implementation for the running target.
pub fn detect(app_name: &str) -> Box<dyn Platform> {
    detect_for_target(app_name)
}

#[cfg(unix)]
fn detect_for_target(app_name: &str) -> Box<dyn Platform> {
    match UnixPlatform::for_current_user(app_name) {
        Ok(platform) => Box::new(platform),
        Err(e) => {
            log::warn!("Falling back to no-op platform layer: {}", e);
            Box::new(NoopPlatform::new())
        }
    }
}

#[cfg(windows)]
fn detect_for_target(app_name: &str) -> Box<dyn Platform> {
    Box::new(WindowsPlatform::new(app_name))
}

#[cfg(not(any(unix, windows)))]
fn detect_for_target(_app_name: &str) -> Box<dyn Platform> {
    log::warn!("No platform integration for this OS; side effects are disabled");
    Box::new(NoopPlatform::new())
}

/// Lower-case, dash-separated identifier derived from an application name,
/// safe to use as a file name.
pub fn app_slug(app_name: &str) -> String {
    let mut slug = String::with_capacity(app_name.len());
    for c in app_name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("app");
    }
    slug
}

/// Check if a binary is available in PATH
pub(crate) fn binary_exists(name: &str) -> bool {
    let finder = if cfg!(windows) { "where" } else { "which" };
    Command::new(finder)
        .arg(name)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Component;

    #[test]
    fn test_app_slug() {
        assert_eq!(app_slug("Acme Studio 2"), "acme-studio-2");
        assert_eq!(app_slug("  --Tool__X--  "), "tool-x");
        assert_eq!(app_slug("ßß"), "app");
    }

    #[test]
    fn test_receipt_lists_included_components() {
        let config = Config::new("Acme", "1.0", "/opt/acme")
            .with_component(Component::new("core", "Core").required())
            .with_component(Component::new("docs", "Docs").unselected())
            .with_bin_dir("bin");
        let receipt = InstallReceipt::from_config(&config);

        assert_eq!(receipt.components, vec!["core"]);
        assert_eq!(receipt.path_entry, Some(PathBuf::from("/opt/acme/bin")));
        assert!(receipt.installed_at > 0);
    }
}
