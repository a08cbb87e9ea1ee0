use super::{InstallReceipt, Platform};
use crate::config::Config;
use crate::error::{ElevationError, PlatformError};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Inert platform layer.
///
/// Every side effect succeeds without touching the system. PATH edits are
/// kept in memory so the add/remove/contains contract still holds.
#[derive(Debug, Default)]
pub struct NoopPlatform {
    path: Mutex<Vec<PathBuf>>,
    elevated: bool,
}

impl NoopPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend the process already runs with elevated privileges.
    pub fn elevated() -> Self {
        Self {
            elevated: true,
            ..Self::default()
        }
    }

    /// Current in-memory PATH entries.
    pub fn path_entries(&self) -> Vec<PathBuf> {
        self.path.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Platform for NoopPlatform {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn initialize(&mut self, config: &Config) -> Result<(), PlatformError> {
        log::debug!("No-op platform initialized for {}", config.app_name);
        Ok(())
    }

    fn check_requirements(&self, _config: &Config) -> Result<(), PlatformError> {
        Ok(())
    }

    fn is_elevated(&self) -> bool {
        self.elevated
    }

    fn requires_elevation(&self, _target: &Path) -> bool {
        false
    }

    fn request_elevation(&self) -> Result<(), ElevationError> {
        if self.elevated {
            Ok(())
        } else {
            Err(ElevationError::Unavailable)
        }
    }

    fn register_with_os(&self, receipt: &InstallReceipt) -> Result<(), PlatformError> {
        log::debug!("Skipping OS registration of {}", receipt.app_name);
        Ok(())
    }

    fn create_shortcuts(&self, _config: &Config) -> Result<(), PlatformError> {
        Ok(())
    }

    fn register_uninstaller(&self, _receipt: &InstallReceipt) -> Result<(), PlatformError> {
        Ok(())
    }

    fn add_to_path(&self, dir: &Path) -> Result<(), PlatformError> {
        let mut path = self.path.lock().unwrap_or_else(PoisonError::into_inner);
        if !path.iter().any(|p| p == dir) {
            path.push(dir.to_path_buf());
        }
        Ok(())
    }

    fn remove_from_path(&self, dir: &Path) -> Result<(), PlatformError> {
        self.path
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|p| p != dir);
        Ok(())
    }

    fn is_in_path(&self, dir: &Path) -> Result<bool, PlatformError> {
        Ok(self
            .path
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|p| p == dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_add_twice_keeps_one_entry() {
        let platform = NoopPlatform::new();
        let dir = Path::new("/opt/acme/bin");

        platform.add_to_path(dir).unwrap();
        platform.add_to_path(dir).unwrap();
        assert_eq!(platform.path_entries(), vec![PathBuf::from(dir)]);
        assert!(platform.is_in_path(dir).unwrap());

        platform.remove_from_path(dir).unwrap();
        assert!(!platform.is_in_path(dir).unwrap());
    }

    #[test]
    fn test_elevation_depends_on_construction() {
        assert!(NoopPlatform::new().request_elevation().is_err());
        assert!(NoopPlatform::elevated().request_elevation().is_ok());
        assert!(!NoopPlatform::new().requires_elevation(Path::new("/usr/local")));
    }
}
