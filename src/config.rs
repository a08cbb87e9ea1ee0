//! Installation configuration
//!
//! `Config` is the static description of one installation: application
//! identity, the component list, the default location, the license text and
//! the policies for elevation and rollback. It is loaded once (usually from a
//! JSON file) and stays read-only during a session, except for the install
//! location and the component selection which the controller writes back.
//!
//! Component and session hooks are closures and therefore never serialized;
//! embedders attach them after loading.

use crate::context::Context;
use crate::types::{ElevationStrategy, RollbackPolicy, WizardMode};
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Safety margin applied to the summed component sizes (20%).
pub const DISK_SPACE_MARGIN_PERCENT: u64 = 120;

/// Default number of retries offered for a failing component.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A caller-supplied step run against the session context.
pub type Hook = Arc<dyn Fn(&Context) -> anyhow::Result<()> + Send + Sync>;

/// Validate/install/uninstall hooks of one component.
#[derive(Clone, Default)]
pub struct ComponentHooks {
    pub validator: Option<Hook>,
    pub installer: Option<Hook>,
    pub uninstaller: Option<Hook>,
}

impl fmt::Debug for ComponentHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHooks")
            .field("validator", &self.validator.is_some())
            .field("installer", &self.installer.is_some())
            .field("uninstaller", &self.uninstaller.is_some())
            .finish()
    }
}

/// Hooks run around the component loop.
#[derive(Clone, Default)]
pub struct SessionHooks {
    pub pre_install: Option<Hook>,
    pub post_install: Option<Hook>,
}

impl fmt::Debug for SessionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHooks")
            .field("pre_install", &self.pre_install.is_some())
            .field("post_install", &self.post_install.is_some())
            .finish()
    }
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// An installable unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    /// Unique within a config
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Required components are always installed
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_true")]
    pub selected: bool,
    /// Installed size in bytes
    #[serde(default)]
    pub size: u64,
    /// Payload to copy into the install directory (file-backed components)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    #[serde(skip)]
    pub hooks: ComponentHooks,
}

impl Component {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            required: false,
            selected: true,
            size: 0,
            source: None,
            hooks: ComponentHooks::default(),
        }
    }

    /// Mark as required. Required components are also selected.
    pub fn required(mut self) -> Self {
        self.required = true;
        self.selected = true;
        self
    }

    pub fn unselected(mut self) -> Self {
        self.selected = false;
        self
    }

    pub fn with_size(mut self, bytes: u64) -> Self {
        self.size = bytes;
        self
    }

    pub fn with_description(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    pub fn validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.validator = Some(Arc::new(f));
        self
    }

    pub fn installer<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.installer = Some(Arc::new(f));
        self
    }

    pub fn uninstaller<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.uninstaller = Some(Arc::new(f));
        self
    }

    /// Selected or required.
    #[inline]
    pub fn is_included(&self) -> bool {
        self.selected || self.required
    }
}

/// Static install parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub components: Vec<Component>,
    pub install_dir: PathBuf,
    /// License text; empty skips the license step
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub elevation: ElevationStrategy,
    #[serde(default)]
    pub rollback: RollbackPolicy,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub mode: WizardMode,
    /// Minimum free bytes required at the install location
    #[serde(default)]
    pub min_free_space: Option<u64>,
    /// Directory (relative to `install_dir`) to put on PATH
    #[serde(default)]
    pub bin_dir: Option<PathBuf>,
    /// Main executable (relative to `install_dir`) used for shortcuts
    #[serde(default)]
    pub executable: Option<PathBuf>,
    #[serde(default)]
    pub create_shortcuts: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Offered by the optional theme step
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(skip)]
    pub hooks: SessionHooks,
}

impl Config {
    pub fn new(
        app_name: impl Into<String>,
        app_version: impl Into<String>,
        install_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            app_version: app_version.into(),
            publisher: None,
            components: Vec::new(),
            install_dir: install_dir.into(),
            license: String::new(),
            elevation: ElevationStrategy::default(),
            rollback: RollbackPolicy::default(),
            dry_run: false,
            mode: WizardMode::default(),
            min_free_space: None,
            bin_dir: None,
            executable: None,
            create_shortcuts: false,
            max_retries: DEFAULT_MAX_RETRIES,
            themes: Vec::new(),
            hooks: SessionHooks::default(),
        }
    }

    pub fn with_component(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    pub fn with_license(mut self, text: impl Into<String>) -> Self {
        self.license = text.into();
        self
    }

    pub fn with_mode(mut self, mode: WizardMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_elevation(mut self, strategy: ElevationStrategy) -> Self {
        self.elevation = strategy;
        self
    }

    pub fn with_rollback(mut self, policy: RollbackPolicy) -> Self {
        self.rollback = policy;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_bin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = Some(dir.into());
        self
    }

    pub fn with_themes<I, S>(mut self, themes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.themes = themes.into_iter().map(Into::into).collect();
        self
    }

    pub fn on_pre_install<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.pre_install = Some(Arc::new(f));
        self
    }

    pub fn on_post_install<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.post_install = Some(Arc::new(f));
        self
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file. Required components are
    /// normalized to selected.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let mut config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;
        config.normalize();

        Ok(config)
    }

    /// Force every required component into the selection.
    pub fn normalize(&mut self) {
        for component in self.components.iter_mut().filter(|c| c.required) {
            component.selected = true;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.app_name.trim().is_empty() {
            anyhow::bail!("Application name must be specified");
        }
        if self.app_version.trim().is_empty() {
            anyhow::bail!("Application version must be specified");
        }
        if self.install_dir.as_os_str().is_empty() {
            anyhow::bail!("Default install directory must be specified");
        }

        let mut seen = HashSet::new();
        for component in &self.components {
            if component.id.trim().is_empty() {
                anyhow::bail!("Component '{}' has an empty id", component.name);
            }
            if !seen.insert(component.id.as_str()) {
                anyhow::bail!("Component id '{}' is declared more than once", component.id);
            }
            if component.required && !component.selected {
                anyhow::bail!("Required component '{}' cannot be unselected", component.id);
            }
        }

        for (label, path) in [("bin_dir", &self.bin_dir), ("executable", &self.executable)] {
            if let Some(p) = path {
                if p.is_absolute() {
                    anyhow::bail!("{} must be relative to the install directory", label);
                }
            }
        }

        if self.create_shortcuts && self.executable.is_none() {
            anyhow::bail!("create_shortcuts requires an executable");
        }

        Ok(())
    }

    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.id == id)
    }

    /// Selected or required components, in declaration order.
    pub fn included_components(&self) -> impl Iterator<Item = &Component> {
        self.components.iter().filter(|c| c.is_included())
    }

    pub fn selected_ids(&self) -> Vec<String> {
        self.included_components().map(|c| c.id.clone()).collect()
    }

    pub fn required_ids(&self) -> Vec<String> {
        self.components
            .iter()
            .filter(|c| c.required)
            .map(|c| c.id.clone())
            .collect()
    }

    /// Apply a selection. Required components stay selected whatever the
    /// caller passed; unknown ids are ignored. Returns the effective selection.
    pub fn set_selected<S: AsRef<str>>(&mut self, ids: &[S]) -> Vec<String> {
        let wanted: HashSet<&str> = ids.iter().map(AsRef::as_ref).collect();
        for component in &mut self.components {
            component.selected = component.required || wanted.contains(component.id.as_str());
        }
        self.selected_ids()
    }

    /// Summed size of the included components.
    pub fn included_bytes(&self) -> u64 {
        self.included_components().map(|c| c.size).sum()
    }

    /// Space needed for the included components including the safety margin.
    pub fn required_space(&self) -> u64 {
        let total = u128::from(self.included_bytes()) * u128::from(DISK_SPACE_MARGIN_PERCENT);
        u64::try_from(total.div_ceil(100)).unwrap_or(u64::MAX)
    }

    /// Absolute directory that should be on PATH after install.
    pub fn path_entry(&self) -> Option<PathBuf> {
        self.bin_dir.as_ref().map(|d| self.install_dir.join(d))
    }

    pub fn executable_path(&self) -> Option<PathBuf> {
        self.executable.as_ref().map(|e| self.install_dir.join(e))
    }
}
