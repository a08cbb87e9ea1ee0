//! Installer orchestrator
//!
//! Runs one installation session through the fixed stage sequence in
//! [`crate::stage`]:
//!
//! - **PreCheck**: pre-install hook, platform requirements, disk space.
//! - **ElevationCheck**: decide whether privileges are needed, ask the
//!   front-end, hand off to the platform.
//! - **Install**: component loop with checkpoints, retry and rollback.
//! - **PostInstall**: OS registration, PATH, shortcuts, uninstaller and the
//!   post-install hook. Only OS registration is fatal.
//! - **Verify**: sanity checks that only ever warn.
//!
//! A dry run walks every stage and reports progress but skips hooks and
//! platform side effects.

use crate::config::{Component, Config};
use crate::context::Context;
use crate::controller::{InstallRunner, InstallerController};
use crate::disk;
use crate::error::{ElevationError, InstallError, RegistrationWarning, Result, SetupError};
use crate::platform::{self, InstallReceipt, Platform};
use crate::rollback::Checkpoint;
use crate::session::{CancelToken, CompletionNotifier, SessionOutcome};
use crate::stage::{OrchestrationStage, StageTracker};
use crate::types::ElevationStrategy;
use crate::view::{ErrorReport, InstallSummary, Progress, View};
use crate::wizard::WizardProvider;
use anyhow::Context as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a finished (or failed) session.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub app_name: String,
    pub install_dir: PathBuf,
    /// Component ids installed and kept, in install order
    pub installed: Vec<String>,
    pub warnings: Vec<String>,
    pub duration: Duration,
    /// (stage, seconds since UNIX epoch)
    pub stages: Vec<(OrchestrationStage, u64)>,
    pub dry_run: bool,
}

impl InstallReport {
    pub fn final_stage(&self) -> Option<OrchestrationStage> {
        self.stages.last().map(|(s, _)| *s)
    }

    pub fn succeeded(&self) -> bool {
        self.final_stage() == Some(OrchestrationStage::Done)
    }
}

pub struct Orchestrator {
    config: Config,
    platform: Box<dyn Platform>,
    context: Context,
    stages: StageTracker,
    installed: Vec<String>,
    warnings: Vec<String>,
    cancel: CancelToken,
    notifier: Option<CompletionNotifier>,
    initialized: bool,
}

impl Orchestrator {
    /// Orchestrator with the platform layer for the running OS.
    pub fn new(config: Config) -> Self {
        let platform = platform::detect(&config.app_name);
        Self::with_platform(config, platform)
    }

    pub fn with_platform(config: Config, platform: Box<dyn Platform>) -> Self {
        let context = Context::new(&config);
        Self {
            config,
            platform,
            context,
            stages: StageTracker::new(),
            installed: Vec::new(),
            warnings: Vec::new(),
            cancel: CancelToken::new(),
            notifier: None,
            initialized: false,
        }
    }

    /// Cancellation is honoured before the Install stage starts and, in
    /// wizard sessions, between wizard states.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_notifier(mut self, notifier: CompletionNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    pub fn stage(&self) -> OrchestrationStage {
        self.stages.current()
    }

    pub fn stage_tracker(&self) -> &StageTracker {
        &self.stages
    }

    fn dry_run(&self) -> bool {
        self.context.dry_run()
    }

    /// Snapshot of the session so far.
    pub fn report(&self) -> InstallReport {
        InstallReport {
            app_name: self.config.app_name.clone(),
            install_dir: self.config.install_dir.clone(),
            installed: self.installed.clone(),
            warnings: self.warnings.clone(),
            duration: self.context.elapsed(),
            stages: self.stages.history().to_vec(),
            dry_run: self.dry_run(),
        }
    }

    fn summary(&self) -> InstallSummary {
        InstallSummary {
            app_name: self.config.app_name.clone(),
            install_dir: self.config.install_dir.clone(),
            components: self.installed.clone(),
            warnings: self.warnings.clone(),
            dry_run: self.dry_run(),
        }
    }

    fn warn(&mut self, warning: RegistrationWarning) {
        self.context.log().warn(warning.to_string());
        self.warnings.push(warning.to_string());
    }

    /// Prepare the platform layer. Runs once per session.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.context.log().info(format!(
            "Initializing {} platform layer for {} {}",
            self.platform.name(),
            self.config.app_name,
            self.config.app_version
        ));
        self.platform.initialize(&self.config)?;
        self.initialized = true;
        Ok(())
    }

    /// Install the configuration as given, without a wizard.
    pub fn run_unattended(&mut self, view: &mut dyn View) -> Result<InstallReport> {
        let result = self.initialize().and_then(|()| self.execute(view));
        match result {
            Ok(summary) => {
                view.show_complete(&summary)?;
                self.notify(SessionOutcome::Completed);
                Ok(self.report())
            }
            Err(e) => {
                let outcome = match e {
                    SetupError::Cancelled => SessionOutcome::Cancelled,
                    _ => SessionOutcome::Failed,
                };
                self.notify(outcome);
                Err(e)
            }
        }
    }

    /// Walk the provider's wizard; the install runs when it reaches
    /// `installing`. The config chosen in the wizard replaces ours.
    pub fn run_wizard(
        &mut self,
        provider: &dyn WizardProvider,
        view: &mut dyn View,
    ) -> Result<InstallReport> {
        self.initialize()?;

        let config = self.config.clone();
        let log = self.context.log().clone();
        let cancel = self.cancel.clone();
        let notifier = self.notifier.take();
        let dry_run = self.dry_run();

        let mut controller = InstallerController::from_provider(config, provider, view)?
            .with_log(log)
            .with_cancel_token(cancel)
            .with_dry_run(dry_run);
        if let Some(notifier) = notifier {
            controller = controller.with_notifier(notifier);
        }
        let mut controller = controller.with_runner(&mut *self);

        let outcome = controller.run()?;
        drop(controller);

        match outcome {
            SessionOutcome::Completed => Ok(self.report()),
            SessionOutcome::Cancelled => Err(SetupError::Cancelled),
            SessionOutcome::Failed => Err(SetupError::view("wizard ended without installing")),
        }
    }

    fn notify(&mut self, outcome: SessionOutcome) {
        if let Some(notifier) = self.notifier.take() {
            notifier.notify(outcome);
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            self.context.log().warn("Installation cancelled before install");
            return Err(SetupError::Cancelled);
        }
        Ok(())
    }

    /// All stages from PreCheck to Done.
    fn execute(&mut self, view: &mut dyn View) -> Result<InstallSummary> {
        let started = self.stages.current();
        let result = self.run_stages(view);
        if let Err(e) = &result {
            if !self.stages.current().is_terminal() {
                if let Err(stage_err) = self.stages.fail() {
                    log::error!("{}", stage_err);
                }
            }
            self.context.log().error(format!(
                "Installation failed during {}: {}",
                self.stages.failed_at().unwrap_or(started),
                e
            ));
        }
        result.map(|()| self.summary())
    }

    fn run_stages(&mut self, view: &mut dyn View) -> Result<()> {
        self.check_cancelled()?;
        self.stages.transition_to(OrchestrationStage::PreCheck)?;
        self.pre_check()?;

        self.check_cancelled()?;
        self.stages.advance()?;
        self.elevation_check(view)?;

        self.check_cancelled()?;
        self.stages.advance()?;
        self.install_components(view)?;

        self.stages.advance()?;
        self.post_install()?;

        self.stages.advance()?;
        self.verify();

        self.stages.advance()?;
        self.context.log().info(format!(
            "{} installed into {} in {:.1}s",
            self.config.app_name,
            self.config.install_dir.display(),
            self.context.elapsed().as_secs_f64()
        ));
        Ok(())
    }

    fn pre_check(&mut self) -> Result<()> {
        self.config
            .validate()
            .map_err(|e| SetupError::precheck(format!("{:#}", e)))?;

        match self.config.hooks.pre_install.clone() {
            Some(_) if self.dry_run() => {
                self.context.log().info("Dry run: skipping pre-install hook");
            }
            Some(hook) => hook(&self.context)
                .map_err(|e| SetupError::precheck(format!("pre-install hook: {:#}", e)))?,
            None => {}
        }

        self.platform
            .check_requirements(&self.config)
            .map_err(|e| SetupError::precheck(e.to_string()))?;

        let required = self.config.required_space();
        if required == 0 {
            return Ok(());
        }
        let dir = &self.config.install_dir;
        let anchor = disk::nearest_existing_ancestor(dir).ok_or_else(|| {
            SetupError::precheck(format!("{} has no existing parent directory", dir.display()))
        })?;
        match disk::available_space(&anchor) {
            Ok(free) if free < required => Err(SetupError::precheck(format!(
                "not enough disk space at {}: {} bytes required, {} available",
                anchor.display(),
                required,
                free
            ))),
            Ok(free) => {
                log::debug!("{} bytes free at {}, {} required", free, anchor.display(), required);
                Ok(())
            }
            Err(e) => {
                self.context.log().warn(format!(
                    "Could not determine free space at {}: {}",
                    anchor.display(),
                    e
                ));
                Ok(())
            }
        }
    }

    fn elevation_check(&mut self, view: &mut dyn View) -> Result<()> {
        let dir = self.config.install_dir.clone();
        let needed = match self.config.elevation {
            ElevationStrategy::Always => true,
            ElevationStrategy::Never => false,
            ElevationStrategy::Auto => self.platform.requires_elevation(&dir),
        };

        if !needed {
            self.context.log().info("No elevation needed");
            return Ok(());
        }
        if self.platform.is_elevated() {
            self.context.log().info("Already running elevated");
            return Ok(());
        }
        if self.dry_run() {
            self.context.log().info(format!(
                "Dry run: would request elevation for {}",
                dir.display()
            ));
            return Ok(());
        }

        let reason = format!(
            "Installing {} into {} requires administrator privileges",
            self.config.app_name,
            dir.display()
        );
        if !view.request_elevation(&reason)? {
            return Err(ElevationError::Denied.into());
        }
        self.context.log().info("Requesting elevation");
        self.platform.request_elevation()?;
        Ok(())
    }

    fn install_components(&mut self, view: &mut dyn View) -> Result<()> {
        let components: Vec<Component> = self.config.included_components().cloned().collect();
        let total = components.len();
        self.installed.clear();
        self.context.log().info(format!("Installing {} component(s)", total));

        for (index, component) in components.iter().enumerate() {
            if !self.dry_run() {
                if let Some(uninstall) = &component.hooks.uninstaller {
                    self.context
                        .checkpoints_mut()
                        .push(Checkpoint::new(component.id.clone(), Arc::clone(uninstall)));
                }
            }

            let mut attempt = 0;
            loop {
                let Err(e) = self.install_one(component) else {
                    break;
                };
                attempt += 1;
                let message = format!("Failed to install {}: {:#}", component.name, e);
                if attempt <= self.config.max_retries {
                    let report = ErrorReport::new(message.clone(), true);
                    view.show_error_message(&report)?;
                    if view.offer_retry(&report)? {
                        self.context.log().warn(format!(
                            "Retrying '{}' (attempt {})",
                            component.id,
                            attempt + 1
                        ));
                        continue;
                    }
                }

                let err = self.abort(component, format!("{:#}", e));
                view.show_error_message(
                    &ErrorReport::new(err.to_string(), false)
                        .with_warnings(err.rollback_failures.clone()),
                )?;
                return Err(err.into());
            }

            self.installed.push(component.id.clone());
            self.context
                .log()
                .info(format!("Installed '{}'", component.id));
            view.show_progress(&Progress::new(index + 1, total, component.name.clone()))?;
        }

        self.context.checkpoints_mut().clear();
        Ok(())
    }

    fn install_one(&self, component: &Component) -> anyhow::Result<()> {
        if self.dry_run() {
            self.context
                .log()
                .info(format!("Dry run: skipping hooks of '{}'", component.id));
            return Ok(());
        }
        if let Some(validator) = &component.hooks.validator {
            validator(&self.context).context("validation failed")?;
        }
        match &component.hooks.installer {
            Some(installer) => installer(&self.context)?,
            None => log::debug!("Component '{}' has no installer", component.id),
        }
        Ok(())
    }

    /// Give up on `component`: roll back per policy and build the error.
    fn abort(&mut self, component: &Component, message: String) -> InstallError {
        let mut err = InstallError::new(component.id.clone(), message);
        if !self.config.rollback.enabled() {
            self.context.log().warn(format!(
                "Rollback disabled; leaving {} installed component(s) in place",
                self.installed.len()
            ));
            return err;
        }

        self.context.log().warn(format!(
            "Rolling back {} checkpoint(s)",
            self.context.checkpoints().count()
        ));
        if let Err(rollback) = self.context.checkpoints().execute(&self.context) {
            err.rollback_failures = rollback.lines();
        }
        if let Err(e) = self.stages.roll_back() {
            log::error!("{}", e);
        }
        self.installed.clear();
        err
    }

    fn post_install(&mut self) -> Result<()> {
        if self.dry_run() {
            self.context
                .log()
                .info("Dry run: skipping OS registration, PATH, shortcuts and uninstaller");
            return Ok(());
        }

        let receipt = InstallReceipt::from_config(&self.config);
        let registration = self.platform.register_with_os(&receipt);
        if let Err(e) = &registration {
            self.context
                .log()
                .error(format!("OS registration failed: {}", e));
        }

        if let Some(entry) = self.config.path_entry() {
            if let Err(e) = self.platform.add_to_path(&entry) {
                self.warn(RegistrationWarning::new("path", e.to_string()));
            }
        }
        if self.config.create_shortcuts {
            if let Err(e) = self.platform.create_shortcuts(&self.config) {
                self.warn(RegistrationWarning::new("shortcuts", e.to_string()));
            }
        }
        if let Err(e) = self.platform.register_uninstaller(&receipt) {
            self.warn(RegistrationWarning::new("uninstaller", e.to_string()));
        }
        if let Some(hook) = self.config.hooks.post_install.clone() {
            if let Err(e) = hook(&self.context) {
                self.warn(RegistrationWarning::new("post_install", format!("{:#}", e)));
            }
        }

        registration.map_err(|e| SetupError::registration(e.to_string()))
    }

    fn verify(&mut self) {
        if self.dry_run() {
            return;
        }
        let dir = self.config.install_dir.clone();
        if !dir.is_dir() {
            self.warn(RegistrationWarning::new(
                "verify",
                format!("{} does not exist after install", dir.display()),
            ));
        }
        if let Some(entry) = self.config.path_entry() {
            match self.platform.is_in_path(&entry) {
                Ok(true) => {}
                Ok(false) => self.warn(RegistrationWarning::new(
                    "verify",
                    format!("{} is not on PATH", entry.display()),
                )),
                Err(e) => self.warn(RegistrationWarning::new("verify", e.to_string())),
            }
        }
    }
}

impl InstallRunner for Orchestrator {
    fn run_install(&mut self, config: &Config, view: &mut dyn View) -> Result<InstallSummary> {
        self.config = config.clone();
        self.context.set_install_dir(config.install_dir.clone());
        self.execute(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::NoopPlatform;
    use crate::view::{Answers, UnattendedView};

    fn orchestrator(config: Config) -> Orchestrator {
        Orchestrator::with_platform(config, Box::new(NoopPlatform::new()))
    }

    #[test]
    fn test_dry_run_walks_all_stages() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new("Acme", "1.0", dir.path().join("acme"))
            .with_component(Component::new("core", "Core").installer(|_| {
                anyhow::bail!("must not run in a dry run")
            }))
            .with_dry_run(true);
        let mut view = UnattendedView::new(Answers::default());

        let report = orchestrator(config).run_unattended(&mut view).unwrap();
        assert!(report.succeeded());
        assert!(report.dry_run);
        assert_eq!(report.installed, vec!["core"]);
        assert_eq!(view.progress.len(), 1);
        assert!(view.completed.is_some());
    }

    #[test]
    fn test_disk_space_precheck_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new("Acme", "1.0", dir.path().join("acme"))
            .with_component(Component::new("core", "Core").with_size(u64::MAX / 2));
        let mut view = UnattendedView::new(Answers::default());
        let mut orch = orchestrator(config);

        let err = orch.run_unattended(&mut view).unwrap_err();
        assert!(matches!(err, SetupError::PreCheck(_)));
        assert_eq!(orch.stage(), OrchestrationStage::Failed);
        assert_eq!(
            orch.stage_tracker().failed_at(),
            Some(OrchestrationStage::PreCheck)
        );
    }

    #[test]
    fn test_cancel_before_install() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancelToken::new();
        token.cancel();
        let config = Config::new("Acme", "1.0", dir.path().join("acme"))
            .with_component(Component::new("core", "Core"));
        let mut orch = orchestrator(config).with_cancel_token(token);

        let err = orch
            .run_unattended(&mut UnattendedView::new(Answers::default()))
            .unwrap_err();
        assert!(matches!(err, SetupError::Cancelled));
        assert!(orch.report().installed.is_empty());
    }
}
