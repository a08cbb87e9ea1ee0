//! Installer controller
//!
//! Drives a [`Wizard`] against a [`View`]. One call to [`InstallerController::next`]
//! is one step of the protocol:
//!
//! 1. the state's handler fills in defaults,
//! 2. the matching `show_*` call runs and its answer goes into the workflow
//!    data,
//! 3. the handler validates; a failure is shown and the state is kept,
//! 4. the transition fires, then `on_exit`, `on_state_changed` and
//!    `on_enter` run.
//!
//! The controller owns a copy of the configuration and writes the chosen
//! install location and component selection back into it as the user moves
//! past those states.

use crate::config::{Component, Config};
use crate::context::SessionLog;
use crate::data::{keys, WorkflowData};
use crate::dfa::{Action, StateId};
use crate::error::{Result, SetupError, TransitionError};
use crate::session::{CancelToken, CompletionNotifier, SessionOutcome};
use crate::types::WizardMode;
use crate::view::{ErrorReport, InstallSummary, View};
use crate::wizard::{states, HandlerContext, StateHandler, Wizard, WizardProvider};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// How many times [`InstallerController::run`] re-prompts one state.
pub const DEFAULT_PROMPT_LIMIT: u32 = 3;

/// Performs the real installation when the wizard reaches `installing`.
pub trait InstallRunner {
    fn run_install(&mut self, config: &Config, view: &mut dyn View) -> Result<InstallSummary>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerStatus {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

pub struct InstallerController<'a> {
    config: Config,
    wizard: Wizard,
    data: WorkflowData,
    view: &'a mut dyn View,
    runner: Option<&'a mut dyn InstallRunner>,
    log: SessionLog,
    dry_run: bool,
    cancel: CancelToken,
    notifier: Option<CompletionNotifier>,
    prompt_limit: u32,
    status: ControllerStatus,
    summary: Option<InstallSummary>,
}

impl<'a> InstallerController<'a> {
    pub fn new(config: Config, wizard: Wizard, view: &'a mut dyn View) -> Self {
        let dry_run = config.dry_run;
        Self {
            config,
            wizard,
            data: WorkflowData::new(),
            view,
            runner: None,
            log: SessionLog::new(),
            dry_run,
            cancel: CancelToken::new(),
            notifier: None,
            prompt_limit: DEFAULT_PROMPT_LIMIT,
            status: ControllerStatus::Idle,
            summary: None,
        }
    }

    /// Build the provider's wizard for `config` and wrap it.
    pub fn from_provider(
        config: Config,
        provider: &dyn WizardProvider,
        view: &'a mut dyn View,
    ) -> Result<Self> {
        let wizard = provider.build(&config)?;
        Ok(Self::new(config, wizard, view))
    }

    pub fn with_runner(mut self, runner: &'a mut dyn InstallRunner) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Share a session log, usually the orchestrator's.
    pub fn with_log(mut self, log: SessionLog) -> Self {
        self.log = log;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_notifier(mut self, notifier: CompletionNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_prompt_limit(mut self, limit: u32) -> Self {
        self.prompt_limit = limit;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Seed the workflow data before starting.
    pub fn with_data(mut self, data: WorkflowData) -> Self {
        self.data = data;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    pub fn data(&self) -> &WorkflowData {
        &self.data
    }

    pub fn wizard(&self) -> &Wizard {
        &self.wizard
    }

    pub fn status(&self) -> ControllerStatus {
        self.status
    }

    /// Set once the final state was reached.
    pub fn summary(&self) -> Option<&InstallSummary> {
        self.summary.as_ref()
    }

    pub fn current_state(&self) -> Option<&StateId> {
        self.wizard.dfa().current()
    }

    pub fn history(&self) -> &[StateId] {
        self.wizard.dfa().history()
    }

    fn running(&self) -> bool {
        self.status == ControllerStatus::Running
    }

    pub fn can_go_next(&self) -> bool {
        self.running() && self.wizard.dfa().can_fire(Action::Next)
    }

    pub fn can_go_back(&self) -> bool {
        self.running() && self.wizard.dfa().can_fire(Action::Back)
    }

    pub fn can_go_cancel(&self) -> bool {
        self.running()
            && self
                .current_state()
                .and_then(|s| self.wizard.dfa().state_config(s.as_str()))
                .is_some_and(|cfg| cfg.can_cancel)
    }

    fn handler_for(&self, state: &StateId) -> Option<Arc<dyn StateHandler>> {
        self.wizard.handler(state).cloned()
    }

    fn current_or_err(&self) -> Result<StateId> {
        self.current_state()
            .cloned()
            .ok_or_else(|| TransitionError::NotStarted.into())
    }

    fn ensure_running(&self) -> Result<()> {
        match self.status {
            ControllerStatus::Running => Ok(()),
            ControllerStatus::Idle => Err(TransitionError::NotStarted.into()),
            _ => Err(TransitionError::SessionEnded.into()),
        }
    }

    /// Position the wizard at its initial state.
    pub fn start(&mut self) -> Result<StateId> {
        let initial = self.wizard.dfa_mut().start()?;
        self.status = ControllerStatus::Running;
        self.summary = None;
        self.log.info(format!(
            "Starting {} wizard for {}",
            self.wizard.mode(),
            self.config.app_name
        ));
        if let Some(handler) = self.handler_for(&initial) {
            let ctx = HandlerContext {
                config: &self.config,
                log: &self.log,
                dry_run: self.dry_run,
            };
            handler.on_enter(&ctx, &mut self.data)?;
        }
        Ok(initial)
    }

    /// Run one step from the current state.
    pub fn next(&mut self) -> Result<StateId> {
        self.ensure_running()?;
        let state = self.current_or_err()?;
        if self.wizard.dfa().is_final() {
            return Err(TransitionError::SessionEnded.into());
        }
        let handler = self.handler_for(&state);

        if let Some(h) = &handler {
            let ctx = HandlerContext {
                config: &self.config,
                log: &self.log,
                dry_run: self.dry_run,
            };
            h.execute(&ctx, &mut self.data)?;
        }

        if !self.present(&state)? {
            // Summary declined: step back and let the user change something
            self.log.info("Summary declined, going back");
            return self.back();
        }

        if let Some(h) = &handler {
            if let Err(e) = h.validate(&self.data) {
                self.view
                    .show_error_message(&ErrorReport::new(e.to_string(), true))?;
                return Err(e.into());
            }
        }

        let new = self.wizard.dfa_mut().fire(Action::Next, &self.data)?;
        self.commit(&state)?;
        self.transitioned(&state, &new)?;
        Ok(new)
    }

    /// Return to the previous state without validating the current one.
    pub fn back(&mut self) -> Result<StateId> {
        self.ensure_running()?;
        let state = self.current_or_err()?;
        let previous = self.wizard.dfa_mut().fire(Action::Back, &self.data)?;
        self.transitioned(&state, &previous)?;
        Ok(previous)
    }

    /// End the session without running the remaining states.
    pub fn cancel(&mut self) -> Result<()> {
        self.ensure_running()?;
        let state = self.current_or_err()?;
        if !self.can_go_cancel() {
            return Err(TransitionError::NotPermitted {
                state,
                action: Action::Cancel,
            }
            .into());
        }
        self.log.warn(format!("Installation cancelled at '{}'", state));
        self.status = ControllerStatus::Cancelled;
        self.notify(SessionOutcome::Cancelled);
        Ok(())
    }

    /// Drive the wizard until it completes, is cancelled, or fails.
    ///
    /// Validation failures are re-prompted up to the prompt limit per state.
    /// The cancel token is honoured between states that allow cancelling.
    pub fn run(&mut self) -> Result<SessionOutcome> {
        if self.status == ControllerStatus::Idle {
            if let Err(e) = self.start() {
                return Err(self.fail(e));
            }
        }

        let mut attempts: HashMap<StateId, u32> = HashMap::new();
        loop {
            match self.status {
                ControllerStatus::Completed => return Ok(SessionOutcome::Completed),
                ControllerStatus::Cancelled => return Ok(SessionOutcome::Cancelled),
                ControllerStatus::Failed => return Ok(SessionOutcome::Failed),
                ControllerStatus::Idle | ControllerStatus::Running => {}
            }

            if self.cancel.is_cancelled() && self.can_go_cancel() {
                self.cancel()?;
                continue;
            }

            let state = self.current_or_err()?;
            let depth = self.history().len();
            match self.next() {
                Ok(_) if self.history().len() > depth => {}
                Ok(_) => {
                    let n = attempts.entry(state.clone()).or_insert(0);
                    *n += 1;
                    if *n > self.prompt_limit {
                        let err = SetupError::view(format!(
                            "'{}' was declined {} times",
                            state, n
                        ));
                        return Err(self.fail(err));
                    }
                }
                Err(e) if e.is_recoverable() => {
                    let n = attempts.entry(state.clone()).or_insert(0);
                    *n += 1;
                    if *n > self.prompt_limit {
                        self.log
                            .error(format!("Giving up on '{}' after {} attempts", state, n));
                        return Err(self.fail(e));
                    }
                }
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    fn fail(&mut self, err: SetupError) -> SetupError {
        self.log.error(format!("Wizard failed: {}", err));
        self.status = ControllerStatus::Failed;
        self.notify(SessionOutcome::Failed);
        err
    }

    fn notify(&mut self, outcome: SessionOutcome) {
        if let Some(notifier) = self.notifier.take() {
            notifier.notify(outcome);
        }
    }

    fn selected_in_data(&self) -> Vec<String> {
        self.data
            .get_string_list(keys::SELECTED_COMPONENTS)
            .unwrap_or_else(|| self.config.selected_ids())
    }

    fn path_in_data(&self) -> PathBuf {
        self.data
            .get_str(keys::INSTALL_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| self.config.install_dir.clone())
    }

    /// Show the state and store the answer. Returns false if the user asked
    /// to go back instead.
    fn present(&mut self, state: &StateId) -> Result<bool> {
        match state.as_str() {
            states::WELCOME => self.view.show_welcome(&self.config)?,
            states::LICENSE => {
                let accepted = self.view.show_license(&self.config.license)?;
                self.data.set(keys::ACCEPT_LICENSE, accepted);
            }
            states::MODE_SELECT => {
                let current = self
                    .data
                    .get_str(keys::INSTALL_MODE)
                    .and_then(|m| m.parse().ok())
                    .unwrap_or(WizardMode::Custom);
                if let Some(chooser) = self.view.mode_chooser() {
                    let mode =
                        chooser.choose_mode(&[WizardMode::Express, WizardMode::Custom], current)?;
                    self.data.set(keys::INSTALL_MODE, mode.to_string());
                }
            }
            states::COMPONENTS => {
                let selected = self.selected_in_data();
                let offered: Vec<Component> = self
                    .config
                    .components
                    .iter()
                    .cloned()
                    .map(|mut c| {
                        c.selected = c.required || selected.contains(&c.id);
                        c
                    })
                    .collect();

                let chosen = self.view.show_components(&offered)?;
                let mut ids: Vec<String> = chosen.into_iter().map(|c| c.id).collect();
                for required in self.config.required_ids() {
                    if !ids.contains(&required) {
                        self.log
                            .warn(format!("Component '{}' is required and stays selected", required));
                        ids.push(required);
                    }
                }
                self.data
                    .set(keys::SELECTED_COMPONENTS, crate::data::Value::strings(ids));
            }
            states::LOCATION => {
                let default = self.path_in_data();
                let path = self.view.show_install_path(&default)?;
                self.data
                    .set(keys::INSTALL_PATH, path.display().to_string());
            }
            states::THEME => {
                let default = self
                    .data
                    .get_str(keys::THEME)
                    .unwrap_or("default")
                    .to_string();
                if let Some(chooser) = self.view.theme_chooser() {
                    let theme = chooser.choose_theme(&self.config.themes, &default)?;
                    self.data.set(keys::THEME, theme);
                }
            }
            states::READY => {
                let selected = self.selected_in_data();
                let components: Vec<Component> = self
                    .config
                    .components
                    .iter()
                    .filter(|c| c.required || selected.contains(&c.id))
                    .cloned()
                    .collect();
                let path = self.path_in_data();
                let proceed = self.view.show_summary(&self.config, &components, &path)?;
                self.data.set(keys::PROCEED, proceed);
                if !proceed {
                    return Ok(false);
                }
            }
            states::INSTALLING => self.install()?,
            _ => {}
        }
        Ok(true)
    }

    fn install(&mut self) -> Result<()> {
        if let Some(runner) = self.runner.as_deref_mut() {
            let summary = runner.run_install(&self.config, &mut *self.view)?;
            self.data.set(keys::INSTALL_COMPLETE, true);
            self.summary = Some(summary);
        } else if self.dry_run {
            self.summary = Some(self.local_summary());
        } else {
            self.log
                .warn("No installer attached; the installing state cannot complete");
        }
        Ok(())
    }

    fn local_summary(&self) -> InstallSummary {
        InstallSummary {
            app_name: self.config.app_name.clone(),
            install_dir: self.config.install_dir.clone(),
            components: self.config.selected_ids(),
            warnings: self.log.warnings(),
            dry_run: self.dry_run,
        }
    }

    /// Write the answers of a state just left back into the config.
    fn commit(&mut self, state: &StateId) -> Result<()> {
        match state.as_str() {
            states::COMPONENTS => {
                let ids = self.selected_in_data();
                let effective = self.config.set_selected(&ids);
                self.log
                    .info(format!("Selected components: {}", effective.join(", ")));
            }
            states::LOCATION => {
                self.config.install_dir = self.path_in_data();
                self.log.info(format!(
                    "Install location: {}",
                    self.config.install_dir.display()
                ));
            }
            _ => {}
        }
        Ok(())
    }

    fn transitioned(&mut self, old: &StateId, new: &StateId) -> Result<()> {
        let ctx = HandlerContext {
            config: &self.config,
            log: &self.log,
            dry_run: self.dry_run,
        };
        if let Some(h) = self.wizard.handler(old) {
            h.on_exit(&ctx, &mut self.data)?;
        }
        self.view.on_state_changed(old, new)?;
        if let Some(h) = self.wizard.handler(new) {
            h.on_enter(&ctx, &mut self.data)?;
        }

        if self.wizard.dfa().is_final_state(new) {
            self.finish(new)?;
        }
        Ok(())
    }

    fn finish(&mut self, state: &StateId) -> Result<()> {
        if let Some(h) = self.handler_for(state) {
            let ctx = HandlerContext {
                config: &self.config,
                log: &self.log,
                dry_run: self.dry_run,
            };
            h.execute(&ctx, &mut self.data)?;
        }
        let summary = match self.summary.take() {
            Some(summary) => summary,
            None => self.local_summary(),
        };
        self.view.show_complete(&summary)?;
        self.summary = Some(summary);
        self.status = ControllerStatus::Completed;
        self.notify(SessionOutcome::Completed);
        Ok(())
    }
}
