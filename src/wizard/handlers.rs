//! Per-state logic
//!
//! A handler fills in defaults for its state, checks what the front-end
//! wrote back, and tells the front-end which actions to offer. Handlers read
//! the configuration but only write to the workflow data and the session
//! log; talking to the user is the controller's job.

use super::states;
use super::validate;
use crate::config::{Component, Config};
use crate::context::SessionLog;
use crate::data::{keys, Value, WorkflowData};
use crate::dfa::{Action, StateId};
use crate::error::{Result, ValidationError};
use crate::types::WizardMode;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a handler may look at while running.
#[derive(Debug, Clone, Copy)]
pub struct HandlerContext<'a> {
    pub config: &'a Config,
    pub log: &'a SessionLog,
    pub dry_run: bool,
}

/// A button the front-end should render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionLabel {
    pub action: Action,
    pub label: String,
}

impl ActionLabel {
    pub fn new(action: Action, label: impl Into<String>) -> Self {
        Self {
            action,
            label: label.into(),
        }
    }
}

fn standard_actions() -> Vec<ActionLabel> {
    vec![
        ActionLabel::new(Action::Back, "Back"),
        ActionLabel::new(Action::Next, "Next"),
        ActionLabel::new(Action::Cancel, "Cancel"),
    ]
}

pub trait StateHandler: Send + Sync {
    fn on_enter(&self, _ctx: &HandlerContext<'_>, _data: &mut WorkflowData) -> Result<()> {
        Ok(())
    }

    fn on_exit(&self, _ctx: &HandlerContext<'_>, _data: &mut WorkflowData) -> Result<()> {
        Ok(())
    }

    /// Populate defaults before the state is shown.
    fn execute(&self, ctx: &HandlerContext<'_>, data: &mut WorkflowData) -> Result<()>;

    fn validate(&self, _data: &WorkflowData) -> std::result::Result<(), ValidationError> {
        Ok(())
    }

    fn actions(&self, _data: &WorkflowData) -> Vec<ActionLabel> {
        standard_actions()
    }
}

pub struct WelcomeHandler;

impl StateHandler for WelcomeHandler {
    fn execute(&self, ctx: &HandlerContext<'_>, data: &mut WorkflowData) -> Result<()> {
        ctx.log.info(format!(
            "Welcome to {} {}",
            ctx.config.app_name, ctx.config.app_version
        ));
        data.set_default(keys::INSTALL_MODE, ctx.config.mode.to_string());
        Ok(())
    }

    fn actions(&self, _data: &WorkflowData) -> Vec<ActionLabel> {
        vec![
            ActionLabel::new(Action::Next, "Next"),
            ActionLabel::new(Action::Cancel, "Cancel"),
        ]
    }
}

pub struct LicenseHandler;

impl StateHandler for LicenseHandler {
    fn execute(&self, _ctx: &HandlerContext<'_>, data: &mut WorkflowData) -> Result<()> {
        data.set_default(keys::ACCEPT_LICENSE, false);
        Ok(())
    }

    fn validate(&self, data: &WorkflowData) -> std::result::Result<(), ValidationError> {
        validate::license_accepted(data)
    }

    fn actions(&self, _data: &WorkflowData) -> Vec<ActionLabel> {
        vec![
            ActionLabel::new(Action::Back, "Back"),
            ActionLabel::new(Action::Next, "I Agree"),
            ActionLabel::new(Action::Cancel, "Cancel"),
        ]
    }
}

/// Branch point of the advanced wizard.
pub struct ModeSelectHandler;

impl StateHandler for ModeSelectHandler {
    fn execute(&self, ctx: &HandlerContext<'_>, data: &mut WorkflowData) -> Result<()> {
        let current = data
            .get_str(keys::INSTALL_MODE)
            .and_then(|m| m.parse::<WizardMode>().ok());
        // The advanced mode itself is not a branch; fall back to custom
        if !matches!(current, Some(WizardMode::Express | WizardMode::Custom)) {
            let default = match ctx.config.mode {
                WizardMode::Express => WizardMode::Express,
                WizardMode::Custom | WizardMode::Advanced => WizardMode::Custom,
            };
            data.set(keys::INSTALL_MODE, default.to_string());
        }
        Ok(())
    }

    fn validate(&self, data: &WorkflowData) -> std::result::Result<(), ValidationError> {
        validate::chosen_mode(data).map(|_| ())
    }
}

pub struct ComponentsHandler {
    components: Vec<Component>,
}

impl ComponentsHandler {
    pub fn new(config: &Config) -> Self {
        Self {
            components: config.components.clone(),
        }
    }
}

impl StateHandler for ComponentsHandler {
    fn execute(&self, ctx: &HandlerContext<'_>, data: &mut WorkflowData) -> Result<()> {
        data.set_default(
            keys::SELECTED_COMPONENTS,
            Value::strings(ctx.config.selected_ids()),
        );
        Ok(())
    }

    fn validate(&self, data: &WorkflowData) -> std::result::Result<(), ValidationError> {
        validate::component_selection(data, &self.components)
    }
}

pub struct LocationHandler {
    min_free_space: Option<u64>,
}

impl LocationHandler {
    pub fn new(config: &Config) -> Self {
        Self {
            min_free_space: config.min_free_space,
        }
    }
}

impl StateHandler for LocationHandler {
    fn execute(&self, ctx: &HandlerContext<'_>, data: &mut WorkflowData) -> Result<()> {
        data.set_default(
            keys::INSTALL_PATH,
            ctx.config.install_dir.display().to_string(),
        );
        Ok(())
    }

    fn validate(&self, data: &WorkflowData) -> std::result::Result<(), ValidationError> {
        validate::install_path(data, self.min_free_space).map(|_| ())
    }
}

/// Summary before installing.
pub struct ReadyHandler;

impl StateHandler for ReadyHandler {
    fn execute(&self, ctx: &HandlerContext<'_>, data: &mut WorkflowData) -> Result<()> {
        let mut summary = BTreeMap::new();
        summary.insert(
            "path".to_string(),
            Value::from(
                data.get_str(keys::INSTALL_PATH)
                    .map(str::to_string)
                    .unwrap_or_else(|| ctx.config.install_dir.display().to_string()),
            ),
        );
        summary.insert(
            "components".to_string(),
            Value::strings(
                data.get_string_list(keys::SELECTED_COMPONENTS)
                    .unwrap_or_else(|| ctx.config.selected_ids()),
            ),
        );
        if let Some(theme) = data.get_str(keys::THEME) {
            summary.insert("theme".to_string(), Value::from(theme));
        }
        data.set(keys::INSTALL_SUMMARY, Value::Record(summary));
        data.set_default(keys::PROCEED, true);
        Ok(())
    }

    fn actions(&self, _data: &WorkflowData) -> Vec<ActionLabel> {
        vec![
            ActionLabel::new(Action::Back, "Back"),
            ActionLabel::new(Action::Next, "Install"),
            ActionLabel::new(Action::Cancel, "Cancel"),
        ]
    }
}

/// Optional theme choice, spliced in as an extension state.
pub struct ThemeHandler {
    themes: Vec<String>,
}

impl ThemeHandler {
    pub fn new(config: &Config) -> Self {
        Self {
            themes: config.themes.clone(),
        }
    }

    pub fn default_theme(&self) -> &str {
        self.themes.first().map_or("default", String::as_str)
    }
}

impl StateHandler for ThemeHandler {
    fn execute(&self, _ctx: &HandlerContext<'_>, data: &mut WorkflowData) -> Result<()> {
        data.set_default(keys::THEME, self.default_theme());
        Ok(())
    }

    fn validate(&self, data: &WorkflowData) -> std::result::Result<(), ValidationError> {
        let theme = data.get_str(keys::THEME).unwrap_or_default();
        if self.themes.is_empty() || self.themes.iter().any(|t| t == theme) {
            Ok(())
        } else {
            Err(ValidationError::new(
                keys::THEME,
                format!("unknown theme '{}'", theme),
            ))
        }
    }
}

/// The install itself runs in the orchestrator. A dry run completes the
/// state without side effects.
pub struct InstallingHandler;

impl StateHandler for InstallingHandler {
    fn execute(&self, ctx: &HandlerContext<'_>, data: &mut WorkflowData) -> Result<()> {
        if ctx.dry_run {
            ctx.log.info("Dry run: marking installation complete");
            data.set(keys::INSTALL_COMPLETE, true);
        } else {
            data.set_default(keys::INSTALL_COMPLETE, false);
        }
        Ok(())
    }

    fn validate(&self, data: &WorkflowData) -> std::result::Result<(), ValidationError> {
        match data.get_bool(keys::INSTALL_COMPLETE) {
            Some(true) => Ok(()),
            _ => Err(ValidationError::new(
                keys::INSTALL_COMPLETE,
                "installation has not finished",
            )),
        }
    }

    fn actions(&self, _data: &WorkflowData) -> Vec<ActionLabel> {
        Vec::new()
    }
}

pub struct CompleteHandler;

impl StateHandler for CompleteHandler {
    fn execute(&self, ctx: &HandlerContext<'_>, _data: &mut WorkflowData) -> Result<()> {
        ctx.log.info(format!("{} setup finished", ctx.config.app_name));
        Ok(())
    }

    /// Final state: nothing left to fire.
    fn actions(&self, _data: &WorkflowData) -> Vec<ActionLabel> {
        Vec::new()
    }
}

/// Handler for a built-in state id.
pub fn builtin(state: &StateId, config: &Config) -> Option<Arc<dyn StateHandler>> {
    let handler: Arc<dyn StateHandler> = match state.as_str() {
        states::WELCOME => Arc::new(WelcomeHandler),
        states::LICENSE => Arc::new(LicenseHandler),
        states::MODE_SELECT => Arc::new(ModeSelectHandler),
        states::COMPONENTS => Arc::new(ComponentsHandler::new(config)),
        states::LOCATION => Arc::new(LocationHandler::new(config)),
        states::READY => Arc::new(ReadyHandler),
        states::THEME => Arc::new(ThemeHandler::new(config)),
        states::INSTALLING => Arc::new(InstallingHandler),
        states::COMPLETE => Arc::new(CompleteHandler),
        _ => return None,
    };
    Some(handler)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::new("Acme", "1.0", "/opt/acme")
            .with_component(Component::new("core", "Core").required())
            .with_component(Component::new("docs", "Docs").unselected())
            .with_themes(["dark", "light"])
    }

    #[test]
    fn test_defaults_do_not_override_user_input() {
        let config = config();
        let log = SessionLog::new();
        let ctx = HandlerContext {
            config: &config,
            log: &log,
            dry_run: false,
        };
        let mut data = WorkflowData::new();
        data.set(keys::INSTALL_PATH, "/home/me/acme");

        LocationHandler::new(&config).execute(&ctx, &mut data).unwrap();
        ComponentsHandler::new(&config).execute(&ctx, &mut data).unwrap();

        assert_eq!(data.get_str(keys::INSTALL_PATH), Some("/home/me/acme"));
        assert_eq!(
            data.get_string_list(keys::SELECTED_COMPONENTS),
            Some(vec!["core".to_string()])
        );
    }

    #[test]
    fn test_installing_completes_only_in_dry_run() {
        let config = config();
        let log = SessionLog::new();
        let mut data = WorkflowData::new();

        let live = HandlerContext {
            config: &config,
            log: &log,
            dry_run: false,
        };
        InstallingHandler.execute(&live, &mut data).unwrap();
        assert!(InstallingHandler.validate(&data).is_err());

        let dry = HandlerContext { dry_run: true, ..live };
        InstallingHandler.execute(&dry, &mut data).unwrap();
        assert!(InstallingHandler.validate(&data).is_ok());
    }

    #[test]
    fn test_mode_select_replaces_advanced() {
        let config = config().with_mode(WizardMode::Advanced);
        let log = SessionLog::new();
        let ctx = HandlerContext {
            config: &config,
            log: &log,
            dry_run: false,
        };
        let mut data = WorkflowData::new();
        WelcomeHandler.execute(&ctx, &mut data).unwrap();
        assert_eq!(data.get_str(keys::INSTALL_MODE), Some("advanced"));

        ModeSelectHandler.execute(&ctx, &mut data).unwrap();
        assert_eq!(data.get_str(keys::INSTALL_MODE), Some("custom"));
        assert!(ModeSelectHandler.validate(&data).is_ok());
    }

    #[test]
    fn test_theme_handler_checks_catalog() {
        let handler = ThemeHandler::new(&config());
        let mut data = WorkflowData::new();
        data.set(keys::THEME, "solarized");
        assert!(handler.validate(&data).is_err());
        data.set(keys::THEME, "light");
        assert!(handler.validate(&data).is_ok());
        assert_eq!(handler.default_theme(), "dark");
    }

    #[test]
    fn test_ready_builds_summary_record() {
        let config = config();
        let log = SessionLog::new();
        let ctx = HandlerContext {
            config: &config,
            log: &log,
            dry_run: false,
        };
        let mut data = WorkflowData::new();
        ReadyHandler.execute(&ctx, &mut data).unwrap();

        let summary = data.get(keys::INSTALL_SUMMARY).and_then(Value::as_record).unwrap();
        assert_eq!(summary["path"], Value::from("/opt/acme"));
        assert_eq!(data.get_bool(keys::PROCEED), Some(true));
    }

    #[test]
    fn test_builtin_lookup() {
        let config = config();
        assert!(builtin(&StateId::from(states::LICENSE), &config).is_some());
        assert!(builtin(&StateId::from("eula"), &config).is_none());
    }
}
