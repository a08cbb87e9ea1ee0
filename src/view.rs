//! Front-end contract
//!
//! The controller and the orchestrator never render anything themselves.
//! They call a [`View`], which may be a terminal UI, a browser bridge, or the
//! [`UnattendedView`] shipped here for scripted installs.
//!
//! # Capabilities
//!
//! Some steps only make sense for front-ends that can offer a choice (the
//! advanced mode picker, the theme picker). A front-end declares those by
//! returning itself from [`View::mode_chooser`] or [`View::theme_chooser`].
//! Front-ends that do not, get the handler defaults.

use crate::config::{Component, Config};
use crate::dfa::StateId;
use crate::error::Result;
use crate::types::WizardMode;
use std::path::{Path, PathBuf};

/// Install progress after one component.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// 1-based index of the component just finished
    pub index: usize,
    pub total: usize,
    pub component: String,
    /// Overall completion in `0.0..=1.0`
    pub fraction: f64,
}

impl Progress {
    pub fn new(index: usize, total: usize, component: impl Into<String>) -> Self {
        let fraction = if total == 0 {
            1.0
        } else {
            index as f64 / total as f64
        };
        Self {
            index,
            total,
            component: component.into(),
            fraction,
        }
    }

    pub fn percent(&self) -> u8 {
        (self.fraction.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

/// An error as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub message: String,
    /// Whether the user will be asked to retry after this message
    pub retry_offered: bool,
    /// Extra lines, such as rollback failures
    pub warnings: Vec<String>,
}

impl ErrorReport {
    pub fn new(message: impl Into<String>, retry_offered: bool) -> Self {
        Self {
            message: message.into(),
            retry_offered,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// What the completion screen shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallSummary {
    pub app_name: String,
    pub install_dir: PathBuf,
    pub components: Vec<String>,
    pub warnings: Vec<String>,
    pub dry_run: bool,
}

pub trait View {
    fn show_welcome(&mut self, config: &Config) -> Result<()>;

    /// Returns true if the license was accepted.
    fn show_license(&mut self, text: &str) -> Result<bool>;

    /// `components` carry the current selection in their `selected` flags.
    /// Returns the components the user wants.
    fn show_components(&mut self, components: &[Component]) -> Result<Vec<Component>>;

    fn show_install_path(&mut self, default: &Path) -> Result<PathBuf>;

    /// Returns false to go back and change something.
    fn show_summary(&mut self, config: &Config, selected: &[Component], path: &Path) -> Result<bool>;

    fn show_progress(&mut self, progress: &Progress) -> Result<()>;

    fn show_complete(&mut self, summary: &InstallSummary) -> Result<()>;

    fn show_error_message(&mut self, report: &ErrorReport) -> Result<()>;

    /// Ask for consent before raising privileges.
    fn request_elevation(&mut self, reason: &str) -> Result<bool>;

    fn on_state_changed(&mut self, old: &StateId, new: &StateId) -> Result<()>;

    /// Asked after a component failed. Declines unless overridden.
    fn offer_retry(&mut self, report: &ErrorReport) -> Result<bool> {
        let _ = report;
        Ok(false)
    }

    fn mode_chooser(&mut self) -> Option<&mut dyn ModeChooser> {
        None
    }

    fn theme_chooser(&mut self) -> Option<&mut dyn ThemeChooser> {
        None
    }
}

/// Picks the install mode in the advanced wizard.
pub trait ModeChooser {
    fn choose_mode(&mut self, modes: &[WizardMode], default: WizardMode) -> Result<WizardMode>;
}

/// Picks a theme in the optional theme step.
pub trait ThemeChooser {
    fn choose_theme(&mut self, themes: &[String], default: &str) -> Result<String>;
}

/// Pre-configured answers for [`UnattendedView`].
#[derive(Debug, Clone)]
pub struct Answers {
    pub accept_license: bool,
    /// Component ids to select; `None` keeps the configured selection
    pub components: Option<Vec<String>>,
    /// `None` keeps the proposed path
    pub install_path: Option<PathBuf>,
    pub proceed: bool,
    pub allow_elevation: bool,
    pub mode: Option<WizardMode>,
    pub theme: Option<String>,
    /// How many failed components may be retried
    pub retries: u32,
}

impl Default for Answers {
    fn default() -> Self {
        Self {
            accept_license: false,
            components: None,
            install_path: None,
            proceed: true,
            allow_elevation: false,
            mode: None,
            theme: None,
            retries: 0,
        }
    }
}

/// Front-end that never blocks.
///
/// Every prompt is answered from [`Answers`]; what the engine showed is
/// recorded for later inspection.
#[derive(Debug, Default)]
pub struct UnattendedView {
    answers: Answers,
    retries_used: u32,
    pub progress: Vec<Progress>,
    pub errors: Vec<ErrorReport>,
    pub transitions: Vec<(StateId, StateId)>,
    /// Selected ids as presented on each components prompt
    pub component_prompts: Vec<Vec<String>>,
    pub elevation_requests: Vec<String>,
    pub completed: Option<InstallSummary>,
}

impl UnattendedView {
    pub fn new(answers: Answers) -> Self {
        Self {
            answers,
            ..Self::default()
        }
    }

    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    pub fn answers_mut(&mut self) -> &mut Answers {
        &mut self.answers
    }

    /// States entered, in order.
    pub fn visited(&self) -> Vec<&str> {
        self.transitions.iter().map(|(_, new)| new.as_str()).collect()
    }
}

impl View for UnattendedView {
    fn show_welcome(&mut self, config: &Config) -> Result<()> {
        log::info!("Installing {} {}", config.app_name, config.app_version);
        Ok(())
    }

    fn show_license(&mut self, _text: &str) -> Result<bool> {
        Ok(self.answers.accept_license)
    }

    fn show_components(&mut self, components: &[Component]) -> Result<Vec<Component>> {
        self.component_prompts.push(
            components
                .iter()
                .filter(|c| c.is_included())
                .map(|c| c.id.clone())
                .collect(),
        );
        let chosen = match &self.answers.components {
            Some(ids) => components
                .iter()
                .filter(|c| ids.iter().any(|id| *id == c.id))
                .cloned()
                .collect(),
            None => components.iter().filter(|c| c.is_included()).cloned().collect(),
        };
        Ok(chosen)
    }

    fn show_install_path(&mut self, default: &Path) -> Result<PathBuf> {
        Ok(self
            .answers
            .install_path
            .clone()
            .unwrap_or_else(|| default.to_path_buf()))
    }

    fn show_summary(&mut self, config: &Config, selected: &[Component], path: &Path) -> Result<bool> {
        log::info!(
            "{}: {} component(s) into {}",
            config.app_name,
            selected.len(),
            path.display()
        );
        Ok(self.answers.proceed)
    }

    fn show_progress(&mut self, progress: &Progress) -> Result<()> {
        log::info!(
            "[{}/{}] {} ({}%)",
            progress.index,
            progress.total,
            progress.component,
            progress.percent()
        );
        self.progress.push(progress.clone());
        Ok(())
    }

    fn show_complete(&mut self, summary: &InstallSummary) -> Result<()> {
        self.completed = Some(summary.clone());
        Ok(())
    }

    fn show_error_message(&mut self, report: &ErrorReport) -> Result<()> {
        log::warn!("{}", report.message);
        self.errors.push(report.clone());
        Ok(())
    }

    fn request_elevation(&mut self, reason: &str) -> Result<bool> {
        self.elevation_requests.push(reason.to_string());
        Ok(self.answers.allow_elevation)
    }

    fn on_state_changed(&mut self, old: &StateId, new: &StateId) -> Result<()> {
        log::debug!("Wizard: {} -> {}", old, new);
        self.transitions.push((old.clone(), new.clone()));
        Ok(())
    }

    fn offer_retry(&mut self, _report: &ErrorReport) -> Result<bool> {
        if self.retries_used < self.answers.retries {
            self.retries_used += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn mode_chooser(&mut self) -> Option<&mut dyn ModeChooser> {
        if self.answers.mode.is_some() {
            Some(self)
        } else {
            None
        }
    }

    fn theme_chooser(&mut self) -> Option<&mut dyn ThemeChooser> {
        if self.answers.theme.is_some() {
            Some(self)
        } else {
            None
        }
    }
}

impl ModeChooser for UnattendedView {
    fn choose_mode(&mut self, _modes: &[WizardMode], default: WizardMode) -> Result<WizardMode> {
        Ok(self.answers.mode.unwrap_or(default))
    }
}

impl ThemeChooser for UnattendedView {
    fn choose_theme(&mut self, _themes: &[String], default: &str) -> Result<String> {
        Ok(self
            .answers
            .theme
            .clone()
            .unwrap_or_else(|| default.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_fraction() {
        let p = Progress::new(1, 3, "core");
        assert_eq!(p.percent(), 33);
        assert_eq!(Progress::new(3, 3, "docs").percent(), 100);
        assert_eq!(Progress::new(0, 0, "").fraction, 1.0);
    }

    #[test]
    fn test_unattended_components_follow_answers() {
        let mut view = UnattendedView::new(Answers {
            components: Some(vec!["docs".into()]),
            ..Answers::default()
        });
        let offered = vec![
            Component::new("core", "Core").required(),
            Component::new("docs", "Docs").unselected(),
        ];
        let chosen = view.show_components(&offered).unwrap();

        assert_eq!(chosen.len(), 1);
        assert_eq!(chosen[0].id, "docs");
        assert_eq!(view.component_prompts, vec![vec!["core".to_string()]]);
    }

    #[test]
    fn test_unattended_retry_budget() {
        let mut view = UnattendedView::new(Answers {
            retries: 1,
            ..Answers::default()
        });
        let report = ErrorReport::new("boom", true);
        assert!(view.offer_retry(&report).unwrap());
        assert!(!view.offer_retry(&report).unwrap());
    }

    #[test]
    fn test_capabilities_declared_by_answers() {
        let mut view = UnattendedView::new(Answers::default());
        assert!(view.mode_chooser().is_none());

        view.answers_mut().mode = Some(WizardMode::Express);
        let chooser = view.mode_chooser().expect("mode answer given");
        assert_eq!(
            chooser
                .choose_mode(&[WizardMode::Express, WizardMode::Custom], WizardMode::Custom)
                .unwrap(),
            WizardMode::Express
        );
    }
}
