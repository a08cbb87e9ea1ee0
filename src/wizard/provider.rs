//! Wizard providers
//!
//! A provider turns a [`Config`] into a [`Wizard`]: the workflow graph for
//! one mode, a handler per state and display metadata. Providers are looked
//! up by name through an explicit [`ProviderRegistry`].
//!
//! # Built-in graphs
//!
//! ```text
//! express   welcome → license → installing → complete
//! custom    welcome → license → components → location → ready → installing → complete
//! advanced  welcome → mode_select ─┬─(express)→ installing → complete
//!                                  └─(custom)─→ license → components → location → ready → installing → complete
//! ```
//!
//! Without license text the license state is left out and its neighbours are
//! joined directly. `installing` does not offer Cancel; the install itself
//! runs when Next is fired from it.

use super::handlers::{self, StateHandler};
use super::states;
use super::validate;
use crate::config::Config;
use crate::dfa::{Action, Dfa, StateConfig, StateId};
use crate::error::BuildError;
use crate::types::WizardMode;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Display metadata of one state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUi {
    pub title: String,
    pub description: String,
    /// 1-based position in declaration order
    pub step: usize,
}

fn builtin_text(state: &str) -> (&'static str, &'static str) {
    match state {
        states::WELCOME => ("Welcome", "Introduction to the setup"),
        states::LICENSE => ("License Agreement", "Review and accept the license terms"),
        states::MODE_SELECT => ("Installation Type", "Choose express or custom installation"),
        states::COMPONENTS => ("Components", "Choose what to install"),
        states::LOCATION => ("Install Location", "Choose where to install"),
        states::THEME => ("Theme", "Choose a look"),
        states::READY => ("Ready to Install", "Review your choices"),
        states::INSTALLING => ("Installing", "Copying files and registering the application"),
        states::COMPLETE => ("Finished", "Setup is complete"),
        _ => ("", ""),
    }
}

/// A caller-defined state spliced between two existing ones.
#[derive(Clone)]
pub struct Extension {
    pub id: StateId,
    pub after: StateId,
    pub before: StateId,
    /// Edges of the new state; empty means `Next -> before`
    pub config: StateConfig,
    pub handler: Arc<dyn StateHandler>,
    pub title: String,
    pub description: String,
}

impl Extension {
    pub fn new(
        id: impl Into<StateId>,
        after: impl Into<StateId>,
        before: impl Into<StateId>,
        handler: Arc<dyn StateHandler>,
    ) -> Self {
        Self {
            id: id.into(),
            after: after.into(),
            before: before.into(),
            config: StateConfig::new(),
            handler,
            title: String::new(),
            description: String::new(),
        }
    }

    pub fn with_config(mut self, config: StateConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_text(mut self, title: impl Into<String>, description: impl Into<String>) -> Self {
        self.title = title.into();
        self.description = description.into();
        self
    }
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("id", &self.id)
            .field("after", &self.after)
            .field("before", &self.before)
            .finish_non_exhaustive()
    }
}

/// A built workflow: graph, handlers and display metadata.
pub struct Wizard {
    mode: WizardMode,
    dfa: Dfa,
    handlers: HashMap<StateId, Arc<dyn StateHandler>>,
    ui: HashMap<StateId, StateUi>,
    extensions: HashSet<StateId>,
}

impl Wizard {
    pub fn mode(&self) -> WizardMode {
        self.mode
    }

    pub fn dfa(&self) -> &Dfa {
        &self.dfa
    }

    pub fn dfa_mut(&mut self) -> &mut Dfa {
        &mut self.dfa
    }

    pub fn into_dfa(self) -> Dfa {
        self.dfa
    }

    pub fn handler(&self, state: &StateId) -> Option<&Arc<dyn StateHandler>> {
        self.handlers.get(state)
    }

    pub fn ui(&self, state: &StateId) -> Option<&StateUi> {
        self.ui.get(state)
    }

    /// True for states added through an [`Extension`] (the theme step included).
    pub fn is_extension_state(&self, state: &StateId) -> bool {
        self.extensions.contains(state)
    }
}

impl fmt::Debug for Wizard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wizard")
            .field("mode", &self.mode)
            .field("dfa", &self.dfa)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

pub trait WizardProvider: Send + Sync {
    /// Registry key
    fn name(&self) -> &str;

    /// Build and validate the workflow for `config`.
    fn build(&self, config: &Config) -> Result<Wizard, BuildError>;
}

/// Provider for the express, custom and advanced graphs.
#[derive(Debug, Clone)]
pub struct BuiltinProvider {
    mode: WizardMode,
    name: String,
    theme_step: bool,
    extensions: Vec<Extension>,
}

impl BuiltinProvider {
    pub fn new(mode: WizardMode) -> Self {
        Self {
            mode,
            name: mode.to_string(),
            theme_step: false,
            extensions: Vec::new(),
        }
    }

    /// Register under a different name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_extension(mut self, extension: Extension) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Splice the theme choice in before the summary (custom path) or
    /// right before installing (express).
    pub fn with_theme_step(mut self) -> Self {
        self.theme_step = true;
        self
    }

    pub fn mode(&self) -> WizardMode {
        self.mode
    }

    /// Whether `state` is added by this provider's extensions.
    pub fn is_extension_state(&self, state: &StateId) -> bool {
        (self.theme_step && state == states::THEME) || self.extensions.iter().any(|e| &e.id == state)
    }

    fn add_linear(dfa: &mut Dfa, chain: &[&str]) -> Result<(), BuildError> {
        for pair in chain.windows(2) {
            let mut cfg = StateConfig::new().next(pair[1]);
            if pair[0] == states::WELCOME {
                cfg = cfg.initial().no_back();
            }
            if pair[0] == states::INSTALLING {
                cfg = cfg.no_cancel();
            }
            dfa.add_state(pair[0], cfg)?;
        }
        Ok(())
    }

    fn build_graph(&self, has_license: bool) -> Result<Dfa, BuildError> {
        let mut dfa = Dfa::new();
        let license: &[&str] = if has_license { &[states::LICENSE] } else { &[] };

        match self.mode {
            WizardMode::Express => {
                let mut chain = vec![states::WELCOME];
                chain.extend_from_slice(license);
                chain.extend([states::INSTALLING, states::COMPLETE]);
                Self::add_linear(&mut dfa, &chain)?;
            }
            WizardMode::Custom => {
                let mut chain = vec![states::WELCOME];
                chain.extend_from_slice(license);
                chain.extend([
                    states::COMPONENTS,
                    states::LOCATION,
                    states::READY,
                    states::INSTALLING,
                    states::COMPLETE,
                ]);
                Self::add_linear(&mut dfa, &chain)?;
            }
            WizardMode::Advanced => {
                let custom_entry = if has_license {
                    states::LICENSE
                } else {
                    states::COMPONENTS
                };
                dfa.add_state(
                    states::WELCOME,
                    StateConfig::new().next(states::MODE_SELECT).initial().no_back(),
                )?;
                dfa.add_state(
                    states::MODE_SELECT,
                    StateConfig::new().dynamic(
                        Action::Next,
                        [states::INSTALLING, custom_entry],
                        move |data| {
                            Ok(match validate::chosen_mode(data)? {
                                WizardMode::Express => StateId::from(states::INSTALLING),
                                _ => StateId::from(custom_entry),
                            })
                        },
                    ),
                )?;
                let mut chain: Vec<&str> = license.to_vec();
                chain.extend([
                    states::COMPONENTS,
                    states::LOCATION,
                    states::READY,
                    states::INSTALLING,
                    states::COMPLETE,
                ]);
                Self::add_linear(&mut dfa, &chain)?;
            }
        }

        dfa.add_final_state(states::COMPLETE)?;
        Ok(dfa)
    }

    /// Where the theme step goes in the graph just built.
    fn theme_slot(&self, dfa: &Dfa) -> Result<(StateId, StateId), BuildError> {
        if dfa.contains(states::LOCATION) && dfa.contains(states::READY) {
            return Ok((states::LOCATION.into(), states::READY.into()));
        }
        let predecessor = dfa
            .states()
            .find(|id| {
                dfa.state_config(id.as_str())
                    .and_then(|cfg| cfg.target(Action::Next))
                    .is_some_and(|t| t == states::INSTALLING)
            })
            .cloned()
            .ok_or_else(|| BuildError::UnknownState(states::INSTALLING.into()))?;
        Ok((predecessor, states::INSTALLING.into()))
    }
}

impl WizardProvider for BuiltinProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self, config: &Config) -> Result<Wizard, BuildError> {
        let has_license = !config.license.trim().is_empty();
        let mut dfa = self.build_graph(has_license)?;

        let mut handlers: HashMap<StateId, Arc<dyn StateHandler>> = HashMap::new();
        for id in dfa.states() {
            if let Some(handler) = handlers::builtin(id, config) {
                handlers.insert(id.clone(), handler);
            }
        }

        let mut texts: BTreeMap<StateId, (String, String)> = BTreeMap::new();
        let mut extensions = HashSet::new();

        let mut pending: Vec<Extension> = Vec::new();
        if self.theme_step {
            let (after, before) = self.theme_slot(&dfa)?;
            let handler: Arc<dyn StateHandler> = Arc::new(handlers::ThemeHandler::new(config));
            pending.push(Extension::new(states::THEME, after, before, handler));
        }
        pending.extend(self.extensions.iter().cloned());

        for ext in pending {
            dfa.splice(&ext.after, &ext.before, ext.id.clone(), ext.config.clone())?;
            if !ext.title.is_empty() {
                texts.insert(ext.id.clone(), (ext.title.clone(), ext.description.clone()));
            }
            handlers.insert(ext.id.clone(), ext.handler);
            extensions.insert(ext.id);
        }

        // Gates run the same checks the handlers do
        for (id, handler) in &handlers {
            if dfa.is_final_state(id) {
                continue;
            }
            let gate = Arc::clone(handler);
            dfa.gate_state(id, Arc::new(move |data| gate.validate(data)));
        }
        dfa.validate()?;

        let ui = dfa
            .states()
            .enumerate()
            .map(|(i, id)| {
                let (title, description) = texts.get(id).cloned().unwrap_or_else(|| {
                    let (t, d) = builtin_text(id.as_str());
                    let title = if t.is_empty() { id.to_string() } else { t.to_string() };
                    (title, d.to_string())
                });
                (
                    id.clone(),
                    StateUi {
                        title,
                        description,
                        step: i + 1,
                    },
                )
            })
            .collect();

        log::debug!(
            "Built '{}' wizard with {} states",
            self.name,
            dfa.states().count()
        );

        Ok(Wizard {
            mode: self.mode,
            dfa,
            handlers,
            ui,
            extensions,
        })
    }
}

/// Name → provider lookup, passed explicitly to whoever resolves modes.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn WizardProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `express`, `custom` and `advanced`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for mode in [WizardMode::Express, WizardMode::Custom, WizardMode::Advanced] {
            registry.register(Arc::new(BuiltinProvider::new(mode)));
        }
        registry
    }

    /// Add or replace a provider under its own name.
    pub fn register(&mut self, provider: Arc<dyn WizardProvider>) {
        let name = provider.name().to_string();
        if self.providers.insert(name.clone(), provider).is_some() {
            log::debug!("Wizard provider '{}' replaced", name);
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn WizardProvider>, BuildError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| BuildError::UnknownProvider(name.to_string()))
    }

    pub fn for_mode(&self, mode: WizardMode) -> Result<Arc<dyn WizardProvider>, BuildError> {
        self.get(&mode.to_string())
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
