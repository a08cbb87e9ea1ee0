//! Wizard graph tests
//!
//! Built-in graphs are exercised at the state machine level: the data bag is
//! filled by hand and actions are fired directly.

use setupflow::data::keys;
use setupflow::wizard::{
    states, BuiltinProvider, Extension, HandlerContext, ProviderRegistry, StateHandler,
    WizardProvider,
};
use setupflow::{
    Action, BuildError, Component, Config, SetupError, StateConfig, StateId, WizardMode,
    WorkflowData,
};
use std::sync::Arc;
use strum::IntoEnumIterator;

fn config(license: &str) -> Config {
    Config::new("Acme", "1.0", std::env::temp_dir().join("acme-wizard"))
        .with_component(Component::new("core", "Core").required())
        .with_component(Component::new("plugins", "Plugins"))
        .with_license(license)
}

fn ready_data() -> WorkflowData {
    let mut data = WorkflowData::new();
    data.set(keys::ACCEPT_LICENSE, true);
    data.set(keys::INSTALL_COMPLETE, true);
    data
}

// =============================================================================
// Linear chain
// =============================================================================

#[test]
fn express_reaches_final_in_three_steps() {
    let mut wizard = BuiltinProvider::new(WizardMode::Express)
        .build(&config("MIT"))
        .unwrap();
    let dfa = wizard.dfa_mut();
    let data = ready_data();

    let mut visited = vec![dfa.start().unwrap()];
    for _ in 0..3 {
        visited.push(dfa.fire(Action::Next, &data).unwrap());
    }

    assert!(dfa.is_final());
    assert_eq!(
        visited,
        vec![
            StateId::from(states::WELCOME),
            StateId::from(states::LICENSE),
            StateId::from(states::INSTALLING),
            StateId::from(states::COMPLETE),
        ]
    );
}

#[test]
fn express_back_returns_to_previous_state() {
    let data = ready_data();
    let chain = [states::WELCOME, states::LICENSE, states::INSTALLING];

    for k in 1..chain.len() {
        let mut wizard = BuiltinProvider::new(WizardMode::Express)
            .build(&config("MIT"))
            .unwrap();
        let dfa = wizard.dfa_mut();
        dfa.start().unwrap();
        for _ in 0..k {
            dfa.fire(Action::Next, &data).unwrap();
        }
        assert_eq!(dfa.current().unwrap(), chain[k]);
        assert_eq!(dfa.fire(Action::Back, &data).unwrap(), chain[k - 1]);
    }
}

#[test]
fn back_from_initial_state_is_refused() {
    let mut wizard = BuiltinProvider::new(WizardMode::Custom)
        .build(&config("MIT"))
        .unwrap();
    let dfa = wizard.dfa_mut();
    dfa.start().unwrap();
    assert!(!dfa.can_fire(Action::Back));
    assert!(dfa.fire(Action::Back, &WorkflowData::new()).is_err());
    assert_eq!(dfa.current().unwrap(), states::WELCOME);
}

// =============================================================================
// License skip
// =============================================================================

#[test]
fn empty_license_is_never_visited() {
    for mode in WizardMode::iter() {
        for text in ["", "   \n"] {
            let wizard = BuiltinProvider::new(mode).build(&config(text)).unwrap();
            assert!(
                !wizard.dfa().contains(states::LICENSE),
                "{mode} wizard kept the license state"
            );
        }
        let wizard = BuiltinProvider::new(mode).build(&config("MIT")).unwrap();
        if mode != WizardMode::Advanced {
            assert!(wizard.dfa().contains(states::LICENSE));
        }
    }
}

#[test]
fn express_without_license_goes_straight_to_installing() {
    let mut wizard = BuiltinProvider::new(WizardMode::Express)
        .build(&config(""))
        .unwrap();
    let dfa = wizard.dfa_mut();
    dfa.start().unwrap();
    assert_eq!(
        dfa.fire(Action::Next, &WorkflowData::new()).unwrap(),
        states::INSTALLING
    );
}

// =============================================================================
// Advanced branch
// =============================================================================

#[test]
fn advanced_express_branch_skips_to_installing() {
    let mut wizard = BuiltinProvider::new(WizardMode::Advanced)
        .build(&config("MIT"))
        .unwrap();
    let dfa = wizard.dfa_mut();
    let mut data = WorkflowData::new();
    dfa.start().unwrap();
    assert_eq!(dfa.fire(Action::Next, &data).unwrap(), states::MODE_SELECT);

    data.set(keys::INSTALL_MODE, "express");
    assert_eq!(dfa.fire(Action::Next, &data).unwrap(), states::INSTALLING);
    assert!(!dfa.history().iter().any(|s| s == states::LICENSE
        || s == states::COMPONENTS
        || s == states::LOCATION));
}

#[test]
fn advanced_custom_branch_enters_license() {
    let mut wizard = BuiltinProvider::new(WizardMode::Advanced)
        .build(&config("MIT"))
        .unwrap();
    let dfa = wizard.dfa_mut();
    let mut data = WorkflowData::new();
    dfa.start().unwrap();
    dfa.fire(Action::Next, &data).unwrap();

    data.set(keys::INSTALL_MODE, "custom");
    assert_eq!(dfa.fire(Action::Next, &data).unwrap(), states::LICENSE);
}

#[test]
fn advanced_rejects_unknown_branch() {
    let mut wizard = BuiltinProvider::new(WizardMode::Advanced)
        .build(&config("MIT"))
        .unwrap();
    let dfa = wizard.dfa_mut();
    let mut data = WorkflowData::new();
    dfa.start().unwrap();
    dfa.fire(Action::Next, &data).unwrap();

    data.set(keys::INSTALL_MODE, "advanced");
    let err = dfa.fire(Action::Next, &data).unwrap_err();
    assert!(matches!(err, SetupError::Validation(_)));
    assert_eq!(dfa.current().unwrap(), states::MODE_SELECT);
}

// =============================================================================
// Validation gates
// =============================================================================

#[test]
fn license_gate_keeps_state() {
    let mut wizard = BuiltinProvider::new(WizardMode::Express)
        .build(&config("MIT"))
        .unwrap();
    let dfa = wizard.dfa_mut();
    let mut data = WorkflowData::new();
    dfa.start().unwrap();
    dfa.fire(Action::Next, &data).unwrap();

    data.set(keys::ACCEPT_LICENSE, false);
    let err = dfa.fire(Action::Next, &data).unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(dfa.current().unwrap(), states::LICENSE);
}

#[test]
fn installing_cannot_be_cancelled() {
    let mut wizard = BuiltinProvider::new(WizardMode::Express)
        .build(&config(""))
        .unwrap();
    let dfa = wizard.dfa_mut();
    dfa.start().unwrap();
    assert!(dfa.state_config(states::WELCOME).unwrap().can_cancel);

    dfa.fire(Action::Next, &WorkflowData::new()).unwrap();
    assert_eq!(dfa.current().unwrap(), states::INSTALLING);
    assert!(!dfa.state_config(states::INSTALLING).unwrap().can_cancel);
    assert!(dfa.can_fire(Action::Back));
}

#[test]
fn advertised_actions_can_be_fired() {
    let mut wizard = BuiltinProvider::new(WizardMode::Express)
        .build(&config("MIT"))
        .unwrap();
    let data = ready_data();
    wizard.dfa_mut().start().unwrap();

    loop {
        let current = wizard.dfa().current().unwrap().clone();
        let handler = wizard.handler(&current).unwrap();
        for label in handler.actions(&data) {
            let usable = match label.action {
                Action::Cancel => wizard.dfa().state_config(current.as_str()).unwrap().can_cancel,
                action => wizard.dfa().can_fire(action),
            };
            assert!(usable, "{current} advertises {:?}", label.action);
        }
        if wizard.dfa().is_final() {
            assert!(handler.actions(&data).is_empty());
            break;
        }
        wizard.dfa_mut().fire(Action::Next, &data).unwrap();
    }
}

// =============================================================================
// Extensions and registry
// =============================================================================

struct Survey;

impl StateHandler for Survey {
    fn execute(&self, _ctx: &HandlerContext<'_>, data: &mut WorkflowData) -> setupflow::Result<()> {
        data.set_default("survey", "skipped");
        Ok(())
    }
}

#[test]
fn extension_is_spliced_between_neighbours() {
    let provider = BuiltinProvider::new(WizardMode::Custom).with_extension(
        Extension::new("survey", states::LOCATION, states::READY, Arc::new(Survey))
            .with_text("Survey", "Tell us about yourself"),
    );
    let wizard = provider.build(&config("MIT")).unwrap();

    let order: Vec<&str> = wizard.dfa().states().map(StateId::as_str).collect();
    let at = order.iter().position(|s| *s == "survey").unwrap();
    assert_eq!(order[at - 1], states::LOCATION);
    assert_eq!(order[at + 1], states::READY);
    assert!(wizard.is_extension_state(&StateId::from("survey")));
    assert_eq!(wizard.ui(&StateId::from("survey")).unwrap().title, "Survey");
}

#[test]
fn extension_without_matching_edge_fails_to_build() {
    let provider = BuiltinProvider::new(WizardMode::Express).with_extension(Extension::new(
        "survey",
        states::WELCOME,
        states::COMPLETE,
        Arc::new(Survey),
    ));
    let err = provider.build(&config("MIT")).unwrap_err();
    assert!(matches!(err, BuildError::SpliceEdgeMissing { .. }));
}

#[test]
fn extension_with_dangling_edge_fails_to_build() {
    let provider = BuiltinProvider::new(WizardMode::Custom).with_extension(
        Extension::new("survey", states::LOCATION, states::READY, Arc::new(Survey))
            .with_config(StateConfig::new().next("nowhere")),
    );
    let err = provider.build(&config("MIT")).unwrap_err();
    assert!(matches!(err, BuildError::DanglingTarget { .. }));
}

#[test]
fn theme_step_sits_before_summary_or_installing() {
    let cfg = config("MIT").with_themes(["light", "dark"]);

    let custom = BuiltinProvider::new(WizardMode::Custom)
        .with_theme_step()
        .build(&cfg)
        .unwrap();
    let theme = custom.dfa().state_config(states::THEME).unwrap();
    assert_eq!(theme.target(Action::Next).unwrap(), states::READY);

    let express = BuiltinProvider::new(WizardMode::Express)
        .with_theme_step()
        .build(&cfg)
        .unwrap();
    let license = express.dfa().state_config(states::LICENSE).unwrap();
    assert_eq!(license.target(Action::Next).unwrap(), states::THEME);
}

#[test]
fn registry_resolves_by_name() {
    let mut registry = ProviderRegistry::with_builtins();
    assert_eq!(registry.names(), vec!["advanced", "custom", "express"]);
    assert!(registry.for_mode(WizardMode::Custom).is_ok());

    let err = registry.get("kiosk").err().unwrap();
    assert_eq!(err, BuildError::UnknownProvider("kiosk".to_string()));

    registry.register(Arc::new(
        BuiltinProvider::new(WizardMode::Express).named("kiosk"),
    ));
    let kiosk = registry.get("kiosk").unwrap();
    assert_eq!(kiosk.name(), "kiosk");
    let wizard = kiosk.build(&config("")).unwrap();
    assert_eq!(wizard.mode(), WizardMode::Express);
}
