//! State identifiers, actions and per-state transition rules.

use crate::data::WorkflowData;
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use strum::{Display, EnumIter, EnumString};

/// Named node in the workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(String);

impl StateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StateId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StateId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for StateId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for StateId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StateId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// User-level action that drives a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Next,
    Back,
    Cancel,
    Finish,
}

impl Action {
    /// Forward-class actions pass through the state's validation gate.
    #[inline]
    pub const fn is_forward(self) -> bool {
        matches!(self, Self::Next | Self::Finish)
    }
}

/// Computes the next state from workflow data.
pub type NextStateFn = Arc<dyn Fn(&WorkflowData) -> Result<StateId, ValidationError> + Send + Sync>;

/// Validation gate evaluated before leaving a state on a forward action.
pub type ValidateFn = Arc<dyn Fn(&WorkflowData) -> Result<(), ValidationError> + Send + Sync>;

/// An edge whose target is computed from data at fire time.
#[derive(Clone)]
pub struct DynamicTransition {
    pub(crate) action: Action,
    pub(crate) resolve: NextStateFn,
    /// Targets the function may return. Empty means "unknown".
    pub(crate) targets: Vec<StateId>,
}

/// Transition rules and navigation flags for one state.
///
/// Immutable once the machine is built. Built with chained setters:
///
/// ```
/// use setupflow::dfa::{Action, StateConfig};
///
/// let cfg = StateConfig::new().on(Action::Next, "license").no_back().initial();
/// assert_eq!(cfg.target(Action::Next).map(|s| s.as_str()), Some("license"));
/// assert!(!cfg.can_back);
/// ```
#[derive(Clone)]
pub struct StateConfig {
    pub(crate) transitions: BTreeMap<Action, StateId>,
    pub(crate) dynamic: Option<DynamicTransition>,
    pub(crate) validate: Option<ValidateFn>,
    pub can_next: bool,
    pub can_back: bool,
    pub can_cancel: bool,
    pub(crate) initial: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl StateConfig {
    /// A state offering Next, Back and Cancel, with no edges yet.
    pub fn new() -> Self {
        Self {
            transitions: BTreeMap::new(),
            dynamic: None,
            validate: None,
            can_next: true,
            can_back: true,
            can_cancel: true,
            initial: false,
        }
    }

    /// Add a static edge.
    pub fn on(mut self, action: Action, target: impl Into<StateId>) -> Self {
        self.transitions.insert(action, target.into());
        self
    }

    /// Shorthand for `on(Action::Next, target)`.
    pub fn next(self, target: impl Into<StateId>) -> Self {
        self.on(Action::Next, target)
    }

    /// Attach a data-driven edge for `action`. `targets` lists the states the
    /// function can return so build-time checks can follow the edge; pass an
    /// empty list if unknown.
    pub fn dynamic<F, I, S>(mut self, action: Action, targets: I, resolve: F) -> Self
    where
        F: Fn(&WorkflowData) -> Result<StateId, ValidationError> + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<StateId>,
    {
        self.dynamic = Some(DynamicTransition {
            action,
            resolve: Arc::new(resolve),
            targets: targets.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn validate<F>(mut self, f: F) -> Self
    where
        F: Fn(&WorkflowData) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(f));
        self
    }

    pub(crate) fn validate_with(mut self, f: ValidateFn) -> Self {
        self.validate = Some(f);
        self
    }

    pub fn initial(mut self) -> Self {
        self.initial = true;
        self
    }

    pub fn no_back(mut self) -> Self {
        self.can_back = false;
        self
    }

    pub fn no_cancel(mut self) -> Self {
        self.can_cancel = false;
        self
    }

    pub fn no_next(mut self) -> Self {
        self.can_next = false;
        self
    }

    pub fn is_initial(&self) -> bool {
        self.initial
    }

    /// Static target for `action`, if any.
    pub fn target(&self, action: Action) -> Option<&StateId> {
        self.transitions.get(&action)
    }

    pub fn transitions(&self) -> impl Iterator<Item = (Action, &StateId)> {
        self.transitions.iter().map(|(a, s)| (*a, s))
    }

    pub fn has_dynamic(&self, action: Action) -> bool {
        self.dynamic.as_ref().is_some_and(|d| d.action == action)
    }

    /// Declared targets of the dynamic edge.
    pub fn dynamic_targets(&self) -> &[StateId] {
        self.dynamic.as_ref().map_or(&[], |d| d.targets.as_slice())
    }

    /// True if the state has any outgoing edge at all.
    pub fn has_transitions(&self) -> bool {
        !self.transitions.is_empty() || self.dynamic.is_some()
    }

    /// Whether the navigation flags allow `action` at all.
    pub fn permits(&self, action: Action) -> bool {
        match action {
            Action::Next | Action::Finish => self.can_next,
            Action::Back => self.can_back,
            Action::Cancel => self.can_cancel,
        }
    }

    /// Redirect every static edge pointing at `from` to `to`. Returns the
    /// actions that were redirected.
    pub(crate) fn retarget(&mut self, from: &StateId, to: &StateId) -> Vec<Action> {
        let mut moved = Vec::new();
        for (action, target) in self.transitions.iter_mut() {
            if target == from {
                *target = to.clone();
                moved.push(*action);
            }
        }
        moved
    }
}

impl fmt::Debug for StateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateConfig")
            .field("transitions", &self.transitions)
            .field(
                "dynamic",
                &self.dynamic.as_ref().map(|d| (d.action, &d.targets)),
            )
            .field("validate", &self.validate.is_some())
            .field("can_next", &self.can_next)
            .field("can_back", &self.can_back)
            .field("can_cancel", &self.can_cancel)
            .field("initial", &self.initial)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parse_and_display() {
        assert_eq!(Action::Next.to_string(), "next");
        assert_eq!("back".parse::<Action>().ok(), Some(Action::Back));
        assert!(Action::Finish.is_forward());
        assert!(!Action::Cancel.is_forward());
    }

    #[test]
    fn test_state_id_compares_with_str() {
        let id = StateId::from("license");
        assert_eq!(id, "license");
        assert_eq!(id.to_string(), "license");
    }

    #[test]
    fn test_permits_follows_flags() {
        let cfg = StateConfig::new().no_back().no_cancel();
        assert!(cfg.permits(Action::Next));
        assert!(!cfg.permits(Action::Back));
        assert!(!cfg.permits(Action::Cancel));
    }

    #[test]
    fn test_retarget_moves_matching_edges_only() {
        let mut cfg = StateConfig::new()
            .on(Action::Next, "ready")
            .on(Action::Finish, "ready")
            .on(Action::Cancel, "aborted");
        let moved = cfg.retarget(&StateId::from("ready"), &StateId::from("theme"));

        assert_eq!(moved, vec![Action::Next, Action::Finish]);
        assert_eq!(cfg.target(Action::Next), Some(&StateId::from("theme")));
        assert_eq!(cfg.target(Action::Cancel), Some(&StateId::from("aborted")));
    }
}
