//! Workflow State Machine
//!
//! A generic deterministic graph of named states, actions and transition
//! rules. The machine owns the current state and the visited-state history;
//! callers own the workflow data and pass it to [`Dfa::fire`].
//!
//! # Transition resolution
//!
//! 1. `Back` pops the history and re-enters the previous state. The state
//!    being left is not validated.
//! 2. Otherwise the action must be allowed by the state's navigation flags and
//!    have an edge (dynamic function bound to the action, or static map).
//! 3. Forward actions (`Next`, `Finish`) run the state's validation gate
//!    first. A failing gate leaves the machine where it was.
//!
//! # Build-time checks
//!
//! [`Dfa::validate`] rejects dangling targets, missing or duplicate initial
//! states, missing or unreachable final states, non-final dead ends, and
//! states with both a static and a dynamic edge for the same action.

mod state;

pub use state::{Action, DynamicTransition, NextStateFn, StateConfig, StateId, ValidateFn};

use crate::data::WorkflowData;
use crate::error::{BuildError, Result, TransitionError};
use std::collections::{HashMap, HashSet, VecDeque};

/// The workflow graph plus its runtime position.
#[derive(Debug, Clone, Default)]
pub struct Dfa {
    /// Declaration order
    order: Vec<StateId>,
    states: HashMap<StateId, StateConfig>,
    finals: HashSet<StateId>,
    current: Option<StateId>,
    history: Vec<StateId>,
}

impl Dfa {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a state.
    pub fn add_state(
        &mut self,
        id: impl Into<StateId>,
        config: StateConfig,
    ) -> std::result::Result<(), BuildError> {
        let id = id.into();
        if self.states.contains_key(&id) {
            return Err(BuildError::DuplicateState(id));
        }
        self.order.push(id.clone());
        self.states.insert(id, config);
        Ok(())
    }

    /// Declare a terminal state. Final states need no outgoing edges and do
    /// not offer Back or Cancel.
    pub fn add_final_state(&mut self, id: impl Into<StateId>) -> std::result::Result<(), BuildError> {
        let id = id.into();
        self.add_state(
            id.clone(),
            StateConfig::new().no_next().no_back().no_cancel(),
        )?;
        self.finals.insert(id);
        Ok(())
    }

    /// Insert `id` between `after` and `before`.
    ///
    /// Every static edge `after -> before` is redirected to `id`. If `config`
    /// has no edges of its own it gets `Next -> before`.
    pub fn splice(
        &mut self,
        after: &StateId,
        before: &StateId,
        id: impl Into<StateId>,
        config: StateConfig,
    ) -> std::result::Result<(), BuildError> {
        let id = id.into();
        if !self.states.contains_key(before) {
            return Err(BuildError::UnknownState(before.clone()));
        }
        if self.states.contains_key(&id) {
            return Err(BuildError::DuplicateState(id));
        }
        let prev = self
            .states
            .get_mut(after)
            .ok_or_else(|| BuildError::UnknownState(after.clone()))?;

        let moved = prev.retarget(before, &id);
        if moved.is_empty() {
            return Err(BuildError::SpliceEdgeMissing {
                after: after.clone(),
                before: before.clone(),
            });
        }

        let config = if config.has_transitions() {
            config
        } else {
            config.next(before.clone())
        };

        let pos = self
            .order
            .iter()
            .position(|s| s == after)
            .map_or(self.order.len(), |p| p + 1);
        self.order.insert(pos, id.clone());
        self.states.insert(id.clone(), config);
        log::debug!("Spliced state '{}' between '{}' and '{}'", id, after, before);
        Ok(())
    }

    /// Give `id` a validation gate unless it already has one. Returns false
    /// if the state is unknown or already gated.
    pub(crate) fn gate_state(&mut self, id: &StateId, gate: ValidateFn) -> bool {
        match self.states.get_mut(id) {
            Some(cfg) if cfg.validate.is_none() => {
                cfg.validate = Some(gate);
                true
            }
            _ => false,
        }
    }

    /// Whole-graph checks. Call once after building and before starting.
    pub fn validate(&self) -> std::result::Result<(), BuildError> {
        let initial = self.initial_state_checked()?;

        if self.finals.is_empty() {
            return Err(BuildError::NoFinalState);
        }

        for id in &self.order {
            let cfg = &self.states[id];

            if let Some(dynamic) = &cfg.dynamic {
                if cfg.transitions.contains_key(&dynamic.action) {
                    return Err(BuildError::ConflictingTransition {
                        state: id.clone(),
                        action: dynamic.action,
                    });
                }
                for target in &dynamic.targets {
                    if !self.states.contains_key(target) {
                        return Err(BuildError::DanglingTarget {
                            from: id.clone(),
                            action: dynamic.action,
                            to: target.clone(),
                        });
                    }
                }
            }

            for (action, target) in cfg.transitions() {
                if !self.states.contains_key(target) {
                    return Err(BuildError::DanglingTarget {
                        from: id.clone(),
                        action,
                        to: target.clone(),
                    });
                }
            }

            if !self.finals.contains(id) && !cfg.has_transitions() {
                return Err(BuildError::DeadEnd(id.clone()));
            }
        }

        let (reached, open) = self.reachable_from(initial);
        if !open {
            for id in self.order.iter().filter(|s| self.finals.contains(*s)) {
                if !reached.contains(id) {
                    return Err(BuildError::UnreachableFinal(id.clone()));
                }
            }
        }

        Ok(())
    }

    fn initial_state_checked(&self) -> std::result::Result<&StateId, BuildError> {
        let initials: Vec<&StateId> = self
            .order
            .iter()
            .filter(|id| self.states[*id].initial)
            .collect();
        match initials.as_slice() {
            [] => Err(BuildError::NoInitialState),
            [only] => Ok(*only),
            many => Err(BuildError::MultipleInitialStates(
                many.iter().map(|s| (*s).clone()).collect(),
            )),
        }
    }

    /// Breadth-first walk over static edges and declared dynamic targets.
    /// `open` is true when a reachable state has a dynamic edge with no
    /// declared targets; anything could be reachable past it.
    fn reachable_from(&self, start: &StateId) -> (HashSet<StateId>, bool) {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        let mut open = false;
        seen.insert(start.clone());
        queue.push_back(start.clone());

        while let Some(id) = queue.pop_front() {
            let cfg = &self.states[&id];
            if let Some(dynamic) = &cfg.dynamic {
                if dynamic.targets.is_empty() {
                    open = true;
                }
            }
            let targets = cfg
                .transitions
                .iter()
                .filter(|(action, _)| **action != Action::Back)
                .map(|(_, t)| t)
                .chain(cfg.dynamic_targets());
            for target in targets {
                if self.states.contains_key(target) && seen.insert(target.clone()) {
                    queue.push_back(target.clone());
                }
            }
        }

        (seen, open)
    }

    /// Validate and position the machine at the initial state.
    pub fn start(&mut self) -> std::result::Result<StateId, BuildError> {
        self.validate()?;
        let initial = self.initial_state_checked()?.clone();
        self.current = Some(initial.clone());
        self.history.clear();
        Ok(initial)
    }

    /// Return to the not-started position. The graph is kept.
    pub fn reset(&mut self) {
        self.current = None;
        self.history.clear();
    }

    pub fn current(&self) -> Option<&StateId> {
        self.current.as_ref()
    }

    pub fn is_started(&self) -> bool {
        self.current.is_some()
    }

    /// True if the current state is terminal.
    pub fn is_final(&self) -> bool {
        self.current.as_ref().is_some_and(|s| self.finals.contains(s))
    }

    pub fn is_final_state(&self, id: &StateId) -> bool {
        self.finals.contains(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.states.contains_key(id)
    }

    pub fn state_config(&self, id: &str) -> Option<&StateConfig> {
        self.states.get(id)
    }

    /// States in declaration order.
    pub fn states(&self) -> impl Iterator<Item = &StateId> {
        self.order.iter()
    }

    pub fn initial_state(&self) -> Option<&StateId> {
        self.initial_state_checked().ok()
    }

    /// Visited states, oldest first. The current state is not included.
    pub fn history(&self) -> &[StateId] {
        &self.history
    }

    /// Whether `action` could be fired from the current state, ignoring the
    /// validation gate.
    pub fn can_fire(&self, action: Action) -> bool {
        let Some(cfg) = self.current.as_ref().and_then(|s| self.states.get(s)) else {
            return false;
        };
        if !cfg.permits(action) {
            return false;
        }
        match action {
            Action::Back => !self.history.is_empty(),
            _ => cfg.has_dynamic(action) || cfg.target(action).is_some(),
        }
    }

    /// Apply `action` against `data`. Returns the new current state.
    pub fn fire(&mut self, action: Action, data: &WorkflowData) -> Result<StateId> {
        let current = self.current.clone().ok_or(TransitionError::NotStarted)?;
        let cfg = self
            .states
            .get(&current)
            .ok_or_else(|| TransitionError::UnknownTarget {
                from: current.clone(),
                to: current.clone(),
            })?;

        if !cfg.permits(action) {
            return Err(TransitionError::NotPermitted {
                state: current,
                action,
            }
            .into());
        }

        if action == Action::Back {
            let previous = self.history.pop().ok_or(TransitionError::EmptyHistory)?;
            log::debug!("Back: '{}' -> '{}'", current, previous);
            self.current = Some(previous.clone());
            return Ok(previous);
        }

        let dynamic = cfg.dynamic.as_ref().filter(|d| d.action == action);
        if dynamic.is_none() && cfg.target(action).is_none() {
            return Err(TransitionError::NoSuchTransition {
                state: current,
                action,
            }
            .into());
        }

        if action.is_forward() {
            if let Some(gate) = &cfg.validate {
                gate(data)?;
            }
        }

        let target = match dynamic {
            Some(d) => (d.resolve)(data)?,
            None => cfg
                .target(action)
                .cloned()
                .ok_or_else(|| TransitionError::NoSuchTransition {
                    state: current.clone(),
                    action,
                })?,
        };

        if !self.states.contains_key(&target) {
            return Err(TransitionError::UnknownTarget {
                from: current,
                to: target,
            }
            .into());
        }

        log::debug!("{}: '{}' -> '{}'", action, current, target);
        self.history.push(current);
        self.current = Some(target.clone());
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SetupError, ValidationError};

    fn linear() -> Dfa {
        let mut dfa = Dfa::new();
        dfa.add_state("a", StateConfig::new().next("b").initial())
            .unwrap();
        dfa.add_state("b", StateConfig::new().next("c")).unwrap();
        dfa.add_final_state("c").unwrap();
        dfa
    }

    #[test]
    fn test_linear_walk_and_history() {
        let mut dfa = linear();
        dfa.start().expect("valid graph");
        let data = WorkflowData::new();

        assert_eq!(dfa.fire(Action::Next, &data).unwrap(), "b");
        assert_eq!(dfa.fire(Action::Next, &data).unwrap(), "c");
        assert!(dfa.is_final());
        assert_eq!(dfa.history(), &[StateId::from("a"), StateId::from("b")]);
    }

    #[test]
    fn test_back_pops_history() {
        let mut dfa = linear();
        dfa.start().unwrap();
        let data = WorkflowData::new();
        dfa.fire(Action::Next, &data).unwrap();

        assert_eq!(dfa.fire(Action::Back, &data).unwrap(), "a");
        assert!(dfa.history().is_empty());

        let err = dfa.fire(Action::Back, &data).unwrap_err();
        assert!(matches!(
            err,
            SetupError::Transition(TransitionError::EmptyHistory)
        ));
    }

    #[test]
    fn test_fire_before_start_fails() {
        let mut dfa = linear();
        let err = dfa.fire(Action::Next, &WorkflowData::new()).unwrap_err();
        assert!(matches!(
            err,
            SetupError::Transition(TransitionError::NotStarted)
        ));
    }

    #[test]
    fn test_unknown_action_is_no_such_transition() {
        let mut dfa = linear();
        dfa.start().unwrap();
        let err = dfa.fire(Action::Finish, &WorkflowData::new()).unwrap_err();
        assert!(matches!(
            err,
            SetupError::Transition(TransitionError::NoSuchTransition { .. })
        ));
    }

    #[test]
    fn test_validation_gate_blocks_and_keeps_state() {
        let mut dfa = Dfa::new();
        dfa.add_state(
            "a",
            StateConfig::new()
                .next("b")
                .initial()
                .validate(|d| match d.get_bool("ok") {
                    Some(true) => Ok(()),
                    _ => Err(ValidationError::new("ok", "must be true")),
                }),
        )
        .unwrap();
        dfa.add_final_state("b").unwrap();
        dfa.start().unwrap();

        let mut data = WorkflowData::new();
        let err = dfa.fire(Action::Next, &data).unwrap_err();
        assert!(matches!(err, SetupError::Validation(_)));
        assert_eq!(dfa.current().unwrap(), "a");

        data.set("ok", true);
        assert_eq!(dfa.fire(Action::Next, &data).unwrap(), "b");
    }

    #[test]
    fn test_back_skips_validation_of_left_state() {
        let mut dfa = Dfa::new();
        dfa.add_state("a", StateConfig::new().next("b").initial())
            .unwrap();
        dfa.add_state(
            "b",
            StateConfig::new()
                .next("c")
                .validate(|_| Err(ValidationError::new("b", "never valid"))),
        )
        .unwrap();
        dfa.add_final_state("c").unwrap();
        dfa.start().unwrap();
        let data = WorkflowData::new();

        dfa.fire(Action::Next, &data).unwrap();
        assert_eq!(dfa.fire(Action::Back, &data).unwrap(), "a");
    }

    #[test]
    fn test_dynamic_edge_resolves_from_data() {
        let mut dfa = Dfa::new();
        dfa.add_state(
            "choose",
            StateConfig::new()
                .initial()
                .dynamic(Action::Next, ["left", "right"], |d| {
                    Ok(StateId::from(d.get_str("side").unwrap_or("left")))
                }),
        )
        .unwrap();
        dfa.add_state("left", StateConfig::new().next("done")).unwrap();
        dfa.add_state("right", StateConfig::new().next("done")).unwrap();
        dfa.add_final_state("done").unwrap();
        dfa.start().unwrap();

        let mut data = WorkflowData::new();
        data.set("side", "right");
        assert_eq!(dfa.fire(Action::Next, &data).unwrap(), "right");
    }

    #[test]
    fn test_dynamic_edge_to_undeclared_state_fails_at_fire() {
        let mut dfa = Dfa::new();
        dfa.add_state(
            "choose",
            StateConfig::new()
                .initial()
                .dynamic(Action::Next, Vec::<StateId>::new(), |_| {
                    Ok(StateId::from("nowhere"))
                }),
        )
        .unwrap();
        dfa.add_final_state("done").unwrap();
        dfa.start().unwrap();

        let err = dfa.fire(Action::Next, &WorkflowData::new()).unwrap_err();
        assert!(matches!(
            err,
            SetupError::Transition(TransitionError::UnknownTarget { .. })
        ));
        assert_eq!(dfa.current().unwrap(), "choose");
    }

    #[test]
    fn test_validate_rejects_dangling_target() {
        let mut dfa = Dfa::new();
        dfa.add_state("a", StateConfig::new().next("ghost").initial())
            .unwrap();
        dfa.add_final_state("b").unwrap();

        assert!(matches!(
            dfa.validate(),
            Err(BuildError::DanglingTarget { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_unreachable_final() {
        let mut dfa = Dfa::new();
        dfa.add_state("a", StateConfig::new().next("b").initial())
            .unwrap();
        dfa.add_state("b", StateConfig::new().on(Action::Finish, "a"))
            .unwrap();
        dfa.add_final_state("end").unwrap();

        assert_eq!(
            dfa.validate(),
            Err(BuildError::UnreachableFinal(StateId::from("end")))
        );
    }

    #[test]
    fn test_validate_initial_state_count() {
        let mut dfa = Dfa::new();
        dfa.add_state("a", StateConfig::new().next("b")).unwrap();
        dfa.add_final_state("b").unwrap();
        assert_eq!(dfa.validate(), Err(BuildError::NoInitialState));

        let mut dfa = Dfa::new();
        dfa.add_state("a", StateConfig::new().next("c").initial())
            .unwrap();
        dfa.add_state("b", StateConfig::new().next("c").initial())
            .unwrap();
        dfa.add_final_state("c").unwrap();
        assert!(matches!(
            dfa.validate(),
            Err(BuildError::MultipleInitialStates(ref s)) if s.len() == 2
        ));
    }

    #[test]
    fn test_validate_requires_final_state() {
        let mut dfa = Dfa::new();
        dfa.add_state("a", StateConfig::new().next("a").initial())
            .unwrap();
        assert_eq!(dfa.validate(), Err(BuildError::NoFinalState));
    }

    #[test]
    fn test_validate_rejects_dead_end() {
        let mut dfa = Dfa::new();
        dfa.add_state("a", StateConfig::new().next("b").initial())
            .unwrap();
        dfa.add_state("b", StateConfig::new()).unwrap();
        dfa.add_final_state("c").unwrap();
        assert_eq!(dfa.validate(), Err(BuildError::DeadEnd(StateId::from("b"))));
    }

    #[test]
    fn test_validate_rejects_static_dynamic_conflict() {
        let mut dfa = Dfa::new();
        dfa.add_state(
            "a",
            StateConfig::new()
                .next("b")
                .initial()
                .dynamic(Action::Next, ["b"], |_| Ok(StateId::from("b"))),
        )
        .unwrap();
        dfa.add_final_state("b").unwrap();
        assert!(matches!(
            dfa.validate(),
            Err(BuildError::ConflictingTransition { .. })
        ));
    }

    #[test]
    fn test_duplicate_state_rejected() {
        let mut dfa = linear();
        assert_eq!(
            dfa.add_state("b", StateConfig::new()),
            Err(BuildError::DuplicateState(StateId::from("b")))
        );
    }

    #[test]
    fn test_splice_redirects_edge() {
        let mut dfa = linear();
        dfa.splice(&StateId::from("a"), &StateId::from("b"), "x", StateConfig::new())
            .unwrap();
        dfa.validate().unwrap();

        let order: Vec<&str> = dfa.states().map(StateId::as_str).collect();
        assert_eq!(order, vec!["a", "x", "b", "c"]);

        dfa.start().unwrap();
        let data = WorkflowData::new();
        assert_eq!(dfa.fire(Action::Next, &data).unwrap(), "x");
        assert_eq!(dfa.fire(Action::Next, &data).unwrap(), "b");
    }

    #[test]
    fn test_splice_without_edge_fails() {
        let mut dfa = linear();
        let err = dfa
            .splice(&StateId::from("a"), &StateId::from("c"), "x", StateConfig::new())
            .unwrap_err();
        assert!(matches!(err, BuildError::SpliceEdgeMissing { .. }));
        assert!(!dfa.contains("x"));
    }

    #[test]
    fn test_can_fire_respects_flags_and_history() {
        let mut dfa = linear();
        assert!(!dfa.can_fire(Action::Next));
        dfa.start().unwrap();

        assert!(dfa.can_fire(Action::Next));
        assert!(!dfa.can_fire(Action::Back));
        assert!(!dfa.can_fire(Action::Finish));

        dfa.fire(Action::Next, &WorkflowData::new()).unwrap();
        assert!(dfa.can_fire(Action::Back));
    }
}
