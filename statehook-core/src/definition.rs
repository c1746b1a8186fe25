//! State machine definition types.
//!
//! A [`Definition`] is an immutable table of states (each with ordered enter
//! and exit hooks) and transitions (each with ordered guards and effects).
//! It is assembled with a [`DefinitionBuilder`], either by hand:
//!
//! ```ignore
//! let definition = DefinitionBuilder::new("CREATED")
//!     .add_state_with_hooks("IN_REVIEW", StateHooks::new().on_enter(notify_editors))
//!     .add_transition_with(
//!         "CREATED",
//!         "IN_REVIEW",
//!         "SUBMIT",
//!         TransitionOptions::new().guard(content_long_enough),
//!     )
//!     .add_transition("IN_REVIEW", "CREATED", "REJECT")
//!     .build();
//! ```
//!
//! or by compiling a [`WorkflowSchema`](crate::schema::WorkflowSchema) through
//! the [`WorkflowFactory`](crate::factory::WorkflowFactory).
//!
//! Transition lookup is first-match in insertion order. Duplicate
//! `(from, event)` pairs are accepted, but only the first one can ever fire;
//! [`Definition::shadowed_transitions`] lists the unreachable ones.

use crate::action::Effect;
use crate::guard::Guard;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A state in the machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(pub String);

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for State {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for State {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for State {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for State {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for State {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Ordered lifecycle hooks of a state.
pub struct StateHooks<C> {
    pub on_enter: Vec<Effect<C>>,
    pub on_exit: Vec<Effect<C>>,
}

impl<C> StateHooks<C> {
    pub fn new() -> Self {
        Self {
            on_enter: Vec::new(),
            on_exit: Vec::new(),
        }
    }

    pub fn on_enter(mut self, effect: Effect<C>) -> Self {
        self.on_enter.push(effect);
        self
    }

    pub fn on_exit(mut self, effect: Effect<C>) -> Self {
        self.on_exit.push(effect);
        self
    }
}

impl<C> Default for StateHooks<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// A state and its hooks.
pub struct StateDefinition<C> {
    pub name: State,
    pub on_enter: Vec<Effect<C>>,
    pub on_exit: Vec<Effect<C>>,
}

impl<C> StateDefinition<C> {
    fn empty(name: State) -> Self {
        Self {
            name,
            on_enter: Vec::new(),
            on_exit: Vec::new(),
        }
    }
}

impl<C> fmt::Debug for StateDefinition<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateDefinition")
            .field("name", &self.name)
            .field("on_enter", &self.on_enter)
            .field("on_exit", &self.on_exit)
            .finish()
    }
}

/// Guards and effects attached to a transition.
pub struct TransitionOptions<C> {
    pub guards: Vec<Guard<C>>,
    pub effects: Vec<Effect<C>>,
}

impl<C> TransitionOptions<C> {
    pub fn new() -> Self {
        Self {
            guards: Vec::new(),
            effects: Vec::new(),
        }
    }

    pub fn guard(mut self, guard: Guard<C>) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn effect(mut self, effect: Effect<C>) -> Self {
        self.effects.push(effect);
        self
    }
}

impl<C> Default for TransitionOptions<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// A transition in the machine.
pub struct Transition<C> {
    pub from: State,
    pub to: State,
    pub event: String,
    /// ANDed in order, short-circuiting.
    pub guards: Vec<Guard<C>>,
    pub effects: Vec<Effect<C>>,
}

impl<C> fmt::Debug for Transition<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("event", &self.event)
            .field("guards", &self.guards)
            .field("effects", &self.effects)
            .finish()
    }
}

/// Assembles a [`Definition`].
pub struct DefinitionBuilder<C> {
    initial: State,
    states: HashMap<State, StateDefinition<C>>,
    transitions: Vec<Transition<C>>,
}

impl<C> DefinitionBuilder<C> {
    /// Starts a definition. The initial state is registered immediately.
    pub fn new(initial: impl Into<State>) -> Self {
        let initial = initial.into();
        let mut states = HashMap::new();
        states.insert(initial.clone(), StateDefinition::empty(initial.clone()));

        Self {
            initial,
            states,
            transitions: Vec::new(),
        }
    }

    /// Registers a state without hooks. No-op if the state is already known.
    pub fn add_state(mut self, name: impl Into<State>) -> Self {
        let name = name.into();
        self.states
            .entry(name.clone())
            .or_insert_with(|| StateDefinition::empty(name));
        self
    }

    /// Registers a state, replacing any hooks it already had.
    pub fn add_state_with_hooks(mut self, name: impl Into<State>, hooks: StateHooks<C>) -> Self {
        let name = name.into();
        self.states.insert(
            name.clone(),
            StateDefinition {
                name,
                on_enter: hooks.on_enter,
                on_exit: hooks.on_exit,
            },
        );
        self
    }

    /// Adds an unguarded transition without effects.
    pub fn add_transition(
        self,
        from: impl Into<State>,
        to: impl Into<State>,
        event: impl Into<String>,
    ) -> Self {
        self.add_transition_with(from, to, event, TransitionOptions::new())
    }

    /// Adds a transition. Unknown `from`/`to` states are registered with
    /// empty hooks.
    pub fn add_transition_with(
        self,
        from: impl Into<State>,
        to: impl Into<State>,
        event: impl Into<String>,
        options: TransitionOptions<C>,
    ) -> Self {
        let from = from.into();
        let to = to.into();
        let mut builder = self.add_state(from.clone()).add_state(to.clone());

        builder.transitions.push(Transition {
            from,
            to,
            event: event.into(),
            guards: options.guards,
            effects: options.effects,
        });
        builder
    }

    pub fn build(self) -> Definition<C> {
        Definition {
            initial: self.initial,
            states: self.states,
            transitions: self.transitions,
        }
    }
}

/// Validated, immutable state machine definition.
pub struct Definition<C> {
    initial: State,
    states: HashMap<State, StateDefinition<C>>,
    transitions: Vec<Transition<C>>,
}

impl<C> Definition<C> {
    pub fn initial_state(&self) -> &State {
        &self.initial
    }

    /// Returns the definition of a state, if known.
    pub fn state(&self, name: &str) -> Option<&StateDefinition<C>> {
        self.states.get(name)
    }

    /// Returns true if the given state is part of this machine.
    pub fn has_state(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    /// All state names, sorted.
    pub fn state_names(&self) -> Vec<&State> {
        let mut names: Vec<&State> = self.states.keys().collect();
        names.sort();
        names
    }

    /// All transitions in insertion order.
    pub fn transitions(&self) -> &[Transition<C>] {
        &self.transitions
    }

    /// Looks up the first transition for the given state and event.
    pub fn get_transition(&self, state: &str, event: &str) -> Option<&Transition<C>> {
        self.transitions
            .iter()
            .find(|t| t.from == state && t.event == event)
    }

    /// Returns all transitions leaving the given state.
    pub fn transitions_from<'a>(&'a self, state: &'a str) -> impl Iterator<Item = &'a Transition<C>> {
        self.transitions.iter().filter(move |t| t.from == state)
    }

    /// Returns the distinct events leaving the given state, in insertion order.
    pub fn events_from(&self, state: &str) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.transitions
            .iter()
            .filter(|t| t.from == state)
            .map(|t| t.event.as_str())
            .filter(|e| seen.insert(*e))
            .collect()
    }

    /// Transitions that can never fire because an earlier transition has
    /// the same `(from, event)` pair.
    pub fn shadowed_transitions(&self) -> Vec<&Transition<C>> {
        let mut seen = HashSet::new();
        self.transitions
            .iter()
            .filter(|t| !seen.insert((t.from.as_str(), t.event.as_str())))
            .collect()
    }
}

impl<C> fmt::Debug for Definition<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("initial", &self.initial)
            .field("states", &self.state_names())
            .field("transitions", &self.transitions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn sample_definition() -> Definition<Value> {
        DefinitionBuilder::new("CREATED")
            .add_state_with_hooks(
                "CREATED",
                StateHooks::new().on_exit(Effect::noop().named("exit-created")),
            )
            .add_state_with_hooks(
                "IN_REVIEW",
                StateHooks::new().on_enter(Effect::noop().named("enter-review")),
            )
            .add_state("PUBLISHED")
            .add_state("ARCHIVED")
            .add_transition_with(
                "CREATED",
                "IN_REVIEW",
                "SUBMIT",
                TransitionOptions::new()
                    .guard(Guard::new(|ctx: &Value| ctx["value"].as_i64().unwrap_or(0) > 0)),
            )
            .add_transition("IN_REVIEW", "PUBLISHED", "APPROVE")
            .add_transition("IN_REVIEW", "CREATED", "REJECT")
            .add_transition("PUBLISHED", "ARCHIVED", "ARCHIVE")
            .build()
    }

    #[test]
    fn test_build_definition() {
        let def = sample_definition();

        assert_eq!(def.initial_state().as_str(), "CREATED");
        assert_eq!(def.state_names().len(), 4);
        assert_eq!(def.transitions().len(), 4);
        assert_eq!(def.state("CREATED").unwrap().on_exit.len(), 1);
        assert_eq!(def.state("IN_REVIEW").unwrap().on_enter.len(), 1);
    }

    #[test]
    fn test_transition_lookup() {
        let def = sample_definition();

        let t = def.get_transition("CREATED", "SUBMIT").unwrap();
        assert_eq!(t.to, "IN_REVIEW");
        assert_eq!(t.guards.len(), 1);

        assert!(def.get_transition("CREATED", "APPROVE").is_none());
        assert!(def.get_transition("NOWHERE", "SUBMIT").is_none());
    }

    #[test]
    fn test_transition_registers_unknown_states() {
        let def: Definition<Value> = DefinitionBuilder::new("a").add_transition("b", "c", "GO").build();

        assert!(def.has_state("a"));
        assert!(def.has_state("b"));
        assert!(def.has_state("c"));
        assert!(def.state("c").unwrap().on_enter.is_empty());
    }

    #[test]
    fn test_add_state_without_hooks_keeps_existing_hooks() {
        let def: Definition<Value> = DefinitionBuilder::new("a")
            .add_state_with_hooks("b", StateHooks::new().on_enter(Effect::noop()))
            .add_state("b")
            .add_transition("a", "b", "GO")
            .build();

        assert_eq!(def.state("b").unwrap().on_enter.len(), 1);
    }

    #[test]
    fn test_add_state_with_hooks_replaces() {
        let def: Definition<Value> = DefinitionBuilder::new("a")
            .add_state_with_hooks("a", StateHooks::new().on_exit(Effect::noop()))
            .add_state_with_hooks("a", StateHooks::new().on_enter(Effect::noop()))
            .build();

        let a = def.state("a").unwrap();
        assert!(a.on_exit.is_empty());
        assert_eq!(a.on_enter.len(), 1);
    }

    #[test]
    fn test_first_match_wins() {
        let def: Definition<Value> = DefinitionBuilder::new("a")
            .add_transition("a", "b", "GO")
            .add_transition("a", "c", "GO")
            .build();

        assert_eq!(def.get_transition("a", "GO").unwrap().to, "b");

        let shadowed = def.shadowed_transitions();
        assert_eq!(shadowed.len(), 1);
        assert_eq!(shadowed[0].to, "c");
    }

    #[test]
    fn test_events_from() {
        let def: Definition<Value> = DefinitionBuilder::new("review")
            .add_transition("review", "published", "APPROVE")
            .add_transition("review", "draft", "REJECT")
            .add_transition("review", "archived", "APPROVE")
            .add_transition("draft", "review", "SUBMIT")
            .build();

        assert_eq!(def.events_from("review"), vec!["APPROVE", "REJECT"]);
        assert_eq!(def.events_from("draft"), vec!["SUBMIT"]);
        assert!(def.events_from("published").is_empty());
        assert_eq!(def.transitions_from("review").count(), 3);
    }

    #[test]
    fn test_events_outlive_state_argument() {
        let def: Definition<Value> = DefinitionBuilder::new("review")
            .add_transition("review", "published", "APPROVE")
            .build();

        let events = {
            let state = String::from("review");
            def.events_from(&state)
        };
        assert_eq!(events, vec!["APPROVE"]);
    }

    #[test]
    fn test_state_serde() {
        let state = State::from("paid");
        assert_eq!(serde_json::to_value(&state).unwrap(), Value::from("paid"));
        assert_eq!(state.to_string(), "paid");
    }
}
