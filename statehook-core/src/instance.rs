//! Workflow instances.
//!
//! A [`WorkflowInstance`] wraps a [`StateMachine`] and keeps an append-only
//! transition history alongside it.

use crate::action::EffectFailureSink;
use crate::context::Context;
use crate::definition::{Definition, State};
use crate::engine::{StateMachine, TriggerOutcome};
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One applied transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: State,
    pub to: State,
    pub event: String,
    pub timestamp: DateTime<Utc>,
}

/// A running workflow bound to one entity.
pub struct WorkflowInstance<C> {
    machine: StateMachine<C>,
    history: Vec<TransitionRecord>,
}

impl<C: Context> WorkflowInstance<C> {
    /// Creates an instance in `state`, or in the definition's initial state
    /// when `state` is `None` or empty.
    pub fn new(definition: Arc<Definition<C>>, state: Option<State>, context: Arc<C>) -> Self {
        Self {
            machine: StateMachine::new(definition, state, context),
            history: Vec::new(),
        }
    }

    pub fn with_failure_sink(mut self, sink: EffectFailureSink) -> Self {
        self.machine = self.machine.with_failure_sink(sink);
        self
    }

    /// Triggers `event` and records the transition once the state is
    /// committed, including when an enter hook fails afterwards.
    pub async fn trigger(&mut self, event: &str) -> Result<TriggerOutcome, CoreError> {
        let result = self.machine.trigger(event).await;

        match &result {
            Ok(TriggerOutcome::Transitioned { from, to }) => {
                self.record(from.clone(), to.clone(), event);
            }
            Err(CoreError::HookFailed {
                committed: true,
                from,
                to,
                ..
            }) => {
                self.record(State::from(from.as_str()), State::from(to.as_str()), event);
            }
            _ => {}
        }

        result
    }

    fn record(&mut self, from: State, to: State, event: &str) {
        self.history.push(TransitionRecord {
            from,
            to,
            event: event.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn current_state(&self) -> &State {
        self.machine.current_state()
    }

    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    /// Whether a transition exists for `event` from the current state.
    /// Guards are not evaluated.
    pub fn can_transition(&self, event: &str) -> bool {
        self.definition()
            .get_transition(self.current_state().as_str(), event)
            .is_some()
    }

    /// Distinct events with a transition from the current state, in
    /// declaration order. Guards are not evaluated.
    pub fn available_events(&self) -> Vec<String> {
        self.definition()
            .events_from(self.current_state().as_str())
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn context(&self) -> &Arc<C> {
        self.machine.context()
    }

    pub fn definition(&self) -> &Arc<Definition<C>> {
        self.machine.definition()
    }
}
