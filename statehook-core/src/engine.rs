//! State machine execution.
//!
//! [`StateMachine::trigger`] advances the machine at most one step:
//!
//! 1. Find the first transition for `(current_state, event)`; none -> rejected.
//! 2. Evaluate guards in order, stopping at the first `false` -> rejected.
//! 3. Run the source state's `on_exit` hooks.
//! 4. Run the transition's effects.
//! 5. Commit `current_state := to`.
//! 6. Run the target state's `on_enter` hooks.
//!
//! Rejections change nothing and run no hooks. Sync-mode hooks are awaited in
//! declaration order; async-mode hooks are spawned and never joined. A failing
//! sync hook aborts the remaining steps and surfaces as
//! [`CoreError::HookFailed`]; failures in steps 3-4 leave the state untouched,
//! failures in step 6 leave it committed.

use crate::action::{spawn_detached, ActionMode, Effect, EffectFailureSink, EffectSite};
use crate::context::Context;
use crate::definition::{Definition, State};
use crate::error::{CoreError, HookPhase};
use std::sync::Arc;

/// Why an event was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No transition leaves `state` on `event`.
    NoTransition { state: State, event: String },
    /// The guard at `index` evaluated false.
    GuardFailed {
        state: State,
        event: String,
        index: usize,
        guard: String,
    },
}

impl Rejection {
    /// Human-readable reason, suitable for API responses.
    pub fn message(&self) -> String {
        match self {
            Rejection::NoTransition { state, event } => {
                format!("no transition from state '{}' on event '{}'", state, event)
            }
            Rejection::GuardFailed { event, guard, .. } => {
                format!("condition '{}' failed for event '{}'", guard, event)
            }
        }
    }
}

/// Result of triggering an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Transitioned { from: State, to: State },
    Rejected(Rejection),
}

impl TriggerOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TriggerOutcome::Transitioned { .. })
    }
}

/// A definition bound to a current state and a context.
pub struct StateMachine<C> {
    definition: Arc<Definition<C>>,
    current_state: State,
    context: Arc<C>,
    failure_sink: Option<EffectFailureSink>,
}

impl<C: Context> StateMachine<C> {
    /// Creates a machine. A missing or empty `state` starts at the
    /// definition's initial state.
    pub fn new(definition: Arc<Definition<C>>, state: Option<State>, context: Arc<C>) -> Self {
        let current_state = match state {
            Some(s) if !s.is_empty() => s,
            _ => definition.initial_state().clone(),
        };

        Self {
            definition,
            current_state,
            context,
            failure_sink: None,
        }
    }

    /// Reports detached effect failures to `sink` in addition to the log.
    pub fn with_failure_sink(mut self, sink: EffectFailureSink) -> Self {
        self.failure_sink = Some(sink);
        self
    }

    pub fn current_state(&self) -> &State {
        &self.current_state
    }

    pub fn context(&self) -> &Arc<C> {
        &self.context
    }

    pub fn definition(&self) -> &Arc<Definition<C>> {
        &self.definition
    }

    /// Applies `event` to the current state.
    ///
    /// Async-mode effects are spawned on the current tokio runtime; without
    /// one they are skipped and reported as detached failures.
    pub async fn trigger(&mut self, event: &str) -> Result<TriggerOutcome, CoreError> {
        let definition = Arc::clone(&self.definition);

        let Some(transition) = definition.get_transition(self.current_state.as_str(), event)
        else {
            tracing::warn!(
                state = %self.current_state,
                event = %event,
                "no transition found"
            );
            return Ok(TriggerOutcome::Rejected(Rejection::NoTransition {
                state: self.current_state.clone(),
                event: event.to_string(),
            }));
        };

        for (index, guard) in transition.guards.iter().enumerate() {
            if !guard.check(&self.context).await {
                tracing::warn!(
                    state = %self.current_state,
                    event = %event,
                    guard = %guard.label(),
                    "condition failed"
                );
                return Ok(TriggerOutcome::Rejected(Rejection::GuardFailed {
                    state: self.current_state.clone(),
                    event: event.to_string(),
                    index,
                    guard: guard.label().to_string(),
                }));
            }
        }

        let from = self.current_state.clone();
        let to = transition.to.clone();
        let step = Step {
            from: &from,
            to: &to,
            event,
        };

        if let Some(source) = definition.state(from.as_str()) {
            self.run_hooks(&source.on_exit, HookPhase::Exit, &step, false)
                .await?;
        }

        self.run_hooks(&transition.effects, HookPhase::Transition, &step, false)
            .await?;

        self.current_state = to.clone();

        if let Some(target) = definition.state(to.as_str()) {
            self.run_hooks(&target.on_enter, HookPhase::Enter, &step, true)
                .await?;
        }

        tracing::info!(from = %from, to = %to, event = %event, "transitioned");
        Ok(TriggerOutcome::Transitioned { from, to })
    }

    async fn run_hooks(
        &self,
        effects: &[Effect<C>],
        phase: HookPhase,
        step: &Step<'_>,
        committed: bool,
    ) -> Result<(), CoreError> {
        for effect in effects {
            match effect.mode() {
                ActionMode::Sync => {
                    effect
                        .invoke(Arc::clone(&self.context))
                        .await
                        .map_err(|source| CoreError::HookFailed {
                            phase,
                            action: effect.label().to_string(),
                            from: step.from.to_string(),
                            to: step.to.to_string(),
                            event: step.event.to_string(),
                            committed,
                            source,
                        })?;
                }
                ActionMode::Async => spawn_detached(
                    effect,
                    Arc::clone(&self.context),
                    EffectSite {
                        phase,
                        from: step.from.to_string(),
                        to: step.to.to_string(),
                        event: step.event.to_string(),
                    },
                    self.failure_sink.clone(),
                ),
            }
        }
        Ok(())
    }
}

struct Step<'a> {
    from: &'a State,
    to: &'a State,
    event: &'a str,
}
