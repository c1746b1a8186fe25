//! # statehook-core
//!
//! Schema-drivable finite state machine engine.
//!
//! This crate provides:
//! - Definition builder and immutable definitions
//! - Declarative condition compilation
//! - Named action registry for hooks and effects
//! - Guarded, hook-ordered transition execution
//! - Instances with transition history
//! - A factory that compiles and caches schema definitions

pub mod action;
pub mod context;
pub mod definition;
pub mod engine;
pub mod error;
pub mod factory;
pub mod guard;
pub mod instance;
pub mod schema;

pub use action::{
    failure_channel, ActionHandler, ActionMode, ActionRegistry, Effect, EffectFailure,
    EffectFailureSink,
};
pub use context::Context;
pub use definition::{
    Definition, DefinitionBuilder, State, StateDefinition, StateHooks, Transition,
    TransitionOptions,
};
pub use engine::{Rejection, StateMachine, TriggerOutcome};
pub use error::{ActionError, CoreError, HookPhase};
pub use factory::WorkflowFactory;
pub use guard::{ConditionCompiler, Guard, Operator};
pub use instance::{TransitionRecord, WorkflowInstance};
pub use schema::{
    ActionConfig, ConditionConfig, SerializedState, SerializedTransition, WorkflowSchema,
};
