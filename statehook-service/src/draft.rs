//! Built-in review workflow for entities without a schema.
//!
//! ```text
//! CREATED --SUBMIT--> IN_REVIEW --APPROVE--> APPROVED --RESET--> CREATED
//!                     IN_REVIEW --REJECT---> REJECTED --RESUBMIT--> IN_REVIEW
//! ```
//!
//! `SUBMIT` requires content longer than ten characters.

use crate::service::EntityContext;
use serde_json::Value;
use statehook_core::{
    ActionError, Definition, DefinitionBuilder, Effect, Guard, StateHooks, TransitionOptions,
};

/// Minimum content length (exclusive) for submission.
pub const MIN_CONTENT_CHARS: usize = 10;

fn announce(message: &'static str) -> Effect<EntityContext> {
    Effect::new(move |ctx: &EntityContext| {
        let id = ctx.read()["id"].as_str().unwrap_or_default().to_string();
        tracing::info!(entity = %id, "{}", message);
        Ok::<(), ActionError>(())
    })
    .named("announce")
}

fn content_long_enough(ctx: &EntityContext) -> bool {
    let chars = match &ctx.read()["content"] {
        Value::String(s) => s.chars().count(),
        _ => 0,
    };
    if chars <= MIN_CONTENT_CHARS {
        tracing::warn!(chars, "validation failed: content too short");
        return false;
    }
    true
}

/// Builds the default review workflow.
pub fn draft_definition() -> Definition<EntityContext> {
    DefinitionBuilder::new("CREATED")
        .add_state_with_hooks(
            "CREATED",
            StateHooks::new().on_enter(announce("entered CREATED state")),
        )
        .add_state_with_hooks(
            "IN_REVIEW",
            StateHooks::new().on_enter(announce("now under review, alerting editors")),
        )
        .add_state_with_hooks(
            "APPROVED",
            StateHooks::new().on_enter(announce("approved")),
        )
        .add_state_with_hooks(
            "REJECTED",
            StateHooks::new().on_enter(announce("rejected, needs changes")),
        )
        .add_transition_with(
            "CREATED",
            "IN_REVIEW",
            "SUBMIT",
            TransitionOptions::new()
                .guard(Guard::new(content_long_enough).named("content longer than 10 chars")),
        )
        .add_transition("IN_REVIEW", "APPROVED", "APPROVE")
        .add_transition("IN_REVIEW", "REJECTED", "REJECT")
        .add_transition("REJECTED", "IN_REVIEW", "RESUBMIT")
        .add_transition("APPROVED", "CREATED", "RESET")
        .build()
}
