//! Definition factory.
//!
//! Compiles [`WorkflowSchema`]s into [`Definition`]s against an
//! [`ActionRegistry`] and hands out instances bound to a context. Compiled
//! definitions are cached by schema id and invalidated when the schema's
//! checksum changes.

use crate::action::{ActionRegistry, EffectFailureSink};
use crate::context::Context;
use crate::definition::{Definition, DefinitionBuilder, State, StateHooks, TransitionOptions};
use crate::error::CoreError;
use crate::guard::ConditionCompiler;
use crate::instance::WorkflowInstance;
use crate::schema::WorkflowSchema;
use dashmap::DashMap;
use std::sync::Arc;

struct CachedDefinition<C> {
    checksum: String,
    definition: Arc<Definition<C>>,
}

/// Builds definitions and instances.
pub struct WorkflowFactory<C> {
    registry: Arc<ActionRegistry<C>>,
    cache: DashMap<String, CachedDefinition<C>>,
    cache_enabled: bool,
    failure_sink: Option<EffectFailureSink>,
}

impl<C: Context> WorkflowFactory<C> {
    /// Creates a factory with caching enabled.
    pub fn new(registry: Arc<ActionRegistry<C>>) -> Self {
        Self {
            registry,
            cache: DashMap::new(),
            cache_enabled: true,
            failure_sink: None,
        }
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Instances created by this factory report detached effect failures
    /// to `sink`.
    pub fn with_failure_sink(mut self, sink: EffectFailureSink) -> Self {
        self.failure_sink = Some(sink);
        self
    }

    pub fn registry(&self) -> &Arc<ActionRegistry<C>> {
        &self.registry
    }

    /// Compiles `schema` into a new definition, bypassing the cache.
    pub fn compile(&self, schema: &WorkflowSchema) -> Result<Definition<C>, CoreError> {
        schema.validate()?;

        let mut builder = DefinitionBuilder::new(schema.initial_state.as_str());

        for state in &schema.states {
            builder = builder.add_state_with_hooks(
                state.name.as_str(),
                StateHooks {
                    on_enter: self.registry.compile_all(&state.on_enter),
                    on_exit: self.registry.compile_all(&state.on_exit),
                },
            );
        }

        for t in &schema.transitions {
            builder = builder.add_transition_with(
                t.from.as_str(),
                t.to.as_str(),
                t.event.as_str(),
                TransitionOptions {
                    guards: ConditionCompiler::compile_all::<C>(&t.conditions),
                    effects: self.registry.compile_all(&t.actions),
                },
            );
        }

        let definition = builder.build();

        for t in definition.shadowed_transitions() {
            tracing::warn!(
                schema = %schema.id,
                from = %t.from,
                to = %t.to,
                event = %t.event,
                "transition is shadowed by an earlier one and will never fire"
            );
        }

        tracing::debug!(
            schema = %schema.id,
            states = definition.state_names().len(),
            transitions = definition.transitions().len(),
            "compiled schema"
        );

        Ok(definition)
    }

    /// Returns the compiled definition for `schema`, reusing a cached one
    /// while the schema's checksum is unchanged.
    pub fn definition_for(
        &self,
        schema: &WorkflowSchema,
    ) -> Result<Arc<Definition<C>>, CoreError> {
        if !self.cache_enabled || schema.id.is_empty() {
            return Ok(Arc::new(self.compile(schema)?));
        }

        let checksum = schema.checksum();
        let cached = self
            .cache
            .get(&schema.id)
            .filter(|entry| entry.checksum == checksum)
            .map(|entry| Arc::clone(&entry.definition));

        if let Some(definition) = cached {
            return Ok(definition);
        }

        let definition = Arc::new(self.compile(schema)?);
        self.cache.insert(
            schema.id.clone(),
            CachedDefinition {
                checksum,
                definition: Arc::clone(&definition),
            },
        );
        Ok(definition)
    }

    /// Drops the cached definition of schema `id`.
    pub fn invalidate(&self, id: &str) -> bool {
        self.cache.remove(id).is_some()
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    /// Creates an instance from `schema` if given, else from `default`.
    pub fn create_instance(
        &self,
        schema: Option<&WorkflowSchema>,
        default: Option<Arc<Definition<C>>>,
        state: Option<State>,
        context: Arc<C>,
    ) -> Result<WorkflowInstance<C>, CoreError> {
        let definition = match (schema, default) {
            (Some(schema), _) => self.definition_for(schema)?,
            (None, Some(default)) => default,
            (None, None) => return Err(CoreError::NoDefinition),
        };

        let instance = WorkflowInstance::new(definition, state, context);
        Ok(match &self.failure_sink {
            Some(sink) => instance.with_failure_sink(sink.clone()),
            None => instance,
        })
    }
}
