//! Workflow service.
//!
//! Binds stored entities to workflow definitions. Each transition builds a
//! fresh instance seeded with the entity's stored status, triggers the event
//! and writes the new status back with a compare-and-set, so two concurrent
//! transitions from the same status cannot both be persisted.

use crate::config::Config;
use crate::draft::draft_definition;
use crate::error::ServiceError;
use crate::store::{Entity, EntityStore, SchemaStore};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use statehook_core::{
    ActionRegistry, Definition, EffectFailureSink, State, TriggerOutcome, WorkflowFactory,
    WorkflowSchema,
};
use std::sync::Arc;

/// Context handed to guards and hooks: the entity as JSON.
pub type EntityContext = RwLock<Value>;

/// Entity plus the events currently available to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityView {
    #[serde(flatten)]
    pub entity: Entity,
    pub available_events: Vec<String>,
}

/// Result of [`WorkflowService::transition`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TransitionResponse {
    #[serde(rename_all = "camelCase")]
    Applied {
        success: bool,
        entity: Entity,
        allowed_events: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Rejected {
        success: bool,
        message: String,
        current_status: String,
    },
}

impl TransitionResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, TransitionResponse::Applied { .. })
    }
}

/// Entity workflow operations.
pub struct WorkflowService {
    entities: EntityStore,
    schemas: SchemaStore,
    factory: WorkflowFactory<EntityContext>,
    default_definition: Arc<Definition<EntityContext>>,
    default_status: String,
}

impl WorkflowService {
    /// Creates a service using `registry` to resolve schema actions.
    pub fn new(config: &Config, registry: ActionRegistry<EntityContext>) -> Self {
        let factory = WorkflowFactory::new(Arc::new(registry))
            .with_cache(config.engine.cache_definitions);

        Self {
            entities: EntityStore::new(),
            schemas: SchemaStore::new(),
            factory,
            default_definition: Arc::new(draft_definition()),
            default_status: config.engine.default_status.clone(),
        }
    }

    /// Creates a service with the built-in actions and preloads schemas
    /// from the configured directory.
    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        let service = Self::new(config, ActionRegistry::with_builtins());
        if let Some(dir) = &config.schemas.dir {
            let loaded = service.schemas.load_dir(dir)?;
            tracing::info!(count = loaded.len(), dir = %dir.display(), "preloaded schemas");
        }
        Ok(service)
    }

    /// Reports detached effect failures to `sink`.
    pub fn with_failure_sink(mut self, sink: EffectFailureSink) -> Self {
        self.factory = self.factory.with_failure_sink(sink);
        self
    }

    /// Replaces the definition used for entities without a schema.
    pub fn with_default_definition(mut self, definition: Definition<EntityContext>) -> Self {
        self.default_definition = Arc::new(definition);
        self
    }

    // =========================================================================
    // Schemas
    // =========================================================================

    /// Stores a schema. Storing under an existing id replaces it.
    pub fn create_schema(&self, schema: WorkflowSchema) -> Result<WorkflowSchema, ServiceError> {
        let stored = self.schemas.insert(schema)?;
        self.factory.invalidate(&stored.id);
        tracing::info!(schema = %stored.id, name = %stored.name, "stored workflow schema");
        Ok(stored)
    }

    pub fn get_schema(&self, id: &str) -> Result<WorkflowSchema, ServiceError> {
        self.schemas.get(id)
    }

    pub fn list_schemas(&self) -> Vec<WorkflowSchema> {
        self.schemas.list()
    }

    /// Removes a schema. Schemas still bound to entities are kept.
    pub fn delete_schema(&self, id: &str) -> Result<WorkflowSchema, ServiceError> {
        let bound = self
            .entities
            .list()
            .iter()
            .filter(|e| e.workflow_id.as_deref() == Some(id))
            .count();
        if bound > 0 {
            return Err(ServiceError::SchemaInUse {
                id: id.to_string(),
                entities: bound,
            });
        }

        let removed = self
            .schemas
            .remove(id)
            .ok_or_else(|| ServiceError::SchemaNotFound(id.to_string()))?;
        self.factory.invalidate(id);
        Ok(removed)
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Creates an entity in its workflow's initial state.
    pub fn create_entity(
        &self,
        title: impl Into<String>,
        content: impl Into<String>,
        workflow_id: Option<String>,
    ) -> Result<EntityView, ServiceError> {
        let status = match &workflow_id {
            Some(id) => self.schemas.get(id)?.initial_state,
            None => self.default_status.clone(),
        };

        let entity = self.entities.create(title, content, status, workflow_id);
        tracing::debug!(entity = %entity.id, status = %entity.status, "created entity");
        self.view(entity)
    }

    pub fn get_entity(&self, id: &str) -> Result<EntityView, ServiceError> {
        self.view(self.entities.get(id)?)
    }

    pub fn list_entities(&self) -> Result<Vec<EntityView>, ServiceError> {
        self.entities
            .list()
            .into_iter()
            .map(|entity| self.view(entity))
            .collect()
    }

    /// Applies `event` to an entity and persists the resulting status.
    ///
    /// Rejections are returned as [`TransitionResponse::Rejected`]. A hook
    /// failure is returned as an error; when it happened after the state was
    /// committed, the new status is persisted first.
    pub async fn transition(
        &self,
        id: &str,
        event: &str,
    ) -> Result<TransitionResponse, ServiceError> {
        let entity = self.entities.get(id)?;
        let schema = self.schema_of(&entity)?;
        let context = Arc::new(RwLock::new(serde_json::to_value(&entity)?));

        let mut instance = self.factory.create_instance(
            schema.as_ref(),
            Some(Arc::clone(&self.default_definition)),
            Some(State::from(entity.status.as_str())),
            context,
        )?;

        match instance.trigger(event).await {
            Ok(TriggerOutcome::Transitioned { to, .. }) => {
                let updated =
                    self.entities
                        .compare_and_set_status(id, &entity.status, to.as_str())?;
                Ok(TransitionResponse::Applied {
                    success: true,
                    entity: updated,
                    allowed_events: instance.available_events(),
                })
            }
            Ok(TriggerOutcome::Rejected(rejection)) => Ok(TransitionResponse::Rejected {
                success: false,
                message: rejection.message(),
                current_status: entity.status,
            }),
            Err(e) => {
                tracing::error!(
                    entity = %id,
                    event = %event,
                    committed = e.is_committed(),
                    error = %e,
                    "transition failed"
                );
                if e.is_committed() {
                    self.entities.compare_and_set_status(
                        id,
                        &entity.status,
                        instance.current_state().as_str(),
                    )?;
                }
                Err(e.into())
            }
        }
    }

    fn schema_of(&self, entity: &Entity) -> Result<Option<WorkflowSchema>, ServiceError> {
        entity
            .workflow_id
            .as_deref()
            .map(|id| self.schemas.get(id))
            .transpose()
    }

    fn definition_of(
        &self,
        entity: &Entity,
    ) -> Result<Arc<Definition<EntityContext>>, ServiceError> {
        match self.schema_of(entity)? {
            Some(schema) => Ok(self.factory.definition_for(&schema)?),
            None => Ok(Arc::clone(&self.default_definition)),
        }
    }

    fn view(&self, entity: Entity) -> Result<EntityView, ServiceError> {
        let available_events = match self.definition_of(&entity) {
            Ok(definition) => definition
                .events_from(&entity.status)
                .into_iter()
                .map(str::to_string)
                .collect(),
            Err(ServiceError::SchemaNotFound(schema)) => {
                tracing::warn!(entity = %entity.id, schema = %schema, "entity bound to missing schema");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        Ok(EntityView {
            entity,
            available_events,
        })
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn factory(&self) -> &WorkflowFactory<EntityContext> {
        &self.factory
    }
}
