//! In-memory entity and schema stores.

use crate::error::ServiceError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use statehook_core::{CoreError, WorkflowSchema};
use std::path::Path;

/// A workflow-governed entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Current workflow state.
    pub status: String,
    /// Schema governing this entity; the default definition applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Entity storage keyed by random id.
#[derive(Debug, Default)]
pub struct EntityStore {
    entities: DashMap<String, Entity>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new entity under a fresh id.
    pub fn create(
        &self,
        title: impl Into<String>,
        content: impl Into<String>,
        status: impl Into<String>,
        workflow_id: Option<String>,
    ) -> Entity {
        let now = Utc::now();
        let entity = Entity {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            content: content.into(),
            status: status.into(),
            workflow_id,
            created_at: now,
            updated_at: now,
        };
        self.entities.insert(entity.id.clone(), entity.clone());
        entity
    }

    pub fn get(&self, id: &str) -> Result<Entity, ServiceError> {
        self.entities
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| ServiceError::EntityNotFound(id.to_string()))
    }

    /// Returns all entities, oldest first.
    pub fn list(&self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self.entities.iter().map(|r| r.value().clone()).collect();
        entities.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        entities
    }

    /// Writes `status` only if the stored status still equals `expected`.
    pub fn compare_and_set_status(
        &self,
        id: &str,
        expected: &str,
        status: &str,
    ) -> Result<Entity, ServiceError> {
        let mut entry = self
            .entities
            .get_mut(id)
            .ok_or_else(|| ServiceError::EntityNotFound(id.to_string()))?;

        if entry.status != expected {
            return Err(ServiceError::Conflict {
                id: id.to_string(),
                expected: expected.to_string(),
                actual: entry.status.clone(),
            });
        }

        entry.status = status.to_string();
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Workflow schema storage.
#[derive(Debug, Default)]
pub struct SchemaStore {
    schemas: DashMap<String, WorkflowSchema>,
}

impl SchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and stores `schema`, replacing any schema with the same id.
    /// Schemas without an id get a fresh one.
    pub fn insert(&self, mut schema: WorkflowSchema) -> Result<WorkflowSchema, ServiceError> {
        schema.validate()?;
        if schema.id.is_empty() {
            schema.id = uuid::Uuid::new_v4().to_string();
        }
        self.schemas.insert(schema.id.clone(), schema.clone());
        Ok(schema)
    }

    pub fn get(&self, id: &str) -> Result<WorkflowSchema, ServiceError> {
        self.schemas
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| ServiceError::SchemaNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.schemas.contains_key(id)
    }

    /// Returns all schemas sorted by id.
    pub fn list(&self) -> Vec<WorkflowSchema> {
        let mut schemas: Vec<WorkflowSchema> =
            self.schemas.iter().map(|r| r.value().clone()).collect();
        schemas.sort_by(|a, b| a.id.cmp(&b.id));
        schemas
    }

    pub fn remove(&self, id: &str) -> Option<WorkflowSchema> {
        self.schemas.remove(id).map(|(_, schema)| schema)
    }

    /// Loads every `.json`, `.yaml` and `.yml` file in `dir`.
    pub fn load_dir(&self, dir: impl AsRef<Path>) -> Result<Vec<WorkflowSchema>, ServiceError> {
        let dir = dir.as_ref();
        let io_err = |source| CoreError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let is_schema = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("json") | Some("yaml") | Some("yml")
            );
            if is_schema && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut loaded = Vec::with_capacity(paths.len());
        for path in paths {
            let schema = self.insert(WorkflowSchema::from_file(&path)?)?;
            tracing::info!(schema = %schema.id, path = %path.display(), "loaded workflow schema");
            loaded.push(schema);
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(id: &str) -> WorkflowSchema {
        serde_json::from_value(json!({
            "id": id,
            "name": "Flow",
            "initialState": "DRAFT",
            "transitions": [{"from": "DRAFT", "to": "DONE", "event": "FINISH"}]
        }))
        .unwrap()
    }

    #[test]
    fn test_create_and_get_entity() {
        let store = EntityStore::new();
        let entity = store.create("Title", "Body", "CREATED", None);

        assert!(!entity.id.is_empty());
        assert_eq!(store.get(&entity.id).unwrap(), entity);
        assert!(matches!(
            store.get("missing"),
            Err(ServiceError::EntityNotFound(_))
        ));
    }

    #[test]
    fn test_ids_are_unique() {
        let store = EntityStore::new();
        let a = store.create("a", "", "CREATED", None);
        let b = store.create("b", "", "CREATED", None);
        assert_ne!(a.id, b.id);
        assert_eq!(store.len(), 2);
        assert_eq!(store.list().len(), 2);
    }

    #[test]
    fn test_compare_and_set_status() {
        let store = EntityStore::new();
        let entity = store.create("t", "c", "CREATED", None);

        let updated = store
            .compare_and_set_status(&entity.id, "CREATED", "IN_REVIEW")
            .unwrap();
        assert_eq!(updated.status, "IN_REVIEW");
        assert!(updated.updated_at >= entity.updated_at);

        let err = store
            .compare_and_set_status(&entity.id, "CREATED", "IN_REVIEW")
            .unwrap_err();
        match err {
            ServiceError::Conflict { expected, actual, .. } => {
                assert_eq!(expected, "CREATED");
                assert_eq!(actual, "IN_REVIEW");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_entity_wire_format() {
        let store = EntityStore::new();
        let entity = store.create("t", "c", "CREATED", Some("flow".to_string()));
        let value = serde_json::to_value(&entity).unwrap();
        assert_eq!(value["workflowId"], "flow");
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn test_schema_store() {
        let store = SchemaStore::new();
        store.insert(schema("b")).unwrap();
        store.insert(schema("a")).unwrap();

        let ids: Vec<String> = store.list().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(store.contains("a"));
        assert!(store.remove("a").is_some());
        assert!(matches!(store.get("a"), Err(ServiceError::SchemaNotFound(_))));
    }

    #[test]
    fn test_schema_without_id_gets_one() {
        let store = SchemaStore::new();
        let stored = store.insert(schema("")).unwrap();
        assert!(!stored.id.is_empty());
        assert_eq!(store.get(&stored.id).unwrap().name, "Flow");
    }

    #[test]
    fn test_invalid_schema_rejected() {
        let store = SchemaStore::new();
        let mut bad = schema("bad");
        bad.initial_state.clear();
        let err = store.insert(bad).unwrap_err();
        assert_eq!(err.error_code(), "BAD_REQUEST");
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("one.json"),
            serde_json::to_string(&schema("one")).unwrap(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("two.yaml"),
            "id: two\ninitialState: A\ntransitions:\n  - {from: A, to: B, event: GO}\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = SchemaStore::new();
        let loaded = store.load_dir(dir.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(store.get("two").unwrap().initial_state, "A");

        assert!(store.load_dir(dir.path().join("missing")).is_err());
    }
}
