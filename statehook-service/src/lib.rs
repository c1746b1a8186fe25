//! # statehook-service
//!
//! Entity workflow service built on `statehook-core`: in-memory entity and
//! schema stores, the default review workflow, and configuration.

pub mod config;
pub mod draft;
pub mod error;
pub mod service;
pub mod store;

pub use config::{Config, ConfigError};
pub use draft::draft_definition;
pub use error::ServiceError;
pub use service::{EntityContext, EntityView, TransitionResponse, WorkflowService};
pub use store::{Entity, EntityStore, SchemaStore};
