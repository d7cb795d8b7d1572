//! Relink Import Orchestrator
//!
//! This crate provides the HTTP API and orchestration layer for importing
//! application bundles into a workspace and reconnecting their datasources.
//!
//! # Architecture
//!
//! - **Handlers**: HTTP endpoints for import operations
//! - **Services**: Importer, resolver, validator, finalizer and the orchestrator
//!   that sequences them per import
//!
//! # Usage
//!
//! Build an [`ImportOrchestrator`] with a [`WorkspaceStore`](relink_import_types::WorkspaceStore),
//! a probe registry and a credential cipher, then mount [`handlers::configure_routes`].

pub mod handlers;
pub mod services;

pub use services::{
    CommandOutcome, ImportCommand, ImportEvent, ImportOrchestrator, ImportServiceError,
    ImportServiceResult, InMemoryWorkspaceStore,
};
