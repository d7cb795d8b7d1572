//! Core types and traits for the Relink import system
//!
//! This crate provides the foundational abstractions for importing application
//! bundles into a workspace and reconnecting the datasources they reference.
//!
//! # Architecture
//!
//! - **Bundle**: `ImportBundle` and the `DatasourceReference`s it carries
//! - **Reconnection**: `PendingReconnection` records and the import state machine
//! - **Traits**: `WorkspaceStore` (persistence) and `ConnectivityProbe` (credential checks)
//! - **Errors**: Unified error handling across the import pipeline
//!
//! Probe drivers (e.g. `relink-probes`) depend on this crate and implement
//! `ConnectivityProbe`.

pub mod bundle;
pub mod credentials;
pub mod error;
pub mod ids;
pub mod probe;
pub mod reconnection;
pub mod validation;
pub mod workspace;

pub use bundle::{
    BundleAction, BundleDatasource, BundlePage, BundleSource, DatasourceReference, DatasourceType,
    ExportedApplication, ImportBundle,
};
pub use credentials::{DatasourceCredentials, MongoCredentials, RestApiCredentials, SqlCredentials};
pub use error::{ImportError, Result, ValidationError, ValidationFailureReason};
pub use ids::{ApplicationId, DatasourceId, DraftId, WorkspaceId};
pub use probe::{ConnectivityProbe, ProbeError, ProbeRegistry};
pub use reconnection::{ImportResult, ImportState, PendingReconnection, ReconnectionStatus};
pub use validation::{
    default_rules, validate_bundle, ImportValidationRule, ValidationLevel, ValidationReport,
    ValidationResult, ValidationStatus, ValidationSummary,
};
pub use workspace::{
    Application, Datasource, DraftApplication, GitLink, NewDatasource, NewDraft, StoreError,
    StoreResult, Workspace, WorkspaceStore,
};
