//! Core utilities and types shared across all Relink crates

pub mod config;
pub mod problemdetails;
pub mod types;
mod encryption;

pub use config::*;
pub use encryption::{CipherError, CredentialCipher};
pub use problemdetails::{Problem, ProblemDetails};
pub use types::UtcDateTime;

// Re-export external dependencies
pub use anyhow;
pub use chrono;
pub use serde;
pub use serde_json;
pub use thiserror;
pub use tracing;
