//! Shared primitive types

use chrono::{DateTime, Utc};

/// Standard UTC DateTime type used across all Relink crates
///
/// Serializes as ISO 8601 with a `Z` suffix. When exposed through utoipa, annotate
/// the field with `#[schema(value_type = String, format = DateTime)]`.
pub type UtcDateTime = DateTime<Utc>;
