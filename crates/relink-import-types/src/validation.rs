//! Validation types for pre-flight checks on a bundle

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use utoipa::ToSchema;

use crate::bundle::ImportBundle;

/// Result of a validation check
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ValidationResult {
    /// Rule that was checked
    pub rule_id: String,
    /// Human-readable rule name
    pub rule_name: String,
    /// Validation level
    pub level: ValidationLevel,
    /// Whether the validation passed
    pub passed: bool,
    /// Message describing the result
    pub message: String,
    /// Suggested remediation (if failed)
    pub remediation: Option<String>,
    /// Affected pages, actions or datasources
    pub affected_resources: Vec<String>,
}

/// Validation severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    /// Informational only
    Info,
    /// Warning - may cause issues
    Warning,
    /// Error - will likely cause issues
    Error,
    /// Critical - will definitely fail
    Critical,
}

/// Complete validation report
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ValidationReport {
    /// All validation results
    pub results: Vec<ValidationResult>,
    /// Overall status
    pub overall_status: ValidationStatus,
    /// Summary statistics
    pub summary: ValidationSummary,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            results: Vec::new(),
            overall_status: ValidationStatus::Passed,
            summary: ValidationSummary::default(),
        }
    }

    pub fn add_result(&mut self, result: ValidationResult) {
        self.summary.total_count += 1;
        match result.level {
            ValidationLevel::Info => self.summary.info_count += 1,
            ValidationLevel::Warning => self.summary.warning_count += 1,
            ValidationLevel::Error => self.summary.error_count += 1,
            ValidationLevel::Critical => self.summary.critical_count += 1,
        }

        if result.passed {
            self.summary.passed_count += 1;
        } else {
            self.summary.failed_count += 1;
        }

        if !result.passed && result.level >= ValidationLevel::Critical {
            self.overall_status = ValidationStatus::Failed;
        } else if !result.passed
            && result.level >= ValidationLevel::Error
            && self.overall_status != ValidationStatus::Failed
        {
            self.overall_status = ValidationStatus::FailedWithWarnings;
        } else if !result.passed
            && result.level >= ValidationLevel::Warning
            && self.overall_status == ValidationStatus::Passed
        {
            self.overall_status = ValidationStatus::PassedWithWarnings;
        }

        self.results.push(result);
    }

    /// Check if validation passed (no critical/error failures)
    pub fn can_proceed(&self) -> bool {
        matches!(
            self.overall_status,
            ValidationStatus::Passed | ValidationStatus::PassedWithWarnings
        )
    }

    /// Messages of failed checks at or above `level`
    pub fn failures_at_least(&self, level: ValidationLevel) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| !r.passed && r.level >= level)
            .map(|r| r.message.clone())
            .collect()
    }

    /// Messages of failed warning-level checks
    pub fn warnings(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| !r.passed && r.level == ValidationLevel::Warning)
            .map(|r| r.message.clone())
            .collect()
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Overall validation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationStatus {
    /// All validations passed
    Passed,
    /// Passed with warnings
    PassedWithWarnings,
    /// Failed with some errors
    FailedWithWarnings,
    /// Failed with critical errors
    Failed,
}

/// Validation summary statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ValidationSummary {
    pub total_count: usize,
    pub passed_count: usize,
    pub failed_count: usize,
    pub info_count: usize,
    pub warning_count: usize,
    pub error_count: usize,
    pub critical_count: usize,
}

/// Trait for bundle validation rules
pub trait ImportValidationRule: Send + Sync {
    /// Unique identifier for this rule
    fn rule_id(&self) -> &str;

    /// Human-readable rule name
    fn rule_name(&self) -> &str;

    fn level(&self) -> ValidationLevel;

    fn validate(&self, bundle: &ImportBundle) -> ValidationResult;

    fn pass(&self, message: impl Into<String>) -> ValidationResult
    where
        Self: Sized,
    {
        ValidationResult {
            rule_id: self.rule_id().to_string(),
            rule_name: self.rule_name().to_string(),
            level: self.level(),
            passed: true,
            message: message.into(),
            remediation: None,
            affected_resources: vec![],
        }
    }

    fn fail(
        &self,
        message: impl Into<String>,
        remediation: impl Into<String>,
        affected_resources: Vec<String>,
    ) -> ValidationResult
    where
        Self: Sized,
    {
        ValidationResult {
            rule_id: self.rule_id().to_string(),
            rule_name: self.rule_name().to_string(),
            level: self.level(),
            passed: false,
            message: message.into(),
            remediation: Some(remediation.into()),
            affected_resources,
        }
    }
}

/// Bundle exported by a newer server than this build understands
pub struct SchemaVersionRule {
    pub max_supported: u32,
}

impl ImportValidationRule for SchemaVersionRule {
    fn rule_id(&self) -> &str {
        "bundle.schema_version"
    }

    fn rule_name(&self) -> &str {
        "Schema version"
    }

    fn level(&self) -> ValidationLevel {
        ValidationLevel::Warning
    }

    fn validate(&self, bundle: &ImportBundle) -> ValidationResult {
        if bundle.server_schema_version <= self.max_supported {
            self.pass(format!(
                "Schema version {} is supported",
                bundle.server_schema_version
            ))
        } else {
            self.fail(
                format!(
                    "Bundle schema version {} is newer than supported version {}",
                    bundle.server_schema_version, self.max_supported
                ),
                "Re-export the application from a matching server version",
                vec![],
            )
        }
    }
}

/// Every action that names a datasource must find it in the datasource list
pub struct ActionDatasourceRule;

impl ImportValidationRule for ActionDatasourceRule {
    fn rule_id(&self) -> &str {
        "bundle.action_datasources"
    }

    fn rule_name(&self) -> &str {
        "Action datasources"
    }

    fn level(&self) -> ValidationLevel {
        ValidationLevel::Error
    }

    fn validate(&self, bundle: &ImportBundle) -> ValidationResult {
        let declared: HashSet<&str> = bundle
            .datasource_list
            .iter()
            .map(|d| d.name.trim())
            .collect();

        let dangling: Vec<String> = bundle
            .action_list
            .iter()
            .filter_map(|action| {
                action
                    .datasource_name
                    .as_deref()
                    .filter(|name| !declared.contains(name.trim()))
                    .map(|name| format!("{} -> {}", action.name, name))
            })
            .collect();

        if dangling.is_empty() {
            self.pass("All actions reference declared datasources")
        } else {
            self.fail(
                format!(
                    "{} action(s) reference datasources missing from the bundle",
                    dangling.len()
                ),
                "Export the application again so the datasource list is complete",
                dangling,
            )
        }
    }
}

pub struct PagesPresentRule;

impl ImportValidationRule for PagesPresentRule {
    fn rule_id(&self) -> &str {
        "bundle.pages"
    }

    fn rule_name(&self) -> &str {
        "Pages present"
    }

    fn level(&self) -> ValidationLevel {
        ValidationLevel::Info
    }

    fn validate(&self, bundle: &ImportBundle) -> ValidationResult {
        if bundle.page_list.is_empty() {
            self.fail(
                "Bundle contains no pages",
                "The application will be imported empty",
                vec![],
            )
        } else {
            self.pass(format!("{} page(s) found", bundle.page_list.len()))
        }
    }
}

pub fn default_rules(max_schema_version: u32) -> Vec<Box<dyn ImportValidationRule>> {
    vec![
        Box::new(SchemaVersionRule {
            max_supported: max_schema_version,
        }),
        Box::new(ActionDatasourceRule),
        Box::new(PagesPresentRule),
    ]
}

pub fn validate_bundle(
    bundle: &ImportBundle,
    rules: &[Box<dyn ImportValidationRule>],
) -> ValidationReport {
    let mut report = ValidationReport::new();
    for rule in rules {
        report.add_result(rule.validate(bundle));
    }
    report
}
