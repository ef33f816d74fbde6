//! Configuration for a [`crate::smith::Smith`]. Each option group validates itself and
//! appends every violated invariant to a shared error list, mirroring how the teacher's
//! `ApiConfig`/`MonitoringConfig` each report one specific message per violated field
//! rather than failing fast on the first one found.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level options for a [`crate::smith::Smith`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowForgeOptions {
    /// 0 = unlimited.
    pub max_concurrent_workflows: i64,
    pub continue_on_error: bool,
    pub fail_fast_compensation: bool,
    pub throw_on_compensation_error: bool,
    pub enable_output_chaining: bool,
    pub timing: TimingOptions,
    pub audit: AuditOptions,
    pub validation: ValidationOptions,
    pub persistence: PersistenceOptions,
    pub recovery: RecoveryOptions,
}

impl Default for WorkflowForgeOptions {
    fn default() -> Self {
        Self {
            max_concurrent_workflows: 0,
            continue_on_error: false,
            fail_fast_compensation: false,
            throw_on_compensation_error: false,
            enable_output_chaining: true,
            timing: TimingOptions::default(),
            audit: AuditOptions::default(),
            validation: ValidationOptions::default(),
            persistence: PersistenceOptions::default(),
            recovery: RecoveryOptions::default(),
        }
    }
}

impl WorkflowForgeOptions {
    /// Validates every nested option group, collecting one message per violated
    /// invariant rather than stopping at the first.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_concurrent_workflows < 0 {
            errors.push(format!(
                "MaxConcurrentWorkflows must be >= 0, got {}",
                self.max_concurrent_workflows
            ));
        }

        errors.extend(self.validation.validate());
        errors.extend(self.persistence.validate());
        errors.extend(self.recovery.validate());

        errors
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingOptions {
    pub enabled: bool,
    pub include_detailed_timings: bool,
}

impl Default for TimingOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            include_detailed_timings: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditDetailLevel {
    Minimal,
    Standard,
    Verbose,
    Complete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditOptions {
    pub enabled: bool,
    pub detail_level: AuditDetailLevel,
    pub log_data_payloads: bool,
    pub include_timestamps: bool,
    pub include_user_context: bool,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            detail_level: AuditDetailLevel::Standard,
            log_data_payloads: false,
            include_timestamps: true,
            include_user_context: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOptions {
    pub enabled: bool,
    pub ignore_validation_failures: bool,
    pub throw_on_validation_error: bool,
    pub log_validation_errors: bool,
    pub store_validation_results: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            ignore_validation_failures: false,
            throw_on_validation_error: true,
            log_validation_errors: true,
            store_validation_results: true,
        }
    }
}

impl ValidationOptions {
    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.ignore_validation_failures && self.throw_on_validation_error {
            errors.push(
                "Validation.IgnoreValidationFailures and Validation.ThrowOnValidationError cannot both be true"
                    .to_string(),
            );
        }
        errors
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceOptions {
    pub enabled: bool,
    pub persist_on_operation_complete: bool,
    pub persist_on_workflow_complete: bool,
    pub persist_on_failure: bool,
    /// 0 = unlimited.
    pub max_versions: u32,
    pub instance_id: Option<String>,
    pub workflow_key: Option<String>,
}

impl Default for PersistenceOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            persist_on_operation_complete: true,
            persist_on_workflow_complete: true,
            persist_on_failure: true,
            max_versions: 0,
            instance_id: None,
            workflow_key: None,
        }
    }
}

impl PersistenceOptions {
    fn validate(&self) -> Vec<String> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryOptions {
    pub enabled: bool,
    pub max_retry_attempts: u32,
    pub base_delay_millis: u64,
    pub use_exponential_backoff: bool,
    pub attempt_resume: bool,
    pub log_recovery_attempts: bool,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retry_attempts: 3,
            base_delay_millis: 500,
            use_exponential_backoff: true,
            attempt_resume: true,
            log_recovery_attempts: true,
        }
    }
}

impl RecoveryOptions {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_millis)
    }

    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.max_retry_attempts < 1 || self.max_retry_attempts > 100 {
            errors.push(format!(
                "Recovery.MaxRetryAttempts must be within [1, 100], got {}",
                self.max_retry_attempts
            ));
        }
        if self.base_delay_millis > 10 * 60 * 1000 {
            errors.push("Recovery.BaseDelay must be <= 10 minutes".to_string());
        }
        errors
    }
}
