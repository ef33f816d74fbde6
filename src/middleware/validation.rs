use async_trait::async_trait;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{Middleware, Next};
use crate::config::ValidationOptions;
use crate::error::{Result, ValidationError, WorkflowError};
use crate::foundry::Foundry;

/// Validates a subject of type `T` extracted from the operation's input.
pub trait Validator<T>: Send + Sync {
    fn validate(&self, subject: &T) -> Vec<ValidationError>;
}

/// Runs `extractor` over the operation input, then `validator` over the extracted
/// subject, before invoking `next`. Honors [`ValidationOptions::throw_on_validation_error`]
/// / [`ValidationOptions::ignore_validation_failures`]; these are validated as mutually
/// exclusive at [`crate::config::WorkflowForgeOptions::validate`] time.
pub struct ValidationMiddleware<T, E, V>
where
    E: Fn(&Option<Value>) -> Option<T> + Send + Sync,
    V: Validator<T>,
{
    extractor: E,
    validator: V,
    options: ValidationOptions,
    _subject: PhantomData<fn() -> T>,
}

impl<T, E, V> ValidationMiddleware<T, E, V>
where
    E: Fn(&Option<Value>) -> Option<T> + Send + Sync,
    V: Validator<T>,
{
    pub fn new(extractor: E, validator: V, options: ValidationOptions) -> Self {
        Self {
            extractor,
            validator,
            options,
            _subject: PhantomData,
        }
    }
}

#[async_trait]
impl<T, E, V> Middleware for ValidationMiddleware<T, E, V>
where
    T: Send + Sync,
    E: Fn(&Option<Value>) -> Option<T> + Send + Sync,
    V: Validator<T> + Send + Sync,
{
    async fn execute<'a>(
        &'a self,
        _operation_name: &'a str,
        foundry: &'a Foundry,
        input: Option<Value>,
        next: Next<'a>,
        cancel: CancellationToken,
    ) -> Result<Option<Value>> {
        if !self.options.enabled {
            return next(input, cancel).await;
        }

        let errors = match (self.extractor)(&input) {
            Some(subject) => self.validator.validate(&subject),
            None => Vec::new(),
        };

        if !errors.is_empty() {
            if self.options.log_validation_errors {
                foundry.logger().warn(
                    "validation failed",
                    &[("ErrorCount", &errors.len().to_string())],
                );
            }
            if self.options.store_validation_results {
                foundry.properties.set("Validation.Status", "Failed").await;
                foundry
                    .properties
                    .set("Validation.Errors", serde_json::to_value(&errors).unwrap_or(Value::Null))
                    .await;
            }
            if self.options.throw_on_validation_error && !self.options.ignore_validation_failures {
                return Err(WorkflowError::ValidationFailed { errors });
            }
        } else if self.options.store_validation_results {
            foundry.properties.set("Validation.Status", "Success").await;
        }

        next(input, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowForgeOptions;
    use crate::middleware::Pipeline;
    use crate::testing::NoopOperation;

    struct AlwaysFailsValidator;

    impl Validator<i64> for AlwaysFailsValidator {
        fn validate(&self, _subject: &i64) -> Vec<ValidationError> {
            vec![ValidationError {
                property_name: "amount".to_string(),
                error_message: "must be positive".to_string(),
            }]
        }
    }

    fn extract_i64(input: &Option<Value>) -> Option<i64> {
        input.as_ref().and_then(|v| v.as_i64())
    }

    #[tokio::test]
    async fn throwing_validation_short_circuits_operation() {
        let mut options = ValidationOptions {
            enabled: true,
            ignore_validation_failures: false,
            throw_on_validation_error: true,
            log_validation_errors: false,
            store_validation_results: true,
        };
        options.enabled = true;

        let middlewares: Vec<Arc<dyn Middleware>> = vec![Arc::new(ValidationMiddleware::new(
            extract_i64,
            AlwaysFailsValidator,
            options,
        ))];

        let operation = NoopOperation::new("op").with_output(serde_json::json!("should not run"));
        let foundry = Foundry::new(Arc::new(WorkflowForgeOptions::default()));
        let pipeline = Pipeline::new(&middlewares);

        let result = pipeline
            .invoke(&operation, &foundry, Some(serde_json::json!(-5)), CancellationToken::new())
            .await;

        assert!(matches!(result, Err(WorkflowError::ValidationFailed { .. })));
        assert_eq!(operation.call_count(), 0);
        assert_eq!(
            foundry.properties.get("Validation.Status").await,
            Some(Value::from("Failed"))
        );
    }

    #[tokio::test]
    async fn logging_mode_does_not_block_operation() {
        let options = ValidationOptions {
            enabled: true,
            ignore_validation_failures: true,
            throw_on_validation_error: false,
            log_validation_errors: true,
            store_validation_results: true,
        };

        let middlewares: Vec<Arc<dyn Middleware>> = vec![Arc::new(ValidationMiddleware::new(
            extract_i64,
            AlwaysFailsValidator,
            options,
        ))];

        let operation = NoopOperation::new("op").with_output(serde_json::json!("ran"));
        let foundry = Foundry::new(Arc::new(WorkflowForgeOptions::default()));
        let pipeline = Pipeline::new(&middlewares);

        let result = pipeline
            .invoke(&operation, &foundry, Some(serde_json::json!(-5)), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result, Some(serde_json::json!("ran")));
        assert_eq!(operation.call_count(), 1);
    }
}
