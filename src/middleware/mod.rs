//! The middleware pipeline: an ordered, reentrant chain of wrappers invoked around every
//! operation invocation. Registration order is outermost-first — the first middleware
//! registered is the outermost wrapper, the operation's own `forge` is the innermost call.

mod audit;
mod timing;
mod validation;

pub use audit::{AuditEntry, AuditEventType, AuditMiddleware, AuditProvider};
pub use timing::TimingMiddleware;
pub use validation::{ValidationMiddleware, Validator};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::foundry::Foundry;
use crate::operation::Operation;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The continuation a middleware invokes to run the rest of the chain (and, eventually,
/// the operation itself). Not calling `next` short-circuits the operation — this is how
/// validation middleware configured to raise prevents `forge` from ever running.
pub type Next<'a> =
    Box<dyn FnOnce(Option<Value>, CancellationToken) -> BoxFuture<'a, Result<Option<Value>>> + Send + 'a>;

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn execute<'a>(
        &'a self,
        operation_name: &'a str,
        foundry: &'a Foundry,
        input: Option<Value>,
        next: Next<'a>,
        cancel: CancellationToken,
    ) -> Result<Option<Value>>;
}

/// Pass-through middleware used in tests that need a non-empty middleware list without
/// any observable behavior.
pub struct NoopMiddleware;

#[async_trait]
impl Middleware for NoopMiddleware {
    async fn execute<'a>(
        &'a self,
        _operation_name: &'a str,
        _foundry: &'a Foundry,
        input: Option<Value>,
        next: Next<'a>,
        cancel: CancellationToken,
    ) -> Result<Option<Value>> {
        next(input, cancel).await
    }
}

/// Composes a registered middleware list around one operation invocation.
pub struct Pipeline<'a> {
    middlewares: &'a [Arc<dyn Middleware>],
}

impl<'a> Pipeline<'a> {
    pub fn new(middlewares: &'a [Arc<dyn Middleware>]) -> Self {
        Self { middlewares }
    }

    pub async fn invoke(
        &self,
        operation: &'a dyn Operation,
        foundry: &'a Foundry,
        input: Option<Value>,
        cancel: CancellationToken,
    ) -> Result<Option<Value>> {
        self.invoke_at(0, operation, foundry, input, cancel).await
    }

    fn invoke_at(
        &self,
        index: usize,
        operation: &'a dyn Operation,
        foundry: &'a Foundry,
        input: Option<Value>,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<Option<Value>>> {
        let middlewares = self.middlewares;
        Box::pin(async move {
            if index >= middlewares.len() {
                return operation.forge(input, foundry, cancel).await;
            }

            let middleware = middlewares[index].clone();
            let pipeline = Pipeline { middlewares };
            let next: Next<'a> = Box::new(move |next_input, next_cancel| {
                pipeline.invoke_at(index + 1, operation, foundry, next_input, next_cancel)
            });

            middleware
                .execute(operation.name(), foundry, input, next, cancel)
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowForgeOptions;
    use crate::testing::NoopOperation;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OrderRecordingMiddleware {
        label: &'static str,
        order: Arc<Mutex<Vec<String>>>,
    }

    use std::sync::Mutex;

    #[async_trait]
    impl Middleware for OrderRecordingMiddleware {
        async fn execute<'a>(
            &'a self,
            _operation_name: &'a str,
            _foundry: &'a Foundry,
            input: Option<Value>,
            next: Next<'a>,
            cancel: CancellationToken,
        ) -> Result<Option<Value>> {
            self.order.lock().unwrap().push(format!("{}.before", self.label));
            let result = next(input, cancel).await;
            self.order.lock().unwrap().push(format!("{}.after", self.label));
            result
        }
    }

    #[tokio::test]
    async fn pipeline_nests_outermost_first() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let middlewares: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(OrderRecordingMiddleware { label: "A", order: order.clone() }),
            Arc::new(OrderRecordingMiddleware { label: "B", order: order.clone() }),
            Arc::new(OrderRecordingMiddleware { label: "C", order: order.clone() }),
        ];

        let operation = NoopOperation::new("op");
        let foundry = Foundry::new(Arc::new(WorkflowForgeOptions::default()));
        let pipeline = Pipeline::new(&middlewares);

        pipeline
            .invoke(&operation, &foundry, None, CancellationToken::new())
            .await
            .unwrap();

        let observed = order.lock().unwrap().clone();
        assert_eq!(
            observed,
            vec!["A.before", "B.before", "C.before", "C.after", "B.after", "A.after"]
        );
    }

    #[tokio::test]
    async fn empty_pipeline_invokes_operation_directly() {
        let middlewares: Vec<Arc<dyn Middleware>> = Vec::new();
        let operation = NoopOperation::new("op").with_output(serde_json::json!(7));
        let foundry = Foundry::new(Arc::new(WorkflowForgeOptions::default()));
        let pipeline = Pipeline::new(&middlewares);
        let calls = Arc::new(AtomicUsize::new(0));
        let _ = calls.fetch_add(1, Ordering::SeqCst);

        let output = pipeline
            .invoke(&operation, &foundry, None, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output, Some(serde_json::json!(7)));
    }
}
