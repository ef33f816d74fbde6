use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{Middleware, Next};
use crate::error::Result;
use crate::foundry::Foundry;

/// Records start/end/elapsed time for the wrapped operation into well-known properties.
pub struct TimingMiddleware;

#[async_trait]
impl Middleware for TimingMiddleware {
    async fn execute<'a>(
        &'a self,
        _operation_name: &'a str,
        foundry: &'a Foundry,
        input: Option<Value>,
        next: Next<'a>,
        cancel: CancellationToken,
    ) -> Result<Option<Value>> {
        let start = Utc::now();
        foundry.properties.set("Timing.StartTime", start.to_rfc3339()).await;

        let result = next(input, cancel).await;

        let end = Utc::now();
        let duration = end - start;
        foundry.properties.set("Timing.EndTime", end.to_rfc3339()).await;
        foundry
            .properties
            .set("Timing.Duration", duration.num_milliseconds())
            .await;
        foundry
            .properties
            .set(
                "Timing.DurationTicks",
                duration.num_nanoseconds().unwrap_or(duration.num_milliseconds() * 1_000_000),
            )
            .await;

        if result.is_err() {
            foundry.properties.set("Timing.Failed", true).await;
        }

        result
    }
}
