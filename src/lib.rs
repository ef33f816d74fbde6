//! A saga-style workflow execution engine: sequential operations run under a
//! [`smith::Smith`], each wrapped by a configurable [`middleware`] pipeline, with
//! automatic LIFO compensation on failure and durable checkpointing for crash recovery.
//!
//! ```
//! use std::sync::Arc;
//! use workflow_forge::config::WorkflowForgeOptions;
//! use workflow_forge::foundry::Foundry;
//! use workflow_forge::logging::NullLogger;
//! use workflow_forge::smith::Smith;
//! use workflow_forge::testing::NoopOperation;
//! use workflow_forge::workflow::WorkflowBuilder;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let workflow = WorkflowBuilder::new("greet")
//!     .operation(Arc::new(NoopOperation::new("SayHello").with_output(serde_json::json!("hi"))))
//!     .build();
//!
//! let smith = Smith::new(WorkflowForgeOptions::default(), Arc::new(NullLogger))?;
//! let foundry = Foundry::new(smith.options().clone());
//! let outcome = smith.forge(&workflow, Some(foundry), CancellationToken::new()).await?;
//! assert_eq!(outcome.last_completed_index, Some(0));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod foundry;
pub mod logging;
pub mod middleware;
pub mod operation;
pub mod persistence;
pub mod resilience;
pub mod smith;
pub mod testing;
pub mod time;
pub mod workflow;

pub mod prelude {
    pub use crate::config::WorkflowForgeOptions;
    pub use crate::error::{Result, WorkflowError};
    pub use crate::foundry::{ExecutionId, Foundry, FoundryEvent, MapServiceProvider, ServiceProvider};
    pub use crate::logging::{Logger, NullLogger, TracingLogger};
    pub use crate::middleware::{Middleware, Pipeline};
    pub use crate::operation::{Operation, OperationId};
    pub use crate::persistence::{ExecutionSnapshot, PersistenceProvider};
    pub use crate::resilience::ResilienceStrategy;
    pub use crate::smith::{ForgeOutcome, Smith};
    pub use crate::workflow::{Workflow, WorkflowBuilder, WorkflowId};
}
