pub mod actions;
pub mod aggregate;
pub mod config;
pub mod error;
pub mod execution;
pub mod graph;
pub mod outcome;
pub mod pipeline;
pub mod resources;
pub mod storage;
pub mod template;

pub use actions::{registry, ScanActionDescriptor};
pub use aggregate::{aggregate, AggregationRequest, AggregationResult, PollPolicy};
pub use config::{resolve, PipelineConfiguration, RawParameters};
pub use error::{AssemblyError, ConfigurationError, PlanError, StorageError, TemplateError};
pub use execution::ExecutionKey;
pub use outcome::Outcome;
pub use pipeline::{assemble, PipelineDag, PipelineTopology};
pub use resources::{RepositoryHandle, ResourcePlan, RetentionLayout};
pub use template::Template;
