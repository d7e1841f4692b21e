//! Pull orchestration: discovery fan-out, bounded-concurrency fetching, and
//! downstream forwarding, aggregated into one result per trigger firing.

pub mod iteration;
pub mod run;
pub mod sink;

pub use iteration::{DiscoveryError, HttpToolInvoker, IterationResolver, ToolInvokeError, ToolInvoker};
pub use run::{FetchTask, PullOrchestrator};
pub use sink::{HttpIngestSink, IngestReceipt, IngestSink, SinkError};
