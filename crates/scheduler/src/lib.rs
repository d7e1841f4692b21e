//! Recurring job lifecycle: cron tickers, the job registry, and
//! reconciliation of registered jobs against the configured source set.

pub mod registry;
pub mod schedule;
pub mod sync;

pub use registry::{JobEntry, JobRegistry, JobTarget, RegistryError};
pub use schedule::parse_cron;
pub use sync::{JobSyncService, OrchestratorTarget};
