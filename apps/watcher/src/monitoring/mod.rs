/// Monitoring module - everything on the producing side of the pipeline
///
/// This module is responsible for:
/// - Validated endpoint definitions and their partition assignment
/// - Executing HTTP checks
/// - Scheduling one prober per endpoint
pub mod checker;
pub mod endpoint;
pub mod partition;
pub mod sample;
pub mod scheduler;

pub use checker::{Checker, HttpChecker};
pub use endpoint::{ContentPattern, Endpoint, EndpointError};
pub use partition::{Partition, PartitionError};
pub use sample::{PendingSample, Sample};
pub use scheduler::{MonitoringScheduler, Prober};
