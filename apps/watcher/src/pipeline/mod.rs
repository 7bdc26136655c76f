/// Sample pipeline between the probers and the sinks
///
/// - `buffer`: the shared hand-off queue
/// - `collector`: batch draining and delivery
pub mod buffer;
pub mod collector;

pub use buffer::SampleBuffer;
pub use collector::{Collector, CollectorSettings, CollectorStats, collector_count};
