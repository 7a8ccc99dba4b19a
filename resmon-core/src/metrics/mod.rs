mod collector;
mod pool;
mod types;

pub use collector::{from_fn, Collector, CollectorSet};
pub use pool::WorkerPool;
pub(crate) use pool::panic_message;
pub use types::{ChannelStats, KindCounters, KindStats};
