//! The activity monitor: a sampler on the calling thread feeding a bounded
//! queue, drained by a persistence worker, with a keep-awake guard alongside.

pub mod capture;
pub mod error;
pub mod identity;
pub mod keep_awake;
pub mod lifecycle;
pub mod queue;
pub mod sampler;
pub mod subject;
pub mod worker;

pub use error::MonitorError;
pub use lifecycle::{Agent, AgentParts, AgentSettings, AgentState, AgentStatus, ShutdownReport};
