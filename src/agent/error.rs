use thiserror::Error;

/// Failure classes of the agent's loops.
///
/// Only `Configuration` ever stops the agent, and only during startup. Every
/// other variant is logged by the loop that produced it and the loop moves on.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("configuration error: {0:#}")]
    Configuration(anyhow::Error),

    #[error("store operation failed: {0:#}")]
    TransientStore(anyhow::Error),

    #[error("subject '{0}' has no identity in the store")]
    IdentityUnresolved(String),

    #[error("OS capture failed: {0:#}")]
    OsCapture(anyhow::Error),

    #[error("event queue is full ({capacity} pending)")]
    QueueFull { capacity: usize },
}
