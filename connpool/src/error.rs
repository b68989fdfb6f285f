use std::time::Duration;

/// Reasons an acquire can fail. None of them are retried internally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcquireError {
    #[error("Acquire canceled")]
    Canceled,
    #[error("Acquire timed out after {0:?} (pool saturated)")]
    AcquireTimeout(Duration),
    #[error("No available slot (wait channel closed)")]
    NoAvailableSlot,
}

impl AcquireError {
    /// Only a timeout says anything about the pool that might change on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AcquireError::AcquireTimeout(_))
    }
}
