use tempo_store::StoreError;

/// Broker publication failure. Failure is atomic from the caller's
/// perspective: either every envelope of the call was placed, or none.
#[derive(Clone, Debug, thiserror::Error)]
pub enum PublishError {
    #[error("refusing to publish an empty envelope batch")]
    EmptyBatch,
    #[error("publish failed: {0}")]
    Adapter(String),
}

/// Broker subscription or consumer failure. Fatal to the subscription:
/// the service entry point treats it as terminal.
#[derive(Clone, Debug, thiserror::Error)]
pub enum SubscribeError {
    #[error("refusing to subscribe to an empty topic list")]
    NoTopics,
    #[error("subscription failed: {0}")]
    Adapter(String),
}

/// Returned by an [`EnvelopeHandler`](crate::bus::EnvelopeHandler) to nak
/// the current message; the broker adapter redelivers it.
#[derive(Clone, Debug, thiserror::Error)]
#[error("command handling failed: {cause}")]
pub struct HandlerError {
    pub cause: String,
}

impl HandlerError {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }
}

impl From<StoreError> for HandlerError {
    fn from(error: StoreError) -> Self {
        Self::new(error.to_string())
    }
}

/// Failure of one polling pass.
#[derive(Clone, Debug, thiserror::Error)]
pub enum PollError {
    /// The due scan itself failed; the pass performed no side effects.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// At least one timer in the batch failed to fire. Failed timers
    /// stay `Scheduled` and are retried by the next pass.
    #[error("{failed} of {total} due timers failed to fire")]
    Batch { failed: usize, total: usize },
}
