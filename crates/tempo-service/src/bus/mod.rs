mod memory;

pub use memory::MemoryEventBus;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tempo_types::{MessageEnvelope, TimerMessage};

use crate::error::{HandlerError, PublishError, SubscribeError};

/// Logical topics of the timer module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Inbound `ScheduleTimer` commands.
    TimerCommands,
    /// Outbound `DueTimeReached` events.
    TimerEvents,
}

impl Topic {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TimerCommands => "Timer.Commands",
            Self::TimerEvents => "Timer.Events",
        }
    }

    /// Where a message of this type is published.
    pub fn for_message(message: &TimerMessage) -> Self {
        match message {
            TimerMessage::ScheduleTimer { .. } => Self::TimerCommands,
            TimerMessage::DueTimeReached { .. } => Self::TimerEvents,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Consumer callback: `Ok` acks the message, `Err` naks it and the
/// adapter redelivers. Handlers must be idempotent — redelivery is
/// always possible under at-least-once.
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    async fn handle(&self, envelope: MessageEnvelope) -> Result<(), HandlerError>;
}

/// Abstract broker contract. Adapters may map onto any pub/sub system
/// that can provide at-least-once delivery, deduplication by envelope
/// id within its dedup window, and per-aggregate FIFO ordering keyed by
/// `(tenant_id, aggregate_id)`.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Place all envelopes, or none (the call is atomic from the
    /// caller's perspective). An empty batch is an error.
    async fn publish(&self, envelopes: &[MessageEnvelope]) -> Result<(), PublishError>;

    /// Join a durable shared consumer over `topics` and deliver one
    /// envelope at a time to `handler` until the adapter shuts down.
    /// Returns only on shutdown (`Ok`) or a subscription-level fault.
    async fn subscribe(
        &self,
        topics: &[Topic],
        handler: Arc<dyn EnvelopeHandler>,
    ) -> Result<(), SubscribeError>;
}
