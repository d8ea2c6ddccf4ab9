use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempo_types::{EnvelopeId, MessageEnvelope};
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bus::{EnvelopeHandler, EventBus, Topic};
use crate::error::{PublishError, SubscribeError};

/// Pause before redelivering a nak'd envelope, so a persistently failing
/// handler does not spin the consumer loop.
const REDELIVERY_DELAY: Duration = Duration::from_millis(50);

#[derive(Default)]
struct Inner {
    queues: HashMap<Topic, VecDeque<MessageEnvelope>>,
    /// Dedup window: every envelope id accepted so far. Duplicate
    /// publishes are dropped silently, which is what makes publish
    /// retries safe.
    seen: HashSet<EnvelopeId>,
    /// Everything ever accepted, per topic, in publish order. Retained
    /// for inspection.
    log: HashMap<Topic, Vec<MessageEnvelope>>,
}

/// In-process [`EventBus`] adapter.
///
/// A single queue per topic gives per-aggregate FIFO trivially: all
/// aggregates of a topic share one strictly ordered queue and a single
/// consumer. Redelivery is immediate-ish (front of the queue, after a
/// short pause); the dedup window spans the bus lifetime.
pub struct MemoryEventBus {
    inner: Mutex<Inner>,
    wakeup: Notify,
    shutdown: CancellationToken,
}

impl MemoryEventBus {
    /// The bus stops delivering (and `subscribe` returns) once
    /// `shutdown` fires; the in-flight handler call completes first.
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            wakeup: Notify::new(),
            shutdown,
        }
    }

    /// Every envelope accepted on `topic` so far, in publish order.
    pub async fn published(&self, topic: Topic) -> Vec<MessageEnvelope> {
        let inner = self.inner.lock().await;
        inner.log.get(&topic).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, envelopes: &[MessageEnvelope]) -> Result<(), PublishError> {
        if envelopes.is_empty() {
            return Err(PublishError::EmptyBatch);
        }

        let mut inner = self.inner.lock().await;
        // Single lock over the whole batch: all-or-nothing.
        for envelope in envelopes {
            if !inner.seen.insert(envelope.id) {
                debug!(envelope_id = %envelope.id, "dropping duplicate publish");
                continue;
            }
            let topic = Topic::for_message(&envelope.payload);
            inner
                .queues
                .entry(topic)
                .or_default()
                .push_back(envelope.clone());
            inner
                .log
                .entry(topic)
                .or_default()
                .push(envelope.clone());
        }
        drop(inner);

        // notify_one stores a permit when the consumer is not waiting
        // yet, so a publish between its queue check and its await is
        // never lost.
        self.wakeup.notify_one();
        Ok(())
    }

    async fn subscribe(
        &self,
        topics: &[Topic],
        handler: Arc<dyn EnvelopeHandler>,
    ) -> Result<(), SubscribeError> {
        if topics.is_empty() {
            return Err(SubscribeError::NoTopics);
        }

        loop {
            if self.shutdown.is_cancelled() {
                return Ok(());
            }

            let next = {
                let mut inner = self.inner.lock().await;
                topics
                    .iter()
                    .find_map(|topic| inner.queues.get_mut(topic).and_then(VecDeque::pop_front))
                    .map(|envelope| (Topic::for_message(&envelope.payload), envelope))
            };

            match next {
                Some((topic, envelope)) => {
                    // The handler call is never raced against shutdown:
                    // an in-flight message is always drained.
                    if let Err(error) = handler.handle(envelope.clone()).await {
                        warn!(%topic, envelope_id = %envelope.id, %error, "handler nak'd envelope; redelivering");
                        let mut inner = self.inner.lock().await;
                        inner.queues.entry(topic).or_default().push_front(envelope);
                        drop(inner);
                        tokio::time::sleep(REDELIVERY_DELAY).await;
                    }
                }
                None => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return Ok(()),
                        _ = self.wakeup.notified() => {}
                    }
                }
            }
        }
    }
}
