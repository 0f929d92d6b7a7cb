//! Queue/worker coordinator - stage handoff and worker loops
//!
//! A small fixed set of named channels, one per pipeline stage, backed by an
//! in-process broker whose individual push/pop operations are atomic. Worker
//! loops cycle through the channels in round-robin order; a handler failure
//! re-enqueues the envelope with a bumped retry count until the bound is
//! reached, after which it is dead-lettered. Delivery is at-least-once:
//! shutdown abandons in-flight work, and handlers must tolerate retries.

use crate::config::QueueConfig;
use crate::models::QueueEnvelope;
use chrono::Utc;
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

/// The named channels, one per pipeline stage
///
/// `ALL` fixes the round-robin order worker loops drain them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Discovery,
    Ingestion,
    Transformation,
    Indexing,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Discovery,
        Channel::Ingestion,
        Channel::Transformation,
        Channel::Indexing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Ingestion => "ingestion",
            Self::Transformation => "transformation",
            Self::Indexing => "indexing",
        }
    }

    fn index(&self) -> usize {
        match self {
            Self::Discovery => 0,
            Self::Ingestion => 1,
            Self::Transformation => 2,
            Self::Indexing => 3,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovery" => Ok(Self::Discovery),
            "ingestion" => Ok(Self::Ingestion),
            "transformation" => Ok(Self::Transformation),
            "indexing" => Ok(Self::Indexing),
            other => Err(format!("unknown channel: {}", other)),
        }
    }
}

/// One FIFO list plus a wakeup for blocked consumers
struct ChannelQueue {
    items: Mutex<VecDeque<String>>,
    notify: Notify,
}

impl ChannelQueue {
    fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }
}

/// In-process channel backend
///
/// Each channel is an ordered list supporting atomic tail-push and head-pop;
/// atomicity comes from the per-channel lock, never from callers. Envelopes
/// are stored serialized, mirroring an external list-like backend. Contents
/// are not durable across process restarts.
pub struct MemoryBroker {
    channels: [ChannelQueue; 4],
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            channels: [
                ChannelQueue::new(),
                ChannelQueue::new(),
                ChannelQueue::new(),
                ChannelQueue::new(),
            ],
        }
    }

    fn queue(&self, channel: Channel) -> &ChannelQueue {
        &self.channels[channel.index()]
    }

    /// Appends a serialized envelope to the channel tail
    pub fn push(&self, channel: Channel, serialized: String) {
        let queue = self.queue(channel);
        queue
            .items
            .lock()
            .expect("channel lock poisoned")
            .push_back(serialized);
        queue.notify.notify_one();
    }

    /// Removes and returns the head envelope without blocking
    pub fn pop(&self, channel: Channel) -> Option<String> {
        self.queue(channel)
            .items
            .lock()
            .expect("channel lock poisoned")
            .pop_front()
    }

    /// Removes and returns the head envelope, waiting up to `timeout` for
    /// one to arrive
    ///
    /// A zero timeout is strictly non-blocking.
    pub async fn pop_blocking(&self, channel: Channel, timeout: Duration) -> Option<String> {
        if timeout.is_zero() {
            return self.pop(channel);
        }

        let deadline = Instant::now() + timeout;
        loop {
            // Arm the waiter before checking, so a push between the check
            // and the await still wakes us
            let notified = self.queue(channel).notify.notified();

            if let Some(item) = self.pop(channel) {
                return Some(item);
            }

            if timeout_at(deadline, notified).await.is_err() {
                // Deadline passed; one last non-blocking attempt
                return self.pop(channel);
            }
        }
    }

    /// Number of envelopes currently queued on the channel
    pub fn len(&self, channel: Channel) -> usize {
        self.queue(channel)
            .items
            .lock()
            .expect("channel lock poisoned")
            .len()
    }

    pub fn is_empty(&self, channel: Channel) -> bool {
        self.len(channel) == 0
    }

    /// Deletes everything queued on the channel
    pub fn clear(&self, channel: Channel) {
        self.queue(channel)
            .items
            .lock()
            .expect("channel lock poisoned")
            .clear();
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler invoked by worker loops for each dequeued envelope
#[async_trait::async_trait]
pub trait EnvelopeHandler: Send + Sync {
    async fn handle(&self, channel: Channel, envelope: &QueueEnvelope) -> anyhow::Result<()>;
}

/// Coordinates the channels and the worker pool
pub struct QueueManager {
    broker: Arc<MemoryBroker>,
    config: QueueConfig,
    running: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl QueueManager {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            broker: Arc::new(MemoryBroker::new()),
            config,
            running: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Wraps a payload in a fresh envelope and appends it to the channel
    ///
    /// Returns the generated envelope id.
    pub fn enqueue(
        &self,
        channel: Channel,
        message_type: &str,
        payload: serde_json::Value,
    ) -> crate::Result<String> {
        let envelope = QueueEnvelope::new(message_type, payload, self.config.message_ttl_secs);
        let id = envelope.id.clone();
        self.broker.push(channel, serde_json::to_string(&envelope)?);
        tracing::debug!("Enqueued message {} to {}", id, channel);
        Ok(id)
    }

    /// Removes and returns the head envelope, waiting up to `timeout`
    ///
    /// Expired envelopes are dropped on the way out; the wait continues for
    /// a live one until the timeout elapses.
    pub async fn dequeue(&self, channel: Channel, timeout: Duration) -> Option<QueueEnvelope> {
        dequeue_live(&self.broker, channel, timeout).await
    }

    /// Launches `count` independent worker loops driving the given handler
    pub fn start_workers(&self, count: u32, handler: Arc<dyn EnvelopeHandler>) {
        self.running.store(true, Ordering::SeqCst);

        let mut workers = self.workers.lock().expect("worker list lock poisoned");
        for worker_id in 0..count {
            workers.push(tokio::spawn(worker_loop(
                worker_id,
                self.broker.clone(),
                self.running.clone(),
                self.config.max_retries,
                handler.clone(),
            )));
        }

        tracing::info!("Started {} workers", count);
    }

    /// Stops the worker pool
    ///
    /// Flips the running flag, cancels the worker tasks at their next
    /// suspension point, and awaits them tolerating cancellation. In-flight
    /// work is abandoned, not rolled back.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down queue manager");
        self.running.store(false, Ordering::SeqCst);

        let workers: Vec<JoinHandle<()>> = {
            let mut guard = self.workers.lock().expect("worker list lock poisoned");
            guard.drain(..).collect()
        };

        for worker in &workers {
            worker.abort();
        }
        for worker in workers {
            match worker.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => {}
                Err(e) => tracing::error!("Worker task panicked during shutdown: {}", e),
            }
        }

        tracing::info!("Queue manager shutdown complete");
    }

    /// Number of envelopes currently queued on the channel
    pub fn queue_size(&self, channel: Channel) -> usize {
        self.broker.len(channel)
    }

    /// Deletes everything queued on the channel
    pub fn clear_queue(&self, channel: Channel) {
        self.broker.clear(channel);
        tracing::info!("Cleared queue: {}", channel);
    }
}

/// Dequeues the next non-expired envelope within the time budget
async fn dequeue_live(
    broker: &MemoryBroker,
    channel: Channel,
    timeout: Duration,
) -> Option<QueueEnvelope> {
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let serialized = broker.pop_blocking(channel, remaining).await?;

        let envelope: QueueEnvelope = match serde_json::from_str(&serialized) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!("Dropping undecodable envelope on {}: {}", channel, e);
                continue;
            }
        };

        if envelope.is_expired(Utc::now()) {
            tracing::debug!("Dropping expired envelope {} on {}", envelope.id, channel);
            continue;
        }

        return Some(envelope);
    }
}

/// One worker loop: short-blocking dequeues over all channels in fixed
/// round-robin order
async fn worker_loop(
    worker_id: u32,
    broker: Arc<MemoryBroker>,
    running: Arc<AtomicBool>,
    max_retries: u32,
    handler: Arc<dyn EnvelopeHandler>,
) {
    tracing::info!("Worker {} started", worker_id);

    while running.load(Ordering::SeqCst) {
        for channel in Channel::ALL {
            if !running.load(Ordering::SeqCst) {
                break;
            }

            let envelope = match dequeue_live(&broker, channel, Duration::from_millis(250)).await {
                Some(envelope) => envelope,
                None => continue,
            };

            if let Err(e) = handler.handle(channel, &envelope).await {
                tracing::error!(
                    "Worker {} error handling message {} on {}: {}",
                    worker_id,
                    envelope.id,
                    channel,
                    e
                );
                retry_or_dead_letter(&broker, channel, envelope, max_retries);
            }
        }
    }

    tracing::info!("Worker {} stopped", worker_id);
}

/// Re-enqueues a failed envelope onto the tail of the same channel, or
/// dead-letters it once the retry bound is reached
///
/// The envelope keeps its id; only the retry count changes. With a bound of
/// N the envelope is handled at most N times in total.
fn retry_or_dead_letter(
    broker: &MemoryBroker,
    channel: Channel,
    mut envelope: QueueEnvelope,
    max_retries: u32,
) {
    if envelope.retry_count + 1 < max_retries {
        envelope.retry_count += 1;
        match serde_json::to_string(&envelope) {
            Ok(serialized) => {
                tracing::debug!(
                    "Re-enqueued message {} on {} (retry {})",
                    envelope.id,
                    channel,
                    envelope.retry_count
                );
                broker.push(channel, serialized);
            }
            Err(e) => tracing::error!("Failed to re-serialize envelope {}: {}", envelope.id, e),
        }
    } else {
        tracing::warn!(
            "Dead-lettering message {} on {} after {} failures",
            envelope.id,
            channel,
            envelope.retry_count + 1
        );
    }
}
