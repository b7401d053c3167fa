use futures_util::Stream;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use switchyard_core::TaskEvent;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

/// Event fan-out settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Buffered events per channel before slow subscribers start losing the oldest.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Per-channel bounded fan-out of [`TaskEvent`]s, plus a firehose of every channel.
///
/// Publishing never blocks. A subscriber that falls more than the channel
/// capacity behind skips the oldest events and keeps going.
pub struct EventBroadcaster {
    capacity: usize,
    channels: RwLock<HashMap<String, broadcast::Sender<TaskEvent>>>,
    all: broadcast::Sender<TaskEvent>,
}

impl EventBroadcaster {
    /// A broadcaster with `config.channel_capacity` slots per channel.
    pub fn new(config: &EventsConfig) -> Self {
        let capacity = config.channel_capacity.max(1);
        let (all, _) = broadcast::channel(capacity);
        Self {
            capacity,
            channels: RwLock::new(HashMap::new()),
            all,
        }
    }

    /// Publish to `channel` and the firehose.
    pub fn publish(&self, channel: &str, event: TaskEvent) {
        if let Some(tx) = self.channels.read().get(channel) {
            // No receivers is fine.
            let _ = tx.send(event.clone());
        }
        let _ = self.all.send(event);
    }

    /// Stream of future events on `channel`.
    ///
    /// Channels whose subscribers have all gone away are dropped here, so a
    /// channel subscribed for a task that never runs does not outlive its
    /// subscribers.
    pub fn subscribe(&self, channel: &str) -> EventStream {
        let rx = {
            let mut channels = self.channels.write();
            channels.retain(|_, tx| tx.receiver_count() > 0);
            channels
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };
        EventStream::new(channel.to_string(), rx)
    }

    /// Stream of future events on every channel.
    pub fn subscribe_all(&self) -> EventStream {
        EventStream::new("*".to_string(), self.all.subscribe())
    }

    /// Close `channel`. Its subscribers receive what is buffered, then the stream ends.
    pub fn retire(&self, channel: &str) {
        self.channels.write().remove(channel);
    }

    /// Number of open channels.
    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(&EventsConfig::default())
    }
}

/// A subscriber's view of one channel (or the firehose).
pub struct EventStream {
    channel: String,
    inner: BroadcastStream<TaskEvent>,
}

impl EventStream {
    fn new(channel: String, rx: broadcast::Receiver<TaskEvent>) -> Self {
        Self {
            channel,
            inner: BroadcastStream::new(rx),
        }
    }

    /// Task id this stream follows, or the firehose name.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Stream for EventStream {
    type Item = TaskEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<TaskEvent>> {
        loop {
            match ready!(Pin::new(&mut self.inner).poll_next(cx)) {
                Some(Ok(event)) => return Poll::Ready(Some(event)),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!(channel = %self.channel, skipped, "Event subscriber lagged");
                }
                None => return Poll::Ready(None),
            }
        }
    }
}
