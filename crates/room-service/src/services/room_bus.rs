//! Per-room change notification bus.
//!
//! One broadcast topic per room code. A topic exists only while someone is
//! subscribed: it is created by the first `subscribe` and removed when the
//! last subscription drops, when a publish finds no receivers, or when the
//! room closes.
//!
//! Delivery is best-effort and ordered per subscriber. There is no replay: a
//! subscriber that lags past the channel capacity skips the missed events and
//! continues with the newest ones.
//!
//! Snapshots are published after their transaction commits, outside the room
//! lock, so two mutations of one room can reach the bus in either order. Each
//! topic remembers the newest snapshot version it sent and drops older ones.
//!
//! The bus is constructed once, injected into the coordinator and the reaper,
//! and torn down with [`RoomBus::shutdown`], which ends every open stream.

use crate::models::{EmojiReaction, RoomSnapshot};
use crate::observability::metrics;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

/// Buffered events per topic before slow subscribers start skipping.
pub const DEFAULT_TOPIC_CAPACITY: usize = 256;

/// Event delivered on a room topic.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// Fresh state after a successful mutation.
    Snapshot(RoomSnapshot),
    /// Ephemeral emoji reaction from a member.
    Reaction(EmojiReaction),
    /// The room was deleted; no further events follow.
    Closed { room_code: String },
}

impl RoomEvent {
    /// Short label used for SSE event names and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RoomEvent::Snapshot(_) => "snapshot",
            RoomEvent::Reaction(_) => "reaction",
            RoomEvent::Closed { .. } => "closed",
        }
    }
}

struct Topic {
    sender: broadcast::Sender<RoomEvent>,
    /// Version of the newest snapshot sent on this topic.
    last_version: Option<i64>,
}

struct BusInner {
    topics: Mutex<HashMap<String, Topic>>,
    capacity: usize,
    shut_down: AtomicBool,
}

impl BusInner {
    fn topics(&self) -> MutexGuard<'_, HashMap<String, Topic>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn prune(&self, room_code: &str) {
        let mut topics = self.topics();
        let idle = topics
            .get(room_code)
            .is_some_and(|topic| topic.sender.receiver_count() == 0);
        if idle {
            topics.remove(room_code);
            debug!(target: "room.bus", room_code = %room_code, "Removed idle topic");
        }
        metrics::set_bus_topics(topics.len());
    }
}

/// Process-scoped registry of room topics.
#[derive(Clone)]
pub struct RoomBus {
    inner: Arc<BusInner>,
}

impl Default for RoomBus {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_CAPACITY)
    }
}

impl RoomBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                topics: Mutex::new(HashMap::new()),
                capacity: capacity.max(1),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Open a fresh subscription to `room_code`.
    ///
    /// Each call gets its own receiver; events published before this call are
    /// not seen. After [`shutdown`](Self::shutdown) the returned subscription
    /// is already ended.
    pub fn subscribe(&self, room_code: &str) -> RoomSubscription {
        let receiver = if self.inner.shut_down.load(Ordering::Acquire) {
            let (sender, receiver) = broadcast::channel(1);
            drop(sender);
            receiver
        } else {
            let mut topics = self.inner.topics();
            let receiver = match topics.get(room_code) {
                Some(topic) => topic.sender.subscribe(),
                None => {
                    let (sender, receiver) = broadcast::channel(self.inner.capacity);
                    topics.insert(
                        room_code.to_string(),
                        Topic {
                            sender,
                            last_version: None,
                        },
                    );
                    receiver
                }
            };
            metrics::set_bus_topics(topics.len());
            receiver
        };

        debug!(target: "room.bus", room_code = %room_code, "Subscription opened");

        RoomSubscription {
            room_code: room_code.to_string(),
            stream: Some(BroadcastStream::new(receiver)),
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to every live subscription of `room_code`.
    ///
    /// Returns the number of subscriptions the event was queued for.
    pub fn publish(&self, room_code: &str, event: RoomEvent) -> usize {
        let mut topics = self.inner.topics();
        send_locked(&mut topics, room_code, event)
    }

    /// Publish a fresh snapshot on the snapshot's own topic.
    ///
    /// A snapshot whose version is not newer than the last one sent on the
    /// topic is dropped and reaches nobody.
    pub fn publish_snapshot(&self, snapshot: RoomSnapshot) -> usize {
        let room_code = snapshot.code.clone();
        let version = snapshot.version;
        let mut topics = self.inner.topics();

        if let Some(topic) = topics.get_mut(&room_code) {
            if topic.last_version.is_some_and(|last| last >= version) {
                debug!(
                    target: "room.bus",
                    room_code = %room_code,
                    version,
                    "Dropped stale snapshot"
                );
                return 0;
            }
            topic.last_version = Some(version);
        }

        send_locked(&mut topics, &room_code, RoomEvent::Snapshot(snapshot))
    }

    /// Publish the final `Closed` event for a deleted room and drop its topic.
    ///
    /// Subscribers receive the event and then see their stream end.
    pub fn close_room(&self, room_code: &str) -> usize {
        let mut topics = self.inner.topics();
        let delivered = send_locked(
            &mut topics,
            room_code,
            RoomEvent::Closed {
                room_code: room_code.to_string(),
            },
        );

        topics.remove(room_code);
        metrics::set_bus_topics(topics.len());

        delivered
    }

    /// Drop every topic, ending all open streams. Later subscriptions end
    /// immediately.
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::Release);
        let mut topics = self.inner.topics();
        let closed = topics.len();
        topics.clear();
        metrics::set_bus_topics(0);
        debug!(target: "room.bus", closed, "Notification bus shut down");
    }

    /// Number of rooms with at least one live subscription.
    pub fn topic_count(&self) -> usize {
        self.inner.topics().len()
    }

    /// Number of live subscriptions on `room_code`.
    pub fn subscriber_count(&self, room_code: &str) -> usize {
        self.inner
            .topics()
            .get(room_code)
            .map_or(0, |topic| topic.sender.receiver_count())
    }
}

/// Send `event` on `room_code`'s topic with the topic map already locked.
/// A topic whose receivers are all gone is removed.
fn send_locked(topics: &mut HashMap<String, Topic>, room_code: &str, event: RoomEvent) -> usize {
    let kind = event.kind();

    let delivered = match topics.get(room_code) {
        Some(topic) => match topic.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                topics.remove(room_code);
                0
            }
        },
        None => 0,
    };

    metrics::record_event_published(kind, delivered);
    metrics::set_bus_topics(topics.len());
    debug!(
        target: "room.bus",
        room_code = %room_code,
        kind,
        delivered,
        "Published room event"
    );

    delivered
}

/// A cancellable subscription to one room topic.
///
/// Dropping the subscription (or calling [`cancel`](Self::cancel)) releases
/// its receiver and removes the topic if it was the last one. Other
/// subscriptions to the same room are unaffected.
pub struct RoomSubscription {
    room_code: String,
    stream: Option<BroadcastStream<RoomEvent>>,
    bus: Weak<BusInner>,
}

impl RoomSubscription {
    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    /// Wait for the next event; `None` once the topic is gone.
    pub async fn recv(&mut self) -> Option<RoomEvent> {
        futures::StreamExt::next(self).await
    }

    /// End the subscription explicitly.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Stream for RoomSubscription {
    type Item = RoomEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(stream) = this.stream.as_mut() else {
            return Poll::Ready(None);
        };

        loop {
            match Pin::new(&mut *stream).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => return Poll::Ready(Some(event)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    warn!(
                        target: "room.bus",
                        room_code = %this.room_code,
                        skipped,
                        "Subscriber lagged, skipping missed events"
                    );
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for RoomSubscription {
    fn drop(&mut self) {
        // Release the receiver before checking whether the topic is idle.
        drop(self.stream.take());
        if let Some(inner) = self.bus.upgrade() {
            inner.prune(&self.room_code);
        }
    }
}
