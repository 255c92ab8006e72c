//! Notification hub: fan-out of pipeline events to live observers.
//!
//! Every subscriber owns a bounded queue. [`Hub::publish`] never waits:
//! when a queue is full its oldest message is discarded and counted, so a
//! stalled observer cannot slow the sync coordinator or its peers.
//!
//! A new subscriber's queue starts with a [`HubMessage::Snapshot`]. The
//! snapshot is taken while the registry is write-locked, which orders it
//! before any event published after registration.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use tokio::sync::Notify;

use liveindex_core::models::{PipelineEvent, StatusSnapshot};

/// One message in a subscriber's stream.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Snapshot(StatusSnapshot),
    Event(PipelineEvent),
}

struct SubscriberQueue {
    messages: Mutex<VecDeque<HubMessage>>,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl SubscriberQueue {
    fn new(capacity: usize) -> Self {
        Self {
            messages: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn push(&self, msg: HubMessage, capacity: usize) {
        {
            let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
            while messages.len() >= capacity {
                messages.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            messages.push_back(msg);
        }
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<HubMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

pub struct Hub {
    capacity: usize,
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<u64, Arc<SubscriberQueue>>>,
}

impl Hub {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(HashMap::new()),
        })
    }

    /// Register a subscriber whose first message is the snapshot produced
    /// by `snapshot`. `snapshot` runs under the registry lock and must not
    /// touch the hub.
    pub fn subscribe_with<F>(self: &Arc<Self>, snapshot: F) -> Subscription
    where
        F: FnOnce() -> StatusSnapshot,
    {
        let queue = Arc::new(SubscriberQueue::new(self.capacity));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        queue.push(HubMessage::Snapshot(snapshot()), self.capacity);
        subscribers.insert(id, queue.clone());
        drop(subscribers);

        tracing::debug!(subscriber = id, "observer subscribed");
        Subscription {
            id,
            queue,
            hub: Arc::downgrade(self),
        }
    }

    /// Deliver `event` to every subscriber without blocking. Returns the
    /// number of subscribers it was queued for.
    pub fn publish(&self, event: PipelineEvent) -> usize {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for queue in subscribers.values() {
            queue.push(HubMessage::Event(event.clone()), self.capacity);
        }
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn unsubscribe(&self, id: u64) {
        let removed = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if removed.is_some() {
            tracing::debug!(subscriber = id, "observer unsubscribed");
        }
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        let subscribers = self
            .subscribers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for queue in subscribers.values() {
            queue.close();
        }
    }
}

/// Receiving end of one subscriber. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    queue: Arc<SubscriberQueue>,
    hub: Weak<Hub>,
}

impl Subscription {
    /// Next message, waiting if the queue is empty. `None` once the hub is
    /// gone and the queue is drained.
    pub async fn recv(&self) -> Option<HubMessage> {
        loop {
            if let Some(msg) = self.queue.pop() {
                return Some(msg);
            }
            if self.queue.closed.load(Ordering::Acquire) {
                return None;
            }
            self.queue.notify.notified().await;
        }
    }

    pub fn try_recv(&self) -> Option<HubMessage> {
        self.queue.pop()
    }

    /// Messages discarded from this subscriber's queue so far.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}
