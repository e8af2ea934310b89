//! Observable value feed
//!
//! A [`Feed`] fans every published value out to all current subscribers in
//! publish order. Each subscriber gets its own unbounded channel, so a slow
//! reader never causes another reader to miss a value. [`Feed::latest`]
//! gives latest-value-wins reads for callers that only care about the
//! current state.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Handle identifying one subscription on a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct FeedInner<T> {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, UnboundedSender<T>)>,
    latest: Option<T>,
}

/// Multi-subscriber stream of values of type `T`.
///
/// Clones share the same subscriber list.
pub struct Feed<T> {
    inner: Arc<Mutex<FeedInner<T>>>,
}

impl<T> Clone for Feed<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T> fmt::Debug for Feed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Feed")
            .field("subscribers", &inner.subscribers.len())
            .field("has_latest", &inner.latest.is_some())
            .finish()
    }
}

impl<T: Clone + Send + 'static> Default for Feed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Feed<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FeedInner {
                next_id: 0,
                subscribers: Vec::new(),
                latest: None,
            })),
        }
    }

    /// Feed whose [`latest`](Self::latest) starts out as `value`.
    #[must_use]
    pub fn with_initial(value: T) -> Self {
        let feed = Self::new();
        feed.inner.lock().latest = Some(value);
        feed
    }

    /// Register a subscriber. It receives every value published after this
    /// call; use [`latest`](Self::latest) for the current value.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.subscribers.push((id, tx));
        Subscription { id, receiver: rx }
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sub_id, _)| *sub_id != id);
        inner.subscribers.len() != before
    }

    /// Deliver `value` to every subscriber and record it as the latest value.
    ///
    /// Subscribers whose receiver was dropped are pruned.
    pub fn publish(&self, value: T) {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(|(_, tx)| tx.send(value.clone()).is_ok());
        inner.latest = Some(value);
    }

    #[must_use]
    pub fn latest(&self) -> Option<T> {
        self.inner.lock().latest.clone()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

/// Receiving end of a feed subscription.
#[derive(Debug)]
pub struct Subscription<T> {
    id: SubscriptionId,
    receiver: UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next value, or `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Next value if one is already buffered.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Drain everything currently buffered.
    pub fn drain(&mut self) -> Vec<T> {
        std::iter::from_fn(|| self.receiver.try_recv().ok()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_value_reaches_every_subscriber_in_order() {
        let feed = Feed::new();
        let mut first = feed.subscribe();
        let mut second = feed.subscribe();

        for value in 1..=3 {
            feed.publish(value);
        }

        assert_eq!(first.drain(), vec![1, 2, 3]);
        assert_eq!(second.recv().await, Some(1));
        assert_eq!(second.drain(), vec![2, 3]);
        assert_eq!(feed.latest(), Some(3));
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let feed = Feed::new();
        let mut sub = feed.subscribe();
        assert!(feed.unsubscribe(sub.id()));
        assert!(!feed.unsubscribe(sub.id()));

        feed.publish("ignored");
        assert_eq!(sub.try_recv(), None);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let feed = Feed::new();
        let sub = feed.subscribe();
        let _kept = feed.subscribe();
        drop(sub);

        feed.publish(1u8);
        assert_eq!(feed.subscriber_count(), 1);
    }

    #[test]
    fn initial_value_is_latest_but_not_replayed() {
        let feed = Feed::with_initial("disconnected");
        let mut sub = feed.subscribe();
        assert_eq!(feed.latest(), Some("disconnected"));
        assert_eq!(sub.try_recv(), None);
    }
}
