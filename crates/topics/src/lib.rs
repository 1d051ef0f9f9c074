//! Topic registry and subscriber hub (§4.2).
//!
//! A topic is registered at node creation, even with zero subscribers, so
//! discovery lists it. Each subscriber gets a single-slot channel: a send
//! that fails (full or the receiver dropped) removes that subscriber from
//! the topic on the spot, so one slow listener never backs up delivery to
//! the rest.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use types::SYSTEM_TOPICS;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopicsError {
    #[error("timed out waiting for next frame on topic `{0}`")]
    Timeout(String),
}

#[derive(Default)]
struct TopicState {
    subscribers: Vec<mpsc::Sender<Message>>,
    waiters: HashMap<u64, oneshot::Sender<Message>>,
    next_waiter_id: u64,
}

pub type Message = std::sync::Arc<[u8]>;

/// A live subscription to a topic; drop it to unsubscribe.
pub struct Subscription {
    topic: String,
    rx: mpsc::Receiver<Message>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}

pub struct TopicHub {
    topics: Mutex<HashMap<String, TopicState>>,
}

impl TopicHub {
    pub fn new() -> Self {
        Self { topics: Mutex::new(HashMap::new()) }
    }

    pub fn register(&self, topic: &str) {
        self.topics.lock().unwrap().entry(topic.to_string()).or_default();
    }

    pub fn unregister(&self, topic: &str) {
        self.topics.lock().unwrap().remove(topic);
    }

    pub fn subscribe(&self, topic: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(1);
        let mut topics = self.topics.lock().unwrap();
        topics.entry(topic.to_string()).or_default().subscribers.push(tx);
        Subscription { topic: topic.to_string(), rx }
    }

    /// Send `msg` to every current subscriber and wake any pending
    /// `await_next` waiters on this topic. Subscribers whose send fails are
    /// removed before this call returns.
    pub fn broadcast(&self, topic: &str, msg: Message) {
        let mut topics = self.topics.lock().unwrap();
        let Some(state) = topics.get_mut(topic) else { return };

        state.subscribers.retain(|tx| match tx.try_send(msg.clone()) {
            Ok(()) => true,
            Err(_) => {
                debug!(topic, "dropping subscriber after failed send");
                false
            }
        });

        for (_, waiter) in state.waiters.drain() {
            let _ = waiter.send(msg.clone());
        }
    }

    /// Wait for the next broadcast on `topic`, or fail with `Timeout` if
    /// none arrives within `timeout`. The waiter is removed on either
    /// outcome, so an idle topic polled repeatedly never accumulates
    /// stale senders.
    pub async fn await_next(&self, topic: &str, timeout: Duration) -> Result<Message, TopicsError> {
        let (tx, rx) = oneshot::channel();
        let waiter_id = {
            let mut topics = self.topics.lock().unwrap();
            let state = topics.entry(topic.to_string()).or_default();
            let id = state.next_waiter_id;
            state.next_waiter_id += 1;
            state.waiters.insert(id, tx);
            id
        };

        let result = tokio::time::timeout(timeout, rx).await;
        if let Some(state) = self.topics.lock().unwrap().get_mut(topic) {
            state.waiters.remove(&waiter_id);
        }

        match result {
            Ok(Ok(msg)) => Ok(msg),
            _ => Err(TopicsError::Timeout(topic.to_string())),
        }
    }

    /// Sorted topic names minus the reserved system topics.
    pub fn public_topics(&self) -> Vec<String> {
        let topics = self.topics.lock().unwrap();
        let mut names: Vec<String> =
            topics.keys().filter(|t| !SYSTEM_TOPICS.contains(&t.as_str())).cloned().collect();
        names.sort();
        names
    }

    pub fn has_subscribers(&self, topic: &str) -> bool {
        self.topics.lock().unwrap().get(topic).is_some_and(|s| !s.subscribers.is_empty())
    }
}

impl Default for TopicHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(bytes: &[u8]) -> Message {
        Message::from(bytes.to_vec())
    }

    #[test]
    fn register_and_unregister_are_idempotent() {
        let hub = TopicHub::new();
        hub.register("a");
        hub.register("a");
        assert_eq!(hub.public_topics(), vec!["a".to_string()]);
        hub.unregister("a");
        hub.unregister("a");
        assert!(hub.public_topics().is_empty());
    }

    #[test]
    fn public_topics_excludes_system_topics() {
        let hub = TopicHub::new();
        hub.register("lidar_front_abcd1234");
        hub.register("system_status");
        assert_eq!(hub.public_topics(), vec!["lidar_front_abcd1234".to_string()]);
    }

    #[tokio::test]
    async fn broadcast_delivers_to_subscriber() {
        let hub = TopicHub::new();
        hub.register("topic_a");
        let mut sub = hub.subscribe("topic_a");
        hub.broadcast("topic_a", msg(b"hello"));
        let received = sub.recv().await.unwrap();
        assert_eq!(&*received, b"hello");
    }

    #[tokio::test]
    async fn has_subscribers_reflects_live_subscription() {
        let hub = TopicHub::new();
        hub.register("topic_a");
        assert!(!hub.has_subscribers("topic_a"));
        let sub = hub.subscribe("topic_a");
        assert!(hub.has_subscribers("topic_a"));
        drop(sub);
    }

    #[tokio::test]
    async fn closed_subscriber_is_removed_on_next_broadcast() {
        let hub = TopicHub::new();
        hub.register("topic_a");
        let sub = hub.subscribe("topic_a");
        drop(sub);
        hub.broadcast("topic_a", msg(b"x"));
        assert!(!hub.has_subscribers("topic_a"));
    }

    #[tokio::test]
    async fn await_next_resolves_on_broadcast() {
        let hub = std::sync::Arc::new(TopicHub::new());
        hub.register("topic_a");
        let hub2 = hub.clone();
        let waiter = tokio::spawn(async move { hub2.await_next("topic_a", Duration::from_secs(1)).await });
        tokio::task::yield_now().await;
        hub.broadcast("topic_a", msg(b"next"));
        let result = waiter.await.unwrap().unwrap();
        assert_eq!(&*result, b"next");
    }

    #[tokio::test]
    async fn await_next_times_out_without_broadcast() {
        let hub = TopicHub::new();
        hub.register("topic_a");
        let result = hub.await_next("topic_a", Duration::from_millis(20)).await;
        assert_eq!(result, Err(TopicsError::Timeout("topic_a".to_string())));
    }
}
