//! Topic subscription bookkeeping shared by every open view.
//!
//! The same room can be open in the floating widget and the full-page view
//! at once; that must not create two broker subscriptions. The registry
//! reference-counts logical owners per topic and the multiplexer only
//! talks to the session on the 0→1 and 1→0 edges.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::SessionError;
use crate::session::SessionHandle;

/// Reference counts per topic. Pure bookkeeping, no I/O.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    counts: HashMap<String, usize>,
}

impl TopicRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
        }
    }

    /// Register one more owner for a topic.
    ///
    /// Returns true on the 0→1 edge, when a broker subscription is needed.
    pub fn acquire(&mut self, topic: &str) -> bool {
        let count = self.counts.entry(topic.to_string()).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Drop one owner of a topic.
    ///
    /// Returns true on the 1→0 edge, when the broker subscription should
    /// go away. Releasing an untracked topic is a logged no-op.
    pub fn release(&mut self, topic: &str) -> bool {
        match self.counts.get_mut(topic) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.counts.remove(topic);
                true
            }
            None => {
                warn!(topic = %topic, "Release for untracked topic");
                false
            }
        }
    }

    /// Current owner count for a topic (0 when untracked).
    pub fn refcount(&self, topic: &str) -> usize {
        self.counts.get(topic).copied().unwrap_or(0)
    }

    /// Whether the topic has at least one owner.
    pub fn is_tracked(&self, topic: &str) -> bool {
        self.counts.contains_key(topic)
    }

    /// All tracked topics, in no particular order.
    pub fn topics(&self) -> Vec<String> {
        self.counts.keys().cloned().collect()
    }

    /// Number of tracked topics.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Edge-triggered subscription front for the session.
///
/// Holds the registry behind an async mutex so an edge and its matching
/// session command happen atomically with respect to other callers.
#[derive(Debug)]
pub struct Multiplexer {
    session: SessionHandle,
    registry: Mutex<TopicRegistry>,
}

impl Multiplexer {
    pub fn new(session: SessionHandle) -> Self {
        Self {
            session,
            registry: Mutex::new(TopicRegistry::new()),
        }
    }

    /// Register an owner for a topic, subscribing on the broker if this is
    /// the first one. Safe to call any number of times.
    pub async fn ensure_subscribed(&self, topic: &str) -> Result<(), SessionError> {
        let mut registry = self.registry.lock().await;
        if registry.acquire(topic) {
            self.session.subscribe(topic).await?;
            debug!(topic = %topic, "First owner, subscribing");
        } else {
            debug!(topic = %topic, owners = registry.refcount(topic), "Topic already subscribed");
        }
        Ok(())
    }

    /// Drop an owner for a topic, unsubscribing on the broker when the
    /// last one goes.
    pub async fn release(&self, topic: &str) -> Result<(), SessionError> {
        let mut registry = self.registry.lock().await;
        if registry.release(topic) {
            self.session.unsubscribe(topic).await?;
            debug!(topic = %topic, "Last owner gone, unsubscribing");
        }
        Ok(())
    }

    /// Snapshot of tracked topics.
    pub async fn tracked_topics(&self) -> Vec<String> {
        self.registry.lock().await.topics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{spawn_session, SessionConfig};

    #[test]
    fn test_registry_acquire_edges() {
        let mut registry = TopicRegistry::new();
        assert!(registry.acquire("chat/42"));
        assert!(!registry.acquire("chat/42"));
        assert_eq!(registry.refcount("chat/42"), 2);
        assert!(registry.acquire("chat/7"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_registry_release_edges() {
        let mut registry = TopicRegistry::new();
        registry.acquire("chat/42");
        registry.acquire("chat/42");

        assert!(!registry.release("chat/42"));
        assert!(registry.release("chat/42"));
        assert!(!registry.is_tracked("chat/42"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_release_untracked_is_no_op() {
        let mut registry = TopicRegistry::new();
        assert!(!registry.release("chat/42"));
        assert_eq!(registry.refcount("chat/42"), 0);
    }

    fn disconnected_session() -> SessionHandle {
        // Nothing listens on the URL; the session is never acquired, so the
        // tracked topic set is observable without any I/O.
        let config = SessionConfig {
            broker_url: "ws://127.0.0.1:9".to_string(),
            ..SessionConfig::default()
        };
        let (handle, _events) = spawn_session(config);
        handle
    }

    #[tokio::test]
    async fn test_ensure_subscribed_is_idempotent() {
        let session = disconnected_session();
        let mux = Multiplexer::new(session.clone());

        mux.ensure_subscribed("chat/42").await.unwrap();
        mux.ensure_subscribed("chat/42").await.unwrap();

        assert_eq!(session.tracked_topics().await.unwrap(), vec!["chat/42"]);
        assert_eq!(mux.tracked_topics().await, vec!["chat/42"]);
    }

    #[tokio::test]
    async fn test_release_unsubscribes_only_last_owner() {
        let session = disconnected_session();
        let mux = Multiplexer::new(session.clone());

        mux.ensure_subscribed("chat/42").await.unwrap();
        mux.ensure_subscribed("chat/42").await.unwrap();

        mux.release("chat/42").await.unwrap();
        assert_eq!(session.tracked_topics().await.unwrap(), vec!["chat/42"]);

        mux.release("chat/42").await.unwrap();
        assert!(session.tracked_topics().await.unwrap().is_empty());
        assert!(mux.tracked_topics().await.is_empty());
    }
}
