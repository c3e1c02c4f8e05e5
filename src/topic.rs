// ABOUTME: Server-side topic -> subscriber fanout table, holding weak connection references so a dead socket isn't kept alive
// ABOUTME: New relative to the teacher (SMPP has no pub/sub); grounded in dashmap's sharded-map shape used elsewhere in the pack

use dashmap::DashMap;
use std::sync::{Arc, Weak};

use crate::connection::Connection;
use crate::frame::RequestFrame;

type SubscriberConnection = Connection<RequestFrame>;

fn ptr_eq(a: &Weak<SubscriberConnection>, b: &Weak<SubscriberConnection>) -> bool {
    std::ptr::eq(a.as_ptr(), b.as_ptr())
}

/// Maps topic name to the set of subscriber connections (held weakly) so
/// publication can fan a push out to every live subscriber without keeping a
/// disconnected socket alive via this table alone.
#[derive(Default)]
pub struct TopicManager {
    topics: DashMap<String, Vec<Weak<SubscriberConnection>>>,
}

impl TopicManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `conn` as a subscriber of `topic`. Idempotent with respect to the
    /// same connection: subscribing twice does not create a duplicate entry.
    pub fn add(&self, topic: &str, conn: &Arc<SubscriberConnection>) {
        let weak = Arc::downgrade(conn);
        let mut entry = self.topics.entry(topic.to_string()).or_default();
        entry.retain(|w| w.upgrade().is_some()); // prune dead entries lazily
        if !entry.iter().any(|existing| ptr_eq(existing, &weak)) {
            entry.push(weak);
        }
    }

    /// Remove exactly the entry matching `conn` from `topic`, if present.
    pub fn remove(&self, topic: &str, conn: &Arc<SubscriberConnection>) {
        let weak = Arc::downgrade(conn);
        if let Some(mut entry) = self.topics.get_mut(topic) {
            entry.retain(|w| w.upgrade().is_some() && !ptr_eq(w, &weak));
        }
    }

    /// Remove every entry across every topic whose weak reference resolves to
    /// `conn`. Called on disconnect so a closed connection's subscriptions do
    /// not linger.
    pub fn remove_all(&self, conn: &Arc<SubscriberConnection>) {
        let weak = Arc::downgrade(conn);
        self.topics.retain(|_topic, subs| {
            subs.retain(|w| w.upgrade().is_some() && !ptr_eq(w, &weak));
            !subs.is_empty()
        });
    }

    /// Snapshot the live subscribers of `topic`, pruning dead entries from the
    /// underlying table as a side effect of enumeration.
    pub fn subscribers(&self, topic: &str) -> Vec<Arc<SubscriberConnection>> {
        let Some(mut entry) = self.topics.get_mut(topic) else {
            return Vec::new();
        };
        let mut live = Vec::with_capacity(entry.len());
        entry.retain(|w| match w.upgrade() {
            Some(conn) => {
                live.push(conn);
                true
            }
            None => false,
        });
        live
    }

    /// Number of topics with at least one live subscriber. Exposed for tests
    /// and diagnostics, not part of the fanout path.
    pub fn topic_count(&self) -> usize {
        self.topics.iter().filter(|e| !e.value().is_empty()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};

    async fn make_connection() -> Arc<SubscriberConnection> {
        let (conn, peer) = make_connection_with_peer().await;
        std::mem::forget(peer); // keep the peer socket open for the test's duration
        conn
    }

    /// Like [`make_connection`], but also hands back the peer socket instead
    /// of leaking it, so a test can close it to drive a real disconnect.
    async fn make_connection_with_peer() -> (Arc<SubscriberConnection>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let client = TcpStream::connect(addr).await.unwrap();
        let server = accept.await.unwrap();
        let conn = Connection::start(server, |_frame: RequestFrame, _conn| async move {}, |_conn| {}).unwrap();
        (conn, client)
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let manager = TopicManager::new();
        let conn = make_connection().await;
        manager.add("news", &conn);
        manager.add("news", &conn);
        assert_eq!(manager.subscribers("news").len(), 1);
    }

    #[tokio::test]
    async fn remove_drops_exactly_the_matching_entry() {
        let manager = TopicManager::new();
        let a = make_connection().await;
        let b = make_connection().await;
        manager.add("news", &a);
        manager.add("news", &b);
        manager.remove("news", &a);
        let remaining = manager.subscribers("news");
        assert_eq!(remaining.len(), 1);
        assert!(std::ptr::eq(Arc::as_ptr(&remaining[0]), Arc::as_ptr(&b)));
    }

    #[tokio::test]
    async fn dead_connection_is_pruned_and_not_kept_alive() {
        let manager = TopicManager::new();
        let (conn, peer) = make_connection_with_peer().await;
        manager.add("news", &conn);

        // Dropping our own handle alone isn't enough: the reader and writer
        // tasks each hold their own strong clone for as long as the socket
        // stays open. Close the peer half so the server-side reader loop
        // observes EOF and calls `disconnect()`, which aborts both tasks and
        // releases their clones; only then does dropping our last handle
        // actually free the connection.
        drop(peer);
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(conn);

        assert_eq!(manager.subscribers("news").len(), 0);
    }

    #[tokio::test]
    async fn remove_all_clears_every_topic_for_a_connection() {
        let manager = TopicManager::new();
        let conn = make_connection().await;
        manager.add("news", &conn);
        manager.add("weather", &conn);
        manager.remove_all(&conn);
        assert_eq!(manager.subscribers("news").len(), 0);
        assert_eq!(manager.subscribers("weather").len(), 0);
    }
}
