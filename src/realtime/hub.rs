//! Topic registry for live analytics viewers.
//!
//! Each form id names a topic holding the viewers currently watching that
//! form. The lock guards membership only: `publish` snapshots the viewer set
//! and releases the lock before any delivery starts.

use super::viewer::{Viewer, ViewerId};
use crate::error::DeliveryError;
use crate::models::FormId;
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

type Topic = HashMap<ViewerId, Arc<dyn Viewer>>;

/// Outcome of one publish call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fanout {
    /// Viewers that accepted the update.
    pub delivered: usize,
    /// Viewers whose delivery failed.
    pub failed: usize,
}

/// Registry of live viewers keyed by form id.
#[derive(Default)]
pub struct Hub {
    topics: RwLock<HashMap<FormId, Topic>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<FormId, Topic>> {
        self.topics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<FormId, Topic>> {
        self.topics.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a viewer to a form's topic, creating the topic if needed.
    ///
    /// Returns `false` if the viewer was already subscribed.
    pub fn subscribe(&self, form_id: &str, viewer: Arc<dyn Viewer>) -> bool {
        let viewer_id = viewer.id();
        let added = self
            .write()
            .entry(form_id.to_string())
            .or_default()
            .insert(viewer_id, viewer)
            .is_none();

        if added {
            debug!("Viewer {} subscribed to form {}", viewer_id, form_id);
        }
        added
    }

    /// Remove a viewer from a form's topic. Empty topics are dropped.
    ///
    /// Returns `false` if the viewer was not subscribed.
    pub fn unsubscribe(&self, form_id: &str, viewer_id: ViewerId) -> bool {
        let mut topics = self.write();
        let Some(topic) = topics.get_mut(form_id) else {
            return false;
        };

        let removed = topic.remove(&viewer_id).is_some();
        if topic.is_empty() {
            topics.remove(form_id);
        }
        drop(topics);

        if removed {
            debug!("Viewer {} unsubscribed from form {}", viewer_id, form_id);
        }
        removed
    }

    /// Number of viewers watching a form.
    #[allow(dead_code)] // Introspection for transports and tests
    pub fn subscriber_count(&self, form_id: &str) -> usize {
        self.read().get(form_id).map(|t| t.len()).unwrap_or(0)
    }

    /// Number of forms with at least one viewer.
    #[allow(dead_code)] // Introspection for transports and tests
    pub fn topic_count(&self) -> usize {
        self.read().len()
    }

    fn snapshot(&self, form_id: &str) -> Vec<Arc<dyn Viewer>> {
        self.read()
            .get(form_id)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Serialize `payload` once and deliver it to every viewer of a form.
    ///
    /// Publishing to a form nobody watches is a no-op. Deliveries run
    /// concurrently; a failed delivery is logged and counted but never
    /// stops the others. Viewers that turn out to be disconnected are
    /// unsubscribed afterwards.
    pub async fn publish<T>(&self, form_id: &str, payload: &T) -> Fanout
    where
        T: Serialize + Sync + ?Sized,
    {
        let viewers = self.snapshot(form_id);
        if viewers.is_empty() {
            debug!("No viewers for form {}, skipping publish", form_id);
            return Fanout::default();
        }

        let message: Arc<str> = match serde_json::to_string(payload) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!("Failed to serialize update for form {}: {}", form_id, e);
                return Fanout {
                    delivered: 0,
                    failed: viewers.len(),
                };
            }
        };

        let results = join_all(viewers.iter().map(|viewer| {
            let message = Arc::clone(&message);
            async move { (viewer.id(), viewer.send(message).await) }
        }))
        .await;

        let mut fanout = Fanout::default();
        let mut disconnected = Vec::new();
        for (viewer_id, result) in results {
            match result {
                Ok(()) => fanout.delivered += 1,
                Err(e) => {
                    warn!("Delivery to viewer {} for form {} failed: {}", viewer_id, form_id, e);
                    fanout.failed += 1;
                    if e == DeliveryError::Disconnected {
                        disconnected.push(viewer_id);
                    }
                }
            }
        }

        for viewer_id in disconnected {
            self.unsubscribe(form_id, viewer_id);
        }

        debug!(
            "Published update for form {}: {} delivered, {} failed",
            form_id, fanout.delivered, fanout.failed
        );
        fanout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::viewer::{next_viewer_id, ChannelViewer};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc::error::TryRecvError;

    /// Viewer whose transport always errors.
    struct BrokenViewer {
        id: ViewerId,
        attempts: AtomicUsize,
    }

    impl BrokenViewer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: next_viewer_id(),
                attempts: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Viewer for BrokenViewer {
        fn id(&self) -> ViewerId {
            self.id
        }

        async fn send(&self, _payload: Arc<str>) -> Result<(), DeliveryError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(DeliveryError::Transport("socket reset".to_string()))
        }
    }

    /// Viewer that takes a long time to accept each update.
    struct SlowViewer {
        id: ViewerId,
    }

    #[async_trait]
    impl Viewer for SlowViewer {
        fn id(&self) -> ViewerId {
            self.id
        }

        async fn send(&self, _payload: Arc<str>) -> Result<(), DeliveryError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_subscribe_then_publish_delivers_once() {
        let hub = Hub::new();
        let (viewer, mut rx) = ChannelViewer::channel(8);
        hub.subscribe("f", viewer);

        let fanout = hub.publish("f", &json!({"total": 1})).await;
        assert_eq!(fanout, Fanout { delivered: 1, failed: 0 });

        assert_eq!(rx.recv().await.as_deref(), Some(r#"{"total":1}"#));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_unsubscribed_viewer_gets_nothing() {
        let hub = Hub::new();
        let (viewer, mut rx) = ChannelViewer::channel(8);
        let viewer_id = viewer.id();
        hub.subscribe("f", viewer);

        assert!(hub.unsubscribe("f", viewer_id));
        let fanout = hub.publish("f", &json!({"total": 2})).await;

        assert_eq!(fanout, Fanout::default());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let hub = Hub::new();
        assert_eq!(hub.publish("nobody", &json!({})).await, Fanout::default());
        assert_eq!(hub.topic_count(), 0);
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let hub = Hub::new();
        let (viewer, _rx) = ChannelViewer::channel(1);

        assert!(hub.subscribe("f", viewer.clone()));
        assert!(!hub.subscribe("f", viewer.clone()));
        assert_eq!(hub.subscriber_count("f"), 1);
    }

    #[test]
    fn test_empty_topics_are_removed() {
        let hub = Hub::new();
        let (a, _ra) = ChannelViewer::channel(1);
        let (b, _rb) = ChannelViewer::channel(1);
        hub.subscribe("f", a.clone());
        hub.subscribe("f", b.clone());
        assert_eq!(hub.topic_count(), 1);

        assert!(hub.unsubscribe("f", a.id()));
        assert_eq!(hub.topic_count(), 1);
        assert!(hub.unsubscribe("f", b.id()));
        assert_eq!(hub.topic_count(), 0);

        // Removing again is a no-op.
        assert!(!hub.unsubscribe("f", b.id()));
        assert!(!hub.unsubscribe("other", b.id()));
    }

    #[tokio::test]
    async fn test_topics_are_isolated_per_form() {
        let hub = Hub::new();
        let (a, mut ra) = ChannelViewer::channel(4);
        let (b, mut rb) = ChannelViewer::channel(4);
        hub.subscribe("one", a);
        hub.subscribe("two", b);

        hub.publish("one", &json!("for-one")).await;

        assert_eq!(ra.recv().await.as_deref(), Some(r#""for-one""#));
        assert!(matches!(rb.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_failed_delivery_does_not_stop_others() {
        let hub = Hub::new();
        let broken = BrokenViewer::new();
        let (good, mut rx) = ChannelViewer::channel(4);
        hub.subscribe("f", broken.clone());
        hub.subscribe("f", good);

        let fanout = hub.publish("f", &json!(1)).await;

        assert_eq!(fanout, Fanout { delivered: 1, failed: 1 });
        assert_eq!(rx.recv().await.as_deref(), Some("1"));
        assert_eq!(broken.attempts.load(Ordering::SeqCst), 1);
        // Transport errors are not disconnects; the viewer stays subscribed.
        assert_eq!(hub.subscriber_count("f"), 2);
    }

    #[tokio::test]
    async fn test_disconnected_viewer_is_unsubscribed() {
        let hub = Hub::new();
        let (gone, gone_rx) = ChannelViewer::channel(4);
        let (kept, _kept_rx) = ChannelViewer::channel(4);
        hub.subscribe("f", gone);
        hub.subscribe("f", kept);
        drop(gone_rx);

        let fanout = hub.publish("f", &json!(1)).await;

        assert_eq!(fanout, Fanout { delivered: 1, failed: 1 });
        assert_eq!(hub.subscriber_count("f"), 1);
    }

    #[tokio::test]
    async fn test_lagging_viewer_stays_subscribed() {
        let hub = Hub::new();
        let (viewer, mut rx) = ChannelViewer::channel(1);
        hub.subscribe("f", viewer);

        hub.publish("f", &json!(1)).await;
        let fanout = hub.publish("f", &json!(2)).await;

        assert_eq!(fanout, Fanout { delivered: 0, failed: 1 });
        assert_eq!(hub.subscriber_count("f"), 1);
        assert_eq!(rx.recv().await.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_slow_viewer_does_not_hold_lock_or_others() {
        let hub = Arc::new(Hub::new());
        hub.subscribe("f", Arc::new(SlowViewer { id: next_viewer_id() }));
        let (fast, mut rx) = ChannelViewer::channel(4);
        hub.subscribe("f", fast);

        let publisher = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move { hub.publish("f", &json!("update")).await })
        };

        let received = tokio::time::timeout(Duration::from_millis(250), rx.recv())
            .await
            .expect("fast viewer should not wait for the slow one");
        assert_eq!(received.as_deref(), Some(r#""update""#));

        // Membership changes proceed while the publish is still in flight.
        let (other, _other_rx) = ChannelViewer::channel(1);
        assert!(hub.subscribe("g", other));
        assert!(!publisher.is_finished());

        let fanout = publisher.await.unwrap();
        assert_eq!(fanout, Fanout { delivered: 2, failed: 0 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_membership_changes() {
        let hub = Arc::new(Hub::new());
        let mut handles = Vec::new();

        for i in 0..32 {
            let hub = Arc::clone(&hub);
            handles.push(tokio::spawn(async move {
                let form_id = format!("form-{}", i % 4);
                let (viewer, _rx) = ChannelViewer::channel(1);
                let viewer_id = viewer.id();
                hub.subscribe(&form_id, viewer);
                hub.publish(&form_id, &json!(i)).await;
                hub.unsubscribe(&form_id, viewer_id);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(hub.topic_count(), 0);
    }
}
