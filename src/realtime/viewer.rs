//! Live viewer endpoints.
//!
//! A viewer is the transport-owned end of a live analytics connection. The
//! hub only tracks its membership and hands it serialized updates.

use crate::error::DeliveryError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Process-unique identity of a viewer.
pub type ViewerId = u64;

static NEXT_VIEWER_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh viewer id.
pub fn next_viewer_id() -> ViewerId {
    NEXT_VIEWER_ID.fetch_add(1, Ordering::Relaxed)
}

/// A connected client that receives analytics updates.
#[async_trait]
pub trait Viewer: Send + Sync {
    /// Stable identity used for topic membership.
    fn id(&self) -> ViewerId;

    /// Deliver one serialized update.
    ///
    /// Implementations must not wait for acknowledgement from the peer.
    async fn send(&self, payload: Arc<str>) -> Result<(), DeliveryError>;
}

/// Viewer backed by a bounded in-process queue.
///
/// A full queue drops the update instead of waiting, so a stalled reader
/// never holds up a publish.
#[derive(Debug)]
pub struct ChannelViewer {
    id: ViewerId,
    tx: mpsc::Sender<Arc<str>>,
}

impl ChannelViewer {
    /// Create a viewer and the receiving end its transport reads from.
    pub fn channel(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let viewer = Arc::new(Self {
            id: next_viewer_id(),
            tx,
        });
        (viewer, rx)
    }
}

#[async_trait]
impl Viewer for ChannelViewer {
    fn id(&self) -> ViewerId {
        self.id
    }

    async fn send(&self, payload: Arc<str>) -> Result<(), DeliveryError> {
        self.tx.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Lagging,
            TrySendError::Closed(_) => DeliveryError::Disconnected,
        })
    }
}
