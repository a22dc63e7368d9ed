//! Per-form sequencing of submissions.
//!
//! Submissions to the same form run their persist, aggregate and publish
//! steps one at a time. Different forms never wait on each other.

use crate::models::FormId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Lane = Arc<AsyncMutex<()>>;

/// One exclusive lane per form id, created on demand.
#[derive(Debug, Default)]
pub struct FormSequencer {
    lanes: Mutex<HashMap<FormId, Lane>>,
}

impl FormSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lanes(&self) -> MutexGuard<'_, HashMap<FormId, Lane>> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for exclusive use of a form's lane.
    pub async fn acquire(&self, form_id: &str) -> SequenceGuard<'_> {
        let lane = Arc::clone(self.lanes().entry(form_id.to_string()).or_default());
        let guard = Arc::clone(&lane).lock_owned().await;

        SequenceGuard {
            sequencer: self,
            form_id: form_id.to_string(),
            lane,
            guard: Some(guard),
        }
    }

    /// Number of forms with a live lane.
    #[allow(dead_code)] // Introspection for tests
    pub fn lane_count(&self) -> usize {
        self.lanes().len()
    }
}

/// Exclusive hold on a form's lane; released on drop.
#[derive(Debug)]
pub struct SequenceGuard<'a> {
    sequencer: &'a FormSequencer,
    form_id: FormId,
    lane: Lane,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SequenceGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Only the map and this guard still reference the lane: nobody waits.
        let mut lanes = self.sequencer.lanes();
        if Arc::strong_count(&self.lane) == 2 {
            lanes.remove(&self.form_id);
        }
    }
}
