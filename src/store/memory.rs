//! In-process response store.

use super::ResponseStore;
use crate::error::{DataAccessError, PersistenceError};
use crate::models::{Form, FormId, NewResponse, Response, ResponseId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Forms and responses held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    forms: RwLock<HashMap<FormId, Form>>,
    responses: RwLock<HashMap<FormId, Vec<Response>>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a form. Returns the previous schema, if any.
    pub async fn insert_form(&self, form: Form) -> Option<Form> {
        debug!("Storing form {} ({} fields)", form.id, form.fields.len());
        self.forms.write().await.insert(form.id.clone(), form)
    }

    /// Load already-persisted responses, keeping their ids and order.
    ///
    /// Fresh ids handed out afterwards never collide with seeded numeric ones.
    pub async fn seed_responses(&self, seeded: Vec<Response>) -> usize {
        let count = seeded.len();
        let mut responses = self.responses.write().await;

        for response in seeded {
            if let ResponseId::Assigned(id) = &response.id {
                self.next_id.fetch_max(id.saturating_add(1), Ordering::SeqCst);
            }
            responses
                .entry(response.form_id.clone())
                .or_default()
                .push(response);
        }

        count
    }

    /// Number of stored responses for a form.
    pub async fn response_count(&self, form_id: &str) -> usize {
        self.responses
            .read()
            .await
            .get(form_id)
            .map(|r| r.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ResponseStore for MemoryStore {
    async fn find_form(&self, form_id: &str) -> Result<Option<Form>, DataAccessError> {
        Ok(self.forms.read().await.get(form_id).cloned())
    }

    async fn find_responses(&self, form_id: &str) -> Result<Vec<Response>, DataAccessError> {
        Ok(self
            .responses
            .read()
            .await
            .get(form_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_response(&self, response: NewResponse) -> Result<Response, PersistenceError> {
        if !self.forms.read().await.contains_key(&response.form_id) {
            return Err(PersistenceError(format!(
                "unknown form {}",
                response.form_id
            )));
        }

        let stored = Response {
            id: ResponseId::Assigned(self.next_id.fetch_add(1, Ordering::SeqCst)),
            form_id: response.form_id,
            answers: response.answers,
            created_at: response.created_at,
        };

        self.responses
            .write()
            .await
            .entry(stored.form_id.clone())
            .or_default()
            .push(stored.clone());

        debug!("Stored response {} for form {}", stored.id, stored.form_id);
        Ok(stored)
    }
}
