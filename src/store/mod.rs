//! Response storage port.
//!
//! The pipeline reads forms and responses and inserts new responses through
//! [`ResponseStore`]. Durable backends live outside this crate; the bundled
//! [`MemoryStore`] keeps everything in process.

pub mod memory;

pub use memory::MemoryStore;

use crate::error::{DataAccessError, PersistenceError};
use crate::models::{Form, NewResponse, Response};
use async_trait::async_trait;

/// Storage for forms and their responses.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    /// Find a form schema by id.
    async fn find_form(&self, form_id: &str) -> Result<Option<Form>, DataAccessError>;

    /// All responses of a form, in storage read order.
    async fn find_responses(&self, form_id: &str) -> Result<Vec<Response>, DataAccessError>;

    /// Durably store a response and return it with its assigned id.
    async fn insert_response(&self, response: NewResponse) -> Result<Response, PersistenceError>;
}
