//! Submission and analytics pipeline.
//!
//! A submission is persisted, the form's full response set is aggregated,
//! and the fresh report is published to the form's live viewers. Direct
//! analytics reads only aggregate and return the report to the caller.

pub mod sequencer;

pub use sequencer::FormSequencer;

use crate::analysis;
use crate::error::{DataAccessError, PipelineError};
use crate::models::{AggregateReport, Answers, Form, NewResponse, Response};
use crate::realtime::{Fanout, Hub, Viewer, ViewerId};
use crate::store::ResponseStore;
use crate::validate;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pipeline behaviour switches.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Run submissions to the same form one at a time.
    pub serialize_per_form: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            serialize_per_form: true,
        }
    }
}

impl From<&crate::config::PipelineSettings> for PipelineConfig {
    fn from(settings: &crate::config::PipelineSettings) -> Self {
        Self {
            serialize_per_form: settings.serialize_per_form,
        }
    }
}

/// Result of an accepted submission.
#[derive(Debug)]
pub struct Submission {
    /// The persisted response.
    pub response: Response,
    /// The recomputed report, or why it could not be computed.
    ///
    /// A failure here does not undo the submission; nothing was published.
    pub report: Result<AggregateReport, DataAccessError>,
    /// Delivery tally of the live update.
    pub fanout: Fanout,
}

/// Coordinates the store, the aggregator and the hub.
pub struct Pipeline {
    store: Arc<dyn ResponseStore>,
    hub: Arc<Hub>,
    sequencer: Option<FormSequencer>,
}

impl Pipeline {
    pub fn new(store: Arc<dyn ResponseStore>, hub: Arc<Hub>, config: PipelineConfig) -> Self {
        info!(
            "Pipeline ready (per-form serialization: {})",
            config.serialize_per_form
        );
        Self {
            store,
            hub,
            sequencer: config.serialize_per_form.then(FormSequencer::new),
        }
    }

    #[allow(dead_code)] // Accessor for transports sharing the hub
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Validate raw answers for a form and run the submission pipeline.
    pub async fn submit(
        &self,
        form_id: &str,
        raw: &Map<String, Value>,
    ) -> Result<Submission, PipelineError> {
        let form = self.find_form(form_id).await?;
        let answers = validate::check(&form, raw).map_err(|rejection| {
            debug!("Submission to form {} rejected: {}", form_id, rejection);
            PipelineError::Rejected(rejection)
        })?;

        self.submit_validated(&form, answers).await
    }

    /// Persist already-validated answers, recompute and publish.
    pub async fn submit_validated(
        &self,
        form: &Form,
        answers: Answers,
    ) -> Result<Submission, PipelineError> {
        let _lane = match &self.sequencer {
            Some(sequencer) => Some(sequencer.acquire(&form.id).await),
            None => None,
        };

        let response = self
            .store
            .insert_response(NewResponse::now(form.id.clone(), answers))
            .await
            .map_err(|e| {
                warn!("Submission to form {} not persisted: {}", form.id, e);
                e
            })?;
        debug!("Persisted response {} for form {}", response.id, form.id);

        let report = match self.recompute(form).await {
            Ok(report) => report,
            Err(e) => {
                warn!(
                    "Response {} stored but analytics for form {} unavailable: {}",
                    response.id, form.id, e
                );
                return Ok(Submission {
                    response,
                    report: Err(e),
                    fanout: Fanout::default(),
                });
            }
        };

        let fanout = self.hub.publish(&form.id, &report).await;
        info!(
            "Form {} now has {} responses ({} live viewers updated)",
            form.id, report.total_responses, fanout.delivered
        );

        Ok(Submission {
            response,
            report: Ok(report),
            fanout,
        })
    }

    /// Recompute a form's analytics for a single caller. Nothing is published.
    pub async fn analytics(&self, form_id: &str) -> Result<AggregateReport, PipelineError> {
        let form = self.find_form(form_id).await?;
        Ok(self.recompute(&form).await?)
    }

    /// Start sending a form's live updates to a viewer.
    pub fn subscribe(&self, form_id: &str, viewer: Arc<dyn Viewer>) -> bool {
        self.hub.subscribe(form_id, viewer)
    }

    /// Stop sending a form's live updates to a viewer.
    pub fn unsubscribe(&self, form_id: &str, viewer_id: ViewerId) -> bool {
        self.hub.unsubscribe(form_id, viewer_id)
    }

    async fn find_form(&self, form_id: &str) -> Result<Form, PipelineError> {
        self.store
            .find_form(form_id)
            .await?
            .ok_or_else(|| PipelineError::FormNotFound(form_id.to_string()))
    }

    async fn recompute(&self, form: &Form) -> Result<AggregateReport, DataAccessError> {
        let responses = self.store.find_responses(&form.id).await?;
        Ok(analysis::compute(form, &responses))
    }
}
