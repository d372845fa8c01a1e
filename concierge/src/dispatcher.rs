//! Request dispatcher
//!
//! Drives one request through
//! `Received -> Classified -> Validating -> {Delegated | Clarifying} -> {Completed | Failed}`:
//! - the registry picks a capability (none: `Failed` with `UnroutableRequest`),
//! - fields are extracted, coerced and validated against the capability,
//! - a missing field ends the turn in `Clarifying`,
//! - otherwise the handler runs through the retrying executor.
//!
//! The dispatcher keeps nothing between calls; concurrent dispatches share
//! only the read-only registry.

use std::sync::Arc;

use serde_json::Map;
use tokio_util::sync::CancellationToken;

use crate::error::ErrorKind;
use crate::extract::{build_candidate, FieldExtractor};
use crate::outcome::Outcome;
use crate::registry::{CapabilityRegistry, IntentClassifier};
use crate::request::Request;
use crate::retry::RetryingExecutor;
use crate::validator::validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Received,
    Classified,
    Validating,
    Delegated,
    Clarifying,
    Completed,
    Failed,
}

impl DispatchState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DispatchState::Clarifying | DispatchState::Completed | DispatchState::Failed
        )
    }
}

/// Everything a caller may want to know about one dispatch
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub request_id: String,
    pub outcome: Outcome,
    pub capability: Option<String>,
    pub transitions: Vec<DispatchState>,
    /// Handler attempts; 0 when the handler was never called
    pub attempts: u32,
}

impl DispatchReport {
    pub fn final_state(&self) -> DispatchState {
        self.transitions.last().copied().unwrap_or(DispatchState::Received)
    }

    pub fn reached(&self, state: DispatchState) -> bool {
        self.transitions.contains(&state)
    }
}

/// Transition log for one dispatch
struct Trail {
    request_id: String,
    capability: Option<String>,
    transitions: Vec<DispatchState>,
}

impl Trail {
    fn new(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            capability: None,
            transitions: Vec::new(),
        }
    }

    fn enter(&mut self, state: DispatchState) {
        tracing::debug!(
            request_id = %self.request_id,
            capability = self.capability.as_deref().unwrap_or("-"),
            state = ?state,
            "dispatch transition"
        );
        self.transitions.push(state);
    }

    fn finish(mut self, state: DispatchState, outcome: Outcome, attempts: u32) -> DispatchReport {
        self.enter(state);
        match &outcome {
            Outcome::Failure { kind, message } => tracing::warn!(
                request_id = %self.request_id,
                capability = self.capability.as_deref().unwrap_or("-"),
                kind = %kind,
                attempts,
                "dispatch failed: {}",
                message
            ),
            Outcome::NeedsClarification { missing_fields, .. } => tracing::info!(
                request_id = %self.request_id,
                capability = self.capability.as_deref().unwrap_or("-"),
                missing = ?missing_fields,
                "dispatch needs clarification"
            ),
            Outcome::Success(_) => tracing::info!(
                request_id = %self.request_id,
                capability = self.capability.as_deref().unwrap_or("-"),
                attempts,
                "dispatch completed"
            ),
        }

        DispatchReport {
            request_id: self.request_id,
            outcome,
            capability: self.capability,
            transitions: self.transitions,
            attempts,
        }
    }
}

/// Routes requests to capabilities
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    classifier: Arc<dyn IntentClassifier>,
    extractor: Arc<dyn FieldExtractor>,
    executor: RetryingExecutor,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        classifier: Arc<dyn IntentClassifier>,
        extractor: Arc<dyn FieldExtractor>,
        executor: RetryingExecutor,
    ) -> Self {
        Self {
            registry,
            classifier,
            extractor,
            executor,
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn executor(&self) -> &RetryingExecutor {
        &self.executor
    }

    pub async fn dispatch(&self, request: &Request, cancel: &CancellationToken) -> DispatchReport {
        let mut trail = Trail::new(request.id());
        trail.enter(DispatchState::Received);
        tracing::info!(request_id = %request.id(), text_len = request.text().len(), hints = request.hints().len(), "dispatching request");

        // RECEIVED -> CLASSIFIED
        let resolved = self
            .executor
            .execute("classify", || self.registry.resolve(request, self.classifier.as_ref()), cancel)
            .await;
        let descriptor = match resolved {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => {
                let outcome = Outcome::failure(ErrorKind::UnroutableRequest, "no capability matched the request");
                return trail.finish(DispatchState::Failed, outcome, 0);
            }
            Err(err) => return trail.finish(DispatchState::Failed, err.into(), 0),
        };
        trail.capability = Some(descriptor.name.clone());
        trail.enter(DispatchState::Classified);

        // CLASSIFIED -> VALIDATING
        trail.enter(DispatchState::Validating);
        let raw = match self
            .executor
            .execute("extract", || self.extractor.extract(request, &descriptor), cancel)
            .await
        {
            Ok(raw) => raw,
            Err(err) => return trail.finish(DispatchState::Failed, err.into(), 0),
        };
        let candidate = build_candidate(&descriptor.required, &raw, request.hints());
        let extraction = validate(&descriptor.required_names(), &candidate);

        // VALIDATING -> CLARIFYING
        if !extraction.is_complete() {
            let outcome = Outcome::clarification(extraction.missing);
            return trail.finish(DispatchState::Clarifying, outcome, 0);
        }

        // VALIDATING -> DELEGATED
        trail.enter(DispatchState::Delegated);
        let fields: Map<_, _> = extraction.into_fields();
        let handler = Arc::clone(&descriptor.handler);
        let label = format!("handler:{}", descriptor.name);
        let execution = self
            .executor
            .execute_traced(&label, || handler.handle(&fields), cancel)
            .await;

        match execution.result {
            Ok(payload) => trail.finish(DispatchState::Completed, Outcome::Success(payload), execution.attempts),
            Err(err) => trail.finish(DispatchState::Failed, err.into(), execution.attempts),
        }
    }
}
