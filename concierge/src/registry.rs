/// Capability registry
/// Built once at startup through `RegistryBuilder`, then frozen and shared
/// read-only (behind an `Arc`) by every dispatch.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{RegistryError, UpstreamError};
use crate::extract::FieldSpec;
use crate::request::Request;

/// What a capability's handler returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    HotelList,
    FlightList,
    Text,
}

/// Executes a capability once all of its required fields are present
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// Stable identity of the handler; one handler serves one capability
    fn id(&self) -> &str;

    async fn handle(&self, fields: &Map<String, Value>) -> Result<Value, UpstreamError>;
}

/// Static metadata for one capability
#[derive(Clone)]
pub struct CapabilityDescriptor {
    pub name: String,
    /// Lower wins when two capabilities score the same
    pub priority: u32,
    pub description: String,
    pub keywords: Vec<String>,
    pub required: Vec<FieldSpec>,
    pub output: OutputShape,
    pub handler: Arc<dyn CapabilityHandler>,
}

impl CapabilityDescriptor {
    pub fn required_names(&self) -> Vec<&str> {
        self.required.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn summary(&self) -> CapabilitySummary {
        CapabilitySummary {
            name: self.name.clone(),
            description: self.description.clone(),
            keywords: self.keywords.clone(),
            required: self.required.iter().map(|f| f.name.clone()).collect(),
        }
    }
}

impl fmt::Debug for CapabilityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("required", &self.required)
            .field("output", &self.output)
            .field("handler", &self.handler.id())
            .finish()
    }
}

/// What a classifier gets to see about a capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilitySummary {
    pub name: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub required: Vec<String>,
}

/// How plausible a capability is for a request
#[derive(Debug, Clone, PartialEq)]
pub struct IntentScore {
    pub capability: String,
    pub score: f64,
}

impl IntentScore {
    pub fn new(capability: impl Into<String>, score: f64) -> Self {
        Self {
            capability: capability.into(),
            score,
        }
    }
}

/// Scores a request against the registered capabilities
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(
        &self,
        request: &Request,
        capabilities: &[CapabilitySummary],
    ) -> Result<Vec<IntentScore>, UpstreamError>;
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    descriptors: Vec<Arc<CapabilityDescriptor>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capability. Rejects duplicate names, a handler already bound
    /// to another capability, and malformed field lists.
    pub fn register(&mut self, descriptor: CapabilityDescriptor) -> Result<&mut Self, RegistryError> {
        if self.descriptors.iter().any(|d| d.name == descriptor.name) {
            return Err(RegistryError::DuplicateCapability(descriptor.name));
        }

        if let Some(existing) = self
            .descriptors
            .iter()
            .find(|d| d.handler.id() == descriptor.handler.id())
        {
            return Err(RegistryError::OverlappingHandler {
                handler: descriptor.handler.id().to_string(),
                existing: existing.name.clone(),
                duplicate: descriptor.name,
            });
        }

        if descriptor.required.is_empty() {
            return Err(RegistryError::EmptyRequiredFields(descriptor.name));
        }

        for (i, field) in descriptor.required.iter().enumerate() {
            if descriptor.required[..i].iter().any(|f| f.name == field.name) {
                return Err(RegistryError::DuplicateField {
                    capability: descriptor.name.clone(),
                    field: field.name.clone(),
                });
            }
        }

        tracing::debug!(
            capability = %descriptor.name,
            handler = %descriptor.handler.id(),
            priority = descriptor.priority,
            "registered capability"
        );
        self.descriptors.push(Arc::new(descriptor));
        Ok(self)
    }

    pub fn build(self) -> CapabilityRegistry {
        let mut ordered = self.descriptors;
        ordered.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));

        let by_name = ordered
            .iter()
            .map(|d| (d.name.clone(), Arc::clone(d)))
            .collect();

        CapabilityRegistry { ordered, by_name }
    }
}

/// Immutable set of capabilities, ordered by (priority, name)
#[derive(Debug)]
pub struct CapabilityRegistry {
    ordered: Vec<Arc<CapabilityDescriptor>>,
    by_name: HashMap<String, Arc<CapabilityDescriptor>>,
}

impl CapabilityRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CapabilityDescriptor>> {
        self.by_name.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Descriptors in tie-break order
    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<CapabilityDescriptor>> {
        self.ordered.iter()
    }

    pub fn summaries(&self) -> Vec<CapabilitySummary> {
        self.ordered.iter().map(|d| d.summary()).collect()
    }

    /// Pick exactly one capability for `request`, or none.
    pub async fn resolve(
        &self,
        request: &Request,
        classifier: &dyn IntentClassifier,
    ) -> Result<Option<Arc<CapabilityDescriptor>>, UpstreamError> {
        let scores = classifier.classify(request, &self.summaries()).await?;
        Ok(self.pick(&scores))
    }

    /// Highest positive score wins; ties go to the lower priority value,
    /// then to the lexicographically smaller name.
    pub fn pick(&self, scores: &[IntentScore]) -> Option<Arc<CapabilityDescriptor>> {
        let mut best: Option<(f64, &Arc<CapabilityDescriptor>)> = None;

        // `ordered` is already in tie-break order, so only a strictly
        // higher score may replace the current best.
        for descriptor in &self.ordered {
            let score = scores
                .iter()
                .filter(|s| s.capability == descriptor.name && s.score.is_finite())
                .map(|s| s.score)
                .fold(f64::NEG_INFINITY, f64::max);
            if score <= 0.0 {
                continue;
            }
            match best {
                Some((top, _)) if score <= top => {}
                _ => best = Some((score, descriptor)),
            }
        }

        best.map(|(_, d)| Arc::clone(d))
    }
}

/// Offline classifier: keyword hits in the text, plus a strong bonus for
/// every required field the caller already supplied as a hint.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

const HINT_FIELD_WEIGHT: f64 = 2.0;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, request: &Request, capability: &CapabilitySummary) -> f64 {
        let text = request.text().to_lowercase();
        let words: Vec<&str> = text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|w| !w.is_empty())
            .collect();

        let keyword_hits = capability
            .keywords
            .iter()
            .filter(|k| words.iter().any(|w| w == &k.as_str()))
            .count();

        let hinted = capability
            .required
            .iter()
            .filter(|f| request.hints().get(f.as_str()).is_some_and(crate::validator::is_present))
            .count();

        keyword_hits as f64 + HINT_FIELD_WEIGHT * hinted as f64
    }
}

#[async_trait]
impl IntentClassifier for KeywordClassifier {
    async fn classify(
        &self,
        request: &Request,
        capabilities: &[CapabilitySummary],
    ) -> Result<Vec<IntentScore>, UpstreamError> {
        Ok(capabilities
            .iter()
            .map(|c| IntentScore::new(c.name.clone(), self.score(request, c)))
            .collect())
    }
}
