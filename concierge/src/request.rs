/// Inbound request as seen by the dispatcher

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use travel_protocol::ProcessRequest;

/// Free text plus optional structured hints. Immutable once built.
#[derive(Debug, Clone)]
pub struct Request {
    id: String,
    text: String,
    hints: Map<String, Value>,
    received_at: DateTime<Utc>,
}

impl Request {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            hints: Map::new(),
            received_at: Utc::now(),
        }
    }

    pub fn with_hints(mut self, hints: Map<String, Value>) -> Self {
        self.hints = hints;
        self
    }

    /// Request id used to correlate log lines
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn hints(&self) -> &Map<String, Value> {
        &self.hints
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

impl From<ProcessRequest> for Request {
    fn from(body: ProcessRequest) -> Self {
        Request::new(body.question).with_hints(body.hints)
    }
}
