/// Dispatch outcome: exactly one of success, clarification or failure

use serde_json::Value;

use crate::error::{ErrorKind, UpstreamError};

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Handler payload, untouched
    Success(Value),
    /// Not an error: the caller should re-submit with these fields filled in
    NeedsClarification {
        message: String,
        missing_fields: Vec<String>,
    },
    /// `message` is the internal detail; callers only ever see the kind's public message
    Failure { kind: ErrorKind, message: String },
}

impl Outcome {
    /// Clarification naming the missing fields in the order given
    pub fn clarification(missing_fields: Vec<String>) -> Self {
        let message = format!(
            "Can you please share the following information: {}",
            missing_fields.join(", ")
        );
        Outcome::NeedsClarification {
            message,
            missing_fields,
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Outcome::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Outcome::Failure { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<UpstreamError> for Outcome {
    fn from(err: UpstreamError) -> Self {
        Outcome::failure(err.kind, err.message)
    }
}
