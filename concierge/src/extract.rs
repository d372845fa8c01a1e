//! Field extraction
//!
//! Turns a request into the candidate map the validator checks:
//! - an extractor pulls raw values out of the free text,
//! - structured hints are laid over the raw values,
//! - every value is coerced to its field kind; values that do not fit are
//!   dropped and therefore reported as missing.

use async_trait::async_trait;
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::UpstreamError;
use crate::registry::CapabilityDescriptor;
use crate::request::Request;
use crate::validator::is_present;

const DATE_FORMAT: &str = "%Y-%m-%d";

lazy_static! {
    static ref ASSIGNMENT: Regex =
        Regex::new(r#"(?i)\b([a-z_]+)\s*[:=]\s*(?:"([^"]*)"|([^\s,;"]+))"#).expect("assignment pattern");
    static ref ISO_DATE: Regex = Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("date pattern");
    static ref HEADCOUNT: Regex =
        Regex::new(r"(?i)\b(\d{1,2})\s*(?:adults?|people|persons|guests|travell?ers)\b").expect("headcount pattern");
    static ref ROUTE: Regex = Regex::new(r"\bfrom\s+([A-Z]{3})\s+to\s+([A-Z]{3})\b").expect("route pattern");
    static ref PLACE: Regex =
        Regex::new(r"\b(?:in|at|near)\s+([A-Z][\w'-]*(?:\s+[A-Z][\w'-]*)*)").expect("place pattern");
}

/// Shape a required field's value must have
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// `YYYY-MM-DD`
    Date,
    /// Positive integer, normalized to its decimal string
    PositiveInt,
    /// Three-letter IATA code, upper-cased
    AirportCode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Date)
    }

    pub fn positive_int(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::PositiveInt)
    }

    pub fn airport(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::AirportCode)
    }
}

/// Normalize one value to `kind`, or `None` if it does not fit
pub fn coerce(kind: FieldKind, value: &Value) -> Option<Value> {
    match kind {
        FieldKind::Text => match value {
            Value::String(s) if !s.trim().is_empty() => Some(Value::String(s.trim().to_string())),
            Value::Number(n) => Some(Value::String(n.to_string())),
            _ => None,
        },
        FieldKind::Date => {
            let raw = value.as_str()?.trim();
            let date = NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()?;
            Some(Value::String(date.format(DATE_FORMAT).to_string()))
        }
        FieldKind::PositiveInt => {
            let n = match value {
                Value::Number(n) => match n.as_u64() {
                    Some(n) => n,
                    // Whole floats such as `2.0`
                    None => {
                        let f = n.as_f64()?;
                        if f.fract() != 0.0 || f < 0.0 || f > u32::MAX as f64 {
                            return None;
                        }
                        f as u64
                    }
                },
                Value::String(s) => s.trim().parse::<u64>().ok()?,
                _ => return None,
            };
            (n > 0).then(|| Value::String(n.to_string()))
        }
        FieldKind::AirportCode => {
            let code = value.as_str()?.trim();
            (code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()))
                .then(|| Value::String(code.to_ascii_uppercase()))
        }
    }
}

/// Lay `hints` over `raw` and coerce every declared field.
/// Only declared fields survive; a hint wins over text only when it is present.
pub fn build_candidate(specs: &[FieldSpec], raw: &Map<String, Value>, hints: &Map<String, Value>) -> Map<String, Value> {
    let mut candidate = Map::new();

    for spec in specs {
        let value = hints
            .get(&spec.name)
            .filter(|v| is_present(v))
            .or_else(|| raw.get(&spec.name));

        let Some(value) = value else { continue };
        match coerce(spec.kind, value) {
            Some(coerced) => {
                candidate.insert(spec.name.clone(), coerced);
            }
            None => {
                tracing::debug!(field = %spec.name, value = %value, "dropping value that does not fit its field kind");
            }
        }
    }

    candidate
}

/// Pulls raw field values out of a request's text
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(
        &self,
        request: &Request,
        capability: &CapabilityDescriptor,
    ) -> Result<Map<String, Value>, UpstreamError>;
}

/// Offline extractor driven by a handful of text patterns
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternExtractor;

impl PatternExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract values for `specs` from free text
    pub fn extract_from_text(&self, text: &str, specs: &[FieldSpec]) -> Map<String, Value> {
        let mut out = Map::new();
        let wants = |name: &str, out: &Map<String, Value>| {
            specs.iter().any(|s| s.name == name) && !out.contains_key(name)
        };

        // Explicit `field=value` / `field: value`
        for caps in ASSIGNMENT.captures_iter(text) {
            let name = caps[1].to_ascii_lowercase();
            let value = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str().to_string());
            if let Some(value) = value {
                if wants(&name, &out) {
                    out.insert(name, Value::String(value));
                }
            }
        }

        // Dates, in order of appearance, to the date fields in declared order
        let used: Vec<String> = out.values().filter_map(|v| v.as_str().map(str::to_string)).collect();
        let mut dates = ISO_DATE
            .captures_iter(text)
            .map(|c| c[1].to_string())
            .filter(|d| !used.contains(d));
        for spec in specs.iter().filter(|s| s.kind == FieldKind::Date) {
            if out.contains_key(&spec.name) {
                continue;
            }
            match dates.next() {
                Some(date) => {
                    out.insert(spec.name.clone(), Value::String(date));
                }
                None => break,
            }
        }

        if let Some(caps) = HEADCOUNT.captures(text) {
            if let Some(spec) = specs
                .iter()
                .find(|s| s.kind == FieldKind::PositiveInt && !out.contains_key(&s.name))
            {
                out.insert(spec.name.clone(), Value::String(caps[1].to_string()));
            }
        }

        if let Some(caps) = ROUTE.captures(text) {
            let mut codes = [caps[1].to_string(), caps[2].to_string()].into_iter();
            for spec in specs.iter().filter(|s| s.kind == FieldKind::AirportCode) {
                if out.contains_key(&spec.name) {
                    continue;
                }
                match codes.next() {
                    Some(code) => {
                        out.insert(spec.name.clone(), Value::String(code));
                    }
                    None => break,
                }
            }
        }

        if let Some(caps) = PLACE.captures(text) {
            if let Some(spec) = specs
                .iter()
                .find(|s| s.kind == FieldKind::Text && !out.contains_key(&s.name))
            {
                out.insert(spec.name.clone(), Value::String(caps[1].to_string()));
            }
        }

        out
    }
}

#[async_trait]
impl FieldExtractor for PatternExtractor {
    async fn extract(
        &self,
        request: &Request,
        capability: &CapabilityDescriptor,
    ) -> Result<Map<String, Value>, UpstreamError> {
        Ok(self.extract_from_text(request.text(), &capability.required))
    }
}
