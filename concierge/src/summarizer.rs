/// Short natural-language answers for successful searches
/// Applied at the caller boundary only; a summary is added next to `data`,
/// never in place of it, and a failing summarizer never changes the outcome.

use async_trait::async_trait;
use serde_json::Value;
use travel_protocol::{FlightRecord, HotelRecord};

use crate::error::UpstreamError;
use crate::llm::LlmClient;
use crate::registry::OutputShape;

/// How many records a template answer names
const TOP_N: usize = 3;

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, shape: OutputShape, data: &Value) -> Result<String, UpstreamError>;
}

/// Offline summaries from fixed templates
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateSummarizer;

impl TemplateSummarizer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, shape: OutputShape, data: &Value) -> String {
        match shape {
            OutputShape::HotelList => {
                let hotels: Vec<HotelRecord> = serde_json::from_value(data.clone()).unwrap_or_default();
                render_hotels(&hotels)
            }
            OutputShape::FlightList => {
                let flights: Vec<FlightRecord> = serde_json::from_value(data.clone()).unwrap_or_default();
                render_flights(&flights)
            }
            OutputShape::Text => data.as_str().map(str::to_string).unwrap_or_else(|| data.to_string()),
        }
    }
}

fn render_hotels(hotels: &[HotelRecord]) -> String {
    if hotels.is_empty() {
        return "I could not find any hotels for those dates.".to_string();
    }

    let picks: Vec<String> = hotels
        .iter()
        .take(TOP_N)
        .map(|h| {
            let mut details = Vec::new();
            if let Some(rating) = h.rating {
                details.push(format!("rated {:.1}", rating));
            }
            if let Some(price) = &h.price {
                details.push(price.clone());
            }
            if details.is_empty() {
                h.name.clone()
            } else {
                format!("{} ({})", h.name, details.join(", "))
            }
        })
        .collect();

    format!(
        "Found {} hotel{}. Top picks: {}.",
        hotels.len(),
        if hotels.len() == 1 { "" } else { "s" },
        picks.join("; ")
    )
}

fn render_flights(flights: &[FlightRecord]) -> String {
    if flights.is_empty() {
        return "I could not find any flights for that route and dates.".to_string();
    }

    let legs: Vec<String> = flights
        .iter()
        .take(TOP_N)
        .map(|f| {
            let carrier = f.airline.as_deref().unwrap_or("Unknown airline");
            let mut line = carrier.to_string();
            if let Some(airplane) = &f.airplane {
                line.push_str(&format!(" on a {}", airplane));
            }
            if let Some(minutes) = f.duration {
                line.push_str(&format!(", {}h{:02}m", minutes / 60, minutes % 60));
            }
            if let Some(class) = &f.travel_class {
                line.push_str(&format!(", {}", class));
            }
            line
        })
        .collect();

    format!(
        "Found {} flight segment{}: {}.",
        flights.len(),
        if flights.len() == 1 { "" } else { "s" },
        legs.join("; ")
    )
}

#[async_trait]
impl Summarizer for TemplateSummarizer {
    async fn summarize(&self, shape: OutputShape, data: &Value) -> Result<String, UpstreamError> {
        Ok(self.render(shape, data))
    }
}

const SUMMARY_PROMPT: &str = "You summarize travel search results for a traveller. \
Answer in at most three sentences, mention the best options by name, never invent options.";

/// Summaries written by the language model
#[derive(Debug, Clone)]
pub struct LlmSummarizer {
    client: LlmClient,
}

impl LlmSummarizer {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, shape: OutputShape, data: &Value) -> Result<String, UpstreamError> {
        let kind = match shape {
            OutputShape::HotelList => "hotels",
            OutputShape::FlightList => "flight segments",
            OutputShape::Text => "text",
        };
        let prompt = format!("Results ({}):\n{}", kind, data);
        let answer = self.client.chat(SUMMARY_PROMPT, &prompt).await?;
        Ok(answer.trim().to_string())
    }
}
