/// OpenAI-compatible language model client and the prompt wrappers built on it
/// Chat replies are expected to carry one JSON object; anything around it is ignored.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use travel_protocol::TripPlanResponse;

use crate::error::{ErrorKind, UpstreamError};
use crate::extract::FieldExtractor;
use crate::registry::{CapabilityDescriptor, CapabilitySummary, IntentClassifier, IntentScore};
use crate::request::Request;

const SERVICE: &str = "openai";
const TRANSCRIBE_MODEL: &str = "whisper-1";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Client for `/chat/completions` and `/audio/transcriptions`
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl LlmClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 500,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One system + user exchange, returning the reply text
    pub async fn chat(&self, system: &str, user: &str) -> Result<String, UpstreamError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body = %body, "chat completion rejected");
            return Err(UpstreamError::from_status(SERVICE, status, &body));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| UpstreamError::new(ErrorKind::UpstreamUnknown, "chat completion had no content"))
    }

    /// Speech to text
    pub async fn transcribe(&self, audio: Vec<u8>) -> Result<String, UpstreamError> {
        let part = Part::bytes(audio)
            .file_name("audio.webm")
            .mime_str("application/octet-stream")
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;
        let form = Form::new().text("model", TRANSCRIBE_MODEL).part("file", part);

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body = %body, "transcription rejected");
            return Err(UpstreamError::from_status(SERVICE, status, &body));
        }

        let transcript: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;
        Ok(transcript.text)
    }
}

/// First `{ ... }` object in a model reply
pub fn parse_json_object(reply: &str) -> Option<Map<String, Value>> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str::<Value>(&reply[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// A reply without a usable object is treated like a bad upstream body
fn require_json_object(reply: &str) -> Result<Map<String, Value>, UpstreamError> {
    parse_json_object(reply).ok_or_else(|| {
        tracing::debug!(reply = %reply, "model reply carried no JSON object");
        UpstreamError::new(ErrorKind::UpstreamUnknown, "model reply carried no JSON object")
    })
}

const CLASSIFY_PROMPT: &str = "You route travel requests to capabilities. \
Score how well the request matches each capability between 0 and 1. \
Reply with JSON only: {\"scores\": {\"<capability>\": <score>}}.";

/// Intent classifier asking the model for per-capability scores
#[derive(Debug, Clone)]
pub struct LlmClassifier {
    client: LlmClient,
}

impl LlmClassifier {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IntentClassifier for LlmClassifier {
    async fn classify(
        &self,
        request: &Request,
        capabilities: &[CapabilitySummary],
    ) -> Result<Vec<IntentScore>, UpstreamError> {
        let prompt = json!({
            "capabilities": capabilities,
            "request": request.text(),
            "hints": request.hints(),
        })
        .to_string();

        let reply = self.client.chat(CLASSIFY_PROMPT, &prompt).await?;
        let parsed = require_json_object(&reply)?;

        let known: HashSet<&str> = capabilities.iter().map(|c| c.name.as_str()).collect();
        let scores = parsed
            .get("scores")
            .and_then(Value::as_object)
            .map(|scores| {
                scores
                    .iter()
                    .filter(|(name, _)| known.contains(name.as_str()))
                    .filter_map(|(name, score)| score.as_f64().map(|s| IntentScore::new(name.clone(), s)))
                    .collect()
            })
            .unwrap_or_default();

        tracing::debug!(request_id = %request.id(), scores = ?scores, "model intent scores");
        Ok(scores)
    }
}

const EXTRACT_PROMPT: &str = "You extract structured fields from travel requests. \
Dates use YYYY-MM-DD, airports use three-letter IATA codes, counts are integers. \
Reply with JSON only, one key per requested field; use null for anything the request does not state.";

/// Field extractor asking the model to fill the capability's fields
#[derive(Debug, Clone)]
pub struct LlmExtractor {
    client: LlmClient,
}

impl LlmExtractor {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FieldExtractor for LlmExtractor {
    async fn extract(
        &self,
        request: &Request,
        capability: &CapabilityDescriptor,
    ) -> Result<Map<String, Value>, UpstreamError> {
        let prompt = json!({
            "fields": capability.required_names(),
            "request": request.text(),
            "today": request.received_at().date_naive().to_string(),
        })
        .to_string();

        let reply = self.client.chat(EXTRACT_PROMPT, &prompt).await?;
        let parsed = require_json_object(&reply)?;

        // Never trust the model to stay inside the requested field set
        let wanted = capability.required_names();
        Ok(parsed
            .into_iter()
            .filter(|(name, value)| wanted.contains(&name.as_str()) && !value.is_null())
            .collect())
    }
}

const TRIP_PROMPT: &str = "You are a helpful travel planning assistant. \
Extract itinerary, budget and group info from the conversation. \
Reply with JSON: {\"itinerary\": string, \"budget_per_person\": number or null, \"suggestions\": string or null}.";

/// Free-form trip planning from a conversation transcript
#[derive(Debug, Clone)]
pub struct TripPlanner {
    client: LlmClient,
}

impl TripPlanner {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }

    pub async fn plan(&self, conversation: &str) -> Result<TripPlanResponse, UpstreamError> {
        let reply = self.client.chat(TRIP_PROMPT, conversation).await?;
        Ok(plan_from_reply(reply))
    }
}

/// Structured plan when the model followed the format, otherwise the raw reply as itinerary
fn plan_from_reply(reply: String) -> TripPlanResponse {
    if let Some(parsed) = parse_json_object(&reply) {
        if let Some(itinerary) = parsed.get("itinerary").and_then(Value::as_str) {
            return TripPlanResponse {
                itinerary: itinerary.to_string(),
                budget_per_person: parsed.get("budget_per_person").and_then(Value::as_f64),
                suggestions: parsed.get("suggestions").and_then(Value::as_str).map(str::to_string),
            };
        }
    }

    TripPlanResponse {
        itinerary: reply,
        budget_per_person: None,
        suggestions: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::hotel_descriptor;
    use crate::search::{HotelSearch, SerpClient};
    use std::sync::Arc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> LlmClient {
        LlmClient::new(server.uri(), "sk-test", "gpt-4o", Duration::from_secs(5)).unwrap()
    }

    fn completion(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    }

    #[test]
    fn test_parse_json_object_ignores_prose() {
        let reply = "Sure! Here you go:\n```json\n{\"scores\": {\"hotel\": 0.9}}\n```";
        let parsed = parse_json_object(reply).unwrap();
        assert_eq!(parsed["scores"]["hotel"], 0.9);

        assert!(parse_json_object("no json here").is_none());
        assert!(parse_json_object("} backwards {").is_none());
    }

    #[test]
    fn test_plan_falls_back_to_raw_reply() {
        let plan = plan_from_reply("Day 1: Museum Island".to_string());
        assert_eq!(plan.itinerary, "Day 1: Museum Island");
        assert!(plan.budget_per_person.is_none());

        let plan = plan_from_reply(r#"{"itinerary": "Day 1: Reichstag", "budget_per_person": 850.0}"#.to_string());
        assert_eq!(plan.itinerary, "Day 1: Reichstag");
        assert_eq!(plan.budget_per_person, Some(850.0));
    }

    #[tokio::test]
    async fn test_chat_sends_bearer_and_reads_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(completion("hello"))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client(&server).chat("system", "user").await.unwrap();
        assert_eq!(reply, "hello");
    }

    #[tokio::test]
    async fn test_chat_rate_limit_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = client(&server).chat("system", "user").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UpstreamRateLimited);
    }

    #[tokio::test]
    async fn test_classifier_drops_unknown_capabilities() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(completion(r#"{"scores": {"hotel": 0.8, "weather": 0.9}}"#))
            .mount(&server)
            .await;

        let summaries = vec![CapabilitySummary {
            name: "hotel".to_string(),
            description: "hotels".to_string(),
            keywords: vec![],
            required: vec!["query".to_string()],
        }];
        let scores = LlmClassifier::new(client(&server))
            .classify(&Request::new("a room in Rome"), &summaries)
            .await
            .unwrap();

        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].capability, "hotel");
    }

    #[tokio::test]
    async fn test_extractor_keeps_requested_non_null_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(completion(
                r#"{"query": "Rome", "check_in_date": "2025-10-01", "check_out_date": null, "adults": 2, "budget": 300}"#,
            ))
            .mount(&server)
            .await;

        let serp = SerpClient::new("http://127.0.0.1:9", "unused", Duration::from_secs(1)).unwrap();
        let descriptor = hotel_descriptor(Arc::new(HotelSearch::new(serp)));
        let fields = LlmExtractor::new(client(&server))
            .extract(&Request::new("Rome from Oct 1 for two"), &descriptor)
            .await
            .unwrap();

        assert_eq!(fields.len(), 3);
        assert_eq!(fields["adults"], 2);
        assert!(!fields.contains_key("check_out_date"));
        assert!(!fields.contains_key("budget"));
    }

    #[tokio::test]
    async fn test_transcribe_reads_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "hotel in Lisbon"})))
            .mount(&server)
            .await;

        let text = client(&server).transcribe(vec![1, 2, 3]).await.unwrap();
        assert_eq!(text, "hotel in Lisbon");
    }
}
