/// Search API client and the hotel/flight capability handlers built on it
/// One `GET /search.json` per handler call; retries are the executor's job.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use travel_protocol::{FlightRecord, FlightSearchResponse, HotelRecord, HotelSearchResponse};

use crate::error::{ErrorKind, UpstreamError};
use crate::registry::CapabilityHandler;

const SERVICE: &str = "serpapi";

pub const HOTEL_ENGINE: &str = "google_hotels";
pub const FLIGHT_ENGINE: &str = "google_flights";

/// Thin client for the search API
#[derive(Clone)]
pub struct SerpClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for SerpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerpClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl SerpClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;
        Ok(Self::with_client(http, base_url, api_key))
    }

    pub fn with_client(http: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run one search against `engine` and decode the body as `T`
    pub async fn search<T: DeserializeOwned>(&self, engine: &str, params: &[(&str, &str)]) -> Result<T, UpstreamError> {
        let url = format!("{}/search.json", self.base_url);
        tracing::debug!(engine, url = %url, "search request");

        let response = self
            .http
            .get(&url)
            .query(&[("engine", engine)])
            .query(params)
            .query(&[("api_key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| UpstreamError::transport(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(engine, status = status.as_u16(), body = %body, "search request rejected");
            return Err(UpstreamError::from_status(SERVICE, status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| UpstreamError::transport(SERVICE, e))
    }
}

/// Read a required field the validator has already vouched for
fn field<'a>(fields: &'a Map<String, Value>, name: &str) -> Result<&'a str, UpstreamError> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| UpstreamError::new(ErrorKind::UpstreamValidationError, format!("field `{}` is not set", name)))
}

fn to_payload<T: serde::Serialize>(records: &[T]) -> Result<Value, UpstreamError> {
    serde_json::to_value(records)
        .map_err(|e| UpstreamError::new(ErrorKind::UpstreamUnknown, format!("failed to encode records: {}", e)))
}

/// Hotel search handler
#[derive(Debug, Clone)]
pub struct HotelSearch {
    client: SerpClient,
}

impl HotelSearch {
    pub const ID: &'static str = "serp.google_hotels";

    pub fn new(client: SerpClient) -> Self {
        Self { client }
    }

    pub async fn search(
        &self,
        query: &str,
        check_in_date: &str,
        check_out_date: &str,
        adults: &str,
    ) -> Result<Vec<HotelRecord>, UpstreamError> {
        let params = [
            ("q", query),
            ("check_in_date", check_in_date),
            ("check_out_date", check_out_date),
            ("adults", adults),
            ("currency", "USD"),
            ("gl", "us"),
            ("hl", "en"),
        ];
        let response: HotelSearchResponse = self.client.search(HOTEL_ENGINE, &params).await?;

        let records: Vec<HotelRecord> = response
            .ads
            .into_iter()
            .map(HotelRecord::from)
            .chain(response.properties.into_iter().map(HotelRecord::from))
            .collect();
        tracing::info!(query, results = records.len(), "hotel search done");
        Ok(records)
    }
}

#[async_trait]
impl CapabilityHandler for HotelSearch {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn handle(&self, fields: &Map<String, Value>) -> Result<Value, UpstreamError> {
        let records = self
            .search(
                field(fields, "query")?,
                field(fields, "check_in_date")?,
                field(fields, "check_out_date")?,
                field(fields, "adults")?,
            )
            .await?;
        to_payload(&records)
    }
}

/// Round-trip flight search handler
#[derive(Debug, Clone)]
pub struct FlightSearch {
    client: SerpClient,
}

impl FlightSearch {
    pub const ID: &'static str = "serp.google_flights";

    pub fn new(client: SerpClient) -> Self {
        Self { client }
    }

    pub async fn search(
        &self,
        departure_id: &str,
        arrival_id: &str,
        outbound_date: &str,
        return_date: &str,
    ) -> Result<Vec<FlightRecord>, UpstreamError> {
        let params = [
            ("departure_id", departure_id),
            ("arrival_id", arrival_id),
            ("outbound_date", outbound_date),
            ("return_date", return_date),
            ("currency", "USD"),
            ("hl", "en"),
        ];
        let response: FlightSearchResponse = self.client.search(FLIGHT_ENGINE, &params).await?;

        let records: Vec<FlightRecord> = response
            .best_flights
            .into_iter()
            .chain(response.other_flights)
            .flat_map(|group| group.flights)
            .map(FlightRecord::from)
            .collect();
        tracing::info!(departure_id, arrival_id, results = records.len(), "flight search done");
        Ok(records)
    }
}

#[async_trait]
impl CapabilityHandler for FlightSearch {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn handle(&self, fields: &Map<String, Value>) -> Result<Value, UpstreamError> {
        let records = self
            .search(
                field(fields, "departure_id")?,
                field(fields, "arrival_id")?,
                field(fields, "outbound_date")?,
                field(fields, "return_date")?,
            )
            .await?;
        to_payload(&records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> SerpClient {
        SerpClient::new(server.uri(), "test-key", Duration::from_secs(5)).unwrap()
    }

    fn hotel_fields() -> Map<String, Value> {
        json!({
            "query": "Berlin",
            "check_in_date": "2025-08-01",
            "check_out_date": "2025-08-03",
            "adults": "2"
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[tokio::test]
    async fn test_hotel_search_reads_ads_then_properties() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search.json"))
            .and(query_param("engine", "google_hotels"))
            .and(query_param("q", "Berlin"))
            .and(query_param("adults", "2"))
            .and(query_param("gl", "us"))
            .and(query_param("api_key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ads": [
                    {"name": "Hotel Adlon", "overall_rating": 4.7, "price": "$410", "amenities": ["Spa", "Pool"]}
                ],
                "properties": [
                    {"name": "Motel One", "overall_rating": 4.3, "rate_per_night": {"lowest": "$98"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let handler = HotelSearch::new(client(&server));
        let payload = handler.handle(&hotel_fields()).await.unwrap();

        assert_eq!(
            payload,
            json!([
                {"name": "Hotel Adlon", "rating": 4.7, "price": "$410", "amenities": ["Spa", "Pool"]},
                {"name": "Motel One", "rating": 4.3, "price": "$98", "amenities": []}
            ])
        );
    }

    #[tokio::test]
    async fn test_flight_search_flattens_groups() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search.json"))
            .and(query_param("engine", "google_flights"))
            .and(query_param("departure_id", "PEK"))
            .and(query_param("arrival_id", "AUS"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "best_flights": [
                    {"flights": [
                        {"duration": 780, "airplane": "Boeing 777", "airline": "Air China", "travel_class": "Economy"},
                        {"duration": 190, "airplane": "Airbus A321", "airline": "American", "travel_class": "Economy"}
                    ], "price": 1320}
                ],
                "other_flights": [
                    {"flights": [{"duration": 905, "airline": "United", "travel_class": "Economy"}]}
                ]
            })))
            .mount(&server)
            .await;

        let handler = FlightSearch::new(client(&server));
        let records = handler.search("PEK", "AUS", "2025-07-19", "2025-07-25").await.unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].airline.as_deref(), Some("Air China"));
        assert_eq!(records[2].airplane, None);
        assert_eq!(records[2].duration, Some(905));
    }

    #[tokio::test]
    async fn test_error_status_is_classified() {
        let cases = [
            (401, ErrorKind::UpstreamAuthError),
            (429, ErrorKind::UpstreamRateLimited),
            (503, ErrorKind::UpstreamServerError),
        ];

        for (status, kind) in cases {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/search.json"))
                .respond_with(ResponseTemplate::new(status).set_body_json(json!({"error": "nope"})))
                .mount(&server)
                .await;

            let err = HotelSearch::new(client(&server)).handle(&hotel_fields()).await.unwrap_err();
            assert_eq!(err.kind, kind);
            assert_eq!(err.status, Some(status));
        }
    }

    #[tokio::test]
    async fn test_undecodable_body_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = HotelSearch::new(client(&server)).handle(&hotel_fields()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UpstreamUnknown);
        assert!(err.kind.is_retryable());
    }

    #[tokio::test]
    async fn test_connection_failure_message_omits_api_key() {
        let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let client = SerpClient::new(format!("http://127.0.0.1:{}", port), "SECRET-SERP-KEY", Duration::from_secs(5)).unwrap();

        let err = HotelSearch::new(client).handle(&hotel_fields()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UpstreamUnknown);
        assert!(err.message.starts_with("serpapi request failed"));
        assert!(!err.message.contains("SECRET-SERP-KEY"));
        assert!(!err.message.contains("api_key"));
        assert!(!err.to_string().contains("SECRET-SERP-KEY"));
    }

    #[tokio::test]
    async fn test_missing_field_is_rejected_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

        let mut fields = hotel_fields();
        fields.remove("adults");
        let err = HotelSearch::new(client(&server)).handle(&fields).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::UpstreamValidationError);
    }
}
