/// Shared wire types for the travel concierge services
/// Request bodies accepted by the concierge, the normalized response envelope,
/// and the search-API response shapes spoken by both the concierge client
/// and the local search stub.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /process`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProcessRequest {
    /// Free-text travel question
    pub question: String,
    /// Optional structured hints (field name -> value), override anything parsed from text
    #[serde(default)]
    pub hints: Map<String, Value>,
}

/// Body of `POST /api/voice/process`
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct VoiceInputRequest {
    pub audio_base64: Option<String>,
    pub text: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VoiceTranscript {
    pub transcript: String,
}

/// Body of `POST /api/trip/create`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TripRequest {
    pub user_id: String,
    pub conversation: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TripPlanResponse {
    pub itinerary: String,
    pub budget_per_person: Option<f64>,
    pub suggestions: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthResponse {
    pub status: String,
}

/// Top-level tag of a concierge response
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    NeedsClarification,
    Error,
}

/// Normalized response envelope returned to every caller
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConciergeResponse {
    pub status: ResponseStatus,
    /// Handler payload, passed through untouched on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Short natural-language answer built from `data`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ConciergeResponse {
    pub fn success(data: Value) -> Self {
        Self {
            status: ResponseStatus::Success,
            data: Some(data),
            answer: None,
            message: None,
            missing_fields: None,
            error_kind: None,
            request_id: None,
        }
    }

    pub fn clarification(message: impl Into<String>, missing_fields: Vec<String>) -> Self {
        Self {
            status: ResponseStatus::NeedsClarification,
            data: None,
            answer: None,
            message: Some(message.into()),
            missing_fields: Some(missing_fields),
            error_kind: None,
            request_id: None,
        }
    }

    pub fn error(error_kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            data: None,
            answer: None,
            message: Some(message.into()),
            missing_fields: None,
            error_kind: Some(error_kind.into()),
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// One hotel result as returned to callers
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HotelRecord {
    pub name: String,
    pub rating: Option<f64>,
    pub price: Option<String>,
    pub amenities: Vec<String>,
}

/// One flight segment as returned to callers
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FlightRecord {
    /// Minutes
    pub duration: Option<u64>,
    pub airplane: Option<String>,
    pub airline: Option<String>,
    pub travel_class: Option<String>,
}

// ===================================================================
// Search API (`GET /search.json`) response shapes
// ===================================================================

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct HotelSearchResponse {
    #[serde(default)]
    pub ads: Vec<HotelAd>,
    #[serde(default)]
    pub properties: Vec<HotelProperty>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HotelAd {
    pub name: String,
    #[serde(default)]
    pub overall_rating: Option<f64>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub amenities: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HotelProperty {
    pub name: String,
    #[serde(default)]
    pub overall_rating: Option<f64>,
    #[serde(default)]
    pub rate_per_night: Option<RatePerNight>,
    #[serde(default)]
    pub amenities: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RatePerNight {
    #[serde(default)]
    pub lowest: Option<String>,
}

impl From<HotelAd> for HotelRecord {
    fn from(ad: HotelAd) -> Self {
        Self {
            name: ad.name,
            rating: ad.overall_rating,
            price: ad.price,
            amenities: ad.amenities,
        }
    }
}

impl From<HotelProperty> for HotelRecord {
    fn from(property: HotelProperty) -> Self {
        Self {
            name: property.name,
            rating: property.overall_rating,
            price: property.rate_per_night.and_then(|rate| rate.lowest),
            amenities: property.amenities,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct FlightSearchResponse {
    #[serde(default)]
    pub best_flights: Vec<FlightGroup>,
    #[serde(default)]
    pub other_flights: Vec<FlightGroup>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct FlightGroup {
    #[serde(default)]
    pub flights: Vec<FlightSegment>,
    #[serde(default)]
    pub total_duration: Option<u64>,
    #[serde(default)]
    pub price: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct FlightSegment {
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub airplane: Option<String>,
    #[serde(default)]
    pub airline: Option<String>,
    #[serde(default)]
    pub travel_class: Option<String>,
}

impl From<FlightSegment> for FlightRecord {
    fn from(segment: FlightSegment) -> Self {
        Self {
            duration: segment.duration,
            airplane: segment.airplane,
            airline: segment.airline,
            travel_class: segment.travel_class,
        }
    }
}

/// Error body used by the search API on non-2xx answers
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SearchErrorBody {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_process_request_hints_default_to_empty() {
        let req: ProcessRequest = serde_json::from_value(json!({"question": "hotels in Berlin"})).unwrap();
        assert_eq!(req.question, "hotels in Berlin");
        assert!(req.hints.is_empty());
    }

    #[test]
    fn test_clarification_envelope_shape() {
        let resp = ConciergeResponse::clarification(
            "Can you please share the following information: adults",
            vec!["adults".to_string()],
        );
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["status"], "needs_clarification");
        assert_eq!(value["missing_fields"], json!(["adults"]));
        assert!(value.get("data").is_none());
        assert!(value.get("error_kind").is_none());
    }

    #[test]
    fn test_hotel_property_uses_lowest_rate() {
        let property: HotelProperty = serde_json::from_value(json!({
            "name": "Hotel Adlon",
            "overall_rating": 4.7,
            "rate_per_night": {"lowest": "$410"},
            "amenities": ["Spa"]
        }))
        .unwrap();
        let record = HotelRecord::from(property);
        assert_eq!(record.price.as_deref(), Some("$410"));
        assert_eq!(record.rating, Some(4.7));
    }

    #[test]
    fn test_flight_response_tolerates_missing_sections() {
        let resp: FlightSearchResponse = serde_json::from_value(json!({"search_metadata": {}})).unwrap();
        assert!(resp.best_flights.is_empty());
        assert!(resp.other_flights.is_empty());
    }
}
