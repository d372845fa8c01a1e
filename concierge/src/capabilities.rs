/// Built-in travel capabilities
/// Hotel search takes precedence over flight search when a request scores
/// the same for both.

use std::sync::Arc;

use crate::error::RegistryError;
use crate::extract::FieldSpec;
use crate::registry::{CapabilityDescriptor, CapabilityHandler, CapabilityRegistry, OutputShape};

pub const HOTEL: &str = "hotel";
pub const FLIGHT: &str = "flight";

pub fn hotel_descriptor(handler: Arc<dyn CapabilityHandler>) -> CapabilityDescriptor {
    CapabilityDescriptor {
        name: HOTEL.to_string(),
        priority: 10,
        description: "Search hotels, room availability, pricing and amenities for a destination and stay dates"
            .to_string(),
        keywords: ["hotel", "hotels", "stay", "room", "rooms", "accommodation", "lodging", "night", "nights", "resort"]
            .into_iter()
            .map(String::from)
            .collect(),
        required: vec![
            FieldSpec::text("query"),
            FieldSpec::date("check_in_date"),
            FieldSpec::date("check_out_date"),
            FieldSpec::positive_int("adults"),
        ],
        output: OutputShape::HotelList,
        handler,
    }
}

pub fn flight_descriptor(handler: Arc<dyn CapabilityHandler>) -> CapabilityDescriptor {
    CapabilityDescriptor {
        name: FLIGHT.to_string(),
        priority: 20,
        description: "Search round-trip flights, schedules and airlines between two airports".to_string(),
        keywords: ["flight", "flights", "fly", "flying", "airline", "airlines", "plane", "airport", "depart", "return"]
            .into_iter()
            .map(String::from)
            .collect(),
        required: vec![
            FieldSpec::airport("departure_id"),
            FieldSpec::airport("arrival_id"),
            FieldSpec::date("outbound_date"),
            FieldSpec::date("return_date"),
        ],
        output: OutputShape::FlightList,
        handler,
    }
}

/// Registry with the hotel and flight capabilities bound to their handlers
pub fn travel_registry(
    hotel: Arc<dyn CapabilityHandler>,
    flight: Arc<dyn CapabilityHandler>,
) -> Result<CapabilityRegistry, RegistryError> {
    let mut builder = CapabilityRegistry::builder();
    builder.register(hotel_descriptor(hotel))?.register(flight_descriptor(flight))?;
    Ok(builder.build())
}
