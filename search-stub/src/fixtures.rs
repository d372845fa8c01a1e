/// Deterministic search results
/// Same query in, same results out; nothing here touches the network.

use travel_protocol::{
    FlightGroup, FlightSearchResponse, FlightSegment, HotelAd, HotelProperty, HotelSearchResponse, RatePerNight,
};

const AIRLINES: [&str; 4] = ["Lufthansa", "United", "Air China", "Delta"];
const AIRPLANES: [&str; 3] = ["Boeing 777", "Airbus A350", "Boeing 787"];

/// Small stable hash so fixtures vary with the query
fn seed(parts: &[&str]) -> u64 {
    parts
        .iter()
        .flat_map(|p| p.bytes())
        .fold(17u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64))
}

/// Nightly base rate for a destination
fn nightly_rate(query: &str) -> u64 {
    let base = match query.to_ascii_lowercase().as_str() {
        "new york" | "london" | "paris" => 320,
        "berlin" | "lisbon" | "madrid" => 180,
        _ => 140,
    };
    base + seed(&[query]) % 60
}

pub fn hotels(query: &str, adults: u32) -> HotelSearchResponse {
    let rate = nightly_rate(query) + 25 * adults.saturating_sub(1) as u64;
    let name = query.trim();

    HotelSearchResponse {
        ads: vec![HotelAd {
            name: format!("{} Grand Hotel", name),
            overall_rating: Some(4.6),
            price: Some(format!("${}", rate + 90)),
            amenities: vec!["Free Wi-Fi".to_string(), "Spa".to_string(), "Pool".to_string()],
        }],
        properties: vec![
            HotelProperty {
                name: format!("{} Central Inn", name),
                overall_rating: Some(4.2),
                rate_per_night: Some(RatePerNight {
                    lowest: Some(format!("${}", rate)),
                }),
                amenities: vec!["Free Wi-Fi".to_string(), "Breakfast".to_string()],
            },
            HotelProperty {
                name: format!("The {} Residence", name),
                overall_rating: Some(3.9),
                rate_per_night: Some(RatePerNight {
                    lowest: Some(format!("${}", rate.saturating_sub(40))),
                }),
                amenities: vec!["Kitchen".to_string()],
            },
        ],
    }
}

fn segment(seed: u64, offset: usize, duration: u64) -> FlightSegment {
    FlightSegment {
        duration: Some(duration),
        airplane: Some(AIRPLANES[(seed as usize + offset) % AIRPLANES.len()].to_string()),
        airline: Some(AIRLINES[(seed as usize + offset) % AIRLINES.len()].to_string()),
        travel_class: Some("Economy".to_string()),
    }
}

pub fn flights(departure_id: &str, arrival_id: &str, outbound_date: &str) -> FlightSearchResponse {
    let s = seed(&[departure_id, arrival_id, outbound_date]);
    let direct = 240 + s % 600;

    FlightSearchResponse {
        best_flights: vec![FlightGroup {
            flights: vec![segment(s, 0, direct)],
            total_duration: Some(direct),
            price: Some(300 + s % 900),
        }],
        other_flights: vec![FlightGroup {
            flights: vec![segment(s, 1, direct / 2 + 45), segment(s, 2, direct / 2 + 60)],
            total_duration: Some(direct + 165),
            price: Some(220 + s % 700),
        }],
    }
}
