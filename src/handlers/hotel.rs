use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::models::{QuestionTopic, RoomType};
use crate::state::AppState;

#[derive(Serialize)]
pub struct RoomInfo {
    room_type: RoomType,
    name: &'static str,
    capacity: u32,
    nightly_rate: f64,
}

#[derive(Serialize)]
pub struct HotelInfo {
    name: String,
    address: String,
    check_in_time: String,
    check_out_time: String,
    amenities: Vec<String>,
    rooms: Vec<RoomInfo>,
    answers: BTreeMap<&'static str, String>,
}

// GET /hotel/info
pub async fn hotel_info(State(state): State<Arc<AppState>>) -> Json<HotelInfo> {
    let hotel = &state.config.hotel;
    Json(HotelInfo {
        name: hotel.name.clone(),
        address: hotel.address.clone(),
        check_in_time: hotel.check_in_time.clone(),
        check_out_time: hotel.check_out_time.clone(),
        amenities: hotel.amenities.clone(),
        rooms: RoomType::ALL
            .iter()
            .map(|r| RoomInfo {
                room_type: *r,
                name: r.display_name(),
                capacity: r.capacity(),
                nightly_rate: r.nightly_rate(),
            })
            .collect(),
        answers: QuestionTopic::ALL
            .iter()
            .map(|t| (t.as_str(), state.facts.lookup(*t)))
            .collect(),
    })
}
