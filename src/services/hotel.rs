use crate::config::HotelConfig;
use crate::models::{QuestionTopic, RoomType};

/// Renders answers for the fixed question topics.
pub trait HotelFacts: Send + Sync {
    fn lookup(&self, topic: QuestionTopic) -> String;
}

pub struct StaticHotelFacts {
    hotel: HotelConfig,
}

impl StaticHotelFacts {
    pub fn new(hotel: HotelConfig) -> Self {
        Self { hotel }
    }
}

impl HotelFacts for StaticHotelFacts {
    fn lookup(&self, topic: QuestionTopic) -> String {
        let h = &self.hotel;
        match topic {
            QuestionTopic::Amenities => {
                let rooms: Vec<_> = RoomType::ALL
                    .iter()
                    .map(|r| format!("{} (${:.0}/night)", r.display_name(), r.nightly_rate()))
                    .collect();
                format!(
                    "{} offers: {}. Our rooms: {}.",
                    h.name,
                    h.amenities.join(", "),
                    rooms.join(", ")
                )
            }
            QuestionTopic::CheckInOut => format!(
                "Check-in is from {} and check-out is until {}.",
                h.check_in_time, h.check_out_time
            ),
            QuestionTopic::Location => format!("{} is located at {}.", h.name, h.address),
            QuestionTopic::CancellationPolicy => h.cancellation_policy.clone(),
            QuestionTopic::PetPolicy => h.pet_policy.clone(),
            QuestionTopic::Parking => h.parking.clone(),
        }
    }
}
