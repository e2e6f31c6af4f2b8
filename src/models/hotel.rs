use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    Standard,
    Deluxe,
    Suite,
    Presidential,
}

impl RoomType {
    /// Published categories, in the order they are offered to guests.
    pub const ALL: [RoomType; 4] = [
        RoomType::Standard,
        RoomType::Deluxe,
        RoomType::Suite,
        RoomType::Presidential,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::Standard => "standard",
            RoomType::Deluxe => "deluxe",
            RoomType::Suite => "suite",
            RoomType::Presidential => "presidential",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(RoomType::Standard),
            "deluxe" => Some(RoomType::Deluxe),
            "suite" => Some(RoomType::Suite),
            "presidential" => Some(RoomType::Presidential),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            RoomType::Standard => "Standard Room",
            RoomType::Deluxe => "Deluxe Room",
            RoomType::Suite => "Executive Suite",
            RoomType::Presidential => "Presidential Suite",
        }
    }

    /// Maximum number of occupants, adults and children combined.
    pub fn capacity(&self) -> u32 {
        match self {
            RoomType::Standard => 2,
            RoomType::Deluxe => 3,
            RoomType::Suite => 4,
            RoomType::Presidential => 6,
        }
    }

    pub fn nightly_rate(&self) -> f64 {
        match self {
            RoomType::Standard => 120.0,
            RoomType::Deluxe => 180.0,
            RoomType::Suite => 320.0,
            RoomType::Presidential => 900.0,
        }
    }

    /// Exact match against a category key or display name, ignoring case and
    /// whitespace. "Deluxe  room", "DELUXE" and "deluxe" all resolve.
    pub fn from_user_input(input: &str) -> Option<Self> {
        let wanted = squash(input);
        if wanted.is_empty() {
            return None;
        }
        Self::ALL.into_iter().find(|room| {
            let key = room.as_str();
            wanted == key
                || wanted == format!("{key}room")
                || wanted == squash(room.display_name())
        })
    }

    /// Finds the first category mentioned anywhere in free text.
    pub fn find_in_text(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        // "presidential suite" and "executive suite" both contain "suite",
        // so the longer names are tried first.
        let needles = [
            ("presidential", RoomType::Presidential),
            ("executive suite", RoomType::Suite),
            ("deluxe", RoomType::Deluxe),
            ("standard", RoomType::Standard),
            ("suite", RoomType::Suite),
        ];
        needles
            .iter()
            .find(|(needle, _)| lower.contains(needle))
            .map(|(_, room)| *room)
    }

    pub fn catalog_listing() -> String {
        Self::ALL
            .iter()
            .map(|r| format!("{} (up to {} guests)", r.display_name(), r.capacity()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionTopic {
    Amenities,
    CheckInOut,
    Location,
    CancellationPolicy,
    PetPolicy,
    Parking,
}

impl QuestionTopic {
    pub const ALL: [QuestionTopic; 6] = [
        QuestionTopic::Amenities,
        QuestionTopic::CheckInOut,
        QuestionTopic::Location,
        QuestionTopic::CancellationPolicy,
        QuestionTopic::PetPolicy,
        QuestionTopic::Parking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionTopic::Amenities => "amenities",
            QuestionTopic::CheckInOut => "check_in_out",
            QuestionTopic::Location => "location",
            QuestionTopic::CancellationPolicy => "cancellation_policy",
            QuestionTopic::PetPolicy => "pet_policy",
            QuestionTopic::Parking => "parking",
        }
    }

    /// Maps a loose topic hint (a backend label or the guest's own words)
    /// onto one of the fixed topics.
    pub fn from_hint(hint: &str) -> Option<Self> {
        let hint = hint.to_lowercase().replace(['-', ' '], "_");
        if let Some(exact) = Self::ALL.into_iter().find(|t| t.as_str() == hint) {
            return Some(exact);
        }

        let keywords: [(&[&str], QuestionTopic); 6] = [
            (&["park", "garage", "valet"], QuestionTopic::Parking),
            (&["pet", "dog", "animal"], QuestionTopic::PetPolicy),
            (
                &["cancellation", "cancel_policy", "refund"],
                QuestionTopic::CancellationPolicy,
            ),
            (
                &["check_in", "checkin", "check_out", "checkout", "arrival", "departure"],
                QuestionTopic::CheckInOut,
            ),
            (
                &["location", "address", "where", "directions", "located"],
                QuestionTopic::Location,
            ),
            (
                &["amenit", "facilit", "wifi", "wi_fi", "pool", "gym", "fitness", "spa", "breakfast", "restaurant"],
                QuestionTopic::Amenities,
            ),
        ];

        keywords
            .iter()
            .find(|(needles, _)| needles.iter().any(|n| hint.contains(n)))
            .map(|(_, topic)| *topic)
    }
}
