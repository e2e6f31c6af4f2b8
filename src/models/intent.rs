use serde::{Deserialize, Serialize};

/// Outcome of routing a turn that arrived while no workflow was active.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    NewBooking,
    Reschedule,
    Question { topic_hint: String },
    Cancel,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::NewBooking => "new_booking",
            Intent::Reschedule => "reschedule",
            Intent::Question { .. } => "question",
            Intent::Cancel => "cancel",
            Intent::Unknown => "unknown",
        }
    }
}

/// Raw intent label as reported by the text understanding backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntentLabel {
    Book,
    Reschedule,
    Question,
    Cancel,
    Confirm,
    Decline,
    #[serde(other)]
    Unknown,
}

/// A structured booking field the extractor may propose a value for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    CheckIn,
    CheckOut,
    RoomType,
    Adults,
    Children,
    GuestName,
    GuestEmail,
    GuestPhone,
    BookingRef,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::CheckIn => "check_in",
            Field::CheckOut => "check_out",
            Field::RoomType => "room_type",
            Field::Adults => "adults",
            Field::Children => "children",
            Field::GuestName => "guest_name",
            Field::GuestEmail => "guest_email",
            Field::GuestPhone => "guest_phone",
            Field::BookingRef => "booking_ref",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Field::CheckIn => "check-in date",
            Field::CheckOut => "check-out date",
            Field::RoomType => "room type",
            Field::Adults => "number of adults",
            Field::Children => "number of children",
            Field::GuestName => "name",
            Field::GuestEmail => "email address",
            Field::GuestPhone => "phone number",
            Field::BookingRef => "booking reference",
        }
    }
}

/// One proposed (field, raw value) pair. Nothing proposed here is trusted
/// until it passes validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldProposal {
    pub field: Field,
    #[serde(deserialize_with = "string_or_number")]
    pub value: String,
    /// Set when the guest explicitly re-states a value they gave earlier.
    #[serde(default)]
    pub correction: bool,
}

impl FieldProposal {
    pub fn new(field: Field, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
            correction: false,
        }
    }
}

/// Backends sometimes answer `"adults": 2` instead of `"2"`.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Understanding {
    #[serde(default)]
    pub intent: Option<IntentLabel>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub field_updates: Vec<FieldProposal>,
    #[serde(default)]
    pub confidence: f32,
}
