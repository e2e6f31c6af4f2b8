//! Field validation. Every function is pure; the current date is passed in
//! so results never depend on the wall clock.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::models::{Field, RoomType, StayDates};

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome<T> {
    Accepted(T),
    Rejected { field: Field, reason: String },
}

impl<T> ValidationOutcome<T> {
    pub fn rejected(field: Field, reason: impl Into<String>) -> Self {
        ValidationOutcome::Rejected {
            field,
            reason: reason.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ValidationOutcome::Accepted(_) => None,
            ValidationOutcome::Rejected { reason, .. } => Some(reason),
        }
    }
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
];

pub fn parse_date(field: Field, raw: &str) -> ValidationOutcome<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .map(ValidationOutcome::Accepted)
        .unwrap_or_else(|| {
            ValidationOutcome::rejected(
                field,
                format!(
                    "I couldn't read \"{raw}\" as a {}. Please use a date like June 10, 2025 or 2025-06-10.",
                    field.label()
                ),
            )
        })
}

/// Parses a single date and refuses anything before `today`.
pub fn validate_date(field: Field, raw: &str, today: NaiveDate) -> ValidationOutcome<NaiveDate> {
    match parse_date(field, raw) {
        ValidationOutcome::Accepted(date) if date < today => ValidationOutcome::rejected(
            field,
            format!(
                "The {} {} is in the past. Please choose {} or later.",
                field.label(),
                date.format("%b %-d, %Y"),
                today.format("%b %-d, %Y")
            ),
        ),
        other => other,
    }
}

pub fn validate_stay(
    check_in: NaiveDate,
    check_out: NaiveDate,
    today: NaiveDate,
    max_nights: i64,
) -> ValidationOutcome<StayDates> {
    if check_in < today {
        return ValidationOutcome::rejected(
            Field::CheckIn,
            format!(
                "Check-in date cannot be in the past ({}). Please choose {} or later.",
                check_in.format("%b %-d, %Y"),
                today.format("%b %-d, %Y")
            ),
        );
    }
    if check_out <= check_in {
        return ValidationOutcome::rejected(
            Field::CheckOut,
            format!(
                "Check-out date must be after check-in date ({}). Which day will you check out?",
                check_in.format("%b %-d, %Y")
            ),
        );
    }
    let nights = (check_out - check_in).num_days();
    if nights > max_nights {
        return ValidationOutcome::rejected(
            Field::CheckOut,
            format!(
                "Maximum stay is {max_nights} nights, but {} to {} is {nights}. Please choose an earlier check-out date.",
                check_in.format("%b %-d"),
                check_out.format("%b %-d, %Y")
            ),
        );
    }
    ValidationOutcome::Accepted(StayDates {
        check_in,
        check_out,
    })
}

pub fn validate_room_type(raw: &str) -> ValidationOutcome<RoomType> {
    match RoomType::from_user_input(raw) {
        Some(room) => ValidationOutcome::Accepted(room),
        None => ValidationOutcome::rejected(
            Field::RoomType,
            format!(
                "We don't offer a \"{}\" room. Please choose one of: {}.",
                raw.trim(),
                RoomType::catalog_listing()
            ),
        ),
    }
}

pub(crate) fn number_word(word: &str) -> Option<u32> {
    let n = match word.to_lowercase().as_str() {
        "no" | "none" | "zero" => 0,
        "one" | "a" | "an" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        _ => return None,
    };
    Some(n)
}

/// Largest party any single room can hold.
fn max_party() -> u32 {
    RoomType::ALL.iter().map(|r| r.capacity()).max().unwrap_or(0)
}

/// Counts above the largest room are refused outright.
fn parse_count(field: Field, raw: &str) -> ValidationOutcome<u32> {
    let raw = raw.trim();
    let Some(count) = raw.parse::<u32>().ok().or_else(|| number_word(raw)) else {
        return ValidationOutcome::rejected(
            field,
            format!(
                "I couldn't read \"{raw}\" as the {}. Please reply with a whole number.",
                field.label()
            ),
        );
    };
    let max = max_party();
    if count > max {
        return ValidationOutcome::rejected(
            field,
            format!(
                "Our largest room sleeps {max} guests, so {count} is more than we can host in one reservation. \
                 Please reply with a smaller {}.",
                field.label()
            ),
        );
    }
    ValidationOutcome::Accepted(count)
}

pub fn validate_adults(raw: &str) -> ValidationOutcome<u32> {
    match parse_count(Field::Adults, raw) {
        ValidationOutcome::Accepted(0) => ValidationOutcome::rejected(
            Field::Adults,
            "At least one adult must be staying. How many adults will there be?",
        ),
        other => other,
    }
}

pub fn validate_children(raw: &str) -> ValidationOutcome<u32> {
    parse_count(Field::Children, raw)
}

/// Party size against a room's capacity. Rejections are reported on the
/// adults field, since either the party or the room has to change.
pub fn check_capacity(room: RoomType, adults: u32, children: u32) -> ValidationOutcome<()> {
    // An overflowing sum fits no room.
    let total = adults.checked_add(children).unwrap_or(u32::MAX);
    if total <= room.capacity() {
        return ValidationOutcome::Accepted(());
    }
    let larger: Vec<_> = RoomType::ALL
        .iter()
        .filter(|r| r.capacity() >= total)
        .map(|r| r.display_name())
        .collect();
    let alternatives = if larger.is_empty() {
        "No single room fits that many guests, so please reduce the party.".to_string()
    } else {
        format!("Rooms that fit {total}: {}.", larger.join(", "))
    };
    ValidationOutcome::rejected(
        Field::Adults,
        format!(
            "The {} sleeps at most {} guests, but your party is {adults} adult(s) and {children} child(ren). Please change the number of guests or choose a different room. {alternatives}",
            room.display_name(),
            room.capacity(),
        ),
    )
}

pub fn validate_name(raw: &str) -> ValidationOutcome<String> {
    let name = raw.trim();
    if name.is_empty() || !name.chars().any(|c| c.is_alphabetic()) {
        return ValidationOutcome::rejected(
            Field::GuestName,
            "Please tell me the name the reservation should be under.",
        );
    }
    if name.chars().count() > 100 {
        return ValidationOutcome::rejected(
            Field::GuestName,
            "That name is too long. Please give the guest's full name only.",
        );
    }
    ValidationOutcome::Accepted(name.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
            .expect("static email pattern")
    })
}

pub fn validate_email(raw: &str) -> ValidationOutcome<String> {
    let email = raw.trim();
    if email_re().is_match(email) {
        ValidationOutcome::Accepted(email.to_lowercase())
    } else {
        ValidationOutcome::rejected(
            Field::GuestEmail,
            format!("\"{email}\" doesn't look like an email address. Please send one like name@example.com."),
        )
    }
}

pub fn validate_phone(raw: &str) -> ValidationOutcome<String> {
    let phone = raw.trim();
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | '.' | ' '));
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if !allowed || !(7..=15).contains(&digits.len()) {
        return ValidationOutcome::rejected(
            Field::GuestPhone,
            format!(
                "\"{phone}\" doesn't look like a phone number. Please send 7 to 15 digits, with a country code if outside the US."
            ),
        );
    }
    if phone.starts_with('+') {
        ValidationOutcome::Accepted(format!("+{digits}"))
    } else {
        ValidationOutcome::Accepted(digits)
    }
}
