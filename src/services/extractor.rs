//! Field extraction. Proposals from the understanding backend are merged with
//! a local deterministic parser and then narrowed to the fields the workflow
//! still owes (or that the guest is explicitly correcting).

use std::sync::OnceLock;

use chrono::{Datelike, Duration, NaiveDate};
use regex::{Captures, Regex};

use crate::models::{Field, FieldProposal, RoomType, Stage, Workflow};
use crate::services::validation::number_word;

const MONTHS: &str = r"jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";
const COUNT: &str = r"\d{1,2}|no|one|two|three|four|five|six|seven|eight|nine|ten";

const SMALL_TALK: &[&str] = &[
    "hi", "hello", "hey", "thanks", "thank you", "ok", "okay", "yes", "no", "sure", "please",
    "good", "great", "cool", "what", "why", "how", "help",
];

fn cached(cell: &'static OnceLock<Regex>, pattern: impl FnOnce() -> String) -> &'static Regex {
    cell.get_or_init(|| Regex::new(&pattern()).expect("static extraction pattern"))
}

fn iso_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, || r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b".to_string())
}

fn slash_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, || r"\b(\d{1,2})/(\d{1,2})(?:/(\d{2,4}))?\b".to_string())
}

fn month_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, || {
        format!(r"(?i)\b({MONTHS})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?(?:,?\s+(\d{{4}}))?\b")
    })
}

fn day_month_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, || {
        format!(r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?({MONTHS})\b(?:,?\s+(\d{{4}}))?")
    })
}

fn range_tail_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, || {
        r"(?i)^\s*(?:-|–|to|through|thru|until|till)\s*(\d{1,2})(?:st|nd|rd|th)?\b".to_string()
    })
}

fn day_only_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, || r"(?i)\bthe\s+(\d{1,2})(?:st|nd|rd|th)\b".to_string())
}

fn nights_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, || format!(r"(?i)\b({COUNT})\s+nights?\b"))
}

fn adults_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, || {
        format!(r"(?i)\b({COUNT})\s+(?:adults?|people|persons|guests|grown[- ]?ups)\b")
    })
}

fn children_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, || format!(r"(?i)\b({COUNT})\s+(?:children|child|kids?)\b"))
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, || r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}".to_string())
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, || {
        r"\+\d[\d\s().-]{5,}\d|\(?\b\d{3}\)?[\s.-]?\d{3}[\s.-]\d{4}\b".to_string()
    })
}

fn stated_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, || {
        r"(?i:\bmy name is|\bname is|\bname's|\bunder the name)\s+([A-Za-z][A-Za-z'-]*(?:\s+[A-Za-z][A-Za-z'-]*){0,3})|\b(?:I'm|I am)\s+([A-Z][A-Za-z'-]+(?:\s+[A-Z][A-Za-z'-]+){0,3})".to_string()
    })
}

fn booking_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, || r"(?i)\bHB-?([0-9A-F]{8})\b".to_string())
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, || r"^[A-Za-z0-9][A-Za-z0-9-]{3,19}$".to_string())
}

fn unknown_room_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, || r"(?i)\b([a-z]+)\s+(?:room|suite)\b".to_string())
}

fn correction_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, || {
        r"(?i)\b(actually|change|changed|instead|make it|correction|i meant|update|switch)\b"
            .to_string()
    })
}

/// True when the guest is explicitly re-stating something given earlier.
pub fn signals_correction(text: &str) -> bool {
    correction_re().is_match(text)
}

/// Fields proposals may target this turn: everything still missing from the
/// current stage onward, plus already-accepted fields when the guest is
/// correcting them or revising after a rejected summary.
pub fn field_schema(workflow: &Workflow, text: &str) -> Vec<Field> {
    let mut schema = workflow.open_fields();
    let draft = workflow.draft();
    let reopen = workflow.stage() != Stage::Locate && (draft.revising || signals_correction(text));
    if reopen {
        for field in workflow.kind().correctable_fields() {
            if !schema.contains(field) {
                schema.push(*field);
            }
        }
    }
    schema
}

/// Merges backend proposals with locally parsed ones and keeps only those the
/// schema allows. Backend proposals win per field; the first proposal for a
/// field is kept. A backend proposal flagged as a correction may also target
/// any field the workflow lets the guest correct.
pub fn extract(
    workflow: &Workflow,
    text: &str,
    remote: &[FieldProposal],
    today: NaiveDate,
) -> Vec<FieldProposal> {
    let schema = field_schema(workflow, text);
    let draft = workflow.draft();
    let local = parse_local(workflow, text, today);
    let correctable = |proposal: &FieldProposal| {
        proposal.correction
            && workflow.stage() != Stage::Locate
            && workflow.kind().correctable_fields().contains(&proposal.field)
    };

    let mut merged: Vec<FieldProposal> = Vec::new();
    for proposal in remote.iter().chain(local.iter()) {
        let value = proposal.value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("null") {
            continue;
        }
        let allowed = schema.contains(&proposal.field) || correctable(proposal);
        if !allowed || merged.iter().any(|p| p.field == proposal.field) {
            continue;
        }
        merged.push(FieldProposal {
            field: proposal.field,
            value: value.to_string(),
            correction: proposal.correction || draft.is_set(proposal.field),
        });
    }
    merged
}

/// Deterministic parse of the guest's text. Proposes raw values only;
/// validation happens later.
pub fn parse_local(workflow: &Workflow, text: &str, today: NaiveDate) -> Vec<FieldProposal> {
    let stage = workflow.stage();
    let mut out = Vec::new();

    if stage == Stage::Locate {
        if let Some(caps) = booking_ref_re().captures(text) {
            out.push(FieldProposal::new(
                Field::BookingRef,
                format!("HB-{}", caps[1].to_uppercase()),
            ));
        } else {
            let trimmed = text.trim().trim_end_matches(['.', '!']);
            if token_re().is_match(trimmed) && trimmed.chars().any(|c| c.is_ascii_digit()) {
                out.push(FieldProposal::new(Field::BookingRef, trimmed.to_uppercase()));
            }
        }
        return out;
    }

    parse_dates(workflow, text, today, &mut out);
    parse_room(stage, text, &mut out);
    parse_party(stage, text, &mut out);
    parse_contact(stage, text, &mut out);
    out
}

fn month_number(name: &str) -> Option<u32> {
    let key: String = name.to_lowercase().chars().take(3).collect();
    let n = match key.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(n)
}

/// Builds a date; a missing year means the next occurrence on or after today.
fn resolve(year: Option<i32>, month: u32, day: u32, today: NaiveDate) -> Option<NaiveDate> {
    match year {
        Some(y) => NaiveDate::from_ymd_opt(if y < 100 { 2000 + y } else { y }, month, day),
        None => {
            let this_year = NaiveDate::from_ymd_opt(today.year(), month, day);
            match this_year {
                Some(d) if d >= today => Some(d),
                _ => NaiveDate::from_ymd_opt(today.year() + 1, month, day),
            }
        }
    }
}

fn year_of(caps: &Captures, idx: usize) -> Option<i32> {
    caps.get(idx).and_then(|m| m.as_str().parse().ok())
}

fn parse_dates(workflow: &Workflow, text: &str, today: NaiveDate, out: &mut Vec<FieldProposal>) {
    let mut found: Vec<(usize, NaiveDate)> = Vec::new();

    for caps in iso_date_re().captures_iter(text) {
        let (Ok(y), Ok(m), Ok(d)) = (caps[1].parse(), caps[2].parse(), caps[3].parse()) else {
            continue;
        };
        if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
            found.push((caps.get(0).map_or(0, |m| m.start()), date));
        }
    }

    for caps in slash_date_re().captures_iter(text) {
        let (Ok(m), Ok(d)) = (caps[1].parse(), caps[2].parse()) else {
            continue;
        };
        if let Some(date) = resolve(year_of(&caps, 3), m, d, today) {
            found.push((caps.get(0).map_or(0, |m| m.start()), date));
        }
    }

    for caps in month_date_re().captures_iter(text) {
        let Some(month) = month_number(&caps[1]) else {
            continue;
        };
        let Ok(day) = caps[2].parse() else {
            continue;
        };
        let year = year_of(&caps, 3);
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if let Some(date) = resolve(year, month, day, today) {
            found.push((whole.start(), date));
            // "June 10-14" / "June 10 to 14": the tail shares the month.
            if let Some(tail) = range_tail_re().captures(&text[whole.end()..]) {
                if let Some(end) = tail[1]
                    .parse()
                    .ok()
                    .and_then(|d| NaiveDate::from_ymd_opt(date.year(), month, d))
                {
                    found.push((whole.end() + 1, end));
                }
            }
        }
    }

    for caps in day_month_re().captures_iter(text) {
        let (Ok(day), Some(month)) = (caps[1].parse(), month_number(&caps[2])) else {
            continue;
        };
        if let Some(date) = resolve(year_of(&caps, 3), month, day, today) {
            found.push((caps.get(0).map_or(0, |m| m.start()), date));
        }
    }

    let lower = text.to_lowercase();
    if let Some(pos) = lower.find("today") {
        found.push((pos, today));
    }
    if let Some(pos) = lower.find("tomorrow") {
        found.push((pos, today + Duration::days(1)));
    }

    found.sort_by_key(|(pos, _)| *pos);
    found.dedup_by_key(|(_, date)| *date);

    let draft = workflow.draft();
    let checkout_cue = ["check out", "checkout", "check-out", "leave", "leaving", "depart"]
        .iter()
        .any(|cue| lower.contains(cue));

    match found.as_slice() {
        [] => {
            // "actually make it the 12th": a bare day corrects an existing date.
            if !signals_correction(text) {
                return;
            }
            let Some(caps) = day_only_re().captures(text) else {
                return;
            };
            let Ok(day) = caps[1].parse::<u32>() else {
                return;
            };
            let (field, anchor) = if checkout_cue {
                (Field::CheckOut, draft.check_out.or(draft.check_in))
            } else {
                (Field::CheckIn, draft.check_in)
            };
            if let Some(date) = anchor.and_then(|a| NaiveDate::from_ymd_opt(a.year(), a.month(), day)) {
                out.push(FieldProposal::new(field, date.to_string()));
            }
        }
        [(_, single)] => {
            let field = if checkout_cue || (draft.check_in.is_some() && draft.check_out.is_none()) {
                Field::CheckOut
            } else {
                Field::CheckIn
            };
            out.push(FieldProposal::new(field, single.to_string()));
            if field == Field::CheckIn {
                if let Some(nights) = stated_nights(text) {
                    out.push(FieldProposal::new(
                        Field::CheckOut,
                        (*single + Duration::days(nights)).to_string(),
                    ));
                }
            }
        }
        [(_, first), (_, second), ..] => {
            out.push(FieldProposal::new(Field::CheckIn, first.to_string()));
            out.push(FieldProposal::new(Field::CheckOut, second.to_string()));
        }
    }
}

fn stated_nights(text: &str) -> Option<i64> {
    let caps = nights_re().captures(text)?;
    let raw = &caps[1];
    raw.parse::<i64>()
        .ok()
        .or_else(|| number_word(raw).map(i64::from))
        .filter(|n| *n > 0)
}

fn is_small_talk(text: &str) -> bool {
    let lower = text.trim().trim_end_matches(['.', '!', '?']).to_lowercase();
    SMALL_TALK.contains(&lower.as_str())
}

fn parse_room(stage: Stage, text: &str, out: &mut Vec<FieldProposal>) {
    if let Some(room) = RoomType::find_in_text(text) {
        out.push(FieldProposal::new(Field::RoomType, room.as_str()));
        return;
    }
    if let Some(caps) = unknown_room_re().captures(text) {
        let word = caps[1].to_lowercase();
        if !matches!(
            word.as_str(),
            "a" | "the"
                | "one"
                | "any"
                | "which"
                | "what"
                | "my"
                | "our"
                | "your"
                | "his"
                | "her"
                | "their"
                | "same"
                | "another"
                | "other"
                | "this"
                | "that"
        ) {
            out.push(FieldProposal::new(Field::RoomType, word));
            return;
        }
    }
    let trimmed = text.trim();
    if stage == Stage::CollectRoomType
        && !trimmed.is_empty()
        && !is_small_talk(trimmed)
        && trimmed.split_whitespace().count() <= 2
        && trimmed.chars().all(|c| c.is_alphabetic() || c.is_whitespace())
    {
        out.push(FieldProposal::new(Field::RoomType, trimmed));
    }
}

fn parse_party(stage: Stage, text: &str, out: &mut Vec<FieldProposal>) {
    let lower = text.to_lowercase();
    if let Some(caps) = adults_re().captures(text) {
        out.push(FieldProposal::new(Field::Adults, count_value(&caps[1])));
    } else if ["just me", "only me", "myself", "by myself", "alone"]
        .iter()
        .any(|p| lower.contains(p))
    {
        out.push(FieldProposal::new(Field::Adults, "1"));
    } else if stage == Stage::CollectParty {
        let trimmed = text.trim().trim_end_matches('.');
        if trimmed.parse::<i64>().is_ok() || number_word(trimmed).is_some() {
            out.push(FieldProposal::new(Field::Adults, trimmed));
        }
    }

    if let Some(caps) = children_re().captures(text) {
        out.push(FieldProposal::new(Field::Children, count_value(&caps[1])));
    } else if ["no kids", "no children", "without kids", "without children"]
        .iter()
        .any(|p| lower.contains(p))
    {
        out.push(FieldProposal::new(Field::Children, "0"));
    }
}

fn count_value(raw: &str) -> String {
    number_word(raw)
        .map(|n| n.to_string())
        .unwrap_or_else(|| raw.to_string())
}

const NAME_STOP_WORDS: &[&str] = &[
    "and", "my", "email", "e-mail", "phone", "number", "is", "at", "with", "for", "please",
];

fn trim_name(raw: &str) -> Option<String> {
    let words: Vec<&str> = raw
        .split_whitespace()
        .take_while(|w| !NAME_STOP_WORDS.contains(&w.to_lowercase().as_str()))
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

fn parse_contact(stage: Stage, text: &str, out: &mut Vec<FieldProposal>) {
    let email = email_re().find(text);
    if let Some(m) = email {
        out.push(FieldProposal::new(Field::GuestEmail, m.as_str()));
    }
    let phone = phone_re().find(text);
    if let Some(m) = phone {
        out.push(FieldProposal::new(Field::GuestPhone, m.as_str().trim()));
    }

    if let Some(caps) = stated_name_re().captures(text) {
        let raw = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
        if let Some(name) = raw.and_then(trim_name) {
            out.push(FieldProposal::new(Field::GuestName, name));
            return;
        }
    }

    if stage != Stage::CollectContact {
        return;
    }
    // A bare name next to the contact details: "Ada Lovelace, ada@example.com".
    let mut rest = text.to_string();
    for m in [email, phone].into_iter().flatten() {
        rest = rest.replace(m.as_str(), ",");
    }
    let bare = rest
        .split([',', ';', '\n'])
        .map(|s| s.trim().trim_end_matches('.'))
        .find(|segment| {
            let words = segment.split_whitespace().count();
            (1..=4).contains(&words)
                && !is_small_talk(segment)
                && segment
                    .chars()
                    .all(|c| c.is_alphabetic() || c.is_whitespace() || c == '\'' || c == '-')
        });
    if let Some(name) = bare.and_then(trim_name) {
        out.push(FieldProposal::new(Field::GuestName, name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkflowKind;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 1).unwrap()
    }

    fn value(proposals: &[FieldProposal], field: Field) -> Option<&str> {
        proposals
            .iter()
            .find(|p| p.field == field)
            .map(|p| p.value.as_str())
    }

    #[test]
    fn test_one_pass_extraction() {
        let wf = Workflow::new_booking();
        let got = extract(&wf, "2 adults, deluxe room, June 10 to June 14", &[], today());
        assert_eq!(value(&got, Field::Adults), Some("2"));
        assert_eq!(value(&got, Field::RoomType), Some("deluxe"));
        assert_eq!(value(&got, Field::CheckIn), Some("2025-06-10"));
        assert_eq!(value(&got, Field::CheckOut), Some("2025-06-14"));
    }

    #[test]
    fn test_short_range_and_nights() {
        let wf = Workflow::new_booking();
        let got = extract(&wf, "june 10-14 please", &[], today());
        assert_eq!(value(&got, Field::CheckIn), Some("2025-06-10"));
        assert_eq!(value(&got, Field::CheckOut), Some("2025-06-14"));

        let got = extract(&wf, "arriving 2025-07-01 for 3 nights", &[], today());
        assert_eq!(value(&got, Field::CheckOut), Some("2025-07-04"));
    }

    #[test]
    fn test_yearless_date_rolls_forward() {
        let wf = Workflow::new_booking();
        let got = extract(&wf, "March 3 to March 5", &[], today());
        assert_eq!(value(&got, Field::CheckIn), Some("2026-03-03"));
    }

    #[test]
    fn test_single_date_fills_checkout_when_checkin_known() {
        let mut wf = Workflow::new_booking();
        wf.draft_mut().check_in = NaiveDate::from_ymd_opt(2025, 6, 10);
        let got = extract(&wf, "6/14/2025", &[], today());
        assert_eq!(value(&got, Field::CheckOut), Some("2025-06-14"));
        assert_eq!(value(&got, Field::CheckIn), None);
    }

    #[test]
    fn test_small_talk_proposes_nothing() {
        let mut wf = Workflow::new_booking();
        assert!(extract(&wf, "hello!", &[], today()).is_empty());
        wf.set_stage(Stage::CollectRoomType);
        assert!(extract(&wf, "thanks", &[], today()).is_empty());
    }

    #[test]
    fn test_accepted_fields_not_overwritten_without_correction() {
        let mut wf = Workflow::new_booking();
        wf.draft_mut().check_in = NaiveDate::from_ymd_opt(2025, 6, 10);
        wf.draft_mut().check_out = NaiveDate::from_ymd_opt(2025, 6, 14);
        wf.set_stage(Stage::CollectRoomType);
        let got = extract(&wf, "June 20 to June 22, suite", &[], today());
        assert_eq!(value(&got, Field::CheckIn), None);
        assert_eq!(value(&got, Field::RoomType), Some("suite"));
    }

    #[test]
    fn test_correction_reopens_accepted_field() {
        let mut wf = Workflow::new_booking();
        wf.draft_mut().check_in = NaiveDate::from_ymd_opt(2025, 6, 10);
        wf.draft_mut().check_out = NaiveDate::from_ymd_opt(2025, 6, 14);
        wf.set_stage(Stage::CollectRoomType);
        let got = extract(&wf, "actually make it the 12th", &[], today());
        let check_in = got.iter().find(|p| p.field == Field::CheckIn).unwrap();
        assert_eq!(check_in.value, "2025-06-12");
        assert!(check_in.correction);
    }

    #[test]
    fn test_reschedule_cannot_correct_room() {
        let mut wf = Workflow::reschedule();
        wf.draft_mut().original_booking_ref = Some("HB-0000ABCD".to_string());
        wf.draft_mut().room_type = Some(RoomType::Standard);
        wf.set_stage(Stage::CollectDates);
        assert_eq!(wf.kind(), WorkflowKind::Reschedule);
        let got = extract(&wf, "actually make it a suite, June 3 to June 5", &[], today());
        assert_eq!(value(&got, Field::RoomType), None);
        assert_eq!(value(&got, Field::CheckIn), Some("2025-06-03"));
    }

    #[test]
    fn test_remote_proposals_win_and_are_filtered() {
        let wf = Workflow::new_booking();
        let remote = vec![
            FieldProposal::new(Field::RoomType, "suite"),
            FieldProposal::new(Field::BookingRef, "HB-12345678"),
            FieldProposal::new(Field::Adults, "null"),
        ];
        let got = extract(&wf, "deluxe for 2 adults", &remote, today());
        assert_eq!(value(&got, Field::RoomType), Some("suite"));
        assert_eq!(value(&got, Field::BookingRef), None);
        assert_eq!(value(&got, Field::Adults), Some("2"));
    }

    #[test]
    fn test_contact_details() {
        let mut wf = Workflow::new_booking();
        wf.set_stage(Stage::CollectContact);
        let got = extract(&wf, "Ada Lovelace, ada@example.com, +1 555 123 4567", &[], today());
        assert_eq!(value(&got, Field::GuestName), Some("Ada Lovelace"));
        assert_eq!(value(&got, Field::GuestEmail), Some("ada@example.com"));
        assert_eq!(value(&got, Field::GuestPhone), Some("+1 555 123 4567"));

        let got = extract(&wf, "my name is Grace Hopper and my email is grace@navy.mil", &[], today());
        assert_eq!(value(&got, Field::GuestName), Some("Grace Hopper"));
    }

    #[test]
    fn test_party_words() {
        let mut wf = Workflow::new_booking();
        wf.set_stage(Stage::CollectParty);
        let got = extract(&wf, "two adults and no kids", &[], today());
        assert_eq!(value(&got, Field::Adults), Some("2"));
        assert_eq!(value(&got, Field::Children), Some("0"));

        let got = extract(&wf, "3", &[], today());
        assert_eq!(value(&got, Field::Adults), Some("3"));
    }

    #[test]
    fn test_locate_reference() {
        let wf = Workflow::reschedule();
        let got = extract(&wf, "my booking is hb-1a2b3c4d", &[], today());
        assert_eq!(value(&got, Field::BookingRef), Some("HB-1A2B3C4D"));

        let got = extract(&wf, "XYZ999", &[], today());
        assert_eq!(value(&got, Field::BookingRef), Some("XYZ999"));

        assert!(extract(&wf, "I don't remember", &[], today()).is_empty());
    }

    #[test]
    fn test_flagged_backend_correction_reopens_field() {
        let mut wf = Workflow::new_booking();
        wf.draft_mut().check_in = NaiveDate::from_ymd_opt(2025, 6, 10);
        wf.draft_mut().check_out = NaiveDate::from_ymd_opt(2025, 6, 14);
        wf.set_stage(Stage::CollectRoomType);

        let unflagged = vec![FieldProposal::new(Field::CheckIn, "2025-06-12")];
        let got = extract(&wf, "the 12th works better", &unflagged, today());
        assert_eq!(value(&got, Field::CheckIn), None);

        let flagged = vec![FieldProposal {
            correction: true,
            ..FieldProposal::new(Field::CheckIn, "2025-06-12")
        }];
        let got = extract(&wf, "the 12th works better", &flagged, today());
        assert_eq!(value(&got, Field::CheckIn), Some("2025-06-12"));

        // Still limited to what the workflow lets the guest correct.
        let mut rs = Workflow::reschedule();
        rs.draft_mut().original_booking_ref = Some("HB-0000ABCD".to_string());
        rs.draft_mut().room_type = Some(RoomType::Standard);
        rs.set_stage(Stage::CollectDates);
        let flagged_room = vec![FieldProposal {
            correction: true,
            ..FieldProposal::new(Field::RoomType, "suite")
        }];
        assert_eq!(value(&extract(&rs, "a suite", &flagged_room, today()), Field::RoomType), None);
    }

    #[test]
    fn test_possessive_room_mentions_are_not_room_types() {
        let wf = Workflow::new_booking();
        for text in ["is my room quiet", "we want our room high up", "same room as last time", "another room"] {
            let got = extract(&wf, text, &[], today());
            assert_eq!(value(&got, Field::RoomType), None, "text: {text}");
        }
    }

    #[test]
    fn test_unknown_room_is_proposed_for_rejection() {
        let mut wf = Workflow::new_booking();
        wf.set_stage(Stage::CollectRoomType);
        let got = extract(&wf, "penthouse", &[], today());
        assert_eq!(value(&got, Field::RoomType), Some("penthouse"));
    }
}
