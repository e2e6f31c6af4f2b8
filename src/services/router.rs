use std::sync::OnceLock;

use regex::Regex;

use crate::models::{Intent, IntentLabel, QuestionTopic, Understanding};
use crate::services::extractor::signals_correction;

fn cancel_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(cancel|stop|abort|quit|nevermind|never mind|start over|forget it)\b")
            .expect("static cancel pattern")
    })
}

fn reschedule_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(reschedul\w*|(change|move|modify|update) (my|the|our) (booking|reservation|stay|dates))\b")
            .expect("static reschedule pattern")
    })
}

fn booking_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(book|reserve|reservation|need a room|want a room|get a room|stay with you)\b")
            .expect("static booking pattern")
    })
}

/// Explicit abandonment, recognised without the understanding backend so the
/// abort path works even when it is down. Questions about the cancellation
/// policy are not requests to cancel.
pub fn is_cancel_request(text: &str) -> bool {
    let lower = text.to_lowercase();
    cancel_re().is_match(text)
        && !lower.contains("polic")
        && !lower.contains("refund")
        && !lower.trim_end().ends_with('?')
}

const YES: &[&str] = &[
    "yes", "y", "yeah", "yep", "yup", "sure", "ok", "okay", "correct", "confirm", "confirmed",
    "right", "perfect", "absolutely", "definitely", "great",
];
const YES_PHRASES: &[&str] = &[
    "sounds good", "looks good", "looks right", "that's right", "thats right", "go ahead",
    "book it", "all good", "that's correct", "do it",
];
/// Politeness that may trail or pad a bare yes.
const FILLER: &[&str] = &["please", "thanks", "thank", "you", "so", "much"];
const NO: &[&str] = &["no", "n", "nope", "nah", "wrong", "incorrect", "not"];
const NO_PHRASES: &[&str] = &["that's wrong", "not right", "not correct", "change something"];

/// Local yes/no reading of a reply to a summary. A yes counts only when the
/// whole reply is affirmative words and politeness; anything carrying a
/// correction or a further request is left to field extraction.
pub fn affirmation(text: &str) -> Option<bool> {
    let lower = text.trim().to_lowercase();
    if NO_PHRASES.iter().any(|p| lower.contains(p)) {
        return Some(false);
    }
    if signals_correction(text) {
        return None;
    }
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();
    let first = words.first()?;
    if NO.contains(first) {
        return Some(false);
    }

    let mut i = 0;
    let mut affirmed = false;
    while i < words.len() {
        let phrase = YES_PHRASES.iter().find_map(|p| {
            let parts: Vec<&str> = p.split(' ').collect();
            words[i..].starts_with(&parts).then_some(parts.len())
        });
        if let Some(len) = phrase {
            affirmed = true;
            i += len;
        } else if YES.contains(&words[i]) {
            affirmed = true;
            i += 1;
        } else if FILLER.contains(&words[i]) {
            i += 1;
        } else {
            return None;
        }
    }
    affirmed.then_some(true)
}

/// Picks a workflow for a turn that arrived with none active.
pub struct IntentRouter {
    min_confidence: f32,
}

impl IntentRouter {
    pub fn new(min_confidence: f32) -> Self {
        Self { min_confidence }
    }

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    /// A backend label is only trusted at or above the confidence floor.
    /// Below it, only unambiguous local phrasing starts a workflow; otherwise
    /// the guest is asked to clarify.
    pub fn classify(&self, text: &str, understanding: &Understanding) -> Intent {
        if is_cancel_request(text) {
            return Intent::Cancel;
        }

        if understanding.confidence >= self.min_confidence {
            let topic_hint = || understanding.topic.clone().unwrap_or_else(|| text.to_string());
            match understanding.intent {
                Some(IntentLabel::Book) => return Intent::NewBooking,
                Some(IntentLabel::Reschedule) => return Intent::Reschedule,
                Some(IntentLabel::Question) => {
                    return Intent::Question {
                        topic_hint: topic_hint(),
                    }
                }
                Some(IntentLabel::Cancel) => return Intent::Cancel,
                _ => {}
            }
        } else if understanding.intent.is_some() {
            tracing::debug!(
                confidence = understanding.confidence,
                floor = self.min_confidence,
                "understanding below confidence floor"
            );
        }

        self.classify_locally(text)
    }

    fn classify_locally(&self, text: &str) -> Intent {
        if reschedule_re().is_match(text) {
            return Intent::Reschedule;
        }
        if text.contains('?') && QuestionTopic::from_hint(text).is_some() {
            return Intent::Question {
                topic_hint: text.to_string(),
            };
        }
        if booking_re().is_match(text) {
            return Intent::NewBooking;
        }
        Intent::Unknown
    }
}
