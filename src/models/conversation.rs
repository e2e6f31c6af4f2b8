use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::{Field, NewReservation, RoomType, StayDates};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Locate,
    CollectDates,
    CollectRoomType,
    CollectParty,
    CollectContact,
    Summarize,
    Committed,
    Aborted,
}

impl Stage {
    /// Fixed collection order shared by both booking workflows.
    pub const COLLECTION_ORDER: [Stage; 4] = [
        Stage::CollectDates,
        Stage::CollectRoomType,
        Stage::CollectParty,
        Stage::CollectContact,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Locate => "locate",
            Stage::CollectDates => "collect_dates",
            Stage::CollectRoomType => "collect_room_type",
            Stage::CollectParty => "collect_party",
            Stage::CollectContact => "collect_contact",
            Stage::Summarize => "summarize",
            Stage::Committed => "committed",
            Stage::Aborted => "aborted",
        }
    }

    /// Fields this stage is responsible for collecting.
    pub fn fields(&self) -> &'static [Field] {
        match self {
            Stage::Locate => &[Field::BookingRef],
            Stage::CollectDates => &[Field::CheckIn, Field::CheckOut],
            Stage::CollectRoomType => &[Field::RoomType],
            Stage::CollectParty => &[Field::Adults, Field::Children],
            Stage::CollectContact => &[Field::GuestName, Field::GuestEmail, Field::GuestPhone],
            Stage::Summarize | Stage::Committed | Stage::Aborted => &[],
        }
    }

    /// Whether the draft already holds everything this stage requires.
    /// Children default to zero and the phone number is optional.
    pub fn is_satisfied(&self, draft: &BookingDraft) -> bool {
        match self {
            Stage::Locate => draft.original_booking_ref.is_some(),
            Stage::CollectDates => draft.check_in.is_some() && draft.check_out.is_some(),
            Stage::CollectRoomType => draft.room_type.is_some(),
            Stage::CollectParty => draft.adults.is_some(),
            Stage::CollectContact => draft.guest_name.is_some() && draft.guest_email.is_some(),
            Stage::Summarize => draft.confirmed,
            Stage::Committed | Stage::Aborted => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    NewBooking,
    Reschedule,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::NewBooking => "new_booking",
            WorkflowKind::Reschedule => "reschedule",
        }
    }

    /// Fields a guest may overwrite once they have been accepted. A
    /// reschedule only ever moves the dates of an existing reservation.
    pub fn correctable_fields(&self) -> &'static [Field] {
        match self {
            WorkflowKind::NewBooking => &[
                Field::CheckIn,
                Field::CheckOut,
                Field::RoomType,
                Field::Adults,
                Field::Children,
                Field::GuestName,
                Field::GuestEmail,
                Field::GuestPhone,
            ],
            WorkflowKind::Reschedule => &[Field::CheckIn, Field::CheckOut],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BookingDraft {
    pub booking_id: Option<String>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub room_type: Option<RoomType>,
    pub adults: Option<u32>,
    pub children: Option<u32>,
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
    pub guest_phone: Option<String>,
    pub original_booking_ref: Option<String>,
    pub confirmed: bool,
    /// Set after the guest rejects the summary; every correctable field is
    /// open for change until the next summary.
    #[serde(default)]
    pub revising: bool,
}

impl BookingDraft {
    pub fn is_set(&self, field: Field) -> bool {
        match field {
            Field::CheckIn => self.check_in.is_some(),
            Field::CheckOut => self.check_out.is_some(),
            Field::RoomType => self.room_type.is_some(),
            Field::Adults => self.adults.is_some(),
            Field::Children => self.children.is_some(),
            Field::GuestName => self.guest_name.is_some(),
            Field::GuestEmail => self.guest_email.is_some(),
            Field::GuestPhone => self.guest_phone.is_some(),
            Field::BookingRef => self.original_booking_ref.is_some(),
        }
    }

    pub fn stay(&self) -> Option<StayDates> {
        Some(StayDates {
            check_in: self.check_in?,
            check_out: self.check_out?,
        })
    }

    pub fn nights(&self) -> Option<i64> {
        self.stay().map(|s| (s.check_out - s.check_in).num_days())
    }

    pub fn to_new_reservation(&self) -> Option<NewReservation> {
        let stay = self.stay()?;
        Some(NewReservation {
            guest_name: self.guest_name.clone()?,
            guest_email: self.guest_email.clone()?,
            guest_phone: self.guest_phone.clone(),
            room_type: self.room_type?,
            adults: self.adults?,
            children: self.children.unwrap_or(0),
            check_in: stay.check_in,
            check_out: stay.check_out,
        })
    }

    pub fn summary(&self) -> String {
        let dates = match self.stay() {
            Some(s) => format!(
                "{} to {} ({} night{})",
                s.check_in.format("%a %b %-d, %Y"),
                s.check_out.format("%a %b %-d, %Y"),
                self.nights().unwrap_or(0),
                if self.nights() == Some(1) { "" } else { "s" }
            ),
            None => "not set".to_string(),
        };
        let room = self
            .room_type
            .map(|r| r.display_name().to_string())
            .unwrap_or_else(|| "not set".to_string());
        let mut lines = vec![
            format!("Dates: {dates}"),
            format!("Room: {room}"),
            format!(
                "Guests: {} adult(s), {} child(ren)",
                self.adults.unwrap_or(0),
                self.children.unwrap_or(0)
            ),
            format!("Name: {}", self.guest_name.as_deref().unwrap_or("not set")),
            format!("Email: {}", self.guest_email.as_deref().unwrap_or("not set")),
        ];
        if let Some(phone) = &self.guest_phone {
            lines.push(format!("Phone: {phone}"));
        }
        if let (Some(room), Some(nights)) = (self.room_type, self.nights()) {
            lines.push(format!(
                "Total: ${:.2} ({} x ${:.2}/night)",
                room.nightly_rate() * nights as f64,
                nights,
                room.nightly_rate()
            ));
        }
        if let Some(reference) = &self.original_booking_ref {
            lines.insert(0, format!("Reservation: {reference}"));
        }
        lines.join("\n")
    }
}

/// Active workflow for a session. Questions are answered within a single
/// turn and never occupy the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Workflow {
    NewBooking {
        stage: Stage,
        draft: BookingDraft,
    },
    Reschedule {
        stage: Stage,
        draft: BookingDraft,
        locate_attempts: u32,
        original_version: Option<i64>,
    },
}

impl Workflow {
    pub fn new_booking() -> Self {
        Workflow::NewBooking {
            stage: Stage::CollectDates,
            draft: BookingDraft::default(),
        }
    }

    pub fn reschedule() -> Self {
        Workflow::Reschedule {
            stage: Stage::Locate,
            draft: BookingDraft::default(),
            locate_attempts: 0,
            original_version: None,
        }
    }

    pub fn kind(&self) -> WorkflowKind {
        match self {
            Workflow::NewBooking { .. } => WorkflowKind::NewBooking,
            Workflow::Reschedule { .. } => WorkflowKind::Reschedule,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Workflow::NewBooking { stage, .. } | Workflow::Reschedule { stage, .. } => *stage,
        }
    }

    pub fn set_stage(&mut self, next: Stage) {
        match self {
            Workflow::NewBooking { stage, .. } | Workflow::Reschedule { stage, .. } => *stage = next,
        }
    }

    pub fn draft(&self) -> &BookingDraft {
        match self {
            Workflow::NewBooking { draft, .. } | Workflow::Reschedule { draft, .. } => draft,
        }
    }

    pub fn draft_mut(&mut self) -> &mut BookingDraft {
        match self {
            Workflow::NewBooking { draft, .. } | Workflow::Reschedule { draft, .. } => draft,
        }
    }

    /// First stage, in the fixed order, whose fields are still missing.
    pub fn next_incomplete_stage(&self) -> Stage {
        let draft = self.draft();
        if self.kind() == WorkflowKind::Reschedule && !Stage::Locate.is_satisfied(draft) {
            return Stage::Locate;
        }
        Stage::COLLECTION_ORDER
            .into_iter()
            .find(|stage| !stage.is_satisfied(draft))
            .unwrap_or(Stage::Summarize)
    }

    /// Missing fields owed by the current stage and every stage after it.
    pub fn open_fields(&self) -> Vec<Field> {
        let current = self.stage();
        let draft = self.draft();
        if current == Stage::Locate {
            return vec![Field::BookingRef];
        }
        let start = Stage::COLLECTION_ORDER
            .iter()
            .position(|s| *s == current)
            .unwrap_or(0);
        Stage::COLLECTION_ORDER[start..]
            .iter()
            .flat_map(|s| s.fields().iter().copied())
            .filter(|f| !draft.is_set(*f))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    Prompt,
    Rejection,
    Summary,
    Committed,
    Aborted,
    Answer,
    Clarify,
    RetryLater,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundMessage {
    pub text: String,
    pub kind: ReplyKind,
    /// Stage reached by this turn; `idle` when no workflow remains active.
    pub stage: String,
    pub workflow: Option<WorkflowKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitReceipt {
    pub booking_id: String,
    pub workflow: WorkflowKind,
    pub confirmation: String,
    pub committed_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnRecord {
    pub turn_id: String,
    pub reply: OutboundMessage,
}

/// Per-chat-identity conversation state. Serializes to the snapshot exposed
/// for debugging and stored between turns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationSession {
    pub session_id: String,
    pub workflow: Option<Workflow>,
    pub history: Vec<ConversationMessage>,
    #[serde(default)]
    pub last_commit: Option<CommitReceipt>,
    #[serde(default)]
    pub recent_turns: Vec<TurnRecord>,
    pub updated_at: NaiveDateTime,
}

impl ConversationSession {
    pub fn new(session_id: &str, now: NaiveDateTime) -> Self {
        Self {
            session_id: session_id.to_string(),
            workflow: None,
            history: Vec::new(),
            last_commit: None,
            recent_turns: Vec::new(),
            updated_at: now,
        }
    }

    pub fn stage_label(&self) -> &'static str {
        self.workflow
            .as_ref()
            .map(|w| w.stage().as_str())
            .unwrap_or("idle")
    }

    pub fn is_expired(&self, now: NaiveDateTime, ttl: Duration) -> bool {
        now - self.updated_at > ttl
    }

    pub fn push_history(&mut self, role: &str, content: &str, limit: usize) {
        self.history.push(ConversationMessage {
            role: role.to_string(),
            content: content.to_string(),
        });
        if self.history.len() > limit {
            let overflow = self.history.len() - limit;
            self.history.drain(..overflow);
        }
    }

    pub fn cached_reply(&self, turn_id: &str) -> Option<&OutboundMessage> {
        self.recent_turns
            .iter()
            .find(|t| t.turn_id == turn_id)
            .map(|t| &t.reply)
    }

    pub fn remember_turn(&mut self, turn_id: &str, reply: &OutboundMessage, limit: usize) {
        self.recent_turns.push(TurnRecord {
            turn_id: turn_id.to_string(),
            reply: reply.clone(),
        });
        if self.recent_turns.len() > limit {
            let overflow = self.recent_turns.len() - limit;
            self.recent_turns.drain(..overflow);
        }
    }
}
