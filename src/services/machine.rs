//! The booking conversation state machine. One call to [`BookingMachine::step`]
//! consumes one inbound turn for one session and produces exactly one reply.
//!
//! The machine owns workflow progression. The understanding backend only
//! proposes an intent and raw field values; every value is validated here and
//! stages always advance in the fixed collection order.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};

use crate::config::ConversationConfig;
use crate::errors::{BackendError, RepositoryError};
use crate::models::{
    BookingDraft, CommitReceipt, ConversationSession, Field, FieldProposal, Intent, IntentLabel,
    OutboundMessage, QuestionTopic, ReplyKind, RoomType, Stage, Understanding, Workflow,
    WorkflowKind,
};
use crate::services::ai::{TextUnderstanding, UnderstandingRequest};
use crate::services::backend::CallPolicy;
use crate::services::extractor;
use crate::services::hotel::HotelFacts;
use crate::services::reservations::ReservationRepository;
use crate::services::router::{affirmation, is_cancel_request, IntentRouter};
use crate::services::validation::{self, ValidationOutcome};

const DATE: &str = "%b %-d, %Y";

const MENU: &str = "I can book a room, change the dates of an existing reservation, or answer \
questions about amenities, check-in/check-out times, our location, the cancellation policy, \
pets and parking. What would you like to do?";

/// Result of advancing an active workflow by one turn.
enum Turn {
    Active(OutboundMessage),
    Committed(CommitReceipt, OutboundMessage),
    Aborted(OutboundMessage),
}

struct Rejection {
    field: Field,
    reason: String,
}

pub struct BookingMachine {
    understanding: Arc<dyn TextUnderstanding>,
    reservations: Arc<dyn ReservationRepository>,
    facts: Arc<dyn HotelFacts>,
    router: IntentRouter,
    policy: CallPolicy,
    max_stay_nights: i64,
    locate_max_attempts: u32,
    hotel_name: String,
}

impl BookingMachine {
    pub fn new(
        understanding: Arc<dyn TextUnderstanding>,
        reservations: Arc<dyn ReservationRepository>,
        facts: Arc<dyn HotelFacts>,
        config: &ConversationConfig,
        hotel_name: &str,
    ) -> Self {
        Self {
            understanding,
            reservations,
            facts,
            router: IntentRouter::new(config.min_intent_confidence),
            policy: CallPolicy::from_config(config),
            max_stay_nights: config.max_stay_nights,
            locate_max_attempts: config.locate_max_attempts,
            hotel_name: hotel_name.to_string(),
        }
    }

    /// Consumes one turn. On `Err` the caller must discard every change made
    /// to `session`: the turn counts as unanswered.
    pub async fn step(
        &self,
        session: &mut ConversationSession,
        text: &str,
        now: NaiveDateTime,
    ) -> Result<OutboundMessage, BackendError> {
        let text = text.trim();
        let today = now.date();

        let Some(mut wf) = session.workflow.take() else {
            return self.idle_turn(session, text, now).await;
        };

        match self.advance(&mut wf, session, text, today, now).await {
            Ok(Turn::Active(reply)) => {
                session.workflow = Some(wf);
                Ok(reply)
            }
            Ok(Turn::Committed(receipt, reply)) => {
                session.last_commit = Some(receipt);
                Ok(reply)
            }
            Ok(Turn::Aborted(reply)) => Ok(reply),
            Err(e) => {
                session.workflow = Some(wf);
                Err(e)
            }
        }
    }

    async fn understand(
        &self,
        workflow: Option<&Workflow>,
        session: &ConversationSession,
        text: &str,
        schema: &[Field],
        today: NaiveDate,
    ) -> Result<Understanding, BackendError> {
        let request = UnderstandingRequest {
            workflow,
            history: &session.history,
            text,
            schema,
            today,
        };
        self.policy
            .guarded("understanding", || self.understanding.understand(&request))
            .await
    }

    // ── Idle ──

    async fn idle_turn(
        &self,
        session: &mut ConversationSession,
        text: &str,
        now: NaiveDateTime,
    ) -> Result<OutboundMessage, BackendError> {
        let today = now.date();

        // A repeated "yes" after a commit re-sends the receipt instead of booking again.
        if let Some(receipt) = &session.last_commit {
            if affirmation(text) == Some(true) {
                tracing::info!(session_id = %session.session_id, booking_id = %receipt.booking_id, "re-sending commit receipt");
                return Ok(OutboundMessage {
                    text: receipt.confirmation.clone(),
                    kind: ReplyKind::Committed,
                    stage: Stage::Committed.as_str().to_string(),
                    workflow: Some(receipt.workflow),
                    booking_id: Some(receipt.booking_id.clone()),
                });
            }
        }

        let (intent, understanding) = if is_cancel_request(text) {
            (Intent::Cancel, Understanding::default())
        } else {
            let mut schema = Workflow::new_booking().open_fields();
            schema.push(Field::BookingRef);
            let understanding = self.understand(None, session, text, &schema, today).await?;
            (self.router.classify(text, &understanding), understanding)
        };

        tracing::info!(session_id = %session.session_id, intent = intent.as_str(), "routed idle turn");

        match &intent {
            Intent::Cancel => Ok(idle_reply(
                ReplyKind::Prompt,
                format!("There's nothing in progress to cancel. {MENU}"),
            )),
            Intent::Unknown => Ok(idle_reply(ReplyKind::Clarify, MENU.to_string())),
            Intent::Question { topic_hint } => Ok(self.answer(topic_hint, text)),
            Intent::NewBooking | Intent::Reschedule => {
                let mut wf = if intent == Intent::NewBooking {
                    Workflow::new_booking()
                } else {
                    Workflow::reschedule()
                };
                session.last_commit = None;
                tracing::info!(session_id = %session.session_id, workflow = wf.kind().as_str(), "workflow started");

                let turn = if wf.stage() == Stage::Locate {
                    self.locate_turn(&mut wf, text, &understanding, today).await
                } else {
                    self.collect_turn(&mut wf, text, &understanding, today, true).await
                };
                match turn? {
                    Turn::Active(reply) => {
                        session.workflow = Some(wf);
                        Ok(reply)
                    }
                    Turn::Committed(receipt, reply) => {
                        session.last_commit = Some(receipt);
                        Ok(reply)
                    }
                    Turn::Aborted(reply) => Ok(reply),
                }
            }
        }
    }

    fn answer(&self, topic_hint: &str, text: &str) -> OutboundMessage {
        match QuestionTopic::from_hint(topic_hint).or_else(|| QuestionTopic::from_hint(text)) {
            Some(topic) => {
                tracing::info!(topic = topic.as_str(), "answering question");
                idle_reply(ReplyKind::Answer, self.facts.lookup(topic))
            }
            None => idle_reply(
                ReplyKind::Clarify,
                "I can answer questions about amenities, check-in/check-out times, our location, \
                 the cancellation policy, pets and parking. Which would you like to know about?"
                    .to_string(),
            ),
        }
    }

    // ── Active workflow ──

    async fn advance(
        &self,
        wf: &mut Workflow,
        session: &ConversationSession,
        text: &str,
        today: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<Turn, BackendError> {
        if is_cancel_request(text) {
            return Ok(self.abort(wf, &session.session_id));
        }

        // A plain yes/no at the summary needs no backend round trip.
        let local_decision = match wf.stage() {
            Stage::Summarize => affirmation(text),
            _ => None,
        };

        let understanding = if local_decision.is_some() {
            Understanding::default()
        } else {
            let schema = extractor::field_schema(wf, text);
            self.understand(Some(&*wf), session, text, &schema, today).await?
        };

        let confident = understanding.confidence >= self.router.min_confidence();
        if confident && understanding.intent == Some(IntentLabel::Cancel) {
            return Ok(self.abort(wf, &session.session_id));
        }

        match wf.stage() {
            Stage::Locate => self.locate_turn(wf, text, &understanding, today).await,
            Stage::Summarize => {
                let decision = local_decision.or(match understanding.intent {
                    Some(IntentLabel::Confirm) if confident => Some(true),
                    Some(IntentLabel::Decline) if confident => Some(false),
                    _ => None,
                });
                match decision {
                    Some(true) => self.commit(wf, now).await,
                    Some(false) => Ok(Turn::Active(self.reopen(wf))),
                    None => self.collect_turn(wf, text, &understanding, today, false).await,
                }
            }
            Stage::Committed | Stage::Aborted => {
                // Terminal stages never persist; treat a stray one as finished.
                Ok(Turn::Aborted(idle_reply(ReplyKind::Clarify, MENU.to_string())))
            }
            _ => self.collect_turn(wf, text, &understanding, today, false).await,
        }
    }

    fn abort(&self, wf: &Workflow, session_id: &str) -> Turn {
        tracing::info!(session_id, workflow = wf.kind().as_str(), stage = wf.stage().as_str(), "workflow aborted");
        let text = match wf.kind() {
            WorkflowKind::NewBooking => "Okay, I've cancelled that booking request. Nothing was booked.",
            WorkflowKind::Reschedule => {
                "Okay, I've stopped the change request. Your reservation was not modified."
            }
        };
        Turn::Aborted(OutboundMessage {
            text: format!("{text} Let me know if there's anything else I can help with."),
            kind: ReplyKind::Aborted,
            stage: Stage::Aborted.as_str().to_string(),
            workflow: Some(wf.kind()),
            booking_id: None,
        })
    }

    // ── Locate ──

    async fn locate_turn(
        &self,
        wf: &mut Workflow,
        text: &str,
        understanding: &Understanding,
        today: NaiveDate,
    ) -> Result<Turn, BackendError> {
        let proposals = extractor::extract(wf, text, &understanding.field_updates, today);
        let Some(reference) = proposals
            .iter()
            .find(|p| p.field == Field::BookingRef)
            .map(|p| p.value.trim().to_uppercase())
        else {
            return Ok(Turn::Active(active_reply(wf, ReplyKind::Prompt, prompt(wf))));
        };

        let found = self
            .policy
            .guarded("reservations", || self.reservations.find(&reference))
            .await;

        match found {
            Ok(reservation) => {
                tracing::info!(booking_id = %reservation.id, "reservation located");
                let previous = format!(
                    "{} to {}",
                    reservation.check_in.format(DATE),
                    reservation.check_out.format(DATE)
                );
                if let Workflow::Reschedule {
                    draft,
                    original_version,
                    ..
                } = wf
                {
                    draft.original_booking_ref = Some(reservation.id.clone());
                    draft.room_type = Some(reservation.room_type);
                    draft.adults = Some(reservation.adults);
                    draft.children = Some(reservation.children);
                    draft.guest_name = Some(reservation.guest_name.clone());
                    draft.guest_email = Some(reservation.guest_email.clone());
                    draft.guest_phone = reservation.guest_phone.clone();
                    *original_version = Some(reservation.version);
                }
                let next = wf.next_incomplete_stage();
                wf.set_stage(next);
                Ok(Turn::Active(active_reply(
                    wf,
                    ReplyKind::Prompt,
                    format!(
                        "I found reservation {} for {}: {}, {}. {}",
                        reservation.id,
                        reservation.guest_name,
                        reservation.room_type.display_name(),
                        previous,
                        prompt(wf)
                    ),
                )))
            }
            Err(RepositoryError::Backend(e)) => Err(e),
            Err(RepositoryError::NotFound(_) | RepositoryError::Conflict(_)) => {
                let attempts = match wf {
                    Workflow::Reschedule {
                        locate_attempts, ..
                    } => {
                        *locate_attempts += 1;
                        *locate_attempts
                    }
                    Workflow::NewBooking { .. } => self.locate_max_attempts,
                };
                tracing::warn!(reference = %reference, attempts, "reservation not found");

                if attempts >= self.locate_max_attempts {
                    return Ok(Turn::Aborted(OutboundMessage {
                        text: format!(
                            "Sorry, I could not locate a reservation after {attempts} attempts, so I've stopped the change request. \
                             Please contact {} directly and we'll sort it out.",
                            self.hotel_name
                        ),
                        kind: ReplyKind::Aborted,
                        stage: Stage::Aborted.as_str().to_string(),
                        workflow: Some(WorkflowKind::Reschedule),
                        booking_id: None,
                    }));
                }
                let remaining = self.locate_max_attempts - attempts;
                Ok(Turn::Active(active_reply(
                    wf,
                    ReplyKind::Rejection,
                    format!(
                        "I couldn't find an active reservation with reference {reference}. Please double-check it \
                         (it looks like HB-1A2B3C4D). {remaining} attempt(s) left."
                    ),
                )))
            }
        }
    }

    // ── Collection ──

    async fn collect_turn(
        &self,
        wf: &mut Workflow,
        text: &str,
        understanding: &Understanding,
        today: NaiveDate,
        first_turn: bool,
    ) -> Result<Turn, BackendError> {
        let proposals = extractor::extract(wf, text, &understanding.field_updates, today);

        if proposals.is_empty() {
            // An off-topic question mid-workflow gets answered without moving.
            let asked = understanding.intent == Some(IntentLabel::Question)
                && understanding.confidence >= self.router.min_confidence();
            if asked || (text.contains('?') && QuestionTopic::from_hint(text).is_some()) {
                let hint = understanding.topic.clone().unwrap_or_else(|| text.to_string());
                if let Some(topic) = QuestionTopic::from_hint(&hint).or_else(|| QuestionTopic::from_hint(text)) {
                    return Ok(Turn::Active(active_reply(
                        wf,
                        ReplyKind::Answer,
                        format!("{}\n\n{}", self.facts.lookup(topic), prompt(wf)),
                    )));
                }
            }
            if wf.stage().is_satisfied(wf.draft()) && wf.stage() != Stage::Summarize {
                return self.move_forward(wf).await;
            }
            let text = if first_turn {
                opening(wf)
            } else if wf.stage() == Stage::Summarize {
                format!(
                    "{}\n\nPlease reply yes to confirm or no to make changes.",
                    wf.draft().summary()
                )
            } else {
                prompt(wf)
            };
            let kind = if wf.stage() == Stage::Summarize {
                ReplyKind::Summary
            } else {
                ReplyKind::Prompt
            };
            return Ok(Turn::Active(active_reply(wf, kind, text)));
        }

        let rejections = self.apply(wf, &proposals, today);
        tracing::info!(
            workflow = wf.kind().as_str(),
            stage = wf.stage().as_str(),
            proposed = proposals.len(),
            rejected = rejections.len(),
            "applied field proposals"
        );

        if rejections.is_empty() {
            return self.move_forward(wf).await;
        }

        for r in &rejections {
            tracing::warn!(field = r.field.as_str(), reason = %r.reason, "field rejected");
        }
        let reasons = rejections
            .into_iter()
            .map(|r| r.reason)
            .collect::<Vec<_>>()
            .join("\n");

        // A rejection never reopens a satisfied stage: the machine stays put
        // unless the rejection itself emptied an earlier field.
        let next = wf.next_incomplete_stage();
        if next == Stage::Summarize {
            return Ok(match self.move_forward(wf).await? {
                Turn::Active(reply) => Turn::Active(OutboundMessage {
                    text: format!("{reasons}\n\n{}", reply.text),
                    kind: ReplyKind::Rejection,
                    ..reply
                }),
                other => other,
            });
        }
        wf.set_stage(next);
        Ok(Turn::Active(active_reply(wf, ReplyKind::Rejection, reasons)))
    }

    /// Advances to the next incomplete stage, running the availability check
    /// when that stage is the summary.
    async fn move_forward(&self, wf: &mut Workflow) -> Result<Turn, BackendError> {
        let next = wf.next_incomplete_stage();
        if next != Stage::Summarize {
            wf.set_stage(next);
            return Ok(Turn::Active(active_reply(wf, ReplyKind::Prompt, prompt(wf))));
        }

        let (Some(room), Some(stay)) = (wf.draft().room_type, wf.draft().stay()) else {
            wf.set_stage(Stage::CollectDates);
            return Ok(Turn::Active(active_reply(wf, ReplyKind::Prompt, prompt(wf))));
        };
        let exclude = wf.draft().original_booking_ref.clone();
        let available = self
            .policy
            .guarded("reservations", || {
                self.reservations.is_available(room, stay, exclude.as_deref())
            })
            .await
            .map_err(into_backend)?;

        if !available {
            tracing::warn!(room = room.as_str(), check_in = %stay.check_in, "no availability");
            let draft = wf.draft_mut();
            draft.check_in = None;
            draft.check_out = None;
            wf.set_stage(Stage::CollectDates);
            return Ok(Turn::Active(active_reply(
                wf,
                ReplyKind::Rejection,
                format!(
                    "Sorry, the {} is fully booked from {} to {}. Please choose different dates.",
                    room.display_name(),
                    stay.check_in.format(DATE),
                    stay.check_out.format(DATE)
                ),
            )));
        }

        wf.set_stage(Stage::Summarize);
        let draft = wf.draft_mut();
        draft.revising = false;
        draft.confirmed = false;
        let heading = match wf.kind() {
            WorkflowKind::NewBooking => "Here are your booking details:",
            WorkflowKind::Reschedule => "Here is your reservation with the new dates:",
        };
        let question = match wf.kind() {
            WorkflowKind::NewBooking => "Shall I confirm this booking? (yes/no)",
            WorkflowKind::Reschedule => "Shall I move your reservation to these dates? (yes/no)",
        };
        Ok(Turn::Active(active_reply(
            wf,
            ReplyKind::Summary,
            format!("{heading}\n{}\n\n{question}", wf.draft().summary()),
        )))
    }

    /// Applies validated proposals to the draft. Party is applied before the
    /// room so a room that is too small is caught in the same turn.
    fn apply(&self, wf: &mut Workflow, proposals: &[FieldProposal], today: NaiveDate) -> Vec<Rejection> {
        let mut rejections = Vec::new();
        let get = |field: Field| proposals.iter().find(|p| p.field == field).map(|p| p.value.as_str());
        let draft = wf.draft_mut();

        if let Err(r) = apply_dates(draft, get(Field::CheckIn), get(Field::CheckOut), today, self.max_stay_nights) {
            rejections.push(r);
        }
        if let Err(r) = apply_party(draft, get(Field::Adults), get(Field::Children)) {
            rejections.push(r);
        }
        if let Some(raw) = get(Field::RoomType) {
            if let Err(r) = apply_room(draft, raw) {
                rejections.push(r);
            }
        }
        if let Some(raw) = get(Field::GuestName) {
            match validation::validate_name(raw) {
                ValidationOutcome::Accepted(v) => draft.guest_name = Some(v),
                ValidationOutcome::Rejected { field, reason } => rejections.push(Rejection { field, reason }),
            }
        }
        if let Some(raw) = get(Field::GuestEmail) {
            match validation::validate_email(raw) {
                ValidationOutcome::Accepted(v) => draft.guest_email = Some(v),
                ValidationOutcome::Rejected { field, reason } => rejections.push(Rejection { field, reason }),
            }
        }
        if let Some(raw) = get(Field::GuestPhone) {
            match validation::validate_phone(raw) {
                ValidationOutcome::Accepted(v) => draft.guest_phone = Some(v),
                ValidationOutcome::Rejected { field, reason } => rejections.push(Rejection { field, reason }),
            }
        }
        rejections
    }

    /// Guest rejected the summary: reopen every field, starting from the dates.
    fn reopen(&self, wf: &mut Workflow) -> OutboundMessage {
        let draft = wf.draft_mut();
        draft.revising = true;
        draft.confirmed = false;
        draft.check_in = None;
        draft.check_out = None;
        wf.set_stage(Stage::CollectDates);
        tracing::info!(workflow = wf.kind().as_str(), "summary declined, revising");
        active_reply(
            wf,
            ReplyKind::Prompt,
            format!(
                "No problem, let's go through it again. {} You can also tell me anything else to change.",
                prompt(wf)
            ),
        )
    }

    // ── Commit ──

    async fn commit(&self, wf: &mut Workflow, now: NaiveDateTime) -> Result<Turn, BackendError> {
        let kind = wf.kind();

        if let Some(id) = wf.draft().booking_id.clone() {
            tracing::info!(booking_id = %id, "draft already committed, skipping write");
            let confirmation = self.confirmation(wf.draft(), &id, kind);
            return Ok(Turn::Committed(
                receipt(&id, kind, &confirmation, now),
                committed_reply(confirmation, &id, kind),
            ));
        }

        wf.draft_mut().confirmed = true;

        let written = match kind {
            WorkflowKind::NewBooking => {
                let Some(reservation) = wf.draft().to_new_reservation() else {
                    return Ok(incomplete(wf));
                };
                self.policy
                    .guarded("reservations", || self.reservations.commit(&reservation))
                    .await
            }
            WorkflowKind::Reschedule => {
                let version = match wf {
                    Workflow::Reschedule {
                        original_version, ..
                    } => original_version.unwrap_or(1),
                    Workflow::NewBooking { .. } => 1,
                };
                let draft = wf.draft();
                let (Some(reference), Some(stay)) = (draft.original_booking_ref.clone(), draft.stay())
                else {
                    return Ok(incomplete(wf));
                };
                self.policy
                    .guarded("reservations", || self.reservations.update(&reference, stay, version))
                    .await
                    .map(|updated| updated.id)
            }
        };

        match written {
            Ok(id) => {
                wf.draft_mut().booking_id = Some(id.clone());
                let confirmation = self.confirmation(wf.draft(), &id, kind);
                tracing::info!(booking_id = %id, workflow = kind.as_str(), "workflow committed");
                Ok(Turn::Committed(
                    receipt(&id, kind, &confirmation, now),
                    committed_reply(confirmation, &id, kind),
                ))
            }
            Err(RepositoryError::Backend(e)) => {
                wf.draft_mut().confirmed = false;
                wf.set_stage(Stage::Summarize);
                Err(e)
            }
            Err(e @ (RepositoryError::Conflict(_) | RepositoryError::NotFound(_))) => {
                tracing::warn!(error = %e, "reservation changed during reschedule, re-locating");
                *wf = Workflow::reschedule();
                Ok(Turn::Active(active_reply(
                    wf,
                    ReplyKind::Rejection,
                    format!(
                        "This reservation was just updated, please re-check it before changing the dates. {}",
                        prompt(wf)
                    ),
                )))
            }
        }
    }

    fn confirmation(&self, draft: &BookingDraft, id: &str, kind: WorkflowKind) -> String {
        match kind {
            WorkflowKind::NewBooking => format!(
                "Your reservation is confirmed! Booking reference: {id}\n{}\n\nWe look forward to welcoming you at {}.",
                draft.summary(),
                self.hotel_name
            ),
            WorkflowKind::Reschedule => {
                let dates = draft
                    .stay()
                    .map(|s| format!("{} to {}", s.check_in.format(DATE), s.check_out.format(DATE)))
                    .unwrap_or_default();
                format!("Done! Reservation {id} now runs {dates}. See you soon at {}.", self.hotel_name)
            }
        }
    }
}

/// A summary was confirmed with fields missing; fall back to collecting them.
fn incomplete(wf: &mut Workflow) -> Turn {
    wf.draft_mut().confirmed = false;
    let next = wf.next_incomplete_stage();
    wf.set_stage(next);
    Turn::Active(active_reply(wf, ReplyKind::Prompt, prompt(wf)))
}

fn into_backend(e: RepositoryError) -> BackendError {
    match e {
        RepositoryError::Backend(b) => b,
        other => BackendError::unavailable("reservations", other),
    }
}

fn receipt(id: &str, kind: WorkflowKind, confirmation: &str, now: NaiveDateTime) -> CommitReceipt {
    CommitReceipt {
        booking_id: id.to_string(),
        workflow: kind,
        confirmation: confirmation.to_string(),
        committed_at: now,
    }
}

fn committed_reply(text: String, id: &str, kind: WorkflowKind) -> OutboundMessage {
    OutboundMessage {
        text,
        kind: ReplyKind::Committed,
        stage: Stage::Committed.as_str().to_string(),
        workflow: Some(kind),
        booking_id: Some(id.to_string()),
    }
}

fn active_reply(wf: &Workflow, kind: ReplyKind, text: String) -> OutboundMessage {
    OutboundMessage {
        text,
        kind,
        stage: wf.stage().as_str().to_string(),
        workflow: Some(wf.kind()),
        booking_id: None,
    }
}

fn idle_reply(kind: ReplyKind, text: String) -> OutboundMessage {
    OutboundMessage {
        text,
        kind,
        stage: "idle".to_string(),
        workflow: None,
        booking_id: None,
    }
}

fn opening(wf: &Workflow) -> String {
    match wf.kind() {
        WorkflowKind::NewBooking => format!("I'd be happy to help you book a room! {}", prompt(wf)),
        WorkflowKind::Reschedule => format!("Sure, let's change your reservation. {}", prompt(wf)),
    }
}

/// The question owed by the current stage.
fn prompt(wf: &Workflow) -> String {
    let draft = wf.draft();
    match wf.stage() {
        Stage::Locate => {
            "Please send your booking reference (it looks like HB-1A2B3C4D).".to_string()
        }
        Stage::CollectDates => match (draft.check_in, draft.check_out) {
            (Some(check_in), None) => format!(
                "You're arriving {}. What date will you check out?",
                check_in.format(DATE)
            ),
            (None, Some(check_out)) => format!(
                "You're leaving {}. What date will you check in?",
                check_out.format(DATE)
            ),
            _ if wf.kind() == WorkflowKind::Reschedule => {
                "What new check-in and check-out dates would you like?".to_string()
            }
            _ => "What dates would you like to stay? Please give a check-in and check-out date, e.g. June 10 to June 14."
                .to_string(),
        },
        Stage::CollectRoomType => format!(
            "Which room would you like? We offer: {}.",
            RoomType::catalog_listing()
        ),
        Stage::CollectParty => "How many adults and children will be staying?".to_string(),
        Stage::CollectContact => match (&draft.guest_name, &draft.guest_email) {
            (Some(name), None) => format!("Thanks, {name}! What email address should we use?"),
            (None, Some(_)) => "What name should the reservation be under?".to_string(),
            _ => "What name should the reservation be under, and which email address should we use? \
                  A phone number is optional."
                .to_string(),
        },
        Stage::Summarize => "Please reply yes to confirm or no to make changes.".to_string(),
        Stage::Committed | Stage::Aborted => MENU.to_string(),
    }
}

fn reject(field: Field, reason: String) -> Rejection {
    Rejection { field, reason }
}

fn apply_dates(
    draft: &mut BookingDraft,
    check_in: Option<&str>,
    check_out: Option<&str>,
    today: NaiveDate,
    max_nights: i64,
) -> Result<(), Rejection> {
    if check_in.is_none() && check_out.is_none() {
        return Ok(());
    }
    let parse = |field: Field, raw: Option<&str>| -> Result<Option<NaiveDate>, Rejection> {
        match raw.map(|r| validation::validate_date(field, r, today)) {
            None => Ok(None),
            Some(ValidationOutcome::Accepted(d)) => Ok(Some(d)),
            Some(ValidationOutcome::Rejected { field, reason }) => Err(reject(field, reason)),
        }
    };
    let new_in = parse(Field::CheckIn, check_in)?;
    let new_out = parse(Field::CheckOut, check_out)?;

    let candidate_in = new_in.or(draft.check_in);
    let candidate_out = new_out.or(draft.check_out);

    match (candidate_in, candidate_out) {
        (Some(ci), Some(co)) => match validation::validate_stay(ci, co, today, max_nights) {
            ValidationOutcome::Accepted(stay) => {
                draft.check_in = Some(stay.check_in);
                draft.check_out = Some(stay.check_out);
                Ok(())
            }
            ValidationOutcome::Rejected { field, reason } => {
                // A valid new arrival is kept; the departure has to be re-asked.
                if new_in.is_some() && field == Field::CheckOut {
                    draft.check_in = new_in;
                    draft.check_out = None;
                }
                Err(reject(field, reason))
            }
        },
        (ci, co) => {
            draft.check_in = ci;
            draft.check_out = co;
            Ok(())
        }
    }
}

fn apply_party(
    draft: &mut BookingDraft,
    adults: Option<&str>,
    children: Option<&str>,
) -> Result<(), Rejection> {
    if adults.is_none() && children.is_none() {
        return Ok(());
    }
    let new_adults = match adults.map(validation::validate_adults) {
        None => None,
        Some(ValidationOutcome::Accepted(n)) => Some(n),
        Some(ValidationOutcome::Rejected { field, reason }) => return Err(reject(field, reason)),
    };
    let new_children = match children.map(validation::validate_children) {
        None => None,
        Some(ValidationOutcome::Accepted(n)) => Some(n),
        Some(ValidationOutcome::Rejected { field, reason }) => return Err(reject(field, reason)),
    };

    let total_adults = new_adults.or(draft.adults);
    let total_children = new_children.or(draft.children);
    if let (Some(room), Some(a)) = (draft.room_type, total_adults) {
        if let ValidationOutcome::Rejected { field, reason } =
            validation::check_capacity(room, a, total_children.unwrap_or(0))
        {
            return Err(reject(field, reason));
        }
    }
    if new_adults.is_some() {
        draft.adults = new_adults;
    }
    if new_children.is_some() {
        draft.children = new_children;
    }
    Ok(())
}

/// Sets the room; a party that no longer fits is cleared and rejected so the
/// guest revises one of the two.
fn apply_room(draft: &mut BookingDraft, raw: &str) -> Result<(), Rejection> {
    let room = match validation::validate_room_type(raw) {
        ValidationOutcome::Accepted(room) => room,
        ValidationOutcome::Rejected { field, reason } => return Err(reject(field, reason)),
    };
    draft.room_type = Some(room);
    if let Some(adults) = draft.adults {
        let children = draft.children.unwrap_or(0);
        if let ValidationOutcome::Rejected { field, reason } =
            validation::check_capacity(room, adults, children)
        {
            draft.adults = None;
            draft.children = None;
            return Err(reject(field, reason));
        }
    }
    Ok(())
}
