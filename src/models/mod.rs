pub mod booking;
pub mod conversation;
pub mod hotel;
pub mod intent;

pub use booking::{NewReservation, Reservation, ReservationStatus, StayDates};
pub use conversation::{
    BookingDraft, CommitReceipt, ConversationMessage, ConversationSession, OutboundMessage,
    ReplyKind, Stage, TurnRecord, Workflow, WorkflowKind,
};
pub use hotel::{QuestionTopic, RoomType};
pub use intent::{Field, FieldProposal, Intent, IntentLabel, Understanding};
