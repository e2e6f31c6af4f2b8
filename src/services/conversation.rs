use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Duration, NaiveDateTime, Utc};
use rusqlite::Connection;

use crate::config::ConversationConfig;
use crate::db::queries;
use crate::models::{ConversationSession, OutboundMessage, ReplyKind};
use crate::services::machine::BookingMachine;

pub const RETRY_LATER: &str = "Sorry, I'm having trouble right now. Please try again in a moment.";

/// Runs turns against persisted sessions. Turns for one session are
/// serialized; different sessions proceed independently.
pub struct ConversationEngine {
    db: Arc<Mutex<Connection>>,
    machine: BookingMachine,
    config: ConversationConfig,
    turn_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationEngine {
    pub fn new(db: Arc<Mutex<Connection>>, machine: BookingMachine, config: ConversationConfig) -> Self {
        Self {
            db,
            machine,
            config,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn handle_turn(
        &self,
        session_id: &str,
        turn_id: Option<&str>,
        text: &str,
    ) -> anyhow::Result<OutboundMessage> {
        self.handle_turn_at(session_id, turn_id, text, Utc::now().naive_utc())
            .await
    }

    pub async fn handle_turn_at(
        &self,
        session_id: &str,
        turn_id: Option<&str>,
        text: &str,
        now: NaiveDateTime,
    ) -> anyhow::Result<OutboundMessage> {
        let lock = self.turn_lock(session_id)?;
        let result = {
            let _guard = lock.lock().await;
            self.run_turn(session_id, turn_id, text, now).await
        };
        self.release_turn_lock(session_id, lock);
        result
    }

    /// Stored state for a session, as last persisted.
    pub fn snapshot(&self, session_id: &str) -> anyhow::Result<Option<ConversationSession>> {
        let db = self.db()?;
        queries::get_session(&db, session_id)
    }

    pub fn expire_sessions(&self, now: NaiveDateTime) -> anyhow::Result<usize> {
        let db = self.db()?;
        queries::expire_old_sessions(&db, &now)
    }

    async fn run_turn(
        &self,
        session_id: &str,
        turn_id: Option<&str>,
        text: &str,
        now: NaiveDateTime,
    ) -> anyhow::Result<OutboundMessage> {
        let ttl = Duration::minutes(self.config.session_ttl_minutes);
        let stored = {
            let db = self.db()?;
            queries::get_session(&db, session_id)?
        };

        let session = match stored {
            Some(session) if session.is_expired(now, ttl) => {
                tracing::info!(session_id, stage = session.stage_label(), "session expired, starting fresh");
                ConversationSession::new(session_id, now)
            }
            Some(session) => session,
            None => ConversationSession::new(session_id, now),
        };

        if let Some(turn_id) = turn_id {
            if let Some(reply) = session.cached_reply(turn_id) {
                tracing::info!(session_id, turn_id, "duplicate delivery, replaying stored reply");
                return Ok(reply.clone());
            }
        }

        // The machine works on a copy; a failed turn must leave no trace.
        let mut working = session.clone();
        let reply = match self.machine.step(&mut working, text, now).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "backend failure, turn left unanswered");
                return Ok(OutboundMessage {
                    text: RETRY_LATER.to_string(),
                    kind: ReplyKind::RetryLater,
                    stage: session.stage_label().to_string(),
                    workflow: session.workflow.as_ref().map(|w| w.kind()),
                    booking_id: None,
                });
            }
        };

        working.push_history("user", text, self.config.history_limit);
        working.push_history("assistant", &reply.text, self.config.history_limit);
        if let Some(turn_id) = turn_id {
            working.remember_turn(turn_id, &reply, self.config.turn_cache_limit);
        }
        working.updated_at = now;

        {
            let db = self.db()?;
            queries::save_session(&db, &working, &(now + ttl))?;
        }

        tracing::info!(
            session_id,
            stage = working.stage_label(),
            kind = ?reply.kind,
            "turn handled"
        );
        Ok(reply)
    }

    fn db(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))
    }

    fn turn_lock(&self, session_id: &str) -> anyhow::Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .turn_locks
            .lock()
            .map_err(|_| anyhow::anyhow!("turn lock table poisoned"))?;
        Ok(locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }

    /// Drops the per-session lock once no other turn holds or awaits it.
    fn release_turn_lock(&self, session_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        if let Ok(mut locks) = self.turn_locks.lock() {
            if Arc::strong_count(&lock) == 2 {
                locks.remove(session_id);
            }
        }
    }

    #[cfg(test)]
    fn tracked_sessions(&self) -> usize {
        self.turn_locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}
