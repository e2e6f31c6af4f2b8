use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::ai::TextUnderstanding;
use crate::services::conversation::ConversationEngine;
use crate::services::hotel::{HotelFacts, StaticHotelFacts};
use crate::services::machine::BookingMachine;
use crate::services::messaging::MessagingProvider;
use crate::services::reservations::SqliteReservations;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub engine: ConversationEngine,
    pub facts: Arc<dyn HotelFacts>,
    pub messaging: Box<dyn MessagingProvider>,
}

impl AppState {
    /// Wires the conversation engine over a migrated connection.
    pub fn new(
        conn: Connection,
        config: AppConfig,
        understanding: Arc<dyn TextUnderstanding>,
        messaging: Box<dyn MessagingProvider>,
    ) -> Self {
        let db = Arc::new(Mutex::new(conn));
        let facts: Arc<dyn HotelFacts> = Arc::new(StaticHotelFacts::new(config.hotel.clone()));
        let reservations = Arc::new(SqliteReservations::new(
            db.clone(),
            config.hotel.room_inventory,
        ));
        let machine = BookingMachine::new(
            understanding,
            reservations,
            facts.clone(),
            &config.conversation,
            &config.hotel.name,
        );
        let engine = ConversationEngine::new(db.clone(), machine, config.conversation.clone());

        Self {
            db,
            config,
            engine,
            facts,
            messaging,
        }
    }
}
