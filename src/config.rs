use std::env;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub llm_provider: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub groq_api_key: String,
    pub groq_model: String,
    pub instagram_access_token: String,
    pub instagram_app_secret: String,
    pub instagram_verify_token: String,
    pub instagram_api_version: String,
    pub conversation: ConversationConfig,
    pub hotel: HotelConfig,
}

/// Tunables for the booking conversation engine.
#[derive(Clone, Debug)]
pub struct ConversationConfig {
    pub session_ttl_minutes: i64,
    pub history_limit: usize,
    pub turn_cache_limit: usize,
    pub max_stay_nights: i64,
    pub locate_max_attempts: u32,
    pub min_intent_confidence: f32,
    pub backend_timeout_ms: u64,
    pub backend_max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            session_ttl_minutes: 30,
            history_limit: 20,
            turn_cache_limit: 16,
            max_stay_nights: 30,
            locate_max_attempts: 3,
            min_intent_confidence: 0.6,
            backend_timeout_ms: 8_000,
            backend_max_retries: 2,
            retry_delay_ms: 200,
        }
    }
}

#[derive(Clone, Debug)]
pub struct HotelConfig {
    pub name: String,
    pub address: String,
    pub check_in_time: String,
    pub check_out_time: String,
    pub amenities: Vec<String>,
    pub cancellation_policy: String,
    pub pet_policy: String,
    pub parking: String,
    /// Rooms of each category; overlapping stays beyond this count are refused.
    pub room_inventory: u32,
}

impl Default for HotelConfig {
    fn default() -> Self {
        Self {
            name: "Powersmy Luxury Hotel".to_string(),
            address: "123 Main Street, Cityville".to_string(),
            check_in_time: "15:00".to_string(),
            check_out_time: "11:00".to_string(),
            amenities: [
                "Free Wi-Fi",
                "Swimming Pool",
                "Fitness Center",
                "Spa",
                "Restaurant",
                "24/7 Room Service",
                "Business Center",
                "Parking",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            cancellation_policy: "Free cancellation up to 24 hours before check-in.".to_string(),
            pet_policy: "We are a pet-friendly hotel; an additional cleaning fee applies."
                .to_string(),
            parking: "On-site parking is available for hotel guests.".to_string(),
            room_inventory: 5,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let conversation_defaults = ConversationConfig::default();
        let hotel_defaults = HotelConfig::default();

        Self {
            port: parse_var("PORT", 3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "concierge.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            llm_provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "ollama".to_string()),
            ollama_url: env::var("OLLAMA_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            ollama_model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string()),
            groq_api_key: env::var("GROQ_API_KEY").unwrap_or_default(),
            groq_model: env::var("GROQ_MODEL")
                .unwrap_or_else(|_| "llama-3.1-8b-instant".to_string()),
            instagram_access_token: env::var("INSTAGRAM_ACCESS_TOKEN").unwrap_or_default(),
            instagram_app_secret: env::var("INSTAGRAM_APP_SECRET").unwrap_or_default(),
            instagram_verify_token: env::var("INSTAGRAM_VERIFY_TOKEN").unwrap_or_default(),
            instagram_api_version: env::var("INSTAGRAM_API_VERSION")
                .unwrap_or_else(|_| "18.0".to_string()),
            conversation: ConversationConfig {
                session_ttl_minutes: parse_var(
                    "SESSION_TTL_MINUTES",
                    conversation_defaults.session_ttl_minutes,
                ),
                history_limit: parse_var("HISTORY_LIMIT", conversation_defaults.history_limit),
                turn_cache_limit: conversation_defaults.turn_cache_limit,
                max_stay_nights: parse_var("MAX_STAY_NIGHTS", conversation_defaults.max_stay_nights),
                locate_max_attempts: parse_var(
                    "LOCATE_MAX_ATTEMPTS",
                    conversation_defaults.locate_max_attempts,
                ),
                min_intent_confidence: parse_var(
                    "MIN_INTENT_CONFIDENCE",
                    conversation_defaults.min_intent_confidence,
                ),
                backend_timeout_ms: parse_var(
                    "BACKEND_TIMEOUT_MS",
                    conversation_defaults.backend_timeout_ms,
                ),
                backend_max_retries: parse_var(
                    "BACKEND_MAX_RETRIES",
                    conversation_defaults.backend_max_retries,
                ),
                retry_delay_ms: parse_var("RETRY_DELAY_MS", conversation_defaults.retry_delay_ms),
            },
            hotel: HotelConfig {
                name: env::var("HOTEL_NAME").unwrap_or(hotel_defaults.name),
                address: env::var("HOTEL_ADDRESS").unwrap_or(hotel_defaults.address),
                check_in_time: env::var("CHECK_IN_TIME").unwrap_or(hotel_defaults.check_in_time),
                check_out_time: env::var("CHECK_OUT_TIME")
                    .unwrap_or(hotel_defaults.check_out_time),
                room_inventory: parse_var("ROOM_INVENTORY", hotel_defaults.room_inventory),
                ..hotel_defaults
            },
        }
    }
}

fn parse_var<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
