pub mod ai;
pub mod backend;
pub mod conversation;
pub mod extractor;
pub mod hotel;
pub mod machine;
pub mod messaging;
pub mod reservations;
pub mod router;
pub mod validation;
