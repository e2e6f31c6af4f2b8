pub mod admin;
pub mod dev;
pub mod health;
pub mod hotel;
pub mod webhook;
