pub mod config;
pub mod handlers;
pub mod lifecycle;
pub mod models;
pub mod moderation;
pub mod routes;
pub mod store;
pub mod utils;
