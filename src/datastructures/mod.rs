pub mod account;
pub mod auth;
pub mod client;
pub mod config;
pub mod order;
pub mod session;
