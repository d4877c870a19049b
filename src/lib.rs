pub mod app;
pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod query;
pub mod response;
pub mod state;
pub mod tours;
pub mod users;
