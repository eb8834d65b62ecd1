pub mod auth;
pub mod authorization;
pub mod token_source;
