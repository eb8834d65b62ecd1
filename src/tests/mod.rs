pub mod helpers;

mod auth;
mod csrf;
