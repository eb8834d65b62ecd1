pub mod jwt;
pub mod personal_access_token;
pub mod task;
pub mod user;
