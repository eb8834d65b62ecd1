pub mod auth_service;
pub mod bootstrap_service;
pub mod cookie_service;
pub mod csrf_service;
pub mod jwt_service;
pub mod oauth2_service;
pub mod personal_token_service;
pub mod policy_service;
