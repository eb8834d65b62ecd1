// src/services/bootstrap_service.rs
use bcrypt::hash;
use tracing::{info, instrument};

use crate::config::AdminConfig;
use crate::db::Database;
use crate::error::AppResult;
use crate::models::user::{NewUser, ROLE_ADMIN, ROLE_SUPER, ROLE_USER, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Created,
    AlreadyPresent,
    Disabled,
}

/// Creates the configured admin account unless it already exists.
/// Safe to run on every start.
#[instrument(skip_all, fields(username = %admin.username))]
pub async fn ensure_admin(
    db: &Database,
    admin: &AdminConfig,
    bcrypt_cost: u32,
) -> AppResult<BootstrapOutcome> {
    if !admin.create {
        return Ok(BootstrapOutcome::Disabled);
    }

    if User::exists(db, &admin.username, &admin.email).await? {
        info!("admin account already present");
        return Ok(BootstrapOutcome::AlreadyPresent);
    }

    let password_hash = hash(&admin.password, bcrypt_cost)?;
    let user = User::create(
        db,
        NewUser {
            username: &admin.username,
            email: &admin.email,
            name: &admin.username,
            password_hash: Some(&password_hash),
            roles: vec![
                ROLE_USER.to_string(),
                ROLE_ADMIN.to_string(),
                ROLE_SUPER.to_string(),
            ],
        },
    )
    .await?;

    info!(user_id = %user.id, "admin account created");
    Ok(BootstrapOutcome::Created)
}
