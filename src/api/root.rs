use axum::Json;
use serde::Serialize;

use crate::config::APP_NAME;

#[derive(Serialize)]
pub struct Message {
    message: String,
}

pub async fn index() -> Json<Message> {
    Json(Message {
        message: format!("Welcome to {APP_NAME}!"),
    })
}

pub async fn healthz() -> Json<Message> {
    Json(Message {
        message: "ok".to_string(),
    })
}
