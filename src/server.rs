use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use teloxide::prelude::*;

use crate::bots::shop::AppRef;
use crate::bots::WBot;

#[derive(Clone)]
struct Ops {
    bot: WBot,
    app: AppRef,
}

#[derive(Debug, Default, Deserialize)]
struct Key {
    key: Option<String>,
}

type Reply = Result<Json<Value>, (StatusCode, &'static str)>;

/// Health check plus the secret gated maintenance endpoints.
pub fn router(bot: WBot, app: AppRef) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/set-webhook", post(set_webhook))
        .route("/reset-screenshots", post(reset_screenshots))
        .with_state(Ops { bot, app })
}

fn check_key(secret: &str, key: &Key) -> Result<(), (StatusCode, &'static str)> {
    match key.key.as_deref() {
        Some(key) if !secret.is_empty() && key == secret => Ok(()),
        _ => Err((StatusCode::FORBIDDEN, "forbidden")),
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn set_webhook(State(ops): State<Ops>, Query(key): Query<Key>) -> Reply {
    check_key(&ops.app.config.secret, &key)?;
    let url = ops.app.config.webhook_url.clone()
        .ok_or((StatusCode::BAD_REQUEST, "WEBHOOK_URL is not set"))?;
    ops.bot.set_webhook(url.clone()).await.map_err(|e| {
        log::error!("set webhook failed: {}", e);
        (StatusCode::BAD_GATEWAY, "telegram request failed")
    })?;
    log::info!("webhook set to {}", url);
    Ok(Json(json!({ "webhook": url.as_str() })))
}

async fn reset_screenshots(State(ops): State<Ops>, Query(key): Query<Key>) -> Reply {
    check_key(&ops.app.config.secret, &key)?;
    let reset = ops.app.db.reset_screenshot_attempts().await.map_err(|e| {
        log::error!("screenshot counters reset failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "database error")
    })?;
    log::info!("screenshot counters reset for {} users", reset);
    Ok(Json(json!({ "reset": reset })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bots::shop::{bot::make_bot, test_app};

    #[test]
    fn key_must_match_configured_secret() {
        let key = |k: &str| Key { key: Some(k.to_owned()) };
        assert!(check_key("s3cret", &key("s3cret")).is_ok());
        assert_eq!(check_key("s3cret", &key("guess")).unwrap_err().0, StatusCode::FORBIDDEN);
        assert!(check_key("s3cret", &Key::default()).is_err());
        assert!(check_key("", &key("")).is_err());
    }

    #[tokio::test]
    async fn reset_requires_secret() {
        let app = test_app().await;
        app.db.ensure_user(1, None, "Ann", 0).await.unwrap();
        app.db.register_screenshot_attempt(1, 5).await.unwrap();
        let ops = Ops { bot: make_bot("123:test"), app: app.clone() };

        let denied = reset_screenshots(State(ops.clone()), Query(Key { key: Some("nope".into()) })).await;
        assert_eq!(denied.unwrap_err().0, StatusCode::FORBIDDEN);

        let secret = app.config.secret.clone();
        let Json(body) = reset_screenshots(State(ops), Query(Key { key: Some(secret) })).await.unwrap();
        assert_eq!(body, json!({ "reset": 1 }));
        assert_eq!(app.db.get_user(1).await.unwrap().unwrap().screenshot_attempts, 0);
    }
}
