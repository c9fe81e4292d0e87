use std::sync::Arc;

use crossbeam::channel::Sender;

use crate::ai::ChatClient;
use crate::config::Config;
use crate::error::BotResult;
use crate::export::ExportAction;
use crate::persistent::{SessionStorage, Storage};
use crate::screenshot::{ManualVerifier, ScreenshotVerifier, VisionVerifier};

pub mod bot;
pub mod res;
mod entity;
mod fsm;
mod keyboards;

pub use fsm::{notify_stage, Session};

pub type SessionStore = SessionStorage<Session>;
pub type AppRef = Arc<App>;

/// Everything handlers need besides the bot itself.
pub struct App {
    pub config: Config,
    pub db: Arc<Storage>,
    pub sessions: Arc<SessionStore>,
    pub ai: Option<ChatClient>,
    pub verifier: Box<dyn ScreenshotVerifier>,
    pub export: Sender<ExportAction>,
}

impl App {
    pub fn new(config: Config, db: Arc<Storage>, export: Sender<ExportAction>) -> BotResult<AppRef> {
        let ai = ChatClient::from_config(&config)?;
        let verifier: Box<dyn ScreenshotVerifier> = match &ai {
            Some(client) => Box::new(VisionVerifier(client.clone())),
            None => {
                log::warn!("OPENAI_API_KEY is not set, screenshots go to manual review");
                Box::new(ManualVerifier)
            }
        };
        let sessions = SessionStorage::new(db.pool(), config.session_ttl());
        Ok(Arc::new(Self { config, db, sessions, ai, verifier, export }))
    }
}

#[cfg(test)]
pub async fn test_app() -> AppRef {
    test_app_with(Box::new(ManualVerifier)).await
}

/// Admins 10 and 11, owner 1000, in-memory storage, no AI.
#[cfg(test)]
pub async fn test_app_with(verifier: Box<dyn ScreenshotVerifier>) -> AppRef {
    let config = Config {
        secret: "test-secret".to_owned(),
        openai_api_key: None,
        admins: vec![10, 11],
        owner: Some(1000),
        ..Config::default()
    };
    let db = Storage::memory().await.unwrap();
    let sessions = SessionStorage::new(db.pool(), config.session_ttl());
    let (export, _) = crossbeam::channel::unbounded();
    Arc::new(App { config, db, sessions, ai: None, verifier, export })
}
