use std::net::SocketAddr;

use teloxide::adaptors::throttle::Limits;
use teloxide::dispatching::update_listeners::{self, webhooks};
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use crate::bots::WBot;
use crate::impls::LoggableErrorResult;
use crate::{scheduler, server};

use super::entity::Command;
use super::{fsm, AppRef};

pub fn make_bot(token: &str) -> WBot {
    Bot::new(token).throttle(Limits::default())
}

/// Runs the bot until ctrl-c: webhook mode when a webhook url is configured, long polling otherwise.
/// The operational http endpoints are served in both modes.
pub async fn start(app: AppRef) -> anyhow::Result<()> {
    let bot = make_bot(&app.config.token);
    let me = bot.get_me().await?;
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        log::error!("cannot set bot commands: {:?}", e);
    }
    let mut dispatcher = Dispatcher::builder(bot.clone(), fsm::make_dialogue_handler())
        .dependencies(dptree::deps![app.clone(), app.sessions.clone()])
        .enable_ctrlc_handler()
        .build();
    let jobs = scheduler::start(bot.clone(), app.clone());
    let addr = app.config.listen;
    let ops = server::router(bot.clone(), app.clone());

    match app.config.webhook_url.clone() {
        Some(url) => {
            log::info!("bot @{} started with webhook {}", me.username(), url);
            let options = webhooks::Options::new(addr, url);
            let (listener, stop_flag, router) = webhooks::axum_to_router(bot.clone(), options).await?;
            let router = router.merge(ops);
            let http = tokio::spawn(async move {
                axum::Server::bind(&addr)
                    .serve(router.into_make_service())
                    .with_graceful_shutdown(stop_flag)
                    .await
                    .ok_or_log();
            });
            dispatcher.dispatch_with_listener(
                listener,
                LoggingErrorHandler::with_custom_text("an error from the webhook listener"),
            ).await;
            http.await.ok_or_log();
        },
        None => {
            bot.delete_webhook().await.ok_or_log();
            let http = serve_ops(addr, ops);
            let listener = update_listeners::polling_default(bot.clone()).await;
            log::info!("bot @{} started with long polling", me.username());
            dispatcher.dispatch_with_listener(
                listener,
                LoggingErrorHandler::with_custom_text("an error from the update listener"),
            ).await;
            http.abort();
        },
    }
    jobs.abort();
    log::info!("bot stopped");
    Ok(())
}

fn serve_ops(addr: SocketAddr, router: axum::Router) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        log::info!("http endpoints listening on {}", addr);
        axum::Server::bind(&addr)
            .serve(router.into_make_service())
            .await
            .ok_or_log();
    })
}
