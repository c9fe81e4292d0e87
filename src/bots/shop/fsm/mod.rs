use serde::{Deserialize, Serialize};
use teloxide::dispatching::{DpHandlerDescription, UpdateFilterExt};
use teloxide::dptree::Handler;
use teloxide::prelude::*;
use teloxide::payloads::SendMessageSetters;
use teloxide::types::{InlineKeyboardMarkup, User};

use crate::bots::{CallbackMessage, WBot};
use crate::error::{BotError, BotResult, ErrorKind};
use crate::impls::{now, LoggableErrorResult};

use super::entity::{AdminCommand, Callback, Command, Content};
use super::{keyboards, res, AppRef, SessionStore};

mod admin;
mod support;
mod user;
mod warranty;
#[cfg(test)]
mod handler_tests;

pub use support::notify_stage;

pub type MyDialogue = Dialogue<Session, SessionStore>;
pub type FSMResult = Result<(), BotError>;
pub type FSMHandler = Handler<'static, DependencyMap, FSMResult, DpHandlerDescription>;

/// The single conversation context of a chat. Starting a flow replaces the previous one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Session {
    #[default]
    Idle,
    WarrantyActivation { product_id: i64 },
    AwaitingConfirmation { pending_id: i64 },
    CasePhone { product_id: i64 },
    CaseDescription { product_id: i64, phone: String },
    Support { ticket_id: i64 },
    AdminResponse { ticket_id: i64 },
    Broadcast,
    PromoIntake,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Route {
    CasePhone(i64),
    CaseDescription(i64, String),
    Support(i64),
    AdminResponse(i64),
    Broadcast,
    PromoIntake,
    Activation(i64),
    AwaitingConfirmation,
    AiChat,
    SendText,
}

impl Route {
    /// Routes driven by an entity the session points at (product or ticket).
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::CasePhone(_) | Self::CaseDescription(..) | Self::Support(_) | Self::AdminResponse(_) | Self::Activation(_))
    }

    pub fn select(session: &Session, content: &Content) -> Self {
        use Session as S;
        let relayable = matches!(content, Content::Text(_) | Content::Photo { .. });
        match (session, content) {
            (S::CasePhone { product_id }, Content::Text(_)) => Self::CasePhone(*product_id),
            (S::CaseDescription { product_id, phone }, Content::Text(_)) => Self::CaseDescription(*product_id, phone.clone()),
            (S::Support { ticket_id }, _) if relayable => Self::Support(*ticket_id),
            (S::AdminResponse { ticket_id }, _) if relayable => Self::AdminResponse(*ticket_id),
            (S::Broadcast, _) => Self::Broadcast,
            (S::PromoIntake, Content::Text(_)) => Self::PromoIntake,
            (S::WarrantyActivation { product_id }, Content::Photo { .. }) => Self::Activation(*product_id),
            (S::AwaitingConfirmation { .. }, _) => Self::AwaitingConfirmation,
            (_, Content::Text(_)) => Self::AiChat,
            _ => Self::SendText,
        }
    }
}

pub fn make_dialogue_handler() -> FSMHandler {
    let message_handler = Update::filter_message()
        .filter(|msg: Message| msg.chat.is_private())
        .branch(dptree::entry().filter_command::<Command>().endpoint(user::on_command))
        .branch(dptree::entry().filter_command::<AdminCommand>().endpoint(admin::on_command))
        .branch(dptree::filter_map(Content::from_message).endpoint(on_content));
    let callback_handler = Update::filter_callback_query()
        .endpoint(on_callback);
    dptree::entry().enter_dialogue::<Update, SessionStore, Session>()
        .branch(message_handler)
        .branch(callback_handler)
}

/// Logs a failed handler and answers with the message of its kind.
async fn report(bot: &WBot, dialogue: &MyDialogue, result: BotResult<()>) -> FSMResult {
    if let Err(e) = result {
        log::error!("chat {}: {}", dialogue.chat_id().0, e);
        bot.send_message(dialogue.chat_id(), e.user_message()).await?;
    }
    Ok(())
}

async fn register(app: &AppRef, user: &User) -> BotResult<bool> {
    let created = app.db.ensure_user(user_key(user), user.username.as_deref(), &user.full_name(), now()).await?;
    if created {
        log::info!("new user {} ({})", user.id.0, user.full_name());
    }
    Ok(created)
}

fn user_key(user: &User) -> i64 {
    user.id.0 as i64
}

/// Sends `text` to every admin, returns how many got it.
async fn notify_admins(bot: &WBot, app: &AppRef, text: String, markup: Option<InlineKeyboardMarkup>) -> usize {
    let mut delivered = 0;
    for admin in app.config.admin_ids() {
        let mut request = bot.send_message(ChatId::from(admin), text.clone());
        if let Some(markup) = &markup {
            request = request.reply_markup(markup.clone());
        }
        if request.await.ok_or_log().is_some() {
            delivered += 1;
        }
    }
    if delivered == 0 {
        log::warn!("no admin received: {}", text);
    }
    delivered
}

async fn on_content(bot: WBot, dialogue: MyDialogue, msg: Message, content: Content, app: AppRef) -> FSMResult {
    let result = route_content(&bot, &dialogue, &msg, content, &app).await;
    report(&bot, &dialogue, result).await
}

async fn route_content(bot: &WBot, dialogue: &MyDialogue, msg: &Message, content: Content, app: &AppRef) -> BotResult<()> {
    let user = msg.from().ok_or_else(|| BotError::validation("message without sender"))?;
    register(app, user).await?;
    let session = dialogue.get_or_default().await?;
    let route = Route::select(&session, &content);
    log::debug!("chat {}: {:?} -> {:?}", dialogue.chat_id().0, session, route);
    let bound = route.is_bound();
    let result = dispatch(bot, dialogue, msg, user, content, app, route).await;
    // a flow whose ticket or product is gone is dropped
    if let Err(e) = &result {
        if bound && e.kind() == ErrorKind::NotFound {
            dialogue.exit().await.ok_or_log();
        }
    }
    result
}

async fn dispatch(
    bot: &WBot,
    dialogue: &MyDialogue,
    msg: &Message,
    user: &User,
    content: Content,
    app: &AppRef,
    route: Route,
) -> BotResult<()> {
    match route {
        Route::CasePhone(product_id) => warranty::on_phone(bot, dialogue, product_id, &content).await,
        Route::CaseDescription(product_id, phone) => warranty::on_description(bot, dialogue, app, user, product_id, phone, &content).await,
        Route::Support(ticket_id) => support::on_user_message(bot, dialogue, app, user, ticket_id, msg, &content).await,
        Route::AdminResponse(ticket_id) => support::on_admin_message(bot, dialogue, app, user, ticket_id, msg, &content).await,
        Route::Broadcast => admin::on_broadcast(bot, dialogue, app, msg).await,
        Route::PromoIntake => admin::on_promo_codes(bot, dialogue, app, &content).await,
        Route::Activation(product_id) => warranty::on_screenshot(bot, dialogue, app, user, product_id, &content).await,
        Route::AwaitingConfirmation => {
            bot.send_message(dialogue.chat_id(), res::STILL_UNDER_REVIEW).await?;
            Ok(())
        },
        Route::AiChat => user::ai_chat(bot, dialogue.chat_id(), app, user, &content).await,
        Route::SendText => {
            bot.send_message(dialogue.chat_id(), res::SEND_TEXT).await?;
            Ok(())
        },
    }
}

async fn on_callback(bot: WBot, dialogue: MyDialogue, query: CallbackQuery, app: AppRef) -> FSMResult {
    bot.answer_callback_query(query.id.clone()).await.ok_or_log();
    let result = route_callback(&bot, &dialogue, &query, &app).await;
    report(&bot, &dialogue, result).await
}

async fn route_callback(bot: &WBot, dialogue: &MyDialogue, query: &CallbackQuery, app: &AppRef) -> BotResult<()> {
    let data = query.data.as_deref().ok_or_else(|| BotError::validation("callback without data"))?;
    let callback = Callback::from_data(data)?;
    let user = &query.from;
    if callback.admin_only() && !app.config.is_admin(user.id) {
        return Err(BotError::PermissionDenied)
    }
    register(app, user).await?;
    let chat_id = dialogue.chat_id();
    match callback {
        Callback::MainMenu => user::main_menu(bot, chat_id).await,
        Callback::Catalog => user::catalog(bot, chat_id, app).await,
        Callback::Category(id) => user::category(bot, chat_id, app, id).await,
        Callback::Product(id) => user::product(bot, chat_id, app, id).await,
        Callback::MyWarranties => user::my_warranties(bot, chat_id, app, user).await,
        Callback::Promo => user::promo(bot, chat_id, app, user).await,
        Callback::Warranty(id) | Callback::RetryActivation(id) => warranty::show(bot, dialogue, app, user, id).await,
        Callback::ReportCase(id) => warranty::report_case(bot, dialogue, app, user, id).await,
        Callback::Support => support::start(bot, dialogue, app, user).await,
        Callback::Platform(index) => support::open(bot, dialogue, app, user, index).await,
        Callback::Accept(id) => support::accept(bot, dialogue, app, user, id).await,
        Callback::Respond(id) => support::respond(bot, dialogue, app, id).await,
        Callback::History(id) => support::history(bot, chat_id, app, user, id).await,
        Callback::CloseTicket(id) => support::close(bot, dialogue, app, user, id).await,
        Callback::Approve(id) => warranty::decide(bot, chat_id, app, id, true).await,
        Callback::Reject(id) => warranty::decide(bot, chat_id, app, id, false).await,
    }
}
