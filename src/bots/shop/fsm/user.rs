use num_format::{Locale, ToFormattedString};
use teloxide::payloads::{SendMessageSetters, SendPhotoSetters};
use teloxide::types::{ChatAction, InputFile};

use crate::ai::{trim_history, ChatMessage};
use crate::impls::today;
use crate::persistent::{Product, PromoIssue};

use super::*;

pub(super) async fn on_command(bot: WBot, dialogue: MyDialogue, msg: Message, cmd: Command, app: AppRef) -> FSMResult {
    let result = command(&bot, &dialogue, &msg, cmd, &app).await;
    report(&bot, &dialogue, result).await
}

async fn command(bot: &WBot, dialogue: &MyDialogue, msg: &Message, cmd: Command, app: &AppRef) -> BotResult<()> {
    let user = msg.from().ok_or_else(|| BotError::validation("command without sender"))?;
    register(app, user).await?;
    let chat_id = dialogue.chat_id();
    match cmd {
        Command::Start => {
            bot.send_message(chat_id, res::WELCOME).reply_markup(keyboards::main_menu()?).await?;
        },
        Command::Help => {
            let text = if app.config.is_admin(user.id) {
                format!("{}\n\n{}", res::HELP, res::ADMIN_HELP)
            } else {
                res::HELP.to_owned()
            };
            bot.send_message(chat_id, text).await?;
        },
        Command::Cancel => {
            let text = match dialogue.get_or_default().await? {
                Session::Idle => res::NOTHING_TO_CANCEL,
                _ => {
                    dialogue.exit().await?;
                    res::CANCELLED
                }
            };
            bot.send_message(chat_id, text).reply_markup(keyboards::main_menu()?).await?;
        },
        Command::Support => support::start(bot, dialogue, app, user).await?,
        Command::Close => support::close_own(bot, dialogue, app, user).await?,
        Command::Clear => {
            app.db.save_chat_history(user_key(user), &[]).await?;
            bot.send_message(chat_id, res::HISTORY_CLEARED).await?;
        },
    }
    Ok(())
}

pub(super) async fn main_menu(bot: &WBot, chat_id: ChatId) -> BotResult<()> {
    bot.send_message(chat_id, res::MAIN_MENU).reply_markup(keyboards::main_menu()?).await?;
    Ok(())
}

pub(super) async fn catalog(bot: &WBot, chat_id: ChatId, app: &AppRef) -> BotResult<()> {
    let categories = app.db.categories().await?;
    if categories.is_empty() {
        bot.send_message(chat_id, res::NO_CATEGORIES).reply_markup(keyboards::back_to_menu()?).await?;
    } else {
        bot.send_message(chat_id, res::CHOOSE_CATEGORY).reply_markup(keyboards::categories(&categories)?).await?;
    }
    Ok(())
}

pub(super) async fn category(bot: &WBot, chat_id: ChatId, app: &AppRef, id: i64) -> BotResult<()> {
    let category = app.db.category(id).await?.ok_or_else(|| BotError::not_found(format!("category {}", id)))?;
    let products = app.db.products(category.id).await?;
    let text = if products.is_empty() {
        res::NO_PRODUCTS.to_owned()
    } else {
        format!("{}\n{}", category.name, res::CHOOSE_PRODUCT)
    };
    bot.send_message(chat_id, text).reply_markup(keyboards::products(&products)?).await?;
    Ok(())
}

pub(super) async fn product(bot: &WBot, chat_id: ChatId, app: &AppRef, id: i64) -> BotResult<()> {
    let product = app.db.product(id).await?.ok_or_else(|| BotError::not_found(format!("product {}", id)))?;
    let text = product_card(&product);
    let markup = keyboards::product_menu(&product)?;
    match &product.photo {
        Some(photo) => {
            bot.send_photo(chat_id, InputFile::file_id(photo.clone())).caption(text).reply_markup(markup).await?;
        },
        None => {
            bot.send_message(chat_id, text).reply_markup(markup).await?;
        },
    }
    Ok(())
}

fn format_price(price: i64) -> String {
    price.to_formatted_string(&Locale::ru)
}

fn product_card(product: &Product) -> String {
    let mut text = product.name.clone();
    if !product.description.is_empty() {
        text.push_str("\n\n");
        text.push_str(&product.description);
    }
    text.push_str(&format!("\n\nЦена: {} ₽\nРасширенная гарантия: {} мес.", format_price(product.price), product.warranty_months));
    text
}

pub(super) async fn my_warranties(bot: &WBot, chat_id: ChatId, app: &AppRef, user: &User) -> BotResult<()> {
    let warranties = app.db.warranties(user_key(user)).await?;
    if warranties.is_empty() {
        bot.send_message(chat_id, res::NO_WARRANTIES).reply_markup(keyboards::back_to_menu()?).await?;
        return Ok(())
    }
    let today = today();
    let mut lines: Vec<_> = warranties.iter().map(|w| {
        let state = if w.is_active(today) { "действует до" } else { "истекла" };
        format!("• {}: {} {}", w.product_name, state, w.ends.format("%d.%m.%Y"))
    }).collect();
    let cases = app.db.warranty_cases(user_key(user)).await?;
    if let Some(last) = cases.last() {
        lines.push(format!("\nГарантийных обращений: {}, последнее #{}", cases.len(), last.id));
    }
    bot.send_message(chat_id, lines.join("\n")).reply_markup(keyboards::back_to_menu()?).await?;
    Ok(())
}

pub(super) async fn promo(bot: &WBot, chat_id: ChatId, app: &AppRef, user: &User) -> BotResult<()> {
    let text = match app.db.issue_promo(user_key(user), now()).await? {
        PromoIssue::Existing(code) => format!("Ваш промокод: {}", code),
        PromoIssue::Issued(code) => {
            log::info!("promo code issued to {}", user.id.0);
            format!("Ваш промокод: {}", code)
        },
        PromoIssue::Exhausted => res::PROMO_NONE_LEFT.to_owned(),
    };
    bot.send_message(chat_id, text).await?;
    Ok(())
}

pub(super) async fn ai_chat(bot: &WBot, chat_id: ChatId, app: &AppRef, user: &User, content: &Content) -> BotResult<()> {
    let text = content.text().ok_or_else(|| BotError::validation("ai chat needs text"))?;
    let client = match &app.ai {
        Some(client) => client,
        None => {
            bot.send_message(chat_id, res::AI_UNAVAILABLE).await?;
            return Ok(())
        }
    };
    bot.send_chat_action(chat_id, ChatAction::Typing).await.ok_or_log();
    let key = user_key(user);
    let mut history = app.db.chat_history(key).await?;
    let answer = client.reply(&history, text).await?;
    history.push(ChatMessage::user(text));
    history.push(ChatMessage::assistant(answer.as_str()));
    trim_history(&mut history);
    app.db.save_chat_history(key, &history).await?;
    bot.send_message(chat_id, answer).await?;
    Ok(())
}
