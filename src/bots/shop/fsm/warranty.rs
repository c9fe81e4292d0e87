use teloxide::payloads::{SendMessageSetters, SendPhotoSetters};
use teloxide::types::InputFile;

use crate::bots::make_username;
use crate::export::ExportAction;
use crate::impls::today;
use crate::persistent::{PendingScreenshot, Product, WarrantyEntry, WarrantyInsert, WarrantyRow};
use crate::screenshot::{download_photo, Verdict};

use super::super::entity::normalize_phone;
use super::*;

async fn find_product(app: &AppRef, id: i64) -> BotResult<Product> {
    app.db.product(id).await?.ok_or_else(|| BotError::not_found(format!("product {}", id)))
}

/// Product menu "Warranty": the active warranty, or the activation prompt.
pub(super) async fn show(bot: &WBot, dialogue: &MyDialogue, app: &AppRef, user: &User, product_id: i64) -> BotResult<()> {
    let product = find_product(app, product_id).await?;
    let chat_id = dialogue.chat_id();
    if let Some(warranty) = app.db.active_warranty(user_key(user), product.id, today()).await? {
        let text = format!("Гарантия на «{}» действует до {}", product.name, warranty.ends.format("%d.%m.%Y"));
        bot.send_message(chat_id, text).reply_markup(keyboards::active_warranty(product.id)?).await?;
        return Ok(())
    }
    dialogue.update(Session::WarrantyActivation { product_id: product.id }).await?;
    bot.send_message(chat_id, format!("«{}»\n\n{}", product.name, res::ACTIVATION_PROMPT))
        .reply_markup(keyboards::activation(&product)?).await?;
    Ok(())
}

pub(super) async fn on_screenshot(
    bot: &WBot,
    dialogue: &MyDialogue,
    app: &AppRef,
    user: &User,
    product_id: i64,
    content: &Content,
) -> BotResult<()> {
    let (file_id, unique_id) = match content {
        Content::Photo { file_id, unique_id, .. } => (file_id, unique_id),
        _ => return Err(BotError::validation("screenshot expected")),
    };
    let chat_id = dialogue.chat_id();
    let key = user_key(user);
    let product = find_product(app, product_id).await?;
    if !app.db.register_screenshot_attempt(key, app.config.max_screenshot_attempts).await? {
        dialogue.exit().await?;
        bot.send_message(chat_id, res::ATTEMPTS_EXHAUSTED).await?;
        return Ok(())
    }
    if app.db.screenshot_used(unique_id).await? {
        bot.send_message(chat_id, res::SCREENSHOT_USED).await?;
        return Ok(())
    }
    let verdict = match download_photo(bot, file_id).await {
        Ok(image) => app.verifier.verify(&image).await,
        Err(e) => {
            log::warn!("cannot download screenshot of {}: {}", key, e);
            Verdict::Undetermined
        }
    };
    log::info!("screenshot of {} for product {}: {:?}", key, product.id, verdict);
    match verdict {
        Verdict::Five => {
            activate(bot, app, key, &product, unique_id).await?;
            dialogue.exit().await?;
        },
        Verdict::Rejected(_) => {
            dialogue.exit().await?;
            bot.send_message(chat_id, res::NOT_FIVE_STARS).reply_markup(keyboards::retry(product.id)?).await?;
        },
        Verdict::Undetermined => {
            let pending_id = app.db.add_pending_screenshot(key, product.id, file_id, unique_id, now()).await?;
            let caption = format!("Проверьте скриншот отзыва\nОт: {}\nТовар: {}", make_username(user), product.name);
            let mut delivered = 0;
            for admin in app.config.admin_ids() {
                let sent = bot.send_photo(ChatId::from(admin), InputFile::file_id(file_id.clone()))
                    .caption(caption.clone())
                    .reply_markup(keyboards::confirm_screenshot(pending_id)?)
                    .await;
                if sent.ok_or_log().is_some() {
                    delivered += 1;
                }
            }
            if delivered == 0 {
                log::error!("pending screenshot {} was not delivered to any admin", pending_id);
                app.db.take_pending_screenshot(pending_id).await?;
                bot.send_message(chat_id, res::REVIEW_UNAVAILABLE).await?;
                return Ok(())
            }
            dialogue.update(Session::AwaitingConfirmation { pending_id }).await?;
            bot.send_message(chat_id, res::UNDER_REVIEW).await?;
        },
    }
    Ok(())
}

/// Records the warranty and tells the user. False when the screenshot was already used.
async fn activate(bot: &WBot, app: &AppRef, user_id: i64, product: &Product, unique_id: &str) -> BotResult<bool> {
    let entry = WarrantyEntry::new(product, unique_id.to_owned(), today());
    let user_chat = ChatId(user_id);
    let markup = keyboards::main_menu()?;
    match app.db.add_warranty(user_id, &entry).await? {
        WarrantyInsert::Added => {
            let username = app.db.get_user(user_id).await.ok_or_log().flatten().and_then(|u| u.username);
            let text = format!("Гарантия на «{}» активирована до {}", entry.product_name, entry.ends.format("%d.%m.%Y"));
            app.export.send(ExportAction::Activated(WarrantyRow { user_id, username, entry })).ok_or_log();
            bot.send_message(user_chat, text).reply_markup(markup).await.ok_or_log();
            Ok(true)
        },
        WarrantyInsert::Duplicate => {
            bot.send_message(user_chat, res::SCREENSHOT_USED).await.ok_or_log();
            Ok(false)
        },
    }
}

/// Admin decision on a screenshot the verifier could not judge.
pub(super) async fn decide(bot: &WBot, admin_chat: ChatId, app: &AppRef, pending_id: i64, approve: bool) -> BotResult<()> {
    let pending = match app.db.take_pending_screenshot(pending_id).await? {
        Some(pending) => pending,
        None => {
            bot.send_message(admin_chat, res::ALREADY_DECIDED).await?;
            return Ok(())
        }
    };
    let user_chat = ChatId(pending.user_id);
    let summary = if approve {
        match approve_pending(bot, app, &pending).await {
            Ok(summary) => summary,
            Err(e) => {
                // the decision can be repeated
                app.db.restore_pending_screenshot(&pending).await.ok_or_log();
                return Err(e)
            }
        }
    } else {
        bot.send_message(user_chat, res::SCREENSHOT_REJECTED)
            .reply_markup(keyboards::retry(pending.product_id)?).await.ok_or_log();
        "Скриншот отклонён"
    };
    release_waiting(app, user_chat, pending_id).await.ok_or_log();
    bot.send_message(admin_chat, summary).await?;
    Ok(())
}

async fn approve_pending(bot: &WBot, app: &AppRef, pending: &PendingScreenshot) -> BotResult<&'static str> {
    let product = match app.db.product(pending.product_id).await? {
        Some(product) => product,
        None => {
            bot.send_message(ChatId(pending.user_id), res::PRODUCT_GONE).await.ok_or_log();
            return Ok("Товар удалён из каталога, гарантия не добавлена")
        }
    };
    Ok(match activate(bot, app, pending.user_id, &product, &pending.unique_id).await? {
        true => "Гарантия подтверждена",
        false => "Скриншот уже использовался, гарантия не добавлена",
    })
}

/// Ends the user's wait for this screenshot, leaving any newer flow alone.
async fn release_waiting(app: &AppRef, user_chat: ChatId, pending_id: i64) -> BotResult<()> {
    let user_dialogue = MyDialogue::new(app.sessions.clone(), user_chat);
    if let Some(Session::AwaitingConfirmation { pending_id: waiting }) = user_dialogue.get().await? {
        if waiting == pending_id {
            user_dialogue.exit().await?;
        }
    }
    Ok(())
}

/// Starts the warranty case intake for a product the user holds a warranty on.
pub(super) async fn report_case(bot: &WBot, dialogue: &MyDialogue, app: &AppRef, user: &User, product_id: i64) -> BotResult<()> {
    if app.db.active_warranty(user_key(user), product_id, today()).await?.is_none() {
        return show(bot, dialogue, app, user, product_id).await
    }
    dialogue.update(Session::CasePhone { product_id }).await?;
    bot.send_message(dialogue.chat_id(), res::SEND_PHONE).await?;
    Ok(())
}

pub(super) async fn on_phone(bot: &WBot, dialogue: &MyDialogue, product_id: i64, content: &Content) -> BotResult<()> {
    let text = content.text().unwrap_or_default();
    match normalize_phone(text) {
        Some(phone) => {
            dialogue.update(Session::CaseDescription { product_id, phone }).await?;
            bot.send_message(dialogue.chat_id(), res::SEND_DESCRIPTION).await?;
        },
        None => {
            bot.send_message(dialogue.chat_id(), res::BAD_PHONE).await?;
        },
    }
    Ok(())
}

pub(super) async fn on_description(
    bot: &WBot,
    dialogue: &MyDialogue,
    app: &AppRef,
    user: &User,
    product_id: i64,
    phone: String,
    content: &Content,
) -> BotResult<()> {
    let description = content.text().map(str::trim).unwrap_or_default();
    if description.is_empty() {
        bot.send_message(dialogue.chat_id(), res::EMPTY_DESCRIPTION).await?;
        return Ok(())
    }
    let product = find_product(app, product_id).await?;
    let case_id = app.db.add_warranty_case(user_key(user), product.id, &phone, description, now()).await?;
    log::info!("warranty case {} registered by {}", case_id, user.id.0);
    let text = format!(
        "🛠 Гарантийный случай #{}\nОт: {}\nТовар: {}\nТелефон: {}\n\n{}",
        case_id, make_username(user), product.name, phone, description
    );
    notify_admins(bot, app, text, None).await;
    dialogue.exit().await?;
    bot.send_message(dialogue.chat_id(), res::CASE_REGISTERED).reply_markup(keyboards::main_menu()?).await?;
    Ok(())
}
