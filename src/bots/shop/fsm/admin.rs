use teloxide::payloads::SendDocumentSetters;
use teloxide::types::InputFile;

use crate::export::{write_workbook, ExportAction};

use super::super::entity::parse_promo_codes;
use super::*;

pub(super) async fn on_command(bot: WBot, dialogue: MyDialogue, msg: Message, cmd: AdminCommand, app: AppRef) -> FSMResult {
    let result = command(&bot, &dialogue, &msg, cmd, &app).await;
    report(&bot, &dialogue, result).await
}

async fn command(bot: &WBot, dialogue: &MyDialogue, msg: &Message, cmd: AdminCommand, app: &AppRef) -> BotResult<()> {
    let admin = msg.from().ok_or_else(|| BotError::validation("command without sender"))?;
    if !app.config.is_admin(admin.id) {
        return Err(BotError::PermissionDenied)
    }
    let chat_id = dialogue.chat_id();
    match cmd {
        AdminCommand::Tickets => support::list_tickets(bot, chat_id, app).await?,
        AdminCommand::Broadcast => {
            dialogue.update(Session::Broadcast).await?;
            bot.send_message(chat_id, res::BROADCAST_PROMPT).await?;
        },
        AdminCommand::Promo => {
            dialogue.update(Session::PromoIntake).await?;
            bot.send_message(chat_id, res::PROMO_INTAKE).await?;
        },
        AdminCommand::Export => export(bot, chat_id, app).await?,
        AdminCommand::Stats => {
            let stats = app.db.stats().await?;
            let text = format!(
                "Пользователей: {}\nОбращений ожидает ответа: {}\nОбращений в работе: {}\nАктивировано гарантий: {}\nПромокодов выдано: {} из {}",
                stats.users, stats.open_tickets, stats.in_progress_tickets, stats.warranties,
                stats.promo_issued, stats.promo_total,
            );
            bot.send_message(chat_id, text).await?;
        },
    }
    Ok(())
}

async fn export(bot: &WBot, chat_id: ChatId, app: &AppRef) -> BotResult<()> {
    let rows = app.db.warranty_rows().await?;
    let count = rows.len();
    let path = std::env::temp_dir().join(format!("warranty-{}-{}.xlsx", chat_id.0, now()));
    let target = path.clone();
    tokio::task::spawn_blocking(move || write_workbook(&target, &rows))
        .await
        .map_err(anyhow::Error::from)??;
    let sent = bot.send_document(chat_id, InputFile::file(path.clone()))
        .caption(format!("Активаций гарантии: {}", count))
        .await;
    tokio::fs::remove_file(&path).await.ok_or_log();
    sent?;
    app.export.send(ExportAction::Rebuild).ok_or_log();
    Ok(())
}

/// Copies the admin's message to every known user.
pub(super) async fn on_broadcast(bot: &WBot, dialogue: &MyDialogue, app: &AppRef, msg: &Message) -> BotResult<()> {
    dialogue.exit().await?;
    let users = app.db.all_user_ids().await?;
    let (mut delivered, mut failed) = (0, 0);
    for user_id in users {
        match bot.copy_message(ChatId(user_id), msg.chat.id, msg.id).await {
            Ok(_) => delivered += 1,
            Err(e) => {
                log::warn!("broadcast to {} failed: {}", user_id, e);
                failed += 1;
            }
        }
    }
    log::info!("broadcast done: {} delivered, {} failed", delivered, failed);
    bot.send_message(dialogue.chat_id(), format!("Рассылка завершена. Доставлено: {}, ошибок: {}", delivered, failed)).await?;
    Ok(())
}

pub(super) async fn on_promo_codes(bot: &WBot, dialogue: &MyDialogue, app: &AppRef, content: &Content) -> BotResult<()> {
    let codes = parse_promo_codes(content.text().unwrap_or_default());
    if codes.is_empty() {
        return Err(BotError::validation("no promo codes in message"))
    }
    let added = app.db.add_promo_codes(&codes).await?;
    dialogue.exit().await?;
    bot.send_message(dialogue.chat_id(), format!("Добавлено промокодов: {} из {}", added, codes.len())).await?;
    Ok(())
}
