use chrono::{TimeZone, Utc};
use teloxide::payloads::SendMessageSetters;

use crate::bots::make_username;
use crate::persistent::{EscalationStage, SenderRole, Ticket, TicketStatus};

use super::super::entity::{split_text, TEXT_LIMIT};
use super::*;

const HISTORY_DEPTH: i64 = 20;

async fn find_ticket(app: &AppRef, id: i64) -> BotResult<Ticket> {
    app.db.ticket(id).await?.ok_or_else(|| BotError::not_found(format!("ticket {}", id)))
}

fn status_name(status: TicketStatus) -> &'static str {
    match status {
        TicketStatus::Open => "ожидает ответа",
        TicketStatus::InProgress => "в работе",
        TicketStatus::Closed => "закрыто",
    }
}

fn ticket_card(ticket: &Ticket, owner: &str) -> String {
    format!(
        "Обращение #{}\nКлиент: {}\nПлощадка: {}\nСтатус: {}",
        ticket.id, owner, ticket.platform, status_name(ticket.status)
    )
}

async fn owner_name(app: &AppRef, ticket: &Ticket) -> BotResult<String> {
    let name = match app.db.get_user(ticket.user_id).await? {
        Some(user) => match user.username {
            Some(nick) => format!("{} [@{}]", user.full_name, nick),
            None => user.full_name,
        },
        None => format!("id {}", ticket.user_id),
    };
    Ok(name)
}

/// Header with the ticket buttons, then a copy of the original message.
async fn relay(bot: &WBot, to: ChatId, header: &str, msg: &Message, markup: InlineKeyboardMarkup) -> BotResult<()> {
    bot.send_message(to, header).reply_markup(markup).await?;
    bot.copy_message(to, msg.chat.id, msg.id).await?;
    Ok(())
}

/// Drops the chat's session if it is bound to the ticket.
async fn leave_ticket(app: &AppRef, chat_id: ChatId, ticket_id: i64) -> BotResult<()> {
    let dialogue = MyDialogue::new(app.sessions.clone(), chat_id);
    match dialogue.get().await? {
        Some(Session::Support { ticket_id: bound }) | Some(Session::AdminResponse { ticket_id: bound }) if bound == ticket_id => {
            dialogue.exit().await?;
        },
        _ => {},
    }
    Ok(())
}

/// Resumes the user's active ticket, or asks where the product was bought.
pub(super) async fn start(bot: &WBot, dialogue: &MyDialogue, app: &AppRef, user: &User) -> BotResult<()> {
    if let Some(ticket) = app.db.active_ticket(user_key(user)).await? {
        dialogue.update(Session::Support { ticket_id: ticket.id }).await?;
        let text = match ticket.unread_by_user {
            true => format!("{}\n{}", res::TICKET_RESUMED, res::UNREAD_REPLIES),
            false => res::TICKET_RESUMED.to_owned(),
        };
        bot.send_message(dialogue.chat_id(), text).reply_markup(keyboards::ticket_user(ticket.id)?).await?;
        return Ok(())
    }
    bot.send_message(dialogue.chat_id(), res::CHOOSE_PLATFORM).reply_markup(keyboards::platforms(&app.config.platforms)?).await?;
    Ok(())
}

pub(super) async fn open(bot: &WBot, dialogue: &MyDialogue, app: &AppRef, user: &User, platform: u8) -> BotResult<()> {
    let platform = app.config.platform(platform).ok_or_else(|| BotError::validation(format!("platform {}", platform)))?;
    let (ticket, created) = app.db.open_ticket(user_key(user), platform, now()).await?;
    dialogue.update(Session::Support { ticket_id: ticket.id }).await?;
    if created {
        log::info!("ticket {} opened by {}", ticket.id, user.id.0);
        let card = format!("🆕 {}", ticket_card(&ticket, &make_username(user)));
        notify_admins(bot, app, card, Some(keyboards::ticket_admin(&ticket)?)).await;
        bot.send_message(dialogue.chat_id(), res::TICKET_OPENED).reply_markup(keyboards::ticket_user(ticket.id)?).await?;
    } else {
        bot.send_message(dialogue.chat_id(), res::TICKET_RESUMED).reply_markup(keyboards::ticket_user(ticket.id)?).await?;
    }
    Ok(())
}

pub(super) async fn on_user_message(
    bot: &WBot,
    dialogue: &MyDialogue,
    app: &AppRef,
    user: &User,
    ticket_id: i64,
    msg: &Message,
    content: &Content,
) -> BotResult<()> {
    let ticket = find_ticket(app, ticket_id).await?;
    if !ticket.is_active() {
        dialogue.exit().await?;
        bot.send_message(dialogue.chat_id(), res::NO_TICKET).reply_markup(keyboards::main_menu()?).await?;
        return Ok(())
    }
    app.db.add_message(ticket.id, user_key(user), SenderRole::User, &content.describe(), now()).await?;
    let header = format!("💬 #{} {}:", ticket.id, make_username(user));
    let markup = keyboards::ticket_admin(&ticket)?;
    let delivered = match (ticket.status, ticket.admin_id) {
        (TicketStatus::InProgress, Some(admin)) => {
            relay(bot, ChatId(admin), &header, msg, markup).await.ok_or_log().is_some()
        },
        _ => {
            let mut delivered = false;
            for admin in app.config.admin_ids() {
                delivered |= relay(bot, ChatId::from(admin), &header, msg, markup.clone()).await.ok_or_log().is_some();
            }
            delivered
        },
    };
    if !delivered {
        log::warn!("message of ticket {} reached no admin", ticket.id);
        bot.send_message(dialogue.chat_id(), res::MESSAGE_NOT_DELIVERED).await?;
    } else if ticket.status == TicketStatus::Open {
        bot.send_message(dialogue.chat_id(), res::MESSAGE_SENT).await?;
    }
    Ok(())
}

pub(super) async fn on_admin_message(
    bot: &WBot,
    dialogue: &MyDialogue,
    app: &AppRef,
    admin: &User,
    ticket_id: i64,
    msg: &Message,
    content: &Content,
) -> BotResult<()> {
    let ticket = find_ticket(app, ticket_id).await?;
    if !ticket.is_active() {
        dialogue.exit().await?;
        bot.send_message(dialogue.chat_id(), format!("Обращение #{} уже закрыто", ticket.id)).await?;
        return Ok(())
    }
    app.db.add_message(ticket.id, user_key(admin), SenderRole::Admin, &content.describe(), now()).await?;
    relay(bot, ChatId(ticket.user_id), "💬 Менеджер:", msg, keyboards::ticket_user(ticket.id)?).await?;
    Ok(())
}

/// Assigns the ticket to the admin. Only the first of concurrent accepts wins.
pub(super) async fn accept(bot: &WBot, dialogue: &MyDialogue, app: &AppRef, admin: &User, ticket_id: i64) -> BotResult<()> {
    let ticket = find_ticket(app, ticket_id).await?;
    if !app.db.accept_ticket(ticket.id, user_key(admin), now()).await? {
        let text = match ticket.status {
            TicketStatus::Closed => format!("Обращение #{} уже закрыто", ticket.id),
            _ => res::TICKET_TAKEN.to_owned(),
        };
        bot.send_message(dialogue.chat_id(), text).await?;
        return Ok(())
    }
    log::info!("ticket {} accepted by {}", ticket.id, admin.id.0);
    let ticket = find_ticket(app, ticket_id).await?;
    dialogue.update(Session::AdminResponse { ticket_id: ticket.id }).await?;
    bot.send_message(ChatId(ticket.user_id), res::TICKET_ACCEPTED_USER).await.ok_or_log();
    let admin_name = make_username(admin);
    for other in app.config.admin_ids().filter(|id| *id != admin.id) {
        bot.send_message(ChatId::from(other), format!("Обращение #{} взял {}", ticket.id, admin_name)).await.ok_or_log();
    }
    let owner = owner_name(app, &ticket).await?;
    bot.send_message(dialogue.chat_id(), format!("{}\n\n{}", ticket_card(&ticket, &owner), res::RESPOND_PROMPT))
        .reply_markup(keyboards::ticket_admin(&ticket)?).await?;
    history(bot, dialogue.chat_id(), app, admin, ticket.id).await.ok_or_log();
    Ok(())
}

pub(super) async fn respond(bot: &WBot, dialogue: &MyDialogue, app: &AppRef, ticket_id: i64) -> BotResult<()> {
    let ticket = find_ticket(app, ticket_id).await?;
    if !ticket.is_active() {
        bot.send_message(dialogue.chat_id(), format!("Обращение #{} уже закрыто", ticket.id)).await?;
        return Ok(())
    }
    dialogue.update(Session::AdminResponse { ticket_id: ticket.id }).await?;
    bot.send_message(dialogue.chat_id(), res::RESPOND_PROMPT).await?;
    Ok(())
}

fn can_see(app: &AppRef, user: &User, ticket: &Ticket) -> Option<SenderRole> {
    if app.config.is_admin(user.id) {
        Some(SenderRole::Admin)
    } else if ticket.user_id == user_key(user) {
        Some(SenderRole::User)
    } else {
        None
    }
}

/// Shows the last messages of the ticket and marks them read for the viewer.
pub(super) async fn history(bot: &WBot, chat_id: ChatId, app: &AppRef, user: &User, ticket_id: i64) -> BotResult<()> {
    let ticket = find_ticket(app, ticket_id).await?;
    let reader = can_see(app, user, &ticket).ok_or(BotError::PermissionDenied)?;
    let messages = app.db.messages(ticket.id, HISTORY_DEPTH).await?;
    let text = if messages.is_empty() {
        format!("Обращение #{}: сообщений пока нет", ticket.id)
    } else {
        let lines: Vec<_> = messages.iter().map(|m| {
            let who = match m.sender_role {
                SenderRole::User => "Клиент",
                SenderRole::Admin => "Менеджер",
            };
            let time = Utc.timestamp_opt(m.created_at, 0).single()
                .map(|t| t.format("%d.%m %H:%M").to_string())
                .unwrap_or_default();
            format!("[{}] {}: {}", time, who, m.content)
        }).collect();
        format!("Обращение #{}\n\n{}", ticket.id, lines.join("\n"))
    };
    for part in split_text(&text, TEXT_LIMIT) {
        bot.send_message(chat_id, part).await?;
    }
    app.db.mark_read(ticket.id, reader).await?;
    Ok(())
}

/// Closes the ticket on behalf of its owner or any admin.
pub(super) async fn close(bot: &WBot, dialogue: &MyDialogue, app: &AppRef, user: &User, ticket_id: i64) -> BotResult<()> {
    let ticket = find_ticket(app, ticket_id).await?;
    let closer = can_see(app, user, &ticket).ok_or(BotError::PermissionDenied)?;
    if !app.db.close_ticket(ticket.id, now()).await? {
        bot.send_message(dialogue.chat_id(), format!("Обращение #{} уже закрыто", ticket.id)).await?;
        return Ok(())
    }
    log::info!("ticket {} closed by {}", ticket.id, user.id.0);
    leave_ticket(app, ChatId(ticket.user_id), ticket.id).await?;
    if let Some(admin) = ticket.admin_id {
        leave_ticket(app, ChatId(admin), ticket.id).await?;
    }
    leave_ticket(app, dialogue.chat_id(), ticket.id).await?;
    match closer {
        SenderRole::User => {
            bot.send_message(dialogue.chat_id(), res::TICKET_CLOSED).reply_markup(keyboards::main_menu()?).await?;
            let text = format!("Клиент закрыл обращение #{}", ticket.id);
            match ticket.admin_id {
                Some(admin) => {
                    bot.send_message(ChatId(admin), text).await.ok_or_log();
                },
                None => {
                    notify_admins(bot, app, text, None).await;
                },
            }
        },
        SenderRole::Admin => {
            bot.send_message(ChatId(ticket.user_id), res::TICKET_CLOSED).reply_markup(keyboards::main_menu()?).await.ok_or_log();
            bot.send_message(dialogue.chat_id(), format!("Обращение #{} закрыто", ticket.id)).await?;
        },
    }
    Ok(())
}

/// `/close` from a user: closes their active ticket.
pub(super) async fn close_own(bot: &WBot, dialogue: &MyDialogue, app: &AppRef, user: &User) -> BotResult<()> {
    match app.db.active_ticket(user_key(user)).await? {
        Some(ticket) => close(bot, dialogue, app, user, ticket.id).await,
        None => {
            bot.send_message(dialogue.chat_id(), res::NO_TICKET).await?;
            Ok(())
        }
    }
}

pub(super) async fn list_tickets(bot: &WBot, chat_id: ChatId, app: &AppRef) -> BotResult<()> {
    let tickets = app.db.active_tickets().await?;
    if tickets.is_empty() {
        bot.send_message(chat_id, res::NO_ACTIVE_TICKETS).await?;
        return Ok(())
    }
    for ticket in tickets {
        let owner = owner_name(app, &ticket).await?;
        let mut card = ticket_card(&ticket, &owner);
        if ticket.unread_by_admin {
            card.push_str("\n📩 есть непрочитанные сообщения");
        }
        bot.send_message(chat_id, card).reply_markup(keyboards::ticket_admin(&ticket)?).await?;
    }
    Ok(())
}

/// Sends the escalation notice of `stage` for a ticket nobody has accepted.
pub async fn notify_stage(bot: &WBot, app: &AppRef, ticket: &Ticket, stage: EscalationStage) -> BotResult<()> {
    let owner = owner_name(app, ticket).await?;
    let header = match stage {
        EscalationStage::Reminder => res::REMINDER,
        EscalationStage::SecondReminder => res::SECOND_REMINDER,
        EscalationStage::Owner => res::ESCALATION,
    };
    let text = format!("{}\n{}", header, ticket_card(ticket, &owner));
    let markup = keyboards::ticket_admin(ticket)?;
    match stage {
        EscalationStage::Owner => {
            let owner_id = app.config.owner_id().ok_or_else(|| BotError::not_found("owner"))?;
            bot.send_message(ChatId::from(owner_id), text).reply_markup(markup).await?;
        },
        _ => {
            notify_admins(bot, app, text, Some(markup)).await;
        },
    }
    Ok(())
}
