use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::bots::CallbackMessage;
use crate::error::BotResult;
use crate::persistent::{Category, Product, Ticket, TicketStatus};

use super::entity::Callback;
use super::res::*;

fn button<T: Into<String>>(text: T, callback: Callback) -> BotResult<InlineKeyboardButton> {
    Ok(InlineKeyboardButton::callback(text, callback.to_data()?))
}

pub fn main_menu() -> BotResult<InlineKeyboardMarkup> {
    Ok(InlineKeyboardMarkup::new(vec![
        vec![button(BTN_CATALOG, Callback::Catalog)?],
        vec![button(BTN_WARRANTIES, Callback::MyWarranties)?, button(BTN_PROMO, Callback::Promo)?],
        vec![button(BTN_SUPPORT, Callback::Support)?],
    ]))
}

pub fn back_to_menu() -> BotResult<InlineKeyboardMarkup> {
    Ok(InlineKeyboardMarkup::new(vec![vec![button(BTN_BACK, Callback::MainMenu)?]]))
}

pub fn categories(categories: &[Category]) -> BotResult<InlineKeyboardMarkup> {
    let mut rows = Vec::with_capacity(categories.len() + 1);
    for c in categories {
        rows.push(vec![button(c.name.as_str(), Callback::Category(c.id))?]);
    }
    rows.push(vec![button(BTN_BACK, Callback::MainMenu)?]);
    Ok(InlineKeyboardMarkup::new(rows))
}

pub fn products(products: &[Product]) -> BotResult<InlineKeyboardMarkup> {
    let mut rows = Vec::with_capacity(products.len() + 1);
    for p in products {
        rows.push(vec![button(p.name.as_str(), Callback::Product(p.id))?]);
    }
    rows.push(vec![button(BTN_BACK, Callback::Catalog)?]);
    Ok(InlineKeyboardMarkup::new(rows))
}

pub fn product_menu(product: &Product) -> BotResult<InlineKeyboardMarkup> {
    Ok(InlineKeyboardMarkup::new(vec![
        vec![button(BTN_WARRANTY, Callback::Warranty(product.id))?],
        vec![button(BTN_SUPPORT, Callback::Support)?],
        vec![button(BTN_BACK, Callback::Category(product.category_id))?],
    ]))
}

pub fn activation(product: &Product) -> BotResult<InlineKeyboardMarkup> {
    let mut rows = Vec::new();
    if let Some(url) = product.review_url.as_deref().and_then(|u| url::Url::parse(u).ok()) {
        rows.push(vec![InlineKeyboardButton::url(BTN_REVIEW, url)]);
    }
    rows.push(vec![button(BTN_BACK, Callback::Product(product.id))?]);
    Ok(InlineKeyboardMarkup::new(rows))
}

pub fn active_warranty(product_id: i64) -> BotResult<InlineKeyboardMarkup> {
    Ok(InlineKeyboardMarkup::new(vec![
        vec![button(BTN_REPORT_CASE, Callback::ReportCase(product_id))?],
        vec![button(BTN_BACK, Callback::Product(product_id))?],
    ]))
}

pub fn retry(product_id: i64) -> BotResult<InlineKeyboardMarkup> {
    Ok(InlineKeyboardMarkup::new(vec![vec![button(BTN_RETRY, Callback::RetryActivation(product_id))?]]))
}

pub fn platforms(platforms: &[String]) -> BotResult<InlineKeyboardMarkup> {
    let mut rows = Vec::with_capacity(platforms.len());
    for (i, p) in platforms.iter().enumerate().take(u8::MAX as usize) {
        rows.push(vec![button(p.as_str(), Callback::Platform(i as u8))?]);
    }
    Ok(InlineKeyboardMarkup::new(rows))
}

/// Buttons under a ticket card shown to admins.
pub fn ticket_admin(ticket: &Ticket) -> BotResult<InlineKeyboardMarkup> {
    let first = match ticket.status {
        TicketStatus::Open => button(BTN_ACCEPT, Callback::Accept(ticket.id))?,
        _ => button(BTN_RESPOND, Callback::Respond(ticket.id))?,
    };
    Ok(InlineKeyboardMarkup::new(vec![
        vec![first, button(BTN_HISTORY, Callback::History(ticket.id))?],
        vec![button(BTN_CLOSE, Callback::CloseTicket(ticket.id))?],
    ]))
}

pub fn ticket_user(ticket_id: i64) -> BotResult<InlineKeyboardMarkup> {
    Ok(InlineKeyboardMarkup::new(vec![vec![
        button(BTN_HISTORY, Callback::History(ticket_id))?,
        button(BTN_CLOSE, Callback::CloseTicket(ticket_id))?,
    ]]))
}

pub fn confirm_screenshot(pending_id: i64) -> BotResult<InlineKeyboardMarkup> {
    Ok(InlineKeyboardMarkup::new(vec![vec![
        button(BTN_APPROVE, Callback::Approve(pending_id))?,
        button(BTN_REJECT, Callback::Reject(pending_id))?,
    ]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;

    fn ticket(status: TicketStatus) -> Ticket {
        Ticket {
            id: 12, user_id: 5, platform: "Ozon".into(), status, admin_id: None, created_at: 0,
            accepted_at: None, closed_at: None, reminder_sent: false, second_reminder_sent: false,
            escalated: false, unread_by_admin: false, unread_by_user: false,
        }
    }

    fn first_callback(markup: &InlineKeyboardMarkup) -> Callback {
        match &markup.inline_keyboard[0][0].kind {
            InlineKeyboardButtonKind::CallbackData(data) => Callback::from_data(data).unwrap(),
            other => panic!("unexpected button {:?}", other),
        }
    }

    #[test]
    fn open_ticket_offers_accept_then_respond() {
        assert_eq!(first_callback(&ticket_admin(&ticket(TicketStatus::Open)).unwrap()), Callback::Accept(12));
        assert_eq!(first_callback(&ticket_admin(&ticket(TicketStatus::InProgress)).unwrap()), Callback::Respond(12));
    }

    #[test]
    fn platform_buttons_follow_config_order() {
        let markup = platforms(&["Ozon".into(), "Site".into()]).unwrap();
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[1][0].text, "Site");
    }
}
