use serde::{Deserialize, Serialize};
use teloxide::types::Message;
use teloxide::utils::command::BotCommands;

use crate::bots::CallbackMessage;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Команды:")]
pub enum Command {
    #[command(description = "главное меню")]
    Start,
    #[command(description = "помощь")]
    Help,
    #[command(description = "отменить текущее действие")]
    Cancel,
    #[command(description = "написать в поддержку")]
    Support,
    #[command(description = "закрыть обращение")]
    Close,
    #[command(description = "очистить историю диалога")]
    Clear,
}

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Команды администратора:")]
pub enum AdminCommand {
    #[command(description = "активные обращения")]
    Tickets,
    #[command(description = "рассылка")]
    Broadcast,
    #[command(description = "загрузить промокоды")]
    Promo,
    #[command(description = "выгрузка гарантий")]
    Export,
    #[command(description = "статистика")]
    Stats,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum Callback {
    MainMenu,
    Catalog,
    Category(i64),
    Product(i64),
    Warranty(i64),
    MyWarranties,
    ReportCase(i64),
    RetryActivation(i64),
    Promo,
    Support,
    Platform(u8),
    Accept(i64),
    Respond(i64),
    History(i64),
    CloseTicket(i64),
    Approve(i64),
    Reject(i64),
}

impl CallbackMessage for Callback {}

impl Callback {
    pub fn admin_only(&self) -> bool {
        matches!(self, Self::Accept(_) | Self::Respond(_) | Self::Approve(_) | Self::Reject(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Content {
    Text(String),
    Photo {
        file_id: String,
        unique_id: String,
        caption: Option<String>,
    },
    Other,
}

impl Content {
    pub fn from_message(msg: Message) -> Option<Self> {
        if let Some(text) = msg.text() {
            return Some(Self::Text(text.to_owned()))
        }
        if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
            return Some(Self::Photo {
                file_id: photo.file.id.clone(),
                unique_id: photo.file.unique_id.clone(),
                caption: msg.caption().map(str::to_owned),
            })
        }
        msg.from().map(|_| Self::Other)
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Text of the message, or the photo caption.
    pub fn describe(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Photo { caption, .. } => match caption {
                Some(caption) => format!("[фото] {}", caption),
                None => "[фото]".to_owned(),
            },
            Self::Other => "[вложение]".to_owned(),
        }
    }
}

/// Keeps digits and an optional leading plus; 10 to 15 digits make a phone number.
pub fn normalize_phone(text: &str) -> Option<String> {
    let text = text.trim();
    let (plus, rest) = match text.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '(' | ')' => {},
            _ => return None,
        }
    }
    if !(10..=15).contains(&digits.len()) {
        return None
    }
    Some(if plus { format!("+{}", digits) } else { digits })
}

pub fn parse_promo_codes(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Telegram's limit for a text message, in UTF-16 code units.
pub const TEXT_LIMIT: usize = 4096;

/// Cuts `text` into messages within `limit`, breaking between lines where possible.
pub fn split_text(text: &str, limit: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut units = 0;
    for line in text.lines() {
        let line_units = line.encode_utf16().count();
        let sep = usize::from(!current.is_empty());
        if units + sep + line_units <= limit {
            if sep == 1 {
                current.push('\n');
            }
            current.push_str(line);
            units += sep + line_units;
            continue
        }
        if !current.is_empty() {
            parts.push(std::mem::take(&mut current));
            units = 0;
        }
        for c in line.chars() {
            if units + c.len_utf16() > limit {
                parts.push(std::mem::take(&mut current));
                units = 0;
            }
            current.push(c);
            units += c.len_utf16();
        }
    }
    if !current.is_empty() || parts.is_empty() {
        parts.push(current);
    }
    parts
}
