use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

mod session;
mod sqlite;

pub use session::{SessionError, SessionStorage};
pub use sqlite::Storage;

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub full_name: String,
    pub created_at: i64,
    pub screenshot_attempts: i64,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Product {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub photo: Option<String>,
    pub warranty_months: i64,
    pub review_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString, strum_macros::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString, strum_macros::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum SenderRole {
    User,
    Admin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub id: i64,
    pub user_id: i64,
    pub platform: String,
    pub status: TicketStatus,
    pub admin_id: Option<i64>,
    pub created_at: i64,
    pub accepted_at: Option<i64>,
    pub closed_at: Option<i64>,
    pub reminder_sent: bool,
    pub second_reminder_sent: bool,
    pub escalated: bool,
    pub unread_by_admin: bool,
    pub unread_by_user: bool,
}

impl Ticket {
    pub fn is_active(&self) -> bool {
        self.status != TicketStatus::Closed
    }
}

impl FromRow<'_, SqliteRow> for Ticket {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let status: String = row.try_get("status")?;
        let status = status.parse().map_err(|e| sqlx::Error::ColumnDecode {
            index: "status".into(),
            source: Box::new(e),
        })?;
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            platform: row.try_get("platform")?,
            status,
            admin_id: row.try_get("admin_id")?,
            created_at: row.try_get("created_at")?,
            accepted_at: row.try_get("accepted_at")?,
            closed_at: row.try_get("closed_at")?,
            reminder_sent: row.try_get("reminder_sent")?,
            second_reminder_sent: row.try_get("second_reminder_sent")?,
            escalated: row.try_get("escalated")?,
            unread_by_admin: row.try_get("unread_by_admin")?,
            unread_by_user: row.try_get("unread_by_user")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupportMessage {
    pub id: i64,
    pub ticket_id: i64,
    pub sender_id: i64,
    pub sender_role: SenderRole,
    pub content: String,
    pub created_at: i64,
}

impl FromRow<'_, SqliteRow> for SupportMessage {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let role: String = row.try_get("sender_role")?;
        let sender_role = role.parse().map_err(|e| sqlx::Error::ColumnDecode {
            index: "sender_role".into(),
            source: Box::new(e),
        })?;
        Ok(Self {
            id: row.try_get("id")?,
            ticket_id: row.try_get("ticket_id")?,
            sender_id: row.try_get("sender_id")?,
            sender_role,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Escalation stages of a ticket nobody has accepted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationStage {
    Reminder,
    SecondReminder,
    Owner,
}

impl EscalationStage {
    pub const ALL: [EscalationStage; 3] = [Self::Reminder, Self::SecondReminder, Self::Owner];

    pub fn after_minutes(self) -> i64 {
        match self {
            Self::Reminder => 5,
            Self::SecondReminder => 10,
            Self::Owner => 15,
        }
    }

    fn flag_column(self) -> &'static str {
        match self {
            Self::Reminder => "reminder_sent",
            Self::SecondReminder => "second_reminder_sent",
            Self::Owner => "escalated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarrantyEntry {
    pub product_id: i64,
    pub product_name: String,
    pub screenshot: String,
    pub started: NaiveDate,
    pub ends: NaiveDate,
}

impl WarrantyEntry {
    pub fn new(product: &Product, screenshot: String, started: NaiveDate) -> Self {
        let months = Months::new(product.warranty_months.max(0) as u32);
        let ends = started.checked_add_months(months).unwrap_or(NaiveDate::MAX);
        Self {
            product_id: product.id,
            product_name: product.name.clone(),
            screenshot,
            started,
            ends,
        }
    }

    pub fn is_active(&self, today: NaiveDate) -> bool {
        self.ends >= today
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarrantyInsert {
    Added,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct PendingScreenshot {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub file_id: String,
    pub unique_id: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct WarrantyCase {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub phone: String,
    pub description: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromoIssue {
    Existing(String),
    Issued(String),
    Exhausted,
}

/// A row of the warranty spreadsheet.
#[derive(Debug, Clone, PartialEq)]
pub struct WarrantyRow {
    pub user_id: i64,
    pub username: Option<String>,
    pub entry: WarrantyEntry,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stats {
    pub users: i64,
    pub open_tickets: i64,
    pub in_progress_tickets: i64,
    pub warranties: i64,
    pub promo_total: i64,
    pub promo_issued: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogFile {
    pub categories: Vec<CategoryImport>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryImport {
    pub name: String,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub products: Vec<ProductImport>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductImport {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: i64,
    pub photo: Option<String>,
    #[serde(default = "default_warranty_months")]
    pub warranty_months: i64,
    pub review_url: Option<String>,
}

fn default_warranty_months() -> i64 {
    12
}
