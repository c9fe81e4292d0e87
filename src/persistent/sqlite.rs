use std::{str::FromStr, sync::Arc};

use chrono::NaiveDate;
use sqlx::{migrate::Migrator, sqlite::{SqliteConnectOptions, SqlitePoolOptions}, ConnectOptions, SqlitePool};

use crate::ai::ChatMessage;
use super::*;

static MIGRATOR: Migrator = sqlx::migrate!();
type Conn = sqlx::sqlite::SqliteConnection;

pub struct Storage(SqlitePool);

async fn make_pool(db_url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let mut options = SqliteConnectOptions::from_str(db_url)?;
    options.disable_statement_logging();
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    MIGRATOR.run(&pool).await?;
    Ok(pool)
}

impl Storage {
    pub async fn new(db_url: &str) -> anyhow::Result<Arc<Self>> {
        Ok(Arc::new(Self(make_pool(db_url, 8).await?)))
    }
    /// Single-connection in-memory database, every connection of a pool would get its own.
    pub async fn memory() -> anyhow::Result<Arc<Self>> {
        Ok(Arc::new(Self(make_pool("sqlite::memory:", 1).await?)))
    }
    pub fn pool(&self) -> SqlitePool {
        self.0.clone()
    }
    pub async fn close(&self) {
        log::info!("closing database connections...");
        self.0.close().await;
        log::info!("database connections closed!");
    }

    pub async fn ensure_user(&self, id: i64, username: Option<&str>, full_name: &str, now: i64) -> sqlx::Result<bool> {
        let created = sqlx::query("insert or ignore into users (id, username, full_name, created_at) values (?1, ?2, ?3, ?4)")
            .bind(id).bind(username).bind(full_name).bind(now)
            .execute(&self.0).await?
            .rows_affected() == 1;
        if !created {
            sqlx::query("update users set username = ?2, full_name = ?3 where id = ?1")
                .bind(id).bind(username).bind(full_name)
                .execute(&self.0).await?;
        }
        Ok(created)
    }
    pub async fn get_user(&self, id: i64) -> sqlx::Result<Option<User>> {
        sqlx::query_as("select id, username, full_name, created_at, screenshot_attempts from users where id = ?1")
            .bind(id)
            .fetch_optional(&self.0).await
    }
    pub async fn all_user_ids(&self) -> sqlx::Result<Vec<i64>> {
        let ids = sqlx::query_scalar("select id from users order by id").fetch_all(&self.0).await?;
        Ok(ids)
    }

    /// Counts a screenshot attempt unless the daily limit is already spent.
    pub async fn register_screenshot_attempt(&self, user_id: i64, limit: i64) -> sqlx::Result<bool> {
        let res = sqlx::query("update users set screenshot_attempts = screenshot_attempts + 1 where id = ?1 and screenshot_attempts < ?2")
            .bind(user_id).bind(limit)
            .execute(&self.0).await?;
        Ok(res.rows_affected() == 1)
    }
    pub async fn reset_screenshot_attempts(&self) -> sqlx::Result<u64> {
        let res = sqlx::query("update users set screenshot_attempts = 0 where screenshot_attempts > 0")
            .execute(&self.0).await?;
        Ok(res.rows_affected())
    }

    pub async fn chat_history(&self, user_id: i64) -> anyhow::Result<Vec<ChatMessage>> {
        let raw: Option<String> = sqlx::query_scalar("select chat_history from users where id = ?1")
            .bind(user_id)
            .fetch_optional(&self.0).await?;
        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }
    pub async fn save_chat_history(&self, user_id: i64, history: &[ChatMessage]) -> anyhow::Result<()> {
        let raw = serde_json::to_string(history)?;
        sqlx::query("update users set chat_history = ?2 where id = ?1")
            .bind(user_id).bind(raw)
            .execute(&self.0).await?;
        Ok(())
    }

    pub async fn categories(&self) -> sqlx::Result<Vec<Category>> {
        sqlx::query_as("select id, name, position from categories order by position, id")
            .fetch_all(&self.0).await
    }
    pub async fn category(&self, id: i64) -> sqlx::Result<Option<Category>> {
        sqlx::query_as("select id, name, position from categories where id = ?1")
            .bind(id)
            .fetch_optional(&self.0).await
    }
    pub async fn products(&self, category_id: i64) -> sqlx::Result<Vec<Product>> {
        sqlx::query_as("select * from products where category_id = ?1 order by id")
            .bind(category_id)
            .fetch_all(&self.0).await
    }
    pub async fn product(&self, id: i64) -> sqlx::Result<Option<Product>> {
        sqlx::query_as("select * from products where id = ?1")
            .bind(id)
            .fetch_optional(&self.0).await
    }
    /// Upserts categories and products by name. Returns (categories, products) touched.
    pub async fn import_catalog(&self, catalog: CatalogFile) -> anyhow::Result<(usize, usize)> {
        let mut tx = self.0.begin().await?;
        let mut products = 0;
        for category in &catalog.categories {
            sqlx::query("insert into categories (name, position) values (?1, ?2) on conflict(name) do update set position = excluded.position")
                .bind(&category.name).bind(category.position)
                .execute(&mut *tx).await?;
            let category_id: i64 = sqlx::query_scalar("select id from categories where name = ?1")
                .bind(&category.name)
                .fetch_one(&mut *tx).await?;
            for p in &category.products {
                sqlx::query(
                    "insert into products (category_id, name, description, price, photo, warranty_months, review_url)
                     values (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     on conflict(category_id, name) do update set description = excluded.description, price = excluded.price,
                     photo = excluded.photo, warranty_months = excluded.warranty_months, review_url = excluded.review_url"
                )
                    .bind(category_id).bind(&p.name).bind(&p.description).bind(p.price)
                    .bind(&p.photo).bind(p.warranty_months).bind(&p.review_url)
                    .execute(&mut *tx).await?;
                products += 1;
            }
        }
        tx.commit().await?;
        Ok((catalog.categories.len(), products))
    }

    pub async fn warranties(&self, user_id: i64) -> anyhow::Result<Vec<WarrantyEntry>> {
        let mut conn = self.0.acquire().await?;
        warranties(&mut conn, user_id).await
    }
    pub async fn active_warranty(&self, user_id: i64, product_id: i64, today: NaiveDate) -> anyhow::Result<Option<WarrantyEntry>> {
        let found = self.warranties(user_id).await?
            .into_iter()
            .find(|w| w.product_id == product_id && w.is_active(today));
        Ok(found)
    }
    pub async fn screenshot_used(&self, unique_id: &str) -> sqlx::Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("select user_id from warranty_screenshots where unique_id = ?1")
            .bind(unique_id)
            .fetch_optional(&self.0).await?;
        Ok(found.is_some())
    }
    /// Appends the entry to the user's warranty list; a reused screenshot is refused.
    pub async fn add_warranty(&self, user_id: i64, entry: &WarrantyEntry) -> anyhow::Result<WarrantyInsert> {
        let mut tx = self.0.begin().await?;
        let claimed = sqlx::query("insert or ignore into warranty_screenshots (unique_id, user_id, product_id) values (?1, ?2, ?3)")
            .bind(&entry.screenshot).bind(user_id).bind(entry.product_id)
            .execute(&mut *tx).await?
            .rows_affected() == 1;
        if !claimed {
            tx.rollback().await?;
            return Ok(WarrantyInsert::Duplicate)
        }
        let mut list = warranties(&mut tx, user_id).await?;
        list.push(entry.clone());
        let raw = serde_json::to_string(&list)?;
        let updated = sqlx::query("update users set warranties = ?2 where id = ?1")
            .bind(user_id).bind(raw)
            .execute(&mut *tx).await?
            .rows_affected();
        if updated == 0 {
            tx.rollback().await?;
            anyhow::bail!("user {} not found", user_id);
        }
        tx.commit().await?;
        Ok(WarrantyInsert::Added)
    }
    pub async fn warranty_rows(&self) -> anyhow::Result<Vec<WarrantyRow>> {
        let users: Vec<(i64, Option<String>, String)> = sqlx::query_as("select id, username, warranties from users where warranties != '[]' order by id")
            .fetch_all(&self.0).await?;
        let mut rows = Vec::new();
        for (user_id, username, raw) in users {
            let entries: Vec<WarrantyEntry> = serde_json::from_str(&raw)?;
            rows.extend(entries.into_iter().map(|entry| WarrantyRow { user_id, username: username.clone(), entry }));
        }
        rows.sort_by_key(|r| r.entry.started);
        Ok(rows)
    }

    pub async fn add_pending_screenshot(&self, user_id: i64, product_id: i64, file_id: &str, unique_id: &str, now: i64) -> sqlx::Result<i64> {
        let id = sqlx::query("insert into pending_screenshots (user_id, product_id, file_id, unique_id, created_at) values (?1, ?2, ?3, ?4, ?5)")
            .bind(user_id).bind(product_id).bind(file_id).bind(unique_id).bind(now)
            .execute(&self.0).await?
            .last_insert_rowid();
        Ok(id)
    }
    /// Removes and returns the pending screenshot, so only one admin decision applies.
    pub async fn take_pending_screenshot(&self, id: i64) -> sqlx::Result<Option<PendingScreenshot>> {
        let mut tx = self.0.begin().await?;
        let pending: Option<PendingScreenshot> = sqlx::query_as("select * from pending_screenshots where id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx).await?;
        if pending.is_some() {
            sqlx::query("delete from pending_screenshots where id = ?1").bind(id).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(pending)
    }
    /// Puts a taken screenshot back when its decision could not be applied.
    pub async fn restore_pending_screenshot(&self, pending: &PendingScreenshot) -> sqlx::Result<()> {
        sqlx::query("insert or ignore into pending_screenshots (id, user_id, product_id, file_id, unique_id, created_at) values (?1, ?2, ?3, ?4, ?5, ?6)")
            .bind(pending.id).bind(pending.user_id).bind(pending.product_id)
            .bind(&pending.file_id).bind(&pending.unique_id).bind(pending.created_at)
            .execute(&self.0).await?;
        Ok(())
    }

    pub async fn add_warranty_case(&self, user_id: i64, product_id: i64, phone: &str, description: &str, now: i64) -> sqlx::Result<i64> {
        let id = sqlx::query("insert into warranty_cases (user_id, product_id, phone, description, created_at) values (?1, ?2, ?3, ?4, ?5)")
            .bind(user_id).bind(product_id).bind(phone).bind(description).bind(now)
            .execute(&self.0).await?
            .last_insert_rowid();
        Ok(id)
    }
    pub async fn warranty_cases(&self, user_id: i64) -> sqlx::Result<Vec<WarrantyCase>> {
        sqlx::query_as("select * from warranty_cases where user_id = ?1 order by id")
            .bind(user_id)
            .fetch_all(&self.0).await
    }

    pub async fn ticket(&self, id: i64) -> sqlx::Result<Option<Ticket>> {
        sqlx::query_as("select * from support_tickets where id = ?1")
            .bind(id)
            .fetch_optional(&self.0).await
    }
    pub async fn active_ticket(&self, user_id: i64) -> sqlx::Result<Option<Ticket>> {
        sqlx::query_as("select * from support_tickets where user_id = ?1 and status != 'closed' order by id desc limit 1")
            .bind(user_id)
            .fetch_optional(&self.0).await
    }
    /// Returns the user's active ticket, or opens a new one. The bool tells if it was created.
    pub async fn open_ticket(&self, user_id: i64, platform: &str, now: i64) -> sqlx::Result<(Ticket, bool)> {
        if let Some(ticket) = self.active_ticket(user_id).await? {
            return Ok((ticket, false))
        }
        let id = sqlx::query("insert into support_tickets (user_id, platform, status, created_at) values (?1, ?2, ?3, ?4)")
            .bind(user_id).bind(platform).bind(TicketStatus::Open.as_ref()).bind(now)
            .execute(&self.0).await?
            .last_insert_rowid();
        let ticket = sqlx::query_as("select * from support_tickets where id = ?1")
            .bind(id)
            .fetch_one(&self.0).await?;
        Ok((ticket, true))
    }
    /// Assigns the ticket to the admin if nobody has taken it yet.
    pub async fn accept_ticket(&self, id: i64, admin_id: i64, now: i64) -> sqlx::Result<bool> {
        let res = sqlx::query("update support_tickets set status = 'in_progress', admin_id = ?2, accepted_at = ?3 where id = ?1 and status = 'open'")
            .bind(id).bind(admin_id).bind(now)
            .execute(&self.0).await?;
        Ok(res.rows_affected() == 1)
    }
    pub async fn close_ticket(&self, id: i64, now: i64) -> sqlx::Result<bool> {
        let res = sqlx::query("update support_tickets set status = 'closed', closed_at = ?2 where id = ?1 and status != 'closed'")
            .bind(id).bind(now)
            .execute(&self.0).await?;
        Ok(res.rows_affected() == 1)
    }
    pub async fn active_tickets(&self) -> sqlx::Result<Vec<Ticket>> {
        sqlx::query_as("select * from support_tickets where status != 'closed' order by id")
            .fetch_all(&self.0).await
    }
    pub async fn add_message(&self, ticket_id: i64, sender_id: i64, role: SenderRole, content: &str, now: i64) -> sqlx::Result<i64> {
        let mut tx = self.0.begin().await?;
        let id = sqlx::query("insert into support_messages (ticket_id, sender_id, sender_role, content, created_at) values (?1, ?2, ?3, ?4, ?5)")
            .bind(ticket_id).bind(sender_id).bind(role.as_ref()).bind(content).bind(now)
            .execute(&mut *tx).await?
            .last_insert_rowid();
        let unread = match role {
            SenderRole::User => "update support_tickets set unread_by_admin = 1 where id = ?1",
            SenderRole::Admin => "update support_tickets set unread_by_user = 1 where id = ?1",
        };
        sqlx::query(unread).bind(ticket_id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(id)
    }
    /// Last `limit` messages of the ticket in chronological order.
    pub async fn messages(&self, ticket_id: i64, limit: i64) -> sqlx::Result<Vec<SupportMessage>> {
        let mut messages: Vec<SupportMessage> = sqlx::query_as("select * from support_messages where ticket_id = ?1 order by id desc limit ?2")
            .bind(ticket_id).bind(limit)
            .fetch_all(&self.0).await?;
        messages.reverse();
        Ok(messages)
    }
    pub async fn mark_read(&self, ticket_id: i64, reader: SenderRole) -> sqlx::Result<()> {
        let query = match reader {
            SenderRole::Admin => "update support_tickets set unread_by_admin = 0 where id = ?1",
            SenderRole::User => "update support_tickets set unread_by_user = 0 where id = ?1",
        };
        sqlx::query(query).bind(ticket_id).execute(&self.0).await?;
        Ok(())
    }
    /// Open tickets old enough for the stage whose notification was not sent yet.
    pub async fn tickets_due(&self, stage: EscalationStage, now: i64) -> sqlx::Result<Vec<Ticket>> {
        let deadline = now - stage.after_minutes() * 60;
        let query = format!(
            "select * from support_tickets where status = 'open' and created_at <= ?1 and {} = 0 order by id",
            stage.flag_column()
        );
        sqlx::query_as(&query).bind(deadline).fetch_all(&self.0).await
    }
    /// Sets the one-shot flag; false if it was already set.
    pub async fn mark_stage(&self, ticket_id: i64, stage: EscalationStage) -> sqlx::Result<bool> {
        let query = format!(
            "update support_tickets set {0} = 1 where id = ?1 and {0} = 0",
            stage.flag_column()
        );
        let res = sqlx::query(&query).bind(ticket_id).execute(&self.0).await?;
        Ok(res.rows_affected() == 1)
    }
    pub async fn purge_closed_tickets(&self, closed_before: i64) -> sqlx::Result<u64> {
        let res = sqlx::query("delete from support_tickets where status = 'closed' and closed_at < ?1")
            .bind(closed_before)
            .execute(&self.0).await?;
        Ok(res.rows_affected())
    }

    /// Inserts new codes, skipping ones already known. Returns how many were added.
    pub async fn add_promo_codes(&self, codes: &[String]) -> sqlx::Result<u64> {
        let mut tx = self.0.begin().await?;
        let mut added = 0;
        for code in codes {
            added += sqlx::query("insert or ignore into promo_codes (code) values (?1)")
                .bind(code)
                .execute(&mut *tx).await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(added)
    }
    pub async fn issue_promo(&self, user_id: i64, now: i64) -> sqlx::Result<PromoIssue> {
        let mut tx = self.0.begin().await?;
        if let Some(code) = promo_of(&mut tx, user_id).await? {
            tx.commit().await?;
            return Ok(PromoIssue::Existing(code))
        }
        let assigned = sqlx::query(
            "update promo_codes set user_id = ?1, issued_at = ?2
             where id = (select id from promo_codes where user_id is null order by id limit 1) and user_id is null"
        )
            .bind(user_id).bind(now)
            .execute(&mut *tx).await?
            .rows_affected() == 1;
        let issue = if assigned {
            promo_of(&mut tx, user_id).await?.map(PromoIssue::Issued).unwrap_or(PromoIssue::Exhausted)
        } else {
            PromoIssue::Exhausted
        };
        tx.commit().await?;
        Ok(issue)
    }

    pub async fn stats(&self) -> sqlx::Result<Stats> {
        Ok(Stats {
            users: self.count("select count(*) from users").await?,
            open_tickets: self.count("select count(*) from support_tickets where status = 'open'").await?,
            in_progress_tickets: self.count("select count(*) from support_tickets where status = 'in_progress'").await?,
            warranties: self.count("select count(*) from warranty_screenshots").await?,
            promo_total: self.count("select count(*) from promo_codes").await?,
            promo_issued: self.count("select count(*) from promo_codes where user_id is not null").await?,
        })
    }
    async fn count(&self, query: &str) -> sqlx::Result<i64> {
        sqlx::query_scalar(query).fetch_one(&self.0).await
    }
}

async fn warranties(conn: &mut Conn, user_id: i64) -> anyhow::Result<Vec<WarrantyEntry>> {
    let raw: Option<String> = sqlx::query_scalar("select warranties from users where id = ?1")
        .bind(user_id)
        .fetch_optional(conn).await?;
    match raw {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Ok(Vec::new()),
    }
}

async fn promo_of(conn: &mut Conn, user_id: i64) -> sqlx::Result<Option<String>> {
    sqlx::query_scalar("select code from promo_codes where user_id = ?1")
        .bind(user_id)
        .fetch_optional(conn).await
}
