use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::bots::shop::{notify_stage, App, AppRef};
use crate::bots::WBot;
use crate::error::BotResult;
use crate::impls::LoggableErrorResult;
use crate::persistent::EscalationStage;

const TICK: Duration = Duration::from_secs(60);
/// Closed tickets are kept this long.
pub const RETENTION_SECS: i64 = 30 * 24 * 3600;
const MAINTENANCE_EVERY: u64 = 60;

/// Background jobs: ticket escalation every minute, retention and
/// session cleanup hourly, screenshot counters reset at midnight UTC.
pub fn start(bot: WBot, app: AppRef) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK);
        let mut last_reset = Utc::now();
        let mut ticks = 0u64;
        loop {
            interval.tick().await;
            let current = Utc::now();
            escalate(&bot, &app, current.timestamp()).await.ok_or_log();
            if ticks % MAINTENANCE_EVERY == 0 {
                maintenance(&app, current.timestamp()).await.ok_or_log();
            }
            if crossed_midnight(last_reset, current) {
                if let Some(reset) = app.db.reset_screenshot_attempts().await.ok_or_log() {
                    log::info!("daily reset of screenshot counters: {} users", reset);
                }
            }
            last_reset = current;
            ticks += 1;
        }
    })
}

/// Sends every escalation whose time has come. A stage is flagged before the
/// notification goes out so it fires at most once per ticket.
async fn escalate(bot: &WBot, app: &AppRef, now: i64) -> BotResult<usize> {
    let mut sent = 0;
    for stage in EscalationStage::ALL {
        for ticket in app.db.tickets_due(stage, now).await? {
            if !app.db.mark_stage(ticket.id, stage).await? {
                continue
            }
            log::info!("ticket {} escalated: {:?}", ticket.id, stage);
            if notify_stage(bot, app, &ticket, stage).await.ok_or_log().is_some() {
                sent += 1;
            }
        }
    }
    Ok(sent)
}

async fn maintenance(app: &App, now: i64) -> BotResult<(u64, u64)> {
    let tickets = app.db.purge_closed_tickets(now - RETENTION_SECS).await?;
    let sessions = app.sessions.purge_expired(now).await?;
    if tickets > 0 || sessions > 0 {
        log::info!("cleanup: {} closed tickets, {} expired sessions removed", tickets, sessions);
    }
    Ok((tickets, sessions))
}

fn crossed_midnight(previous: DateTime<Utc>, current: DateTime<Utc>) -> bool {
    previous.date_naive() < current.date_naive()
}
