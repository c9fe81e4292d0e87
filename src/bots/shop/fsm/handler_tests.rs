//! Handlers driven against a mocked Bot API, checked through sessions and storage.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use teloxide::adaptors::throttle::Limits;
use wiremock::matchers::{body_string_contains, method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::bots::shop::test_app_with;
use crate::impls::today;
use crate::persistent::{CatalogFile, SenderRole, WarrantyEntry};
use crate::screenshot::{ManualVerifier, ScreenshotVerifier, Verdict};

use super::super::entity::TEXT_LIMIT;
use super::*;

const ANN: i64 = 5;
const ADMIN: i64 = 10;

struct FixedVerdict(Verdict);

#[async_trait]
impl ScreenshotVerifier for FixedVerdict {
    async fn verify(&self, _image: &[u8]) -> Verdict {
        self.0
    }
}

struct Telegram {
    server: MockServer,
    bot: WBot,
}

impl Telegram {
    async fn start() -> Self {
        let server = MockServer::start().await;
        let limits = Limits {
            messages_per_sec_chat: 1000,
            messages_per_min_chat: 10_000,
            messages_per_min_channel: 10_000,
            messages_per_sec_overall: 1000,
        };
        let bot = Bot::new("12345:TEST").set_api_url(server.uri().parse().unwrap()).throttle(limits);
        Self { server, bot }
    }

    async fn answer(&self, api_method: &str, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path_regex(format!("(?i)/bot[^/]+/{}$", api_method)))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Every call to `api_method` fails. Mount before `ok` to take precedence.
    async fn fail(&self, api_method: &str) {
        let body = json!({ "ok": false, "error_code": 400, "description": "Bad Request: chat not found" });
        self.answer(api_method, 400, body).await;
    }

    /// Fails the messages whose body mentions `needle`.
    async fn fail_mentioning(&self, needle: &str) {
        let body = json!({ "ok": false, "error_code": 400, "description": "Bad Request: message is too long" });
        Mock::given(method("POST"))
            .and(path_regex("(?i)/bot[^/]+/sendMessage$"))
            .and(body_string_contains(needle))
            .respond_with(ResponseTemplate::new(400).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    async fn ok(&self) {
        let sent = json!({
            "ok": true,
            "result": {
                "message_id": 42,
                "from": { "id": 987654321, "is_bot": true, "first_name": "Shop" },
                "chat": { "id": ANN, "type": "private", "first_name": "Ann" },
                "date": 1735992000,
                "text": "ok"
            }
        });
        self.answer("sendMessage", 200, sent.clone()).await;
        self.answer("sendPhoto", 200, sent).await;
        self.answer("copyMessage", 200, json!({ "ok": true, "result": { "message_id": 43 } })).await;
        let file = json!({
            "ok": true,
            "result": { "file_id": "file", "file_unique_id": "u", "file_size": 3, "file_path": "photos/1.jpg" }
        });
        self.answer("getFile", 200, file).await;
        Mock::given(method("GET"))
            .and(path_regex("/file/bot[^/]+/photos/1.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&self.server)
            .await;
    }

    /// Bodies of the JSON calls to `api_method`, in order.
    async fn calls(&self, api_method: &str) -> Vec<Value> {
        let suffix = format!("/{}", api_method.to_lowercase());
        self.server.received_requests().await.unwrap_or_default().into_iter()
            .filter(|r| r.url.path().to_lowercase().ends_with(&suffix))
            .map(|r| serde_json::from_slice(&r.body).unwrap_or(Value::Null))
            .collect()
    }

    async fn count(&self, api_method: &str) -> usize {
        self.calls(api_method).await.len()
    }

    async fn texts_to(&self, chat: i64) -> Vec<String> {
        self.calls("sendMessage").await.into_iter()
            .filter(|body| body["chat_id"] == chat)
            .filter_map(|body| body["text"].as_str().map(str::to_owned))
            .collect()
    }
}

fn user(id: i64, name: &str) -> User {
    serde_json::from_value(json!({ "id": id, "is_bot": false, "first_name": name, "username": name.to_lowercase() })).unwrap()
}

fn text_message(from: i64, text: &str) -> Message {
    serde_json::from_value(json!({
        "message_id": 7,
        "date": 1735992000,
        "chat": { "id": from, "type": "private", "first_name": "Ann" },
        "from": { "id": from, "is_bot": false, "first_name": "Ann" },
        "text": text
    })).unwrap()
}

fn photo(unique_id: &str) -> Content {
    Content::Photo { file_id: "file".into(), unique_id: unique_id.into(), caption: None }
}

fn dialogue(app: &AppRef, chat: i64) -> MyDialogue {
    MyDialogue::new(app.sessions.clone(), ChatId(chat))
}

async fn session(app: &AppRef, chat: i64) -> Option<Session> {
    app.sessions.get_at(ChatId(chat), now()).await.unwrap()
}

/// One product in the catalog and Ann registered.
async fn shop(verifier: Box<dyn ScreenshotVerifier>) -> (AppRef, i64) {
    let app = test_app_with(verifier).await;
    let catalog: CatalogFile = serde_json::from_str(r#"{"categories": [
        {"name": "Кресла", "products": [{"name": "R7", "price": 199000}]}
    ]}"#).unwrap();
    app.db.import_catalog(catalog).await.unwrap();
    let category = app.db.categories().await.unwrap().remove(0);
    let product = app.db.products(category.id).await.unwrap().remove(0);
    app.db.ensure_user(ANN, Some("ann"), "Ann", 0).await.unwrap();
    (app, product.id)
}

async fn send_screenshot(tg: &Telegram, app: &AppRef, product: i64, unique_id: &str) {
    let dialogue = dialogue(app, ANN);
    dialogue.update(Session::WarrantyActivation { product_id: product }).await.unwrap();
    warranty::on_screenshot(&tg.bot, &dialogue, app, &user(ANN, "Ann"), product, &photo(unique_id)).await.unwrap();
}

#[tokio::test]
async fn five_stars_activate_warranty() {
    let tg = Telegram::start().await;
    tg.ok().await;
    let (app, product) = shop(Box::new(FixedVerdict(Verdict::Five))).await;

    send_screenshot(&tg, &app, product, "u1").await;

    assert_eq!(session(&app, ANN).await, None);
    assert!(app.db.active_warranty(ANN, product, today()).await.unwrap().is_some());
    assert_eq!(tg.count("sendPhoto").await, 0);
}

#[tokio::test]
async fn lower_rating_ends_activation_without_warranty() {
    let tg = Telegram::start().await;
    tg.ok().await;
    let (app, product) = shop(Box::new(FixedVerdict(Verdict::Rejected(3)))).await;

    send_screenshot(&tg, &app, product, "u1").await;

    assert_eq!(session(&app, ANN).await, None);
    assert!(app.db.active_warranty(ANN, product, today()).await.unwrap().is_none());
    assert_eq!(tg.texts_to(ANN).await, vec![res::NOT_FIVE_STARS]);
}

#[tokio::test]
async fn exhausted_attempts_end_activation() {
    let tg = Telegram::start().await;
    tg.ok().await;
    let (app, product) = shop(Box::new(FixedVerdict(Verdict::Five))).await;
    let limit = app.config.max_screenshot_attempts;
    for _ in 0..limit {
        assert!(app.db.register_screenshot_attempt(ANN, limit).await.unwrap());
    }

    send_screenshot(&tg, &app, product, "u1").await;

    assert_eq!(session(&app, ANN).await, None);
    assert!(app.db.active_warranty(ANN, product, today()).await.unwrap().is_none());
    assert_eq!(tg.texts_to(ANN).await, vec![res::ATTEMPTS_EXHAUSTED]);
}

#[tokio::test]
async fn used_screenshot_keeps_activation_open() {
    let tg = Telegram::start().await;
    tg.ok().await;
    let (app, product) = shop(Box::new(FixedVerdict(Verdict::Five))).await;
    let entry = WarrantyEntry::new(&app.db.product(product).await.unwrap().unwrap(), "u1".into(), today());
    app.db.add_warranty(ANN, &entry).await.unwrap();

    send_screenshot(&tg, &app, product, "u1").await;

    assert_eq!(session(&app, ANN).await, Some(Session::WarrantyActivation { product_id: product }));
    assert_eq!(app.db.warranties(ANN).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unclear_screenshot_waits_for_one_admin_decision() {
    let tg = Telegram::start().await;
    tg.ok().await;
    let (app, product) = shop(Box::new(ManualVerifier)).await;

    send_screenshot(&tg, &app, product, "u1").await;

    assert_eq!(tg.count("sendPhoto").await, 2);
    let pending_id = match session(&app, ANN).await {
        Some(Session::AwaitingConfirmation { pending_id }) => pending_id,
        other => panic!("unexpected session {:?}", other),
    };
    warranty::decide(&tg.bot, ChatId(ADMIN), &app, pending_id, true).await.unwrap();
    assert_eq!(session(&app, ANN).await, None);
    assert!(app.db.active_warranty(ANN, product, today()).await.unwrap().is_some());

    warranty::decide(&tg.bot, ChatId(11), &app, pending_id, false).await.unwrap();
    assert_eq!(tg.texts_to(11).await, vec![res::ALREADY_DECIDED]);
    assert_eq!(app.db.warranties(ANN).await.unwrap().len(), 1);
}

#[tokio::test]
async fn screenshot_nobody_can_review_keeps_activation_open() {
    let tg = Telegram::start().await;
    tg.fail("sendPhoto").await;
    tg.ok().await;
    let (app, product) = shop(Box::new(ManualVerifier)).await;

    send_screenshot(&tg, &app, product, "u1").await;

    assert_eq!(session(&app, ANN).await, Some(Session::WarrantyActivation { product_id: product }));
    assert_eq!(tg.texts_to(ANN).await, vec![res::REVIEW_UNAVAILABLE]);
    assert!(app.db.take_pending_screenshot(1).await.unwrap().is_none());
}

#[tokio::test]
async fn decision_leaves_a_newer_flow_alone() {
    let tg = Telegram::start().await;
    tg.ok().await;
    let (app, product) = shop(Box::new(ManualVerifier)).await;
    let pending_id = app.db.add_pending_screenshot(ANN, product, "file", "u1", 0).await.unwrap();
    dialogue(&app, ANN).update(Session::Support { ticket_id: 3 }).await.unwrap();

    warranty::decide(&tg.bot, ChatId(ADMIN), &app, pending_id, false).await.unwrap();

    assert_eq!(session(&app, ANN).await, Some(Session::Support { ticket_id: 3 }));
    assert_eq!(tg.texts_to(ANN).await, vec![res::SCREENSHOT_REJECTED]);
}

#[tokio::test]
async fn approval_of_a_removed_product_releases_the_user() {
    let tg = Telegram::start().await;
    tg.ok().await;
    let (app, _) = shop(Box::new(ManualVerifier)).await;
    let pending_id = app.db.add_pending_screenshot(ANN, 999, "file", "u1", 0).await.unwrap();
    dialogue(&app, ANN).update(Session::AwaitingConfirmation { pending_id }).await.unwrap();

    warranty::decide(&tg.bot, ChatId(ADMIN), &app, pending_id, true).await.unwrap();

    assert_eq!(session(&app, ANN).await, None);
    assert_eq!(tg.texts_to(ANN).await, vec![res::PRODUCT_GONE]);
    assert!(app.db.warranties(ANN).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_approval_can_be_repeated() {
    let tg = Telegram::start().await;
    tg.ok().await;
    let (app, product) = shop(Box::new(ManualVerifier)).await;
    // user 77 never registered, so the warranty cannot be stored
    let pending_id = app.db.add_pending_screenshot(77, product, "file", "u1", 0).await.unwrap();
    dialogue(&app, 77).update(Session::AwaitingConfirmation { pending_id }).await.unwrap();

    assert!(warranty::decide(&tg.bot, ChatId(ADMIN), &app, pending_id, true).await.is_err());

    assert_eq!(session(&app, 77).await, Some(Session::AwaitingConfirmation { pending_id }));
    assert!(app.db.take_pending_screenshot(pending_id).await.unwrap().is_some());
}

#[tokio::test]
async fn case_intake_collects_phone_then_description() {
    let tg = Telegram::start().await;
    tg.ok().await;
    let (app, product) = shop(Box::new(ManualVerifier)).await;
    let ann = user(ANN, "Ann");
    let dialogue = dialogue(&app, ANN);
    dialogue.update(Session::CasePhone { product_id: product }).await.unwrap();

    warranty::on_phone(&tg.bot, &dialogue, product, &Content::Text("123".into())).await.unwrap();
    assert_eq!(session(&app, ANN).await, Some(Session::CasePhone { product_id: product }));

    warranty::on_phone(&tg.bot, &dialogue, product, &Content::Text("8 (999) 000-11-22".into())).await.unwrap();
    let phone = match session(&app, ANN).await {
        Some(Session::CaseDescription { phone, .. }) => phone,
        other => panic!("unexpected session {:?}", other),
    };

    let description = Content::Text("Скрипит спинка".into());
    warranty::on_description(&tg.bot, &dialogue, &app, &ann, product, phone, &description).await.unwrap();
    assert_eq!(session(&app, ANN).await, None);
    let cases = app.db.warranty_cases(ANN).await.unwrap();
    assert_eq!(cases.len(), 1);
    assert_eq!(cases[0].description, "Скрипит спинка");
}

#[tokio::test]
async fn user_message_is_copied_to_every_admin() {
    let tg = Telegram::start().await;
    tg.ok().await;
    let (app, _) = shop(Box::new(ManualVerifier)).await;
    let (ticket, _) = app.db.open_ticket(ANN, "Ozon", now()).await.unwrap();
    let dialogue = dialogue(&app, ANN);
    dialogue.update(Session::Support { ticket_id: ticket.id }).await.unwrap();
    let msg = text_message(ANN, "где мой заказ");

    support::on_user_message(&tg.bot, &dialogue, &app, &user(ANN, "Ann"), ticket.id, &msg, &Content::Text("где мой заказ".into()))
        .await.unwrap();

    let copies = tg.calls("copyMessage").await;
    assert_eq!(copies.len(), 2);
    assert!(copies.iter().all(|c| c["from_chat_id"] == ANN && c["message_id"] == 7));
    assert_eq!(tg.texts_to(ANN).await, vec![res::MESSAGE_SENT]);
    assert_eq!(app.db.messages(ticket.id, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn undelivered_user_message_is_reported() {
    let tg = Telegram::start().await;
    tg.fail("copyMessage").await;
    tg.ok().await;
    let (app, _) = shop(Box::new(ManualVerifier)).await;
    let (ticket, _) = app.db.open_ticket(ANN, "Ozon", now()).await.unwrap();
    let dialogue = dialogue(&app, ANN);
    dialogue.update(Session::Support { ticket_id: ticket.id }).await.unwrap();
    let msg = text_message(ANN, "алло");

    support::on_user_message(&tg.bot, &dialogue, &app, &user(ANN, "Ann"), ticket.id, &msg, &Content::Text("алло".into()))
        .await.unwrap();

    assert_eq!(tg.texts_to(ANN).await, vec![res::MESSAGE_NOT_DELIVERED]);
    assert_eq!(app.db.messages(ticket.id, 10).await.unwrap().len(), 1);
    assert_eq!(session(&app, ANN).await, Some(Session::Support { ticket_id: ticket.id }));
}

async fn long_ticket(app: &AppRef) -> i64 {
    let (ticket, _) = app.db.open_ticket(ANN, "Ozon", now()).await.unwrap();
    let line = "подробности ".repeat(30);
    for _ in 0..20 {
        app.db.add_message(ticket.id, ANN, SenderRole::User, &line, now()).await.unwrap();
    }
    ticket.id
}

#[tokio::test]
async fn long_history_is_split_and_then_marked_read() {
    let tg = Telegram::start().await;
    tg.ok().await;
    let (app, _) = shop(Box::new(ManualVerifier)).await;
    let ticket = long_ticket(&app).await;

    support::history(&tg.bot, ChatId(ADMIN), &app, &user(ADMIN, "Boss"), ticket).await.unwrap();

    let parts = tg.texts_to(ADMIN).await;
    assert!(parts.len() > 1);
    assert!(parts.iter().all(|p| p.encode_utf16().count() <= TEXT_LIMIT));
    assert!(!app.db.ticket(ticket).await.unwrap().unwrap().unread_by_admin);
}

#[tokio::test]
async fn unsent_history_stays_unread() {
    let tg = Telegram::start().await;
    tg.fail("sendMessage").await;
    let (app, _) = shop(Box::new(ManualVerifier)).await;
    let ticket = long_ticket(&app).await;

    assert!(support::history(&tg.bot, ChatId(ADMIN), &app, &user(ADMIN, "Boss"), ticket).await.is_err());

    assert!(app.db.ticket(ticket).await.unwrap().unwrap().unread_by_admin);
}

#[tokio::test]
async fn accept_succeeds_when_history_cannot_be_sent() {
    let tg = Telegram::start().await;
    tg.fail_mentioning("подробности").await;
    tg.ok().await;
    let (app, _) = shop(Box::new(ManualVerifier)).await;
    let ticket = long_ticket(&app).await;
    let admin = dialogue(&app, ADMIN);

    support::accept(&tg.bot, &admin, &app, &user(ADMIN, "Boss"), ticket).await.unwrap();

    assert_eq!(session(&app, ADMIN).await, Some(Session::AdminResponse { ticket_id: ticket }));
    let ticket = app.db.ticket(ticket).await.unwrap().unwrap();
    assert_eq!(ticket.admin_id, Some(ADMIN));
    assert!(ticket.unread_by_admin);
    assert_eq!(tg.texts_to(ANN).await, vec![res::TICKET_ACCEPTED_USER]);
}

#[tokio::test]
async fn closing_a_ticket_releases_both_sides() {
    let tg = Telegram::start().await;
    tg.ok().await;
    let (app, _) = shop(Box::new(ManualVerifier)).await;
    let (ticket, _) = app.db.open_ticket(ANN, "Ozon", now()).await.unwrap();
    assert!(app.db.accept_ticket(ticket.id, ADMIN, now()).await.unwrap());
    let ann = dialogue(&app, ANN);
    ann.update(Session::Support { ticket_id: ticket.id }).await.unwrap();
    dialogue(&app, ADMIN).update(Session::AdminResponse { ticket_id: ticket.id }).await.unwrap();

    support::close(&tg.bot, &ann, &app, &user(ANN, "Ann"), ticket.id).await.unwrap();

    assert_eq!(session(&app, ANN).await, None);
    assert_eq!(session(&app, ADMIN).await, None);
    assert!(!app.db.ticket(ticket.id).await.unwrap().unwrap().is_active());
}

#[tokio::test]
async fn flow_bound_to_a_missing_ticket_is_dropped() {
    let tg = Telegram::start().await;
    tg.ok().await;
    let (app, _) = shop(Box::new(ManualVerifier)).await;
    let dialogue = dialogue(&app, ANN);
    dialogue.update(Session::Support { ticket_id: 99 }).await.unwrap();

    let result = route_content(&tg.bot, &dialogue, &text_message(ANN, "ау"), Content::Text("ау".into()), &app).await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(session(&app, ANN).await, None);
}

#[tokio::test]
async fn reported_error_keeps_the_session() {
    let tg = Telegram::start().await;
    tg.ok().await;
    let (app, _) = shop(Box::new(ManualVerifier)).await;
    let admin = dialogue(&app, ADMIN);
    admin.update(Session::AdminResponse { ticket_id: 1 }).await.unwrap();

    report(&tg.bot, &admin, Err(BotError::not_found("pending screenshot 5"))).await.unwrap();

    assert_eq!(session(&app, ADMIN).await, Some(Session::AdminResponse { ticket_id: 1 }));
    assert_eq!(tg.texts_to(ADMIN).await, vec![res::ERR_NOT_FOUND]);
}

#[tokio::test]
async fn cancel_drops_the_current_flow() {
    let tg = Telegram::start().await;
    tg.ok().await;
    let (app, product) = shop(Box::new(ManualVerifier)).await;
    let dialogue = dialogue(&app, ANN);
    dialogue.update(Session::CasePhone { product_id: product }).await.unwrap();

    user::on_command(tg.bot.clone(), dialogue.clone(), text_message(ANN, "/cancel"), Command::Cancel, app.clone()).await.unwrap();
    assert_eq!(session(&app, ANN).await, None);

    user::on_command(tg.bot.clone(), dialogue, text_message(ANN, "/cancel"), Command::Cancel, app.clone()).await.unwrap();
    assert_eq!(tg.texts_to(ANN).await, vec![res::CANCELLED, res::NOTHING_TO_CANCEL]);
}
