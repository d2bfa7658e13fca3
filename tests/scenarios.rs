//! End-to-end flows through the real reqwest client against a mocked agent
//! backend and a mocked hosted task store.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use serde_json::{Value, json};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use todo_chat::agent::AgentClient;
use todo_chat::http::{HttpClient, ReqwestHttpClient};
use todo_chat::models::{Priority, Role, TaskStatus, ToastKind};
use todo_chat::notify::LogNotifier;
use todo_chat::scheduler::SchedulerSettings;
use todo_chat::session::SessionSlot;
use todo_chat::store::RestTaskStore;
use todo_chat::viewmodel::{ChatViewModel, SESSION_EXPIRED, SendOutcome, Surface};
use todo_chat::voice::NoVoice;

const TASK_ID: &str = "7f1c6a0e-8a44-4c3e-9b51-1f2d3c4b5a69";

fn view_model(server: &MockServer, token: Option<&str>) -> ChatViewModel {
    let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    let session = Arc::new(SessionSlot::from_token(
        token.map(str::to_string),
        Some("u-1".to_string()),
    ));
    ChatViewModel::new(
        AgentClient::new(http.clone(), server.uri(), session.clone()),
        Arc::new(RestTaskStore::new(http, server.uri(), "anon-key", session)),
        Arc::new(NoVoice),
        Arc::new(LogNotifier),
        SchedulerSettings::default(),
    )
}

fn row(title: &str, extra: Value) -> Value {
    let mut row = json!({
        "id": TASK_ID,
        "title": title,
        "status": "pending",
        "priority": null,
        "recurrence": null,
        "due_date": null,
        "user_id": "u-1",
        "created_at": "2026-01-05T09:00:00Z"
    });
    if let (Value::Object(map), Value::Object(extra)) = (&mut row, extra) {
        map.extend(extra);
    }
    row
}

async fn mount_list(server: &MockServer, rows: Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(server)
        .await;
}

#[tokio::test]
async fn add_task_by_chat_shows_reply_and_refreshed_list() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/agent/dispatch"))
        .and(header("Authorization", "Bearer tok"))
        .and(body_json(json!({ "utterance": "Add task Buy milk" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "action": "create",
            "result": { "task": "Buy milk" },
            "message": "Added 'Buy milk'."
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_list(&server, json!([row("Buy milk", json!({}))])).await;

    let vm = view_model(&server, Some("tok"));
    let outcome = vm.send_utterance("Add task Buy milk", Surface::Composer).await;
    assert_eq!(outcome, SendOutcome::Answered);

    let messages = vm.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].role, Role::User);
    assert_eq!(messages[1].content, "Add task Buy milk");
    assert_eq!(messages[2].role, Role::Assistant);
    assert_eq!(messages[2].content, "Added 'Buy milk'.");

    let tasks = vm.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "Buy milk");
    assert_eq!(tasks[0].priority, Priority::Medium);
    assert_eq!(tasks[0].status, TaskStatus::Pending);
    assert!(!vm.is_loading());
}

#[tokio::test]
async fn due_task_raises_a_single_alarm() {
    let server = MockServer::start().await;
    let now = Utc::now();
    let due = (now - Duration::seconds(45)).to_rfc3339();
    mount_list(&server, json!([row("Call the bank", json!({ "due_date": due }))])).await;

    let vm = view_model(&server, Some("tok"));
    assert!(vm.refresh_tasks().await);

    let alarm = vm.tick_alarms(now).expect("alarm raised");
    assert_eq!(alarm.title, "Call the bank");
    assert!(vm.tick_alarms(now + Duration::seconds(30)).is_none());
    assert_eq!(vm.active_alarm().map(|a| a.title), Some("Call the bank".to_string()));
}

#[tokio::test]
async fn signed_out_send_never_reaches_the_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/agent/dispatch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "hi" })))
        .expect(0)
        .mount(&server)
        .await;

    let vm = view_model(&server, None);
    assert_eq!(vm.send_utterance("hello", Surface::Composer).await, SendOutcome::Failed);

    let last = vm.messages().pop().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.content, SESSION_EXPIRED);
}

#[tokio::test]
async fn rejected_status_change_is_reverted() {
    let server = MockServer::start().await;
    mount_list(&server, json!([row("Read", json!({}))])).await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/tasks"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "db down" })))
        .mount(&server)
        .await;

    let vm = view_model(&server, Some("tok"));
    vm.refresh_tasks().await;
    let id = vm.tasks()[0].id;

    assert!(!vm.toggle_task_status(id, Utc::now()).await);
    assert_eq!(vm.tasks()[0].status, TaskStatus::Pending);
    assert_eq!(vm.toasts().last().map(|t| t.kind), Some(ToastKind::Error));
}

#[tokio::test]
async fn completing_monthly_task_posts_next_occurrence() {
    let server = MockServer::start().await;
    let rent = row("Pay rent", json!({ "recurrence": "monthly", "priority": "high" }));
    mount_list(&server, json!([rent])).await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/tasks"))
        .and(body_json(json!({ "status": "completed" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/tasks"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let vm = view_model(&server, Some("tok"));
    vm.refresh_tasks().await;
    let id = vm.tasks()[0].id;
    let completed_at = Utc.with_ymd_and_hms(2026, 1, 31, 9, 0, 0).unwrap();

    assert!(vm.toggle_task_status(id, completed_at).await);

    let requests = server.received_requests().await.unwrap();
    let insert = requests
        .iter()
        .find(|r| r.method.as_str() == "POST")
        .expect("next occurrence inserted");
    let rows: Value = serde_json::from_slice(&insert.body).unwrap();
    assert_eq!(rows[0]["title"], "Pay rent");
    assert_eq!(rows[0]["status"], "pending");
    assert_eq!(rows[0]["priority"], "high");
    assert_eq!(rows[0]["recurrence"], "monthly");
    assert_eq!(rows[0]["user_id"], "u-1");
    assert_eq!(rows[0]["due_date"], "2026-02-28T09:00:00Z");
}

#[tokio::test]
async fn rejected_delete_restores_the_task() {
    let server = MockServer::start().await;
    mount_list(&server, json!([row("Keep me", json!({}))])).await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/tasks"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let vm = view_model(&server, Some("tok"));
    vm.refresh_tasks().await;
    let id = vm.tasks()[0].id;

    assert!(!vm.delete_task(id).await);
    assert_eq!(vm.tasks().len(), 1);
    assert_eq!(vm.tasks()[0].id, id);
}
