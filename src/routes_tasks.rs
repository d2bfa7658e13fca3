// --------------------------------------------------
// Task list endpoints of the chat page.
//
// Responsibilities:
// - List the visible (searched) tasks
// - Add one task or a newline-separated batch
// - Edit details / toggle status / delete / start-stop timer
// - Run a named backend tool and refresh
// --------------------------------------------------

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::models::{Priority, Recurrence, TaskPatch};
use crate::scheduler::TimerChange;
use crate::viewmodel::{ChatViewModel, NewTasks};

type Vm = State<Arc<ChatViewModel>>;

fn parse_id(id: &str) -> Option<Uuid> {
    Uuid::parse_str(id).ok()
}

fn has_task(vm: &ChatViewModel, id: Uuid) -> bool {
    vm.tasks().iter().any(|t| t.id == id)
}

#[derive(Debug, Deserialize)]
pub struct TasksQuery {
    #[serde(default)]
    pub q: String, // title search, blank = all
}

// -----------------------------
// GET /api/tasks
// Visible tasks, newest first
// -----------------------------
pub async fn get_tasks(State(vm): Vm, Query(q): Query<TasksQuery>) -> impl IntoResponse {
    Json(vm.visible_tasks(&q.q))
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskInput {
    pub text: String, // one title per line
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub recurrence: Option<Recurrence>,
    pub due_date: Option<String>, // RFC3339, single task only
}

// -----------------------------
// POST /api/tasks
// Adds one task, or one per line
// -----------------------------
pub async fn create_tasks(State(vm): Vm, Json(input): Json<CreateTaskInput>) -> impl IntoResponse {
    if input.text.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "text required").into_response();
    }

    let due_date = match input.due_date.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(_) => return (StatusCode::BAD_REQUEST, "invalid due_date").into_response(),
        },
    };

    let added = vm
        .add_tasks(NewTasks {
            text: input.text,
            description: input.description,
            priority: input.priority.unwrap_or_default(),
            recurrence: input.recurrence.unwrap_or_default(),
            due_date,
        })
        .await;

    if added == 0 {
        return (StatusCode::BAD_GATEWAY, "failed to add task").into_response();
    }

    (
        StatusCode::CREATED,
        Json(json!({ "added": added, "tasks": vm.tasks() })),
    )
        .into_response()
}

// -----------------------------
// POST /api/tasks/refresh
// Re-fetches the list from the store
// -----------------------------
pub async fn refresh_tasks(State(vm): Vm) -> impl IntoResponse {
    if !vm.refresh_tasks().await {
        return (StatusCode::BAD_GATEWAY, "failed to load tasks").into_response();
    }
    Json(vm.tasks()).into_response()
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskInput {
    pub title: Option<String>,
    pub description: Option<String>, // "" clears
    pub priority: Option<Priority>,
    pub recurrence: Option<Recurrence>,
    pub due_date: Option<String>, // RFC3339, "" clears
}

// -----------------------------
// PUT /api/tasks/:id
// Edits the given details, leaves the rest alone
// -----------------------------
pub async fn update_task(
    State(vm): Vm,
    Path(id): Path<String>,
    Json(input): Json<UpdateTaskInput>,
) -> impl IntoResponse {
    let Some(id) = parse_id(&id) else {
        return (StatusCode::BAD_REQUEST, "invalid id").into_response();
    };

    if input.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return (StatusCode::BAD_REQUEST, "title required").into_response();
    }

    let due_date = match input.due_date.as_deref().map(str::trim) {
        None => None,
        Some("") => Some(None),
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(dt) => Some(Some(dt.with_timezone(&Utc))),
            Err(_) => return (StatusCode::BAD_REQUEST, "invalid due_date").into_response(),
        },
    };

    if !has_task(&vm, id) {
        return (StatusCode::NOT_FOUND, "task not found").into_response();
    }

    let patch = TaskPatch {
        title: input.title.map(|t| t.trim().to_string()),
        description: input
            .description
            .map(|d| Some(d).filter(|d| !d.trim().is_empty())),
        priority: input.priority,
        recurrence: input.recurrence,
        due_date,
        ..TaskPatch::default()
    };

    if !vm.update_task(id, patch).await {
        return (StatusCode::BAD_GATEWAY, "failed to update task").into_response();
    }

    match vm.tasks().into_iter().find(|t| t.id == id) {
        Some(updated) => Json(updated).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

// -----------------------------
// POST /api/tasks/:id/toggle
// Pending <-> Completed, rolls forward recurring tasks
// -----------------------------
pub async fn toggle_task(State(vm): Vm, Path(id): Path<String>) -> impl IntoResponse {
    let Some(id) = parse_id(&id) else {
        return (StatusCode::BAD_REQUEST, "invalid id").into_response();
    };
    if !has_task(&vm, id) {
        return (StatusCode::NOT_FOUND, "task not found").into_response();
    }

    if !vm.toggle_task_status(id, Utc::now()).await {
        return (StatusCode::BAD_GATEWAY, "failed to update task").into_response();
    }

    Json(vm.tasks()).into_response()
}

// -----------------------------
// DELETE /api/tasks/:id
// -----------------------------
pub async fn delete_task(State(vm): Vm, Path(id): Path<String>) -> impl IntoResponse {
    let Some(id) = parse_id(&id) else {
        return (StatusCode::BAD_REQUEST, "invalid id").into_response();
    };
    if !has_task(&vm, id) {
        return (StatusCode::NOT_FOUND, "task not found").into_response();
    }

    if !vm.delete_task(id).await {
        return (StatusCode::BAD_GATEWAY, "failed to delete task").into_response();
    }

    Json(json!({ "ok": true })).into_response()
}

// -----------------------------
// POST /api/tasks/:id/timer
// Starts or stops the work timer
// -----------------------------
pub async fn toggle_timer(State(vm): Vm, Path(id): Path<String>) -> impl IntoResponse {
    let Some(id) = parse_id(&id) else {
        return (StatusCode::BAD_REQUEST, "invalid id").into_response();
    };
    if !has_task(&vm, id) {
        return (StatusCode::NOT_FOUND, "task not found").into_response();
    }

    match vm.toggle_task_timer(id, Utc::now()).await {
        Some(TimerChange::Started) => Json(json!({ "timer": "started" })).into_response(),
        Some(TimerChange::Stopped { elapsed_secs }) => {
            Json(json!({ "timer": "stopped", "elapsed_secs": elapsed_secs })).into_response()
        }
        None => (StatusCode::BAD_GATEWAY, "failed to update timer").into_response(),
    }
}

// -----------------------------
// POST /api/tools/:name
// Body is passed through as the tool's arguments
// -----------------------------
pub async fn invoke_tool(
    State(vm): Vm,
    Path(name): Path<String>,
    body: Option<Json<Value>>,
) -> impl IntoResponse {
    let arguments = body.map(|Json(v)| v).unwrap_or_else(|| json!({}));

    match vm.invoke_tool(&name, arguments).await {
        Some(result) => Json(json!({ "result": result })).into_response(),
        None => (StatusCode::BAD_GATEWAY, format!("Operation failed: {name}")).into_response(),
    }
}
