use std::path::Path;
use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tower_http::services::ServeDir;

use crate::routes_chat;
use crate::routes_tasks;
use crate::viewmodel::ChatViewModel;

/// JSON API under `/api`, page assets for everything else.
pub fn router(vm: Arc<ChatViewModel>, static_dir: impl AsRef<Path>) -> Router {
    let api = Router::new()
        // conversation
        .route("/state", get(routes_chat::get_state))
        .route("/chat", post(routes_chat::post_chat))
        .route("/voice/start", post(routes_chat::post_voice_start))
        .route("/voice/stop", post(routes_chat::post_voice_stop))
        .route("/voice/transcript", post(routes_chat::post_transcript))
        .route("/alarm/dismiss", post(routes_chat::post_alarm_dismiss))
        .route("/alarm/snooze", post(routes_chat::post_alarm_snooze))
        .route("/toasts/:id", delete(routes_chat::delete_toast))
        // tasks
        .route("/tasks", get(routes_tasks::get_tasks).post(routes_tasks::create_tasks))
        .route("/tasks/refresh", post(routes_tasks::refresh_tasks))
        .route(
            "/tasks/:id",
            put(routes_tasks::update_task).delete(routes_tasks::delete_task),
        )
        .route("/tasks/:id/toggle", post(routes_tasks::toggle_task))
        .route("/tasks/:id/timer", post(routes_tasks::toggle_timer))
        .route("/tools/:name", post(routes_tasks::invoke_tool))
        .with_state(vm);

    Router::new()
        .nest("/api", api)
        .fallback_service(ServeDir::new(static_dir.as_ref()))
}
