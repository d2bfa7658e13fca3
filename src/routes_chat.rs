// --------------------------------------------------
// Conversation side of the chat page: state snapshot,
// composer, voice capture, alarm overlay and toasts.
// --------------------------------------------------

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::viewmodel::{ChatViewModel, SendOutcome, Surface};
use crate::voice::VoiceError;

type Vm = State<Arc<ChatViewModel>>;

#[derive(Debug, Deserialize)]
pub struct StateQuery {
    #[serde(default)]
    pub q: String,
}

// -----------------------------
// GET /api/state
// Everything the page renders in one snapshot
// -----------------------------
pub async fn get_state(State(vm): Vm, Query(q): Query<StateQuery>) -> impl IntoResponse {
    Json(vm.snapshot(&q.q))
}

#[derive(Debug, Deserialize)]
pub struct ChatInput {
    pub text: String,
}

// -----------------------------
// POST /api/chat
// Composer submit. One in flight at a time.
// -----------------------------
pub async fn post_chat(State(vm): Vm, Json(input): Json<ChatInput>) -> impl IntoResponse {
    match vm.send_utterance(&input.text, Surface::Composer).await {
        SendOutcome::Ignored => (StatusCode::BAD_REQUEST, "text required").into_response(),
        SendOutcome::Busy => {
            (StatusCode::CONFLICT, "a message is already being sent").into_response()
        }
        // failures are answered in the conversation itself
        SendOutcome::Answered | SendOutcome::Failed => Json(vm.snapshot("")).into_response(),
    }
}

fn voice_error(e: VoiceError) -> Response {
    let status = match e {
        VoiceError::Unavailable | VoiceError::Closed => StatusCode::SERVICE_UNAVAILABLE,
        VoiceError::NotListening => StatusCode::CONFLICT,
    };
    (status, e.to_string()).into_response()
}

// -----------------------------
// POST /api/voice/start
// -----------------------------
pub async fn post_voice_start(State(vm): Vm) -> impl IntoResponse {
    match vm.start_voice() {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => voice_error(e),
    }
}

// -----------------------------
// POST /api/voice/stop
// -----------------------------
pub async fn post_voice_stop(State(vm): Vm) -> impl IntoResponse {
    vm.stop_voice();
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct TranscriptInput {
    pub transcript: String,
}

// -----------------------------
// POST /api/voice/transcript
// Final speech-recognition result; dispatched by the voice pump
// -----------------------------
pub async fn post_transcript(
    State(vm): Vm,
    Json(input): Json<TranscriptInput>,
) -> impl IntoResponse {
    match vm.submit_transcript(&input.transcript) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => voice_error(e),
    }
}

// -----------------------------
// POST /api/alarm/dismiss
// -----------------------------
pub async fn post_alarm_dismiss(State(vm): Vm) -> impl IntoResponse {
    vm.dismiss_alarm();
    Json(vm.snapshot(""))
}

// -----------------------------
// POST /api/alarm/snooze
// -----------------------------
pub async fn post_alarm_snooze(State(vm): Vm) -> impl IntoResponse {
    vm.snooze_alarm(Utc::now());
    Json(vm.snapshot(""))
}

// -----------------------------
// DELETE /api/toasts/:id
// -----------------------------
pub async fn delete_toast(State(vm): Vm, Path(id): Path<String>) -> impl IntoResponse {
    let Ok(id) = Uuid::parse_str(&id) else {
        return (StatusCode::BAD_REQUEST, "invalid id").into_response();
    };
    if !vm.dismiss_toast(id) {
        return (StatusCode::NOT_FOUND, "toast not found").into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}
