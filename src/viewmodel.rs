//! Chat/task view-model.
//!
//! The only place in-memory conversation, task and alarm state is mutated.
//! Every remote write is a two-phase mutation: apply the change locally and
//! keep a snapshot of just what was touched, then call the store; on failure
//! put the snapshot back, on success re-fetch the list.
//!
//! The state lock is never held across an `.await`, so several dispatches
//! can be in flight and their replies land in arrival order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::AgentClient;
use crate::error::AgentError;
use crate::logic::{TaskStats, format_duration, sort_newest_first, task_stats, visible_tasks};
use crate::models::{
    Alarm, Message, Priority, Recurrence, Task, TaskDraft, TaskPatch, TaskStatus, Toast, ToastKind,
};
use crate::notify::AlarmNotifier;
use crate::scheduler::{AlarmBoard, SchedulerSettings, TimerChange, next_occurrence, toggle_timer};
use crate::store::TaskStore;
use crate::voice::{VoiceCapture, VoiceError};

pub const GREETING: &str = "Hi there! I'm your task assistant. \
    Tell me what you need to get done and I'll keep your list in order.";
pub const SESSION_EXPIRED: &str =
    "Your session has expired or is invalid. Please sign in again to continue.";
pub const SERVER_UNREACHABLE: &str =
    "I can't reach the server right now. Please check your connection and try again.";
pub const SERVER_TROUBLE: &str = "Something went wrong on my side. Please try again in a moment.";

const TOGGLE_FAILED: &str = "Failed to update the task. Your change was undone.";
const DELETE_FAILED: &str = "Failed to delete the task. It has been restored.";
const EDIT_FAILED: &str = "Failed to save your changes. The task was restored.";
const TIMER_FAILED: &str = "Failed to save the timer. Your change was undone.";
const ADD_FAILED: &str = "Failed to add the task.";

/// Where an utterance came from. Only the composer is gated by the
/// loading flag; other surfaces may send while a dispatch is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Composer,
    Voice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Empty or whitespace-only input.
    Ignored,
    /// The composer already has a dispatch in flight.
    Busy,
    Answered,
    Failed,
}

/// Input of the add-task form. One line adds one task, several lines add
/// one task per non-blank line.
#[derive(Debug, Clone, Default)]
pub struct NewTasks {
    pub text: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub recurrence: Recurrence,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceStatus {
    pub available: bool,
    pub listening: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewSnapshot {
    pub messages: Vec<Message>,
    pub tasks: Vec<Task>,
    pub alarm: Option<Alarm>,
    pub queued_alarms: usize,
    pub toasts: Vec<Toast>,
    pub loading: bool,
    pub stats: TaskStats,
    pub voice: VoiceStatus,
}

struct State {
    messages: Vec<Message>,
    tasks: Vec<Task>,
    toasts: Vec<Toast>,
    alarms: AlarmBoard,
    composer_busy: bool,
}

pub struct ChatViewModel {
    agent: AgentClient,
    store: Arc<dyn TaskStore>,
    voice: Arc<dyn VoiceCapture>,
    notifier: Arc<dyn AlarmNotifier>,
    settings: SchedulerSettings,
    state: Mutex<State>,
}

// Clears the composer's loading flag however the send ends, including
// when the request future is dropped mid-flight.
struct ComposerGuard<'a> {
    vm: &'a ChatViewModel,
}

impl Drop for ComposerGuard<'_> {
    fn drop(&mut self) {
        self.vm.state().composer_busy = false;
    }
}

impl ChatViewModel {
    pub fn new(
        agent: AgentClient,
        store: Arc<dyn TaskStore>,
        voice: Arc<dyn VoiceCapture>,
        notifier: Arc<dyn AlarmNotifier>,
        settings: SchedulerSettings,
    ) -> Self {
        let state = State {
            messages: vec![Message::assistant(GREETING, Utc::now())],
            tasks: Vec::new(),
            toasts: Vec::new(),
            alarms: AlarmBoard::new(&settings),
            composer_busy: false,
        };
        Self {
            agent,
            store,
            voice,
            notifier,
            settings,
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn toast(&self, message: impl Into<String>, kind: ToastKind) {
        self.state().toasts.push(Toast::new(message, kind));
    }

    // -----------------------------
    // Conversation
    // -----------------------------

    pub async fn send_utterance(&self, text: &str, surface: Surface) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Ignored;
        }

        let guard = {
            let mut s = self.state();
            if surface == Surface::Composer {
                if s.composer_busy {
                    return SendOutcome::Busy;
                }
                s.composer_busy = true;
            }
            s.messages.push(Message::user(text, Utc::now()));
            (surface == Surface::Composer).then(|| ComposerGuard { vm: self })
        };

        let outcome = match self.agent.dispatch(text).await {
            Ok(reply) => {
                debug!(action = ?reply.action, "agent replied");
                let mut message = Message::assistant(reply.message, Utc::now());
                message.action = reply.action;
                message.result = reply.result;
                self.state().messages.push(message);
                SendOutcome::Answered
            }
            Err(e) => {
                warn!(error = %e, ?surface, "dispatch failed");
                let content = match e {
                    AgentError::Unauthenticated => SESSION_EXPIRED,
                    AgentError::Network(_) => SERVER_UNREACHABLE,
                    AgentError::Server { .. } | AgentError::Decode(_) => SERVER_TROUBLE,
                };
                self.state()
                    .messages
                    .push(Message::assistant(content, Utc::now()));
                SendOutcome::Failed
            }
        };
        drop(guard);

        if outcome == SendOutcome::Answered {
            self.refresh_tasks().await;
        }
        outcome
    }

    /// Replace the greeting with stored history, if there is any.
    pub async fn load_history(&self) -> usize {
        match self.agent.history().await {
            Ok(messages) if !messages.is_empty() => {
                let n = messages.len();
                self.state().messages = messages;
                info!(messages = n, "conversation history restored");
                n
            }
            Ok(_) => 0,
            Err(e) => {
                warn!(error = %e, "history unavailable");
                0
            }
        }
    }

    // -----------------------------
    // Tasks
    // -----------------------------

    /// Re-fetch the task list. On failure the current list is kept.
    pub async fn refresh_tasks(&self) -> bool {
        match self.store.list().await {
            Ok(mut tasks) => {
                sort_newest_first(&mut tasks);
                self.state().tasks = tasks;
                true
            }
            Err(e) => {
                warn!(error = %e, "task refresh failed, keeping current list");
                false
            }
        }
    }

    pub async fn add_tasks(&self, input: NewTasks) -> usize {
        let titles: Vec<&str> = input
            .text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        let drafts: Vec<TaskDraft> = match titles.as_slice() {
            [] => return 0,
            [title] => vec![TaskDraft {
                description: input.description.clone(),
                priority: input.priority,
                recurrence: input.recurrence,
                due_date: input.due_date,
                ..TaskDraft::new(*title)
            }],
            many => many
                .iter()
                .map(|title| TaskDraft {
                    priority: input.priority,
                    recurrence: input.recurrence,
                    ..TaskDraft::new(*title)
                })
                .collect(),
        };

        let n = drafts.len();
        if let Err(e) = self.store.insert(&drafts).await {
            warn!(error = %e, count = n, "task insert failed");
            self.toast(ADD_FAILED, ToastKind::Error);
            return 0;
        }

        let notice = if n == 1 {
            "Task added.".to_string()
        } else {
            format!("{n} tasks added.")
        };
        self.toast(notice, ToastKind::Success);
        self.refresh_tasks().await;
        n
    }

    pub async fn toggle_task_status(&self, id: Uuid, now: DateTime<Utc>) -> bool {
        let (prior, flipped) = {
            let mut s = self.state();
            let Some(task) = s.tasks.iter_mut().find(|t| t.id == id) else {
                return false;
            };
            let prior = task.status;
            task.status = prior.flipped();
            (prior, task.clone())
        };

        if let Err(e) = self
            .store
            .update(id, &TaskPatch::status(flipped.status))
            .await
        {
            warn!(task_id = %id, error = %e, "status update rejected, rolling back");
            let mut s = self.state();
            if let Some(task) = s.tasks.iter_mut().find(|t| t.id == id) {
                task.status = prior;
            }
            s.toasts.push(Toast::new(TOGGLE_FAILED, ToastKind::Error));
            return false;
        }

        if flipped.status == TaskStatus::Completed && flipped.recurrence.is_recurring() {
            if let Some(draft) = next_occurrence(&flipped, now, self.settings.month_overflow) {
                self.roll_forward(&flipped, draft).await;
            }
        }

        self.refresh_tasks().await;
        true
    }

    async fn roll_forward(&self, done: &Task, draft: TaskDraft) {
        let due = draft
            .due_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        match self.store.insert(std::slice::from_ref(&draft)).await {
            Ok(()) => {
                info!(task_id = %done.id, next_due = %due, "recurring task rolled forward");
                self.toast(
                    format!(
                        "'{}' repeats {}. The next one is due {due}.",
                        done.title,
                        done.recurrence.as_str()
                    ),
                    ToastKind::Info,
                );
            }
            Err(e) => {
                warn!(task_id = %done.id, error = %e, "could not create next occurrence");
                self.toast(
                    format!("Could not schedule the next '{}'.", done.title),
                    ToastKind::Error,
                );
            }
        }
    }

    /// Edit the detail columns of a task (title, description, priority,
    /// recurrence, due date). A moved due date re-arms its alarm.
    pub async fn update_task(&self, id: Uuid, patch: TaskPatch) -> bool {
        let undo = {
            let mut s = self.state();
            let Some(task) = s.tasks.iter_mut().find(|t| t.id == id) else {
                return false;
            };
            if patch.is_empty() {
                return true;
            }
            let undo = patch.undo(task);
            patch.apply(task);
            undo
        };

        if let Err(e) = self.store.update(id, &patch).await {
            warn!(task_id = %id, error = %e, "edit rejected, rolling back");
            let mut s = self.state();
            if let Some(task) = s.tasks.iter_mut().find(|t| t.id == id) {
                undo.apply(task);
            }
            s.toasts.push(Toast::new(EDIT_FAILED, ToastKind::Error));
            return false;
        }

        self.toast("Task updated.", ToastKind::Success);
        self.refresh_tasks().await;
        true
    }

    pub async fn delete_task(&self, id: Uuid) -> bool {
        let (pos, removed) = {
            let mut s = self.state();
            let Some(pos) = s.tasks.iter().position(|t| t.id == id) else {
                return false;
            };
            (pos, s.tasks.remove(pos))
        };

        match self.store.delete(id).await {
            Ok(()) => {
                self.toast("Task deleted.", ToastKind::Info);
                self.refresh_tasks().await;
                true
            }
            Err(e) => {
                warn!(task_id = %id, error = %e, "delete rejected, restoring task");
                let mut s = self.state();
                // a refresh may have brought the row back while the call was in flight
                if !s.tasks.iter().any(|t| t.id == id) {
                    let at = pos.min(s.tasks.len());
                    s.tasks.insert(at, removed);
                }
                s.toasts.push(Toast::new(DELETE_FAILED, ToastKind::Error));
                false
            }
        }
    }

    pub async fn toggle_task_timer(&self, id: Uuid, now: DateTime<Utc>) -> Option<TimerChange> {
        let (prior, updated, change) = {
            let mut s = self.state();
            let task = s.tasks.iter_mut().find(|t| t.id == id)?;
            let prior = (task.total_time_spent, task.timer_started_at);
            let change = toggle_timer(task, now);
            (prior, task.clone(), change)
        };

        if let Err(e) = self.store.update(id, &TaskPatch::timer(&updated)).await {
            warn!(task_id = %id, error = %e, "timer update rejected, rolling back");
            let mut s = self.state();
            if let Some(task) = s.tasks.iter_mut().find(|t| t.id == id) {
                (task.total_time_spent, task.timer_started_at) = prior;
            }
            s.toasts.push(Toast::new(TIMER_FAILED, ToastKind::Error));
            return None;
        }

        if let TimerChange::Stopped { .. } = change {
            let total = updated.total_time_spent.unwrap_or(0);
            self.toast(
                format!("Time on '{}': {}", updated.title, format_duration(total)),
                ToastKind::Info,
            );
        }
        self.refresh_tasks().await;
        Some(change)
    }

    /// Run a named backend tool. `None` when it failed (a toast says so).
    pub async fn invoke_tool(&self, name: &str, arguments: Value) -> Option<Value> {
        match self.agent.call_tool(name, &arguments).await {
            Ok(result) => {
                self.refresh_tasks().await;
                Some(result)
            }
            Err(AgentError::Unauthenticated) => {
                self.toast(SESSION_EXPIRED, ToastKind::Error);
                None
            }
            Err(e) => {
                warn!(tool = name, error = %e, "tool call failed");
                self.toast(format!("Operation failed: {name}"), ToastKind::Error);
                None
            }
        }
    }

    // -----------------------------
    // Alarms
    // -----------------------------

    /// One polling pass. Synchronous on purpose: a tick never overlaps the next.
    pub fn tick_alarms(&self, now: DateTime<Utc>) -> Option<Alarm> {
        let raised = {
            let mut guard = self.state();
            let s = &mut *guard;
            s.alarms.tick(&s.tasks, now)
        };
        self.announce(raised)
    }

    pub fn dismiss_alarm(&self) -> Option<Alarm> {
        let next = {
            let mut guard = self.state();
            let s = &mut *guard;
            s.alarms.dismiss(&s.tasks)
        };
        self.announce(next)
    }

    pub fn snooze_alarm(&self, now: DateTime<Utc>) -> Option<Alarm> {
        let next = {
            let mut guard = self.state();
            let s = &mut *guard;
            s.alarms.snooze(&s.tasks, now)
        };
        self.announce(next)
    }

    fn announce(&self, alarm: Option<Alarm>) -> Option<Alarm> {
        if let Some(alarm) = &alarm {
            info!(task_id = %alarm.task_id, title = %alarm.title, "alarm raised");
            self.notifier.notify(alarm);
        }
        alarm
    }

    // -----------------------------
    // Voice
    // -----------------------------

    pub fn start_voice(&self) -> Result<(), VoiceError> {
        self.voice.start()
    }

    pub fn stop_voice(&self) {
        self.voice.stop();
    }

    pub fn submit_transcript(&self, transcript: &str) -> Result<(), VoiceError> {
        self.voice.deliver(transcript)
    }

    // -----------------------------
    // Read side
    // -----------------------------

    pub fn dismiss_toast(&self, id: Uuid) -> bool {
        let mut s = self.state();
        let before = s.toasts.len();
        s.toasts.retain(|t| t.id != id);
        s.toasts.len() != before
    }

    pub fn is_loading(&self) -> bool {
        self.state().composer_busy
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state().messages.clone()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state().tasks.clone()
    }

    pub fn visible_tasks(&self, query: &str) -> Vec<Task> {
        visible_tasks(&self.state().tasks, query)
    }

    pub fn toasts(&self) -> Vec<Toast> {
        self.state().toasts.clone()
    }

    pub fn active_alarm(&self) -> Option<Alarm> {
        self.state().alarms.active().cloned()
    }

    pub fn snapshot(&self, query: &str) -> ViewSnapshot {
        let s = self.state();
        ViewSnapshot {
            messages: s.messages.clone(),
            tasks: visible_tasks(&s.tasks, query),
            alarm: s.alarms.active().cloned(),
            queued_alarms: s.alarms.queued(),
            toasts: s.toasts.clone(),
            loading: s.composer_busy,
            stats: task_stats(&s.tasks),
            voice: VoiceStatus {
                available: self.voice.is_available(),
                listening: self.voice.is_listening(),
            },
        }
    }
}
