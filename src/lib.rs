// Define modules
pub mod agent; // Agent backend client (dispatch, tools, history)
pub mod api; // Router: JSON API + static page
pub mod config; // TODO_CHAT_* environment settings
pub mod error; // Error enums shared by the clients
pub mod http; // Outbound HTTP seam
pub mod logic; // List filtering, sorting and stats
pub mod models; // Task, Message, Toast, Alarm
pub mod notify; // Alarm side effects
pub mod poller; // Background alarm poller and voice pump
pub mod routes_chat; // HTTP handlers for chat, voice, alarm and toasts
pub mod routes_tasks; // HTTP handlers for the task list
pub mod scheduler; // Due checks, recurrence, timers, alarm board
pub mod session; // Signed-in session
pub mod store; // Task persistence (REST or db.json)
pub mod viewmodel; // Conversation + task state, optimistic mutations
pub mod voice; // Voice capture sessions
