//! Background loops owned by the service: the due-task alarm poller and the
//! voice transcript pump. Both stop when the shared token is cancelled.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::viewmodel::{ChatViewModel, Surface};

/// Tick the alarm board every `every`. The first pass runs immediately so
/// a task that is already due surfaces on startup.
pub fn spawn_alarm_poller(
    vm: Arc<ChatViewModel>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(interval_secs = every.as_secs(), "alarm poller started");

        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Some(alarm) = vm.tick_alarms(Utc::now()) {
                        tracing::debug!(task_id = %alarm.task_id, "alarm surfaced by poller");
                    }
                }
            }
        }

        tracing::debug!("alarm poller stopped");
    })
}

/// Feed finalized voice transcripts into the conversation, one at a time.
pub fn spawn_voice_pump(
    vm: Arc<ChatViewModel>,
    mut transcripts: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let transcript = tokio::select! {
                _ = cancel.cancelled() => break,
                next = transcripts.recv() => match next {
                    Some(t) => t,
                    None => {
                        tracing::debug!("transcript channel closed, stopping voice pump");
                        break;
                    }
                },
            };
            vm.send_utterance(&transcript, Surface::Voice).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentClient;
    use crate::http::mock::MockHttpClient;
    use crate::models::{Role, TaskDraft};
    use crate::notify::recording::RecordingNotifier;
    use crate::scheduler::SchedulerSettings;
    use crate::session::SessionSlot;
    use crate::store::{JsonFileStore, TaskStore};
    use crate::voice::NoVoice;
    use serde_json::json;

    fn vm_with(
        http: MockHttpClient,
        store: Arc<dyn TaskStore>,
        notifier: Arc<RecordingNotifier>,
    ) -> Arc<ChatViewModel> {
        let session = Arc::new(SessionSlot::from_token(Some("tok".into()), None));
        Arc::new(ChatViewModel::new(
            AgentClient::new(Arc::new(http), "http://agent.test", session),
            store,
            Arc::new(NoVoice),
            notifier,
            SchedulerSettings::default(),
        ))
    }

    #[tokio::test]
    async fn poller_raises_due_task_once_and_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let session = Arc::new(SessionSlot::from_token(Some("tok".into()), None));
        let store = Arc::new(JsonFileStore::new(dir.path().join("db.json"), session));
        let mut draft = TaskDraft::new("Stand-up");
        draft.due_date = Some(Utc::now() - chrono::Duration::seconds(10));
        store.insert(&[draft]).await.unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let vm = vm_with(MockHttpClient::new(), store, notifier.clone());
        vm.refresh_tasks().await;

        let cancel = CancellationToken::new();
        let handle = spawn_alarm_poller(vm.clone(), Duration::from_millis(10), cancel.clone());
        tokio::time::sleep(Duration::from_millis(60)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(notifier.count(), 1);
        assert_eq!(vm.active_alarm().map(|a| a.title), Some("Stand-up".to_string()));
    }

    #[tokio::test]
    async fn voice_pump_dispatches_transcripts() {
        let http = MockHttpClient::new();
        http.respond_json(
            "http://agent.test/api/agent/dispatch",
            200,
            json!({ "message": "Done." }),
        );
        let dir = tempfile::tempdir().unwrap();
        let session = Arc::new(SessionSlot::from_token(Some("tok".into()), None));
        let store = Arc::new(JsonFileStore::new(dir.path().join("db.json"), session));
        let vm = vm_with(http.clone(), store, Arc::new(RecordingNotifier::default()));

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_voice_pump(vm.clone(), rx, CancellationToken::new());
        tx.send("add task water plants".to_string()).unwrap();
        drop(tx);
        handle.await.unwrap();

        let messages = vm.messages();
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "add task water plants");
        assert_eq!(messages[2].content, "Done.");
        assert_eq!(http.requests_to("/dispatch").len(), 1);
    }
}
