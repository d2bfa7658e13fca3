use tracing::info;

use crate::models::Alarm;

/// Side effect fired when an alarm becomes active (desktop notification,
/// sound, ...). The page also picks the alarm up from the state snapshot.
pub trait AlarmNotifier: Send + Sync {
    fn notify(&self, alarm: &Alarm);
}

#[derive(Debug, Default)]
pub struct LogNotifier;

impl AlarmNotifier for LogNotifier {
    fn notify(&self, alarm: &Alarm) {
        info!(
            task_id = %alarm.task_id,
            due = %alarm.due_date.to_rfc3339(),
            "Task due: {}",
            alarm.title
        );
    }
}
