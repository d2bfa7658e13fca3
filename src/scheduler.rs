/*
Due-date, recurrence and work-timer logic.
Pure functions over task lists and a clock value; the caller owns the
polling interval and every side effect (notifications, store writes).
*/

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Datelike, Duration, Months, Utc};
use uuid::Uuid;

use crate::models::{Alarm, Recurrence, Task, TaskDraft, TaskStatus};

pub const POLL_INTERVAL_SECS: i64 = 30;
// Must stay at least twice the poll interval or a tick can miss a due task.
pub const DUE_WINDOW_SECS: i64 = 2 * POLL_INTERVAL_SECS;
pub const SNOOZE_MINS: i64 = 5;

/// What "one month later" means when the target month is shorter.
///
///   Clamp    -> Jan 31 + 1 month = Feb 28 (Feb 29 in leap years)
///   RollOver -> Jan 31 + 1 month = Mar 3  (Mar 2 in leap years)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MonthOverflow {
    #[default]
    Clamp,
    RollOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub due_window: Duration,
    pub snooze: Duration,
    pub month_overflow: MonthOverflow,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            due_window: Duration::seconds(DUE_WINDOW_SECS),
            snooze: Duration::minutes(SNOOZE_MINS),
            month_overflow: MonthOverflow::default(),
        }
    }
}

// A pending task is newly due while `0 <= now - due_date < window`.
fn is_newly_due(task: &Task, now: DateTime<Utc>, window: Duration) -> bool {
    if task.status != TaskStatus::Pending {
        return false;
    }
    let Some(due) = task.due_date else {
        return false;
    };
    let diff = now - due;
    diff >= Duration::zero() && diff < window
}

/// All tasks inside the due window, in list order.
pub fn due_tasks<'a>(
    tasks: &'a [Task],
    now: DateTime<Utc>,
    window: Duration,
) -> impl Iterator<Item = &'a Task> + 'a {
    tasks.iter().filter(move |t| is_newly_due(t, now, window))
}

/// First pending task that crossed its due time within the last `window`
/// and is not already the active alarm.
pub fn check_due(
    tasks: &[Task],
    now: DateTime<Utc>,
    active: Option<Uuid>,
    window: Duration,
) -> Option<&Task> {
    due_tasks(tasks, now, window).find(|t| Some(t.id) != active)
}

/// Due date one recurrence period after `from`. `None` for non-recurring
/// tasks or when the result is out of chrono's range.
pub fn next_due(
    recurrence: Recurrence,
    from: DateTime<Utc>,
    overflow: MonthOverflow,
) -> Option<DateTime<Utc>> {
    match recurrence {
        Recurrence::None => None,
        Recurrence::Daily => from.checked_add_signed(Duration::days(1)),
        Recurrence::Weekly => from.checked_add_signed(Duration::days(7)),
        Recurrence::Monthly => match overflow {
            MonthOverflow::Clamp => from.checked_add_months(Months::new(1)),
            MonthOverflow::RollOver => roll_over_month(from),
        },
    }
}

// Advance to the 1st of next month, then walk forward the remaining days so
// surplus days spill into the following month.
fn roll_over_month(from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let first = from.with_day(1)?.checked_add_months(Months::new(1))?;
    first.checked_add_signed(Duration::days(i64::from(from.day()) - 1))
}

/// Draft of the next occurrence of a recurring task completed at `completed_at`.
/// Returns `None` when the task does not recur.
pub fn next_occurrence(
    task: &Task,
    completed_at: DateTime<Utc>,
    overflow: MonthOverflow,
) -> Option<TaskDraft> {
    let due = next_due(task.recurrence, completed_at, overflow)?;
    Some(TaskDraft {
        title: task.title.clone(),
        description: task.description.clone(),
        status: TaskStatus::Pending,
        priority: task.priority,
        recurrence: task.recurrence,
        due_date: Some(due),
        tags: task.tags.clone(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerChange {
    Started,
    Stopped { elapsed_secs: u64 },
}

/// Open a work session, or close the open one and fold it into the total.
pub fn toggle_timer(task: &mut Task, now: DateTime<Utc>) -> TimerChange {
    match task.timer_started_at.take() {
        None => {
            task.timer_started_at = Some(now);
            TimerChange::Started
        }
        Some(started) => {
            // clock skew between clients can put `started` in the future
            let elapsed_secs = u64::try_from((now - started).num_seconds()).unwrap_or(0);
            if elapsed_secs > 0 || task.total_time_spent.is_some() {
                task.total_time_spent = Some(task.total_time_spent.unwrap_or(0) + elapsed_secs);
            }
            TimerChange::Stopped { elapsed_secs }
        }
    }
}

/// Single-slot alarm state with a FIFO of tasks that became due while the
/// slot was taken. A (task, due date) pair is surfaced at most once.
#[derive(Debug, Clone)]
pub struct AlarmBoard {
    window: Duration,
    snooze: Duration,
    active: Option<Alarm>,
    queued: VecDeque<Alarm>,
    surfaced: HashSet<(Uuid, DateTime<Utc>)>,
    snoozed: Vec<(Alarm, DateTime<Utc>)>,
}

impl AlarmBoard {
    pub fn new(settings: &SchedulerSettings) -> Self {
        Self {
            window: settings.due_window,
            snooze: settings.snooze,
            active: None,
            queued: VecDeque::new(),
            surfaced: HashSet::new(),
            snoozed: Vec::new(),
        }
    }

    pub fn active(&self) -> Option<&Alarm> {
        self.active.as_ref()
    }

    pub fn queued(&self) -> usize {
        self.queued.len()
    }

    /// One scheduler pass. Returns the alarm that became active on this
    /// pass, if any, so the caller can notify.
    pub fn tick(&mut self, tasks: &[Task], now: DateTime<Utc>) -> Option<Alarm> {
        let horizon = now - self.window;
        self.surfaced.retain(|(_, due)| *due > horizon);

        let mut woken = Vec::new();
        self.snoozed.retain(|(alarm, until)| {
            if *until <= now {
                woken.push(alarm.clone());
                false
            } else {
                true
            }
        });
        for alarm in woken.into_iter().rev() {
            self.queued.push_front(Alarm { raised_at: now, ..alarm });
        }

        // Walk the list one first-match at a time, queueing pairs not seen yet.
        let active_id = self.active.as_ref().map(|a| a.task_id);
        let mut rest = tasks;
        while let Some(task) = check_due(rest, now, active_id, self.window) {
            let Some(at) = rest.iter().position(|t| std::ptr::eq(t, task)) else {
                break;
            };
            rest = &rest[at + 1..];

            let Some(due) = task.due_date else {
                continue;
            };
            if self.surfaced.insert((task.id, due)) {
                self.queued.push_back(Alarm {
                    task_id: task.id,
                    title: task.title.clone(),
                    due_date: due,
                    raised_at: now,
                });
            }
        }

        self.promote(tasks)
    }

    /// Clear the active alarm and surface the next queued one, if any.
    pub fn dismiss(&mut self, tasks: &[Task]) -> Option<Alarm> {
        self.active = None;
        self.promote(tasks)
    }

    /// Clear the active alarm and bring it back after the snooze length.
    pub fn snooze(&mut self, tasks: &[Task], now: DateTime<Utc>) -> Option<Alarm> {
        if let Some(alarm) = self.active.take() {
            self.snoozed.push((alarm, now + self.snooze));
        }
        self.promote(tasks)
    }

    // Queued alarms whose task was completed or removed in the meantime are dropped.
    fn promote(&mut self, tasks: &[Task]) -> Option<Alarm> {
        if self.active.is_some() {
            return None;
        }
        while let Some(next) = self.queued.pop_front() {
            let still_pending = tasks
                .iter()
                .any(|t| t.id == next.task_id && t.status == TaskStatus::Pending);
            if still_pending {
                self.active = Some(next.clone());
                return Some(next);
            }
        }
        None
    }
}
