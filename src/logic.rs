/*
Task list presentation logic: display order, title search and sidebar stats.
Independent from HTTP / Axum so it can be tested on plain vectors.
*/

use serde::Serialize;

use crate::models::{Priority, Task, TaskStatus};

// Canonical display order: newest first by creation time.
// Rows without a creation time sink to the bottom, ties keep their order.
pub fn sort_newest_first(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

// Case-insensitive substring match on the title only.
// An empty (or blank) query keeps every task.
pub fn visible_tasks(tasks: &[Task], query: &str) -> Vec<Task> {
    let needle = query.trim().to_lowercase();
    tasks
        .iter()
        .filter(|t| needle.is_empty() || t.title.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct PriorityCounts {
    pub urgent: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub percent_complete: u32, // 0..=100, rounded
    pub pending_by_priority: PriorityCounts,
}

pub fn task_stats(tasks: &[Task]) -> TaskStats {
    let total = tasks.len();
    let completed = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();

    let mut by_priority = PriorityCounts::default();
    for t in tasks.iter().filter(|t| t.status == TaskStatus::Pending) {
        match t.priority {
            Priority::Urgent => by_priority.urgent += 1,
            Priority::High => by_priority.high += 1,
            Priority::Medium => by_priority.medium += 1,
            Priority::Low => by_priority.low += 1,
        }
    }

    let percent_complete = if total == 0 {
        0
    } else {
        ((completed as f64 / total as f64) * 100.0).round() as u32
    };

    TaskStats {
        total,
        completed,
        pending: total - completed,
        percent_complete,
        pending_by_priority: by_priority,
    }
}

// Timer readout:
//     < 1h  -> MM:SS
//     >= 1h -> H:MM:SS
pub fn format_duration(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
