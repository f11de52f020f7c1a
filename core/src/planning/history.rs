//! Task execution history
//!
//! Append-only record of task starts, terminations and assessments, capped
//! at a configured length. Replans read it to summarize what already went
//! wrong for a goal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    Started,
    Completed,
    Failed,
    Abandoned,
    Assessed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub goal_id: Option<String>,
    #[serde(default)]
    pub plan_id: Option<String>,
    pub task_id: String,
    pub task_title: String,
    pub kind: TaskEventKind,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TaskHistory {
    events: Vec<TaskEvent>,
    limit: usize,
}

impl TaskHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            events: Vec::new(),
            limit: limit.max(1),
        }
    }

    pub fn from_events(events: Vec<TaskEvent>, limit: usize) -> Self {
        let mut history = Self::new(limit);
        for event in events {
            history.push(event);
        }
        history
    }

    pub fn record(
        &mut self,
        goal_id: Option<String>,
        plan_id: Option<String>,
        task_id: impl Into<String>,
        task_title: impl Into<String>,
        kind: TaskEventKind,
        detail: Option<String>,
    ) {
        self.push(TaskEvent {
            at: Utc::now(),
            goal_id,
            plan_id,
            task_id: task_id.into(),
            task_title: task_title.into(),
            kind,
            detail,
        });
    }

    fn push(&mut self, event: TaskEvent) {
        self.events.push(event);
        if self.events.len() > self.limit {
            let overflow = self.events.len() - self.limit;
            self.events.drain(..overflow);
        }
    }

    pub fn events(&self) -> &[TaskEvent] {
        &self.events
    }

    pub fn recent(&self, n: usize) -> &[TaskEvent] {
        let start = self.events.len().saturating_sub(n);
        &self.events[start..]
    }

    /// One line per failed or abandoned task for the goal, oldest first.
    /// Returns `None` when there is nothing to report.
    pub fn failure_summary(&self, goal_id: &str) -> Option<String> {
        let lines: Vec<String> = self
            .events
            .iter()
            .filter(|e| e.goal_id.as_deref() == Some(goal_id))
            .filter_map(|e| {
                let verb = match e.kind {
                    TaskEventKind::Failed => "failed",
                    TaskEventKind::Abandoned => "abandoned",
                    _ => return None,
                };
                let detail = e.detail.as_deref().unwrap_or("no reason recorded");
                Some(format!("task '{}' {}: {}", e.task_title, verb, detail))
            })
            .collect();

        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}
