//! Tasks: the trackable leaf units of a plan

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tracker::TaskTracker;
use crate::game::snapshot::GameSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Active,
    Completed,
    Failed,
    /// Skipped on request; terminal without counting as a failure
    Abandoned,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Abandoned
        )
    }
}

/// Dependency reference: another task's id, or its position in the plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskRef {
    Index(usize),
    Id(String),
}

/// One out-of-band LLM judgement of task progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvaluation {
    pub at: DateTime<Utc>,
    pub assessment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub tracker: TaskTracker,
    pub status: TaskStatus,
    #[serde(default)]
    pub dependencies: Vec<TaskRef>,
    #[serde(default)]
    pub evaluations: Vec<TaskEvaluation>,
    #[serde(default)]
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        tracker: TaskTracker,
        dependencies: Vec<TaskRef>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            description: description.into(),
            tracker,
            status: TaskStatus::Pending,
            dependencies,
            evaluations: Vec::new(),
            status_reason: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Pending -> Active; anything else is a no-op
    pub fn activate(&mut self) {
        if self.status == TaskStatus::Pending {
            self.status = TaskStatus::Active;
            self.started_at = Some(Utc::now());
        }
    }

    fn finish(&mut self, status: TaskStatus, reason: Option<String>) {
        if self.is_terminal() {
            return;
        }
        self.status = status;
        self.status_reason = reason;
        self.finished_at = Some(Utc::now());
    }

    pub fn complete(&mut self) {
        self.finish(TaskStatus::Completed, None);
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.finish(TaskStatus::Failed, Some(reason.into()));
    }

    pub fn abandon(&mut self, reason: impl Into<String>) {
        self.finish(TaskStatus::Abandoned, Some(reason.into()));
    }

    /// Latched completion check: once completed, stays completed no matter
    /// what later snapshots show. Failed/abandoned tasks never flip back.
    pub fn check_completion(&mut self, snapshot: &GameSnapshot) -> bool {
        match self.status {
            TaskStatus::Completed => true,
            TaskStatus::Failed | TaskStatus::Abandoned => false,
            TaskStatus::Pending | TaskStatus::Active => {
                if self.tracker.check_completion(snapshot) {
                    self.finish(TaskStatus::Completed, None);
                }
                self.status == TaskStatus::Completed
            }
        }
    }

    pub fn add_evaluation(&mut self, assessment: impl Into<String>) {
        self.evaluations.push(TaskEvaluation {
            at: Utc::now(),
            assessment: assessment.into(),
        });
    }
}
