//! Plans: ordered tasks with dependency edges, owned by a goal

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::{Task, TaskRef, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    Completed,
    Abandoned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub goal_id: String,
    pub tasks: Vec<Task>,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Plan {
    pub fn new(
        goal_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        tasks: Vec<Task>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            description: description.into(),
            goal_id: goal_id.into(),
            tasks,
            status: PlanStatus::Active,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// A plan is complete once every task reached a terminal state; failed
    /// and abandoned tasks count, their record lives in the history log
    pub fn is_completed(&self) -> bool {
        self.tasks.iter().all(|t| t.is_terminal())
    }

    pub fn mark_completed(&mut self) {
        if self.status == PlanStatus::Active {
            self.status = PlanStatus::Completed;
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn mark_abandoned(&mut self) {
        if self.status == PlanStatus::Active {
            self.status = PlanStatus::Abandoned;
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    fn dep_completed(&self, dep: &TaskRef) -> bool {
        match dep {
            TaskRef::Id(id) => self
                .tasks
                .iter()
                .any(|t| t.id == *id && t.status == TaskStatus::Completed),
            TaskRef::Index(i) => self
                .tasks
                .get(*i)
                .map(|t| t.status == TaskStatus::Completed)
                .unwrap_or(false),
        }
    }

    /// First pending task whose dependencies are all completed
    pub fn next_startable(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| {
            t.status == TaskStatus::Pending
                && t.dependencies.iter().all(|dep| self.dep_completed(dep))
        })
    }

    /// (completed, total) counts for status displays
    pub fn progress_counts(&self) -> (usize, usize) {
        let done = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        (done, self.tasks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::tracker::TaskTracker;

    fn inv_tracker(item: &str, count: u32) -> TaskTracker {
        TaskTracker::Inventory {
            item: item.to_string(),
            count,
        }
    }

    fn three_step_plan() -> Plan {
        let t0 = Task::new("logs", "", inv_tracker("oak_log", 4), Vec::new());
        let t1 = Task::new(
            "planks",
            "",
            inv_tracker("oak_planks", 8),
            vec![TaskRef::Index(0)],
        );
        let t2 = Task::new(
            "table",
            "",
            inv_tracker("crafting_table", 1),
            vec![TaskRef::Id(t1.id.clone())],
        );
        Plan::new("goal-1", "wood chain", "", vec![t0, t1, t2])
    }

    #[test]
    fn test_next_startable_respects_dependencies() {
        let mut plan = three_step_plan();
        assert_eq!(plan.next_startable().map(|t| t.title.clone()).unwrap(), "logs");

        // Completing the first task by id unblocks the index-referenced second
        let first_id = plan.tasks[0].id.clone();
        plan.task_mut(&first_id).unwrap().complete();
        assert_eq!(
            plan.next_startable().map(|t| t.title.clone()).unwrap(),
            "planks"
        );

        plan.tasks[1].complete();
        assert_eq!(
            plan.next_startable().map(|t| t.title.clone()).unwrap(),
            "table"
        );
    }

    #[test]
    fn test_active_task_is_not_startable() {
        let mut plan = three_step_plan();
        plan.tasks[0].activate();
        assert!(plan.next_startable().is_none());
    }

    #[test]
    fn test_completion_counts_failed_and_abandoned_as_terminal() {
        let mut plan = three_step_plan();
        assert!(!plan.is_completed());

        plan.tasks[0].complete();
        plan.tasks[1].fail("no planks nearby");
        assert!(!plan.is_completed());

        plan.tasks[2].abandon("skipped");
        assert!(plan.is_completed());

        plan.mark_completed();
        assert_eq!(plan.status, PlanStatus::Completed);
        assert!(plan.completed_at.is_some());
        assert_eq!(plan.progress_counts(), (1, 3));
    }

    #[test]
    fn test_out_of_range_index_dep_blocks() {
        let t0 = Task::new(
            "blocked",
            "",
            inv_tracker("stone", 1),
            vec![TaskRef::Index(9)],
        );
        let plan = Plan::new("goal-1", "broken", "", vec![t0]);
        assert!(plan.next_startable().is_none());
    }
}
