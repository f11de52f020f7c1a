//! Goals: open-ended objectives realized through one or more plans

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Active,
    Completed,
    Abandoned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub description: String,
    pub status: GoalStatus,
    /// Plans created for this goal, in creation order
    #[serde(default)]
    pub plan_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Goal {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            status: GoalStatus::Active,
            plan_ids: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn add_plan(&mut self, plan_id: impl Into<String>) {
        self.plan_ids.push(plan_id.into());
    }

    pub fn mark_completed(&mut self) {
        if self.status == GoalStatus::Active {
            self.status = GoalStatus::Completed;
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn mark_abandoned(&mut self) {
        if self.status == GoalStatus::Active {
            self.status = GoalStatus::Abandoned;
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, GoalStatus::Completed | GoalStatus::Abandoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goal_lifecycle() {
        let mut goal = Goal::new("build a shelter");
        assert_eq!(goal.status, GoalStatus::Active);
        assert!(goal.plan_ids.is_empty());

        goal.add_plan("plan-1");
        goal.mark_completed();
        assert!(goal.is_terminal());
        assert!(goal.completed_at.is_some());

        // Terminal goals stay put
        goal.mark_abandoned();
        assert_eq!(goal.status, GoalStatus::Completed);
    }
}
