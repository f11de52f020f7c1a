//! Durable planning state
//!
//! One JSON file for the goal/plan aggregate (camelCase keys, the wire
//! format the agent has always used) and one for the task-execution history.
//! Writes go to a temp file first and rename into place; unreadable files
//! load as a fresh default with a logged warning.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::goal::Goal;
use super::history::TaskEvent;
use super::plan::Plan;
use crate::config::BotConfig;
use crate::error::{AgentError, Result};

/// Persisted aggregate of the planning registries and current pointers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningState {
    #[serde(default)]
    pub current_goal_id: Option<String>,
    #[serde(default)]
    pub current_plan_id: Option<String>,
    #[serde(default)]
    pub current_task_id: Option<String>,
    #[serde(default)]
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub plans: Vec<Plan>,
}

pub struct PlanningStore {
    state_path: PathBuf,
    history_path: PathBuf,
}

async fn write_atomic(path: &Path, json: String) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let temp_path = path.with_extension("tmp");
    tokio::fs::write(&temp_path, json).await?;
    tokio::fs::rename(&temp_path, path).await?;
    Ok(())
}

impl PlanningStore {
    pub fn new(state_path: PathBuf, history_path: PathBuf) -> Self {
        Self {
            state_path,
            history_path,
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(config.state_path(), config.history_path())
    }

    pub async fn save_state(&self, state: &PlanningState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        write_atomic(&self.state_path, json).await.map_err(|e| {
            warn!(path = %self.state_path.display(), error = %e, "planning state write failed");
            AgentError::StateWriteFailed {
                path: self.state_path.clone(),
            }
        })?;
        Ok(())
    }

    /// Missing file is a fresh start; a corrupt file is logged and replaced
    /// by the default on the next save
    pub async fn load_state(&self) -> PlanningState {
        match tokio::fs::read_to_string(&self.state_path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(state) => state,
                Err(e) => {
                    warn!(path = %self.state_path.display(), error = %e, "planning state corrupted, starting fresh");
                    PlanningState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.state_path.display(), "no planning state on disk, starting fresh");
                PlanningState::default()
            }
            Err(e) => {
                warn!(path = %self.state_path.display(), error = %e, "planning state unreadable, starting fresh");
                PlanningState::default()
            }
        }
    }

    pub async fn save_history(&self, events: &[TaskEvent]) -> Result<()> {
        let json = serde_json::to_string_pretty(events)?;
        write_atomic(&self.history_path, json).await.map_err(|e| {
            warn!(path = %self.history_path.display(), error = %e, "task history write failed");
            AgentError::StateWriteFailed {
                path: self.history_path.clone(),
            }
        })?;
        Ok(())
    }

    pub async fn load_history(&self) -> Vec<TaskEvent> {
        match tokio::fs::read_to_string(&self.history_path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(events) => events,
                Err(e) => {
                    warn!(path = %self.history_path.display(), error = %e, "task history corrupted, starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::history::TaskEventKind;
    use crate::planning::plan::PlanStatus;
    use crate::planning::task::Task;
    use crate::planning::tracker::TaskTracker;

    fn store_in(dir: &Path) -> PlanningStore {
        PlanningStore::new(dir.join("state.json"), dir.join("history.json"))
    }

    fn sample_state() -> PlanningState {
        let mut goal = Goal::new("get wood");
        let task = Task::new(
            "chop",
            "",
            TaskTracker::Inventory {
                item: "oak_log".to_string(),
                count: 4,
            },
            Vec::new(),
        );
        let plan = Plan::new(goal.id.clone(), "wood plan", "", vec![task]);
        goal.add_plan(plan.id.clone());

        PlanningState {
            current_goal_id: Some(goal.id.clone()),
            current_plan_id: Some(plan.id.clone()),
            current_task_id: None,
            goals: vec![goal],
            plans: vec![plan],
        }
    }

    #[tokio::test]
    async fn test_state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let state = sample_state();

        store.save_state(&state).await.unwrap();
        let loaded = store.load_state().await;

        assert_eq!(loaded.current_goal_id, state.current_goal_id);
        assert_eq!(loaded.goals.len(), 1);
        assert_eq!(loaded.plans.len(), 1);
        assert_eq!(loaded.plans[0].status, PlanStatus::Active);
        assert_eq!(loaded.plans[0].tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_state_file_uses_camel_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.save_state(&sample_state()).await.unwrap();

        let raw = tokio::fs::read_to_string(dir.path().join("state.json"))
            .await
            .unwrap();
        assert!(raw.contains("\"currentGoalId\""));
        assert!(raw.contains("\"currentPlanId\""));
        assert!(!raw.contains("\"current_goal_id\""));
    }

    #[tokio::test]
    async fn test_missing_state_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let loaded = store.load_state().await;
        assert!(loaded.current_goal_id.is_none());
        assert!(loaded.goals.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_state_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("state.json"), "{not valid json")
            .await
            .unwrap();
        let store = store_in(dir.path());
        let loaded = store.load_state().await;
        assert!(loaded.goals.is_empty());
    }

    #[tokio::test]
    async fn test_history_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let events = vec![TaskEvent {
            at: chrono::Utc::now(),
            goal_id: Some("g1".to_string()),
            plan_id: None,
            task_id: "t1".to_string(),
            task_title: "chop".to_string(),
            kind: TaskEventKind::Started,
            detail: None,
        }];
        store.save_history(&events).await.unwrap();

        let loaded = store.load_history().await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].task_title, "chop");
    }
}
