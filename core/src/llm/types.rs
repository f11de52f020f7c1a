//! Request and response payloads for the LLM boundary
//!
//! Requests carry a compact, prompt-ready summary of the world; responses
//! are the structured decisions the orchestrator acts on. Everything here
//! round-trips through serde so tests can capture and inspect payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::game::snapshot::{GameSnapshot, Vec3};
use crate::planning::task::TaskRef;

/// Cap applied to inventory/entity/block summary lists to keep prompts stable
const SUMMARY_CAP: usize = 16;

fn summarize_inventory(snapshot: &GameSnapshot) -> Vec<String> {
    let mut out: Vec<String> = snapshot
        .inventory
        .iter()
        .map(|s| format!("{} x{}", s.item, s.count))
        .collect();
    out.truncate(SUMMARY_CAP);
    out
}

fn summarize_entities(snapshot: &GameSnapshot) -> Vec<String> {
    let mut out: Vec<String> = snapshot
        .entities
        .iter()
        .map(|e| {
            let marker = if e.hostile { " (hostile)" } else { "" };
            format!(
                "{}{} at ({:.0}, {:.0}, {:.0})",
                e.name, marker, e.position.x, e.position.y, e.position.z
            )
        })
        .collect();
    out.truncate(SUMMARY_CAP);
    out
}

fn summarize_blocks(snapshot: &GameSnapshot) -> Vec<String> {
    let mut out: Vec<String> = snapshot
        .blocks
        .iter()
        .map(|b| {
            format!(
                "{} at ({:.0}, {:.0}, {:.0})",
                b.name, b.position.x, b.position.y, b.position.z
            )
        })
        .collect();
    out.truncate(SUMMARY_CAP);
    out
}

/// Ask for the next action while the main mode drives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainActionRequest {
    pub goal: Option<String>,
    pub task: Option<String>,
    pub position: Vec3,
    pub health: f64,
    pub food: f64,
    pub inventory: Vec<String>,
    pub nearby_blocks: Vec<String>,
    pub nearby_entities: Vec<String>,
    #[serde(default)]
    pub recent_outcomes: Vec<String>,
}

impl MainActionRequest {
    pub fn from_snapshot(
        goal: Option<String>,
        task: Option<String>,
        snapshot: &GameSnapshot,
        recent_outcomes: Vec<String>,
    ) -> Self {
        Self {
            goal,
            task,
            position: snapshot.player.position,
            health: snapshot.player.health,
            food: snapshot.player.food,
            inventory: summarize_inventory(snapshot),
            nearby_blocks: summarize_blocks(snapshot),
            nearby_entities: summarize_entities(snapshot),
            recent_outcomes,
        }
    }
}

/// One opaque game action chosen by the LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub name: String,
    #[serde(default)]
    pub params: Value,
}

/// Decision returned for a main-action request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainActionDecision {
    #[serde(default)]
    pub thinking: Option<String>,
    pub action: ActionRequest,
}

/// Ask for a fresh plan toward the current goal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub goal_id: String,
    pub goal: String,
    pub position: Vec3,
    pub health: f64,
    pub inventory: Vec<String>,
    pub nearby_blocks: Vec<String>,
    pub nearby_entities: Vec<String>,
    /// Lines from the experience log relevant to planning
    #[serde(default)]
    pub experiences: Vec<String>,
    /// Summary of earlier failed attempts at this goal, when replanning
    #[serde(default)]
    pub attempt_history: Option<String>,
}

impl PlanRequest {
    pub fn from_snapshot(
        goal_id: String,
        goal: String,
        snapshot: &GameSnapshot,
        experiences: Vec<String>,
        attempt_history: Option<String>,
    ) -> Self {
        Self {
            goal_id,
            goal,
            position: snapshot.player.position,
            health: snapshot.player.health,
            inventory: summarize_inventory(snapshot),
            nearby_blocks: summarize_blocks(snapshot),
            nearby_entities: summarize_entities(snapshot),
            experiences,
            attempt_history,
        }
    }
}

/// Plan as returned by the LLM
///
/// Tasks stay raw JSON here: each entry is parsed individually during
/// instantiation so one malformed task never sinks the whole plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tasks: Vec<Value>,
}

/// One task entry inside a [`PlanDraft`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Tracker definition, parsed into a typed tracker during instantiation
    pub tracker: Value,
    #[serde(default)]
    pub dependencies: Vec<TaskRef>,
}

/// Which container GUI is being operated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Chest,
    Furnace,
}

impl std::fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerKind::Chest => write!(f, "chest"),
            ContainerKind::Furnace => write!(f, "furnace"),
        }
    }
}

/// Ask which operations to perform against an open container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerRequest {
    pub kind: ContainerKind,
    /// Why the container was opened, e.g. "store excess cobblestone"
    pub purpose: String,
    #[serde(default)]
    pub position: Option<Vec3>,
    pub inventory: Vec<String>,
    #[serde(default)]
    pub container_contents: Vec<String>,
}

impl ContainerRequest {
    pub fn new(kind: ContainerKind, purpose: String, snapshot: &GameSnapshot) -> Self {
        Self {
            kind,
            purpose,
            position: None,
            inventory: summarize_inventory(snapshot),
            container_contents: Vec::new(),
        }
    }
}

/// One container operation to dispatch through the game context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerOp {
    pub action: String,
    #[serde(default)]
    pub params: Value,
}

/// Operations returned for a container request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerPlan {
    #[serde(default)]
    pub operations: Vec<ContainerOp>,
}

/// Ask for an out-of-band judgement of task progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssessmentRequest {
    pub goal: Option<String>,
    pub task_title: String,
    pub task_description: String,
    pub progress_percent: f64,
    pub progress_summary: String,
    #[serde(default)]
    pub recent_outcomes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::snapshot::{EntityInfo, ItemStack};

    #[test]
    fn test_main_request_summarizes_snapshot() {
        let mut snap = GameSnapshot::empty(7);
        snap.inventory.push(ItemStack {
            item: "oak_log".to_string(),
            count: 3,
        });
        snap.entities.push(EntityInfo {
            id: 1,
            name: "zombie".to_string(),
            position: Vec3::new(5.0, 64.0, 0.0),
            hostile: true,
            health: Some(20.0),
        });

        let req = MainActionRequest::from_snapshot(
            Some("get wood".to_string()),
            None,
            &snap,
            vec!["collected 1 oak_log".to_string()],
        );
        assert_eq!(req.inventory, vec!["oak_log x3"]);
        assert!(req.nearby_entities[0].contains("hostile"));
        assert_eq!(req.recent_outcomes.len(), 1);
    }

    #[test]
    fn test_decision_parses_without_thinking() {
        let decision: MainActionDecision = serde_json::from_str(
            r#"{"action": {"name": "collect", "params": {"item": "oak_log", "count": 1}}}"#,
        )
        .unwrap();
        assert!(decision.thinking.is_none());
        assert_eq!(decision.action.name, "collect");
    }

    #[test]
    fn test_plan_draft_keeps_raw_tasks() {
        let draft: PlanDraft = serde_json::from_str(
            r#"{
                "title": "Gather wood",
                "tasks": [
                    {"title": "chop", "tracker": {"type": "inventory", "item": "oak_log", "count": 4}},
                    {"totally": "malformed"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(draft.tasks.len(), 2);
        assert!(serde_json::from_value::<TaskDraft>(draft.tasks[1].clone()).is_err());
    }

    #[test]
    fn test_container_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&ContainerKind::Furnace).unwrap(),
            "\"furnace\""
        );
        assert_eq!(ContainerKind::Chest.to_string(), "chest");
    }
}
