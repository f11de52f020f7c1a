//! Main mode: LLM-guided goal pursuit
//!
//! The baseline the agent always returns to. Each tick it makes sure the
//! current goal has a plan and a live task, asks the LLM for one concrete
//! action and dispatches it. Container work is not executed inline; the
//! decision parks a job in the shared slot and the matching container mode
//! takes over on the next transition check.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::CombatConfig;
use crate::error::Result;
use crate::game::{GameContext, GameSnapshot};
use crate::llm::{ContainerKind, LlmClient, MainActionRequest};
use crate::planning::GoalPlanner;

use super::{ContainerJobs, Mode, ModeKind, TransitionRequest};

/// Action outcomes kept for prompt context
const RECENT_OUTCOMES: usize = 8;

#[derive(Deserialize)]
struct OpenContainerParams {
    container: ContainerKind,
    #[serde(default)]
    purpose: String,
}

pub struct MainMode {
    game: Arc<dyn GameContext>,
    llm: Arc<dyn LlmClient>,
    planner: Arc<GoalPlanner>,
    jobs: Arc<ContainerJobs>,
    combat: CombatConfig,
    outcomes: Mutex<VecDeque<String>>,
}

impl MainMode {
    pub fn new(
        game: Arc<dyn GameContext>,
        llm: Arc<dyn LlmClient>,
        planner: Arc<GoalPlanner>,
        jobs: Arc<ContainerJobs>,
        combat: CombatConfig,
    ) -> Self {
        Self {
            game,
            llm,
            planner,
            jobs,
            combat,
            outcomes: Mutex::new(VecDeque::new()),
        }
    }

    fn push_outcome(&self, line: String) {
        let mut outcomes = self.outcomes.lock();
        outcomes.push_back(line);
        while outcomes.len() > RECENT_OUTCOMES {
            outcomes.pop_front();
        }
    }

    fn recent_outcomes(&self) -> Vec<String> {
        self.outcomes.lock().iter().cloned().collect()
    }
}

#[async_trait::async_trait]
impl Mode for MainMode {
    fn kind(&self) -> ModeKind {
        ModeKind::Main
    }

    async fn activate(&self, reason: &str) -> Result<()> {
        debug!(reason, "main mode active");
        Ok(())
    }

    async fn deactivate(&self) -> Result<()> {
        Ok(())
    }

    async fn execute(&self) -> Result<()> {
        let snapshot = self.game.snapshot().await?;

        let Some(goal) = self.planner.current_goal() else {
            debug!("no current goal, idling");
            return Ok(());
        };

        // Plan generation and replanning each consume the tick
        if self.planner.current_plan().is_none() {
            if self
                .planner
                .generate_plan_for_current_goal(&snapshot)
                .await
                .is_none()
            {
                debug!("no plan produced, retrying next tick");
            }
            return Ok(());
        }

        let task = self.planner.current_task();
        if task.is_none() {
            warn!("no startable task left, requesting replan");
            self.planner
                .replan_for_current_goal(&snapshot, "remaining tasks are blocked")
                .await;
            return Ok(());
        }

        let request = MainActionRequest::from_snapshot(
            Some(goal.description.clone()),
            task.map(|t| t.title),
            &snapshot,
            self.recent_outcomes(),
        );
        let Some(decision) = self.llm.request_main_action(&request).await else {
            debug!("no action decision this tick");
            return Ok(());
        };
        if let Some(thinking) = &decision.thinking {
            debug!(thinking, "model reasoning");
        }

        let action = decision.action;
        if action.name == "open_container" {
            match serde_json::from_value::<OpenContainerParams>(action.params.clone()) {
                Ok(params) => {
                    let purpose = if params.purpose.is_empty() {
                        "tidy up inventory".to_string()
                    } else {
                        params.purpose
                    };
                    debug!(kind = %params.container, purpose, "container session requested");
                    self.jobs.request(params.container, purpose);
                    self.push_outcome(format!("requested {} session", params.container));
                }
                Err(e) => {
                    warn!(params = %action.params, error = %e, "unusable open_container params");
                }
            }
            return Ok(());
        }

        let outcome = self.game.execute(&action.name, action.params).await?;
        if outcome.success {
            debug!(action = %action.name, message = %outcome.message, "action done");
        } else {
            warn!(action = %action.name, message = %outcome.message, "action failed");
        }
        self.push_outcome(format!("{}: {}", action.name, outcome.message));
        Ok(())
    }

    async fn check_transitions(&self, snapshot: &GameSnapshot) -> Vec<TransitionRequest> {
        let mut requests = Vec::new();
        if snapshot.hostiles_within(self.combat.engage_radius) > 0
            && snapshot.player.health > self.combat.retreat_health
        {
            requests.push(TransitionRequest::gated(
                ModeKind::Combat,
                "hostile within engage range",
            ));
        }
        if let Some(kind) = self.jobs.pending_kind() {
            let target = match kind {
                ContainerKind::Chest => ModeKind::Chest,
                ContainerKind::Furnace => ModeKind::Furnace,
            };
            requests.push(TransitionRequest::gated(
                target,
                format!("{kind} session requested"),
            ));
        }
        requests
    }
}
