//! The cooperative decision loop
//!
//! One iteration: honor a pending interrupt, observe the world and fan the
//! snapshot out to listening modes, let the mode machine react, then let the
//! active mode (or the strategy pipeline) act. Every Nth iteration the LLM is
//! asked for an out-of-band read on task progress. Nothing in here terminates
//! the loop; every failure degrades to a logged skip plus a backoff sleep.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BotConfig;
use crate::game::{GameContext, GameSnapshot};
use crate::interrupt::InterruptController;
use crate::llm::{LlmClient, TaskAssessmentRequest};
use crate::modes::ModeManager;
use crate::planning::GoalPlanner;
use crate::strategy::{DecisionStrategyManager, StrategyState};

pub struct DecisionLoop {
    config: Arc<BotConfig>,
    game: Arc<dyn GameContext>,
    llm: Arc<dyn LlmClient>,
    modes: Arc<ModeManager>,
    planner: Arc<GoalPlanner>,
    interrupts: Arc<InterruptController>,
    strategies: Arc<DecisionStrategyManager>,
}

impl DecisionLoop {
    pub fn new(
        config: Arc<BotConfig>,
        game: Arc<dyn GameContext>,
        llm: Arc<dyn LlmClient>,
        modes: Arc<ModeManager>,
        planner: Arc<GoalPlanner>,
        interrupts: Arc<InterruptController>,
        strategies: Arc<DecisionStrategyManager>,
    ) -> Self {
        Self {
            config,
            game,
            llm,
            modes,
            planner,
            interrupts,
            strategies,
        }
    }

    /// Run until the token cancels, sleeping between iterations
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("decision loop started");
            let mut iteration: u64 = 0;
            loop {
                iteration += 1;
                let pause = self.tick(iteration).await;
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!(iterations = iteration, "decision loop stopped");
                        break;
                    }
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        })
    }

    /// One loop iteration; returns how long to sleep before the next
    pub async fn tick(&self, iteration: u64) -> Duration {
        // An interrupt eats the whole cycle
        if let Some(reason) = self.interrupts.take() {
            debug!(reason, "cycle skipped by interrupt");
            return self.config.loop_cfg.backoff();
        }

        let snapshot = match self.game.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "snapshot failed, backing off");
                return self.config.loop_cfg.backoff();
            }
        };

        self.modes.notify_game_state(&snapshot).await;

        // A mode switch consumes the iteration's action slot
        let switched = self.modes.check_auto_transitions(&snapshot).await;
        if !switched {
            if self.config.loop_cfg.use_strategy_pipeline {
                let state = StrategyState {
                    snapshot: snapshot.clone(),
                    current_mode: self.modes.current_mode(),
                    modes: Arc::clone(&self.modes),
                    game: Arc::clone(&self.game),
                    llm: Arc::clone(&self.llm),
                    planner: Arc::clone(&self.planner),
                    config: Arc::clone(&self.config),
                };
                self.strategies.execute_strategies(&state).await;
            } else {
                self.modes.execute_current_mode().await;
            }
        }

        if iteration % u64::from(self.config.loop_cfg.task_eval_every) == 0 {
            self.assess_progress(&snapshot).await;
        }

        self.modes.poll_interval()
    }

    /// Out-of-band LLM judgement of how the current task is going
    async fn assess_progress(&self, snapshot: &GameSnapshot) {
        let Some(task) = self.planner.peek_current_task() else {
            return;
        };
        let progress = task.tracker.progress(snapshot);
        let request = TaskAssessmentRequest {
            goal: self.planner.current_goal().map(|g| g.description),
            task_title: task.title,
            task_description: task.description,
            progress_percent: progress.percentage,
            progress_summary: progress.description,
            recent_outcomes: Vec::new(),
        };
        let Some(assessment) = self.llm.assess_task_progress(&request).await else {
            debug!("no progress assessment this cycle");
            return;
        };
        if self.planner.record_assessment(&assessment) {
            debug!(assessment, "task progress assessed");
        }
    }
}
