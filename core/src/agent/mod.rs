//! Agent assembly and lifecycle
//!
//! Wires the collaborators into a running bot: the mode state machine, the
//! goal planner and its background bookkeeping, the experience log, the
//! interrupt controller and the decision loop. The embedder supplies a game
//! context and an LLM client; everything else comes from [`BotConfig`].

mod decision_loop;

pub use decision_loop::DecisionLoop;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::BotConfig;
use crate::error::Result;
use crate::game::GameContext;
use crate::interrupt::InterruptController;
use crate::llm::LlmClient;
use crate::memory::ExperienceLog;
use crate::modes::{CombatMode, ContainerJobs, ContainerMode, MainMode, ModeKind, ModeManager};
use crate::planning::{Goal, GoalPlanner, PlanningStore};
use crate::strategy::DecisionStrategyManager;

/// Retained experience entries
const EXPERIENCE_LIMIT: usize = 256;

/// Serializable point-in-time summary for status surfaces
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub mode: String,
    pub goal: Option<String>,
    pub plan: Option<String>,
    pub task: Option<String>,
    pub interrupted: bool,
    pub experiences: usize,
}

/// The assembled bot
pub struct Agent {
    game: Arc<dyn GameContext>,
    planner: Arc<GoalPlanner>,
    store: Arc<PlanningStore>,
    memory: Arc<ExperienceLog>,
    modes: Arc<ModeManager>,
    interrupts: Arc<InterruptController>,
    decision_loop: Arc<DecisionLoop>,
    shutdown: Mutex<Option<CancellationToken>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Agent {
    /// Assemble an agent from its collaborators, restoring any persisted
    /// planning state from the configured data directory
    pub async fn new(
        config: BotConfig,
        game: Arc<dyn GameContext>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        let config = Arc::new(config);
        let memory = Arc::new(ExperienceLog::open(config.memory_path(), EXPERIENCE_LIMIT).await);
        let store = Arc::new(PlanningStore::from_config(&config));
        let planner = Arc::new(GoalPlanner::new(
            Arc::clone(&llm),
            Arc::clone(&memory),
            config.planning.clone(),
        ));
        let state = store.load_state().await;
        let events = store.load_history().await;
        planner.restore(state, events);

        // Completed goals become experiences the next plan request can see
        {
            let memory = Arc::clone(&memory);
            planner.set_on_goal_completed(move |goal| {
                memory.record("goal", format!("completed goal: {}", goal.description));
                Ok(())
            });
        }

        let jobs = Arc::new(ContainerJobs::new());
        let mut modes = ModeManager::new(config.loop_cfg.clone());
        modes.register(Arc::new(MainMode::new(
            Arc::clone(&game),
            Arc::clone(&llm),
            Arc::clone(&planner),
            Arc::clone(&jobs),
            config.combat.clone(),
        )));
        modes.register(Arc::new(CombatMode::new(
            Arc::clone(&game),
            config.combat.clone(),
        )));
        modes.register(Arc::new(ContainerMode::chest(
            Arc::clone(&game),
            Arc::clone(&llm),
            Arc::clone(&jobs),
            &config.container,
        )));
        modes.register(Arc::new(ContainerMode::furnace(
            Arc::clone(&game),
            Arc::clone(&llm),
            Arc::clone(&jobs),
            &config.container,
        )));
        let modes = Arc::new(modes);

        let interrupts = Arc::new(InterruptController::new());
        let strategies = Arc::new(DecisionStrategyManager::with_defaults());
        let decision_loop = Arc::new(DecisionLoop::new(
            Arc::clone(&config),
            Arc::clone(&game),
            llm,
            Arc::clone(&modes),
            Arc::clone(&planner),
            Arc::clone(&interrupts),
            strategies,
        ));

        Self {
            game,
            planner,
            store,
            memory,
            modes,
            interrupts,
            decision_loop,
            shutdown: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start the decision loop and the planner's background bookkeeping
    pub async fn start(&self) -> Result<()> {
        if self.shutdown.lock().is_some() {
            warn!("start called while already running");
            return Ok(());
        }
        self.modes.set_mode(ModeKind::Main, "agent started").await?;

        let token = CancellationToken::new();
        let mut handles = self.planner.spawn_background(
            Arc::clone(&self.game),
            Arc::clone(&self.store),
            token.clone(),
        );
        handles.push(Arc::clone(&self.decision_loop).spawn(token.clone()));

        *self.shutdown.lock() = Some(token);
        self.tasks.lock().extend(handles);
        info!("agent started");
        Ok(())
    }

    /// Cancel the loops and wait for them to finish; the planner's autosave
    /// task flushes state on its way out
    pub async fn stop(&self) {
        let Some(token) = self.shutdown.lock().take() else {
            return;
        };
        token.cancel();
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "background task join failed");
            }
        }
        info!("agent stopped");
    }

    /// Drive the loop inline until the current goal settles or the tick
    /// budget runs out; returns the ticks consumed and flushes state at the
    /// end. Demo and test helper, independent of `start`.
    pub async fn run_until_idle(&self, max_ticks: u64) -> Result<u64> {
        if self.modes.current_mode().is_none() {
            self.modes
                .set_mode(ModeKind::Main, "inline run started")
                .await?;
        }
        let mut consumed = 0;
        for tick in 1..=max_ticks {
            consumed = tick;
            self.decision_loop.tick(tick).await;
            match self.game.snapshot().await {
                Ok(snapshot) => {
                    self.planner.evaluate_tasks(&snapshot);
                }
                Err(e) => warn!(error = %e, "snapshot failed during inline run"),
            }
            if self.planner.current_goal().is_none() {
                break;
            }
        }
        self.planner.save_to(&self.store).await;
        Ok(consumed)
    }

    /// Register a goal; it becomes current if none is active
    pub fn set_goal(&self, description: &str) -> Goal {
        self.planner.create_goal(description)
    }

    /// Flush planning state, history and the experience log to disk
    pub async fn save(&self) {
        self.planner.save_to(&self.store).await;
    }

    /// Ask the loop to skip its next cycle
    pub fn interrupt(&self, reason: &str) {
        self.interrupts.interrupt(reason);
    }

    pub fn current_mode(&self) -> String {
        self.modes.current_mode_name()
    }

    pub fn planner(&self) -> &Arc<GoalPlanner> {
        &self.planner
    }

    pub fn modes(&self) -> &Arc<ModeManager> {
        &self.modes
    }

    pub fn memory(&self) -> &Arc<ExperienceLog> {
        &self.memory
    }

    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            mode: self.modes.current_mode_name(),
            goal: self.planner.current_goal().map(|g| g.description),
            plan: self.planner.current_plan().map(|p| p.title),
            task: self.planner.peek_current_task().map(|t| t.title),
            interrupted: self.interrupts.is_interrupted(),
            experiences: self.memory.len(),
        }
    }
}
