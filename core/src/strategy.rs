//! Prioritized decision strategies
//!
//! The alternative decision path: instead of running the active mode's
//! execute step, the loop hands the tick to a sorted strategy list and the
//! highest-priority strategy whose guard passes acts. Kept alongside the
//! mode-driven path behind `LoopConfig::use_strategy_pipeline`; the built-in
//! strategies mirror the mode machine's reflexes as a declarative rule table.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::BotConfig;
use crate::error::Result;
use crate::game::{GameContext, GameSnapshot};
use crate::llm::{LlmClient, MainActionRequest};
use crate::modes::{ModeKind, ModeManager};
use crate::planning::GoalPlanner;

/// Everything a strategy may consult or act through on one tick
pub struct StrategyState {
    pub snapshot: GameSnapshot,
    pub current_mode: Option<ModeKind>,
    pub modes: Arc<ModeManager>,
    pub game: Arc<dyn GameContext>,
    pub llm: Arc<dyn LlmClient>,
    pub planner: Arc<GoalPlanner>,
    pub config: Arc<BotConfig>,
}

#[async_trait::async_trait]
pub trait DecisionStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32;

    fn group(&self) -> Option<&str> {
        None
    }

    async fn can_execute(&self, state: &StrategyState) -> Result<bool>;

    async fn execute(&self, state: &StrategyState) -> Result<()>;
}

/// One declarative transition rule consulted by [`ModeAutoSwitchStrategy`]
pub struct ModeTransitionRule {
    /// Required current mode; `None` matches any
    pub from: Option<ModeKind>,
    pub to: ModeKind,
    /// Forced rules bypass the priority gate
    pub forced: bool,
    pub priority: i32,
    pub description: &'static str,
    pub guard: fn(&StrategyState) -> bool,
}

impl ModeTransitionRule {
    fn matches(&self, state: &StrategyState) -> bool {
        let from_ok = match self.from {
            None => true,
            Some(kind) => state.current_mode == Some(kind),
        };
        from_ok && state.current_mode != Some(self.to) && (self.guard)(state)
    }
}

/// Rule-table driven mode switching (priority 100, group "mode")
pub struct ModeAutoSwitchStrategy {
    rules: Vec<ModeTransitionRule>,
}

impl Default for ModeAutoSwitchStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeAutoSwitchStrategy {
    pub fn new() -> Self {
        let rules = vec![
            ModeTransitionRule {
                from: None,
                to: ModeKind::Combat,
                forced: false,
                priority: 100,
                description: "engage nearby hostile",
                guard: |state| {
                    state
                        .snapshot
                        .hostiles_within(state.config.combat.engage_radius)
                        > 0
                        && state.snapshot.player.health > state.config.combat.retreat_health
                },
            },
            ModeTransitionRule {
                from: Some(ModeKind::Combat),
                to: ModeKind::Main,
                forced: true,
                priority: 90,
                description: "stand down, area clear or health low",
                guard: |state| {
                    state
                        .snapshot
                        .hostiles_within(state.config.combat.engage_radius)
                        == 0
                        || state.snapshot.player.health <= state.config.combat.retreat_health
                },
            },
        ];
        Self { rules }.sorted()
    }

    /// Extension point for embedder-defined rules
    pub fn with_rule(mut self, rule: ModeTransitionRule) -> Self {
        self.rules.push(rule);
        self.sorted()
    }

    fn sorted(mut self) -> Self {
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        self
    }
}

#[async_trait::async_trait]
impl DecisionStrategy for ModeAutoSwitchStrategy {
    fn name(&self) -> &str {
        "mode_auto_switch"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn group(&self) -> Option<&str> {
        Some("mode")
    }

    async fn can_execute(&self, state: &StrategyState) -> Result<bool> {
        Ok(self.rules.iter().any(|rule| rule.matches(state)))
    }

    async fn execute(&self, state: &StrategyState) -> Result<()> {
        for rule in &self.rules {
            if !rule.matches(state) {
                continue;
            }
            let applied = if rule.forced {
                match state.modes.set_mode(rule.to, rule.description).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(rule = rule.description, error = %e, "forced transition failed");
                        false
                    }
                }
            } else {
                match state.modes.try_set_mode(rule.to, rule.description).await {
                    Ok(applied) => applied,
                    Err(e) => {
                        warn!(rule = rule.description, error = %e, "transition failed");
                        false
                    }
                }
            };
            if applied {
                debug!(rule = rule.description, to = %rule.to, "rule applied");
                return Ok(());
            }
        }
        Ok(())
    }
}

/// Single LLM-chosen action while the baseline drives (priority 10, group "llm")
pub struct LlmFallbackStrategy;

#[async_trait::async_trait]
impl DecisionStrategy for LlmFallbackStrategy {
    fn name(&self) -> &str {
        "llm_fallback"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn group(&self) -> Option<&str> {
        Some("llm")
    }

    async fn can_execute(&self, state: &StrategyState) -> Result<bool> {
        Ok(state.current_mode == Some(ModeKind::Main) && state.planner.current_goal().is_some())
    }

    async fn execute(&self, state: &StrategyState) -> Result<()> {
        let goal = state.planner.current_goal().map(|g| g.description);
        let task = state.planner.peek_current_task().map(|t| t.title);
        let request = MainActionRequest::from_snapshot(goal, task, &state.snapshot, Vec::new());

        let Some(decision) = state.llm.request_main_action(&request).await else {
            debug!("no fallback decision this tick");
            return Ok(());
        };
        let outcome = state
            .game
            .execute(&decision.action.name, decision.action.params)
            .await?;
        debug!(action = %decision.action.name, message = %outcome.message, "fallback action done");
        Ok(())
    }
}

/// Descending-priority strategy list; exactly one strategy fires per call
#[derive(Default)]
pub struct DecisionStrategyManager {
    strategies: Vec<Arc<dyn DecisionStrategy>>,
    groups: HashMap<String, Vec<String>>,
}

impl DecisionStrategyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager preloaded with the built-in strategies
    pub fn with_defaults() -> Self {
        let mut manager = Self::new();
        manager.add_strategy(Arc::new(ModeAutoSwitchStrategy::new()));
        manager.add_strategy(Arc::new(LlmFallbackStrategy));
        manager
    }

    /// Insert keeping the list sorted by descending priority; equal
    /// priorities keep insertion order
    pub fn add_strategy(&mut self, strategy: Arc<dyn DecisionStrategy>) {
        if let Some(group) = strategy.group() {
            self.groups
                .entry(group.to_string())
                .or_default()
                .push(strategy.name().to_string());
        }
        let pos = self
            .strategies
            .iter()
            .position(|s| s.priority() < strategy.priority())
            .unwrap_or(self.strategies.len());
        self.strategies.insert(pos, strategy);
    }

    pub fn remove_strategy(&mut self, name: &str) -> bool {
        let Some(pos) = self.strategies.iter().position(|s| s.name() == name) else {
            return false;
        };
        let removed = self.strategies.remove(pos);
        if let Some(group) = removed.group() {
            if let Some(names) = self.groups.get_mut(group) {
                names.retain(|n| n != name);
                if names.is_empty() {
                    self.groups.remove(group);
                }
            }
        }
        true
    }

    pub fn strategies_in_group(&self, group: &str) -> Vec<String> {
        self.groups.get(group).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Run the first executable strategy. Check or execute errors are logged
    /// and evaluation moves on to the next strategy. Returns whether any
    /// strategy ran to completion.
    pub async fn execute_strategies(&self, state: &StrategyState) -> bool {
        for strategy in &self.strategies {
            let runnable = match strategy.can_execute(state).await {
                Ok(runnable) => runnable,
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "strategy check failed");
                    continue;
                }
            };
            if !runnable {
                continue;
            }
            match strategy.execute(state).await {
                Ok(()) => {
                    debug!(strategy = strategy.name(), "strategy executed");
                    return true;
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "strategy failed");
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlanningConfig;
    use crate::error::AgentError;
    use crate::game::{SimGame, Vec3};
    use crate::llm::{ActionRequest, MainActionDecision, ScriptedLlm};
    use crate::memory::ExperienceLog;
    use crate::modes::Mode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubMode(ModeKind);

    #[async_trait::async_trait]
    impl Mode for StubMode {
        fn kind(&self) -> ModeKind {
            self.0
        }

        async fn activate(&self, _reason: &str) -> Result<()> {
            Ok(())
        }

        async fn deactivate(&self) -> Result<()> {
            Ok(())
        }

        async fn execute(&self) -> Result<()> {
            Ok(())
        }

        async fn check_transitions(
            &self,
            _snapshot: &GameSnapshot,
        ) -> Vec<crate::modes::TransitionRequest> {
            Vec::new()
        }
    }

    struct FlagStrategy {
        name: &'static str,
        priority: i32,
        group: Option<&'static str>,
        runnable: bool,
        fail_check: bool,
        fail_execute: bool,
        runs: Arc<AtomicUsize>,
    }

    impl FlagStrategy {
        fn new(name: &'static str, priority: i32, runnable: bool) -> Self {
            Self {
                name,
                priority,
                group: None,
                runnable,
                fail_check: false,
                fail_execute: false,
                runs: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait::async_trait]
    impl DecisionStrategy for FlagStrategy {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn group(&self) -> Option<&str> {
            self.group
        }

        async fn can_execute(&self, _state: &StrategyState) -> Result<bool> {
            if self.fail_check {
                return Err(AgentError::Internal {
                    message: "scripted check failure".to_string(),
                });
            }
            Ok(self.runnable)
        }

        async fn execute(&self, _state: &StrategyState) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail_execute {
                return Err(AgentError::Internal {
                    message: "scripted execute failure".to_string(),
                });
            }
            Ok(())
        }
    }

    struct Fixture {
        sim: Arc<SimGame>,
        llm: Arc<ScriptedLlm>,
        planner: Arc<GoalPlanner>,
        modes: Arc<ModeManager>,
    }

    fn fixture() -> Fixture {
        let sim = Arc::new(SimGame::new());
        let llm = Arc::new(ScriptedLlm::new());
        let planner = Arc::new(GoalPlanner::new(
            Arc::clone(&llm) as Arc<dyn LlmClient>,
            Arc::new(ExperienceLog::in_memory(8)),
            PlanningConfig::default(),
        ));
        let mut modes = ModeManager::new(crate::config::LoopConfig::default());
        modes.register(Arc::new(StubMode(ModeKind::Main)));
        modes.register(Arc::new(StubMode(ModeKind::Combat)));
        Fixture {
            sim,
            llm,
            planner,
            modes: Arc::new(modes),
        }
    }

    fn state_of(fx: &Fixture, snapshot: GameSnapshot) -> StrategyState {
        StrategyState {
            snapshot,
            current_mode: fx.modes.current_mode(),
            modes: Arc::clone(&fx.modes),
            game: Arc::clone(&fx.sim) as Arc<dyn GameContext>,
            llm: Arc::clone(&fx.llm) as Arc<dyn LlmClient>,
            planner: Arc::clone(&fx.planner),
            config: Arc::new(BotConfig::default()),
        }
    }

    fn hostile_snapshot() -> GameSnapshot {
        let mut snap = GameSnapshot::empty(1);
        snap.entities.push(crate::game::EntityInfo {
            id: 1,
            name: "zombie".to_string(),
            position: Vec3::new(5.0, 64.0, 0.0),
            hostile: true,
            health: Some(20.0),
        });
        snap
    }

    #[tokio::test]
    async fn test_highest_runnable_strategy_wins() {
        let fx = fixture();
        let top = FlagStrategy::new("top", 100, false);
        let mid = FlagStrategy::new("mid", 50, true);
        let low = FlagStrategy::new("low", 10, true);
        let mid_runs = Arc::clone(&mid.runs);
        let low_runs = Arc::clone(&low.runs);

        let mut manager = DecisionStrategyManager::new();
        // Insertion order should not matter
        manager.add_strategy(Arc::new(low));
        manager.add_strategy(Arc::new(top));
        manager.add_strategy(Arc::new(mid));

        let state = state_of(&fx, GameSnapshot::empty(1));
        assert!(manager.execute_strategies(&state).await);
        assert_eq!(mid_runs.load(Ordering::SeqCst), 1);
        assert_eq!(low_runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_runnable_strategy_returns_false() {
        let fx = fixture();
        let mut manager = DecisionStrategyManager::new();
        manager.add_strategy(Arc::new(FlagStrategy::new("idle", 50, false)));

        let state = state_of(&fx, GameSnapshot::empty(1));
        assert!(!manager.execute_strategies(&state).await);
    }

    #[tokio::test]
    async fn test_errors_skip_to_the_next_strategy() {
        let fx = fixture();
        let mut broken_check = FlagStrategy::new("broken_check", 100, true);
        broken_check.fail_check = true;
        let mut broken_exec = FlagStrategy::new("broken_exec", 50, true);
        broken_exec.fail_execute = true;
        let healthy = FlagStrategy::new("healthy", 10, true);
        let healthy_runs = Arc::clone(&healthy.runs);

        let mut manager = DecisionStrategyManager::new();
        manager.add_strategy(Arc::new(broken_check));
        manager.add_strategy(Arc::new(broken_exec));
        manager.add_strategy(Arc::new(healthy));

        let state = state_of(&fx, GameSnapshot::empty(1));
        assert!(manager.execute_strategies(&state).await);
        assert_eq!(healthy_runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_group_index_tracks_membership() {
        let mut first = FlagStrategy::new("first", 50, true);
        first.group = Some("mode");
        let mut second = FlagStrategy::new("second", 40, true);
        second.group = Some("mode");

        let mut manager = DecisionStrategyManager::new();
        manager.add_strategy(Arc::new(first));
        manager.add_strategy(Arc::new(second));
        assert_eq!(manager.strategies_in_group("mode"), vec!["first", "second"]);

        assert!(manager.remove_strategy("first"));
        assert!(!manager.remove_strategy("first"));
        assert_eq!(manager.strategies_in_group("mode"), vec!["second"]);
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn test_auto_switch_engages_and_stands_down() {
        let fx = fixture();
        fx.modes.set_mode(ModeKind::Main, "start").await.unwrap();
        let strategy = ModeAutoSwitchStrategy::new();

        let state = state_of(&fx, hostile_snapshot());
        assert!(strategy.can_execute(&state).await.unwrap());
        strategy.execute(&state).await.unwrap();
        assert_eq!(fx.modes.current_mode(), Some(ModeKind::Combat));

        // Area clears: the stand-down rule forces the baseline back
        let state = state_of(&fx, GameSnapshot::empty(2));
        assert!(strategy.can_execute(&state).await.unwrap());
        strategy.execute(&state).await.unwrap();
        assert_eq!(fx.modes.current_mode(), Some(ModeKind::Main));

        // Nothing to do from a calm baseline
        let state = state_of(&fx, GameSnapshot::empty(3));
        assert!(!strategy.can_execute(&state).await.unwrap());
    }

    #[tokio::test]
    async fn test_llm_fallback_acts_only_in_main_mode() {
        let fx = fixture();
        let strategy = LlmFallbackStrategy;

        // Not in main mode yet
        let state = state_of(&fx, GameSnapshot::empty(1));
        assert!(!strategy.can_execute(&state).await.unwrap());

        fx.modes.set_mode(ModeKind::Main, "start").await.unwrap();
        fx.planner.create_goal("get wood");
        fx.llm.push_main_action(MainActionDecision {
            thinking: None,
            action: ActionRequest {
                name: "collect".to_string(),
                params: serde_json::json!({"item": "oak_log", "count": 1}),
            },
        });

        let state = state_of(&fx, GameSnapshot::empty(2));
        assert!(strategy.can_execute(&state).await.unwrap());
        strategy.execute(&state).await.unwrap();
        assert_eq!(fx.sim.item_count("oak_log"), 1);
    }
}
