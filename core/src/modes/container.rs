//! Container modes: LLM-planned chest and furnace sessions
//!
//! One implementation registered twice, once per container kind. A session
//! claims the parked job, pauses the world scan, fetches an operation list
//! from the LLM and dispatches one operation per tick. The session ends when
//! the list runs out; the manager's max-duration bound catches runaway ones.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::ContainerConfig;
use crate::error::Result;
use crate::game::{GameContext, GameSnapshot};
use crate::llm::{ContainerKind, ContainerOp, ContainerRequest, LlmClient};

use super::{ContainerJobs, Mode, ModeKind, TransitionRequest};

struct Session {
    purpose: String,
    fetched: bool,
    operations: VecDeque<ContainerOp>,
    done: bool,
}

pub struct ContainerMode {
    kind: ContainerKind,
    mode_kind: ModeKind,
    game: Arc<dyn GameContext>,
    llm: Arc<dyn LlmClient>,
    jobs: Arc<ContainerJobs>,
    max_duration: Duration,
    session: Mutex<Option<Session>>,
}

impl ContainerMode {
    pub fn chest(
        game: Arc<dyn GameContext>,
        llm: Arc<dyn LlmClient>,
        jobs: Arc<ContainerJobs>,
        config: &ContainerConfig,
    ) -> Self {
        Self::new(ContainerKind::Chest, ModeKind::Chest, game, llm, jobs, config)
    }

    pub fn furnace(
        game: Arc<dyn GameContext>,
        llm: Arc<dyn LlmClient>,
        jobs: Arc<ContainerJobs>,
        config: &ContainerConfig,
    ) -> Self {
        Self::new(ContainerKind::Furnace, ModeKind::Furnace, game, llm, jobs, config)
    }

    fn new(
        kind: ContainerKind,
        mode_kind: ModeKind,
        game: Arc<dyn GameContext>,
        llm: Arc<dyn LlmClient>,
        jobs: Arc<ContainerJobs>,
        config: &ContainerConfig,
    ) -> Self {
        Self {
            kind,
            mode_kind,
            game,
            llm,
            jobs,
            max_duration: config.max_duration(),
            session: Mutex::new(None),
        }
    }

    /// Ask the LLM for the operation list; consumes one tick
    async fn fetch_operations(&self, purpose: String) -> Result<()> {
        let snapshot = self.game.snapshot().await?;
        let request = ContainerRequest::new(self.kind, purpose, &snapshot);
        let plan = match self.kind {
            ContainerKind::Chest => self.llm.request_chest_operations(&request).await,
            ContainerKind::Furnace => self.llm.request_furnace_operations(&request).await,
        };

        let mut session = self.session.lock();
        let Some(session) = session.as_mut() else {
            return Ok(());
        };
        session.fetched = true;
        match plan {
            Some(plan) => {
                debug!(kind = %self.kind, count = plan.operations.len(), "operations received");
                session.operations = plan.operations.into();
                if session.operations.is_empty() {
                    session.done = true;
                }
            }
            None => {
                warn!(kind = %self.kind, "no operations from model, closing session");
                session.done = true;
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Mode for ContainerMode {
    fn kind(&self) -> ModeKind {
        self.mode_kind
    }

    fn max_duration(&self) -> Option<Duration> {
        Some(self.max_duration)
    }

    async fn activate(&self, reason: &str) -> Result<()> {
        let purpose = self
            .jobs
            .take_for(self.kind)
            .map(|job| job.purpose)
            .unwrap_or_else(|| "tidy up inventory".to_string());
        debug!(kind = %self.kind, purpose, reason, "container session starting");

        self.game.pause_world_scan().await;
        let outcome = self
            .game
            .execute("open_container", json!({"container": self.kind}))
            .await?;
        if !outcome.success {
            warn!(kind = %self.kind, message = %outcome.message, "container did not open");
        }
        *self.session.lock() = Some(Session {
            purpose,
            fetched: false,
            operations: VecDeque::new(),
            done: !outcome.success,
        });
        Ok(())
    }

    async fn deactivate(&self) -> Result<()> {
        *self.session.lock() = None;
        if let Err(e) = self.game.execute("close_container", json!({})).await {
            warn!(kind = %self.kind, error = %e, "close failed");
        }
        self.game.resume_world_scan().await;
        debug!(kind = %self.kind, "container session ended");
        Ok(())
    }

    async fn execute(&self) -> Result<()> {
        let pending = {
            let session = self.session.lock();
            match session.as_ref() {
                Some(s) if !s.done => Some((s.purpose.clone(), s.fetched)),
                _ => None,
            }
        };
        let Some((purpose, fetched)) = pending else {
            return Ok(());
        };

        if !fetched {
            return self.fetch_operations(purpose).await;
        }

        let next = {
            let mut session = self.session.lock();
            session.as_mut().and_then(|s| s.operations.pop_front())
        };
        if let Some(op) = next {
            let outcome = self.game.execute(&op.action, op.params).await?;
            if outcome.success {
                debug!(kind = %self.kind, action = %op.action, message = %outcome.message, "operation done");
            } else {
                warn!(kind = %self.kind, action = %op.action, message = %outcome.message, "operation failed");
            }
        }

        let mut session = self.session.lock();
        if let Some(session) = session.as_mut() {
            if session.operations.is_empty() {
                session.done = true;
            }
        }
        Ok(())
    }

    async fn check_transitions(&self, _snapshot: &GameSnapshot) -> Vec<TransitionRequest> {
        let finished = self
            .session
            .lock()
            .as_ref()
            .map(|s| s.done)
            .unwrap_or(true);
        if finished {
            vec![TransitionRequest::forced(
                ModeKind::Main,
                format!("{} work finished", self.kind),
            )]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ContainerPlan, ScriptedLlm};

    struct Fixture {
        sim: Arc<crate::game::SimGame>,
        llm: Arc<ScriptedLlm>,
        jobs: Arc<ContainerJobs>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                sim: Arc::new(crate::game::SimGame::new()),
                llm: Arc::new(ScriptedLlm::new()),
                jobs: Arc::new(ContainerJobs::new()),
            }
        }

        fn chest_mode(&self) -> ContainerMode {
            ContainerMode::chest(
                Arc::clone(&self.sim) as Arc<dyn GameContext>,
                Arc::clone(&self.llm) as Arc<dyn LlmClient>,
                Arc::clone(&self.jobs),
                &ContainerConfig::default(),
            )
        }
    }

    fn ops(entries: Vec<(&str, serde_json::Value)>) -> ContainerPlan {
        ContainerPlan {
            operations: entries
                .into_iter()
                .map(|(action, params)| ContainerOp {
                    action: action.to_string(),
                    params,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_session_runs_operations_then_finishes() {
        let fx = Fixture::new();
        fx.sim.set_chest_item("stone", 10);
        fx.jobs.request(ContainerKind::Chest, "grab stone");
        fx.llm.push_container_plan(ops(vec![
            ("withdraw", json!({"item": "stone", "count": 5})),
            ("withdraw", json!({"item": "stone", "count": 2})),
        ]));

        let mode = fx.chest_mode();
        mode.activate("requested").await.unwrap();
        assert!(fx.sim.scan_paused());
        assert!(fx.jobs.pending_kind().is_none());
        assert!(mode.check_transitions(&GameSnapshot::empty(1)).await.is_empty());

        // Tick 1 fetches the operation list
        mode.execute().await.unwrap();
        let requests = fx.llm.container_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].kind, ContainerKind::Chest);
        assert_eq!(requests[0].purpose, "grab stone");

        // One operation per tick
        mode.execute().await.unwrap();
        assert_eq!(fx.sim.item_count("stone"), 5);
        assert!(mode.check_transitions(&GameSnapshot::empty(2)).await.is_empty());

        mode.execute().await.unwrap();
        assert_eq!(fx.sim.item_count("stone"), 7);

        let requests = mode.check_transitions(&GameSnapshot::empty(3)).await;
        assert_eq!(requests.len(), 1);
        assert!(requests[0].forced);
        assert_eq!(requests[0].target, ModeKind::Main);

        mode.deactivate().await.unwrap();
        assert!(!fx.sim.scan_paused());
        let log = fx.sim.action_log();
        assert_eq!(log.first().map(String::as_str), Some("open_container"));
        assert_eq!(log.last().map(String::as_str), Some("close_container"));
    }

    #[tokio::test]
    async fn test_no_operations_ends_the_session() {
        let fx = Fixture::new();
        fx.jobs.request(ContainerKind::Chest, "store junk");

        let mode = fx.chest_mode();
        mode.activate("requested").await.unwrap();
        mode.execute().await.unwrap();

        let requests = mode.check_transitions(&GameSnapshot::empty(1)).await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].target, ModeKind::Main);
    }

    #[tokio::test]
    async fn test_furnace_uses_the_furnace_endpoint() {
        let fx = Fixture::new();
        fx.sim.set_item("iron_ore", 3);
        fx.jobs.request(ContainerKind::Furnace, "smelt ore");
        fx.llm.push_container_plan(ops(vec![(
            "smelt",
            json!({"input": "iron_ore", "output": "iron_ingot", "count": 3}),
        )]));

        let mode = ContainerMode::furnace(
            Arc::clone(&fx.sim) as Arc<dyn GameContext>,
            Arc::clone(&fx.llm) as Arc<dyn LlmClient>,
            Arc::clone(&fx.jobs),
            &ContainerConfig::default(),
        );
        mode.activate("requested").await.unwrap();
        mode.execute().await.unwrap();
        mode.execute().await.unwrap();

        assert_eq!(fx.llm.container_requests()[0].kind, ContainerKind::Furnace);
        assert_eq!(fx.sim.item_count("iron_ingot"), 3);
        assert_eq!(fx.sim.item_count("iron_ore"), 0);
    }

    #[tokio::test]
    async fn test_session_without_job_uses_default_purpose() {
        let fx = Fixture::new();
        let mode = fx.chest_mode();
        mode.activate("stale transition").await.unwrap();
        mode.execute().await.unwrap();

        let requests = fx.llm.container_requests();
        assert_eq!(requests[0].purpose, "tidy up inventory");
    }

    #[test]
    fn test_bound_comes_from_config() {
        let fx = Fixture::new();
        let mode = fx.chest_mode();
        assert_eq!(mode.max_duration(), Some(Duration::from_secs(60)));
    }
}
