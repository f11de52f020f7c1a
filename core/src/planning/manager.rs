//! Goal planning manager
//!
//! Owns the goal/plan registry, the current goal/plan/task pointers and the
//! task history. All mutation goes through a single `RwLock`; the lock is
//! never held across an await, so LLM calls and file writes happen with the
//! registry released.
//!
//! Plan generation is deliberately soft: an LLM failure or a draft with no
//! usable tasks yields `None` and the agent simply tries again on a later
//! tick. Hard errors are reserved for caller mistakes such as targeting a
//! goal that does not exist.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::PlanningConfig;
use crate::error::{AgentError, Result};
use crate::game::{GameContext, GameSnapshot};
use crate::llm::{LlmClient, PlanDraft, PlanRequest, TaskDraft};
use crate::memory::ExperienceLog;

use super::goal::Goal;
use super::history::{TaskEvent, TaskEventKind, TaskHistory};
use super::plan::{Plan, PlanStatus};
use super::store::{PlanningState, PlanningStore};
use super::task::{Task, TaskRef};
use super::tracker::TaskTracker;

/// How many recent experiences get folded into a plan prompt
const PLAN_PROMPT_EXPERIENCES: usize = 5;

type GoalCallback = Box<dyn Fn(&Goal) -> anyhow::Result<()> + Send + Sync>;

struct PlannerInner {
    goals: HashMap<String, Goal>,
    plans: HashMap<String, Plan>,
    current_goal_id: Option<String>,
    current_plan_id: Option<String>,
    current_task_id: Option<String>,
    history: TaskHistory,
}

pub struct GoalPlanner {
    llm: Arc<dyn LlmClient>,
    memory: Arc<ExperienceLog>,
    config: PlanningConfig,
    inner: RwLock<PlannerInner>,
    on_goal_completed: Mutex<Option<GoalCallback>>,
}

impl GoalPlanner {
    pub fn new(llm: Arc<dyn LlmClient>, memory: Arc<ExperienceLog>, config: PlanningConfig) -> Self {
        let history = TaskHistory::new(config.history_limit);
        Self {
            llm,
            memory,
            config,
            inner: RwLock::new(PlannerInner {
                goals: HashMap::new(),
                plans: HashMap::new(),
                current_goal_id: None,
                current_plan_id: None,
                current_task_id: None,
                history,
            }),
            on_goal_completed: Mutex::new(None),
        }
    }

    /// Replace registry and history with previously persisted state.
    /// Pointers referencing unknown goals or plans are cleared.
    pub fn restore(&self, state: PlanningState, events: Vec<TaskEvent>) {
        let mut inner = self.inner.write();
        inner.goals = state.goals.into_iter().map(|g| (g.id.clone(), g)).collect();
        inner.plans = state.plans.into_iter().map(|p| (p.id.clone(), p)).collect();
        inner.current_goal_id = state
            .current_goal_id
            .filter(|id| inner.goals.contains_key(id));
        inner.current_plan_id = state
            .current_plan_id
            .filter(|id| inner.plans.contains_key(id));
        inner.current_task_id = match (&inner.current_plan_id, state.current_task_id) {
            (Some(plan_id), Some(task_id)) => inner
                .plans
                .get(plan_id)
                .and_then(|p| p.task(&task_id))
                .map(|t| t.id.clone()),
            _ => None,
        };
        inner.history = TaskHistory::from_events(events, self.config.history_limit);
        info!(
            goals = inner.goals.len(),
            plans = inner.plans.len(),
            current_goal = inner.current_goal_id.is_some(),
            "planning state restored"
        );
    }

    /// Serializable copy of the registry, ordered by creation time
    pub fn snapshot_state(&self) -> PlanningState {
        let inner = self.inner.read();
        let mut goals: Vec<Goal> = inner.goals.values().cloned().collect();
        goals.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let mut plans: Vec<Plan> = inner.plans.values().cloned().collect();
        plans.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        PlanningState {
            current_goal_id: inner.current_goal_id.clone(),
            current_plan_id: inner.current_plan_id.clone(),
            current_task_id: inner.current_task_id.clone(),
            goals,
            plans,
        }
    }

    pub fn history_events(&self) -> Vec<TaskEvent> {
        self.inner.read().history.events().to_vec()
    }

    /// Hook fired after a goal completes. Called with the registry lock
    /// released; errors are logged, never propagated into the planner.
    pub fn set_on_goal_completed<F>(&self, callback: F)
    where
        F: Fn(&Goal) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        *self.on_goal_completed.lock() = Some(Box::new(callback));
    }

    // ========================================================================
    // Goals
    // ========================================================================

    /// Register a new goal; it becomes current if no goal is active
    pub fn create_goal(&self, description: impl Into<String>) -> Goal {
        let goal = Goal::new(description);
        let mut inner = self.inner.write();
        if inner.current_goal_id.is_none() {
            inner.current_goal_id = Some(goal.id.clone());
            info!(goal = %goal.description, "goal set as current");
        } else {
            info!(goal = %goal.description, "goal queued");
        }
        inner.goals.insert(goal.id.clone(), goal.clone());
        goal
    }

    pub fn current_goal(&self) -> Option<Goal> {
        let inner = self.inner.read();
        let id = inner.current_goal_id.as_ref()?;
        inner.goals.get(id).cloned()
    }

    pub fn current_plan(&self) -> Option<Plan> {
        let inner = self.inner.read();
        let id = inner.current_plan_id.as_ref()?;
        inner.plans.get(id).cloned()
    }

    pub fn goal(&self, id: &str) -> Option<Goal> {
        self.inner.read().goals.get(id).cloned()
    }

    pub fn plan(&self, id: &str) -> Option<Plan> {
        self.inner.read().plans.get(id).cloned()
    }

    // ========================================================================
    // Plan instantiation
    // ========================================================================

    /// Turn an LLM plan draft into a stored plan under `goal_id`.
    ///
    /// Each task entry is parsed on its own; malformed entries are skipped
    /// with a warning. Positional dependencies are rewritten to task ids
    /// against the draft ordering, so skips cannot silently shift them.
    /// A draft yielding zero usable tasks is rejected.
    pub fn create_plan_from_draft(&self, draft: &PlanDraft, goal_id: &str) -> Result<Plan> {
        let mut tasks: Vec<Task> = Vec::new();
        let mut draft_index_to_id: HashMap<usize, String> = HashMap::new();

        for (index, raw) in draft.tasks.iter().enumerate() {
            let task_draft: TaskDraft = match serde_json::from_value(raw.clone()) {
                Ok(d) => d,
                Err(e) => {
                    warn!(index, error = %e, "skipping malformed task entry");
                    continue;
                }
            };
            let tracker: TaskTracker = match serde_json::from_value(task_draft.tracker.clone()) {
                Ok(t) => t,
                Err(e) => {
                    warn!(index, task = %task_draft.title, error = %e, "skipping task with unusable tracker");
                    continue;
                }
            };
            let task = Task::new(
                task_draft.title,
                task_draft.description,
                tracker,
                task_draft.dependencies,
            );
            draft_index_to_id.insert(index, task.id.clone());
            tasks.push(task);
        }

        for task in tasks.iter_mut() {
            let deps = std::mem::take(&mut task.dependencies);
            let mut kept = Vec::with_capacity(deps.len());
            for dep in deps {
                let resolved = match &dep {
                    TaskRef::Index(i) => draft_index_to_id.get(i).cloned(),
                    TaskRef::Id(id) => draft_index_to_id
                        .values()
                        .find(|known| known.as_str() == id.as_str())
                        .cloned(),
                };
                match resolved {
                    Some(id) if id == task.id => {
                        warn!(task = %task.title, "dropping self-referential dependency");
                    }
                    Some(id) => kept.push(TaskRef::Id(id)),
                    None => {
                        warn!(task = %task.title, ?dep, "dropping dependency on unknown task");
                    }
                }
            }
            task.dependencies = kept;
        }

        if tasks.is_empty() {
            return Err(AgentError::PlanRejected {
                reason: "draft contained no usable tasks".to_string(),
            });
        }

        let mut inner = self.inner.write();
        if !inner.goals.contains_key(goal_id) {
            return Err(AgentError::GoalNotFound(goal_id.to_string()));
        }

        let plan = Plan::new(goal_id, &draft.title, &draft.description, tasks);
        if let Some(goal) = inner.goals.get_mut(goal_id) {
            goal.add_plan(plan.id.clone());
        }
        inner.plans.insert(plan.id.clone(), plan.clone());
        if inner.current_goal_id.as_deref() == Some(goal_id) && inner.current_plan_id.is_none() {
            inner.current_plan_id = Some(plan.id.clone());
            inner.current_task_id = None;
        }
        info!(plan = %plan.title, tasks = plan.tasks.len(), "plan created");
        Ok(plan)
    }

    // ========================================================================
    // Task selection and completion
    // ========================================================================

    /// The task the agent should work on right now.
    ///
    /// Returns the cached current task while it is live; otherwise advances
    /// to the next startable task, activates it and records the start.
    pub fn current_task(&self) -> Option<Task> {
        let mut inner = self.inner.write();
        let plan_id = inner.current_plan_id.clone()?;

        if let Some(task_id) = inner.current_task_id.clone() {
            if let Some(task) = inner.plans.get(&plan_id).and_then(|p| p.task(&task_id)) {
                if !task.is_terminal() {
                    return Some(task.clone());
                }
            }
            inner.current_task_id = None;
        }

        let (goal_id, started) = {
            let plan = inner.plans.get_mut(&plan_id)?;
            let next_id = plan.next_startable().map(|t| t.id.clone())?;
            let task = plan.task_mut(&next_id)?;
            task.activate();
            let started = task.clone();
            (plan.goal_id.clone(), started)
        };
        inner.current_task_id = Some(started.id.clone());
        inner.history.record(
            Some(goal_id),
            Some(plan_id),
            started.id.clone(),
            started.title.clone(),
            TaskEventKind::Started,
            None,
        );
        info!(task = %started.title, "task started");
        Some(started)
    }

    /// Read the current task without advancing the pointer
    pub fn peek_current_task(&self) -> Option<Task> {
        let inner = self.inner.read();
        let plan_id = inner.current_plan_id.as_ref()?;
        let task_id = inner.current_task_id.as_ref()?;
        inner.plans.get(plan_id)?.task(task_id).cloned()
    }

    /// Run completion checks for every live task in the current plan.
    ///
    /// Completes tasks whose trackers are satisfied, closes the plan once all
    /// tasks are terminal, and completes the goal once every one of its plans
    /// is closed with at least one of them completed. Returns the completed
    /// goal, if any; the completion hook has already fired by then.
    pub fn evaluate_tasks(&self, snapshot: &GameSnapshot) -> Option<Goal> {
        let completed_goal = self.evaluate_tasks_locked(snapshot);
        if let Some(goal) = &completed_goal {
            info!(goal = %goal.description, "goal completed");
            let callback = self.on_goal_completed.lock();
            if let Some(callback) = callback.as_ref() {
                if let Err(e) = callback(goal) {
                    error!(goal = %goal.description, error = %e, "goal completion hook failed");
                }
            }
        }
        completed_goal
    }

    fn evaluate_tasks_locked(&self, snapshot: &GameSnapshot) -> Option<Goal> {
        let mut inner = self.inner.write();
        let plan_id = inner.current_plan_id.clone()?;

        let mut newly_completed: Vec<(String, String)> = Vec::new();
        let plan_done;
        let goal_id;
        match inner.plans.get_mut(&plan_id) {
            Some(plan) => {
                for task in plan.tasks.iter_mut() {
                    if task.is_terminal() {
                        continue;
                    }
                    if task.check_completion(snapshot) {
                        newly_completed.push((task.id.clone(), task.title.clone()));
                    }
                }
                plan_done = plan.status == PlanStatus::Active && plan.is_completed();
                if plan_done {
                    plan.mark_completed();
                }
                goal_id = plan.goal_id.clone();
            }
            None => {
                warn!(plan_id = %plan_id, "current plan missing from registry, clearing pointer");
                inner.current_plan_id = None;
                inner.current_task_id = None;
                return None;
            }
        }

        for (task_id, title) in &newly_completed {
            info!(task = %title, "task completed");
            inner.history.record(
                Some(goal_id.clone()),
                Some(plan_id.clone()),
                task_id.clone(),
                title.clone(),
                TaskEventKind::Completed,
                None,
            );
        }

        if let Some(task_id) = inner.current_task_id.clone() {
            let gone = inner
                .plans
                .get(&plan_id)
                .and_then(|p| p.task(&task_id))
                .map(|t| t.is_terminal())
                .unwrap_or(true);
            if gone {
                inner.current_task_id = None;
            }
        }

        if !plan_done {
            return None;
        }

        info!(plan_id = %plan_id, "plan finished");
        inner.current_plan_id = None;
        inner.current_task_id = None;

        let goal_finished = match inner.goals.get(&goal_id) {
            Some(goal) => !goal.is_terminal() && all_plans_settled(&goal.plan_ids, &inner.plans),
            None => false,
        };
        if !goal_finished {
            return None;
        }

        if inner.current_goal_id.as_deref() == Some(goal_id.as_str()) {
            inner.current_goal_id = None;
        }
        let goal = inner.goals.get_mut(&goal_id)?;
        goal.mark_completed();
        Some(goal.clone())
    }

    /// Abandon the current task; it will not count as a failure
    pub fn skip_current_task(&self, reason: &str) -> bool {
        self.close_current_task(reason, TaskEventKind::Abandoned)
    }

    /// Fail the current task; the reason feeds later replan prompts
    pub fn fail_current_task(&self, reason: &str) -> bool {
        self.close_current_task(reason, TaskEventKind::Failed)
    }

    fn close_current_task(&self, reason: &str, kind: TaskEventKind) -> bool {
        let mut inner = self.inner.write();
        let Some(plan_id) = inner.current_plan_id.clone() else {
            return false;
        };
        let Some(task_id) = inner.current_task_id.clone() else {
            return false;
        };

        let (goal_id, title) = {
            let Some(plan) = inner.plans.get_mut(&plan_id) else {
                return false;
            };
            let goal_id = plan.goal_id.clone();
            let Some(task) = plan.task_mut(&task_id) else {
                return false;
            };
            if task.is_terminal() {
                return false;
            }
            match kind {
                TaskEventKind::Failed => task.fail(reason),
                _ => task.abandon(reason),
            }
            (goal_id, task.title.clone())
        };

        inner.current_task_id = None;
        inner.history.record(
            Some(goal_id),
            Some(plan_id),
            task_id,
            title.clone(),
            kind,
            Some(reason.to_string()),
        );
        warn!(task = %title, reason, ?kind, "task closed");
        true
    }

    /// Attach an LLM progress assessment to the current task
    pub fn record_assessment(&self, assessment: &str) -> bool {
        let mut inner = self.inner.write();
        let Some(plan_id) = inner.current_plan_id.clone() else {
            return false;
        };
        let Some(task_id) = inner.current_task_id.clone() else {
            return false;
        };

        let (goal_id, title) = {
            let Some(plan) = inner.plans.get_mut(&plan_id) else {
                return false;
            };
            let goal_id = plan.goal_id.clone();
            let Some(task) = plan.task_mut(&task_id) else {
                return false;
            };
            task.add_evaluation(assessment);
            (goal_id, task.title.clone())
        };

        inner.history.record(
            Some(goal_id),
            Some(plan_id),
            task_id,
            title,
            TaskEventKind::Assessed,
            Some(assessment.to_string()),
        );
        true
    }

    // ========================================================================
    // Plan generation
    // ========================================================================

    /// Ask the LLM for a plan toward the current goal.
    ///
    /// Returns `None` when there is no current goal, the LLM yields nothing,
    /// or the draft is rejected. The caller retries on a later tick.
    pub async fn generate_plan_for_current_goal(&self, snapshot: &GameSnapshot) -> Option<Plan> {
        let (goal_id, goal_text, attempt_history) = {
            let inner = self.inner.read();
            let goal_id = inner.current_goal_id.clone()?;
            let goal = inner.goals.get(&goal_id)?;
            let attempts = inner.history.failure_summary(&goal_id);
            (goal_id, goal.description.clone(), attempts)
        };

        let request = PlanRequest::from_snapshot(
            goal_id.clone(),
            goal_text,
            snapshot,
            self.memory.recent(PLAN_PROMPT_EXPERIENCES),
            attempt_history,
        );
        debug!(goal_id = %goal_id, "requesting plan");
        let draft = self.llm.request_plan(&request).await?;

        match self.create_plan_from_draft(&draft, &goal_id) {
            Ok(plan) => Some(plan),
            Err(e) => {
                warn!(error = %e, "generated plan rejected");
                None
            }
        }
    }

    /// Set the current plan aside and generate a replacement.
    ///
    /// The superseded plan is marked abandoned with its task statuses left
    /// untouched; its failures stay visible to the new plan's prompt through
    /// the attempt history.
    pub async fn replan_for_current_goal(&self, snapshot: &GameSnapshot, reason: &str) -> Option<Plan> {
        {
            let mut inner = self.inner.write();
            inner.current_goal_id.as_ref()?;
            if let Some(plan_id) = inner.current_plan_id.take() {
                inner.current_task_id = None;
                if let Some(plan) = inner.plans.get_mut(&plan_id) {
                    plan.mark_abandoned();
                    warn!(plan = %plan.title, reason, "plan set aside for replan");
                }
            }
        }
        self.memory.record("plan", format!("replanned: {reason}"));
        self.generate_plan_for_current_goal(snapshot).await
    }

    // ========================================================================
    // Background loops
    // ========================================================================

    /// Start the completion-check tick and the autosave tick.
    ///
    /// Both stop on cancellation; the autosave task writes one final state
    /// snapshot on its way out. Save failures are logged and retried on the
    /// next interval, never propagated.
    pub fn spawn_background(
        self: &Arc<Self>,
        game: Arc<dyn GameContext>,
        store: Arc<PlanningStore>,
        shutdown: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let check = {
            let planner = Arc::clone(self);
            let shutdown = shutdown.clone();
            let interval = self.config.check_interval();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            info!("completion check loop stopped");
                            break;
                        }
                        _ = ticker.tick() => {
                            match game.snapshot().await {
                                Ok(snapshot) => {
                                    planner.evaluate_tasks(&snapshot);
                                }
                                Err(e) => {
                                    warn!(error = %e, "completion check skipped, snapshot unavailable");
                                }
                            }
                        }
                    }
                }
            })
        };

        let autosave = {
            let planner = Arc::clone(self);
            let interval = self.config.autosave_interval();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            planner.save_to(&store).await;
                            info!("autosave loop stopped");
                            break;
                        }
                        _ = ticker.tick() => {
                            planner.save_to(&store).await;
                        }
                    }
                }
            })
        };

        vec![check, autosave]
    }

    /// Persist state, history and experiences; failures are logged only
    pub async fn save_to(&self, store: &PlanningStore) {
        let state = self.snapshot_state();
        if let Err(e) = store.save_state(&state).await {
            warn!(error = %e, "planning state save failed, will retry");
            return;
        }
        let events = self.history_events();
        if let Err(e) = store.save_history(&events).await {
            warn!(error = %e, "task history save failed, will retry");
        }
        self.memory.flush().await;
    }
}

/// Every plan of the goal is closed, and at least one of them completed.
/// Plans that were set aside by a replan do not block completion.
fn all_plans_settled(plan_ids: &[String], plans: &HashMap<String, Plan>) -> bool {
    let mut any_completed = false;
    for id in plan_ids {
        match plans.get(id).map(|p| p.status) {
            Some(PlanStatus::Completed) => any_completed = true,
            Some(PlanStatus::Abandoned) => {}
            Some(PlanStatus::Active) | None => return false,
        }
    }
    any_completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::snapshot::ItemStack;
    use crate::llm::ScriptedLlm;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn planner_with(llm: Arc<ScriptedLlm>) -> GoalPlanner {
        GoalPlanner::new(
            llm,
            Arc::new(ExperienceLog::in_memory(20)),
            PlanningConfig::default(),
        )
    }

    fn wood_draft() -> PlanDraft {
        PlanDraft {
            title: "get wood".to_string(),
            description: "chop some trees".to_string(),
            tasks: vec![
                json!({
                    "title": "gather logs",
                    "tracker": {"type": "inventory", "item": "oak_log", "count": 2}
                }),
                json!({
                    "title": "craft planks",
                    "tracker": {"type": "inventory", "item": "oak_planks", "count": 4},
                    "dependencies": [0]
                }),
            ],
        }
    }

    fn snap_with(items: &[(&str, u32)]) -> GameSnapshot {
        let mut snap = GameSnapshot::empty(1);
        for (item, count) in items {
            snap.inventory.push(ItemStack {
                item: item.to_string(),
                count: *count,
            });
        }
        snap
    }

    #[test]
    fn test_first_goal_becomes_current() {
        let planner = planner_with(Arc::new(ScriptedLlm::new()));
        let first = planner.create_goal("get wood");
        let second = planner.create_goal("get stone");

        assert_eq!(planner.current_goal().map(|g| g.id), Some(first.id));
        assert!(planner.goal(&second.id).is_some());
    }

    #[test]
    fn test_draft_instantiation_skips_bad_tasks_and_remaps_deps() {
        let planner = planner_with(Arc::new(ScriptedLlm::new()));
        let goal = planner.create_goal("get wood");

        let draft = PlanDraft {
            title: "get wood".to_string(),
            description: String::new(),
            tasks: vec![
                json!({"title": "broken", "tracker": {"type": "no_such_tracker"}}),
                json!({
                    "title": "gather logs",
                    "tracker": {"type": "inventory", "item": "oak_log", "count": 2}
                }),
                json!({
                    "title": "craft planks",
                    "tracker": {"type": "inventory", "item": "oak_planks", "count": 4},
                    "dependencies": [1]
                }),
            ],
        };

        let plan = planner.create_plan_from_draft(&draft, &goal.id).unwrap();
        assert_eq!(plan.tasks.len(), 2);

        // The positional dependency survived the skip as an id reference
        let logs_id = plan.tasks[0].id.clone();
        assert_eq!(plan.tasks[1].dependencies, vec![TaskRef::Id(logs_id)]);

        // Plan became current and is linked to the goal
        assert_eq!(planner.current_plan().map(|p| p.id), Some(plan.id.clone()));
        assert_eq!(planner.goal(&goal.id).unwrap().plan_ids, vec![plan.id]);
    }

    #[test]
    fn test_empty_draft_is_rejected() {
        let planner = planner_with(Arc::new(ScriptedLlm::new()));
        let goal = planner.create_goal("get wood");

        let draft = PlanDraft {
            title: "nothing".to_string(),
            description: String::new(),
            tasks: vec![json!({"title": "broken", "tracker": 7})],
        };
        let err = planner.create_plan_from_draft(&draft, &goal.id).unwrap_err();
        assert!(matches!(err, AgentError::PlanRejected { .. }));
    }

    #[test]
    fn test_unknown_goal_is_an_error() {
        let planner = planner_with(Arc::new(ScriptedLlm::new()));
        let err = planner
            .create_plan_from_draft(&wood_draft(), "nope")
            .unwrap_err();
        assert!(matches!(err, AgentError::GoalNotFound(_)));
    }

    #[test]
    fn test_current_task_advances_in_dependency_order() {
        let planner = planner_with(Arc::new(ScriptedLlm::new()));
        let goal = planner.create_goal("get wood");
        planner.create_plan_from_draft(&wood_draft(), &goal.id).unwrap();

        let task = planner.current_task().unwrap();
        assert_eq!(task.title, "gather logs");
        // Stable across repeated calls
        assert_eq!(planner.current_task().unwrap().id, task.id);

        // Second task is blocked until the first completes
        planner.evaluate_tasks(&snap_with(&[("oak_log", 2)]));
        let task = planner.current_task().unwrap();
        assert_eq!(task.title, "craft planks");
    }

    #[test]
    fn test_plan_and_goal_complete_with_callback() {
        let planner = planner_with(Arc::new(ScriptedLlm::new()));
        let goal = planner.create_goal("get wood");
        planner.create_plan_from_draft(&wood_draft(), &goal.id).unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        planner.set_on_goal_completed(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(planner
            .evaluate_tasks(&snap_with(&[("oak_log", 2)]))
            .is_none());

        let completed = planner
            .evaluate_tasks(&snap_with(&[("oak_log", 2), ("oak_planks", 4)]))
            .unwrap();
        assert_eq!(completed.id, goal.id);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // Goal is terminal; pointers cleared; nothing re-fires
        assert!(planner.current_goal().is_none());
        assert!(planner.current_task().is_none());
        assert!(planner
            .evaluate_tasks(&snap_with(&[("oak_log", 2), ("oak_planks", 4)]))
            .is_none());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_skip_and_fail_close_the_current_task() {
        let planner = planner_with(Arc::new(ScriptedLlm::new()));
        let goal = planner.create_goal("get wood");
        planner.create_plan_from_draft(&wood_draft(), &goal.id).unwrap();

        let first = planner.current_task().unwrap();
        assert!(planner.fail_current_task("stuck in a hole"));
        assert!(!planner.fail_current_task("already closed"));

        let events = planner.history_events();
        let failure = events
            .iter()
            .find(|e| e.kind == TaskEventKind::Failed)
            .unwrap();
        assert_eq!(failure.task_id, first.id);
        assert_eq!(failure.detail.as_deref(), Some("stuck in a hole"));

        // The dependent task stays blocked: its dependency will never complete
        assert!(planner.current_task().is_none());
    }

    #[tokio::test]
    async fn test_generate_plan_uses_llm_and_failure_history() {
        let llm = Arc::new(ScriptedLlm::new());
        llm.push_plan(wood_draft());
        let planner = planner_with(Arc::clone(&llm));
        let goal = planner.create_goal("get wood");

        let plan = planner
            .generate_plan_for_current_goal(&snap_with(&[]))
            .await
            .unwrap();
        assert_eq!(plan.goal_id, goal.id);

        let requests = llm.plan_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].goal, "get wood");
        assert!(requests[0].attempt_history.is_none());
    }

    #[tokio::test]
    async fn test_generate_plan_without_llm_response_is_none() {
        let planner = planner_with(Arc::new(ScriptedLlm::new()));
        planner.create_goal("get wood");
        assert!(planner
            .generate_plan_for_current_goal(&snap_with(&[]))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_replan_abandons_plan_and_feeds_failures_forward() {
        let llm = Arc::new(ScriptedLlm::new());
        let planner = planner_with(Arc::clone(&llm));
        let goal = planner.create_goal("get wood");
        let draft = PlanDraft {
            title: "get wood".to_string(),
            description: String::new(),
            tasks: vec![
                json!({
                    "title": "gather logs",
                    "tracker": {"type": "inventory", "item": "oak_log", "count": 2}
                }),
                json!({
                    "title": "scavenge planks",
                    "tracker": {"type": "inventory", "item": "oak_planks", "count": 4}
                }),
            ],
        };
        let first_plan = planner.create_plan_from_draft(&draft, &goal.id).unwrap();

        planner.current_task();
        planner.fail_current_task("no trees nearby");
        planner.current_task();
        planner.fail_current_task("nothing to scavenge");

        llm.push_plan(PlanDraft {
            title: "get wood elsewhere".to_string(),
            description: String::new(),
            tasks: vec![json!({
                "title": "return to camp",
                "tracker": {"type": "location", "x": 0.0, "y": 64.0, "z": 0.0, "radius": 4.0}
            })],
        });

        let replacement = planner
            .replan_for_current_goal(&snap_with(&[]), "plan went nowhere")
            .await
            .unwrap();
        assert_ne!(replacement.id, first_plan.id);
        assert_eq!(
            planner.plan(&first_plan.id).unwrap().status,
            PlanStatus::Abandoned
        );
        assert_eq!(planner.current_plan().map(|p| p.id), Some(replacement.id));

        // The prompt carried both earlier failures
        let request = &llm.plan_requests()[0];
        let attempts = request.attempt_history.as_deref().unwrap();
        assert!(attempts.contains("no trees nearby"));
        assert!(attempts.contains("nothing to scavenge"));

        // Completing only the replacement completes the goal
        let completed = planner.evaluate_tasks(&GameSnapshot::empty(2)).unwrap();
        assert_eq!(completed.id, goal.id);
    }

    #[test]
    fn test_assessment_lands_on_task_and_history() {
        let planner = planner_with(Arc::new(ScriptedLlm::new()));
        let goal = planner.create_goal("get wood");
        planner.create_plan_from_draft(&wood_draft(), &goal.id).unwrap();

        let task = planner.current_task().unwrap();
        assert!(planner.record_assessment("halfway there"));

        let stored = planner.peek_current_task().unwrap();
        assert_eq!(stored.id, task.id);
        assert_eq!(stored.evaluations.len(), 1);
        assert_eq!(stored.evaluations[0].assessment, "halfway there");
        assert!(planner
            .history_events()
            .iter()
            .any(|e| e.kind == TaskEventKind::Assessed));
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let planner = planner_with(Arc::new(ScriptedLlm::new()));
        let goal = planner.create_goal("get wood");
        planner.create_plan_from_draft(&wood_draft(), &goal.id).unwrap();
        planner.current_task();

        let state = planner.snapshot_state();
        let events = planner.history_events();

        let restored = planner_with(Arc::new(ScriptedLlm::new()));
        restored.restore(state, events);

        assert_eq!(restored.current_goal().map(|g| g.id), Some(goal.id));
        let task = restored.peek_current_task().unwrap();
        assert_eq!(task.title, "gather logs");
        assert_eq!(restored.history_events().len(), 1);
    }

    #[test]
    fn test_restore_clears_dangling_pointers() {
        let planner = planner_with(Arc::new(ScriptedLlm::new()));
        let state = PlanningState {
            current_goal_id: Some("ghost-goal".to_string()),
            current_plan_id: Some("ghost-plan".to_string()),
            current_task_id: Some("ghost-task".to_string()),
            goals: Vec::new(),
            plans: Vec::new(),
        };
        planner.restore(state, Vec::new());

        assert!(planner.current_goal().is_none());
        assert!(planner.current_plan().is_none());
        assert!(planner.peek_current_task().is_none());
    }

    #[tokio::test]
    async fn test_background_loops_stop_on_cancel() {
        let planner = Arc::new(planner_with(Arc::new(ScriptedLlm::new())));
        let game: Arc<dyn GameContext> = Arc::new(crate::game::SimGame::new());
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PlanningStore::new(
            dir.path().join("state.json"),
            dir.path().join("history.json"),
        ));

        let shutdown = CancellationToken::new();
        let handles = planner.spawn_background(game, Arc::clone(&store), shutdown.clone());

        shutdown.cancel();
        for handle in handles {
            handle.await.unwrap();
        }

        // Final save landed
        assert!(dir.path().join("state.json").exists());
    }
}
