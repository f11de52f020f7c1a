//! Scripted LLM client
//!
//! Serves queued canned responses in order and records every request it
//! receives. Backs the offline demo runner and the scenario tests; an empty
//! queue behaves like a failed call and yields `None`.

use std::collections::VecDeque;

use parking_lot::Mutex;

use super::types::{
    ContainerPlan, ContainerRequest, MainActionDecision, MainActionRequest, PlanDraft,
    PlanRequest, TaskAssessmentRequest,
};
use super::LlmClient;

#[derive(Default)]
pub struct ScriptedLlm {
    main_actions: Mutex<VecDeque<MainActionDecision>>,
    plans: Mutex<VecDeque<PlanDraft>>,
    container_plans: Mutex<VecDeque<ContainerPlan>>,
    assessments: Mutex<VecDeque<String>>,
    seen_main_requests: Mutex<Vec<MainActionRequest>>,
    seen_plan_requests: Mutex<Vec<PlanRequest>>,
    seen_container_requests: Mutex<Vec<ContainerRequest>>,
    seen_assessment_requests: Mutex<Vec<TaskAssessmentRequest>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_main_action(&self, decision: MainActionDecision) {
        self.main_actions.lock().push_back(decision);
    }

    pub fn push_plan(&self, plan: PlanDraft) {
        self.plans.lock().push_back(plan);
    }

    pub fn push_container_plan(&self, plan: ContainerPlan) {
        self.container_plans.lock().push_back(plan);
    }

    pub fn push_assessment(&self, text: impl Into<String>) {
        self.assessments.lock().push_back(text.into());
    }

    /// Every main-action request received so far, in order
    pub fn main_requests(&self) -> Vec<MainActionRequest> {
        self.seen_main_requests.lock().clone()
    }

    /// Every plan request received so far, in order
    pub fn plan_requests(&self) -> Vec<PlanRequest> {
        self.seen_plan_requests.lock().clone()
    }

    pub fn container_requests(&self) -> Vec<ContainerRequest> {
        self.seen_container_requests.lock().clone()
    }

    pub fn assessment_requests(&self) -> Vec<TaskAssessmentRequest> {
        self.seen_assessment_requests.lock().clone()
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    async fn request_main_action(&self, req: &MainActionRequest) -> Option<MainActionDecision> {
        self.seen_main_requests.lock().push(req.clone());
        self.main_actions.lock().pop_front()
    }

    async fn request_plan(&self, req: &PlanRequest) -> Option<PlanDraft> {
        self.seen_plan_requests.lock().push(req.clone());
        self.plans.lock().pop_front()
    }

    async fn request_chest_operations(&self, req: &ContainerRequest) -> Option<ContainerPlan> {
        self.seen_container_requests.lock().push(req.clone());
        self.container_plans.lock().pop_front()
    }

    async fn request_furnace_operations(&self, req: &ContainerRequest) -> Option<ContainerPlan> {
        self.seen_container_requests.lock().push(req.clone());
        self.container_plans.lock().pop_front()
    }

    async fn assess_task_progress(&self, req: &TaskAssessmentRequest) -> Option<String> {
        self.seen_assessment_requests.lock().push(req.clone());
        self.assessments.lock().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::snapshot::GameSnapshot;
    use crate::llm::types::ActionRequest;

    #[tokio::test]
    async fn test_serves_in_order_then_none() {
        let llm = ScriptedLlm::new();
        llm.push_main_action(MainActionDecision {
            thinking: None,
            action: ActionRequest {
                name: "collect".to_string(),
                params: serde_json::json!({"item": "oak_log", "count": 1}),
            },
        });

        let snap = GameSnapshot::empty(1);
        let req = MainActionRequest::from_snapshot(None, None, &snap, Vec::new());

        let first = llm.request_main_action(&req).await;
        assert_eq!(first.unwrap().action.name, "collect");

        let second = llm.request_main_action(&req).await;
        assert!(second.is_none());
        assert_eq!(llm.main_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_records_plan_requests() {
        let llm = ScriptedLlm::new();
        let snap = GameSnapshot::empty(1);
        let req = PlanRequest::from_snapshot(
            "g1".to_string(),
            "get wood".to_string(),
            &snap,
            Vec::new(),
            Some("attempt 1 failed".to_string()),
        );

        assert!(llm.request_plan(&req).await.is_none());
        let seen = llm.plan_requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].attempt_history.as_deref(), Some("attempt 1 failed"));
    }
}
