//! LLM boundary
//!
//! The orchestration core never fails because a model call failed: every
//! request returns `Option`, with `None` standing in for transport errors,
//! rate limits and malformed responses alike. Callers treat `None` as
//! "no decision this time" and carry on.

pub mod http;
pub mod scripted;
pub mod types;

pub use http::HttpLlmClient;
pub use scripted::ScriptedLlm;
pub use types::{
    ActionRequest, ContainerKind, ContainerOp, ContainerPlan, ContainerRequest,
    MainActionDecision, MainActionRequest, PlanDraft, PlanRequest, TaskAssessmentRequest,
    TaskDraft,
};

/// Structured decisions from a language model
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Next action while the main mode drives
    async fn request_main_action(&self, req: &MainActionRequest) -> Option<MainActionDecision>;

    /// A fresh plan toward the current goal
    async fn request_plan(&self, req: &PlanRequest) -> Option<PlanDraft>;

    /// Operations against an open chest
    async fn request_chest_operations(&self, req: &ContainerRequest) -> Option<ContainerPlan>;

    /// Operations against an open furnace
    async fn request_furnace_operations(&self, req: &ContainerRequest) -> Option<ContainerPlan>;

    /// Free-form judgement of task progress, appended to the task's history
    async fn assess_task_progress(&self, req: &TaskAssessmentRequest) -> Option<String>;
}
