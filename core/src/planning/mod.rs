//! Goal -> Plan -> Task planning hierarchy
//!
//! Goals describe what the agent wants, plans are LLM-generated attempts at
//! a goal, tasks are the trackable steps of a plan. [`GoalPlanner`] owns the
//! registry and the current-pointer bookkeeping; [`PlanningStore`] persists
//! it between runs.

pub mod goal;
pub mod history;
pub mod manager;
pub mod plan;
pub mod store;
pub mod task;
pub mod tracker;

pub use goal::{Goal, GoalStatus};
pub use history::{TaskEvent, TaskEventKind, TaskHistory};
pub use manager::GoalPlanner;
pub use plan::{Plan, PlanStatus};
pub use store::{PlanningState, PlanningStore};
pub use task::{Task, TaskEvaluation, TaskRef, TaskStatus};
pub use tracker::{CompositeOp, TaskTracker, TrackerProgress};
