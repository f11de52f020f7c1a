//! Orchestration core for an autonomous game agent
//!
//! Everything here is game-transport agnostic: the world arrives through the
//! [`game::GameContext`] trait, decisions come back through [`llm::LlmClient`],
//! and the crate supplies the machinery in between: the mode state machine,
//! the goal planner with pluggable completion trackers, the decision loop and
//! its persistence.

pub mod agent;
pub mod config;
pub mod error;
pub mod game;
pub mod interrupt;
pub mod llm;
pub mod memory;
pub mod modes;
pub mod planning;
pub mod strategy;

// Re-exports for convenience
pub use agent::{Agent, AgentStatus};
pub use config::BotConfig;
pub use error::{AgentError, Result};
