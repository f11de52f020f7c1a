//! Behavior modes and the priority-gated state machine
//!
//! Each mode is an independent unit registered with the [`ModeManager`] under
//! its [`ModeKind`]. The manager owns the single active-mode slot, runs
//! deactivate-before-activate on every switch, fans snapshots out to listener
//! modes, and applies mode-proposed transitions through the priority gate.

pub mod combat;
pub mod container;
pub mod main_mode;
pub mod manager;

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::game::GameSnapshot;
use crate::llm::ContainerKind;

pub use combat::CombatMode;
pub use container::ContainerMode;
pub use main_mode::MainMode;
pub use manager::ModeManager;

/// The registered behavior modes, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeKind {
    Main,
    Combat,
    Chest,
    Furnace,
}

impl ModeKind {
    /// Transition-gate priority; higher resists being preempted
    pub fn priority(&self) -> u8 {
        match self {
            ModeKind::Main => 0,
            ModeKind::Combat => 10,
            ModeKind::Chest | ModeKind::Furnace => 50,
        }
    }

    /// Whether entering this mode consumes an LLM decision.
    /// Reflex modes (combat) are exempt from the priority gate.
    pub fn requires_llm_decision(&self) -> bool {
        !matches!(self, ModeKind::Combat)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModeKind::Main => "main",
            ModeKind::Combat => "combat",
            ModeKind::Chest => "chest",
            ModeKind::Furnace => "furnace",
        }
    }
}

impl std::fmt::Display for ModeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A switch proposed by a mode's `check_transitions`
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub target: ModeKind,
    /// Forced requests bypass the priority gate (`set_mode`); returning to
    /// the baseline must always be forced or the gate would trap it
    pub forced: bool,
    pub reason: String,
}

impl TransitionRequest {
    pub fn gated(target: ModeKind, reason: impl Into<String>) -> Self {
        Self {
            target,
            forced: false,
            reason: reason.into(),
        }
    }

    pub fn forced(target: ModeKind, reason: impl Into<String>) -> Self {
        Self {
            target,
            forced: true,
            reason: reason.into(),
        }
    }
}

/// A container session requested by the main mode, picked up by the matching
/// container mode on activation
#[derive(Debug, Clone)]
pub struct ContainerJob {
    pub kind: ContainerKind,
    pub purpose: String,
    pub requested_at: DateTime<Utc>,
}

/// Single-slot handoff between the main mode and the container modes
#[derive(Default)]
pub struct ContainerJobs {
    slot: Mutex<Option<ContainerJob>>,
}

impl ContainerJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a job; an unclaimed previous job is replaced
    pub fn request(&self, kind: ContainerKind, purpose: impl Into<String>) {
        *self.slot.lock() = Some(ContainerJob {
            kind,
            purpose: purpose.into(),
            requested_at: Utc::now(),
        });
    }

    /// Kind of the parked job, if any
    pub fn pending_kind(&self) -> Option<ContainerKind> {
        self.slot.lock().as_ref().map(|j| j.kind)
    }

    /// Claim the parked job if it matches `kind`
    pub fn take_for(&self, kind: ContainerKind) -> Option<ContainerJob> {
        let mut slot = self.slot.lock();
        if slot.as_ref().map(|j| j.kind) == Some(kind) {
            slot.take()
        } else {
            None
        }
    }

    pub fn clear(&self) {
        *self.slot.lock() = None;
    }
}

/// A behavior unit the manager can activate
///
/// Listener hooks default to no-ops; modes opt in by returning true from
/// `observes_game_events`. Errors from any hook are logged at the dispatch
/// boundary and never abort the fan-out.
#[async_trait::async_trait]
pub trait Mode: Send + Sync {
    fn kind(&self) -> ModeKind;

    /// Runtime bound for this mode; the manager forces a return to the
    /// baseline once it elapses
    fn max_duration(&self) -> Option<Duration> {
        None
    }

    fn observes_game_events(&self) -> bool {
        false
    }

    async fn activate(&self, reason: &str) -> Result<()>;

    async fn deactivate(&self) -> Result<()>;

    /// One slice of work; called once per decision-loop tick
    async fn execute(&self) -> Result<()>;

    /// Switches this mode wants, most urgent first
    async fn check_transitions(&self, snapshot: &GameSnapshot) -> Vec<TransitionRequest>;

    async fn on_game_state_updated(&self, _snapshot: &GameSnapshot) -> Result<()> {
        Ok(())
    }

    async fn on_entities_updated(&self, _snapshot: &GameSnapshot) -> Result<()> {
        Ok(())
    }

    async fn on_inventory_updated(&self, _snapshot: &GameSnapshot) -> Result<()> {
        Ok(())
    }

    async fn on_health_updated(&self, _snapshot: &GameSnapshot) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priorities_and_llm_gating() {
        assert!(ModeKind::Combat.priority() > ModeKind::Main.priority());
        assert!(ModeKind::Chest.priority() > ModeKind::Combat.priority());
        assert_eq!(ModeKind::Chest.priority(), ModeKind::Furnace.priority());

        assert!(ModeKind::Main.requires_llm_decision());
        assert!(!ModeKind::Combat.requires_llm_decision());
        assert!(ModeKind::Furnace.requires_llm_decision());
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&ModeKind::Main).unwrap(), "\"main\"");
        assert_eq!(ModeKind::Furnace.to_string(), "furnace");
    }

    #[test]
    fn test_job_slot_claims_by_kind() {
        let jobs = ContainerJobs::new();
        assert!(jobs.pending_kind().is_none());

        jobs.request(ContainerKind::Chest, "store cobblestone");
        assert_eq!(jobs.pending_kind(), Some(ContainerKind::Chest));

        // Wrong kind leaves the job parked
        assert!(jobs.take_for(ContainerKind::Furnace).is_none());
        let job = jobs.take_for(ContainerKind::Chest).unwrap();
        assert_eq!(job.purpose, "store cobblestone");
        assert!(jobs.pending_kind().is_none());
    }
}
