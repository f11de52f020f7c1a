//! Combat mode: reflex melee autopilot
//!
//! No LLM in the loop. Acquires the nearest hostile, closes distance and
//! attacks until the area is clear or health drops below the retreat
//! threshold, then forces the return to the baseline. The tracked target
//! sticks until it dies or leaves the snapshot, so the bot does not flip
//! between equidistant hostiles.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::CombatConfig;
use crate::error::Result;
use crate::game::{EntityInfo, GameContext, GameSnapshot};

use super::{Mode, ModeKind, TransitionRequest};

/// Melee range; farther targets are approached first
const MELEE_REACH: f64 = 3.0;

pub struct CombatMode {
    game: Arc<dyn GameContext>,
    combat: CombatConfig,
    target: Mutex<Option<u64>>,
}

impl CombatMode {
    pub fn new(game: Arc<dyn GameContext>, combat: CombatConfig) -> Self {
        Self {
            game,
            combat,
            target: Mutex::new(None),
        }
    }

    /// Current target if still hostile and present, else the nearest hostile
    fn acquire_target(&self, snapshot: &GameSnapshot) -> Option<EntityInfo> {
        let mut slot = self.target.lock();
        if let Some(id) = *slot {
            if let Some(entity) = snapshot.entities.iter().find(|e| e.id == id && e.hostile) {
                return Some(entity.clone());
            }
            *slot = None;
        }
        let next = snapshot.nearest_hostile().cloned();
        *slot = next.as_ref().map(|e| e.id);
        next
    }
}

#[async_trait::async_trait]
impl Mode for CombatMode {
    fn kind(&self) -> ModeKind {
        ModeKind::Combat
    }

    fn observes_game_events(&self) -> bool {
        true
    }

    async fn activate(&self, reason: &str) -> Result<()> {
        debug!(reason, "combat engaged");
        *self.target.lock() = None;
        Ok(())
    }

    async fn deactivate(&self) -> Result<()> {
        *self.target.lock() = None;
        Ok(())
    }

    async fn execute(&self) -> Result<()> {
        let snapshot = self.game.snapshot().await?;
        let Some(target) = self.acquire_target(&snapshot) else {
            debug!("no hostile in sight");
            return Ok(());
        };

        let distance = snapshot.player.position.distance(&target.position);
        if distance > MELEE_REACH {
            let outcome = self
                .game
                .execute(
                    "move_to",
                    json!({
                        "x": target.position.x,
                        "y": target.position.y,
                        "z": target.position.z,
                    }),
                )
                .await?;
            debug!(target = %target.name, distance, message = %outcome.message, "closing in");
        } else {
            let outcome = self
                .game
                .execute("attack", json!({"entity_id": target.id}))
                .await?;
            if outcome.success {
                debug!(target = %target.name, message = %outcome.message, "struck");
            } else {
                warn!(target = %target.name, message = %outcome.message, "attack failed");
            }
        }
        Ok(())
    }

    async fn check_transitions(&self, snapshot: &GameSnapshot) -> Vec<TransitionRequest> {
        if snapshot.hostiles_within(self.combat.engage_radius) == 0 {
            return vec![TransitionRequest::forced(ModeKind::Main, "area clear")];
        }
        if snapshot.player.health <= self.combat.retreat_health {
            return vec![TransitionRequest::forced(
                ModeKind::Main,
                "health below retreat threshold",
            )];
        }
        Vec::new()
    }

    async fn on_entities_updated(&self, snapshot: &GameSnapshot) -> Result<()> {
        self.acquire_target(snapshot);
        Ok(())
    }
}
