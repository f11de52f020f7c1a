//! Mode registry and transition gate

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::LoopConfig;
use crate::error::{AgentError, Result};
use crate::game::GameSnapshot;

use super::{Mode, ModeKind, TransitionRequest};

struct ManagerState {
    current: Option<ModeKind>,
    activated_at: Option<Instant>,
    last_snapshot: Option<GameSnapshot>,
}

pub struct ModeManager {
    modes: HashMap<ModeKind, Arc<dyn Mode>>,
    listeners: Vec<ModeKind>,
    loop_config: LoopConfig,
    state: RwLock<ManagerState>,
}

impl ModeManager {
    pub fn new(loop_config: LoopConfig) -> Self {
        Self {
            modes: HashMap::new(),
            listeners: Vec::new(),
            loop_config,
            state: RwLock::new(ManagerState {
                current: None,
                activated_at: None,
                last_snapshot: None,
            }),
        }
    }

    /// Register a mode under its kind; listener modes join the fan-out set
    pub fn register(&mut self, mode: Arc<dyn Mode>) {
        let kind = mode.kind();
        if mode.observes_game_events() {
            self.listeners.push(kind);
        }
        if self.modes.insert(kind, mode).is_some() {
            warn!(%kind, "mode registered twice, previous instance replaced");
        }
    }

    pub fn current_mode(&self) -> Option<ModeKind> {
        self.state.read().current
    }

    pub fn current_mode_name(&self) -> String {
        self.current_mode()
            .map(|k| k.name().to_string())
            .unwrap_or_else(|| "none".to_string())
    }

    /// Time spent in the current mode
    pub fn active_since(&self) -> Option<Duration> {
        self.state.read().activated_at.map(|t| t.elapsed())
    }

    /// Sleep hint for the decision loop, by active mode kind
    pub fn poll_interval(&self) -> Duration {
        match self.current_mode() {
            Some(ModeKind::Main) => self.loop_config.main_interval(),
            Some(ModeKind::Combat) => self.loop_config.combat_interval(),
            Some(ModeKind::Chest) | Some(ModeKind::Furnace) | None => {
                self.loop_config.idle_interval()
            }
        }
    }

    /// Gated transition: refused without state change when the target needs
    /// an LLM decision and the active mode outranks it. Switching to the
    /// already-active mode is a no-op success.
    pub async fn try_set_mode(&self, target: ModeKind, reason: &str) -> Result<bool> {
        let blocked = {
            let state = self.state.read();
            match state.current {
                Some(active) if active != target => {
                    target.requires_llm_decision() && active.priority() > target.priority()
                }
                _ => false,
            }
        };
        if blocked {
            debug!(%target, reason, "transition refused by priority gate");
            return Ok(false);
        }
        self.set_mode(target, reason).await?;
        Ok(true)
    }

    /// Unconditional transition: deactivate the old mode, then activate the
    /// new one. Deactivation errors are logged and do not stop the switch.
    pub async fn set_mode(&self, target: ModeKind, reason: &str) -> Result<()> {
        let new_mode = self
            .modes
            .get(&target)
            .ok_or_else(|| AgentError::ModeNotRegistered {
                kind: target.name().to_string(),
            })?;

        let old_kind = self.state.read().current;
        if old_kind == Some(target) {
            return Ok(());
        }

        if let Some(old_kind) = old_kind {
            if let Some(old_mode) = self.modes.get(&old_kind) {
                if let Err(e) = old_mode.deactivate().await {
                    warn!(mode = %old_kind, error = %e, "deactivation failed");
                }
            }
        }

        {
            let mut state = self.state.write();
            state.current = Some(target);
            state.activated_at = Some(Instant::now());
        }

        new_mode.activate(reason).await?;
        info!(
            from = old_kind.map(|k| k.name()).unwrap_or("none"),
            to = target.name(),
            reason,
            "mode switched"
        );
        Ok(())
    }

    /// Apply transitions proposed by the active mode, first success wins.
    /// Expiry of a bounded mode is injected ahead of the mode's own
    /// proposals. Returns whether a switch happened.
    pub async fn check_auto_transitions(&self, snapshot: &GameSnapshot) -> bool {
        let (kind, elapsed) = {
            let state = self.state.read();
            let Some(kind) = state.current else {
                return false;
            };
            (kind, state.activated_at.map(|t| t.elapsed()))
        };
        let Some(mode) = self.modes.get(&kind) else {
            return false;
        };

        let mut requests: Vec<TransitionRequest> = Vec::new();
        if let (Some(max), Some(elapsed)) = (mode.max_duration(), elapsed) {
            if elapsed >= max {
                requests.push(TransitionRequest::forced(
                    ModeKind::Main,
                    format!("{} expired after {}s", kind, elapsed.as_secs()),
                ));
            }
        }
        requests.extend(mode.check_transitions(snapshot).await);

        for request in requests {
            if request.target == kind {
                continue;
            }
            let applied = if request.forced {
                match self.set_mode(request.target, &request.reason).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(target = %request.target, error = %e, "forced transition failed");
                        false
                    }
                }
            } else {
                match self.try_set_mode(request.target, &request.reason).await {
                    Ok(applied) => applied,
                    Err(e) => {
                        warn!(target = %request.target, error = %e, "transition failed");
                        false
                    }
                }
            };
            if applied {
                return true;
            }
        }
        false
    }

    /// Fan the snapshot out to listener modes, with per-slice change hooks
    /// diffed against the previously seen snapshot. Listener errors are
    /// logged; the fan-out continues.
    pub async fn notify_game_state(&self, snapshot: &GameSnapshot) {
        let previous = {
            let mut state = self.state.write();
            state.last_snapshot.replace(snapshot.clone())
        };
        let entities_changed = previous
            .as_ref()
            .map(|p| p.entities != snapshot.entities)
            .unwrap_or(true);
        let inventory_changed = previous
            .as_ref()
            .map(|p| p.inventory != snapshot.inventory)
            .unwrap_or(true);
        let health_changed = previous
            .as_ref()
            .map(|p| p.player.health != snapshot.player.health)
            .unwrap_or(true);

        for kind in &self.listeners {
            let Some(mode) = self.modes.get(kind) else {
                continue;
            };
            if let Err(e) = mode.on_game_state_updated(snapshot).await {
                warn!(mode = %kind, error = %e, "game-state listener failed");
            }
            if entities_changed {
                if let Err(e) = mode.on_entities_updated(snapshot).await {
                    warn!(mode = %kind, error = %e, "entities listener failed");
                }
            }
            if inventory_changed {
                if let Err(e) = mode.on_inventory_updated(snapshot).await {
                    warn!(mode = %kind, error = %e, "inventory listener failed");
                }
            }
            if health_changed {
                if let Err(e) = mode.on_health_updated(snapshot).await {
                    warn!(mode = %kind, error = %e, "health listener failed");
                }
            }
        }
    }

    /// Run the active mode's execute step. On failure the error is logged
    /// and a non-baseline mode is forced back to Main.
    pub async fn execute_current_mode(&self) -> bool {
        let Some(kind) = self.current_mode() else {
            return false;
        };
        let Some(mode) = self.modes.get(&kind) else {
            return false;
        };
        match mode.execute().await {
            Ok(()) => true,
            Err(e) => {
                error!(mode = %kind, error = %e, "mode execution failed");
                if kind != ModeKind::Main {
                    if let Err(e) = self
                        .set_mode(ModeKind::Main, "recovering after mode failure")
                        .await
                    {
                        error!(error = %e, "recovery to main failed");
                    }
                }
                false
            }
        }
    }
}
