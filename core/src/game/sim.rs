//! Deterministic in-process world simulation
//!
//! Backs the demo runner and the scenario tests: actions resolve instantly
//! and synchronously, ticks advance on every snapshot, and the whole world
//! state is inspectable. No physics, no protocol.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;

use super::context::{ActionOutcome, GameContext};
use super::snapshot::{BlockInfo, EntityInfo, GameSnapshot, ItemStack, PlayerState, Vec3};

const ATTACK_DAMAGE: f64 = 5.0;
const ENTITY_CAP: usize = 32;

#[derive(Debug)]
struct SimState {
    tick: u64,
    player: PlayerState,
    inventory: BTreeMap<String, u32>,
    entities: Vec<EntityInfo>,
    blocks: Vec<BlockInfo>,
    chest: BTreeMap<String, u32>,
    scan_paused: bool,
    actions: Vec<(String, Value)>,
    next_entity_id: u64,
}

/// In-process [`GameContext`] implementation
pub struct SimGame {
    state: Mutex<SimState>,
}

impl Default for SimGame {
    fn default() -> Self {
        Self::new()
    }
}

impl SimGame {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                tick: 0,
                player: PlayerState {
                    position: Vec3::new(0.0, 64.0, 0.0),
                    health: 20.0,
                    food: 20.0,
                },
                inventory: BTreeMap::new(),
                entities: Vec::new(),
                blocks: Vec::new(),
                chest: BTreeMap::new(),
                scan_paused: false,
                actions: Vec::new(),
                next_entity_id: 1,
            }),
        }
    }

    /// Spawn an entity; returns its id
    pub fn add_entity(&self, name: &str, position: Vec3, hostile: bool, health: f64) -> u64 {
        let mut st = self.state.lock();
        let id = st.next_entity_id;
        st.next_entity_id += 1;
        st.entities.push(EntityInfo {
            id,
            name: name.to_string(),
            position,
            hostile,
            health: Some(health),
        });
        id
    }

    pub fn add_block(&self, name: &str, position: Vec3) {
        self.state.lock().blocks.push(BlockInfo {
            name: name.to_string(),
            position,
        });
    }

    pub fn set_item(&self, item: &str, count: u32) {
        let mut st = self.state.lock();
        if count == 0 {
            st.inventory.remove(item);
        } else {
            st.inventory.insert(item.to_string(), count);
        }
    }

    pub fn set_chest_item(&self, item: &str, count: u32) {
        self.state.lock().chest.insert(item.to_string(), count);
    }

    pub fn set_player_health(&self, health: f64) {
        self.state.lock().player.health = health;
    }

    pub fn item_count(&self, item: &str) -> u32 {
        self.state.lock().inventory.get(item).copied().unwrap_or(0)
    }

    pub fn chest_count(&self, item: &str) -> u32 {
        self.state.lock().chest.get(item).copied().unwrap_or(0)
    }

    pub fn entity_count(&self) -> usize {
        self.state.lock().entities.len()
    }

    pub fn scan_paused(&self) -> bool {
        self.state.lock().scan_paused
    }

    /// Names of all actions executed so far, in order
    pub fn action_log(&self) -> Vec<String> {
        self.state
            .lock()
            .actions
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[derive(Deserialize)]
struct ItemParams {
    item: String,
    count: u32,
}

#[derive(Deserialize)]
struct MoveParams {
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Deserialize)]
struct AttackParams {
    entity_id: u64,
}

#[derive(Deserialize)]
struct SmeltParams {
    input: String,
    output: String,
    count: u32,
}

fn take_items(store: &mut BTreeMap<String, u32>, item: &str, count: u32) -> bool {
    match store.get_mut(item) {
        Some(have) if *have >= count => {
            *have -= count;
            if *have == 0 {
                store.remove(item);
            }
            true
        }
        _ => false,
    }
}

fn give_items(store: &mut BTreeMap<String, u32>, item: &str, count: u32) {
    *store.entry(item.to_string()).or_insert(0) += count;
}

impl SimState {
    fn apply(&mut self, action: &str, params: Value) -> anyhow::Result<ActionOutcome> {
        let outcome = match action {
            "collect" | "mine" => {
                let p: ItemParams = serde_json::from_value(params.clone())?;
                give_items(&mut self.inventory, &p.item, p.count);
                ActionOutcome::ok(format!("collected {} {}", p.count, p.item))
            }
            "craft" => {
                let p: ItemParams = serde_json::from_value(params.clone())?;
                give_items(&mut self.inventory, &p.item, p.count);
                ActionOutcome::ok(format!("crafted {} {}", p.count, p.item))
            }
            "move_to" => {
                let p: MoveParams = serde_json::from_value(params.clone())?;
                self.player.position = Vec3::new(p.x, p.y, p.z);
                ActionOutcome::ok(format!("moved to ({:.1}, {:.1}, {:.1})", p.x, p.y, p.z))
            }
            "attack" => {
                let p: AttackParams = serde_json::from_value(params.clone())?;
                match self.entities.iter_mut().find(|e| e.id == p.entity_id) {
                    Some(entity) => {
                        let hp = entity.health.unwrap_or(0.0) - ATTACK_DAMAGE;
                        if hp <= 0.0 {
                            let name = entity.name.clone();
                            self.entities.retain(|e| e.id != p.entity_id);
                            ActionOutcome::ok(format!("killed {}", name))
                        } else {
                            entity.health = Some(hp);
                            ActionOutcome::ok(format!("hit {} ({:.0} hp left)", entity.name, hp))
                        }
                    }
                    None => ActionOutcome::failed(format!("no entity {}", p.entity_id)),
                }
            }
            "deposit" => {
                let p: ItemParams = serde_json::from_value(params.clone())?;
                if take_items(&mut self.inventory, &p.item, p.count) {
                    give_items(&mut self.chest, &p.item, p.count);
                    ActionOutcome::ok(format!("deposited {} {}", p.count, p.item))
                } else {
                    ActionOutcome::failed(format!("not enough {} to deposit", p.item))
                }
            }
            "withdraw" => {
                let p: ItemParams = serde_json::from_value(params.clone())?;
                if take_items(&mut self.chest, &p.item, p.count) {
                    give_items(&mut self.inventory, &p.item, p.count);
                    ActionOutcome::ok(format!("withdrew {} {}", p.count, p.item))
                } else {
                    ActionOutcome::failed(format!("chest has no {} x{}", p.item, p.count))
                }
            }
            "smelt" => {
                let p: SmeltParams = serde_json::from_value(params.clone())?;
                if take_items(&mut self.inventory, &p.input, p.count) {
                    give_items(&mut self.inventory, &p.output, p.count);
                    ActionOutcome::ok(format!("smelted {} {} into {}", p.count, p.input, p.output))
                } else {
                    ActionOutcome::failed(format!("not enough {} to smelt", p.input))
                }
            }
            "open_container" | "close_container" | "idle" | "explore" => {
                ActionOutcome::ok(action.to_string())
            }
            other => ActionOutcome::failed(format!("unknown action: {}", other)),
        };
        self.actions.push((action.to_string(), params));
        Ok(outcome)
    }
}

#[async_trait::async_trait]
impl GameContext for SimGame {
    async fn snapshot(&self) -> anyhow::Result<GameSnapshot> {
        let mut st = self.state.lock();
        st.tick += 1;

        let inventory = st
            .inventory
            .iter()
            .map(|(item, count)| ItemStack {
                item: item.clone(),
                count: *count,
            })
            .collect();

        let player_pos = st.player.position;
        let mut entities = st.entities.clone();
        entities.sort_by(|a, b| {
            player_pos
                .distance(&a.position)
                .partial_cmp(&player_pos.distance(&b.position))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entities.truncate(ENTITY_CAP);

        Ok(GameSnapshot {
            tick: st.tick,
            player: st.player.clone(),
            inventory,
            entities,
            blocks: st.blocks.clone(),
        })
    }

    async fn execute(&self, action: &str, params: Value) -> anyhow::Result<ActionOutcome> {
        self.state.lock().apply(action, params)
    }

    async fn pause_world_scan(&self) {
        self.state.lock().scan_paused = true;
    }

    async fn resume_world_scan(&self) {
        self.state.lock().scan_paused = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_collect_and_count() {
        let sim = SimGame::new();
        let out = sim
            .execute("collect", json!({"item": "oak_log", "count": 3}))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(sim.item_count("oak_log"), 3);

        let snap = sim.snapshot().await.unwrap();
        assert_eq!(snap.count_item("oak_log"), 3);
        assert_eq!(snap.tick, 1);
    }

    #[tokio::test]
    async fn test_attack_kills_after_enough_hits() {
        let sim = SimGame::new();
        let id = sim.add_entity("zombie", Vec3::new(3.0, 64.0, 0.0), true, 10.0);

        let out = sim.execute("attack", json!({"entity_id": id})).await.unwrap();
        assert!(out.success);
        assert_eq!(sim.entity_count(), 1);

        let out = sim.execute("attack", json!({"entity_id": id})).await.unwrap();
        assert!(out.message.starts_with("killed"));
        assert_eq!(sim.entity_count(), 0);
    }

    #[tokio::test]
    async fn test_deposit_requires_stock() {
        let sim = SimGame::new();
        let out = sim
            .execute("deposit", json!({"item": "iron_ingot", "count": 2}))
            .await
            .unwrap();
        assert!(!out.success);

        sim.set_item("iron_ingot", 5);
        let out = sim
            .execute("deposit", json!({"item": "iron_ingot", "count": 2}))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(sim.item_count("iron_ingot"), 3);
        assert_eq!(sim.chest_count("iron_ingot"), 2);
    }

    #[tokio::test]
    async fn test_scan_pause_toggles() {
        let sim = SimGame::new();
        assert!(!sim.scan_paused());
        sim.pause_world_scan().await;
        assert!(sim.scan_paused());
        sim.resume_world_scan().await;
        assert!(!sim.scan_paused());
    }

    #[tokio::test]
    async fn test_unknown_action_fails_without_error() {
        let sim = SimGame::new();
        let out = sim.execute("teleport", json!({})).await.unwrap();
        assert!(!out.success);
        assert!(out.message.contains("unknown action"));
    }
}
