//! Read-only world-state snapshots consumed by trackers, modes and prompts

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// One inventory slot aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: String,
    pub count: u32,
}

/// A nearby entity as seen by the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub id: u64,
    pub name: String,
    pub position: Vec3,
    pub hostile: bool,
    #[serde(default)]
    pub health: Option<f64>,
}

/// An interesting nearby block (ores, logs, containers)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub name: String,
    pub position: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub position: Vec3,
    /// Half-hearts, 0-20
    pub health: f64,
    /// Food level, 0-20
    pub food: f64,
}

/// Point-in-time view of the game world around the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub tick: u64,
    pub player: PlayerState,
    #[serde(default)]
    pub inventory: Vec<ItemStack>,
    #[serde(default)]
    pub entities: Vec<EntityInfo>,
    #[serde(default)]
    pub blocks: Vec<BlockInfo>,
}

impl GameSnapshot {
    /// A snapshot with a parked, healthy player and nothing nearby
    pub fn empty(tick: u64) -> Self {
        Self {
            tick,
            player: PlayerState {
                position: Vec3::new(0.0, 64.0, 0.0),
                health: 20.0,
                food: 20.0,
            },
            inventory: Vec::new(),
            entities: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Total count of a named item across all stacks
    pub fn count_item(&self, item: &str) -> u32 {
        self.inventory
            .iter()
            .filter(|s| s.item == item)
            .map(|s| s.count)
            .sum()
    }

    pub fn has_item(&self, item: &str, count: u32) -> bool {
        self.count_item(item) >= count
    }

    /// Closest hostile entity, if any
    pub fn nearest_hostile(&self) -> Option<&EntityInfo> {
        self.entities
            .iter()
            .filter(|e| e.hostile)
            .min_by(|a, b| {
                let da = self.player.position.distance(&a.position);
                let db = self.player.position.distance(&b.position);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// Number of hostiles within the given radius of the player
    pub fn hostiles_within(&self, radius: f64) -> usize {
        self.entities
            .iter()
            .filter(|e| e.hostile && self.player.position.distance(&e.position) <= radius)
            .count()
    }

    pub fn distance_to(&self, target: &Vec3) -> f64 {
        self.player.position.distance(target)
    }
}
