//! Task completion trackers
//!
//! A tracker is a predicate over the current [`GameSnapshot`] that decides
//! whether a task's goal condition holds, plus a progress readout for
//! prompts and status displays. Trackers serialize as a tagged union so
//! plans survive restarts, including captured craft baselines.

use serde::{Deserialize, Serialize};

use crate::game::snapshot::{GameSnapshot, Vec3};

/// Progress readout for one tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerProgress {
    pub current: f64,
    pub target: f64,
    /// 0-100, clamped
    pub percentage: f64,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositeOp {
    All,
    Any,
}

/// Completion predicate attached to every task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskTracker {
    /// Named item count in the inventory reaches the target
    Inventory { item: String, count: u32 },
    /// Player within `radius` of the target point
    Location { x: f64, y: f64, z: f64, radius: f64 },
    /// Item count grows by `count` over the level seen at the first check.
    /// The captured baseline serializes so restarts do not re-grant progress.
    Craft {
        item: String,
        count: u32,
        #[serde(default)]
        baseline: Option<u32>,
    },
    /// AND/OR over sub-trackers
    Composite {
        op: CompositeOp,
        trackers: Vec<TaskTracker>,
    },
}

impl TaskTracker {
    /// Evaluate against the snapshot. Craft trackers capture their baseline
    /// on the first call, which is why this takes `&mut self`.
    pub fn check_completion(&mut self, snapshot: &GameSnapshot) -> bool {
        match self {
            TaskTracker::Inventory { item, count } => snapshot.count_item(item) >= *count,
            TaskTracker::Location { x, y, z, radius } => {
                snapshot.distance_to(&Vec3::new(*x, *y, *z)) <= *radius
            }
            TaskTracker::Craft {
                item,
                count,
                baseline,
            } => {
                let current = snapshot.count_item(item);
                let base = *baseline.get_or_insert(current);
                current.saturating_sub(base) >= *count
            }
            TaskTracker::Composite { op, trackers } => {
                // Evaluate every child so later craft baselines still get captured
                let results: Vec<bool> = trackers
                    .iter_mut()
                    .map(|t| t.check_completion(snapshot))
                    .collect();
                match op {
                    CompositeOp::All => results.iter().all(|r| *r),
                    CompositeOp::Any => results.iter().any(|r| *r),
                }
            }
        }
    }

    /// Non-mutating progress readout
    pub fn progress(&self, snapshot: &GameSnapshot) -> TrackerProgress {
        match self {
            TaskTracker::Inventory { item, count } => {
                let current = snapshot.count_item(item) as f64;
                let target = *count as f64;
                TrackerProgress {
                    current,
                    target,
                    percentage: pct(current, target),
                    description: self.describe(),
                }
            }
            TaskTracker::Location { x, y, z, radius } => {
                let distance = snapshot.distance_to(&Vec3::new(*x, *y, *z));
                let percentage = if distance <= *radius {
                    100.0
                } else {
                    (*radius / distance * 100.0).clamp(0.0, 100.0)
                };
                TrackerProgress {
                    current: distance,
                    target: *radius,
                    percentage,
                    description: self.describe(),
                }
            }
            TaskTracker::Craft {
                item,
                count,
                baseline,
            } => {
                let current = match baseline {
                    Some(base) => snapshot.count_item(item).saturating_sub(*base) as f64,
                    None => 0.0,
                };
                let target = *count as f64;
                TrackerProgress {
                    current,
                    target,
                    percentage: pct(current, target),
                    description: self.describe(),
                }
            }
            TaskTracker::Composite { op: _, trackers } => {
                let parts: Vec<TrackerProgress> =
                    trackers.iter().map(|t| t.progress(snapshot)).collect();
                let percentage = if parts.is_empty() {
                    0.0
                } else {
                    parts.iter().map(|p| p.percentage).sum::<f64>() / parts.len() as f64
                };
                TrackerProgress {
                    current: percentage,
                    target: 100.0,
                    percentage,
                    description: self.describe(),
                }
            }
        }
    }

    /// One-line human description
    pub fn describe(&self) -> String {
        match self {
            TaskTracker::Inventory { item, count } => format!("hold {} x{}", item, count),
            TaskTracker::Location { x, y, z, radius } => {
                format!("reach ({:.0}, {:.0}, {:.0}) within {:.0}", x, y, z, radius)
            }
            TaskTracker::Craft { item, count, .. } => format!("craft {} x{}", item, count),
            TaskTracker::Composite { op, trackers } => {
                let word = match op {
                    CompositeOp::All => "all of",
                    CompositeOp::Any => "any of",
                };
                let parts: Vec<String> = trackers.iter().map(|t| t.describe()).collect();
                format!("{}: [{}]", word, parts.join("; "))
            }
        }
    }
}

fn pct(current: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return 100.0;
    }
    (current / target * 100.0).clamp(0.0, 100.0)
}
