//! World boundary: snapshots, the game-context trait and the built-in sim

pub mod context;
pub mod sim;
pub mod snapshot;

pub use context::{ActionOutcome, GameContext};
pub use sim::SimGame;
pub use snapshot::{BlockInfo, EntityInfo, GameSnapshot, ItemStack, PlayerState, Vec3};
