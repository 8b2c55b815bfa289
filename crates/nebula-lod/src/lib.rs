//! Level-of-detail quadtree: distance-driven split and unify with hysteresis,
//! transitions that keep old geometry on screen until the new one is ready,
//! and a per-tick time budget over all of it.

mod arena;
mod budget;
mod error;
mod leaf;
mod node;
mod planet;
mod thresholds;

pub use arena::{NodeArena, NodeId};
pub use budget::{DEFAULT_FRAME_BUDGET, FrameBudget};
pub use error::LodError;
pub use leaf::{LeafNode, LeafState};
pub use node::{Children, IntentKind, Node, NodeState, Transition, TransitionQueues};
pub use planet::{BudgetSettings, LodSettings, Planet, PlanetStats, TickReport};
pub use thresholds::{LevelFactors, LodAction, LodThresholds};
