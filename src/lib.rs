#[macro_use]
pub mod model;

pub mod bridge;
pub mod config;
pub mod flush;
pub mod id;
pub mod rules;
pub mod scenario;
pub mod testutil;

pub use bridge::{Bridge, DiceRoller, DryRunBridge, GameBridge, RngDice};
pub use config::EngineConfig;
pub use id::IdGenerator;
pub use model::{Change, GameData, Journal, JournalEntry};
pub use rules::{FireReport, FireTriggerParams, RuleSet, RuleSetDef, When};
