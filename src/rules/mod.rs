//! Conditions, triggers and the passes that test and fire them.

pub mod chance;
pub mod condition;
pub mod defs;
pub mod error;
pub mod graph;
pub mod loader;
pub mod notification;
pub mod params;
pub mod pipeline;
pub mod predicate;
mod syntax;
pub mod territory_list;
pub mod trigger;

pub use chance::{Chance, ChanceRoll};
pub use condition::{Condition, ConditionId, ConditionKind, ConditionMemo, ConditionType, Outcome};
pub use defs::{ConditionDef, PropertyEditDef, RuleSetDef, TriggerDef};
pub use error::{EngineError, RuleError};
pub use graph::{collect_closure, test_closure, test_condition};
pub use loader::RuleSet;
pub use notification::NotificationCatalog;
pub use params::FireTriggerParams;
pub use pipeline::{
    FireReport, collect_and_fire_triggers, collect_for_all_triggers_matching,
    collect_tests_for_all_triggers, end_of_round_uses_sweep, fire_triggers,
    project_resource_income,
};
pub use predicate::{RelationshipSelector, RuleChecks};
pub use trigger::{Phase, TriggerSpec, When};
