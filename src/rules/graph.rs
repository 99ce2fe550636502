//! Closure collection and memoized, children-first condition testing.

use std::collections::BTreeSet;

use super::chance::test_chance;
use super::condition::{ConditionId, ConditionKind, ConditionMemo, Outcome};
use super::error::EngineError;
use super::loader::RuleSet;
use crate::bridge::Bridge;

/// Every condition reachable from `starting` through child links, added to
/// `so_far`.
pub fn collect_closure(
    rules: &RuleSet,
    starting: impl IntoIterator<Item = ConditionId>,
    mut so_far: BTreeSet<ConditionId>,
) -> BTreeSet<ConditionId> {
    let mut stack: Vec<ConditionId> = starting.into_iter().collect();
    while let Some(id) = stack.pop() {
        if so_far.insert(id) {
            stack.extend(rules.condition(id).children.iter().copied());
        }
    }
    so_far
}

/// Test every condition of `closure` not already in `memo`, children first,
/// in ascending id order. Random and auditable work (chance rolls) happens
/// here exactly once per condition.
pub fn test_closure(
    rules: &RuleSet,
    closure: &BTreeSet<ConditionId>,
    mut memo: ConditionMemo,
    bridge: &mut dyn Bridge,
) -> Result<ConditionMemo, EngineError> {
    for id in closure {
        test_condition(rules, *id, &mut memo, bridge)?;
    }
    Ok(memo)
}

/// Test one condition and, first, any untested descendant.
pub fn test_condition(
    rules: &RuleSet,
    id: ConditionId,
    memo: &mut ConditionMemo,
    bridge: &mut dyn Bridge,
) -> Result<Outcome, EngineError> {
    if let Some(outcome) = memo.get(id) {
        return Ok(outcome);
    }
    let condition = rules.condition(id);
    for child in &condition.children {
        test_condition(rules, *child, memo, bridge)?;
    }

    let mut met = condition.combine(memo)?;
    let mut multiplier = None;
    if let ConditionKind::Rules(checks) = &condition.kind {
        if met {
            let data = bridge.data();
            let switched = data
                .store(&condition.store)
                .map(|s| s.flag("switch"))
                .unwrap_or(true);
            let (leaf_met, counted) =
                checks.evaluate(data, &condition.attached_to, &condition.players, switched);
            met = leaf_met;
            multiplier = counted;
        }
        if met {
            met = test_chance(condition, bridge)?;
        }
    }

    let outcome = Outcome {
        satisfied: met != condition.invert,
        multiplier,
    };
    tracing::debug!(
        condition = %condition.name,
        satisfied = outcome.satisfied,
        multiplier = ?outcome.multiplier,
        "condition tested"
    );
    memo.record(id, outcome);
    Ok(outcome)
}
