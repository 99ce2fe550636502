use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{EngineError, RuleError};
use super::predicate::RuleChecks;
use super::trigger::TriggerSpec;
use crate::model::{AttachmentKind, StoreKey};

/// Index of a condition in its rule set's arena, in load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConditionId(pub usize);

impl fmt::Display for ConditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a condition combines its children's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConditionType {
    #[default]
    And,
    Or,
    /// Written as a single number. Holds only when exactly `n` children hold.
    AtLeast(u32),
    /// `n-m`, inclusive on both ends.
    Between(u32, u32),
}

impl ConditionType {
    pub fn parse(name: &str, raw: &str) -> Result<Self, RuleError> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("AND") {
            return Ok(ConditionType::And);
        }
        if raw.eq_ignore_ascii_case("OR") {
            return Ok(ConditionType::Or);
        }
        let bad = || {
            RuleError::invalid(
                name,
                format!("conditionType must be AND, OR, n or n-m, got '{raw}'"),
            )
        };
        match raw.split_once('-') {
            None => raw.parse().map(ConditionType::AtLeast).map_err(|_| bad()),
            Some((lo, hi)) => {
                let lo: u32 = lo.parse().map_err(|_| bad())?;
                let hi: u32 = hi.parse().map_err(|_| bad())?;
                if hi < lo {
                    return Err(RuleError::invalid(
                        name,
                        format!("conditionType range {lo}-{hi} is empty"),
                    ));
                }
                Ok(ConditionType::Between(lo, hi))
            }
        }
    }

    /// Combine already-known child results.
    pub fn combine(self, results: impl IntoIterator<Item = bool>) -> bool {
        let mut results = results.into_iter();
        match self {
            ConditionType::And => results.all(|r| r),
            ConditionType::Or => results.any(|r| r),
            ConditionType::AtLeast(n) => results.filter(|r| *r).count() == n as usize,
            ConditionType::Between(lo, hi) => {
                let count = results.filter(|r| *r).count();
                (lo as usize..=hi as usize).contains(&count)
            }
        }
    }
}

/// The result of testing one condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub satisfied: bool,
    /// Set by counted checks written with `each`.
    pub multiplier: Option<u32>,
}

impl Outcome {
    pub fn new(satisfied: bool) -> Self {
        Self {
            satisfied,
            multiplier: None,
        }
    }
}

/// Memoized results, keyed by condition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionMemo {
    results: BTreeMap<ConditionId, Outcome>,
}

impl ConditionMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ConditionId) -> Option<Outcome> {
        self.results.get(&id).copied()
    }

    pub fn satisfied(&self, id: ConditionId) -> Option<bool> {
        self.get(id).map(|o| o.satisfied)
    }

    pub fn contains(&self, id: ConditionId) -> bool {
        self.results.contains_key(&id)
    }

    /// First result wins; a tested condition is never re-recorded.
    pub fn record(&mut self, id: ConditionId, outcome: Outcome) {
        self.results.entry(id).or_insert(outcome);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConditionId, Outcome)> + '_ {
        self.results.iter().map(|(id, o)| (*id, *o))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionKind {
    Rules(RuleChecks),
    Trigger(Box<TriggerSpec>),
}

/// A named condition. Structure is fixed at load; value fields (switch,
/// uses, chance) live in its attribute store.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub id: ConditionId,
    pub name: String,
    pub attached_to: String,
    pub players: Vec<String>,
    pub condition_type: ConditionType,
    pub invert: bool,
    pub children: Vec<ConditionId>,
    pub store: StoreKey,
    pub kind: ConditionKind,
}

impl Condition {
    pub fn attachment_kind(&self) -> AttachmentKind {
        match self.kind {
            ConditionKind::Rules(_) => AttachmentKind::Rules,
            ConditionKind::Trigger(_) => AttachmentKind::Trigger,
        }
    }

    pub fn as_trigger(&self) -> Option<&TriggerSpec> {
        match &self.kind {
            ConditionKind::Trigger(spec) => Some(spec),
            ConditionKind::Rules(_) => None,
        }
    }

    pub fn is_trigger(&self) -> bool {
        self.as_trigger().is_some()
    }

    /// True when the result depends only on the children. Rules conditions
    /// also read their switch, leaf checks and chance.
    pub fn is_composite_only(&self) -> bool {
        self.is_trigger()
    }

    /// Combine the children's memoized results. Every child must already be
    /// in the memo. Without children there is nothing to combine and the
    /// condition type does not apply.
    pub fn combine(&self, memo: &ConditionMemo) -> Result<bool, EngineError> {
        if self.children.is_empty() {
            return Ok(true);
        }
        let mut results = Vec::with_capacity(self.children.len());
        for child in &self.children {
            let satisfied = memo.satisfied(*child).ok_or_else(|| {
                EngineError::UntestedCondition(format!("{child} (child of {})", self.name))
            })?;
            results.push(satisfied);
        }
        Ok(self.condition_type.combine(results))
    }

    /// The memoized result, or for purely composite conditions the combined
    /// children. Conditions with leaf checks must have been tested.
    pub fn is_satisfied(&self, memo: &ConditionMemo) -> Result<bool, EngineError> {
        if let Some(satisfied) = memo.satisfied(self.id) {
            return Ok(satisfied);
        }
        if !self.is_composite_only() {
            return Err(EngineError::UntestedCondition(self.name.clone()));
        }
        Ok(self.combine(memo)? != self.invert)
    }
}
