use std::fmt;

use super::condition::Condition;
use super::error::{EngineError, RuleError};
use crate::bridge::Bridge;
use crate::model::{AttachmentKind, Change, PropertyHandle, PropertyValue};

pub const MAX_DICE_SIDES: i64 = 120;

/// Category tag attached to every chance roll.
pub const DICE_CATEGORY: &str = "engine";

const SUCCESS: &str = "Trigger Rolling is a Success!";
const FAILURE: &str = "Trigger Rolling is a Failure!";

/// `hit` out of `sides`. `hit == sides` never rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chance {
    pub hit: i64,
    pub sides: i64,
}

impl Chance {
    pub const CERTAIN: Chance = Chance { hit: 1, sides: 1 };

    pub fn parse(name: &str, raw: &str) -> Result<Self, RuleError> {
        let (hit, sides) = raw
            .split_once(':')
            .ok_or_else(|| RuleError::invalid(name, format!("chance must be hit:sides, got '{raw}'")))?;
        let hit: i64 = hit
            .trim()
            .parse()
            .map_err(|_| RuleError::invalid(name, format!("chance hit is not a number: '{raw}'")))?;
        let sides: i64 = sides
            .trim()
            .parse()
            .map_err(|_| RuleError::invalid(name, format!("chance sides is not a number: '{raw}'")))?;
        if hit < 0 || sides < 0 || hit > sides || sides > MAX_DICE_SIDES {
            return Err(RuleError::invalid(
                name,
                format!("chance must satisfy 0 <= hit <= sides <= {MAX_DICE_SIDES}, got '{raw}'"),
            ));
        }
        Ok(Chance { hit, sides })
    }

    /// The next hit target after a resolution, kept within `0..=sides`.
    pub fn drifted(self, success: bool, increment_on_failure: i64, decrement_on_success: i64) -> Chance {
        let hit = if success {
            self.hit - decrement_on_success
        } else {
            self.hit + increment_on_failure
        };
        Chance {
            hit: hit.clamp(0, self.sides.max(0)),
            sides: self.sides,
        }
    }
}

impl fmt::Display for Chance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hit, self.sides)
    }
}

/// What one resolution produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChanceRoll {
    pub success: bool,
    /// Set only when a die was actually drawn.
    pub roll: Option<u32>,
    pub text: Option<String>,
}

/// Resolve `hit` out of `sides`. Certain outcomes draw nothing.
pub fn resolve(chance: Chance, name: &str, roller: impl FnOnce(u32) -> u32) -> ChanceRoll {
    if chance.sides <= 0 || chance.hit >= chance.sides {
        return ChanceRoll {
            success: true,
            roll: None,
            text: None,
        };
    }
    if chance.hit <= 0 {
        return ChanceRoll {
            success: false,
            roll: None,
            text: None,
        };
    }
    let roll = roller(chance.sides as u32);
    let success = i64::from(roll) <= chance.hit;
    let text = format!(
        "{} (Rolled at {} out of {} Result: {}  for {})",
        if success { SUCCESS } else { FAILURE },
        chance.hit,
        chance.sides,
        roll,
        name
    );
    ChanceRoll {
        success,
        roll: Some(roll),
        text: Some(text),
    }
}

pub(crate) fn handle(kind: AttachmentKind, name: &str) -> Result<PropertyHandle, EngineError> {
    PropertyHandle::resolve(kind, name)
        .ok_or_else(|| EngineError::UnknownProperty(format!("{kind}.{name}")))
}

/// Current chance and drift amounts of a condition, read from its store.
pub fn current_chance(
    condition: &Condition,
    bridge: &dyn Bridge,
) -> Result<(Chance, i64, i64), EngineError> {
    let Some(store) = bridge.data().store(&condition.store) else {
        return Ok((Chance::CERTAIN, 0, 0));
    };
    let raw = store.text("chance");
    let chance =
        Chance::parse(&condition.name, &raw).map_err(|source| EngineError::CorruptChance {
            name: condition.name.clone(),
            source,
        })?;
    Ok((
        chance,
        store.int("chanceIncrementOnFailure"),
        store.int("chanceDecrementOnSuccess"),
    ))
}

/// Roll a condition's or trigger's chance, record the roll and drift the odds.
///
/// Conditions whose chance is certain and never drifts pass without touching
/// the bridge.
pub fn test_chance(condition: &Condition, bridge: &mut dyn Bridge) -> Result<bool, EngineError> {
    let (chance, increment, decrement) = current_chance(condition, bridge)?;
    if chance.hit == chance.sides && increment == 0 && decrement == 0 {
        return Ok(true);
    }
    let reason = if condition.is_trigger() {
        format!("Attempting the Trigger: {}", condition.name)
    } else {
        format!("Attempting the Condition: {}", condition.name)
    };
    let delay = bridge.roll_delay();
    let related = condition.players.clone();
    let outcome = resolve(chance, &condition.name, |sides| {
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        bridge.random(sides, &related, DICE_CATEGORY, &reason)
    });
    tracing::debug!(
        condition = %condition.name,
        success = outcome.success,
        roll = ?outcome.roll,
        "chance resolved"
    );
    if let Some(text) = &outcome.text {
        bridge.start_event(text, &related);
    }
    drift(condition, chance, outcome.success, increment, decrement, bridge)?;
    if let Some(text) = &outcome.text {
        bridge.report_message(text, text);
    }
    Ok(outcome.success)
}

fn drift(
    condition: &Condition,
    chance: Chance,
    success: bool,
    increment: i64,
    decrement: i64,
    bridge: &mut dyn Bridge,
) -> Result<(), EngineError> {
    if (success && decrement == 0) || (!success && increment == 0) {
        return Ok(());
    }
    let next = chance.drifted(success, increment, decrement);
    if next == chance {
        return Ok(());
    }
    let property = handle(condition.attachment_kind(), "chance")?;
    let old = bridge
        .data()
        .store(&condition.store)
        .and_then(|s| property.stored(s).cloned());
    bridge.start_event(
        &format!(
            "{} changes chance for {} to {}",
            if success { "Success" } else { "Failure" },
            condition.name,
            next
        ),
        &[],
    );
    bridge.add_change(Change::PropertySet {
        store: condition.store.clone(),
        property,
        old,
        new: Some(PropertyValue::Text(next.to_string())),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_enforces_bounds() {
        assert_eq!(Chance::parse("c", "3:10"), Ok(Chance { hit: 3, sides: 10 }));
        assert!(Chance::parse("c", "11:10").is_err());
        assert!(Chance::parse("c", "1:121").is_err());
        assert!(Chance::parse("c", "-1:6").is_err());
        assert!(Chance::parse("c", "6").is_err());
    }

    #[test]
    fn certain_and_impossible_never_roll() {
        let mut rolls = 0;
        let sure = resolve(Chance { hit: 6, sides: 6 }, "c", |_| {
            rolls += 1;
            1
        });
        assert!(sure.success);
        let never = resolve(Chance { hit: 0, sides: 6 }, "c", |_| {
            rolls += 1;
            1
        });
        assert!(!never.success);
        assert_eq!(rolls, 0);
        assert!(sure.text.is_none() && never.text.is_none());
    }

    #[test]
    fn roll_text_names_the_condition() {
        let roll = resolve(Chance { hit: 2, sides: 6 }, "c_Germany", |_| 5);
        assert!(!roll.success);
        assert_eq!(
            roll.text.as_deref(),
            Some("Trigger Rolling is a Failure! (Rolled at 2 out of 6 Result: 5  for c_Germany)")
        );
    }

    #[test]
    fn drift_is_clamped() {
        let start = Chance { hit: 3, sides: 10 };
        assert_eq!(start.drifted(true, 0, 5), Chance { hit: 0, sides: 10 });
        assert_eq!(start.drifted(false, 20, 0), Chance { hit: 10, sides: 10 });
        assert_eq!(start.drifted(false, 0, 5), start);
    }
}
