//! Builds a validated [`RuleSet`] from definitions.
//!
//! Loading runs in passes: names and stores first, so conditions may refer to
//! ones declared later, then per-condition parsing, then links between
//! conditions (children and trigger activations), and last a cycle check.

use std::collections::BTreeMap;

use super::chance::Chance;
use super::condition::{Condition, ConditionId, ConditionKind, ConditionType};
use super::defs::{ConditionDef, RuleSetDef, TriggerDef};
use super::error::RuleError;
use super::notification::NotificationCatalog;
use super::predicate::RuleChecks;
use super::trigger::{Activation, TriggerSpec};
use crate::model::{AttachmentKind, GameData, OwnerKind, PropertyHandle, StoreKey};

/// Loaded conditions and triggers, addressed by [`ConditionId`].
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    conditions: Vec<Condition>,
    by_name: BTreeMap<String, ConditionId>,
    notifications: NotificationCatalog,
}

/// Fields shared by both declaration shapes.
struct Common<'a> {
    name: &'a str,
    attached_to: &'a str,
    players: &'a [String],
    condition_type: Option<&'a str>,
    invert: bool,
    conditions: &'a [String],
    kind: AttachmentKind,
}

impl<'a> Common<'a> {
    fn of_condition(def: &'a ConditionDef) -> Self {
        Self {
            name: &def.name,
            attached_to: &def.attached_to,
            players: &def.players,
            condition_type: def.condition_type.as_deref(),
            invert: def.invert,
            conditions: &def.conditions,
            kind: AttachmentKind::Rules,
        }
    }

    fn of_trigger(def: &'a TriggerDef) -> Self {
        Self {
            name: &def.name,
            attached_to: &def.attached_to,
            players: &def.players,
            condition_type: def.condition_type.as_deref(),
            invert: def.invert,
            conditions: &def.conditions,
            kind: AttachmentKind::Trigger,
        }
    }
}

impl RuleSet {
    /// Validate `def` against `data` and create every condition's store in
    /// `data`. Rejects the whole set on the first authoring error, leaving
    /// `data` as it was.
    pub fn load(def: &RuleSetDef, data: &mut GameData) -> Result<RuleSet, RuleError> {
        let mut staged = data.clone();
        let rules = Self::load_into(def, &mut staged)?;
        *data = staged;
        Ok(rules)
    }

    fn load_into(def: &RuleSetDef, data: &mut GameData) -> Result<RuleSet, RuleError> {
        let commons: Vec<Common<'_>> = def
            .conditions
            .iter()
            .map(Common::of_condition)
            .chain(def.triggers.iter().map(Common::of_trigger))
            .collect();

        let mut by_name = BTreeMap::new();
        for (index, common) in commons.iter().enumerate() {
            if common.name.is_empty() {
                return Err(RuleError::invalid("(unnamed)", "every condition needs a name"));
            }
            if by_name
                .insert(common.name.to_string(), ConditionId(index))
                .is_some()
            {
                return Err(RuleError::Duplicate(common.name.to_string()));
            }
            if !data.players.contains_key(common.attached_to) {
                return Err(RuleError::unknown(common.name, "player", common.attached_to));
            }
            for player in common.players {
                if !data.players.contains_key(player) {
                    return Err(RuleError::unknown(common.name, "player", player));
                }
            }
        }

        for condition in &def.conditions {
            init_store(
                data,
                &condition.name,
                &condition.attached_to,
                AttachmentKind::Rules,
                &[
                    ("switch", condition.switch.map(|v| v.to_string())),
                    ("uses", condition.uses.map(|v| v.to_string())),
                    ("objectiveValue", condition.objective_value.map(|v| v.to_string())),
                    ("chance", condition.chance.clone()),
                    (
                        "chanceIncrementOnFailure",
                        nonzero(condition.chance_increment_on_failure),
                    ),
                    (
                        "chanceDecrementOnSuccess",
                        nonzero(condition.chance_decrement_on_success),
                    ),
                ],
            )?;
        }
        for trigger in &def.triggers {
            init_store(
                data,
                &trigger.name,
                &trigger.attached_to,
                AttachmentKind::Trigger,
                &[
                    ("uses", trigger.uses.map(|v| v.to_string())),
                    ("chance", trigger.chance.clone()),
                    (
                        "chanceIncrementOnFailure",
                        nonzero(trigger.chance_increment_on_failure),
                    ),
                    (
                        "chanceDecrementOnSuccess",
                        nonzero(trigger.chance_decrement_on_success),
                    ),
                ],
            )?;
        }

        let mut kinds = Vec::with_capacity(commons.len());
        for condition in &def.conditions {
            kinds.push(ConditionKind::Rules(RuleChecks::parse(condition, data)?));
        }
        for trigger in &def.triggers {
            let players = players_or_owner(&trigger.players, &trigger.attached_to);
            let spec = TriggerSpec::parse(trigger, &players, data, &def.notifications)?;
            kinds.push(ConditionKind::Trigger(Box::new(spec)));
        }

        let mut conditions = Vec::with_capacity(commons.len());
        for (index, (common, kind)) in commons.iter().zip(kinds).enumerate() {
            let condition_type = match common.condition_type {
                Some(raw) => ConditionType::parse(common.name, raw)?,
                None => ConditionType::default(),
            };
            let mut children = Vec::with_capacity(common.conditions.len());
            for child in common.conditions {
                let id = by_name
                    .get(child)
                    .copied()
                    .ok_or_else(|| RuleError::unknown(common.name, "condition", child))?;
                if matches!(commons[id.0].kind, AttachmentKind::Trigger) {
                    return Err(RuleError::invalid(
                        common.name,
                        format!("{child} is a trigger and cannot be used as a condition"),
                    ));
                }
                children.push(id);
            }
            conditions.push(Condition {
                id: ConditionId(index),
                name: common.name.to_string(),
                attached_to: common.attached_to.to_string(),
                players: players_or_owner(common.players, common.attached_to),
                condition_type,
                invert: common.invert,
                children,
                store: StoreKey::new(OwnerKind::Player, common.attached_to, common.name),
                kind,
            });
        }

        let lookup = |name: &str| {
            by_name
                .get(name)
                .copied()
                .filter(|id| commons[id.0].kind == AttachmentKind::Trigger)
        };
        let offset = def.conditions.len();
        for (i, trigger) in def.triggers.iter().enumerate() {
            let own = ConditionId(offset + i);
            let activations = trigger
                .activate_trigger
                .iter()
                .map(|raw| Activation::parse(&trigger.name, own, raw, lookup))
                .collect::<Result<Vec<_>, _>>()?;
            if let ConditionKind::Trigger(spec) = &mut conditions[own.0].kind {
                spec.activations = activations;
            }
        }

        let rules = RuleSet {
            conditions,
            by_name,
            notifications: NotificationCatalog::new(def.notifications.clone()),
        };
        rules.check_acyclic()?;
        tracing::debug!(
            conditions = def.conditions.len(),
            triggers = def.triggers.len(),
            "rule set loaded"
        );
        Ok(rules)
    }

    /// The condition behind an id handed out by this set.
    pub fn condition(&self, id: ConditionId) -> &Condition {
        &self.conditions[id.0]
    }

    pub fn get(&self, id: ConditionId) -> Option<&Condition> {
        self.conditions.get(id.0)
    }

    pub fn id_of(&self, name: &str) -> Option<ConditionId> {
        self.by_name.get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<&Condition> {
        self.id_of(name).map(|id| self.condition(id))
    }

    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter()
    }

    /// Triggers in load order.
    pub fn triggers(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter().filter(|c| c.is_trigger())
    }

    pub fn notifications(&self) -> &NotificationCatalog {
        &self.notifications
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    fn check_acyclic(&self) -> Result<(), RuleError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }
        let mut marks = vec![Mark::New; self.conditions.len()];
        let mut path = Vec::new();

        fn visit(
            rules: &RuleSet,
            id: ConditionId,
            marks: &mut [Mark],
            path: &mut Vec<ConditionId>,
        ) -> Result<(), RuleError> {
            match marks[id.0] {
                Mark::Done => return Ok(()),
                Mark::Active => {
                    let start = path.iter().position(|p| *p == id).unwrap_or(0);
                    let mut names: Vec<String> = path[start..]
                        .iter()
                        .map(|p| rules.condition(*p).name.clone())
                        .collect();
                    names.push(rules.condition(id).name.clone());
                    return Err(RuleError::ConditionCycle(names));
                }
                Mark::New => {}
            }
            marks[id.0] = Mark::Active;
            path.push(id);
            for child in &rules.condition(id).children {
                visit(rules, *child, marks, path)?;
            }
            path.pop();
            marks[id.0] = Mark::Done;
            Ok(())
        }

        for condition in &self.conditions {
            visit(self, condition.id, &mut marks, &mut path)?;
        }
        Ok(())
    }
}

fn nonzero(value: i64) -> Option<String> {
    (value != 0).then(|| value.to_string())
}

fn players_or_owner(players: &[String], owner: &str) -> Vec<String> {
    if players.is_empty() {
        vec![owner.to_string()]
    } else {
        players.to_vec()
    }
}

fn init_store(
    data: &mut GameData,
    name: &str,
    attached_to: &str,
    kind: AttachmentKind,
    values: &[(&str, Option<String>)],
) -> Result<(), RuleError> {
    let key = StoreKey::new(OwnerKind::Player, attached_to, name);
    let store = data.ensure_store(key, kind);
    for (property, value) in values {
        let Some(value) = value else { continue };
        if *property == "chance" {
            Chance::parse(name, value)?;
        }
        let handle = PropertyHandle::resolve(kind, property)
            .ok_or_else(|| RuleError::unknown(name, "property", property))?;
        handle
            .set_raw(store, value)
            .map_err(|reason| RuleError::invalid(name, reason))?;
    }
    Ok(())
}
