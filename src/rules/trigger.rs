//! What a trigger does when it fires, parsed once at load, plus the use
//! bookkeeping that gates repeated firing.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::chance::Chance;
use super::condition::{Condition, ConditionId, ConditionMemo};
use super::defs::{PropertyEditDef, TriggerDef};
use super::error::{EngineError, RuleError};
use super::predicate::RelationshipSelector;
use super::syntax::{parse_bool, parse_count, split_on_colon};
use crate::bridge::Bridge;
use crate::model::{
    AttachmentKind, Change, GameData, OwnerKind, PropertyHandle, PropertyValue, StoreKey,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Phase {
    Before,
    After,
}

string_enum!(Phase {
    Before => "before",
    After => "after",
});

/// A point in the turn sequence a trigger is bound to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct When {
    pub phase: Phase,
    pub step: String,
}

impl When {
    pub fn before(step: impl Into<String>) -> Self {
        Self {
            phase: Phase::Before,
            step: step.into(),
        }
    }

    pub fn after(step: impl Into<String>) -> Self {
        Self {
            phase: Phase::After,
            step: step.into(),
        }
    }

    pub fn parse(name: &str, raw: &str) -> Result<Self, RuleError> {
        let (phase, step) = raw
            .split_once(':')
            .ok_or_else(|| RuleError::invalid(name, format!("when must be before:step or after:step, got '{raw}'")))?;
        let phase = Phase::parse(phase)
            .ok_or_else(|| RuleError::invalid(name, format!("when must start with before or after, got '{raw}'")))?;
        if step.is_empty() || step.contains(':') {
            return Err(RuleError::invalid(name, format!("when names one step, got '{raw}'")));
        }
        Ok(Self {
            phase,
            step: step.to_string(),
        })
    }
}

impl fmt::Display for When {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.phase, self.step)
    }
}

/// Property edit groups, in the order they are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EditCategory {
    Player,
    RelationshipType,
    Territory,
    TerritoryEffect,
    Unit,
}

impl EditCategory {
    pub const ALL: [EditCategory; 5] = [
        EditCategory::Player,
        EditCategory::RelationshipType,
        EditCategory::Territory,
        EditCategory::TerritoryEffect,
        EditCategory::Unit,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyEdit {
    pub property: PropertyHandle,
    pub value: String,
    pub clear_first: bool,
}

/// One category's edits and the stores they land in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyEdits {
    pub category: EditCategory,
    pub targets: Vec<StoreKey>,
    pub edits: Vec<PropertyEdit>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipChange {
    pub player1: String,
    pub player2: String,
    pub old: RelationshipSelector,
    pub new_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableTechEdit {
    pub category: String,
    pub tech: String,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductionRuleEdit {
    pub frontier: String,
    pub rule: String,
    pub add: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipChange {
    pub territories: Vec<String>,
    /// `None` matches any current owner.
    pub old_owner: Option<String>,
    pub new_owner: String,
    pub captured: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub target: ConditionId,
    pub target_name: String,
    pub times: u32,
    pub use_uses: bool,
    pub test_uses: bool,
    pub test_conditions: bool,
    pub test_chance: bool,
}

impl Activation {
    /// `name:times:useUses:testUses:testConditions:testChance`. `lookup`
    /// resolves trigger names only.
    pub fn parse(
        name: &str,
        own: ConditionId,
        raw: &str,
        lookup: impl Fn(&str) -> Option<ConditionId>,
    ) -> Result<Self, RuleError> {
        let tokens = split_on_colon(raw);
        let [target_name, times, use_uses, test_uses, test_conditions, test_chance] = tokens[..] else {
            return Err(RuleError::invalid(
                name,
                "activateTrigger must have 6 parts: triggerName:numberOfTimes:useUses:testUses:testConditions:testChance",
            ));
        };
        let target = lookup(target_name).ok_or_else(|| RuleError::unknown(name, "trigger", target_name))?;
        if target == own {
            return Err(RuleError::SelfActivation(name.to_string()));
        }
        Ok(Self {
            target,
            target_name: target_name.to_string(),
            times: parse_count(name, times)?,
            use_uses: parse_bool(name, use_uses)?,
            test_uses: parse_bool(name, test_uses)?,
            test_conditions: parse_bool(name, test_conditions)?,
            test_chance: parse_bool(name, test_chance)?,
        })
    }
}

/// Everything a trigger can do. Empty collections mean the trigger has no
/// effect in that category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerSpec {
    pub when: Vec<When>,
    pub notification: Option<String>,
    pub property_edits: Vec<PropertyEdits>,
    pub relationship_changes: Vec<RelationshipChange>,
    pub available_tech: Vec<AvailableTechEdit>,
    pub techs: Vec<String>,
    pub frontier: Option<String>,
    pub production_rules: Vec<ProductionRuleEdit>,
    /// Support name and whether it is granted.
    pub support: Vec<(String, bool)>,
    pub change_ownership: Vec<OwnershipChange>,
    /// Territory to unit counts by type.
    pub remove_units: BTreeMap<String, BTreeMap<String, u32>>,
    pub purchase: BTreeMap<String, u32>,
    pub placement: BTreeMap<String, BTreeMap<String, u32>>,
    pub resource: Option<(String, i64)>,
    /// Resolved by the loader once every trigger name is known.
    pub activations: Vec<Activation>,
    pub victory: Option<String>,
}

impl TriggerSpec {
    /// Parse every effect except activations, checking names against `data`.
    pub fn parse(
        def: &TriggerDef,
        players: &[String],
        data: &GameData,
        notifications: &BTreeMap<String, String>,
    ) -> Result<Self, RuleError> {
        let name = def.name.as_str();
        let mut spec = TriggerSpec {
            when: def
                .when
                .iter()
                .map(|w| When::parse(name, w))
                .collect::<Result<_, _>>()?,
            ..Default::default()
        };

        for key in def.notification.iter().chain(def.victory.iter()) {
            if !notifications.contains_key(key.trim()) {
                return Err(RuleError::unknown(name, "notification", key));
            }
        }
        spec.notification = def.notification.clone();
        spec.victory = def.victory.clone();

        let categories = [
            (EditCategory::Player, &def.player_property),
            (EditCategory::RelationshipType, &def.relationship_type_property),
            (EditCategory::Territory, &def.territory_property),
            (EditCategory::TerritoryEffect, &def.territory_effect_property),
            (EditCategory::Unit, &def.unit_property),
        ];
        for (category, edit_def) in categories {
            if let Some(edit_def) = edit_def {
                spec.property_edits
                    .push(parse_property_edits(name, category, edit_def, players, data)?);
            }
        }

        for raw in &def.relationship_change {
            spec.relationship_changes
                .push(parse_relationship_change(name, raw, data)?);
        }
        for raw in &def.available_tech {
            spec.available_tech.extend(parse_available_tech(name, raw, data)?);
        }
        for raw in &def.tech {
            for tech in split_on_colon(raw) {
                if !data.technologies.contains(tech) {
                    return Err(RuleError::unknown(name, "technology", tech));
                }
                spec.techs.push(tech.to_string());
            }
        }
        if let Some(frontier) = &def.frontier {
            if !data.frontiers.contains_key(frontier) {
                return Err(RuleError::unknown(name, "production frontier", frontier));
            }
            spec.frontier = Some(frontier.clone());
        }
        for raw in &def.production_rule {
            spec.production_rules
                .push(parse_production_rule(name, raw, data)?);
        }
        for raw in &def.support {
            for token in split_on_colon(raw) {
                let (support, granted) = match token.strip_prefix('-') {
                    Some(rest) => (rest, false),
                    None => (token, true),
                };
                if !data.unit_supports.contains_key(support) {
                    return Err(RuleError::unknown(name, "unit support", support));
                }
                spec.support.push((support.to_string(), granted));
            }
        }
        for raw in &def.change_ownership {
            spec.change_ownership
                .push(parse_change_ownership(name, raw, data)?);
        }
        for raw in &def.remove_units {
            parse_remove_units(name, raw, data, &mut spec.remove_units)?;
        }
        for raw in &def.purchase {
            let (count, rest) = counted_tokens(name, raw)?;
            if rest.is_empty() {
                return Err(RuleError::invalid(name, format!("empty purchase list '{raw}'")));
            }
            for unit_type in rest {
                check_unit_type(name, unit_type, data)?;
                *spec.purchase.entry(unit_type.to_string()).or_default() += count;
            }
        }
        for raw in &def.placement {
            let (count, rest) = counted_tokens(name, raw)?;
            let [territory, unit_types @ ..] = rest.as_slice() else {
                return Err(RuleError::invalid(name, format!("empty placement list '{raw}'")));
            };
            if !data.territories.contains_key(*territory) {
                return Err(RuleError::unknown(name, "territory", territory));
            }
            if unit_types.is_empty() {
                return Err(RuleError::invalid(name, format!("placement names no unit types: '{raw}'")));
            }
            let entry = spec.placement.entry(territory.to_string()).or_default();
            for unit_type in unit_types {
                check_unit_type(name, unit_type, data)?;
                *entry.entry(unit_type.to_string()).or_default() += count;
            }
        }
        if let Some(resource) = &def.resource {
            if !data.resources.contains(resource) {
                return Err(RuleError::unknown(name, "resource", resource));
            }
            spec.resource = Some((resource.clone(), def.resource_count.unwrap_or(0)));
        } else if def.resource_count.is_some() {
            return Err(RuleError::invalid(name, "resourceCount given without a resource"));
        }
        Ok(spec)
    }

    pub fn edits(&self, category: EditCategory) -> impl Iterator<Item = &PropertyEdits> {
        self.property_edits
            .iter()
            .filter(move |e| e.category == category)
    }
}

fn check_unit_type(name: &str, unit_type: &str, data: &GameData) -> Result<(), RuleError> {
    if data.unit_types.contains(unit_type) {
        Ok(())
    } else {
        Err(RuleError::unknown(name, "unit type", unit_type))
    }
}

/// Splits an optional leading count (default 1) off a list.
fn counted_tokens<'a>(name: &str, raw: &'a str) -> Result<(u32, Vec<&'a str>), RuleError> {
    let tokens = split_on_colon(raw);
    match tokens.first() {
        Some(first) if first.parse::<i64>().is_ok() => {
            Ok((parse_count(name, first)?, tokens[1..].to_vec()))
        }
        _ => Ok((1, tokens)),
    }
}

fn parse_remove_units(
    name: &str,
    raw: &str,
    data: &GameData,
    into: &mut BTreeMap<String, BTreeMap<String, u32>>,
) -> Result<(), RuleError> {
    let (count, rest) = counted_tokens(name, raw)?;
    let [territory, unit_types @ ..] = rest.as_slice() else {
        return Err(RuleError::invalid(name, format!("empty removeUnits list '{raw}'")));
    };
    let territories: Vec<String> = if territory.eq_ignore_ascii_case("all") {
        data.territories.keys().cloned().collect()
    } else if data.territories.contains_key(*territory) {
        vec![territory.to_string()]
    } else {
        return Err(RuleError::unknown(name, "territory", territory));
    };
    if unit_types.is_empty() {
        return Err(RuleError::invalid(name, format!("removeUnits names no unit types: '{raw}'")));
    }
    let mut types = Vec::new();
    for unit_type in unit_types {
        if unit_type.eq_ignore_ascii_case("all") {
            types.extend(data.unit_types.iter().cloned());
        } else {
            check_unit_type(name, unit_type, data)?;
            types.push(unit_type.to_string());
        }
    }
    for territory in territories {
        let entry = into.entry(territory).or_default();
        for unit_type in &types {
            *entry.entry(unit_type.clone()).or_default() += count;
        }
    }
    Ok(())
}

fn parse_relationship_change(
    name: &str,
    raw: &str,
    data: &GameData,
) -> Result<RelationshipChange, RuleError> {
    let tokens = split_on_colon(raw);
    let [player1, player2, old, new_type] = tokens[..] else {
        return Err(RuleError::invalid(
            name,
            format!("relationshipChange must be player1:player2:oldRelation:newRelation, got '{raw}'"),
        ));
    };
    for player in [player1, player2] {
        if !data.players.contains_key(player) {
            return Err(RuleError::unknown(name, "player", player));
        }
    }
    if !data.relationship_types.contains(new_type) {
        return Err(RuleError::unknown(name, "relationship type", new_type));
    }
    Ok(RelationshipChange {
        player1: player1.to_string(),
        player2: player2.to_string(),
        old: RelationshipSelector::parse_checked(name, old, data, true)?,
        new_type: new_type.to_string(),
    })
}

fn parse_available_tech(
    name: &str,
    raw: &str,
    data: &GameData,
) -> Result<Vec<AvailableTechEdit>, RuleError> {
    let tokens = split_on_colon(raw);
    let [category, techs @ ..] = tokens.as_slice() else {
        return Err(RuleError::invalid(name, "empty availableTech"));
    };
    if techs.is_empty() {
        return Err(RuleError::invalid(
            name,
            format!("availableTech must name a category and techs, got '{raw}'"),
        ));
    }
    techs
        .iter()
        .map(|token| {
            let (tech, available) = match token.strip_prefix('-') {
                Some(rest) => (rest, false),
                None => (*token, true),
            };
            if !data.technologies.contains(tech) {
                return Err(RuleError::unknown(name, "technology", tech));
            }
            Ok(AvailableTechEdit {
                category: category.to_string(),
                tech: tech.to_string(),
                available,
            })
        })
        .collect()
}

fn parse_production_rule(
    name: &str,
    raw: &str,
    data: &GameData,
) -> Result<ProductionRuleEdit, RuleError> {
    let tokens = split_on_colon(raw);
    let [frontier, rule] = tokens[..] else {
        return Err(RuleError::invalid(
            name,
            format!("productionRule must be frontier:rule, got '{raw}'"),
        ));
    };
    if !data.frontiers.contains_key(frontier) {
        return Err(RuleError::unknown(name, "production frontier", frontier));
    }
    let (rule, add) = match rule.strip_prefix('-') {
        Some(rest) => (rest, false),
        None => (rule, true),
    };
    if !data.production_rules.contains(rule) {
        return Err(RuleError::unknown(name, "production rule", rule));
    }
    Ok(ProductionRuleEdit {
        frontier: frontier.to_string(),
        rule: rule.to_string(),
        add,
    })
}

fn parse_change_ownership(
    name: &str,
    raw: &str,
    data: &GameData,
) -> Result<OwnershipChange, RuleError> {
    let tokens = split_on_colon(raw);
    let [territory, old_owner, new_owner, captured] = tokens[..] else {
        return Err(RuleError::invalid(
            name,
            format!("changeOwnership must be territory:oldOwner:newOwner:booleanCaptured, got '{raw}'"),
        ));
    };
    let territories = if territory.eq_ignore_ascii_case("all") {
        data.territories.keys().cloned().collect()
    } else if data.territories.contains_key(territory) {
        vec![territory.to_string()]
    } else {
        return Err(RuleError::unknown(name, "territory", territory));
    };
    let old_owner = if old_owner.eq_ignore_ascii_case("any") {
        None
    } else if data.players.contains_key(old_owner) {
        Some(old_owner.to_string())
    } else {
        return Err(RuleError::unknown(name, "player", old_owner));
    };
    if !data.players.contains_key(new_owner) {
        return Err(RuleError::unknown(name, "player", new_owner));
    }
    Ok(OwnershipChange {
        territories,
        old_owner,
        new_owner: new_owner.to_string(),
        captured: parse_bool(name, captured)?,
    })
}

/// `name` or `name:Kind` for player-owned attachments. Without a kind the
/// name's prefix decides.
fn player_attachment(name: &str, raw: Option<&str>) -> Result<(String, AttachmentKind), RuleError> {
    let Some(raw) = raw else {
        return Ok((
            AttachmentKind::Player.default_name().to_string(),
            AttachmentKind::Player,
        ));
    };
    if let Some((attachment, kind)) = raw.split_once(':') {
        let kind = AttachmentKind::parse(kind)
            .filter(|k| k.owner_kind() == OwnerKind::Player)
            .ok_or_else(|| RuleError::unknown(name, "player attachment kind", kind))?;
        return Ok((attachment.to_string(), kind));
    }
    let kind = if raw.starts_with("rules") || raw.starts_with("condition") {
        AttachmentKind::Rules
    } else if raw.starts_with("trigger") {
        AttachmentKind::Trigger
    } else {
        AttachmentKind::Player
    };
    Ok((raw.to_string(), kind))
}

fn parse_property_edits(
    name: &str,
    category: EditCategory,
    def: &PropertyEditDef,
    players: &[String],
    data: &GameData,
) -> Result<PropertyEdits, RuleError> {
    let (attachment, kind) = match category {
        EditCategory::Player => player_attachment(name, def.attachment.as_deref())?,
        other => {
            let kind = match other {
                EditCategory::RelationshipType => AttachmentKind::RelationshipType,
                EditCategory::Territory => AttachmentKind::Territory,
                EditCategory::TerritoryEffect => AttachmentKind::TerritoryEffect,
                _ => AttachmentKind::Unit,
            };
            let attachment = def
                .attachment
                .clone()
                .unwrap_or_else(|| kind.default_name().to_string());
            (attachment, kind)
        }
    };
    let owners: &[String] = if def.targets.is_empty() && category == EditCategory::Player {
        players
    } else {
        &def.targets
    };
    if owners.is_empty() {
        return Err(RuleError::invalid(name, "property change names no targets"));
    }

    let mut targets = Vec::with_capacity(owners.len());
    for owner in owners {
        let key = StoreKey::new(kind.owner_kind(), owner.clone(), attachment.clone());
        match data.store(&key) {
            Some(store) if store.kind == kind => targets.push(key),
            _ => return Err(RuleError::unknown(name, "attachment", &key.to_string())),
        }
    }

    let mut edits = Vec::with_capacity(def.edits.len());
    for raw in &def.edits {
        let (clear_first, body) = match raw
            .strip_prefix("-clear-")
            .or_else(|| raw.strip_prefix("-reset-"))
        {
            Some(rest) => (true, rest),
            None => (false, raw.as_str()),
        };
        let (value, property) = body.rsplit_once(':').ok_or_else(|| {
            RuleError::invalid(name, format!("property change must be value:property, got '{raw}'"))
        })?;
        let handle = PropertyHandle::resolve(kind, property)
            .ok_or_else(|| RuleError::unknown(name, "property", property))?;
        if !(clear_first && value.is_empty()) {
            handle
                .parse(value)
                .map_err(|reason| RuleError::invalid(name, reason))?;
            if property == "chance" {
                Chance::parse(name, value)?;
            }
        }
        edits.push(PropertyEdit {
            property: handle,
            value: value.to_string(),
            clear_first,
        });
    }
    Ok(PropertyEdits {
        category,
        targets,
        edits,
    })
}

/// Phase filter: phase-less triggers fire only outside a step, bound ones
/// only in a step they list.
pub fn when_matches(spec: &TriggerSpec, step: Option<&When>) -> bool {
    match step {
        None => spec.when.is_empty(),
        Some(step) => spec.when.iter().any(|w| w == step),
    }
}

pub fn uses(condition: &Condition, data: &GameData) -> i64 {
    data.store(&condition.store)
        .map(|s| s.int("uses"))
        .unwrap_or(-1)
}

pub fn used_this_round(condition: &Condition, data: &GameData) -> bool {
    data.store(&condition.store)
        .is_some_and(|s| s.flag("usedThisRound"))
}

/// `uses == 0` is exhausted; negative is unlimited.
pub fn has_uses(condition: &Condition, data: &GameData) -> bool {
    uses(condition, data) != 0
}

/// A `PropertySet` of one named property on a condition's own store.
pub(crate) fn property_change(
    condition: &Condition,
    property: &str,
    value: PropertyValue,
    data: &GameData,
) -> Result<Change, EngineError> {
    let handle = super::chance::handle(condition.attachment_kind(), property)?;
    let old = data
        .store(&condition.store)
        .and_then(|s| handle.stored(s).cloned());
    Ok(Change::PropertySet {
        store: condition.store.clone(),
        property: handle,
        old,
        new: Some(value),
    })
}

/// Latch a use of a phase-less trigger for this round. Uses are only spent
/// when the round ends, so every effect of one firing shares a single use.
pub fn use_trigger(condition: &Condition, bridge: &mut dyn Bridge) -> Result<(), EngineError> {
    let Some(spec) = condition.as_trigger() else {
        return Ok(());
    };
    let data = bridge.data();
    if !spec.when.is_empty() || used_this_round(condition, data) || uses(condition, data) <= 0 {
        return Ok(());
    }
    let change = property_change(condition, "usedThisRound", PropertyValue::Bool(true), data)?;
    bridge.add_change(change)?;
    Ok(())
}

/// Repeat count from counted children written with `each`.
pub fn each_multiple(condition: &Condition, memo: &ConditionMemo) -> u32 {
    condition
        .children
        .iter()
        .filter_map(|child| memo.get(*child))
        .filter(|outcome| outcome.satisfied)
        .filter_map(|outcome| outcome.multiplier)
        .fold(1, u32::max)
}
