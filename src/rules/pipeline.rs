//! Firing satisfied triggers.
//!
//! A firing runs effect categories in a fixed order. Each category scans the
//! whole trigger set in id order before the next one starts, so for example
//! every purchase of a pass lands before any victory is declared.

use std::collections::{BTreeMap, BTreeSet};

use super::chance::test_chance;
use super::condition::{Condition, ConditionId, ConditionMemo};
use super::error::EngineError;
use super::graph::{collect_closure, test_closure};
use super::loader::RuleSet;
use super::notification::{
    DEFEAT_SOUND, NOTIFICATION_SOUND, VICTORY_SOUND, name_list, shorten_for_history,
};
use super::params::FireTriggerParams;
use super::predicate::RelationshipSelector;
use super::trigger::{
    EditCategory, TriggerSpec, When, each_multiple, has_uses, property_change, use_trigger,
    used_this_round, uses, when_matches,
};
use crate::bridge::{Bridge, DryRunBridge};
use crate::model::{
    AttributeStore, Change, ChangeError, GameData, GameOver, PUS, PropertyHandle, PropertyValue,
    Relationship, StoreKey, Unit,
};

const NOTIFICATION_TITLE: &str = "Notification";

/// What a firing pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FireReport {
    /// Triggers that passed their chance, in firing order. Activated
    /// triggers are included.
    pub fired: Vec<String>,
    /// Resource lines, each ending in `" <br />"`.
    pub resource_report: String,
    pub game_over: Option<GameOver>,
}

/// Fire `triggers` against an existing memo. The memo is extended when
/// conditions get tested during the pass.
pub fn fire_triggers(
    rules: &RuleSet,
    triggers: &BTreeSet<ConditionId>,
    memo: &mut ConditionMemo,
    bridge: &mut dyn Bridge,
    params: &FireTriggerParams,
) -> Result<FireReport, EngineError> {
    let mut firing = Firing {
        rules,
        activating: Vec::new(),
        report: FireReport::default(),
    };
    firing.fire(triggers, memo, bridge, params)?;
    Ok(firing.report)
}

/// Triggers attached to any of `players` that pass `filter`.
pub fn collect_for_all_triggers_matching(
    rules: &RuleSet,
    players: &[String],
    filter: impl Fn(&Condition, &TriggerSpec) -> bool,
) -> BTreeSet<ConditionId> {
    rules
        .triggers()
        .filter(|t| players.contains(&t.attached_to))
        .filter(|t| t.as_trigger().is_some_and(|spec| filter(t, spec)))
        .map(|t| t.id)
        .collect()
}

/// Test the closure of `triggers`, skipping anything already in `memo`.
pub fn collect_tests_for_all_triggers(
    rules: &RuleSet,
    triggers: &BTreeSet<ConditionId>,
    memo: ConditionMemo,
    bridge: &mut dyn Bridge,
) -> Result<ConditionMemo, EngineError> {
    let tested: BTreeSet<ConditionId> = memo.iter().map(|(id, _)| id).collect();
    let closure = collect_closure(rules, triggers.iter().copied(), BTreeSet::new());
    let untested: BTreeSet<ConditionId> = closure.difference(&tested).copied().collect();
    test_closure(rules, &untested, memo, bridge)
}

/// The per-step entry point: gather this step's triggers for `players`, test
/// them and fire the satisfied ones with every gate on.
pub fn collect_and_fire_triggers(
    rules: &RuleSet,
    bridge: &mut dyn Bridge,
    players: &[String],
    step: Option<When>,
    filter: impl Fn(&Condition, &TriggerSpec) -> bool,
) -> Result<FireReport, EngineError> {
    let possible = {
        let data = bridge.data();
        collect_for_all_triggers_matching(rules, players, |t, spec| {
            when_matches(spec, step.as_ref()) && has_uses(t, data) && filter(t, spec)
        })
    };
    if possible.is_empty() {
        return Ok(FireReport::default());
    }
    let mut memo = collect_tests_for_all_triggers(rules, &possible, ConditionMemo::new(), bridge)?;
    let mut satisfied = BTreeSet::new();
    for id in possible {
        if rules.condition(id).is_satisfied(&memo)? {
            satisfied.insert(id);
        }
    }
    if satisfied.is_empty() {
        tracing::debug!(step = ?step, "no satisfied triggers");
        return Ok(FireReport::default());
    }
    fire_triggers(
        rules,
        &satisfied,
        &mut memo,
        bridge,
        &FireTriggerParams::all(step),
    )
}

/// What the resource effects of the satisfied `triggers` would add, per
/// player and resource, without touching `data` or rolling dice.
pub fn project_resource_income(
    rules: &RuleSet,
    triggers: &BTreeSet<ConditionId>,
    memo: &ConditionMemo,
    data: &GameData,
) -> Result<BTreeMap<String, BTreeMap<String, i64>>, EngineError> {
    let mut satisfied = Vec::new();
    for id in triggers {
        if rules.condition(*id).is_satisfied(memo)? {
            satisfied.push(*id);
        }
    }
    let mut bridge = DryRunBridge::new(data);
    let mut firing = Firing {
        rules,
        activating: Vec::new(),
        report: FireReport::default(),
    };
    let params = FireTriggerParams {
        test_uses: true,
        ..FireTriggerParams::none()
    };
    firing.resources(&satisfied, memo, &mut bridge, &params)?;

    let mut income: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
    for change in bridge.discarded() {
        if let Change::ResourceChanged {
            player,
            resource,
            delta,
        } = change
        {
            *income
                .entry(player.clone())
                .or_default()
                .entry(resource.clone())
                .or_default() += delta;
        }
    }
    Ok(income)
}

/// Spend the latched use of every phase-less trigger that fired this round.
pub fn end_of_round_uses_sweep(rules: &RuleSet, bridge: &mut dyn Bridge) -> Result<(), EngineError> {
    let mut changes = Vec::new();
    let data = bridge.data();
    for trigger in rules.triggers() {
        if !used_this_round(trigger, data) {
            continue;
        }
        let remaining = uses(trigger, data);
        if remaining > 0 {
            changes.push(property_change(
                trigger,
                "uses",
                PropertyValue::Int(remaining - 1),
                data,
            )?);
        }
        changes.push(property_change(
            trigger,
            "usedThisRound",
            PropertyValue::Bool(false),
            data,
        )?);
    }
    if changes.is_empty() {
        return Ok(());
    }
    bridge.start_event("Setting uses for triggers used this round.", &[]);
    bridge.add_change(Change::Composite { changes })?;
    Ok(())
}

/// Units as `"2 armour, 1 infantry"`.
fn units_text(units: &[Unit]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for unit in units {
        *counts.entry(unit.unit_type.as_str()).or_default() += 1;
    }
    counts
        .iter()
        .map(|(unit_type, n)| format!("{n} {unit_type}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn rejected(store: &StoreKey, property: PropertyHandle, reason: String) -> EngineError {
    EngineError::Change(ChangeError::Property {
        store: store.clone(),
        property: property.name().to_string(),
        reason,
    })
}

fn add(bridge: &mut dyn Bridge, mut changes: Vec<Change>) -> Result<(), EngineError> {
    let change = match changes.len() {
        0 => return Ok(()),
        1 => changes.remove(0),
        _ => Change::Composite { changes },
    };
    bridge.add_change(change)?;
    Ok(())
}

struct Firing<'r> {
    rules: &'r RuleSet,
    /// Triggers whose activations are being processed, outermost first.
    activating: Vec<ConditionId>,
    report: FireReport,
}

impl<'r> Firing<'r> {
    fn fire(
        &mut self,
        triggers: &BTreeSet<ConditionId>,
        memo: &mut ConditionMemo,
        bridge: &mut dyn Bridge,
        params: &FireTriggerParams,
    ) -> Result<(), EngineError> {
        let mut candidates: Vec<ConditionId> = triggers.iter().copied().collect();
        if params.test_conditions {
            let tested = collect_tests_for_all_triggers(
                self.rules,
                triggers,
                std::mem::take(memo),
                bridge,
            )?;
            *memo = tested;
            let mut satisfied = Vec::with_capacity(candidates.len());
            for id in candidates {
                if self.rules.condition(id).is_satisfied(memo)? {
                    satisfied.push(id);
                }
            }
            candidates = satisfied;
        }

        let mut to_fire = Vec::with_capacity(candidates.len());
        for id in candidates {
            let trigger = self.rules.condition(id);
            if params.test_chance && !test_chance(trigger, bridge)? {
                continue;
            }
            to_fire.push(id);
        }
        if to_fire.is_empty() {
            return Ok(());
        }
        self.report
            .fired
            .extend(to_fire.iter().map(|id| self.rules.condition(*id).name.clone()));
        tracing::debug!(count = to_fire.len(), step = ?params.step, "firing triggers");

        let params_no_chance = params.without_chance();
        let params = &params_no_chance;
        self.notifications(&to_fire, bridge, params)?;
        for category in EditCategory::ALL {
            self.property_edits(category, &to_fire, bridge, params)?;
        }
        self.relationship_changes(&to_fire, bridge, params)?;
        self.available_tech(&to_fire, bridge, params)?;
        self.techs(&to_fire, bridge, params)?;
        self.frontiers(&to_fire, bridge, params)?;
        self.production_rules(&to_fire, bridge, params)?;
        self.support(&to_fire, bridge, params)?;
        self.change_ownership(&to_fire, bridge, params)?;
        self.remove_units(&to_fire, memo, bridge, params)?;
        self.purchase(&to_fire, memo, bridge, params)?;
        self.placement(&to_fire, memo, bridge, params)?;
        self.resources(&to_fire, memo, bridge, params)?;
        self.activations(&to_fire, memo, bridge, params)?;
        self.victory(&to_fire, bridge, params)?;

        if params.use_uses {
            self.spend_phase_uses(&to_fire, bridge)?;
        }
        Ok(())
    }

    /// Triggers of `set` that have an effect of interest and pass the phase
    /// and uses gates.
    fn matching(
        &self,
        set: &[ConditionId],
        data: &GameData,
        params: &FireTriggerParams,
        has: impl Fn(&TriggerSpec) -> bool,
    ) -> Vec<(&'r Condition, &'r TriggerSpec)> {
        let rules = self.rules;
        set.iter()
            .map(|id| rules.condition(*id))
            .filter_map(|t| t.as_trigger().map(|spec| (t, spec)))
            .filter(|(_, spec)| has(spec))
            .filter(|(_, spec)| !params.test_when || when_matches(spec, params.step.as_ref()))
            .filter(|(t, _)| !params.test_uses || has_uses(t, data))
            .collect()
    }

    /// Chance (if still tested) and the use latch, per trigger and category.
    fn admit(
        trigger: &Condition,
        bridge: &mut dyn Bridge,
        params: &FireTriggerParams,
    ) -> Result<bool, EngineError> {
        if params.test_chance && !test_chance(trigger, bridge)? {
            return Ok(false);
        }
        if params.use_uses {
            use_trigger(trigger, bridge)?;
        }
        Ok(true)
    }

    fn notifications(
        &mut self,
        set: &[ConditionId],
        bridge: &mut dyn Bridge,
        params: &FireTriggerParams,
    ) -> Result<(), EngineError> {
        let triggers = self.matching(set, bridge.data(), params, |s| s.notification.is_some());
        let mut seen = BTreeSet::new();
        for (trigger, spec) in triggers {
            if !Self::admit(trigger, bridge, params)? {
                continue;
            }
            let Some(key) = spec.notification.as_deref().map(str::trim) else {
                continue;
            };
            if !seen.insert(key) {
                continue;
            }
            let Some(message) = self.rules.notifications().message(key) else {
                tracing::warn!(trigger = %trigger.name, key, "notification has no message");
                continue;
            };
            let everyone = bridge
                .data()
                .players
                .keys()
                .all(|p| trigger.players.contains(p));
            bridge.play_sound_to_players(
                &format!("{NOTIFICATION_SOUND}{key}"),
                &trigger.players,
                &[],
                everyone,
            );
            let record = shorten_for_history(message, bridge.config().notification_history_limit);
            bridge.start_event(
                &format!("Note to players {}: {}", name_list(&trigger.players), record),
                &[],
            );
            bridge.report_message_to_players(
                &trigger.players,
                &[],
                &format!("<html>{message}</html>"),
                NOTIFICATION_TITLE,
            );
        }
        Ok(())
    }

    fn property_edits(
        &mut self,
        category: EditCategory,
        set: &[ConditionId],
        bridge: &mut dyn Bridge,
        params: &FireTriggerParams,
    ) -> Result<(), EngineError> {
        let triggers = self.matching(set, bridge.data(), params, |s| {
            s.edits(category).next().is_some()
        });
        // Edits of one category land together, so later edits read the
        // values earlier ones will have written.
        let mut pending: BTreeMap<StoreKey, AttributeStore> = BTreeMap::new();
        let mut changes = Vec::new();
        for (trigger, spec) in triggers {
            if !Self::admit(trigger, bridge, params)? {
                continue;
            }
            for group in spec.edits(category) {
                for target in &group.targets {
                    if !pending.contains_key(target) {
                        let Some(store) = bridge.data().store(target) else {
                            tracing::warn!(trigger = %trigger.name, %target, "attachment vanished");
                            continue;
                        };
                        pending.insert(target.clone(), store.clone());
                    }
                    let Some(store) = pending.get_mut(target) else {
                        continue;
                    };
                    for edit in &group.edits {
                        let property = edit.property;
                        if edit.value == property.get_raw(store) {
                            continue;
                        }
                        let old = property.stored(store).cloned();
                        let new = if edit.clear_first && edit.value.is_empty() {
                            None
                        } else {
                            let value = property
                                .value_after_set(store, &edit.value, edit.clear_first)
                                .map_err(|reason| rejected(target, property, reason))?;
                            Some(value)
                        };
                        match &new {
                            Some(value) => property
                                .set(store, value.clone())
                                .map_err(|reason| rejected(target, property, reason))?,
                            None => property.reset(store),
                        }
                        let shown = if edit.value.is_empty() {
                            "cleared".to_string()
                        } else {
                            format!("to {}", edit.value)
                        };
                        bridge.start_event(
                            &format!(
                                "{}: Setting {} {} for {}",
                                trigger.name,
                                property.name(),
                                shown,
                                target
                            ),
                            &[],
                        );
                        changes.push(Change::PropertySet {
                            store: target.clone(),
                            property,
                            old,
                            new,
                        });
                    }
                }
            }
        }
        add(bridge, changes)
    }

    fn relationship_changes(
        &mut self,
        set: &[ConditionId],
        bridge: &mut dyn Bridge,
        params: &FireTriggerParams,
    ) -> Result<(), EngineError> {
        let triggers = self.matching(set, bridge.data(), params, |s| {
            !s.relationship_changes.is_empty()
        });
        for (trigger, spec) in triggers {
            if !Self::admit(trigger, bridge, params)? {
                continue;
            }
            for rc in &spec.relationship_changes {
                let data = bridge.data();
                let current = data.relationship(&rc.player1, &rc.player2).cloned();
                let matches = match (&rc.old, &current) {
                    (RelationshipSelector::Any, _) => true,
                    (_, None) => false,
                    (selector, Some(r)) => selector.matches(data, &r.relationship_type),
                };
                if !matches {
                    continue;
                }
                let new = Relationship {
                    relationship_type: rc.new_type.clone(),
                    round_created: data.round,
                };
                let from = current
                    .as_ref()
                    .map(|r| r.relationship_type.clone())
                    .unwrap_or_else(|| "none".to_string());
                bridge.start_event(
                    &format!(
                        "{}: Changing Relationship for {} and {} from {} to {}",
                        trigger.name, rc.player1, rc.player2, from, rc.new_type
                    ),
                    &[rc.player1.clone(), rc.player2.clone()],
                );
                bridge.add_change(Change::RelationshipChanged {
                    player1: rc.player1.clone(),
                    player2: rc.player2.clone(),
                    old: current,
                    new: Some(new),
                })?;
            }
        }
        Ok(())
    }

    fn available_tech(
        &mut self,
        set: &[ConditionId],
        bridge: &mut dyn Bridge,
        params: &FireTriggerParams,
    ) -> Result<(), EngineError> {
        let triggers = self.matching(set, bridge.data(), params, |s| !s.available_tech.is_empty());
        for (trigger, spec) in triggers {
            if !Self::admit(trigger, bridge, params)? {
                continue;
            }
            for player in &trigger.players {
                for edit in &spec.available_tech {
                    let has = bridge
                        .data()
                        .player(player)
                        .and_then(|p| p.available_techs.get(&edit.category))
                        .is_some_and(|techs| techs.contains(&edit.tech));
                    if has == edit.available {
                        continue;
                    }
                    let verb = if edit.available { "gains access to" } else { "loses access to" };
                    bridge.start_event(
                        &format!("{}: {} {} {}", trigger.name, player, verb, edit.tech),
                        std::slice::from_ref(player),
                    );
                    bridge.add_change(Change::AvailableTechChanged {
                        player: player.clone(),
                        category: edit.category.clone(),
                        tech: edit.tech.clone(),
                        available: edit.available,
                    })?;
                }
            }
        }
        Ok(())
    }

    fn techs(
        &mut self,
        set: &[ConditionId],
        bridge: &mut dyn Bridge,
        params: &FireTriggerParams,
    ) -> Result<(), EngineError> {
        let triggers = self.matching(set, bridge.data(), params, |s| !s.techs.is_empty());
        for (trigger, spec) in triggers {
            if !Self::admit(trigger, bridge, params)? {
                continue;
            }
            for player in &trigger.players {
                for tech in &spec.techs {
                    let known = bridge
                        .data()
                        .player(player)
                        .is_some_and(|p| p.techs.contains(tech));
                    if known {
                        continue;
                    }
                    bridge.start_event(
                        &format!("{}: {} activates {}", trigger.name, player, tech),
                        std::slice::from_ref(player),
                    );
                    bridge.add_change(Change::TechChanged {
                        player: player.clone(),
                        tech: tech.clone(),
                        known: true,
                    })?;
                }
            }
        }
        Ok(())
    }

    fn frontiers(
        &mut self,
        set: &[ConditionId],
        bridge: &mut dyn Bridge,
        params: &FireTriggerParams,
    ) -> Result<(), EngineError> {
        let triggers = self.matching(set, bridge.data(), params, |s| s.frontier.is_some());
        for (trigger, spec) in triggers {
            if !Self::admit(trigger, bridge, params)? {
                continue;
            }
            let Some(frontier) = &spec.frontier else { continue };
            for player in &trigger.players {
                let old = bridge.data().player(player).and_then(|p| p.frontier.clone());
                bridge.add_change(Change::FrontierChanged {
                    player: player.clone(),
                    old,
                    new: Some(frontier.clone()),
                })?;
                bridge.start_event(
                    &format!(
                        "{}: {} has their production frontier changed to: {}",
                        trigger.name, player, frontier
                    ),
                    std::slice::from_ref(player),
                );
            }
        }
        Ok(())
    }

    fn production_rules(
        &mut self,
        set: &[ConditionId],
        bridge: &mut dyn Bridge,
        params: &FireTriggerParams,
    ) -> Result<(), EngineError> {
        let triggers = self.matching(set, bridge.data(), params, |s| !s.production_rules.is_empty());
        let mut pending: BTreeMap<(&str, &str), bool> = BTreeMap::new();
        let mut changes = Vec::new();
        for (trigger, spec) in triggers {
            if !Self::admit(trigger, bridge, params)? {
                continue;
            }
            for edit in &spec.production_rules {
                let key = (edit.frontier.as_str(), edit.rule.as_str());
                let present = pending.get(&key).copied().unwrap_or_else(|| {
                    bridge
                        .data()
                        .frontiers
                        .get(&edit.frontier)
                        .is_some_and(|rules| rules.contains(&edit.rule))
                });
                if present == edit.add {
                    continue;
                }
                pending.insert(key, edit.add);
                let verb = if edit.add { "added to" } else { "removed from" };
                bridge.start_event(
                    &format!("{}: {} {} {}", trigger.name, edit.rule, verb, edit.frontier),
                    &[],
                );
                changes.push(Change::ProductionRuleChanged {
                    frontier: edit.frontier.clone(),
                    rule: edit.rule.clone(),
                    present: edit.add,
                });
            }
        }
        add(bridge, changes)
    }

    fn support(
        &mut self,
        set: &[ConditionId],
        bridge: &mut dyn Bridge,
        params: &FireTriggerParams,
    ) -> Result<(), EngineError> {
        let triggers = self.matching(set, bridge.data(), params, |s| !s.support.is_empty());
        let mut pending: BTreeMap<(&str, &str), bool> = BTreeMap::new();
        let mut changes = Vec::new();
        for (trigger, spec) in triggers {
            if !Self::admit(trigger, bridge, params)? {
                continue;
            }
            for player in &trigger.players {
                for (support, granted) in &spec.support {
                    let key = (support.as_str(), player.as_str());
                    let current = pending.get(&key).copied().unwrap_or_else(|| {
                        bridge
                            .data()
                            .unit_supports
                            .get(support)
                            .is_some_and(|players| players.contains(player))
                    });
                    if current == *granted {
                        continue;
                    }
                    pending.insert(key, *granted);
                    let verb = if *granted { "is added to" } else { "is removed from" };
                    bridge.start_event(
                        &format!("{}: {} {} {}", trigger.name, player, verb, support),
                        std::slice::from_ref(player),
                    );
                    changes.push(Change::SupportChanged {
                        support: support.clone(),
                        player: player.clone(),
                        granted: *granted,
                    });
                }
            }
        }
        add(bridge, changes)
    }

    fn change_ownership(
        &mut self,
        set: &[ConditionId],
        bridge: &mut dyn Bridge,
        params: &FireTriggerParams,
    ) -> Result<(), EngineError> {
        let triggers = self.matching(set, bridge.data(), params, |s| !s.change_ownership.is_empty());
        for (trigger, spec) in triggers {
            if !Self::admit(trigger, bridge, params)? {
                continue;
            }
            for oc in &spec.change_ownership {
                for name in &oc.territories {
                    let data = bridge.data();
                    let Some(territory) = data.territory(name) else { continue };
                    if data.territory_attachment(name).is_none() {
                        continue;
                    }
                    if oc
                        .old_owner
                        .as_ref()
                        .is_some_and(|old| territory.owner.as_ref() != Some(old))
                    {
                        continue;
                    }
                    let mut changes = vec![Change::OwnerChanged {
                        territory: name.clone(),
                        old: territory.owner.clone(),
                        new: Some(oc.new_owner.clone()),
                    }];
                    let mut plunder = None;
                    if oc.captured {
                        changes.extend(capture_units(data, name, &oc.new_owner));
                        plunder = capital_plunder(data, name, &oc.new_owner);
                    }
                    let verb = if oc.captured {
                        "captures territory"
                    } else {
                        "takes ownership of territory"
                    };
                    bridge.start_event(
                        &format!("{}: {} {} {}", trigger.name, oc.new_owner, verb, name),
                        std::slice::from_ref(&oc.new_owner),
                    );
                    if let Some((victim, amount)) = plunder {
                        bridge.start_event(
                            &format!(
                                "{} captures {} {} while taking {}'s capital",
                                oc.new_owner, amount, PUS, victim
                            ),
                            &[oc.new_owner.clone(), victim.clone()],
                        );
                        changes.push(Change::ResourceChanged {
                            player: victim,
                            resource: PUS.to_string(),
                            delta: -amount,
                        });
                        changes.push(Change::ResourceChanged {
                            player: oc.new_owner.clone(),
                            resource: PUS.to_string(),
                            delta: amount,
                        });
                    }
                    add(bridge, changes)?;
                }
            }
        }
        Ok(())
    }

    fn remove_units(
        &mut self,
        set: &[ConditionId],
        memo: &ConditionMemo,
        bridge: &mut dyn Bridge,
        params: &FireTriggerParams,
    ) -> Result<(), EngineError> {
        let triggers = self.matching(set, bridge.data(), params, |s| !s.remove_units.is_empty());
        for (trigger, spec) in triggers {
            if !Self::admit(trigger, bridge, params)? {
                continue;
            }
            let each = each_multiple(trigger, memo);
            for player in &trigger.players {
                for _ in 0..each {
                    for (name, types) in &spec.remove_units {
                        let Some(territory) = bridge.data().territory(name) else { continue };
                        let mut removed: Vec<Unit> = Vec::new();
                        for (unit_type, count) in types {
                            removed.extend(
                                territory
                                    .units
                                    .iter()
                                    .filter(|u| &u.owner == player && &u.unit_type == unit_type)
                                    .take(*count as usize)
                                    .cloned(),
                            );
                        }
                        if removed.is_empty() {
                            continue;
                        }
                        bridge.start_event(
                            &format!(
                                "{}: has removed {} owned by {} in {}",
                                trigger.name,
                                units_text(&removed),
                                player,
                                name
                            ),
                            std::slice::from_ref(player),
                        );
                        bridge.add_change(Change::UnitsRemovedFromTerritory {
                            territory: name.clone(),
                            units: removed,
                        })?;
                    }
                }
            }
        }
        Ok(())
    }

    fn purchase(
        &mut self,
        set: &[ConditionId],
        memo: &ConditionMemo,
        bridge: &mut dyn Bridge,
        params: &FireTriggerParams,
    ) -> Result<(), EngineError> {
        let triggers = self.matching(set, bridge.data(), params, |s| !s.purchase.is_empty());
        for (trigger, spec) in triggers {
            if !Self::admit(trigger, bridge, params)? {
                continue;
            }
            let each = each_multiple(trigger, memo);
            for player in &trigger.players {
                for _ in 0..each {
                    let mut units = Vec::new();
                    for (unit_type, count) in &spec.purchase {
                        units.extend(bridge.create_units(unit_type, *count as usize, player));
                    }
                    if units.is_empty() {
                        continue;
                    }
                    bridge.start_event(
                        &format!("{}: {} gained by {}", trigger.name, units_text(&units), player),
                        std::slice::from_ref(player),
                    );
                    bridge.add_change(Change::UnitsAddedToPlayer {
                        player: player.clone(),
                        units,
                    })?;
                }
            }
        }
        Ok(())
    }

    fn placement(
        &mut self,
        set: &[ConditionId],
        memo: &ConditionMemo,
        bridge: &mut dyn Bridge,
        params: &FireTriggerParams,
    ) -> Result<(), EngineError> {
        let triggers = self.matching(set, bridge.data(), params, |s| !s.placement.is_empty());
        for (trigger, spec) in triggers {
            if !Self::admit(trigger, bridge, params)? {
                continue;
            }
            let each = each_multiple(trigger, memo);
            for player in &trigger.players {
                for _ in 0..each {
                    for (territory, types) in &spec.placement {
                        let mut units = Vec::new();
                        for (unit_type, count) in types {
                            units.extend(bridge.create_units(unit_type, *count as usize, player));
                        }
                        if units.is_empty() {
                            continue;
                        }
                        for unit in &mut units {
                            if bridge.data().unit_flag(&unit.unit_type, "isInfrastructure") {
                                unit.original_owner = Some(player.clone());
                            }
                        }
                        bridge.start_event(
                            &format!(
                                "{}: {} has {} placed in {}",
                                trigger.name,
                                player,
                                units_text(&units),
                                territory
                            ),
                            std::slice::from_ref(player),
                        );
                        bridge.add_change(Change::UnitsAddedToTerritory {
                            territory: territory.clone(),
                            units,
                        })?;
                    }
                }
            }
        }
        Ok(())
    }

    fn resources(
        &mut self,
        set: &[ConditionId],
        memo: &ConditionMemo,
        bridge: &mut dyn Bridge,
        params: &FireTriggerParams,
    ) -> Result<(), EngineError> {
        let triggers = self.matching(set, bridge.data(), params, |s| s.resource.is_some());
        for (trigger, spec) in triggers {
            if !Self::admit(trigger, bridge, params)? {
                continue;
            }
            let Some((resource, count)) = &spec.resource else { continue };
            let each = each_multiple(trigger, memo);
            for player in &trigger.players {
                for _ in 0..each {
                    let data = bridge.data();
                    let mut to_add = *count;
                    if resource == PUS {
                        to_add *= data.int_property("puMultiplier", 1);
                    }
                    let current = data.player(player).map(|p| p.resource(resource)).unwrap_or(0);
                    let mut total = current + to_add;
                    if total < 0 {
                        to_add -= total;
                        total = 0;
                    }
                    let line = format!(
                        "{}: {} met a national objective for an additional {} {}; end with {} {}",
                        trigger.name, player, count, resource, total, resource
                    );
                    bridge.add_change(Change::ResourceChanged {
                        player: player.clone(),
                        resource: resource.clone(),
                        delta: to_add,
                    })?;
                    bridge.start_event(&line, std::slice::from_ref(player));
                    self.report.resource_report.push_str(&line);
                    self.report.resource_report.push_str(" <br />");
                }
            }
        }
        Ok(())
    }

    fn activations(
        &mut self,
        set: &[ConditionId],
        memo: &mut ConditionMemo,
        bridge: &mut dyn Bridge,
        params: &FireTriggerParams,
    ) -> Result<(), EngineError> {
        let triggers = self.matching(set, bridge.data(), params, |s| !s.activations.is_empty());
        for (trigger, spec) in triggers {
            if !Self::admit(trigger, bridge, params)? {
                continue;
            }
            let each = each_multiple(trigger, memo);
            self.activating.push(trigger.id);
            for activation in &spec.activations {
                if self.activating.contains(&activation.target) {
                    let mut names: Vec<String> = self
                        .activating
                        .iter()
                        .map(|id| self.rules.condition(*id).name.clone())
                        .collect();
                    names.push(activation.target_name.clone());
                    return Err(EngineError::ActivationCycle(names));
                }
                let target = self.rules.get(activation.target).ok_or_else(|| {
                    EngineError::UnknownTrigger(activation.target_name.clone())
                })?;
                if activation.test_conditions {
                    if !memo.contains(target.id) {
                        let single = BTreeSet::from([target.id]);
                        *memo = collect_tests_for_all_triggers(
                            self.rules,
                            &single,
                            std::mem::take(memo),
                            bridge,
                        )?;
                    }
                    if !target.is_satisfied(memo)? {
                        continue;
                    }
                }
                let nested = FireTriggerParams {
                    step: params.step.clone(),
                    use_uses: activation.use_uses,
                    test_uses: activation.test_uses,
                    test_chance: activation.test_chance,
                    test_when: false,
                    test_conditions: false,
                };
                let single = BTreeSet::from([target.id]);
                for _ in 0..activation.times * each {
                    bridge.start_event(
                        &format!(
                            "{} activates a trigger called: {}",
                            trigger.name, target.name
                        ),
                        &[],
                    );
                    self.fire(&single, memo, bridge, &nested)?;
                }
            }
            self.activating.pop();
        }
        Ok(())
    }

    fn victory(
        &mut self,
        set: &[ConditionId],
        bridge: &mut dyn Bridge,
        params: &FireTriggerParams,
    ) -> Result<(), EngineError> {
        let triggers = self.matching(set, bridge.data(), params, |s| s.victory.is_some());
        for (trigger, spec) in triggers {
            if !Self::admit(trigger, bridge, params)? {
                continue;
            }
            let Some(key) = spec.victory.as_deref().map(str::trim) else { continue };
            let Some(message) = self.rules.notifications().message(key) else {
                tracing::warn!(trigger = %trigger.name, key, "victory has no message");
                continue;
            };
            let everyone: Vec<String> = bridge.data().players.keys().cloned().collect();
            bridge.play_sound_to_players(&format!("{VICTORY_SOUND}{key}"), &trigger.players, &[], true);
            bridge.play_sound_to_players(
                &format!("{DEFEAT_SOUND}{key}"),
                &everyone,
                &trigger.players,
                false,
            );
            let record = shorten_for_history(message, bridge.config().victory_history_limit);
            bridge.start_event(
                &format!(
                    "Players: {} have just won the game, with this victory: {}",
                    name_list(&trigger.players),
                    record
                ),
                &trigger.players,
            );
            let game_over = GameOver {
                winners: trigger.players.clone(),
                message: message.trim().to_string(),
            };
            let old = bridge.data().game_over.clone();
            bridge.add_change(Change::GameOverChanged {
                old,
                new: Some(game_over.clone()),
            })?;
            tracing::debug!(trigger = %trigger.name, winners = ?game_over.winners, "game over");
            self.report.game_over = Some(game_over);
        }
        Ok(())
    }

    /// Phase-bound triggers spend a use as soon as their pass ends.
    fn spend_phase_uses(
        &mut self,
        fired: &[ConditionId],
        bridge: &mut dyn Bridge,
    ) -> Result<(), EngineError> {
        let data = bridge.data();
        let mut changes = Vec::new();
        for id in fired {
            let trigger = self.rules.condition(*id);
            let Some(spec) = trigger.as_trigger() else { continue };
            let remaining = uses(trigger, data);
            if remaining <= 0 || spec.when.is_empty() {
                continue;
            }
            changes.push(property_change(
                trigger,
                "uses",
                PropertyValue::Int(remaining - 1),
                data,
            )?);
            if used_this_round(trigger, data) {
                changes.push(property_change(
                    trigger,
                    "usedThisRound",
                    PropertyValue::Bool(false),
                    data,
                )?);
            }
        }
        if changes.is_empty() {
            return Ok(());
        }
        bridge.start_event("Setting uses for triggers used this phase.", &[]);
        bridge.add_change(Change::Composite { changes })?;
        Ok(())
    }
}

/// Infrastructure in `territory` owned by players at war with `new_owner`
/// changes hands with the territory.
fn capture_units(data: &GameData, territory: &str, new_owner: &str) -> Vec<Change> {
    let Some(t) = data.territory(territory) else {
        return Vec::new();
    };
    t.units
        .iter()
        .filter(|u| data.unit_flag(&u.unit_type, "isInfrastructure"))
        .filter(|u| data.is_at_war(&u.owner, new_owner))
        .map(|u| Change::UnitOwnerChanged {
            territory: territory.to_string(),
            unit: u.id,
            old: u.owner.clone(),
            new: new_owner.to_string(),
        })
        .collect()
}

/// The old owner and their treasury, when `territory` is their capital.
fn capital_plunder(data: &GameData, territory: &str, new_owner: &str) -> Option<(String, i64)> {
    let owner = data.territory(territory)?.owner.clone()?;
    if owner == new_owner {
        return None;
    }
    let capital = data.territory_attachment(territory)?.text("capital");
    if capital != owner {
        return None;
    }
    let amount = data.player(&owner)?.resource(PUS);
    (amount > 0).then_some((owner, amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: u64, unit_type: &str) -> Unit {
        Unit {
            id,
            unit_type: unit_type.into(),
            owner: "Germany".into(),
            original_owner: None,
        }
    }

    #[test]
    fn units_text_groups_by_type() {
        let units = [unit(1, "infantry"), unit(2, "armour"), unit(3, "infantry")];
        assert_eq!(units_text(&units), "1 armour, 2 infantry");
    }
}
