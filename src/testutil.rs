use std::collections::{BTreeSet, VecDeque};

use crate::bridge::{Bridge, DiceRoller, GameBridge};
use crate::config::EngineConfig;
use crate::model::*;
use crate::rules::{
    ConditionId, ConditionMemo, EngineError, FireReport, FireTriggerParams, Outcome, RuleError,
    RuleSet, RuleSetDef, When, collect_and_fire_triggers, end_of_round_uses_sweep, fire_triggers,
    test_condition,
};

// ---------------------------------------------------------------------------
// Dice
// ---------------------------------------------------------------------------

/// Dice that answer from a fixed script. Panics when a roll is asked for
/// after the script runs out, so tests notice unexpected draws.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDice {
    rolls: VecDeque<u32>,
    drawn: usize,
}

impl ScriptedDice {
    pub fn new(rolls: &[u32]) -> Self {
        Self {
            rolls: rolls.iter().copied().collect(),
            drawn: 0,
        }
    }

    /// Dice that must never be rolled.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn drawn(&self) -> usize {
        self.drawn
    }

    pub fn remaining(&self) -> usize {
        self.rolls.len()
    }
}

impl DiceRoller for ScriptedDice {
    fn roll(&mut self, sides: u32) -> u32 {
        let Some(roll) = self.rolls.pop_front() else {
            panic!("die rolled (d{sides}) with no scripted roll left");
        };
        assert!(
            (1..=sides).contains(&roll),
            "scripted roll {roll} does not fit a d{sides}"
        );
        self.drawn += 1;
        roll
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Loaded rules plus everything a firing pass writes to, owned in one place.
pub struct Harness {
    pub data: GameData,
    pub rules: RuleSet,
    pub journal: Journal,
    pub dice: ScriptedDice,
    pub config: EngineConfig,
    pub current_player: Option<String>,
}

impl Harness {
    /// Load `def` into `data`. Dice start empty; script them with
    /// [`Harness::with_rolls`].
    pub fn load(mut data: GameData, def: &RuleSetDef) -> Result<Self, RuleError> {
        let rules = RuleSet::load(def, &mut data)?;
        Ok(Self {
            data,
            rules,
            journal: Journal::new(),
            dice: ScriptedDice::none(),
            config: EngineConfig::default(),
            current_player: None,
        })
    }

    /// Load rules written as JSON.
    pub fn from_json(data: GameData, json: &str) -> Result<Self, RuleError> {
        let def: RuleSetDef = serde_json::from_str(json)
            .unwrap_or_else(|err| panic!("rule JSON does not parse: {err}"));
        Self::load(data, &def)
    }

    pub fn with_rolls(mut self, rolls: &[u32]) -> Self {
        self.dice = ScriptedDice::new(rolls);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Run `f` against a live bridge over this harness's data.
    pub fn run<T>(&mut self, f: impl FnOnce(&RuleSet, &mut dyn Bridge) -> T) -> T {
        let mut bridge =
            GameBridge::new(&mut self.data, &mut self.dice, &mut self.journal, &self.config);
        if let Some(player) = &self.current_player {
            bridge = bridge.with_current_player(player.clone());
        }
        f(&self.rules, &mut bridge)
    }

    pub fn id(&self, name: &str) -> ConditionId {
        self.rules
            .id_of(name)
            .unwrap_or_else(|| panic!("no condition called {name}"))
    }

    /// Test one condition against a fresh memo.
    pub fn test(&mut self, name: &str) -> Result<Outcome, EngineError> {
        let id = self.id(name);
        self.run(|rules, bridge| test_condition(rules, id, &mut ConditionMemo::new(), bridge))
    }

    /// The per-step entry point for `players` at `step`, with no extra filter.
    pub fn fire_step(
        &mut self,
        players: &[&str],
        step: Option<When>,
    ) -> Result<FireReport, EngineError> {
        let players: Vec<String> = players.iter().map(|p| p.to_string()).collect();
        self.run(|rules, bridge| collect_and_fire_triggers(rules, bridge, &players, step, |_, _| true))
    }

    /// Fire the named triggers directly with `params`.
    pub fn fire_named(
        &mut self,
        names: &[&str],
        params: &FireTriggerParams,
    ) -> Result<FireReport, EngineError> {
        let ids: BTreeSet<ConditionId> = names.iter().map(|n| self.id(n)).collect();
        self.run(|rules, bridge| fire_triggers(rules, &ids, &mut ConditionMemo::new(), bridge, params))
    }

    pub fn end_round(&mut self) -> Result<(), EngineError> {
        self.run(|rules, bridge| end_of_round_uses_sweep(rules, bridge))?;
        self.data.round += 1;
        Ok(())
    }

    // -- Inspection --

    /// The attribute store behind a condition or trigger.
    pub fn store(&self, name: &str) -> &AttributeStore {
        let key = &self.rules.condition(self.id(name)).store;
        self.data
            .store(key)
            .unwrap_or_else(|| panic!("{name} has no store"))
    }

    pub fn uses(&self, name: &str) -> i64 {
        self.store(name).int("uses")
    }

    pub fn events(&self) -> Vec<&str> {
        self.journal.events().collect()
    }

    /// True when some history event contains `needle`.
    pub fn saw_event(&self, needle: &str) -> bool {
        self.journal.position_of_event(needle).is_some()
    }

    pub fn pus(&self, player: &str) -> i64 {
        self.data.player(player).map(|p| p.resource(PUS)).unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Query helpers
// ---------------------------------------------------------------------------

/// Units of `unit_type` owned by `owner` in `territory`.
pub fn units_of(data: &GameData, territory: &str, owner: &str, unit_type: &str) -> usize {
    data.territory(territory)
        .map(|t| {
            t.units
                .iter()
                .filter(|u| u.owner == owner && u.unit_type == unit_type)
                .count()
        })
        .unwrap_or(0)
}

/// Purchased, not yet placed units of `unit_type` held by `player`.
pub fn unplaced_of(data: &GameData, player: &str, unit_type: &str) -> usize {
    data.player(player)
        .map(|p| p.unplaced.iter().filter(|u| u.unit_type == unit_type).count())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_dice_answer_in_order() {
        let mut dice = ScriptedDice::new(&[3, 1]);
        assert_eq!(dice.roll(6), 3);
        assert_eq!(dice.roll(6), 1);
        assert_eq!(dice.drawn(), 2);
        assert_eq!(dice.remaining(), 0);
    }

    #[test]
    #[should_panic(expected = "no scripted roll left")]
    fn unscripted_roll_panics() {
        ScriptedDice::none().roll(6);
    }
}
