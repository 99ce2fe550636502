//! Leaf checks of rules-style conditions.
//!
//! Checks run in a fixed order and stop at the first failure, so expensive
//! or random work never runs for a condition that already failed.

use serde::{Deserialize, Serialize};

use super::defs::ConditionDef;
use super::error::RuleError;
use super::syntax::{leading_count, parse_count, parse_int, split_on_colon};
use super::territory_list::{TerritoryGroup, TerritoryList};
use crate::model::{Archetype, BattleResult, GameData, Territory, Unit};

/// Matches a relationship type by archetype or by exact name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RelationshipSelector {
    AnyAllied,
    AnyNeutral,
    AnyWar,
    Any,
    Exact(String),
}

string_enum_open!(RelationshipSelector, "relationship selector", Exact, {
    AnyAllied => "anyAllied",
    AnyNeutral => "anyNeutral",
    AnyWar => "anyWar",
    Any => "any",
});

impl RelationshipSelector {
    /// Parse and check exact names against the game's relationship types.
    pub fn parse_checked(
        name: &str,
        raw: &str,
        data: &GameData,
        allow_any: bool,
    ) -> Result<Self, RuleError> {
        let selector = RelationshipSelector::try_from(raw.to_string())
            .map_err(|reason| RuleError::invalid(name, reason))?;
        match &selector {
            RelationshipSelector::Any if !allow_any => {
                Err(RuleError::invalid(name, "relationship selector 'any' is not allowed here"))
            }
            RelationshipSelector::Exact(t) if !data.relationship_types.contains(t) => {
                Err(RuleError::unknown(name, "relationship type", t))
            }
            _ => Ok(selector),
        }
    }

    pub fn matches(&self, data: &GameData, relationship_type: &str) -> bool {
        match self {
            RelationshipSelector::AnyAllied => data.archetype(relationship_type) == Archetype::Allied,
            RelationshipSelector::AnyNeutral => data.archetype(relationship_type) == Archetype::Neutral,
            RelationshipSelector::AnyWar => data.archetype(relationship_type) == Archetype::War,
            RelationshipSelector::Any => true,
            RelationshipSelector::Exact(t) => t == relationship_type,
        }
    }
}

/// `count:type[:type]`; `None` types means any unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitPresence {
    pub unit_types: Option<Vec<String>>,
    pub count: u32,
}

impl UnitPresence {
    fn matching(&self, units: &[&Unit]) -> usize {
        match &self.unit_types {
            None => units.len(),
            Some(types) => units.iter().filter(|u| types.contains(&u.unit_type)).count(),
        }
    }
}

/// A list with an optional leading count. A missing count is zero, which
/// means none of the names may match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountedNames {
    pub count: u32,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipCheck {
    pub player1: String,
    pub player2: String,
    pub selector: RelationshipSelector,
    /// Rounds the relationship must have existed; `-1` accepts any age.
    pub min_rounds: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DestroyedTuv {
    /// `-1` disables the check.
    pub required: i64,
    pub current_round_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattleCheck {
    pub attacker: Option<String>,
    pub defender: Option<String>,
    pub result: Option<BattleResult>,
    /// Inclusive round window; `None` is the current round.
    pub rounds: Option<(u32, u32)>,
    pub territories: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleChecks {
    pub rounds: Option<Vec<(u32, u32)>>,
    pub game_property: Option<String>,
    pub direct_presence: Option<TerritoryList>,
    pub allied_presence: Option<TerritoryList>,
    pub enemy_presence: Option<TerritoryList>,
    pub direct_exclusion: Option<TerritoryList>,
    pub allied_exclusion: Option<TerritoryList>,
    pub enemy_exclusion: Option<TerritoryList>,
    pub enemy_surface_exclusion: Option<TerritoryList>,
    pub allied_ownership: Option<TerritoryList>,
    pub direct_ownership: Option<TerritoryList>,
    pub unit_presence: Vec<UnitPresence>,
    pub is_ai: Option<bool>,
    pub at_war: Option<CountedNames>,
    pub techs: Option<CountedNames>,
    pub relationships: Vec<RelationshipCheck>,
    pub destroyed_tuv: Option<DestroyedTuv>,
    pub battles: Vec<BattleCheck>,
}

fn parse_rounds(name: &str, raw: &str) -> Result<Vec<(u32, u32)>, RuleError> {
    let tokens = split_on_colon(raw);
    if tokens.is_empty() {
        return Err(RuleError::invalid(name, "empty round list"));
    }
    tokens
        .into_iter()
        .map(|token| {
            if let Ok(n) = token.parse::<u32>() {
                return Ok((n, n));
            }
            let (start, end) = token.split_once('-').ok_or_else(|| {
                RuleError::invalid(name, format!("round range must be 'int-int', got '{token}'"))
            })?;
            let start = parse_count(name, start)?;
            let end = if end == "+" {
                u32::MAX
            } else {
                parse_count(name, end)?
            };
            Ok((start, end))
        })
        .collect()
}

fn parse_counted(
    name: &str,
    raw: &str,
    what: &'static str,
    exists: impl Fn(&str) -> bool,
) -> Result<CountedNames, RuleError> {
    let tokens = split_on_colon(raw);
    let (count, names) = leading_count(&tokens);
    if names.is_empty() {
        return Err(RuleError::invalid(name, format!("empty {what} list")));
    }
    let count = match count {
        Some(n) => u32::try_from(n)
            .map_err(|_| RuleError::invalid(name, format!("{what} count cannot be negative")))?,
        None => 0,
    };
    for n in &names {
        if !exists(*n) {
            return Err(RuleError::unknown(name, what, n));
        }
    }
    Ok(CountedNames {
        count,
        names: names.into_iter().map(String::from).collect(),
    })
}

fn parse_unit_presence(name: &str, raw: &str, data: &GameData) -> Result<UnitPresence, RuleError> {
    let tokens = split_on_colon(raw);
    if tokens.len() < 2 {
        return Err(RuleError::invalid(
            name,
            "unitPresence needs a count and at least one unit type",
        ));
    }
    let count = parse_count(name, tokens[0])?;
    let types = &tokens[1..];
    if types.iter().any(|t| t.eq_ignore_ascii_case("any")) {
        return Ok(UnitPresence {
            unit_types: None,
            count,
        });
    }
    for t in types {
        if !data.unit_types.contains(*t) {
            return Err(RuleError::unknown(name, "unit type", t));
        }
    }
    Ok(UnitPresence {
        unit_types: Some(types.iter().map(|t| t.to_string()).collect()),
        count,
    })
}

fn parse_relationship(name: &str, raw: &str, data: &GameData) -> Result<RelationshipCheck, RuleError> {
    let tokens = split_on_colon(raw);
    if !(3..=4).contains(&tokens.len()) {
        return Err(RuleError::invalid(
            name,
            format!("relationship must be player1:player2:type[:rounds], got '{raw}'"),
        ));
    }
    for p in &tokens[..2] {
        if !data.players.contains_key(*p) {
            return Err(RuleError::unknown(name, "player", p));
        }
    }
    let selector = RelationshipSelector::parse_checked(name, tokens[2], data, false)?;
    let min_rounds = match tokens.get(3) {
        Some(t) => parse_int(name, t)?,
        None => -1,
    };
    Ok(RelationshipCheck {
        player1: tokens[0].to_string(),
        player2: tokens[1].to_string(),
        selector,
        min_rounds,
    })
}

fn parse_destroyed_tuv(name: &str, raw: &str) -> Result<DestroyedTuv, RuleError> {
    let tokens = split_on_colon(raw);
    let [required, window] = tokens.as_slice() else {
        return Err(RuleError::invalid(
            name,
            "destroyedTUV must be count:currentRound or count:allRounds",
        ));
    };
    let required = parse_int(name, required)?;
    if required < -1 {
        return Err(RuleError::invalid(name, "destroyedTUV count cannot be less than -1"));
    }
    let current_round_only = match *window {
        "currentRound" => true,
        "allRounds" => false,
        other => {
            return Err(RuleError::invalid(
                name,
                format!("destroyedTUV must be currentRound or allRounds, got '{other}'"),
            ));
        }
    };
    Ok(DestroyedTuv {
        required,
        current_round_only,
    })
}

fn parse_battle(name: &str, raw: &str, data: &GameData) -> Result<BattleCheck, RuleError> {
    let tokens = split_on_colon(raw);
    if tokens.len() < 5 {
        return Err(RuleError::invalid(
            name,
            "battle must be attacker:defender:result:round:territory...",
        ));
    }
    let player = |token: &str| -> Result<Option<String>, RuleError> {
        if token.eq_ignore_ascii_case("any") {
            Ok(None)
        } else if data.players.contains_key(token) {
            Ok(Some(token.to_string()))
        } else {
            Err(RuleError::unknown(name, "player", token))
        }
    };
    let attacker = player(tokens[0])?;
    let defender = player(tokens[1])?;
    let result = if tokens[2].eq_ignore_ascii_case("any") {
        None
    } else {
        Some(
            BattleResult::parse(tokens[2])
                .ok_or_else(|| RuleError::unknown(name, "battle result", tokens[2]))?,
        )
    };
    let rounds = if tokens[3].eq_ignore_ascii_case("currentRound") {
        None
    } else {
        let (start, end) = tokens[3].split_once('-').ok_or_else(|| {
            RuleError::invalid(name, "battle round must be currentRound or two numbers like 2-4")
        })?;
        Some((parse_count(name, start)?, parse_count(name, end)?))
    };
    let mut territories = Vec::new();
    for t in &tokens[4..] {
        if !data.territories.contains_key(*t) {
            return Err(RuleError::unknown(name, "territory", t));
        }
        territories.push(t.to_string());
    }
    Ok(BattleCheck {
        attacker,
        defender,
        result,
        rounds,
        territories,
    })
}

fn parse_list(name: &str, raw: &Option<String>, data: &GameData) -> Result<Option<TerritoryList>, RuleError> {
    raw.as_deref()
        .map(|r| TerritoryList::parse(name, r, data))
        .transpose()
}

impl RuleChecks {
    pub fn parse(def: &ConditionDef, data: &GameData) -> Result<Self, RuleError> {
        let name = def.name.as_str();
        Ok(Self {
            rounds: def.rounds.as_deref().map(|r| parse_rounds(name, r)).transpose()?,
            game_property: def.game_property.clone(),
            direct_presence: parse_list(name, &def.direct_presence_territories, data)?,
            allied_presence: parse_list(name, &def.allied_presence_territories, data)?,
            enemy_presence: parse_list(name, &def.enemy_presence_territories, data)?,
            direct_exclusion: parse_list(name, &def.direct_exclusion_territories, data)?,
            allied_exclusion: parse_list(name, &def.allied_exclusion_territories, data)?,
            enemy_exclusion: parse_list(name, &def.enemy_exclusion_territories, data)?,
            enemy_surface_exclusion: parse_list(name, &def.enemy_surface_exclusion_territories, data)?,
            allied_ownership: parse_list(name, &def.allied_ownership_territories, data)?,
            direct_ownership: parse_list(name, &def.direct_ownership_territories, data)?,
            unit_presence: def
                .unit_presence
                .iter()
                .map(|u| parse_unit_presence(name, u, data))
                .collect::<Result<_, _>>()?,
            is_ai: def.is_ai,
            at_war: def
                .at_war_players
                .as_deref()
                .map(|raw| parse_counted(name, raw, "player", |p| data.players.contains_key(p)))
                .transpose()?,
            techs: def
                .techs
                .as_deref()
                .map(|raw| parse_counted(name, raw, "technology", |t| data.technologies.contains(t)))
                .transpose()?,
            relationships: def
                .relationship
                .iter()
                .map(|r| parse_relationship(name, r, data))
                .collect::<Result<_, _>>()?,
            destroyed_tuv: def
                .destroyed_tuv
                .as_deref()
                .map(|r| parse_destroyed_tuv(name, r))
                .transpose()?,
            battles: def
                .battle
                .iter()
                .map(|b| parse_battle(name, b, data))
                .collect::<Result<_, _>>()?,
        })
    }

    fn lists(&self) -> impl Iterator<Item = &TerritoryList> {
        [
            &self.direct_presence,
            &self.allied_presence,
            &self.enemy_presence,
            &self.direct_exclusion,
            &self.allied_exclusion,
            &self.enemy_exclusion,
            &self.enemy_surface_exclusion,
            &self.allied_ownership,
            &self.direct_ownership,
        ]
        .into_iter()
        .flatten()
    }

    /// Any territory list written with `each` turns on multiplier reporting
    /// for every counted check of the condition.
    pub fn count_each(&self) -> bool {
        self.lists().any(|l| l.count_each)
    }

    /// Run every leaf check in order. `switched` is the condition's current
    /// switch value.
    pub fn evaluate(
        &self,
        data: &GameData,
        attached_to: &str,
        players: &[String],
        switched: bool,
    ) -> (bool, Option<u32>) {
        let mut tally = Tally {
            count_each: self.count_each(),
            multiplier: None,
        };
        let met = self.run(data, attached_to, players, switched, &mut tally);
        (met, tally.multiplier)
    }

    fn run(
        &self,
        data: &GameData,
        attached_to: &str,
        players: &[String],
        switched: bool,
        tally: &mut Tally,
    ) -> bool {
        if !switched {
            return false;
        }
        if let Some(rounds) = &self.rounds {
            if !rounds.iter().any(|(s, e)| (*s..=*e).contains(&data.round)) {
                return false;
            }
        }
        if let Some(property) = &self.game_property {
            if !data.bool_property(property) {
                return false;
            }
        }

        let direct = |u: &Unit| players.contains(&u.owner);
        let allied = |u: &Unit| players.iter().any(|p| data.is_allied(&u.owner, p));
        let enemy = |u: &Unit| players.iter().any(|p| data.is_at_war(&u.owner, p));
        let presence_checks: [(&Option<TerritoryList>, &dyn Fn(&Unit) -> bool); 3] = [
            (&self.direct_presence, &direct),
            (&self.allied_presence, &allied),
            (&self.enemy_presence, &enemy),
        ];
        for (list, filter) in presence_checks {
            if let Some(list) = list {
                if !self.check_presence(data, list, players, filter, tally) {
                    return false;
                }
            }
        }

        let allied_not_direct = |u: &Unit| !direct(u) && allied(u);
        let enemy_surface = |u: &Unit| {
            enemy(u)
                && data.unit_flag(&u.unit_type, "isSea")
                && !data.unit_flag(&u.unit_type, "isSub")
                && !(data.unit_int(&u.unit_type, "transportCapacity") > 0
                    && data.unit_int(&u.unit_type, "attack") == 0)
        };
        let exclusion_checks: [(&Option<TerritoryList>, &dyn Fn(&Unit) -> bool); 4] = [
            (&self.direct_exclusion, &direct),
            (&self.allied_exclusion, &allied_not_direct),
            (&self.enemy_exclusion, &enemy),
            (&self.enemy_surface_exclusion, &enemy_surface),
        ];
        for (list, filter) in exclusion_checks {
            if let Some(list) = list {
                if !self.check_exclusion(data, list, players, filter, tally) {
                    return false;
                }
            }
        }

        if let Some(list) = &self.allied_ownership {
            let owners = match list.group() {
                Some(TerritoryGroup::Original) => data.allies_of_any(players),
                Some(TerritoryGroup::Enemy) => data.enemies_of_any(players),
                _ => players.to_vec(),
            };
            let allies = data.allies_of_any(players);
            let territories = list.resolve(data, &owners);
            let owned = |t: &Territory| t.owner.as_ref().is_some_and(|o| allies.contains(o));
            if !tally.matched(list, &territories, owned) {
                return false;
            }
        }
        if let Some(list) = &self.direct_ownership {
            let owners = match list.group() {
                Some(TerritoryGroup::Enemy) => data.enemies_of_any(players),
                _ => players.to_vec(),
            };
            let territories = list.resolve(data, &owners);
            let owned = |t: &Territory| t.owner.as_ref().is_some_and(|o| players.contains(o));
            if !tally.matched(list, &territories, owned) {
                return false;
            }
        }

        if let Some(is_ai) = self.is_ai {
            let all_match = players
                .iter()
                .all(|p| data.player(p).is_some_and(|p| p.is_ai == is_ai));
            if !all_match {
                return false;
            }
        }
        if let Some(at_war) = &self.at_war {
            let found = at_war
                .names
                .iter()
                .filter(|p| data.is_at_war(attached_to, p))
                .count();
            if !tally.counted(at_war.count, found) {
                return false;
            }
        }
        if let Some(techs) = &self.techs {
            let known = data.player(attached_to).map(|p| &p.techs);
            let found = techs
                .names
                .iter()
                .filter(|t| known.is_some_and(|k| k.contains(*t)))
                .count();
            if !tally.counted(techs.count, found) {
                return false;
            }
        }
        if !self.relationships.iter().all(|r| relationship_holds(data, r)) {
            return false;
        }
        if let Some(tuv) = self.destroyed_tuv {
            if tuv.required >= 0 {
                let destroyed = data.tuv_destroyed_by(attached_to, tuv.current_round_only);
                if tally.count_each {
                    tally.multiplier = Some(destroyed.max(0) as u32);
                }
                if tuv.required > destroyed {
                    return false;
                }
            }
        }
        self.battles.iter().all(|b| battle_happened(data, b))
    }

    fn check_presence(
        &self,
        data: &GameData,
        list: &TerritoryList,
        players: &[String],
        filter: &dyn Fn(&Unit) -> bool,
        tally: &mut Tally,
    ) -> bool {
        let territories = list.resolve(data, players);
        tally.matched(list, &territories, |t| {
            let units: Vec<&Unit> = t.units.iter().filter(|u| filter(*u)).collect();
            !units.is_empty()
                && (self.unit_presence.is_empty()
                    || self
                        .unit_presence
                        .iter()
                        .all(|req| req.matching(&units) >= req.count as usize))
        })
    }

    fn check_exclusion(
        &self,
        data: &GameData,
        list: &TerritoryList,
        players: &[String],
        filter: &dyn Fn(&Unit) -> bool,
        tally: &mut Tally,
    ) -> bool {
        let territories = list.resolve(data, players);
        tally.matched(list, &territories, |t| {
            let units: Vec<&Unit> = t.units.iter().filter(|u| filter(*u)).collect();
            units.is_empty()
                || (!self.unit_presence.is_empty()
                    && self
                        .unit_presence
                        .iter()
                        .all(|req| req.matching(&units) <= req.count as usize))
        })
    }
}

struct Tally {
    count_each: bool,
    multiplier: Option<u32>,
}

impl Tally {
    fn matched(
        &mut self,
        list: &TerritoryList,
        territories: &[&Territory],
        predicate: impl Fn(&Territory) -> bool,
    ) -> bool {
        let met = territories.iter().filter(|t| predicate(**t)).count();
        if self.count_each {
            self.multiplier = Some(met as u32);
        }
        met >= list.needed(territories.len())
    }

    fn counted(&mut self, count: u32, found: usize) -> bool {
        if count == 0 {
            return found == 0;
        }
        if self.count_each {
            self.multiplier = Some(found as u32);
        }
        found >= count as usize
    }
}

fn relationship_holds(data: &GameData, check: &RelationshipCheck) -> bool {
    let Some(relationship) = data.relationship(&check.player1, &check.player2) else {
        return false;
    };
    let extra = data.int_property("relationshipsLastExtraRounds", 0);
    let age = i64::from(data.round) - (i64::from(relationship.round_created) + extra);
    age >= check.min_rounds && check.selector.matches(data, &relationship.relationship_type)
}

fn battle_happened(data: &GameData, check: &BattleCheck) -> bool {
    let (start, end) = check.rounds.unwrap_or((data.round, data.round));
    data.battles.iter().any(|b| {
        (start..=end).contains(&b.round)
            && check.attacker.as_ref().is_none_or(|a| *a == b.attacker)
            && check.defender.as_ref().is_none_or(|d| *d == b.defender)
            && check.result.is_none_or(|r| r == b.result)
            && check.territories.contains(&b.territory)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_accept_singles_and_open_ranges() {
        assert_eq!(
            parse_rounds("c", "1:3-5:7-+").unwrap(),
            vec![(1, 1), (3, 5), (7, u32::MAX)]
        );
        assert!(parse_rounds("c", "3-").is_err());
        assert!(parse_rounds("c", "").is_err());
    }

    #[test]
    fn missing_count_means_none_may_match() {
        let mut tally = Tally {
            count_each: false,
            multiplier: None,
        };
        assert!(tally.counted(0, 0));
        assert!(!tally.counted(0, 1));
        assert!(tally.counted(2, 3));
    }

    #[test]
    fn counted_checks_report_multiplier_only_with_each() {
        let mut tally = Tally {
            count_each: true,
            multiplier: None,
        };
        assert!(tally.counted(1, 3));
        assert_eq!(tally.multiplier, Some(3));
    }

    #[test]
    fn destroyed_tuv_syntax() {
        assert_eq!(
            parse_destroyed_tuv("c", "10:allRounds").unwrap(),
            DestroyedTuv {
                required: 10,
                current_round_only: false
            }
        );
        assert!(parse_destroyed_tuv("c", "10:lastWeek").is_err());
        assert!(parse_destroyed_tuv("c", "-2:allRounds").is_err());
    }
}
