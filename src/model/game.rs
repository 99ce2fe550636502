use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::property::{AttachmentKind, AttributeStore, OwnerKind, PropertyValue, StoreKey};
use crate::id::IdGenerator;

/// Name of the resource that game-wide multipliers and capital plunder apply to.
pub const PUS: &str = "PUs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: u64,
    pub unit_type: String,
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    #[serde(default)]
    pub is_ai: bool,
    /// Quantities held. Zero quantities are absent.
    #[serde(default)]
    pub resources: BTreeMap<String, i64>,
    /// Technologies already researched.
    #[serde(default)]
    pub techs: BTreeSet<String>,
    /// Research options per technology category.
    #[serde(default)]
    pub available_techs: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub frontier: Option<String>,
    /// Purchased units not yet placed.
    #[serde(default)]
    pub unplaced: Vec<Unit>,
}

impl Player {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn resource(&self, resource: &str) -> i64 {
        self.resources.get(resource).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Territory {
    pub name: String,
    /// `None` for neutral territories.
    pub owner: Option<String>,
    #[serde(default)]
    pub original_owner: Option<String>,
    #[serde(default)]
    pub is_water: bool,
    #[serde(default)]
    pub units: Vec<Unit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub relationship_type: String,
    pub round_created: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Archetype {
    Allied,
    Neutral,
    War,
}

string_enum!(Archetype {
    Allied => "allied",
    Neutral => "neutral",
    War => "war",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum BattleResult {
    Blitzed,
    Conquered,
    WonWithoutConquering,
    Lost,
    Stalemate,
}

string_enum!(BattleResult {
    Blitzed => "blitzed",
    Conquered => "conquered",
    WonWithoutConquering => "wonWithoutConquering",
    Lost => "lost",
    Stalemate => "stalemate",
});

impl BattleResult {
    pub fn attacker_won(self) -> bool {
        matches!(
            self,
            BattleResult::Blitzed | BattleResult::Conquered | BattleResult::WonWithoutConquering
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleRecord {
    pub round: u32,
    pub territory: String,
    pub attacker: String,
    pub defender: String,
    pub result: BattleResult,
    #[serde(default)]
    pub attacker_lost_tuv: i64,
    #[serde(default)]
    pub defender_lost_tuv: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOver {
    pub winners: Vec<String>,
    pub message: String,
}

/// The slice of game state the trigger engine reads and mutates.
///
/// Registries are keyed by name and ordered, so every scan over them is
/// deterministic. Mutation during play goes through [`GameData::apply`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GameData {
    pub round: u32,
    pub players: BTreeMap<String, Player>,
    pub territories: BTreeMap<String, Territory>,
    pub relationship_types: BTreeSet<String>,
    /// Keyed by the player pair in name order.
    pub relationships: BTreeMap<(String, String), Relationship>,
    pub territory_effects: BTreeSet<String>,
    pub unit_types: BTreeSet<String>,
    pub technologies: BTreeSet<String>,
    pub resources: BTreeSet<String>,
    /// Production frontier name to its rules.
    pub frontiers: BTreeMap<String, Vec<String>>,
    pub production_rules: BTreeSet<String>,
    /// Unit support name to the players that may use it.
    pub unit_supports: BTreeMap<String, BTreeSet<String>>,
    pub properties: BTreeMap<String, PropertyValue>,
    pub battles: Vec<BattleRecord>,
    pub stores: BTreeMap<StoreKey, AttributeStore>,
    pub game_over: Option<GameOver>,
    pub id_gen: IdGenerator,
}

pub(crate) fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

impl GameData {
    pub fn new() -> Self {
        Self {
            round: 1,
            ..Default::default()
        }
    }

    pub fn player(&self, name: &str) -> Option<&Player> {
        self.players.get(name)
    }

    pub fn territory(&self, name: &str) -> Option<&Territory> {
        self.territories.get(name)
    }

    pub fn store(&self, key: &StoreKey) -> Option<&AttributeStore> {
        self.stores.get(key)
    }

    /// Insert an empty store if none exists yet and return it.
    pub fn ensure_store(&mut self, key: StoreKey, kind: AttachmentKind) -> &mut AttributeStore {
        self.stores
            .entry(key)
            .or_insert_with(|| AttributeStore::new(kind))
    }

    /// The default territory attachment of `territory`, if the map gives it one.
    pub fn territory_attachment(&self, territory: &str) -> Option<&AttributeStore> {
        self.stores.get(&StoreKey::new(
            OwnerKind::Territory,
            territory,
            AttachmentKind::Territory.default_name(),
        ))
    }

    pub fn unit_attachment(&self, unit_type: &str) -> Option<&AttributeStore> {
        self.stores.get(&StoreKey::new(
            OwnerKind::UnitType,
            unit_type,
            AttachmentKind::Unit.default_name(),
        ))
    }

    pub fn unit_flag(&self, unit_type: &str, name: &str) -> bool {
        self.unit_attachment(unit_type)
            .is_some_and(|store| store.flag(name))
    }

    pub fn unit_int(&self, unit_type: &str, name: &str) -> i64 {
        match self.unit_attachment(unit_type) {
            Some(store) => store.int(name),
            None => super::property::PropertyHandle::resolve(AttachmentKind::Unit, name)
                .and_then(|h| h.default_value().as_int())
                .unwrap_or(0),
        }
    }

    pub fn bool_property(&self, name: &str) -> bool {
        self.properties
            .get(name)
            .and_then(PropertyValue::as_bool)
            .unwrap_or(false)
    }

    pub fn int_property(&self, name: &str, default: i64) -> i64 {
        self.properties
            .get(name)
            .and_then(PropertyValue::as_int)
            .unwrap_or(default)
    }

    pub fn relationship(&self, a: &str, b: &str) -> Option<&Relationship> {
        self.relationships.get(&pair_key(a, b))
    }

    /// Archetype of a relationship type, read from its attachment.
    pub fn archetype(&self, relationship_type: &str) -> Archetype {
        let raw = self
            .stores
            .get(&StoreKey::new(
                OwnerKind::RelationshipType,
                relationship_type,
                AttachmentKind::RelationshipType.default_name(),
            ))
            .map(|store| store.text("archeType"))
            .unwrap_or_else(|| "war".to_string());
        Archetype::parse(&raw).unwrap_or(Archetype::War)
    }

    fn archetype_between(&self, a: &str, b: &str) -> Option<Archetype> {
        self.relationship(a, b)
            .map(|r| self.archetype(&r.relationship_type))
    }

    /// A player is always allied with itself.
    pub fn is_allied(&self, a: &str, b: &str) -> bool {
        a == b || self.archetype_between(a, b) == Some(Archetype::Allied)
    }

    pub fn is_at_war(&self, a: &str, b: &str) -> bool {
        a != b && self.archetype_between(a, b) == Some(Archetype::War)
    }

    pub fn is_neutral(&self, a: &str, b: &str) -> bool {
        a != b && self.archetype_between(a, b) == Some(Archetype::Neutral)
    }

    pub fn allies_of_any(&self, players: &[String]) -> Vec<String> {
        self.players
            .keys()
            .filter(|p| players.iter().any(|q| self.is_allied(p, q)))
            .cloned()
            .collect()
    }

    pub fn enemies_of_any(&self, players: &[String]) -> Vec<String> {
        self.players
            .keys()
            .filter(|p| players.iter().any(|q| self.is_at_war(p, q)))
            .cloned()
            .collect()
    }

    pub fn territories_owned_by<'a>(
        &'a self,
        players: &'a [String],
    ) -> impl Iterator<Item = &'a Territory> + 'a {
        self.territories.values().filter(move |t| {
            t.owner
                .as_ref()
                .is_some_and(|o| players.iter().any(|p| p == o))
        })
    }

    pub fn territories_originally_owned_by<'a>(
        &'a self,
        players: &'a [String],
    ) -> impl Iterator<Item = &'a Territory> + 'a {
        self.territories.values().filter(move |t| {
            t.original_owner
                .as_ref()
                .is_some_and(|o| players.iter().any(|p| p == o))
        })
    }

    /// Water and impassable territories are excluded from the `NoWater` groups.
    pub fn is_passable_land(&self, territory: &Territory) -> bool {
        !territory.is_water
            && !self
                .territory_attachment(&territory.name)
                .is_some_and(|store| store.flag("isImpassable"))
    }

    /// Value of enemy units destroyed by `player` across its battles.
    pub fn tuv_destroyed_by(&self, player: &str, current_round_only: bool) -> i64 {
        self.battles
            .iter()
            .filter(|b| b.round <= self.round && (!current_round_only || b.round == self.round))
            .map(|b| {
                if b.attacker == player {
                    b.defender_lost_tuv
                } else if b.defender == player {
                    b.attacker_lost_tuv
                } else {
                    0
                }
            })
            .sum()
    }
}
