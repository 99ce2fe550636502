use crate::model::game::pair_key;
use crate::model::*;

// -- Builder-style ref types --

/// Typed reference to a player in a [`Scenario`], enabling chained field mutation.
///
/// Created by [`Scenario::player`]. Call [`.name()`](PlayerRef::name) to
/// terminate the chain.
pub struct PlayerRef<'a> {
    scenario: &'a mut Scenario,
    name: String,
}

impl<'a> PlayerRef<'a> {
    fn data_mut(&mut self) -> &mut Player {
        let name = self.name.clone();
        self.scenario.data.players.entry(name.clone()).or_insert_with(|| Player::new(name))
    }

    pub fn ai(mut self) -> Self { self.data_mut().is_ai = true; self }
    pub fn resource(mut self, resource: &str, v: i64) -> Self {
        self.scenario.data.resources.insert(resource.to_string());
        if v == 0 {
            self.data_mut().resources.remove(resource);
        } else {
            self.data_mut().resources.insert(resource.to_string(), v);
        }
        self
    }
    pub fn pus(self, v: i64) -> Self { self.resource(PUS, v) }
    pub fn tech(mut self, tech: &str) -> Self {
        self.scenario.data.technologies.insert(tech.to_string());
        self.data_mut().techs.insert(tech.to_string());
        self
    }
    pub fn frontier(mut self, frontier: &str) -> Self {
        self.scenario.data.frontiers.entry(frontier.to_string()).or_default();
        self.data_mut().frontier = Some(frontier.to_string());
        self
    }

    /// Escape hatch: apply an arbitrary closure to the player.
    pub fn with(mut self, f: impl FnOnce(&mut Player)) -> Self { f(self.data_mut()); self }

    /// Terminate the chain and return the player's name.
    pub fn name(self) -> String { self.name }
}

/// Typed reference to a territory in a [`Scenario`], enabling chained field mutation.
///
/// Created by [`Scenario::territory`]. Every territory gets a default
/// territory attachment.
pub struct TerritoryRef<'a> {
    scenario: &'a mut Scenario,
    name: String,
}

impl<'a> TerritoryRef<'a> {
    fn data_mut(&mut self) -> &mut Territory {
        let name = self.name.clone();
        self.scenario.data.territories.entry(name.clone()).or_insert_with(|| Territory {
            name,
            ..Default::default()
        })
    }

    fn attachment_mut(&mut self) -> &mut AttributeStore {
        let key = StoreKey::new(
            OwnerKind::Territory,
            self.name.clone(),
            AttachmentKind::Territory.default_name(),
        );
        self.scenario.data.ensure_store(key, AttachmentKind::Territory)
    }

    fn set_attachment(mut self, property: &str, raw: &str) -> Self {
        if let Some(handle) = PropertyHandle::resolve(AttachmentKind::Territory, property) {
            let _ = handle.set_raw(self.attachment_mut(), raw);
        }
        self
    }

    pub fn water(mut self) -> Self { self.data_mut().is_water = true; self }
    pub fn original_owner(mut self, player: &str) -> Self { self.data_mut().original_owner = Some(player.to_string()); self }
    pub fn impassable(self) -> Self { self.set_attachment("isImpassable", "true") }
    pub fn capital_of(self, player: &str) -> Self { self.set_attachment("capital", player) }
    pub fn production(self, v: i64) -> Self { self.set_attachment("production", &v.to_string()) }

    /// Add `count` fresh units of `unit_type` owned by `owner`.
    pub fn units(mut self, unit_type: &str, count: usize, owner: &str) -> Self {
        self.scenario.data.unit_types.insert(unit_type.to_string());
        let ids = self.scenario.data.id_gen.take(count);
        let units = ids.into_iter().map(|id| Unit {
            id,
            unit_type: unit_type.to_string(),
            owner: owner.to_string(),
            original_owner: Some(owner.to_string()),
        });
        self.data_mut().units.extend(units);
        self
    }

    /// Escape hatch: apply an arbitrary closure to the territory.
    pub fn with(mut self, f: impl FnOnce(&mut Territory)) -> Self { f(self.data_mut()); self }

    /// Terminate the chain and return the territory's name.
    pub fn name(self) -> String { self.name }
}

/// Fluent builder for [`GameData`].
///
/// Starts with the `PUs` resource and three relationship types, `Allied`,
/// `Neutrality` and `War`, one per archetype. Used by tests for
/// deterministic setup.
pub struct Scenario {
    data: GameData,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new()
    }
}

impl Scenario {
    /// Create a new scenario in round 1.
    pub fn new() -> Self {
        Self::at_round(1)
    }

    pub fn at_round(round: u32) -> Self {
        let mut scenario = Self {
            data: GameData::new(),
        };
        scenario.data.round = round;
        scenario.data.resources.insert(PUS.to_string());
        scenario.add_relationship_type("Allied", Archetype::Allied);
        scenario.add_relationship_type("Neutrality", Archetype::Neutral);
        scenario.add_relationship_type("War", Archetype::War);
        scenario
    }

    // -- Entity creation --

    /// Add (or re-open) a player with its default player attachment.
    pub fn player(&mut self, name: &str) -> PlayerRef<'_> {
        self.data
            .players
            .entry(name.to_string())
            .or_insert_with(|| Player::new(name));
        self.data.ensure_store(
            StoreKey::new(OwnerKind::Player, name, AttachmentKind::Player.default_name()),
            AttachmentKind::Player,
        );
        PlayerRef {
            scenario: self,
            name: name.to_string(),
        }
    }

    /// Add a player with default settings.
    pub fn add_player(&mut self, name: &str) -> String {
        self.player(name).name()
    }

    /// Add (or re-open) a territory owned by `owner`, who is also its
    /// original owner unless changed.
    pub fn territory(&mut self, name: &str, owner: Option<&str>) -> TerritoryRef<'_> {
        self.data.territories.entry(name.to_string()).or_insert_with(|| Territory {
            name: name.to_string(),
            owner: owner.map(str::to_string),
            original_owner: owner.map(str::to_string),
            ..Default::default()
        });
        self.data.ensure_store(
            StoreKey::new(
                OwnerKind::Territory,
                name,
                AttachmentKind::Territory.default_name(),
            ),
            AttachmentKind::Territory,
        );
        TerritoryRef {
            scenario: self,
            name: name.to_string(),
        }
    }

    pub fn add_territory(&mut self, name: &str, owner: &str) -> String {
        self.territory(name, Some(owner)).name()
    }

    pub fn add_sea_zone(&mut self, name: &str) -> String {
        self.territory(name, None).water().name()
    }

    /// Add a unit type with its default unit attachment.
    pub fn add_unit_type(&mut self, name: &str) {
        self.add_unit_type_with(name, &[]);
    }

    /// Add a unit type, setting attachment properties from `(name, raw)` pairs.
    pub fn add_unit_type_with(&mut self, name: &str, properties: &[(&str, &str)]) {
        self.data.unit_types.insert(name.to_string());
        let store = self.data.ensure_store(
            StoreKey::new(OwnerKind::UnitType, name, AttachmentKind::Unit.default_name()),
            AttachmentKind::Unit,
        );
        for (property, raw) in properties {
            if let Some(handle) = PropertyHandle::resolve(AttachmentKind::Unit, property) {
                let _ = handle.set_raw(store, raw);
            }
        }
    }

    pub fn add_relationship_type(&mut self, name: &str, archetype: Archetype) {
        self.data.relationship_types.insert(name.to_string());
        let store = self.data.ensure_store(
            StoreKey::new(
                OwnerKind::RelationshipType,
                name,
                AttachmentKind::RelationshipType.default_name(),
            ),
            AttachmentKind::RelationshipType,
        );
        if let Some(handle) = PropertyHandle::resolve(AttachmentKind::RelationshipType, "archeType") {
            let _ = handle.set_raw(store, archetype.as_str());
        }
    }

    pub fn add_territory_effect(&mut self, name: &str) {
        self.data.territory_effects.insert(name.to_string());
        self.data.ensure_store(
            StoreKey::new(
                OwnerKind::TerritoryEffect,
                name,
                AttachmentKind::TerritoryEffect.default_name(),
            ),
            AttachmentKind::TerritoryEffect,
        );
    }

    pub fn add_technology(&mut self, name: &str) {
        self.data.technologies.insert(name.to_string());
    }

    pub fn add_resource(&mut self, name: &str) {
        self.data.resources.insert(name.to_string());
    }

    pub fn add_frontier(&mut self, name: &str, rules: &[&str]) {
        for rule in rules {
            self.data.production_rules.insert(rule.to_string());
        }
        self.data
            .frontiers
            .insert(name.to_string(), rules.iter().map(|r| r.to_string()).collect());
    }

    pub fn add_production_rule(&mut self, name: &str) {
        self.data.production_rules.insert(name.to_string());
    }

    pub fn add_support(&mut self, name: &str, players: &[&str]) {
        self.data.unit_supports.insert(
            name.to_string(),
            players.iter().map(|p| p.to_string()).collect(),
        );
    }

    // -- Relationships --

    /// Set the relationship between two players, created in the current round.
    pub fn relate(&mut self, a: &str, b: &str, relationship_type: &str) {
        self.relate_since(a, b, relationship_type, self.data.round);
    }

    pub fn relate_since(&mut self, a: &str, b: &str, relationship_type: &str, round: u32) {
        self.data.relationships.insert(
            pair_key(a, b),
            Relationship {
                relationship_type: relationship_type.to_string(),
                round_created: round,
            },
        );
    }

    pub fn make_allies(&mut self, a: &str, b: &str) {
        self.relate(a, b, "Allied");
    }

    pub fn make_at_war(&mut self, a: &str, b: &str) {
        self.relate(a, b, "War");
    }

    pub fn make_neutral(&mut self, a: &str, b: &str) {
        self.relate(a, b, "Neutrality");
    }

    // -- Game state --

    pub fn property(&mut self, name: &str, value: PropertyValue) {
        self.data.properties.insert(name.to_string(), value);
    }

    pub fn record_battle(&mut self, battle: BattleRecord) {
        self.data.battles.push(battle);
    }

    pub fn set_round(&mut self, round: u32) {
        self.data.round = round;
    }

    // -- Access --

    pub fn data(&self) -> &GameData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut GameData {
        &mut self.data
    }

    /// Finish building and return the game data.
    pub fn build(self) -> GameData {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_relationship_types_cover_every_archetype() {
        let data = Scenario::new().build();
        assert_eq!(data.archetype("Allied"), Archetype::Allied);
        assert_eq!(data.archetype("Neutrality"), Archetype::Neutral);
        assert_eq!(data.archetype("War"), Archetype::War);
    }

    #[test]
    fn chained_refs_fill_players_and_territories() {
        let mut s = Scenario::new();
        s.player("Germany").pus(30).ai();
        s.add_player("Russia");
        s.territory("Poland", Some("Germany"))
            .original_owner("Russia")
            .units("infantry", 2, "Germany");
        s.make_at_war("Germany", "Russia");
        let data = s.build();

        assert!(data.players["Germany"].is_ai);
        assert_eq!(data.players["Germany"].resource(PUS), 30);
        assert_eq!(data.territories["Poland"].units.len(), 2);
        assert_eq!(data.territories["Poland"].original_owner.as_deref(), Some("Russia"));
        assert!(data.territory_attachment("Poland").is_some());
        assert!(data.is_at_war("Russia", "Germany"));
    }
}
