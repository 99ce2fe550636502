use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::game::{GameData, GameOver, Relationship, Unit, pair_key};
use super::property::{PropertyHandle, PropertyValue, StoreKey};

/// One auditable mutation of [`GameData`].
///
/// Every variant carries enough to be inverted, so the journal doubles as an
/// undo log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Change {
    /// `new: None` resets the property to absent.
    PropertySet {
        store: StoreKey,
        property: PropertyHandle,
        old: Option<PropertyValue>,
        new: Option<PropertyValue>,
    },
    /// `None` on either side means the pair had no relationship.
    RelationshipChanged {
        player1: String,
        player2: String,
        old: Option<Relationship>,
        new: Option<Relationship>,
    },
    AvailableTechChanged {
        player: String,
        category: String,
        tech: String,
        available: bool,
    },
    TechChanged {
        player: String,
        tech: String,
        known: bool,
    },
    FrontierChanged {
        player: String,
        old: Option<String>,
        new: Option<String>,
    },
    ProductionRuleChanged {
        frontier: String,
        rule: String,
        present: bool,
    },
    SupportChanged {
        support: String,
        player: String,
        granted: bool,
    },
    OwnerChanged {
        territory: String,
        old: Option<String>,
        new: Option<String>,
    },
    UnitOwnerChanged {
        territory: String,
        unit: u64,
        old: String,
        new: String,
    },
    UnitsAddedToPlayer {
        player: String,
        units: Vec<Unit>,
    },
    UnitsRemovedFromPlayer {
        player: String,
        units: Vec<Unit>,
    },
    UnitsAddedToTerritory {
        territory: String,
        units: Vec<Unit>,
    },
    UnitsRemovedFromTerritory {
        territory: String,
        units: Vec<Unit>,
    },
    ResourceChanged {
        player: String,
        resource: String,
        delta: i64,
    },
    GameOverChanged {
        old: Option<GameOver>,
        new: Option<GameOver>,
    },
    Composite {
        changes: Vec<Change>,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum ChangeError {
    #[error("unknown player: {0}")]
    UnknownPlayer(String),
    #[error("unknown territory: {0}")]
    UnknownTerritory(String),
    #[error("unknown production frontier: {0}")]
    UnknownFrontier(String),
    #[error("unknown unit support: {0}")]
    UnknownSupport(String),
    #[error("no store {0}")]
    UnknownStore(StoreKey),
    #[error("unit {unit} not found in {location}")]
    UnknownUnit { unit: u64, location: String },
    #[error("{player} would hold {quantity} {resource}")]
    NegativeResource {
        player: String,
        resource: String,
        quantity: i64,
    },
    #[error("property {property} on {store}: {reason}")]
    Property {
        store: StoreKey,
        property: String,
        reason: String,
    },
}

impl Change {
    /// Human-readable tag, matching the serde tag.
    pub fn change_type_str(&self) -> &'static str {
        match self {
            Change::PropertySet { .. } => "property_set",
            Change::RelationshipChanged { .. } => "relationship_changed",
            Change::AvailableTechChanged { .. } => "available_tech_changed",
            Change::TechChanged { .. } => "tech_changed",
            Change::FrontierChanged { .. } => "frontier_changed",
            Change::ProductionRuleChanged { .. } => "production_rule_changed",
            Change::SupportChanged { .. } => "support_changed",
            Change::OwnerChanged { .. } => "owner_changed",
            Change::UnitOwnerChanged { .. } => "unit_owner_changed",
            Change::UnitsAddedToPlayer { .. } => "units_added_to_player",
            Change::UnitsRemovedFromPlayer { .. } => "units_removed_from_player",
            Change::UnitsAddedToTerritory { .. } => "units_added_to_territory",
            Change::UnitsRemovedFromTerritory { .. } => "units_removed_from_territory",
            Change::ResourceChanged { .. } => "resource_changed",
            Change::GameOverChanged { .. } => "game_over_changed",
            Change::Composite { .. } => "composite",
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Change::Composite { changes } if changes.iter().all(Change::is_empty))
    }

    /// The change that undoes this one.
    pub fn invert(&self) -> Change {
        match self.clone() {
            Change::PropertySet {
                store,
                property,
                old,
                new,
            } => Change::PropertySet {
                store,
                property,
                old: new,
                new: old,
            },
            Change::RelationshipChanged {
                player1,
                player2,
                old,
                new,
            } => Change::RelationshipChanged {
                player1,
                player2,
                old: new,
                new: old,
            },
            Change::AvailableTechChanged {
                player,
                category,
                tech,
                available,
            } => Change::AvailableTechChanged {
                player,
                category,
                tech,
                available: !available,
            },
            Change::TechChanged { player, tech, known } => Change::TechChanged {
                player,
                tech,
                known: !known,
            },
            Change::FrontierChanged { player, old, new } => Change::FrontierChanged {
                player,
                old: new,
                new: old,
            },
            Change::ProductionRuleChanged {
                frontier,
                rule,
                present,
            } => Change::ProductionRuleChanged {
                frontier,
                rule,
                present: !present,
            },
            Change::SupportChanged {
                support,
                player,
                granted,
            } => Change::SupportChanged {
                support,
                player,
                granted: !granted,
            },
            Change::OwnerChanged {
                territory,
                old,
                new,
            } => Change::OwnerChanged {
                territory,
                old: new,
                new: old,
            },
            Change::UnitOwnerChanged {
                territory,
                unit,
                old,
                new,
            } => Change::UnitOwnerChanged {
                territory,
                unit,
                old: new,
                new: old,
            },
            Change::UnitsAddedToPlayer { player, units } => {
                Change::UnitsRemovedFromPlayer { player, units }
            }
            Change::UnitsRemovedFromPlayer { player, units } => {
                Change::UnitsAddedToPlayer { player, units }
            }
            Change::UnitsAddedToTerritory { territory, units } => {
                Change::UnitsRemovedFromTerritory { territory, units }
            }
            Change::UnitsRemovedFromTerritory { territory, units } => {
                Change::UnitsAddedToTerritory { territory, units }
            }
            Change::ResourceChanged {
                player,
                resource,
                delta,
            } => Change::ResourceChanged {
                player,
                resource,
                delta: -delta,
            },
            Change::GameOverChanged { old, new } => Change::GameOverChanged { old: new, new: old },
            Change::Composite { changes } => Change::Composite {
                changes: changes.iter().rev().map(Change::invert).collect(),
            },
        }
    }
}

/// Removes every unit of `removed` or, when one is missing, none of them.
fn remove_units(
    units: &mut Vec<Unit>,
    removed: &[Unit],
    location: &str,
) -> Result<(), ChangeError> {
    if let Some(missing) = removed.iter().find(|r| !units.iter().any(|u| u.id == r.id)) {
        return Err(ChangeError::UnknownUnit {
            unit: missing.id,
            location: location.to_string(),
        });
    }
    units.retain(|u| !removed.iter().any(|r| r.id == u.id));
    Ok(())
}

impl GameData {
    /// Apply a change in place. The single mutation path used during play.
    pub fn apply(&mut self, change: &Change) -> Result<(), ChangeError> {
        match change {
            Change::PropertySet {
                store,
                property,
                new,
                ..
            } => {
                let target = self
                    .stores
                    .get_mut(store)
                    .ok_or_else(|| ChangeError::UnknownStore(store.clone()))?;
                match new {
                    Some(value) => property.set(target, value.clone()).map_err(|reason| {
                        ChangeError::Property {
                            store: store.clone(),
                            property: property.name().to_string(),
                            reason,
                        }
                    })?,
                    None => property.reset(target),
                }
            }
            Change::RelationshipChanged {
                player1,
                player2,
                new,
                ..
            } => {
                for p in [player1, player2] {
                    if !self.players.contains_key(p) {
                        return Err(ChangeError::UnknownPlayer(p.clone()));
                    }
                }
                let key = pair_key(player1, player2);
                match new {
                    Some(relationship) => {
                        self.relationships.insert(key, relationship.clone());
                    }
                    None => {
                        self.relationships.remove(&key);
                    }
                }
            }
            Change::AvailableTechChanged {
                player,
                category,
                tech,
                available,
            } => {
                let p = self.player_mut(player)?;
                if *available {
                    p.available_techs
                        .entry(category.clone())
                        .or_default()
                        .insert(tech.clone());
                } else if let Some(techs) = p.available_techs.get_mut(category) {
                    techs.remove(tech);
                    if techs.is_empty() {
                        p.available_techs.remove(category);
                    }
                }
            }
            Change::TechChanged { player, tech, known } => {
                let p = self.player_mut(player)?;
                if *known {
                    p.techs.insert(tech.clone());
                } else {
                    p.techs.remove(tech);
                }
            }
            Change::FrontierChanged { player, new, .. } => {
                if let Some(frontier) = new {
                    if !self.frontiers.contains_key(frontier) {
                        return Err(ChangeError::UnknownFrontier(frontier.clone()));
                    }
                }
                self.player_mut(player)?.frontier = new.clone();
            }
            Change::ProductionRuleChanged {
                frontier,
                rule,
                present,
            } => {
                let rules = self
                    .frontiers
                    .get_mut(frontier)
                    .ok_or_else(|| ChangeError::UnknownFrontier(frontier.clone()))?;
                if *present {
                    if !rules.contains(rule) {
                        rules.push(rule.clone());
                    }
                } else {
                    rules.retain(|r| r != rule);
                }
            }
            Change::SupportChanged {
                support,
                player,
                granted,
            } => {
                let players = self
                    .unit_supports
                    .get_mut(support)
                    .ok_or_else(|| ChangeError::UnknownSupport(support.clone()))?;
                if *granted {
                    players.insert(player.clone());
                } else {
                    players.remove(player);
                }
            }
            Change::OwnerChanged { territory, new, .. } => {
                self.territory_mut(territory)?.owner = new.clone();
            }
            Change::UnitOwnerChanged {
                territory,
                unit,
                new,
                ..
            } => {
                let t = self.territory_mut(territory)?;
                let u = t
                    .units
                    .iter_mut()
                    .find(|u| u.id == *unit)
                    .ok_or_else(|| ChangeError::UnknownUnit {
                        unit: *unit,
                        location: territory.clone(),
                    })?;
                u.owner = new.clone();
            }
            Change::UnitsAddedToPlayer { player, units } => {
                self.player_mut(player)?.unplaced.extend(units.iter().cloned());
            }
            Change::UnitsRemovedFromPlayer { player, units } => {
                let p = self.player_mut(player)?;
                remove_units(&mut p.unplaced, units, player)?;
            }
            Change::UnitsAddedToTerritory { territory, units } => {
                self.territory_mut(territory)?
                    .units
                    .extend(units.iter().cloned());
            }
            Change::UnitsRemovedFromTerritory { territory, units } => {
                let t = self.territory_mut(territory)?;
                remove_units(&mut t.units, units, territory)?;
            }
            Change::ResourceChanged {
                player,
                resource,
                delta,
            } => {
                let p = self.player_mut(player)?;
                let quantity = p.resource(resource) + delta;
                if quantity < 0 {
                    return Err(ChangeError::NegativeResource {
                        player: player.clone(),
                        resource: resource.clone(),
                        quantity,
                    });
                }
                // Zero quantities are never stored.
                if quantity == 0 {
                    p.resources.remove(resource);
                } else {
                    p.resources.insert(resource.clone(), quantity);
                }
            }
            Change::GameOverChanged { new, .. } => {
                self.game_over = new.clone();
            }
            Change::Composite { changes } => {
                for (applied, c) in changes.iter().enumerate() {
                    if let Err(err) = self.apply(c) {
                        self.undo_prefix(&changes[..applied]);
                        return Err(err);
                    }
                }
            }
        }
        Ok(())
    }

    /// Roll back the already applied head of a rejected composite.
    fn undo_prefix(&mut self, applied: &[Change]) {
        for change in applied.iter().rev() {
            if let Err(err) = self.apply(&change.invert()) {
                tracing::error!(
                    %err,
                    change = change.change_type_str(),
                    "could not undo partial composite"
                );
            }
        }
    }

    fn player_mut(&mut self, name: &str) -> Result<&mut super::game::Player, ChangeError> {
        self.players
            .get_mut(name)
            .ok_or_else(|| ChangeError::UnknownPlayer(name.to_string()))
    }

    fn territory_mut(&mut self, name: &str) -> Result<&mut super::game::Territory, ChangeError> {
        self.territories
            .get_mut(name)
            .ok_or_else(|| ChangeError::UnknownTerritory(name.to_string()))
    }
}
