//! Attribute stores: named bags of typed, resettable properties attached to
//! players, territories, territory effects, relationship types and unit types.
//!
//! Every attachment kind has a fixed property table. Names are resolved once
//! into a [`PropertyHandle`]; after that no lookup goes through strings.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum OwnerKind {
    Player,
    Territory,
    TerritoryEffect,
    RelationshipType,
    UnitType,
}

string_enum!(OwnerKind {
    Player => "player",
    Territory => "territory",
    TerritoryEffect => "territory_effect",
    RelationshipType => "relationship_type",
    UnitType => "unit_type",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum AttachmentKind {
    Player,
    Rules,
    Trigger,
    Territory,
    TerritoryEffect,
    RelationshipType,
    Unit,
}

string_enum!(AttachmentKind {
    Player => "PlayerAttachment",
    Rules => "RulesAttachment",
    Trigger => "TriggerAttachment",
    Territory => "TerritoryAttachment",
    TerritoryEffect => "TerritoryEffectAttachment",
    RelationshipType => "RelationshipTypeAttachment",
    Unit => "UnitAttachment",
});

impl AttachmentKind {
    pub fn owner_kind(self) -> OwnerKind {
        match self {
            AttachmentKind::Player | AttachmentKind::Rules | AttachmentKind::Trigger => {
                OwnerKind::Player
            }
            AttachmentKind::Territory => OwnerKind::Territory,
            AttachmentKind::TerritoryEffect => OwnerKind::TerritoryEffect,
            AttachmentKind::RelationshipType => OwnerKind::RelationshipType,
            AttachmentKind::Unit => OwnerKind::UnitType,
        }
    }

    /// Attachment name used when a rule does not name one explicitly.
    pub fn default_name(self) -> &'static str {
        match self {
            AttachmentKind::Player => "playerAttachment",
            AttachmentKind::Rules => "rulesAttachment",
            AttachmentKind::Trigger => "triggerAttachment",
            AttachmentKind::Territory => "territoryAttachment",
            AttachmentKind::TerritoryEffect => "territoryEffectAttachment",
            AttachmentKind::RelationshipType => "relationshipTypeAttachment",
            AttachmentKind::Unit => "unitAttachment",
        }
    }

    pub fn properties(self) -> &'static [PropertyDef] {
        match self {
            AttachmentKind::Player => PLAYER_PROPERTIES,
            AttachmentKind::Rules => RULES_PROPERTIES,
            AttachmentKind::Trigger => TRIGGER_PROPERTIES,
            AttachmentKind::Territory => TERRITORY_PROPERTIES,
            AttachmentKind::TerritoryEffect => TERRITORY_EFFECT_PROPERTIES,
            AttachmentKind::RelationshipType => RELATIONSHIP_TYPE_PROPERTIES,
            AttachmentKind::Unit => UNIT_PROPERTIES,
        }
    }
}

/// Identifies one store: which entity it hangs off and under what name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreKey {
    pub owner_kind: OwnerKind,
    pub owner: String,
    pub attachment: String,
}

impl StoreKey {
    pub fn new(owner_kind: OwnerKind, owner: impl Into<String>, attachment: impl Into<String>) -> Self {
        Self {
            owner_kind,
            owner: owner.into(),
            attachment: attachment.into(),
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} attached to {}", self.attachment, self.owner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    Int,
    Bool,
    Text,
    /// Colon-joined list. Setting appends unless the edit clears first.
    List,
}

#[derive(Debug)]
pub struct PropertyDef {
    pub name: &'static str,
    pub ty: PropertyType,
    /// Raw value read when the property is absent.
    pub default: &'static str,
}

const fn prop(name: &'static str, ty: PropertyType, default: &'static str) -> PropertyDef {
    PropertyDef { name, ty, default }
}

use PropertyType::{Bool, Int, List, Text};

const PLAYER_PROPERTIES: &[PropertyDef] = &[
    prop("vps", Int, "0"),
    prop("captureVps", Int, "0"),
    prop("retainCapitalNumber", Int, "1"),
    prop("retainCapitalProduceNumber", Int, "1"),
    prop("giveUnitControl", List, ""),
    prop("captureUnitOnEnteringBy", List, ""),
    prop("destroysPUs", Bool, "false"),
    prop("immuneToBlockade", Bool, "false"),
];

const RULES_PROPERTIES: &[PropertyDef] = &[
    prop("switch", Bool, "true"),
    prop("uses", Int, "-1"),
    prop("objectiveValue", Int, "0"),
    prop("chance", Text, "1:1"),
    prop("chanceIncrementOnFailure", Int, "0"),
    prop("chanceDecrementOnSuccess", Int, "0"),
];

const TRIGGER_PROPERTIES: &[PropertyDef] = &[
    prop("uses", Int, "-1"),
    prop("usedThisRound", Bool, "false"),
    prop("chance", Text, "1:1"),
    prop("chanceIncrementOnFailure", Int, "0"),
    prop("chanceDecrementOnSuccess", Int, "0"),
];

const TERRITORY_PROPERTIES: &[PropertyDef] = &[
    prop("production", Int, "0"),
    prop("unitProduction", Int, "0"),
    prop("victoryCity", Int, "0"),
    prop("capital", Text, ""),
    prop("originalFactory", Bool, "false"),
    prop("isImpassable", Bool, "false"),
    prop("blockadeZone", Bool, "false"),
    prop("kamikazeZone", Bool, "false"),
    prop("territoryEffect", List, ""),
    prop("changeUnitOwners", List, ""),
];

const TERRITORY_EFFECT_PROPERTIES: &[PropertyDef] = &[
    prop("combatDefenseEffect", List, ""),
    prop("combatOffenseEffect", List, ""),
    prop("noBlitz", List, ""),
    prop("unitsNotAllowed", List, ""),
    prop("movementCostModifier", List, ""),
];

const RELATIONSHIP_TYPE_PROPERTIES: &[PropertyDef] = &[
    prop("archeType", Text, "war"),
    prop("canMoveLandUnitsOverOwnedLand", Bool, "true"),
    prop("canMoveAirUnitsOverOwnedLand", Bool, "true"),
    prop("alliancesCanChainTogether", Bool, "false"),
    prop("isDefaultWarPosition", Bool, "false"),
    prop("upkeepCost", Text, ""),
    prop("canLandAir", Bool, "false"),
    prop("givesBackOriginalTerritories", Bool, "false"),
];

const UNIT_PROPERTIES: &[PropertyDef] = &[
    prop("movement", Int, "0"),
    prop("attack", Int, "0"),
    prop("defense", Int, "0"),
    prop("hitPoints", Int, "1"),
    prop("transportCapacity", Int, "-1"),
    prop("isSea", Bool, "false"),
    prop("isAir", Bool, "false"),
    prop("isSub", Bool, "false"),
    prop("isInfrastructure", Bool, "false"),
    prop("canBlitz", Bool, "false"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Int(i64),
    Bool(bool),
    Text(String),
    List(Vec<String>),
}

impl PropertyValue {
    /// The string form compared against incoming edits.
    pub fn raw(&self) -> String {
        match self {
            PropertyValue::Int(v) => v.to_string(),
            PropertyValue::Bool(v) => v.to_string(),
            PropertyValue::Text(v) => v.clone(),
            PropertyValue::List(items) => items.join(":"),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(v) => Some(v),
            _ => None,
        }
    }

    fn matches(&self, ty: PropertyType) -> bool {
        matches!(
            (self, ty),
            (PropertyValue::Int(_), PropertyType::Int)
                | (PropertyValue::Bool(_), PropertyType::Bool)
                | (PropertyValue::Text(_), PropertyType::Text)
                | (PropertyValue::List(_), PropertyType::List)
        )
    }
}

/// A property name resolved against its attachment kind's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PropertyHandle {
    kind: AttachmentKind,
    index: u16,
}

impl PropertyHandle {
    pub fn resolve(kind: AttachmentKind, name: &str) -> Option<Self> {
        kind.properties()
            .iter()
            .position(|def| def.name == name)
            .map(|index| Self {
                kind,
                index: index as u16,
            })
    }

    pub fn kind(&self) -> AttachmentKind {
        self.kind
    }

    pub fn def(&self) -> &'static PropertyDef {
        &self.kind.properties()[self.index as usize]
    }

    pub fn name(&self) -> &'static str {
        self.def().name
    }

    /// Parse a raw string into this property's type. Lists split on `:`.
    pub fn parse(&self, raw: &str) -> Result<PropertyValue, String> {
        let def = self.def();
        match def.ty {
            PropertyType::Int => raw
                .trim()
                .parse::<i64>()
                .map(PropertyValue::Int)
                .map_err(|_| format!("{} expects an integer, got '{raw}'", def.name)),
            PropertyType::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(PropertyValue::Bool(true)),
                "false" => Ok(PropertyValue::Bool(false)),
                _ => Err(format!("{} expects true or false, got '{raw}'", def.name)),
            },
            PropertyType::Text => Ok(PropertyValue::Text(raw.to_string())),
            PropertyType::List => Ok(PropertyValue::List(
                raw.split(':')
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            )),
        }
    }

    /// Value read when the property is absent.
    pub fn default_value(&self) -> PropertyValue {
        let def = self.def();
        match def.ty {
            PropertyType::Int => PropertyValue::Int(def.default.parse().unwrap_or(0)),
            PropertyType::Bool => PropertyValue::Bool(def.default == "true"),
            PropertyType::Text => PropertyValue::Text(def.default.to_string()),
            PropertyType::List => PropertyValue::List(Vec::new()),
        }
    }

    /// The explicitly stored value, `None` when absent.
    pub fn stored<'a>(&self, store: &'a AttributeStore) -> Option<&'a PropertyValue> {
        store.values.get(self)
    }

    pub fn get(&self, store: &AttributeStore) -> PropertyValue {
        self.stored(store)
            .cloned()
            .unwrap_or_else(|| self.default_value())
    }

    pub fn get_raw(&self, store: &AttributeStore) -> String {
        match self.stored(store) {
            Some(value) => value.raw(),
            None => self.def().default.to_string(),
        }
    }

    pub fn set(&self, store: &mut AttributeStore, value: PropertyValue) -> Result<(), String> {
        if store.kind != self.kind {
            return Err(format!(
                "{} is not a property of {}",
                self.name(),
                store.kind
            ));
        }
        if !value.matches(self.def().ty) {
            return Err(format!("{} cannot hold {:?}", self.name(), value));
        }
        store.values.insert(*self, value);
        Ok(())
    }

    /// Set from a raw string. Lists append to what is already there.
    pub fn set_raw(&self, store: &mut AttributeStore, raw: &str) -> Result<(), String> {
        let value = self.value_after_set(store, raw, false)?;
        self.set(store, value)
    }

    pub fn reset(&self, store: &mut AttributeStore) {
        store.values.remove(self);
    }

    /// The value the store would hold after setting `raw`.
    pub fn value_after_set(
        &self,
        store: &AttributeStore,
        raw: &str,
        clear_first: bool,
    ) -> Result<PropertyValue, String> {
        let parsed = self.parse(raw)?;
        match parsed {
            PropertyValue::List(mut items) if !clear_first => {
                let mut current = match self.stored(store) {
                    Some(PropertyValue::List(existing)) => existing.clone(),
                    _ => Vec::new(),
                };
                current.append(&mut items);
                Ok(PropertyValue::List(current))
            }
            other => Ok(other),
        }
    }
}

impl From<PropertyHandle> for String {
    fn from(h: PropertyHandle) -> Self {
        format!("{}.{}", h.kind, h.name())
    }
}

impl TryFrom<String> for PropertyHandle {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let (kind, name) = s
            .split_once('.')
            .ok_or_else(|| format!("malformed property handle: {s}"))?;
        let kind = AttachmentKind::parse(kind).ok_or_else(|| format!("unknown attachment kind: {kind}"))?;
        PropertyHandle::resolve(kind, name).ok_or_else(|| format!("unknown property: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeStore {
    pub kind: AttachmentKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    values: BTreeMap<PropertyHandle, PropertyValue>,
}

impl AttributeStore {
    pub fn new(kind: AttachmentKind) -> Self {
        Self {
            kind,
            values: BTreeMap::new(),
        }
    }

    /// Convenience read by name; `None` if the name is not in this kind's table.
    pub fn get(&self, name: &str) -> Option<PropertyValue> {
        PropertyHandle::resolve(self.kind, name).map(|h| h.get(self))
    }

    pub fn int(&self, name: &str) -> i64 {
        self.get(name).and_then(|v| v.as_int()).unwrap_or(0)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.get(name).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    pub fn text(&self, name: &str) -> String {
        self.get(name).map(|v| v.raw()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
