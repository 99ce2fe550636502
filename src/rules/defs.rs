//! Serde shapes for rule definitions as a map author writes them.
//!
//! Values keep the game's colon-separated micro-syntax; the loader parses and
//! validates them against the game data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuleSetDef {
    pub conditions: Vec<ConditionDef>,
    pub triggers: Vec<TriggerDef>,
    /// Notification and victory keys to their message text.
    pub notifications: BTreeMap<String, String>,
}

/// A rules-style condition: composite children plus leaf predicates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConditionDef {
    pub name: String,
    pub attached_to: String,
    /// Defaults to `[attached_to]`.
    pub players: Vec<String>,
    /// `AND`, `OR`, `n` or `n-m`.
    pub condition_type: Option<String>,
    pub invert: bool,
    pub conditions: Vec<String>,
    /// `hit:sides`.
    pub chance: Option<String>,
    pub chance_increment_on_failure: i64,
    pub chance_decrement_on_success: i64,

    pub switch: Option<bool>,
    pub uses: Option<i64>,
    pub objective_value: Option<i64>,
    /// `1:3-5:7-+`.
    pub rounds: Option<String>,
    pub game_property: Option<String>,
    pub direct_presence_territories: Option<String>,
    pub allied_presence_territories: Option<String>,
    pub enemy_presence_territories: Option<String>,
    pub direct_exclusion_territories: Option<String>,
    pub allied_exclusion_territories: Option<String>,
    pub enemy_exclusion_territories: Option<String>,
    pub enemy_surface_exclusion_territories: Option<String>,
    pub allied_ownership_territories: Option<String>,
    pub direct_ownership_territories: Option<String>,
    /// `count:type[:type]` or `count:any`, one entry per requirement.
    pub unit_presence: Vec<String>,
    #[serde(rename = "isAI")]
    pub is_ai: Option<bool>,
    /// `[count:]p1:p2...`.
    pub at_war_players: Option<String>,
    /// `[count:]tech1:tech2...`.
    pub techs: Option<String>,
    /// `p1:p2:selector[:minRounds]`.
    pub relationship: Vec<String>,
    /// `n:currentRound|allRounds`.
    #[serde(rename = "destroyedTUV")]
    pub destroyed_tuv: Option<String>,
    /// `attacker|any:defender|any:result:currentRound|a-b:territory...`.
    pub battle: Vec<String>,
}

/// Which attribute stores a property edit targets and what it writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PropertyEditDef {
    /// Owners by name. Empty for player attachments means the trigger's players.
    pub targets: Vec<String>,
    /// `name` or `name:AttachmentKind`. Defaults to the kind's usual name.
    pub attachment: Option<String>,
    /// `value:property`, optionally prefixed with `-clear-` or `-reset-`.
    pub edits: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TriggerDef {
    pub name: String,
    pub attached_to: String,
    pub players: Vec<String>,
    pub condition_type: Option<String>,
    pub invert: bool,
    pub conditions: Vec<String>,
    pub chance: Option<String>,
    pub chance_increment_on_failure: i64,
    pub chance_decrement_on_success: i64,
    pub uses: Option<i64>,
    /// `before:step` / `after:step`.
    pub when: Vec<String>,

    pub notification: Option<String>,
    pub player_property: Option<PropertyEditDef>,
    pub relationship_type_property: Option<PropertyEditDef>,
    pub territory_property: Option<PropertyEditDef>,
    pub territory_effect_property: Option<PropertyEditDef>,
    pub unit_property: Option<PropertyEditDef>,
    /// `p1:p2:oldSelector:newType`.
    pub relationship_change: Vec<String>,
    /// `category:tech:-tech`.
    pub available_tech: Vec<String>,
    pub tech: Vec<String>,
    pub frontier: Option<String>,
    /// `frontier:rule` or `frontier:-rule`.
    pub production_rule: Vec<String>,
    /// `support:-support`.
    pub support: Vec<String>,
    /// `territory|all:oldOwner|any:newOwner:captured`.
    pub change_ownership: Vec<String>,
    /// `[count:]territory|all:type|all...`.
    pub remove_units: Vec<String>,
    /// `[count:]type...`.
    pub purchase: Vec<String>,
    /// `[count:]territory:type...`.
    pub placement: Vec<String>,
    pub resource: Option<String>,
    pub resource_count: Option<i64>,
    /// `name:times:useUses:testUses:testConditions:testChance`.
    pub activate_trigger: Vec<String>,
    pub victory: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_keys_and_defaults() {
        let def: TriggerDef = serde_json::from_str(
            r#"{"name":"t","attachedTo":"Germany","resourceCount":5,"when":["after:germanyEndTurn"]}"#,
        )
        .unwrap();
        assert_eq!(def.resource_count, Some(5));
        assert_eq!(def.when, vec!["after:germanyEndTurn"]);
        assert!(def.players.is_empty());

        let cond: ConditionDef =
            serde_json::from_str(r#"{"name":"c","attachedTo":"Germany","isAI":true,"destroyedTUV":"5:currentRound"}"#)
                .unwrap();
        assert_eq!(cond.is_ai, Some(true));
        assert_eq!(cond.destroyed_tuv.as_deref(), Some("5:currentRound"));
    }
}
