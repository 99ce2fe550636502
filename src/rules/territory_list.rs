//! Territory lists used by counted rule checks.
//!
//! A list is either explicit territory names or one group keyword, optionally
//! led by a count (`"2:France:Poland:Norway"`, `"each:controlled"`). Without a
//! count every listed territory is needed.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::error::RuleError;
use super::syntax::split_on_colon;
use crate::model::{GameData, Territory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum TerritoryGroup {
    Original,
    OriginalNoWater,
    Controlled,
    ControlledNoWater,
    All,
    Map,
    Enemy,
}

string_enum!(TerritoryGroup {
    Original => "original",
    OriginalNoWater => "originalNoWater",
    Controlled => "controlled",
    ControlledNoWater => "controlledNoWater",
    All => "all",
    Map => "map",
    Enemy => "enemy",
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerritorySource {
    Named(Vec<String>),
    Group(TerritoryGroup),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerritoryList {
    pub source: TerritorySource,
    /// Explicit number of territories needed.
    pub count: Option<u32>,
    /// `each`: needs one, and reports how many matched.
    pub count_each: bool,
}

impl TerritoryList {
    pub fn parse(name: &str, raw: &str, data: &GameData) -> Result<Self, RuleError> {
        let tokens = split_on_colon(raw);
        let mut count = None;
        let mut count_each = false;
        let mut named = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            if *token == "each" {
                count_each = true;
                count = Some(1);
                continue;
            }
            if let Some(group) = TerritoryGroup::parse(token) {
                return Ok(Self {
                    source: TerritorySource::Group(group),
                    count,
                    count_each,
                });
            }
            if i == 0 {
                if let Ok(n) = token.parse::<i64>() {
                    let n = u32::try_from(n).map_err(|_| {
                        RuleError::invalid(name, format!("territory count cannot be negative: {n}"))
                    })?;
                    count = Some(n);
                    continue;
                }
            }
            if !data.territories.contains_key(*token) {
                return Err(RuleError::unknown(name, "territory", token));
            }
            named.push(token.to_string());
        }
        if named.is_empty() {
            return Err(RuleError::invalid(name, format!("empty territory list '{raw}'")));
        }
        Ok(Self {
            source: TerritorySource::Named(named),
            count,
            count_each,
        })
    }

    pub fn group(&self) -> Option<TerritoryGroup> {
        match self.source {
            TerritorySource::Group(g) => Some(g),
            TerritorySource::Named(_) => None,
        }
    }

    /// The territories this list covers for `players`, in name order.
    pub fn resolve<'a>(&self, data: &'a GameData, players: &[String]) -> Vec<&'a Territory> {
        let names: BTreeSet<&str> = match &self.source {
            TerritorySource::Named(names) => names.iter().map(String::as_str).collect(),
            TerritorySource::Group(group) => {
                let original = || data.territories_originally_owned_by(players);
                let owned = || data.territories_owned_by(players);
                match group {
                    TerritoryGroup::Original | TerritoryGroup::Enemy => {
                        original().map(|t| t.name.as_str()).collect()
                    }
                    TerritoryGroup::OriginalNoWater => original()
                        .filter(|t| data.is_passable_land(t))
                        .map(|t| t.name.as_str())
                        .collect(),
                    TerritoryGroup::Controlled => owned().map(|t| t.name.as_str()).collect(),
                    TerritoryGroup::ControlledNoWater => owned()
                        .filter(|t| data.is_passable_land(t))
                        .map(|t| t.name.as_str())
                        .collect(),
                    TerritoryGroup::All => original()
                        .chain(owned())
                        .map(|t| t.name.as_str())
                        .collect(),
                    TerritoryGroup::Map => data.territories.keys().map(String::as_str).collect(),
                }
            }
        };
        names
            .into_iter()
            .filter_map(|n| data.territories.get(n))
            .collect()
    }

    /// How many of `resolved` must match.
    pub fn needed(&self, resolved: usize) -> usize {
        self.count.map(|c| c as usize).unwrap_or(resolved)
    }
}
