#![allow(dead_code)]

use trigger_engine::model::*;
use trigger_engine::rules::{ConditionDef, RuleSetDef, TriggerDef};
use trigger_engine::scenario::Scenario;
use trigger_engine::testutil::Harness;

/// A small European map.
///
/// Germany (10 PUs) holds Germany and Poland, which Russia held first. Russia
/// (20 PUs) holds Karelia and Russia, whose factory is infrastructure. Germany
/// is at war with Russia and allied with Italy (5 PUs). Italy and Russia are
/// neutral.
pub fn europe() -> Scenario {
    let mut s = Scenario::new();
    s.player("Germany").pus(10);
    s.player("Russia").pus(20);
    s.player("Italy").pus(5);

    s.add_unit_type("infantry");
    s.add_unit_type("armour");
    s.add_unit_type_with("factory", &[("isInfrastructure", "true")]);

    s.territory("Germany", Some("Germany"))
        .capital_of("Germany")
        .units("infantry", 2, "Germany");
    s.territory("Poland", Some("Germany"))
        .original_owner("Russia")
        .units("armour", 1, "Germany");
    s.territory("Karelia", Some("Russia"))
        .units("infantry", 1, "Russia");
    s.territory("Russia", Some("Russia"))
        .capital_of("Russia")
        .units("factory", 1, "Russia");
    s.add_sea_zone("Baltic Sea Zone");

    s.make_at_war("Germany", "Russia");
    s.make_allies("Germany", "Italy");
    s.make_neutral("Italy", "Russia");
    s
}

pub fn condition(name: &str) -> ConditionDef {
    ConditionDef {
        name: name.to_string(),
        attached_to: "Germany".to_string(),
        ..Default::default()
    }
}

/// A condition over `children` combined with `condition_type`.
pub fn composite(name: &str, condition_type: &str, children: &[&str]) -> ConditionDef {
    ConditionDef {
        condition_type: Some(condition_type.to_string()),
        conditions: children.iter().map(|c| c.to_string()).collect(),
        ..condition(name)
    }
}

/// Germany directly owns every listed territory.
pub fn owns(name: &str, territories: &str) -> ConditionDef {
    ConditionDef {
        direct_ownership_territories: Some(territories.to_string()),
        ..condition(name)
    }
}

pub fn trigger(name: &str) -> TriggerDef {
    TriggerDef {
        name: name.to_string(),
        attached_to: "Germany".to_string(),
        ..Default::default()
    }
}

/// A trigger granting `count` PUs.
pub fn income(name: &str, count: i64) -> TriggerDef {
    TriggerDef {
        resource: Some(PUS.to_string()),
        resource_count: Some(count),
        ..trigger(name)
    }
}

pub fn rules(conditions: Vec<ConditionDef>, triggers: Vec<TriggerDef>) -> RuleSetDef {
    RuleSetDef {
        conditions,
        triggers,
        ..Default::default()
    }
}

/// Load `def` over the European map.
pub fn harness(def: RuleSetDef) -> Harness {
    Harness::load(europe().build(), &def).unwrap()
}

pub fn read_lines(path: &std::path::Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}
