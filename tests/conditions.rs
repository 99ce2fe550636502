mod common;

use common::*;
use trigger_engine::model::PropertyValue;
use trigger_engine::rules::{ConditionDef, ConditionMemo, test_condition};

fn satisfied(def_conditions: Vec<ConditionDef>, name: &str) -> bool {
    let mut h = harness(rules(def_conditions, vec![]));
    h.test(name).unwrap().satisfied
}

#[test]
fn direct_ownership_needs_every_listed_territory() {
    assert!(satisfied(vec![owns("c", "Germany:Poland")], "c"));
    assert!(!satisfied(vec![owns("c", "Germany:Karelia")], "c"));
    assert!(satisfied(vec![owns("c", "1:Germany:Karelia")], "c"));
}

#[test]
fn and_or_over_children() {
    let base = || {
        vec![
            owns("poland", "Poland"),
            owns("karelia", "Karelia"),
        ]
    };

    let mut both = base();
    both.push(composite("both", "AND", &["poland", "karelia"]));
    assert!(!satisfied(both, "both"));

    let mut either = base();
    either.push(composite("either", "OR", &["poland", "karelia"]));
    assert!(satisfied(either, "either"));
}

#[test]
fn numeric_condition_type_needs_an_exact_count() {
    let children = ["germany", "poland", "karelia"];
    let with = |condition_type: &str| {
        vec![
            owns("germany", "Germany"),
            owns("poland", "Poland"),
            owns("karelia", "Karelia"),
            composite("n", condition_type, &children),
        ]
    };
    // Two of the three children hold.
    assert!(!satisfied(with("1"), "n"));
    assert!(satisfied(with("2"), "n"));
    assert!(!satisfied(with("3"), "n"));
    assert!(satisfied(with("1-2"), "n"));
    assert!(!satisfied(with("3-3"), "n"));
}

#[test]
fn condition_type_is_ignored_without_children() {
    let leaf_or = ConditionDef {
        condition_type: Some("OR".into()),
        ..owns("c", "Germany:Poland")
    };
    assert!(satisfied(vec![leaf_or], "c"));

    let leaf_count = ConditionDef {
        condition_type: Some("2".into()),
        ..owns("c", "Germany:Poland")
    };
    assert!(satisfied(vec![leaf_count], "c"));

    let failing_leaf = ConditionDef {
        condition_type: Some("OR".into()),
        ..owns("c", "Karelia")
    };
    assert!(!satisfied(vec![failing_leaf], "c"));
}

#[test]
fn invert_flips_the_final_result() {
    let inverted = ConditionDef {
        invert: true,
        ..owns("not_karelia", "Karelia")
    };
    assert!(satisfied(vec![inverted], "not_karelia"));

    let inverted_composite = ConditionDef {
        invert: true,
        ..composite("neither", "OR", &["poland"])
    };
    assert!(!satisfied(vec![owns("poland", "Poland"), inverted_composite], "neither"));
}

#[test]
fn switched_off_condition_fails_even_when_checks_pass() {
    let off = ConditionDef {
        switch: Some(false),
        ..owns("c", "Poland")
    };
    assert!(!satisfied(vec![off], "c"));
}

#[test]
fn rounds_window() {
    let def = rules(
        vec![ConditionDef {
            rounds: Some("2-+".into()),
            ..condition("late")
        }],
        vec![],
    );
    let mut h = harness(def);
    assert!(!h.test("late").unwrap().satisfied);
    h.data.round = 4;
    assert!(h.test("late").unwrap().satisfied);
}

#[test]
fn game_property_gate() {
    let def = rules(
        vec![ConditionDef {
            game_property: Some("Use Triggers".into()),
            ..condition("c")
        }],
        vec![],
    );
    let mut h = harness(def);
    assert!(!h.test("c").unwrap().satisfied);
    h.data
        .properties
        .insert("Use Triggers".into(), PropertyValue::Bool(true));
    assert!(h.test("c").unwrap().satisfied);
}

#[test]
fn relationship_age_is_counted_in_rounds() {
    let def = rules(
        vec![
            ConditionDef {
                relationship: vec!["Germany:Russia:anyWar".into()],
                ..condition("at_war")
            },
            ConditionDef {
                relationship: vec!["Germany:Russia:War:2".into()],
                ..condition("long_war")
            },
            ConditionDef {
                relationship: vec!["Germany:Italy:anyWar".into()],
                ..condition("italy_war")
            },
        ],
        vec![],
    );
    let mut h = harness(def);
    assert!(h.test("at_war").unwrap().satisfied);
    assert!(!h.test("long_war").unwrap().satisfied);
    assert!(!h.test("italy_war").unwrap().satisfied);

    h.data.round = 3;
    assert!(h.test("long_war").unwrap().satisfied);
}

#[test]
fn at_war_without_count_means_none() {
    let none = ConditionDef {
        at_war_players: Some("Russia".into()),
        ..condition("none")
    };
    let one = ConditionDef {
        at_war_players: Some("1:Russia:Italy".into()),
        ..condition("one")
    };
    let mut h = harness(rules(vec![none, one], vec![]));
    assert!(!h.test("none").unwrap().satisfied);
    assert!(h.test("one").unwrap().satisfied);
}

#[test]
fn techs_count_known_technologies() {
    let mut s = europe();
    s.player("Germany").tech("jetPower");
    s.add_technology("radar");
    let def = rules(
        vec![
            ConditionDef {
                techs: Some("1:jetPower:radar".into()),
                ..condition("one_tech")
            },
            ConditionDef {
                techs: Some("2:jetPower:radar".into()),
                ..condition("two_techs")
            },
        ],
        vec![],
    );
    let mut h = trigger_engine::testutil::Harness::load(s.build(), &def).unwrap();
    assert!(h.test("one_tech").unwrap().satisfied);
    assert!(!h.test("two_techs").unwrap().satisfied);
}

#[test]
fn presence_with_unit_requirements() {
    let def = rules(
        vec![
            ConditionDef {
                direct_presence_territories: Some("Poland".into()),
                unit_presence: vec!["1:armour".into()],
                ..condition("one_tank")
            },
            ConditionDef {
                direct_presence_territories: Some("Poland".into()),
                unit_presence: vec!["2:armour".into()],
                ..condition("two_tanks")
            },
            ConditionDef {
                enemy_exclusion_territories: Some("Karelia".into()),
                ..condition("karelia_clear")
            },
            ConditionDef {
                enemy_exclusion_territories: Some("Poland".into()),
                ..condition("poland_clear")
            },
        ],
        vec![],
    );
    let mut h = harness(def);
    assert!(h.test("one_tank").unwrap().satisfied);
    assert!(!h.test("two_tanks").unwrap().satisfied);
    assert!(!h.test("karelia_clear").unwrap().satisfied);
    assert!(h.test("poland_clear").unwrap().satisfied);
}

#[test]
fn allied_ownership_of_original_territories() {
    // Poland started Russian, so Germany's only original territory is Germany.
    let def = rules(
        vec![
            ConditionDef {
                allied_ownership_territories: Some("original".into()),
                ..condition("originals")
            },
            ConditionDef {
                allied_ownership_territories: Some("Poland:Karelia".into()),
                ..condition("front")
            },
        ],
        vec![],
    );
    let mut h = harness(def);
    assert!(h.test("originals").unwrap().satisfied);
    assert!(!h.test("front").unwrap().satisfied);
}

#[test]
fn each_reports_how_many_territories_matched() {
    let def = rules(vec![owns("c", "each:controlled")], vec![]);
    let mut h = harness(def);
    let outcome = h.test("c").unwrap();
    assert!(outcome.satisfied);
    assert_eq!(outcome.multiplier, Some(2));
}

#[test]
fn memo_tests_each_condition_once() {
    let def = rules(
        vec![
            ConditionDef {
                chance: Some("3:6".into()),
                ..condition("lucky")
            },
            composite("a", "AND", &["lucky"]),
            composite("b", "OR", &["lucky"]),
        ],
        vec![],
    );
    let mut h = harness(def).with_rolls(&[2]);
    let (a, b, lucky) = (h.id("a"), h.id("b"), h.id("lucky"));
    let outcomes = h.run(|rules, bridge| {
        let mut memo = ConditionMemo::new();
        let first = test_condition(rules, a, &mut memo, bridge).unwrap();
        let second = test_condition(rules, b, &mut memo, bridge).unwrap();
        let again = test_condition(rules, lucky, &mut memo, bridge).unwrap();
        (first, second, again, memo.len())
    });
    assert!(outcomes.0.satisfied && outcomes.1.satisfied && outcomes.2.satisfied);
    assert_eq!(outcomes.3, 3);
    assert_eq!(h.dice.drawn(), 1);
}
