mod common;

use std::collections::{BTreeMap, BTreeSet};

use common::*;
use trigger_engine::model::*;
use trigger_engine::rules::{
    ConditionMemo, FireTriggerParams, PropertyEditDef, RuleSetDef, TriggerDef, When,
    collect_and_fire_triggers, collect_for_all_triggers_matching, collect_tests_for_all_triggers,
    project_resource_income,
};
use trigger_engine::testutil::{Harness, units_of, unplaced_of};

fn with_notes(mut def: RuleSetDef, notes: &[(&str, &str)]) -> RuleSetDef {
    def.notifications = notes
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    def
}

// ---------------------------------------------------------------------------
// Gating
// ---------------------------------------------------------------------------

#[test]
fn unsatisfied_triggers_do_nothing() {
    let def = rules(
        vec![owns("karelia", "Karelia")],
        vec![TriggerDef {
            conditions: vec!["karelia".into()],
            ..income("t", 5)
        }],
    );
    let mut h = harness(def);
    let report = h.fire_step(&["Germany"], None).unwrap();
    assert!(report.fired.is_empty());
    assert!(h.journal.is_empty());
}

#[test]
fn only_the_named_players_triggers_are_collected() {
    let mut h = harness(rules(vec![], vec![income("t", 5)]));
    let report = h.fire_step(&["Russia"], None).unwrap();
    assert!(report.fired.is_empty());
    assert_eq!(h.pus("Germany"), 10);
}

#[test]
fn filter_narrows_the_collection() {
    let mut h = harness(rules(vec![], vec![income("a", 1), income("b", 2)]));
    let report = h
        .run(|rules, bridge| {
            collect_and_fire_triggers(rules, bridge, &["Germany".to_string()], None, |t, _| {
                t.name == "b"
            })
        })
        .unwrap();
    assert_eq!(report.fired, vec!["b"]);
    assert_eq!(h.pus("Germany"), 12);
}

#[test]
fn phase_bound_triggers_fire_only_in_their_step() {
    let bound = TriggerDef {
        when: vec!["after:germanyPurchase".into()],
        ..income("bound", 5)
    };
    let mut h = harness(rules(vec![], vec![bound, income("free", 1)]));

    let report = h.fire_step(&["Germany"], None).unwrap();
    assert_eq!(report.fired, vec!["free"]);

    let report = h
        .fire_step(&["Germany"], Some(When::after("germanyPurchase")))
        .unwrap();
    assert_eq!(report.fired, vec!["bound"]);

    let report = h
        .fire_step(&["Germany"], Some(When::before("germanyPurchase")))
        .unwrap();
    assert!(report.fired.is_empty());
    assert_eq!(h.pus("Germany"), 16);
}

// ---------------------------------------------------------------------------
// Uses
// ---------------------------------------------------------------------------

#[test]
fn phase_less_uses_are_spent_at_round_end() {
    let once = TriggerDef {
        uses: Some(1),
        ..income("once", 5)
    };
    let mut h = harness(rules(vec![], vec![once]));

    h.fire_step(&["Germany"], None).unwrap();
    assert_eq!(h.pus("Germany"), 15);
    assert!(h.store("once").flag("usedThisRound"));
    assert_eq!(h.uses("once"), 1);

    h.end_round().unwrap();
    assert_eq!(h.uses("once"), 0);
    assert!(!h.store("once").flag("usedThisRound"));
    assert!(h.saw_event("Setting uses for triggers used this round."));

    let report = h.fire_step(&["Germany"], None).unwrap();
    assert!(report.fired.is_empty());
    assert_eq!(h.pus("Germany"), 15);
}

#[test]
fn phase_bound_uses_are_spent_when_the_pass_ends() {
    let step = When::before("germanyCombatMove");
    let twice = TriggerDef {
        uses: Some(2),
        when: vec![step.to_string()],
        ..income("twice", 5)
    };
    let mut h = harness(rules(vec![], vec![twice]));

    h.fire_step(&["Germany"], Some(step.clone())).unwrap();
    assert_eq!(h.uses("twice"), 1);
    assert!(!h.store("twice").flag("usedThisRound"));
    assert!(h.saw_event("Setting uses for triggers used this phase."));

    h.fire_step(&["Germany"], Some(step.clone())).unwrap();
    assert_eq!(h.uses("twice"), 0);

    let report = h.fire_step(&["Germany"], Some(step)).unwrap();
    assert!(report.fired.is_empty());
    assert_eq!(h.pus("Germany"), 20);

    let before = h.journal.len();
    h.end_round().unwrap();
    assert_eq!(h.journal.len(), before);
}

#[test]
fn unlimited_uses_never_run_out() {
    let mut h = harness(rules(vec![], vec![income("always", 1)]));
    for _ in 0..3 {
        h.fire_step(&["Germany"], None).unwrap();
        h.end_round().unwrap();
    }
    assert_eq!(h.pus("Germany"), 13);
    assert_eq!(h.uses("always"), -1);
}

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

#[test]
fn purchases_land_before_victory_is_declared() {
    let win = TriggerDef {
        victory: Some("win".into()),
        ..trigger("win")
    };
    let buy = TriggerDef {
        purchase: vec!["2:infantry".into()],
        ..trigger("buy")
    };
    let def = with_notes(rules(vec![], vec![win, buy]), &[("win", "Germany rules Europe")]);
    let mut h = harness(def);

    let report = h.fire_step(&["Germany"], None).unwrap();

    let bought = h.journal.position_of_event("2 infantry gained by Germany").unwrap();
    let won = h.journal.position_of_event("have just won the game").unwrap();
    assert!(bought < won);
    assert_eq!(unplaced_of(&h.data, "Germany", "infantry"), 2);

    let game_over = report.game_over.unwrap();
    assert_eq!(game_over.winners, vec!["Germany"]);
    assert_eq!(h.data.game_over, Some(game_over));
    assert!(h.saw_event(
        "Players: Germany have just won the game, with this victory: Germany rules Europe"
    ));
    let sounds: Vec<&str> = h.journal.sounds().collect();
    assert_eq!(
        sounds,
        vec!["triggered_victory_soundwin", "triggered_defeat_soundwin"]
    );
}

#[test]
fn each_multiplies_placements() {
    let mut s = europe();
    s.territory("Denmark", Some("Germany"));
    let def = rules(
        vec![owns("held", "each:controlled")],
        vec![TriggerDef {
            conditions: vec!["held".into()],
            placement: vec!["Germany:armour".into()],
            ..trigger("reinforce")
        }],
    );
    let mut h = Harness::load(s.build(), &def).unwrap();

    h.fire_step(&["Germany"], None).unwrap();
    assert_eq!(units_of(&h.data, "Germany", "Germany", "armour"), 3);
    assert_eq!(
        h.journal
            .events()
            .filter(|e| e.contains("Germany has 1 armour placed in Germany"))
            .count(),
        3
    );
}

#[test]
fn resources_never_go_negative() {
    let mut h = harness(rules(vec![], vec![income("fine", -50)]));
    let report = h.fire_step(&["Germany"], None).unwrap();
    assert_eq!(h.pus("Germany"), 0);
    let line = "fine: Germany met a national objective for an additional -50 PUs; end with 0 PUs";
    assert!(h.saw_event(line));
    assert_eq!(report.resource_report, format!("{line} <br />"));
}

#[test]
fn pu_multiplier_scales_only_pus() {
    let mut s = europe();
    s.property("puMultiplier", PropertyValue::Int(3));
    s.add_resource("oil");
    let oil = TriggerDef {
        resource: Some("oil".into()),
        resource_count: Some(2),
        ..trigger("oil")
    };
    let mut h = Harness::load(s.build(), &rules(vec![], vec![income("pus", 5), oil])).unwrap();
    h.fire_step(&["Germany"], None).unwrap();
    assert_eq!(h.pus("Germany"), 25);
    assert_eq!(h.data.players["Germany"].resource("oil"), 2);
}

#[test]
fn notifications_play_once_per_key() {
    let note = |name: &str| TriggerDef {
        notification: Some("war".into()),
        ..trigger(name)
    };
    let def = with_notes(
        rules(vec![], vec![note("n1"), note("n2")]),
        &[("war", "<b>War</b> has come")],
    );
    let mut h = harness(def);
    h.fire_step(&["Germany"], None).unwrap();

    let notes: Vec<&str> = h
        .journal
        .events()
        .filter(|e| e.starts_with("Note to players"))
        .collect();
    assert_eq!(notes, vec!["Note to players Germany: <b>War</b> has come"]);
    assert_eq!(
        h.journal.sounds().collect::<Vec<_>>(),
        vec!["triggered_notification_soundwar"]
    );
    assert!(h.journal.entries.iter().any(|e| matches!(
        e,
        JournalEntry::Display { message, title, .. }
            if message == "<html><b>War</b> has come</html>" && title == "Notification"
    )));
}

#[test]
fn long_notifications_are_shortened_in_history() {
    let long = format!("<p>{}</p>", "x".repeat(300));
    let def = with_notes(
        rules(
            vec![],
            vec![TriggerDef {
                notification: Some("long".into()),
                ..trigger("n")
            }],
        ),
        &[("long", long.as_str())],
    );
    let mut h = harness(def);
    h.fire_step(&["Germany"], None).unwrap();
    let note = h
        .journal
        .events()
        .find(|e| e.starts_with("Note to players"))
        .unwrap()
        .to_string();
    let record = note.trim_start_matches("Note to players Germany: ");
    assert!(record.ends_with("...."));
    assert!(!record.contains('<'));
    assert_eq!(record.chars().count(), 190);
}

#[test]
fn property_edits_skip_values_already_held() {
    let edit = |edits: &[&str]| PropertyEditDef {
        edits: edits.iter().map(|e| e.to_string()).collect(),
        ..Default::default()
    };
    let def = rules(
        vec![],
        vec![
            TriggerDef {
                player_property: Some(edit(&["3:vps", "0:captureVps"])),
                ..trigger("vps")
            },
        ],
    );
    let mut h = harness(def);
    h.fire_step(&["Germany"], None).unwrap();

    let key = StoreKey::new(OwnerKind::Player, "Germany", "playerAttachment");
    assert_eq!(h.data.store(&key).unwrap().int("vps"), 3);
    assert!(h.saw_event("vps: Setting vps to 3 for playerAttachment attached to Germany"));
    assert!(!h.saw_event("Setting captureVps"));
    assert_eq!(h.journal.changes().count(), 1);

    // Firing again changes nothing.
    let before = h.journal.len();
    h.fire_step(&["Germany"], None).unwrap();
    assert_eq!(h.journal.len(), before);
}

#[test]
fn later_edits_see_earlier_ones_and_clear_resets() {
    let territory_edit = |edits: &[&str]| PropertyEditDef {
        targets: vec!["Poland".into()],
        edits: edits.iter().map(|e| e.to_string()).collect(),
        ..Default::default()
    };
    let def = rules(
        vec![],
        vec![
            TriggerDef {
                territory_property: Some(territory_edit(&["fort:territoryEffect", "mountain:territoryEffect"])),
                ..trigger("fortify")
            },
            TriggerDef {
                territory_property: Some(territory_edit(&["-clear-swamp:territoryEffect"])),
                ..trigger("flood")
            },
        ],
    );
    let mut h = harness(def);
    h.fire_named(&["fortify"], &FireTriggerParams::none()).unwrap();
    let poland = || StoreKey::new(OwnerKind::Territory, "Poland", "territoryAttachment");
    assert_eq!(h.data.store(&poland()).unwrap().text("territoryEffect"), "fort:mountain");

    h.fire_named(&["flood"], &FireTriggerParams::none()).unwrap();
    assert_eq!(h.data.store(&poland()).unwrap().text("territoryEffect"), "swamp");
}

#[test]
fn clear_with_no_value_resets_to_default() {
    let def = rules(
        vec![],
        vec![TriggerDef {
            territory_property: Some(PropertyEditDef {
                targets: vec!["Germany".into()],
                edits: vec!["-clear-:capital".into()],
                ..Default::default()
            }),
            ..trigger("raze")
        }],
    );
    let mut h = harness(def);
    h.fire_named(&["raze"], &FireTriggerParams::none()).unwrap();
    let germany = StoreKey::new(OwnerKind::Territory, "Germany", "territoryAttachment");
    assert_eq!(h.data.store(&germany).unwrap().text("capital"), "");
    assert!(h.saw_event("raze: Setting capital cleared for territoryAttachment attached to Germany"));
}

#[test]
fn relationship_changes_follow_the_old_selector() {
    let def = rules(
        vec![],
        vec![TriggerDef {
            relationship_change: vec![
                "Italy:Russia:anyNeutral:War".into(),
                "Germany:Italy:anyWar:Neutrality".into(),
            ],
            ..trigger("pact")
        }],
    );
    let mut h = harness(def);
    h.fire_step(&["Germany"], None).unwrap();
    assert!(h.data.is_at_war("Italy", "Russia"));
    assert!(h.data.is_allied("Germany", "Italy"));
    assert!(h.saw_event("pact: Changing Relationship for Italy and Russia from Neutrality to War"));
    assert_eq!(h.journal.changes().count(), 1);
}

#[test]
fn captured_capital_hands_over_infrastructure_and_treasury() {
    let def = rules(
        vec![],
        vec![TriggerDef {
            change_ownership: vec!["Russia:Russia:Germany:true".into()],
            ..trigger("fall_of_moscow")
        }],
    );
    let mut h = harness(def);
    h.fire_step(&["Germany"], None).unwrap();

    assert_eq!(h.data.territories["Russia"].owner.as_deref(), Some("Germany"));
    assert_eq!(units_of(&h.data, "Russia", "Germany", "factory"), 1);
    assert_eq!(h.pus("Germany"), 30);
    assert_eq!(h.pus("Russia"), 0);
    assert!(h.saw_event("fall_of_moscow: Germany captures territory Russia"));
    assert!(h.saw_event("Germany captures 20 PUs while taking Russia's capital"));
}

#[test]
fn ownership_change_checks_the_old_owner() {
    let def = rules(
        vec![],
        vec![TriggerDef {
            change_ownership: vec!["Karelia:Italy:Germany:false".into()],
            ..trigger("swap")
        }],
    );
    let mut h = harness(def);
    h.fire_step(&["Germany"], None).unwrap();
    assert_eq!(h.data.territories["Karelia"].owner.as_deref(), Some("Russia"));
}

#[test]
fn remove_units_takes_only_the_players_own() {
    let def = rules(
        vec![],
        vec![TriggerDef {
            remove_units: vec!["5:Poland:armour".into()],
            ..trigger("disband")
        }],
    );
    let mut h = harness(def);
    h.fire_step(&["Germany"], None).unwrap();
    assert_eq!(units_of(&h.data, "Poland", "Germany", "armour"), 0);
    assert!(h.saw_event("disband: has removed 1 armour owned by Germany in Poland"));
}

#[test]
fn tech_frontier_rule_and_support_changes() {
    let mut s = europe();
    s.add_technology("radar");
    s.add_frontier("germanyFrontier", &["buyInfantry"]);
    s.add_frontier("germanyWarFrontier", &["buyInfantry"]);
    s.add_production_rule("buyArmour");
    s.add_support("artillerySupport", &[]);
    s.player("Germany").frontier("germanyFrontier");
    let def = rules(
        vec![],
        vec![TriggerDef {
            tech: vec!["radar".into()],
            available_tech: vec!["Land:radar".into()],
            frontier: Some("germanyWarFrontier".into()),
            production_rule: vec!["germanyWarFrontier:buyArmour".into(), "germanyWarFrontier:-buyInfantry".into()],
            support: vec!["artillerySupport".into()],
            ..trigger("mobilise")
        }],
    );
    let mut h = Harness::load(s.build(), &def).unwrap();
    h.fire_step(&["Germany"], None).unwrap();

    let germany = &h.data.players["Germany"];
    assert!(germany.techs.contains("radar"));
    assert!(germany.available_techs["Land"].contains("radar"));
    assert_eq!(germany.frontier.as_deref(), Some("germanyWarFrontier"));
    assert_eq!(h.data.frontiers["germanyWarFrontier"], vec!["buyArmour"]);
    assert!(h.data.unit_supports["artillerySupport"].contains("Germany"));
    assert!(h.saw_event("mobilise: Germany has their production frontier changed to: germanyWarFrontier"));
}

// ---------------------------------------------------------------------------
// Projection and rollback
// ---------------------------------------------------------------------------

#[test]
fn projection_leaves_the_game_alone() {
    let mut h = harness(rules(
        vec![owns("karelia", "Karelia")],
        vec![
            income("base", 5),
            TriggerDef {
                conditions: vec!["karelia".into()],
                ..income("bonus", 7)
            },
        ],
    ));
    let income = h
        .run(|rules, bridge| {
            let ids = collect_for_all_triggers_matching(rules, &["Germany".to_string()], |_, _| true);
            let memo = collect_tests_for_all_triggers(rules, &ids, ConditionMemo::new(), bridge)?;
            project_resource_income(rules, &ids, &memo, bridge.data())
        })
        .unwrap();

    let expected = BTreeMap::from([(
        "Germany".to_string(),
        BTreeMap::from([(PUS.to_string(), 5)]),
    )]);
    assert_eq!(income, expected);
    assert_eq!(h.pus("Germany"), 10);
    assert_eq!(h.journal.changes().count(), 0);
}

#[test]
fn journal_rollback_restores_the_game() {
    let def = rules(
        vec![],
        vec![TriggerDef {
            purchase: vec!["armour".into()],
            change_ownership: vec!["Karelia:Russia:Germany:false".into()],
            ..income("campaign", 4)
        }],
    );
    let mut h = harness(def);
    let before = h.data.clone();
    h.fire_step(&["Germany"], None).unwrap();
    assert_ne!(h.data, before);

    let undo = h.journal.rollback();
    h.data.apply(&undo).unwrap();
    assert_eq!(h.data.players, before.players);
    assert_eq!(h.data.territories, before.territories);
}

#[test]
fn every_trigger_in_the_set_is_reported_in_order() {
    let mut h = harness(rules(vec![], vec![income("a", 1), income("b", 1), income("c", 1)]));
    let report = h.fire_step(&["Germany"], None).unwrap();
    assert_eq!(report.fired, vec!["a", "b", "c"]);
    let touched: BTreeSet<&str> = h.journal.changes().map(|c| c.change_type_str()).collect();
    assert_eq!(touched, BTreeSet::from(["resource_changed"]));
}
