mod common;

use common::*;
use trigger_engine::model::{AttachmentKind, OwnerKind, StoreKey};
use trigger_engine::rules::{ConditionDef, RuleError, RuleSetDef, TriggerDef};
use trigger_engine::testutil::Harness;

fn load_error(def: &RuleSetDef) -> RuleError {
    match Harness::load(europe().build(), def) {
        Err(err) => err,
        Ok(_) => panic!("rule set loaded"),
    }
}

#[test]
fn condition_cycles_are_rejected() {
    let def = rules(
        vec![
            composite("a", "AND", &["b"]),
            composite("b", "AND", &["c"]),
            composite("c", "AND", &["a"]),
        ],
        vec![],
    );
    let err = load_error(&def);
    assert_eq!(
        err,
        RuleError::ConditionCycle(vec!["a".into(), "b".into(), "c".into(), "a".into()])
    );
    assert_eq!(err.to_string(), "condition cycle: a -> b -> c -> a");
}

#[test]
fn unknown_children_are_rejected() {
    let def = rules(vec![composite("a", "AND", &["ghost"])], vec![]);
    assert_eq!(
        load_error(&def),
        RuleError::Unknown {
            name: "a".into(),
            what: "condition",
            value: "ghost".into(),
        }
    );
}

#[test]
fn triggers_cannot_be_children() {
    let def = rules(vec![composite("a", "AND", &["t"])], vec![trigger("t")]);
    assert!(matches!(load_error(&def), RuleError::Invalid { name, .. } if name == "a"));
}

#[test]
fn names_are_unique_across_conditions_and_triggers() {
    let def = rules(vec![condition("x")], vec![trigger("x")]);
    assert_eq!(load_error(&def), RuleError::Duplicate("x".into()));
}

#[test]
fn attachment_owner_must_exist() {
    let def = rules(
        vec![ConditionDef {
            attached_to: "France".into(),
            ..condition("c")
        }],
        vec![],
    );
    assert_eq!(
        load_error(&def),
        RuleError::Unknown {
            name: "c".into(),
            what: "player",
            value: "France".into(),
        }
    );
}

#[test]
fn malformed_values_are_rejected() {
    let bad_type = rules(vec![composite("c", "MAYBE", &[])], vec![]);
    assert!(matches!(load_error(&bad_type), RuleError::Invalid { .. }));

    let bad_chance = rules(
        vec![ConditionDef {
            chance: Some("7:6".into()),
            ..condition("c")
        }],
        vec![],
    );
    assert!(matches!(load_error(&bad_chance), RuleError::Invalid { .. }));

    let short_activation = rules(
        vec![],
        vec![
            TriggerDef {
                activate_trigger: vec!["t_b:1".into()],
                ..trigger("t_a")
            },
            trigger("t_b"),
        ],
    );
    assert!(matches!(load_error(&short_activation), RuleError::Invalid { name, .. } if name == "t_a"));

    let count_only = rules(
        vec![],
        vec![TriggerDef {
            resource_count: Some(3),
            ..trigger("t")
        }],
    );
    assert!(matches!(load_error(&count_only), RuleError::Invalid { .. }));
}

#[test]
fn effect_names_are_checked_against_the_game() {
    let missing_note = rules(
        vec![],
        vec![TriggerDef {
            notification: Some("missing".into()),
            ..trigger("t")
        }],
    );
    assert!(matches!(
        load_error(&missing_note),
        RuleError::Unknown { what: "notification", .. }
    ));

    let missing_unit = rules(
        vec![],
        vec![TriggerDef {
            purchase: vec!["2:battleship".into()],
            ..trigger("t")
        }],
    );
    assert!(matches!(
        load_error(&missing_unit),
        RuleError::Unknown { what: "unit type", .. }
    ));

    let missing_target = rules(
        vec![],
        vec![TriggerDef {
            activate_trigger: vec!["nobody:1:false:false:false:false".into()],
            ..trigger("t")
        }],
    );
    assert!(matches!(
        load_error(&missing_target),
        RuleError::Unknown { what: "trigger", .. }
    ));
}

#[test]
fn loading_creates_a_store_per_declaration() {
    let def = rules(
        vec![ConditionDef {
            chance: Some("2:6".into()),
            ..condition("c")
        }],
        vec![TriggerDef {
            uses: Some(3),
            ..trigger("t")
        }],
    );
    let h = harness(def);
    let c = h
        .data
        .store(&StoreKey::new(OwnerKind::Player, "Germany", "c"))
        .unwrap();
    assert_eq!(c.kind, AttachmentKind::Rules);
    assert_eq!(c.text("chance"), "2:6");
    assert!(c.flag("switch"));

    let t = h.store("t");
    assert_eq!(t.kind, AttachmentKind::Trigger);
    assert_eq!(t.int("uses"), 3);
    assert!(!t.flag("usedThisRound"));
}

#[test]
fn rules_load_from_json() {
    let json = r#"{
        "conditions": [
            {"name": "held", "attachedTo": "Germany", "directOwnershipTerritories": "Poland"}
        ],
        "triggers": [
            {
                "name": "bonus",
                "attachedTo": "Germany",
                "conditions": ["held"],
                "resource": "PUs",
                "resourceCount": 4,
                "notification": "east"
            }
        ],
        "notifications": {"east": "The eastern front holds."}
    }"#;
    let mut h = Harness::from_json(europe().build(), json).unwrap();
    h.fire_step(&["Germany"], None).unwrap();
    assert_eq!(h.pus("Germany"), 14);
    assert!(h.saw_event("Note to players Germany: The eastern front holds."));
}
