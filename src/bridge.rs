//! The engine's only window onto the running game.
//!
//! Every mutation, history line, die roll and player-facing message goes
//! through a [`Bridge`]. [`GameBridge`] applies changes to a [`GameData`] and
//! journals everything; [`DryRunBridge`] reads the same data but keeps it
//! untouched, for projections.

use std::time::Duration;

use rand::{Rng, RngCore};

use crate::config::EngineConfig;
use crate::id::IdGenerator;
use crate::model::{Change, ChangeError, GameData, Journal, JournalEntry, Unit};

/// Source of die rolls. `roll(sides)` returns a value in `1..=sides`.
pub trait DiceRoller {
    fn roll(&mut self, sides: u32) -> u32;
}

/// Dice backed by any `rand` generator.
pub struct RngDice<R: RngCore> {
    rng: R,
}

impl<R: RngCore> RngDice<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: RngCore> DiceRoller for RngDice<R> {
    fn roll(&mut self, sides: u32) -> u32 {
        self.rng.random_range(1..=sides.max(1))
    }
}

pub trait Bridge {
    fn data(&self) -> &GameData;

    fn config(&self) -> &EngineConfig;

    /// The player whose step is running, if any. Private reports go here.
    fn current_player(&self) -> Option<&str>;

    fn add_change(&mut self, change: Change) -> Result<(), ChangeError>;

    /// Fresh units with unused ids. They belong to no location until a change
    /// puts them somewhere.
    fn create_units(&mut self, unit_type: &str, count: usize, owner: &str) -> Vec<Unit>;

    fn start_event(&mut self, text: &str, related: &[String]);

    /// A die roll in `1..=sides`.
    fn random(&mut self, sides: u32, related: &[String], category: &str, reason: &str) -> u32;

    fn report_message(&mut self, short: &str, long: &str);

    fn play_sound_to_players(
        &mut self,
        clip: &str,
        to: &[String],
        except: &[String],
        include_observers: bool,
    );

    fn report_message_to_players(
        &mut self,
        to: &[String],
        except: &[String],
        message: &str,
        title: &str,
    );

    fn roll_delay(&self) -> Option<Duration> {
        self.config().roll_delay()
    }
}

fn new_units(id_gen: &mut IdGenerator, unit_type: &str, count: usize, owner: &str) -> Vec<Unit> {
    id_gen
        .take(count)
        .into_iter()
        .map(|id| Unit {
            id,
            unit_type: unit_type.to_string(),
            owner: owner.to_string(),
            original_owner: None,
        })
        .collect()
}

/// Applies changes to live game data and records every output in a journal.
pub struct GameBridge<'a> {
    data: &'a mut GameData,
    dice: &'a mut dyn DiceRoller,
    journal: &'a mut Journal,
    config: &'a EngineConfig,
    current_player: Option<String>,
}

impl<'a> GameBridge<'a> {
    pub fn new(
        data: &'a mut GameData,
        dice: &'a mut dyn DiceRoller,
        journal: &'a mut Journal,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            data,
            dice,
            journal,
            config,
            current_player: None,
        }
    }

    pub fn with_current_player(mut self, player: impl Into<String>) -> Self {
        self.current_player = Some(player.into());
        self
    }
}

impl Bridge for GameBridge<'_> {
    fn data(&self) -> &GameData {
        self.data
    }

    fn config(&self) -> &EngineConfig {
        self.config
    }

    fn current_player(&self) -> Option<&str> {
        self.current_player.as_deref()
    }

    fn add_change(&mut self, change: Change) -> Result<(), ChangeError> {
        if change.is_empty() {
            return Ok(());
        }
        self.data.apply(&change)?;
        tracing::debug!(change = change.change_type_str(), "applied change");
        self.journal.push(JournalEntry::Change { change });
        Ok(())
    }

    fn create_units(&mut self, unit_type: &str, count: usize, owner: &str) -> Vec<Unit> {
        new_units(&mut self.data.id_gen, unit_type, count, owner)
    }

    fn start_event(&mut self, text: &str, related: &[String]) {
        tracing::debug!(text, "history event");
        self.journal.push(JournalEntry::Event {
            text: text.to_string(),
            related: related.to_vec(),
        });
    }

    fn random(&mut self, sides: u32, _related: &[String], category: &str, reason: &str) -> u32 {
        let result = self.dice.roll(sides);
        self.journal.push(JournalEntry::Roll {
            sides,
            result,
            category: category.to_string(),
            reason: reason.to_string(),
        });
        result
    }

    fn report_message(&mut self, short: &str, long: &str) {
        self.journal.push(JournalEntry::Message {
            short: short.to_string(),
            long: long.to_string(),
        });
    }

    fn play_sound_to_players(
        &mut self,
        clip: &str,
        to: &[String],
        except: &[String],
        include_observers: bool,
    ) {
        self.journal.push(JournalEntry::Sound {
            clip: clip.to_string(),
            to: to.to_vec(),
            except: except.to_vec(),
            include_observers,
        });
    }

    fn report_message_to_players(
        &mut self,
        to: &[String],
        except: &[String],
        message: &str,
        title: &str,
    ) {
        self.journal.push(JournalEntry::Display {
            to: to.to_vec(),
            except: except.to_vec(),
            message: message.to_string(),
            title: title.to_string(),
        });
    }
}

/// Reads live data, discards every change and output.
///
/// Die rolls are answered with `1`; callers that care about chance must not
/// project through this bridge.
pub struct DryRunBridge<'a> {
    data: &'a GameData,
    config: EngineConfig,
    id_gen: IdGenerator,
    discarded: Vec<Change>,
}

impl<'a> DryRunBridge<'a> {
    pub fn new(data: &'a GameData) -> Self {
        Self {
            data,
            config: EngineConfig::default(),
            id_gen: data.id_gen.clone(),
            discarded: Vec::new(),
        }
    }

    /// Changes that a real pass would have applied.
    pub fn discarded(&self) -> &[Change] {
        &self.discarded
    }
}

impl Bridge for DryRunBridge<'_> {
    fn data(&self) -> &GameData {
        self.data
    }

    fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn current_player(&self) -> Option<&str> {
        None
    }

    fn add_change(&mut self, change: Change) -> Result<(), ChangeError> {
        self.discarded.push(change);
        Ok(())
    }

    fn create_units(&mut self, unit_type: &str, count: usize, owner: &str) -> Vec<Unit> {
        new_units(&mut self.id_gen, unit_type, count, owner)
    }

    fn start_event(&mut self, _text: &str, _related: &[String]) {}

    fn random(&mut self, _sides: u32, _related: &[String], _category: &str, reason: &str) -> u32 {
        tracing::warn!(reason, "die rolled during a dry run");
        1
    }

    fn report_message(&mut self, _short: &str, _long: &str) {}

    fn play_sound_to_players(&mut self, _: &str, _: &[String], _: &[String], _: bool) {}

    fn report_message_to_players(&mut self, _: &[String], _: &[String], _: &str, _: &str) {}

    fn roll_delay(&self) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;
    use crate::config::Transport;
    use crate::model::Player;

    #[test]
    fn rng_dice_stay_in_range() {
        let mut dice = RngDice::new(SmallRng::seed_from_u64(7));
        for _ in 0..500 {
            let roll = dice.roll(6);
            assert!((1..=6).contains(&roll));
        }
    }

    #[test]
    fn game_bridge_applies_and_journals() {
        let mut data = GameData::new();
        data.players.insert("Japan".into(), Player::new("Japan"));
        let mut dice = RngDice::new(SmallRng::seed_from_u64(1));
        let mut journal = Journal::new();
        let config = EngineConfig::default();
        let mut bridge = GameBridge::new(&mut data, &mut dice, &mut journal, &config);

        bridge.start_event("Japan collects", &[]);
        bridge
            .add_change(Change::ResourceChanged {
                player: "Japan".into(),
                resource: "PUs".into(),
                delta: 3,
            })
            .unwrap();
        bridge.add_change(Change::Composite { changes: vec![] }).unwrap();

        assert_eq!(bridge.data().players["Japan"].resource("PUs"), 3);
        assert_eq!(journal.len(), 2);
    }

    #[test]
    fn rejected_change_is_neither_applied_nor_journaled() {
        let mut data = GameData::new();
        data.players.insert("Japan".into(), Player::new("Japan"));
        let before = data.clone();
        let mut dice = RngDice::new(SmallRng::seed_from_u64(1));
        let mut journal = Journal::new();
        let config = EngineConfig::default();
        let mut bridge = GameBridge::new(&mut data, &mut dice, &mut journal, &config);

        let err = bridge
            .add_change(Change::Composite {
                changes: vec![
                    Change::ResourceChanged {
                        player: "Japan".into(),
                        resource: "PUs".into(),
                        delta: 5,
                    },
                    Change::ResourceChanged {
                        player: "Nobody".into(),
                        resource: "PUs".into(),
                        delta: 5,
                    },
                ],
            })
            .unwrap_err();
        assert_eq!(err, ChangeError::UnknownPlayer("Nobody".into()));
        assert!(journal.is_empty());
        assert_eq!(data, before);
    }

    #[test]
    fn remote_games_pause_before_rolls() {
        let mut data = GameData::new();
        let mut dice = RngDice::new(SmallRng::seed_from_u64(1));
        let mut journal = Journal::new();
        let config = EngineConfig {
            transport: Transport::Forum,
            ..Default::default()
        };
        let bridge = GameBridge::new(&mut data, &mut dice, &mut journal, &config);
        assert_eq!(bridge.roll_delay(), Some(Duration::from_millis(100)));

        let local = EngineConfig::default();
        let mut data = GameData::new();
        let bridge = GameBridge::new(&mut data, &mut dice, &mut journal, &local);
        assert_eq!(bridge.roll_delay(), None);

        let data = GameData::new();
        assert_eq!(DryRunBridge::new(&data).roll_delay(), None);
    }

    #[test]
    fn dry_run_leaves_data_alone() {
        let mut data = GameData::new();
        data.players.insert("Japan".into(), Player::new("Japan"));
        let mut bridge = DryRunBridge::new(&data);
        bridge
            .add_change(Change::ResourceChanged {
                player: "Japan".into(),
                resource: "PUs".into(),
                delta: 3,
            })
            .unwrap();
        let units = bridge.create_units("infantry", 2, "Japan");
        assert_eq!(units.len(), 2);
        assert_eq!(bridge.discarded().len(), 1);
        assert_eq!(data.players["Japan"].resource("PUs"), 0);
        assert_eq!(data.id_gen.clone().next_id(), 1);
    }
}
