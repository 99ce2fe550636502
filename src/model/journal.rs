use serde::{Deserialize, Serialize};

use super::change::Change;

/// Everything the engine emitted while running, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalEntry {
    Change {
        change: Change,
    },
    /// A history event, the headline changes are filed under.
    Event {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        related: Vec<String>,
    },
    /// Private message to the player whose step is running.
    Message {
        short: String,
        long: String,
    },
    Sound {
        clip: String,
        to: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        except: Vec<String>,
        include_observers: bool,
    },
    /// Message shown to a set of players.
    Display {
        to: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        except: Vec<String>,
        message: String,
        title: String,
    },
    Roll {
        sides: u32,
        result: u32,
        category: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Journal {
    pub entries: Vec<JournalEntry>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn changes(&self) -> impl DoubleEndedIterator<Item = &Change> {
        self.entries.iter().filter_map(|e| match e {
            JournalEntry::Change { change } => Some(change),
            _ => None,
        })
    }

    /// History event texts, in order.
    pub fn events(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|e| match e {
            JournalEntry::Event { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn sounds(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|e| match e {
            JournalEntry::Sound { clip, .. } => Some(clip.as_str()),
            _ => None,
        })
    }

    /// Position of the first event whose text contains `needle`.
    pub fn position_of_event(&self, needle: &str) -> Option<usize> {
        self.entries.iter().position(|e| match e {
            JournalEntry::Event { text, .. } => text.contains(needle),
            _ => false,
        })
    }

    /// Undo every recorded change, newest first.
    pub fn rollback(&self) -> Change {
        Change::Composite {
            changes: self.changes().map(Change::invert).rev().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_by_entry_kind() {
        let mut journal = Journal::new();
        journal.push(JournalEntry::Event {
            text: "Germany gains 5 PUs".into(),
            related: vec![],
        });
        journal.push(JournalEntry::Change {
            change: Change::ResourceChanged {
                player: "Germany".into(),
                resource: "PUs".into(),
                delta: 5,
            },
        });
        assert_eq!(journal.events().collect::<Vec<_>>(), vec!["Germany gains 5 PUs"]);
        assert_eq!(journal.changes().count(), 1);
        assert_eq!(journal.position_of_event("gains"), Some(0));
        assert_eq!(journal.position_of_event("loses"), None);
    }

    #[test]
    fn entries_are_tagged_by_kind() {
        let entry = JournalEntry::Message {
            short: "hi".into(),
            long: "hello".into(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "message");
    }
}
