#[macro_use]
mod macros;

pub mod change;
pub mod game;
pub mod journal;
pub mod property;

pub use change::{Change, ChangeError};
pub use game::{
    Archetype, BattleRecord, BattleResult, GameData, GameOver, PUS, Player, Relationship,
    Territory, Unit,
};
pub use journal::{Journal, JournalEntry};
pub use property::{
    AttachmentKind, AttributeStore, OwnerKind, PropertyDef, PropertyHandle, PropertyType,
    PropertyValue, StoreKey,
};
