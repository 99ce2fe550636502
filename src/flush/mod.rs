pub mod jsonl;

pub use jsonl::{flush_journal_to_jsonl, read_changes_jsonl};
