use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::model::{Change, Journal};

/// Write an iterator of serializable items to a JSONL file (one JSON object per line).
fn write_jsonl<T: Serialize>(path: &Path, items: impl Iterator<Item = T>) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for item in items {
        serde_json::to_writer(&mut writer, &item)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

/// Flush a journal to JSONL files in the given output directory.
///
/// Creates the output directory if it does not exist. Writes 2 files:
/// - `journal.jsonl`: every entry in order, tagged by `kind`
/// - `changes.jsonl`: only the applied changes, tagged by `type`
pub fn flush_journal_to_jsonl(journal: &Journal, output_dir: &Path) -> io::Result<()> {
    fs::create_dir_all(output_dir)?;

    write_jsonl(&output_dir.join("journal.jsonl"), journal.entries.iter())?;
    write_jsonl(&output_dir.join("changes.jsonl"), journal.changes())?;

    tracing::debug!(
        entries = journal.len(),
        dir = %output_dir.display(),
        "journal flushed"
    );
    Ok(())
}

/// Read back a `changes.jsonl` file written by [`flush_journal_to_jsonl`].
pub fn read_changes_jsonl(path: &Path) -> io::Result<Vec<Change>> {
    fs::read_to_string(path)?
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(io::Error::from))
        .collect()
}
