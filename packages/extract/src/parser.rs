//! Key-value record parser for model output.
//!
//! Records are separated by a blank line; each line inside a record is
//! `FIELD=VALUE`, split on the first `=`.

use medbill_extract_models::Record;

/// Parses accumulated model output into records.
///
/// * CRLF line breaks are treated as LF.
/// * The text is split on blank-line boundaries (`"\n\n"`); every block
///   becomes one [`Record`], including blocks that yield no pairs.
/// * Within a block, a line with at least one `=` is split on the first
///   `=` and both sides are trimmed. Lines without `=` are skipped.
/// * A repeated field within one block keeps its first position and takes
///   the last value.
///
/// Values are never coerced; everything stays a string. This function
/// never fails.
#[must_use]
pub fn parse(text: &str) -> Vec<Record> {
    let text = text.replace("\r\n", "\n");

    text.split("\n\n").map(parse_block).collect()
}

fn parse_block(block: &str) -> Record {
    let mut record = Record::new();

    for line in block.split('\n') {
        if let Some((field, value)) = line.split_once('=') {
            record.insert(field.trim(), value.trim());
        } else if !line.trim().is_empty() {
            log::trace!("Skipping line without '=': {line}");
        }
    }

    record
}
