//! Validation and deduplication of parsed records.

use medbill_extract_models::{Record, RecordSet, SchemaTemplate};

/// Keeps the records that carry every schema field and drops exact
/// duplicates.
///
/// A record is kept iff every field of `schema` is present (an empty value
/// counts as present) and no earlier kept record has the same full set of
/// `(field, value)` pairs. The first occurrence wins and first-seen order is
/// preserved. Running the filter on its own output changes nothing.
pub fn filter<I>(records: I, schema: &SchemaTemplate) -> RecordSet
where
    I: IntoIterator<Item = Record>,
{
    let mut set = RecordSet::new();
    let mut incomplete = 0usize;
    let mut duplicates = 0usize;

    for record in records {
        if !record.has_all_fields(schema) {
            if !record.is_empty() {
                log::debug!(
                    "Dropping record missing field(s): {}",
                    missing_fields(&record, schema).join(", ")
                );
            }
            incomplete += 1;
            continue;
        }

        if !set.insert(record) {
            duplicates += 1;
        }
    }

    log::debug!(
        "Filter kept {} record(s); dropped {incomplete} incomplete and {duplicates} duplicate(s)",
        set.len()
    );

    set
}

fn missing_fields<'a>(record: &Record, schema: &'a SchemaTemplate) -> Vec<&'a str> {
    schema
        .fields()
        .iter()
        .map(String::as_str)
        .filter(|f| !record.contains_key(f))
        .collect()
}
