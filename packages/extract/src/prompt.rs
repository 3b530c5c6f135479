//! Extraction prompt template.
//!
//! The template has three content slots: `{processed_data}` (everything
//! extracted so far), `{json_template}` (the schema fields), and
//! `{pdf_data}` (the document payload). `{marker}` and `{field_rules}` are
//! derived from the schema.

use medbill_extract_models::SchemaTemplate;

const TEMPLATE: &str = "\
You are an assistant that extracts structured line items from medical billing documents. \
The document below was extracted from a billing PDF and is given as JSON: the text of every \
page together with its page number. Extract every field listed in the template for EACH \
billing item in the document, and output each field as a key-value pair on its own line.

Rules:
- Read every part of the document: all running text, every table cell, and every form field, on every page.
- Find every individual billing item. Bills usually have their own section, table, or table row.
- For each billing item output one block of lines, one line per template field, in the form FIELD_NAME=VALUE.
- Begin every block with {marker}=<value>. This line marks the start of a new billing item.
- Separate consecutive billing items with one blank line, and end the response with a blank line.
- If a field has no value in the document, still output the field with an empty value (FIELD_NAME=).
- Output only key-value lines: no quotes, backslashes, bullets, explanations, prefixes, or suffixes.
- Write dates consistently and numbers as plain integers or decimals.
{field_rules}- Never invent data that is not in the document.
- Continue from where the data already processed (below) ends and do not repeat items listed there. \
If it is empty, start from the beginning. If every billing item is already listed, output nothing.

Already processed:
{processed_data}

Before answering, check that every field of every billing item is present, complete, and not duplicated.

Template of fields to populate for each billing item:
{json_template}

Billing document to analyze:
{pdf_data}

Respond only with the key-value lines, starting each billing item with {marker}=<value>.
";

/// Renders the extraction prompt.
///
/// Slots are filled in a single pass, so braces inside the substituted
/// document or processed text are never treated as slots.
#[must_use]
pub fn render_prompt(schema: &SchemaTemplate, document_json: &str, processed: &str) -> String {
    let json_template = schema.to_json_template();
    let field_rules = field_rules(schema);

    fill(
        TEMPLATE,
        &[
            ("marker", schema.marker()),
            ("field_rules", &field_rules),
            ("processed_data", processed),
            ("json_template", &json_template),
            ("pdf_data", document_json),
        ],
    )
}

/// Extra rules for well-known billing fields that are part of the schema.
fn field_rules(schema: &SchemaTemplate) -> String {
    let mut rules = String::new();
    if schema.contains("AMOUNT_CHARGED") {
        rules.push_str(
            "- AMOUNT_CHARGED is never negative. If the document shows a negative charge, output its absolute value.\n",
        );
    }
    if schema.contains("PAGE_NO") {
        rules.push_str("- PAGE_NO is the page number the billing item appears on.\n");
    }
    rules
}

/// Replaces `{name}` occurrences with the matching slot value. Unknown
/// names and stray braces are copied through unchanged.
fn fill(template: &str, slots: &[(&str, &str)]) -> String {
    let capacity = template.len() + slots.iter().map(|(_, v)| v.len()).sum::<usize>();
    let mut out = String::with_capacity(capacity);
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        let slot = after.find('}').and_then(|end| {
            let name = &after[..end];
            slots
                .iter()
                .find(|(slot, _)| *slot == name)
                .map(|(_, value)| (*value, end))
        });

        if let Some((value, end)) = slot {
            out.push_str(value);
            rest = &after[end + 1..];
        } else {
            out.push('{');
            rest = after;
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_every_slot() {
        let schema = SchemaTemplate::billing();
        let prompt = render_prompt(&schema, "{\"pages\": []}", "MEDICAL_SERVICE_PROVIDER=A\n");

        assert!(prompt.contains("Begin every block with MEDICAL_SERVICE_PROVIDER=<value>."));
        assert!(prompt.contains("Already processed:\nMEDICAL_SERVICE_PROVIDER=A\n"));
        assert!(prompt.contains("\"PLAINTIFF_PAID\": \"\""));
        assert!(prompt.contains("Billing document to analyze:\n{\"pages\": []}"));
        assert!(prompt.contains("AMOUNT_CHARGED is never negative"));
        assert!(!prompt.contains("{marker}"));
        assert!(!prompt.contains("{pdf_data}"));
        assert!(!prompt.contains("{processed_data}"));
        assert!(!prompt.contains("{json_template}"));
        assert!(!prompt.contains("{field_rules}"));
    }

    #[test]
    fn substituted_text_is_not_rescanned() {
        let schema = SchemaTemplate::new(["ITEM"]).unwrap();
        let prompt = render_prompt(&schema, "literal {processed_data}", "");
        assert!(prompt.contains("Billing document to analyze:\nliteral {processed_data}"));
        assert!(!prompt.contains("AMOUNT_CHARGED"));
        assert!(prompt.contains("Begin every block with ITEM=<value>."));
    }

    #[test]
    fn fill_keeps_unknown_and_unclosed_braces() {
        let out = fill("a {x} {y} {z", &[("x", "1")]);
        assert_eq!(out, "a 1 {y} {z");
    }
}
