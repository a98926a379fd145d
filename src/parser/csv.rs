//! CSV parsing: header-named fields, one section per row

use crate::document::{MetaValue, ParsedDocument, Section};
use crate::error::{ParseError, Result};
use std::path::Path;

/// Parse a CSV file.
///
/// The header row names the fields; each following row becomes one section of
/// `field: value` lines. Quoting, escaped quotes, embedded separators, and
/// CRLF/LF/CR line endings are handled by the reader; empty rows are skipped.
pub fn parse(path: &Path) -> Result<ParsedDocument> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| ParseError::Failed(e.to_string()))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ParseError::Failed(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut doc = ParsedDocument::default();
    doc.metadata.insert(
        "columns".to_string(),
        MetaValue::from(headers.clone()),
    );

    let mut row_number = 0usize;
    for record in reader.records() {
        let record = record.map_err(|e| ParseError::Failed(e.to_string()))?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        row_number += 1;

        let lines: Vec<String> = record
            .iter()
            .enumerate()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(i, value)| {
                let field = headers
                    .get(i)
                    .filter(|h| !h.is_empty())
                    .cloned()
                    .unwrap_or_else(|| format!("column_{}", i + 1));
                format!("{}: {}", field, value.trim())
            })
            .collect();

        doc.sections.push(Section {
            title: Some(format!("Row {row_number}")),
            content: lines.join("\n"),
            page: None,
        });
    }

    doc.metadata
        .insert("rows".to_string(), MetaValue::Integer(row_number as i64));
    doc.content = doc
        .sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    Ok(doc)
}
