//! PDF parsing via pdf-extract, with document info from lopdf

use crate::document::{MetaValue, ParsedDocument, Section};
use crate::error::{ParseError, Result};
use regex::Regex;
use std::path::Path;
use tracing::debug;

/// Parse a PDF file: full text, per-page sections, and document info
pub fn parse(path: &Path) -> Result<ParsedDocument> {
    let text =
        pdf_extract::extract_text(path).map_err(|e| ParseError::Failed(e.to_string()))?;

    let mut doc = ParsedDocument {
        content: text.clone(),
        ..Default::default()
    };

    if let Ok(pdf) = lopdf::Document::load(path) {
        doc.metadata.insert(
            "page_count".to_string(),
            MetaValue::Integer(pdf.get_pages().len() as i64),
        );
        read_document_info(&pdf, &mut doc);
    } else {
        debug!(path = %path.display(), "Could not reopen PDF for document info");
    }

    doc.sections = page_sections(&text);
    Ok(doc)
}

/// Split extracted text into pages and attach a best-effort title per page.
///
/// Pages are separated by form-feed or runs of four or more newlines.
fn page_sections(text: &str) -> Vec<Section> {
    let splitter = Regex::new(r"\x0c|\n{4,}").expect("static regex");
    splitter
        .split(text)
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .enumerate()
        .map(|(i, page)| Section {
            title: first_line_heading(page),
            content: page.to_string(),
            page: Some(i as u32 + 1),
        })
        .collect()
}

/// Heuristic: the first line is a heading if it is short and looks like one
/// (all caps, numbered, or keyword-prefixed)
fn first_line_heading(page: &str) -> Option<String> {
    let line = page.lines().next()?.trim();
    if line.is_empty() || line.len() > 80 {
        return None;
    }

    let has_letters = line.chars().any(|c| c.is_alphabetic());
    let all_caps = has_letters && !line.chars().any(|c| c.is_lowercase());

    let numbered = Regex::new(r"^\d+(\.\d+)*[.)]?\s+\S").expect("static regex");
    let keyword = Regex::new(r"(?i)^(chapter|section|part|appendix|annex)\b").expect("static regex");

    if all_caps || numbered.is_match(line) || keyword.is_match(line) {
        Some(line.to_string())
    } else {
        None
    }
}

/// Pull Title/Author/Subject/Keywords/CreationDate from the Info dictionary
fn read_document_info(pdf: &lopdf::Document, doc: &mut ParsedDocument) {
    let info = match pdf.trailer.get(b"Info") {
        Ok(lopdf::Object::Reference(id)) => match pdf.get_object(*id).and_then(|o| o.as_dict()) {
            Ok(dict) => dict,
            Err(_) => return,
        },
        Ok(lopdf::Object::Dictionary(dict)) => dict,
        _ => return,
    };

    for (key, meta_key) in [
        (&b"Title"[..], "title"),
        (&b"Author"[..], "author"),
        (&b"Subject"[..], "subject"),
        (&b"Keywords"[..], "keywords"),
    ] {
        if let Some(value) = info.get(key).ok().and_then(decode_pdf_string) {
            if !value.is_empty() {
                doc.metadata.insert(meta_key.to_string(), MetaValue::String(value));
            }
        }
    }

    if let Some(raw) = info.get(b"CreationDate").ok().and_then(decode_pdf_string) {
        if let Some(iso) = pdf_date_to_iso(&raw) {
            doc.metadata
                .insert("created".to_string(), MetaValue::String(iso));
        }
    }
}

/// Decode a PDF string object (UTF-16BE with BOM, else treated as Latin-1)
fn decode_pdf_string(obj: &lopdf::Object) -> Option<String> {
    let bytes = match obj {
        lopdf::Object::String(bytes, _) => bytes,
        _ => return None,
    };
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        Some(String::from_utf16_lossy(&units))
    } else {
        Some(bytes.iter().map(|&b| b as char).collect())
    }
}

/// Convert `D:YYYYMMDD[HHMMSS]` to ISO-8601 UTC
fn pdf_date_to_iso(raw: &str) -> Option<String> {
    let digits: String = raw
        .trim_start_matches("D:")
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.len() < 8 {
        return None;
    }
    let (date, time) = digits.split_at(8);
    let year = &date[0..4];
    let month = &date[4..6];
    let day = &date[6..8];
    let (hh, mm, ss) = if time.len() >= 6 {
        (&time[0..2], &time[2..4], &time[4..6])
    } else {
        ("00", "00", "00")
    };
    Some(format!("{year}-{month}-{day}T{hh}:{mm}:{ss}Z"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_date_conversion() {
        assert_eq!(
            pdf_date_to_iso("D:20240115093000+07'00'").as_deref(),
            Some("2024-01-15T09:30:00Z")
        );
        assert_eq!(
            pdf_date_to_iso("D:20231201").as_deref(),
            Some("2023-12-01T00:00:00Z")
        );
        assert_eq!(pdf_date_to_iso("D:2024"), None);
    }

    #[test]
    fn test_page_sections_split() {
        let text = "INTRODUCTION\nfirst page body\x0csecond page body\n\n\n\n\nthird page";
        let sections = page_sections(text);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].title.as_deref(), Some("INTRODUCTION"));
        assert_eq!(sections[1].page, Some(2));
        assert!(sections[2].content.contains("third page"));
    }

    #[test]
    fn test_first_line_heading_heuristic() {
        assert_eq!(
            first_line_heading("1.2 Scope\nbody"),
            Some("1.2 Scope".to_string())
        );
        assert_eq!(
            first_line_heading("Chapter Four\nbody"),
            Some("Chapter Four".to_string())
        );
        assert_eq!(first_line_heading("An ordinary sentence here.\nmore"), None);
    }

    #[test]
    fn test_utf16_string_decoding() {
        let obj = lopdf::Object::String(
            vec![0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69],
            lopdf::StringFormat::Literal,
        );
        assert_eq!(decode_pdf_string(&obj).as_deref(), Some("Hi"));
    }
}
