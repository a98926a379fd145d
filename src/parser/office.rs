//! Office Open XML parsing: DOCX and PPTX via zip + quick-xml, XLSX via calamine

use crate::document::{MetaValue, ParsedDocument, Section};
use crate::error::{ParseError, Result};
use calamine::Reader as _;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Strip an XML namespace prefix from a qualified name
fn local_name(qname: &[u8]) -> &[u8] {
    match qname.iter().position(|&b| b == b':') {
        Some(i) => &qname[i + 1..],
        None => qname,
    }
}

fn attr_val(e: &BytesStart<'_>, key_local: &[u8]) -> Option<String> {
    for a in e.attributes().with_checks(false).flatten() {
        if local_name(a.key.as_ref()) == key_local {
            return Some(String::from_utf8_lossy(&a.value).into_owned());
        }
    }
    None
}

fn open_archive(path: &Path) -> Result<zip::ZipArchive<File>> {
    let file = File::open(path).map_err(|e| ParseError::Failed(e.to_string()))?;
    Ok(zip::ZipArchive::new(file)
        .map_err(|e| ParseError::Failed(format!("not a valid office archive: {e}")))?)
}

fn read_entry(archive: &mut zip::ZipArchive<File>, name: &str) -> Option<String> {
    let mut entry = archive.by_name(name).ok()?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml).ok()?;
    Some(xml)
}

/// Parse a DOCX file: paragraph text with heading-style sections
pub fn parse_docx(path: &Path) -> Result<ParsedDocument> {
    let mut archive = open_archive(path)?;
    let xml = read_entry(&mut archive, "word/document.xml")
        .ok_or_else(|| ParseError::Failed("missing word/document.xml".to_string()))?;

    let paragraphs = docx_paragraphs(&xml);

    let mut doc = ParsedDocument::default();
    read_core_properties(&mut archive, &mut doc);

    let mut current: Option<Section> = None;
    let mut lines = Vec::new();
    for para in &paragraphs {
        if para.text.trim().is_empty() {
            continue;
        }
        lines.push(para.text.clone());
        if para.is_heading {
            if let Some(section) = current.take() {
                doc.sections.push(section);
            }
            current = Some(Section {
                title: Some(para.text.trim().to_string()),
                ..Default::default()
            });
        } else if let Some(section) = current.as_mut() {
            if !section.content.is_empty() {
                section.content.push('\n');
            }
            section.content.push_str(&para.text);
        }
    }
    if let Some(section) = current {
        doc.sections.push(section);
    }

    doc.content = lines.join("\n");
    Ok(doc)
}

struct DocxParagraph {
    text: String,
    is_heading: bool,
}

/// Collect `w:t` runs per `w:p`, flagging Heading-styled paragraphs
fn docx_paragraphs(xml: &str) -> Vec<DocxParagraph> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut paragraphs = Vec::new();
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut is_heading = false;
    let mut in_text_run = false;

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if local_name(e.name().as_ref()) == b"t" {
                    in_text_run = true;
                }
            }
            Ok(Event::Empty(e)) => {
                match local_name(e.name().as_ref()) {
                    b"pStyle" => {
                        if let Some(style) = attr_val(&e, b"val") {
                            if style.starts_with("Heading") || style.starts_with("Title") {
                                is_heading = true;
                            }
                        }
                    }
                    b"tab" => text.push('\t'),
                    b"br" => text.push('\n'),
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                if in_text_run {
                    if let Ok(s) = t.unescape() {
                        text.push_str(&s);
                    }
                }
            }
            Ok(Event::End(e)) => match local_name(e.name().as_ref()) {
                b"t" => in_text_run = false,
                b"p" => {
                    paragraphs.push(DocxParagraph {
                        text: std::mem::take(&mut text),
                        is_heading,
                    });
                    is_heading = false;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }

    if !text.trim().is_empty() {
        paragraphs.push(DocxParagraph { text, is_heading });
    }
    paragraphs
}

/// Parse a PPTX file: one section per slide, labelled `Slide N`
pub fn parse_pptx(path: &Path) -> Result<ParsedDocument> {
    let mut archive = open_archive(path)?;

    let slide_re = Regex::new(r"^ppt/slides/slide(\d+)\.xml$").expect("static regex");
    let mut slide_entries: Vec<(u32, String)> = (0..archive.len())
        .filter_map(|i| {
            let name = archive.by_index(i).ok()?.name().to_string();
            let number = slide_re.captures(&name)?.get(1)?.as_str().parse().ok()?;
            Some((number, name))
        })
        .collect();
    slide_entries.sort_by_key(|(number, _)| *number);

    let mut doc = ParsedDocument::default();
    read_core_properties(&mut archive, &mut doc);

    let mut parts = Vec::new();
    for (number, name) in slide_entries {
        let Some(xml) = read_entry(&mut archive, &name) else {
            continue;
        };
        let text = drawing_text(&xml);
        if text.trim().is_empty() {
            continue;
        }
        parts.push(text.trim().to_string());
        doc.sections.push(Section {
            title: Some(format!("Slide {number}")),
            content: text.trim().to_string(),
            page: Some(number),
        });
    }

    doc.content = parts.join("\n\n");
    Ok(doc)
}

/// Collect `a:t` runs with paragraph breaks on `a:p` boundaries
fn drawing_text(xml: &str) -> String {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text_run = false;

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if local_name(e.name().as_ref()) == b"t" {
                    in_text_run = true;
                }
            }
            Ok(Event::Text(t)) => {
                if in_text_run {
                    if let Ok(s) = t.unescape() {
                        out.push_str(&s);
                    }
                }
            }
            Ok(Event::End(e)) => match local_name(e.name().as_ref()) {
                b"t" => in_text_run = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }
    out
}

/// Parse an XLSX workbook: one section per non-empty sheet
pub fn parse_xlsx(path: &Path) -> Result<ParsedDocument> {
    let mut workbook = calamine::open_workbook_auto(path)
        .map_err(|e| ParseError::Failed(format!("failed to open workbook: {e}")))?;

    let mut doc = ParsedDocument::default();
    let names: Vec<String> = workbook.sheet_names().to_vec();
    let mut parts = Vec::new();

    for name in names {
        let range = match workbook.worksheet_range(&name) {
            Ok(r) => r,
            _ => continue,
        };

        let mut rows = Vec::new();
        for row in range.rows() {
            let mut cells: Vec<String> = row.iter().map(cell_to_string).collect();
            while cells.last().is_some_and(|c| c.trim().is_empty()) {
                cells.pop();
            }
            if cells.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            rows.push(cells.join("\t"));
        }

        // Empty sheets are omitted entirely
        if rows.is_empty() {
            continue;
        }

        let body = rows.join("\n");
        parts.push(format!("[Sheet: {name}]\n{body}"));
        doc.sections.push(Section {
            title: Some(name),
            content: body,
            page: None,
        });
    }

    doc.content = parts.join("\n\n");
    Ok(doc)
}

fn cell_to_string(c: &calamine::DataType) -> String {
    use calamine::DataType as D;
    match c {
        D::Empty => String::new(),
        D::String(s) => s.replace("\r\n", "\n").replace('\r', "\n"),
        D::Float(f) => {
            if f.fract() == 0.0 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        D::Int(i) => i.to_string(),
        D::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        D::Error(e) => format!("#ERR:{e:?}"),
        other => format!("{other}"),
    }
}

/// Read docProps/core.xml into document metadata (title, author, tags, ...)
fn read_core_properties(archive: &mut zip::ZipArchive<File>, doc: &mut ParsedDocument) {
    let Some(xml) = read_entry(archive, "docProps/core.xml") else {
        return;
    };

    let mut reader = Reader::from_str(&xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut current: Option<&'static str> = None;

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                current = match local_name(e.name().as_ref()) {
                    b"title" => Some("title"),
                    b"creator" => Some("author"),
                    b"subject" => Some("subject"),
                    b"description" => Some("description"),
                    b"keywords" => Some("keywords"),
                    _ => None,
                };
            }
            Ok(Event::Text(t)) => {
                if let (Some(key), Ok(s)) = (current, t.unescape()) {
                    let value = s.trim();
                    if value.is_empty() {
                        continue;
                    }
                    if key == "keywords" {
                        let tags: Vec<String> = value
                            .split([',', ';'])
                            .map(|t| t.trim().to_string())
                            .filter(|t| !t.is_empty())
                            .collect();
                        doc.metadata.insert("tags".to_string(), MetaValue::from(tags));
                    } else {
                        doc.metadata
                            .insert(key.to_string(), MetaValue::from(value));
                    }
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }
}
