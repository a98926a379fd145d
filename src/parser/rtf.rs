//! RTF parsing: control-word stripping, escape translation, info metadata

use crate::document::{MetaValue, ParsedDocument};
use crate::error::Result;
use regex::Regex;
use std::path::Path;

/// Destination groups whose content never reaches the body text
const SKIP_DESTINATIONS: &[&str] = &[
    "fonttbl",
    "colortbl",
    "stylesheet",
    "pict",
    "header",
    "footer",
];

/// Parse an RTF file.
///
/// A blob that does not begin with `{\rtf` is treated as plain text. Otherwise
/// control groups are stripped, escapes are translated, and the info block's
/// title/author/subject populate metadata.
pub fn parse(path: &Path) -> Result<ParsedDocument> {
    let raw = super::read_lossy(path)?;
    if !raw.starts_with("{\\rtf") {
        return Ok(ParsedDocument {
            content: raw,
            ..Default::default()
        });
    }

    let mut doc = ParsedDocument::default();
    doc.content = strip_rtf(&raw, &mut doc);
    Ok(doc)
}

fn strip_rtf(raw: &str, doc: &mut ParsedDocument) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len() / 2);

    let mut i = 0usize;
    let mut depth = 0usize;
    // Depth of the group currently being skipped, if any
    let mut skip_depth: Option<usize> = None;
    // Depth of the \info group, if inside one
    let mut info_depth: Option<usize> = None;
    // Active info field capture: (metadata key, buffer, group depth)
    let mut field: Option<(&'static str, String, usize)> = None;

    while i < chars.len() {
        match chars[i] {
            '{' => {
                depth += 1;
                i += 1;
            }
            '}' => {
                depth = depth.saturating_sub(1);
                i += 1;
                if skip_depth.is_some_and(|d| depth < d) {
                    skip_depth = None;
                }
                if let Some((key, buf, d)) = field.take() {
                    if depth < d {
                        let value = buf.trim().to_string();
                        if !value.is_empty() {
                            doc.metadata.insert(key.to_string(), MetaValue::String(value));
                        }
                    } else {
                        field = Some((key, buf, d));
                    }
                }
                if info_depth.is_some_and(|d| depth < d) {
                    info_depth = None;
                }
            }
            '\\' => {
                let (token, next) = read_control(&chars, i + 1);
                i = next;
                if skip_depth.is_some() {
                    continue;
                }
                match token {
                    Control::Word(word, param) => {
                        let translated = translate_word(&word);
                        if let Some(text) = translated {
                            emit(text, &mut field, info_depth, &mut out);
                        } else if word == "u" {
                            if let Some(c) = unicode_escape(param) {
                                emit_char(c, &mut field, info_depth, &mut out);
                            }
                            // Consume the substitution character, if present
                            if i < chars.len() && chars[i] == '?' {
                                i += 1;
                            }
                        } else if SKIP_DESTINATIONS.contains(&word.as_str()) {
                            skip_depth = Some(depth);
                        } else if word == "info" {
                            info_depth = Some(depth);
                        } else if info_depth.is_some() {
                            match word.as_str() {
                                "title" => field = Some(("title", String::new(), depth)),
                                "author" => field = Some(("author", String::new(), depth)),
                                "subject" => field = Some(("subject", String::new(), depth)),
                                _ => {}
                            }
                        }
                    }
                    Control::Hex(byte) => {
                        emit_char(byte as char, &mut field, info_depth, &mut out);
                    }
                    Control::Symbol(c) => match c {
                        '~' => emit_char(' ', &mut field, info_depth, &mut out),
                        '\\' | '{' | '}' => emit_char(c, &mut field, info_depth, &mut out),
                        '*' => skip_depth = Some(depth),
                        _ => {}
                    },
                }
            }
            '\n' | '\r' => i += 1,
            c => {
                i += 1;
                if skip_depth.is_none() {
                    emit_char(c, &mut field, info_depth, &mut out);
                }
            }
        }
    }

    normalize_whitespace(&out)
}

enum Control {
    /// Control word with optional numeric parameter
    Word(String, Option<i32>),
    /// `\'HH` hex escape
    Hex(u8),
    /// Single-character control symbol
    Symbol(char),
}

/// Read the control token following a backslash; returns the next index
fn read_control(chars: &[char], mut i: usize) -> (Control, usize) {
    if i >= chars.len() {
        return (Control::Symbol('\\'), i);
    }

    if chars[i] == '\'' {
        let hex: String = chars[i + 1..].iter().take(2).collect();
        let next = (i + 1 + hex.len()).min(chars.len());
        return match u8::from_str_radix(&hex, 16) {
            Ok(byte) => (Control::Hex(byte), next),
            Err(_) => (Control::Symbol('\''), i + 1),
        };
    }

    if !chars[i].is_ascii_alphabetic() {
        return (Control::Symbol(chars[i]), i + 1);
    }

    let mut word = String::new();
    while i < chars.len() && chars[i].is_ascii_alphabetic() {
        word.push(chars[i]);
        i += 1;
    }

    let mut param = String::new();
    if i < chars.len() && (chars[i] == '-' || chars[i].is_ascii_digit()) {
        param.push(chars[i]);
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            param.push(chars[i]);
            i += 1;
        }
    }

    // A single space terminates the control word and is consumed with it
    if i < chars.len() && chars[i] == ' ' {
        i += 1;
    }

    (Control::Word(word, param.parse().ok()), i)
}

/// Fixed text for the translated control words
fn translate_word(word: &str) -> Option<&'static str> {
    match word {
        "par" | "line" => Some("\n"),
        "tab" => Some("\t"),
        "bullet" => Some("\u{2022}"),
        "endash" => Some("\u{2013}"),
        "emdash" => Some("\u{2014}"),
        "lquote" => Some("\u{2018}"),
        "rquote" => Some("\u{2019}"),
        "ldblquote" => Some("\u{201C}"),
        "rdblquote" => Some("\u{201D}"),
        _ => None,
    }
}

/// Decode `\uN` decimal escapes; negative values wrap per the 16-bit encoding
fn unicode_escape(param: Option<i32>) -> Option<char> {
    let n = param?;
    let code = if n < 0 { n + 65536 } else { n };
    char::from_u32(u32::try_from(code).ok()?)
}

fn emit(
    text: &str,
    field: &mut Option<(&'static str, String, usize)>,
    info_depth: Option<usize>,
    out: &mut String,
) {
    for c in text.chars() {
        emit_char(c, field, info_depth, out);
    }
}

fn emit_char(
    c: char,
    field: &mut Option<(&'static str, String, usize)>,
    info_depth: Option<usize>,
    out: &mut String,
) {
    if let Some((_, buf, _)) = field.as_mut() {
        buf.push(c);
    } else if info_depth.is_none() {
        out.push(c);
    }
}

fn normalize_whitespace(text: &str) -> String {
    let spaces = Regex::new(r"[ \t]{2,}").expect("static regex");
    let newlines = Regex::new(r"\n{3,}").expect("static regex");
    let collapsed = spaces.replace_all(text, " ");
    newlines.replace_all(&collapsed, "\n\n").trim().to_string()
}
