//! Plain text and markdown parsing

use super::read_lossy;
use crate::document::{MetaValue, ParsedDocument, Section};
use crate::error::Result;
use std::path::Path;

/// Parse a plain text file
pub fn parse_text(path: &Path) -> Result<ParsedDocument> {
    let content = read_lossy(path)?;
    Ok(ParsedDocument {
        content,
        ..Default::default()
    })
}

/// Parse a markdown file.
///
/// The first top-level heading becomes the document title; headings at any
/// level open a new section.
pub fn parse_markdown(path: &Path) -> Result<ParsedDocument> {
    let content = read_lossy(path)?;
    let mut doc = ParsedDocument {
        content: content.clone(),
        ..Default::default()
    };

    let mut current: Option<Section> = None;
    for line in content.lines() {
        if let Some((level, heading)) = heading_of(line) {
            if level == 1 && !doc.metadata.contains_key("title") {
                doc.metadata
                    .insert("title".to_string(), MetaValue::from(heading));
            }
            if let Some(section) = current.take() {
                doc.sections.push(section);
            }
            current = Some(Section {
                title: Some(heading.to_string()),
                ..Default::default()
            });
        } else if let Some(section) = current.as_mut() {
            if !section.content.is_empty() {
                section.content.push('\n');
            }
            section.content.push_str(line);
        }
    }
    if let Some(section) = current {
        doc.sections.push(section);
    }

    Ok(doc)
}

/// ATX heading level and text, if the line is a heading
fn heading_of(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') && !rest.is_empty() {
        return None;
    }
    Some((hashes, rest.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(content: &str, name: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_markdown_title_and_sections() {
        let (_dir, path) = write_temp(
            "# My Title\nintro\n\n## Part One\nbody one\n\n### Detail\nbody two\n",
            "doc.md",
        );
        let doc = parse_markdown(&path).unwrap();
        assert_eq!(doc.metadata.get("title").unwrap().as_str(), Some("My Title"));
        assert_eq!(doc.sections.len(), 3);
        assert_eq!(doc.sections[1].title.as_deref(), Some("Part One"));
        assert_eq!(doc.sections[1].content, "body one\n");
    }

    #[test]
    fn test_markdown_without_heading() {
        let (_dir, path) = write_temp("just a paragraph\n", "plain.md");
        let doc = parse_markdown(&path).unwrap();
        assert!(doc.metadata.get("title").is_none());
        assert!(doc.sections.is_empty());
        assert_eq!(doc.content, "just a paragraph\n");
    }

    #[test]
    fn test_heading_detection() {
        assert_eq!(heading_of("# Top"), Some((1, "Top")));
        assert_eq!(heading_of("### Deep"), Some((3, "Deep")));
        assert_eq!(heading_of("#nospace"), None);
        assert_eq!(heading_of("plain"), None);
    }

    #[test]
    fn test_text_passthrough() {
        let (_dir, path) = write_temp("line a\nline b", "note.txt");
        let doc = parse_text(&path).unwrap();
        assert_eq!(doc.content, "line a\nline b");
        assert!(doc.sections.is_empty());
    }
}
