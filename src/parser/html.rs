//! HTML parsing via scraper: container selection, tag filtering, heading sections

use crate::document::{MetaValue, ParsedDocument, Section};
use crate::error::{ParseError, Result};
use scraper::{ElementRef, Html, Node, Selector};
use std::path::Path;

/// Subtrees that carry no body text
const EXCLUDED_TAGS: &[&str] = &["script", "style", "noscript", "iframe", "svg"];

/// Elements that imply a line break around their content
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "li", "ul", "ol", "table", "tr",
    "blockquote", "pre", "br",
];

/// Preferred containers for body text, most specific first
const CONTAINER_SELECTORS: &[&str] = &["main", "article", "[role=\"main\"]", ".content", "body"];

/// Parse an HTML file: filtered body text plus heading-delimited sections
pub fn parse(path: &Path) -> Result<ParsedDocument> {
    let raw = super::read_lossy(path)?;
    let html = Html::parse_document(&raw);

    let mut doc = ParsedDocument::default();

    let title_sel = Selector::parse("title").expect("static selector");
    if let Some(title_el) = html.select(&title_sel).next() {
        let title = title_el.text().collect::<String>().trim().to_string();
        if !title.is_empty() {
            doc.metadata.insert("title".to_string(), MetaValue::String(title));
        }
    }

    let container = CONTAINER_SELECTORS.iter().find_map(|sel| {
        let selector = Selector::parse(sel).ok()?;
        html.select(&selector).next()
    });

    let Some(container) = container else {
        return Ok(doc);
    };

    let mut state = WalkState::default();
    for child in container.children() {
        walk(child, &mut state);
    }
    state.finish_section();

    doc.content = squeeze_blank_lines(state.text.trim());
    doc.sections = state
        .sections
        .into_iter()
        .map(|mut s| {
            s.content = squeeze_blank_lines(s.content.trim());
            s
        })
        .filter(|s| !s.content.is_empty() || s.title.is_some())
        .collect();

    Ok(doc)
}

#[derive(Default)]
struct WalkState {
    text: String,
    sections: Vec<Section>,
    current: Option<Section>,
}

impl WalkState {
    fn push_text(&mut self, s: &str) {
        if s.trim().is_empty() {
            return;
        }
        self.text.push_str(s);
        if let Some(section) = self.current.as_mut() {
            section.content.push_str(s);
        }
    }

    fn newline(&mut self) {
        if !self.text.ends_with('\n') && !self.text.is_empty() {
            self.text.push('\n');
        }
        if let Some(section) = self.current.as_mut() {
            if !section.content.ends_with('\n') && !section.content.is_empty() {
                section.content.push('\n');
            }
        }
    }

    fn start_section(&mut self, title: String) {
        self.finish_section();
        self.current = Some(Section {
            title: Some(title),
            ..Default::default()
        });
    }

    fn finish_section(&mut self) {
        if let Some(section) = self.current.take() {
            self.sections.push(section);
        }
    }
}

fn heading_level(name: &str) -> Option<u8> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn walk(node: ego_tree::NodeRef<'_, Node>, state: &mut WalkState) {
    match node.value() {
        Node::Text(text) => state.push_text(&text),
        Node::Element(element) => {
            let name = element.name();
            if EXCLUDED_TAGS.contains(&name) {
                return;
            }
            if heading_level(name).is_some() {
                let title = ElementRef::wrap(node)
                    .map(|el| el.text().collect::<String>().trim().to_string())
                    .unwrap_or_default();
                state.newline();
                state.start_section(title.clone());
                state.push_text(&title);
                state.newline();
                return;
            }
            let block = BLOCK_TAGS.contains(&name);
            if block {
                state.newline();
            }
            for child in node.children() {
                walk(child, state);
            }
            if block {
                state.newline();
            }
        }
        _ => {
            for child in node.children() {
                walk(child, state);
            }
        }
    }
}

fn squeeze_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if blank_run > 0 {
                out.push('\n');
            }
        }
        blank_run = 0;
        out.push_str(line.trim_end());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_html(content: &str) -> ParsedDocument {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(&path, content).unwrap();
        parse(&path).unwrap()
    }

    #[test]
    fn test_scripts_and_styles_removed() {
        let doc = parse_html(
            "<html><head><title>T</title><style>.x{}</style></head>\
             <body><script>var x=1;</script><p>visible text</p></body></html>",
        );
        assert!(doc.content.contains("visible text"));
        assert!(!doc.content.contains("var x"));
        assert!(!doc.content.contains(".x{}"));
    }

    #[test]
    fn test_main_preferred_over_body() {
        let doc = parse_html(
            "<html><body><nav>menu stuff</nav><main><p>the real content</p></main></body></html>",
        );
        assert!(doc.content.contains("the real content"));
        assert!(!doc.content.contains("menu stuff"));
    }

    #[test]
    fn test_headings_open_sections() {
        let doc = parse_html(
            "<html><body><h1>One</h1><p>alpha</p><h2>Two</h2><p>beta</p></body></html>",
        );
        assert_eq!(doc.sections.len(), 2);
        assert_eq!(doc.sections[0].title.as_deref(), Some("One"));
        assert!(doc.sections[0].content.contains("alpha"));
        assert!(doc.sections[1].content.contains("beta"));
    }

    #[test]
    fn test_entities_decoded() {
        let doc = parse_html("<html><body><p>fish &amp; chips &lt;now&gt;</p></body></html>");
        assert!(doc.content.contains("fish & chips <now>"));
    }

    #[test]
    fn test_title_metadata() {
        let doc = parse_html("<html><head><title>Page Title</title></head><body><p>x</p></body></html>");
        assert_eq!(
            doc.metadata.get("title").unwrap().as_str(),
            Some("Page Title")
        );
    }
}
