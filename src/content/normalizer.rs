//! Reduce fetched HTML to the part that should be compared.
//!
//! Normalization is pure: the same input and configuration always give the
//! same output. Bad selectors never raise; they degrade to "no match".

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};

use crate::models::{ComparisonConfig, ComparisonMode, TextGate};

const NON_CONTENT: &str = "script, style, noscript";
const BODY_SCOPE: &str = "body *";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedContent {
    pub content: String,
    /// Too little text survived the `TEXT_ONLY` filters to judge a change.
    pub inconclusive: bool,
}

impl NormalizedContent {
    fn conclusive(content: String) -> Self {
        Self {
            content,
            inconclusive: false,
        }
    }
}

pub fn normalize(raw: &str, config: &ComparisonConfig) -> NormalizedContent {
    match config.mode {
        ComparisonMode::FullHtml => NormalizedContent::conclusive(raw.to_string()),
        ComparisonMode::TextOnly => extract_text(raw, &config.text_gate),
        ComparisonMode::CssSelector => NormalizedContent::conclusive(extract_by_selector(
            raw,
            config.include_selector.as_deref(),
            config.exclude_selector.as_deref(),
        )),
    }
}

/// Visible text, one block per line. Blocks shorter than the gate's minimum
/// length and words shorter than its minimum word length are dropped.
pub fn extract_text(html: &str, gate: &TextGate) -> NormalizedContent {
    let mut document = Html::parse_document(html);
    strip_non_content(&mut document);

    let mut blocks = Vec::new();
    for node in document.tree.root().descendants() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };
        let own_text = element
            .children()
            .filter_map(|child| child.value().as_text())
            .map(|text| &**text)
            .collect::<Vec<&str>>()
            .join(" ");
        let block = collapse_whitespace(&own_text);
        if block.is_empty() || block.chars().count() < gate.min_text_length {
            continue;
        }
        let block = filter_short_words(&block, gate.min_word_length);
        if !block.is_empty() {
            blocks.push(block);
        }
    }

    let content = blocks.join("\n");
    let word_count = content.split_whitespace().count();
    let inconclusive = content.chars().count() < gate.min_text_length || word_count == 0;
    if inconclusive {
        tracing::debug!(
            "Text extract inconclusive: {} chars, {} words",
            content.chars().count(),
            word_count
        );
    }

    NormalizedContent {
        content,
        inconclusive,
    }
}

/// Serialized nodes in scope, one per line, in document order.
///
/// Without an include selector the scope is everything under `<body>`. A node
/// nested inside another scoped node is only emitted through its ancestor.
/// Excluded nodes are cut out together with their subtrees.
pub fn extract_by_selector(html: &str, include: Option<&str>, exclude: Option<&str>) -> String {
    let mut document = Html::parse_document(html);
    strip_non_content(&mut document);

    let include = include.map(str::trim).filter(|s| !s.is_empty());
    let exclude = exclude.map(str::trim).filter(|s| !s.is_empty());

    let scope_selector = match parse_selector(include.unwrap_or(BODY_SCOPE)) {
        Some(selector) => selector,
        None => return String::new(),
    };
    let scoped: Vec<_> = document.select(&scope_selector).map(|el| el.id()).collect();
    if scoped.is_empty() {
        tracing::debug!("No elements matched {:?}", include.unwrap_or(BODY_SCOPE));
        return String::new();
    }

    if let Some(selector) = exclude.and_then(parse_selector) {
        let removed = detach_matching(&mut document, &selector);
        tracing::debug!("Excluded {} elements", removed);
    }

    let root = document.tree.root().id();
    let scoped_set: HashSet<_> = scoped.iter().copied().collect();
    let mut parts = Vec::new();
    for id in scoped {
        let Some(node) = document.tree.get(id) else {
            continue;
        };
        let attached = node.ancestors().any(|a| a.id() == root);
        let nested = node.ancestors().any(|a| scoped_set.contains(&a.id()));
        if !attached || nested {
            continue;
        }
        if let Some(element) = ElementRef::wrap(node) {
            parts.push(element.html());
        }
    }

    parts.join("\n")
}

fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(selector) => Some(selector),
        Err(e) => {
            tracing::warn!("Invalid CSS selector {:?}: {}", selector, e);
            None
        }
    }
}

fn strip_non_content(document: &mut Html) {
    if let Ok(selector) = Selector::parse(NON_CONTENT) {
        detach_matching(document, &selector);
    }
}

fn detach_matching(document: &mut Html, selector: &Selector) -> usize {
    let ids: Vec<_> = document.select(selector).map(|el| el.id()).collect();
    for id in &ids {
        if let Some(mut node) = document.tree.get_mut(*id) {
            node.detach();
        }
    }
    ids.len()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn filter_short_words(text: &str, min_word_length: usize) -> String {
    if min_word_length <= 1 {
        return text.to_string();
    }
    text.split_whitespace()
        .filter(|word| word.chars().filter(|c| c.is_alphanumeric()).count() >= min_word_length)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(min_text_length: usize, min_word_length: usize) -> TextGate {
        TextGate {
            min_text_length,
            min_word_length,
        }
    }

    #[test]
    fn full_html_passes_through() {
        let raw = "<html><body><p>x</p></body></html>";
        let out = normalize(raw, &ComparisonConfig::full_html());
        assert_eq!(out.content, raw);
        assert!(!out.inconclusive);
    }

    #[test]
    fn text_only_drops_scripts_and_styles() {
        let raw = r#"<html><head><script>var tracker = "secret";</script><style>p { color: red }</style></head>
            <body><p>Hello world, this is a paragraph.</p><noscript>Enable JavaScript please</noscript></body></html>"#;
        let out = extract_text(raw, &gate(1, 1));
        assert_eq!(out.content, "Hello world, this is a paragraph.");
        assert!(!out.inconclusive);
    }

    #[test]
    fn text_only_drops_short_blocks() {
        let raw = "<body><p>Home</p><p>A   longer\n paragraph here</p></body>";
        let out = extract_text(raw, &gate(10, 1));
        assert_eq!(out.content, "A longer paragraph here");
    }

    #[test]
    fn text_only_drops_short_words() {
        let raw = "<body><p>The cat jumped over fences.</p></body>";
        let out = extract_text(raw, &gate(1, 4));
        assert_eq!(out.content, "jumped over fences.");
    }

    #[test]
    fn text_only_puts_blocks_on_separate_lines() {
        let raw = "<body><h1>First heading</h1><div>Second block <b>bold part</b></div></body>";
        let out = extract_text(raw, &gate(1, 1));
        assert_eq!(out.content, "First heading\nSecond block\nbold part");
    }

    #[test]
    fn too_little_text_is_inconclusive() {
        let out = extract_text("<body><p>Hi</p></body>", &gate(10, 1));
        assert!(out.inconclusive);
        assert!(out.content.is_empty());

        let out = extract_text("<body><script>only()</script></body>", &gate(0, 1));
        assert!(out.inconclusive);
    }

    #[test]
    fn selector_excludes_nested_ads() {
        let raw = r#"<html><body>
            <div class="article">
                <h1>Title text</h1>
                <section><div><p class="ad">Buy now</p></div></section>
                <p>Body text</p>
            </div>
            <div class="sidebar">Side panel</div>
        </body></html>"#;
        let out = extract_by_selector(raw, Some("div.article"), Some("div.article .ad"));
        assert!(out.contains("Title text"));
        assert!(out.contains("Body text"));
        assert!(!out.contains("Buy now"));
        assert!(!out.contains("Side panel"));
    }

    #[test]
    fn selector_excludes_scoped_node_itself() {
        let raw = r#"<body><p class="skip">Skipped</p><p>Kept</p></body>"#;
        let out = extract_by_selector(raw, Some("p"), Some(".skip"));
        assert_eq!(out, "<p>Kept</p>");
    }

    #[test]
    fn default_scope_is_body_without_duplicates() {
        let raw = "<html><head><title>T</title></head><body><div><p>One</p></div><p>Two</p></body></html>";
        let out = extract_by_selector(raw, None, None);
        assert_eq!(out, "<div><p>One</p></div>\n<p>Two</p>");
        assert_eq!(out.matches("One").count(), 1);
    }

    #[test]
    fn nested_matches_are_emitted_once() {
        let raw = "<body><div><p>inner</p></div></body>";
        let out = extract_by_selector(raw, Some("div, p"), None);
        assert_eq!(out, "<div><p>inner</p></div>");
    }

    #[test]
    fn unmatched_include_is_empty_not_full_content() {
        let raw = "<body><p>Text</p></body>";
        assert_eq!(extract_by_selector(raw, Some("div.missing"), None), "");
    }

    #[test]
    fn malformed_selectors_degrade() {
        let raw = "<body><p>Text</p></body>";
        assert_eq!(extract_by_selector(raw, Some("p[[["), None), "");
        assert_eq!(extract_by_selector(raw, Some("p"), Some(":::bad")), "<p>Text</p>");
    }

    #[test]
    fn selector_mode_strips_scripts() {
        let raw = "<body><div id=\"main\"><script>x()</script><span>ok</span></div></body>";
        let out = extract_by_selector(raw, Some("#main"), None);
        assert_eq!(out, "<div id=\"main\"><span>ok</span></div>");
    }

    #[test]
    fn normalization_is_deterministic() {
        let raw = "<body><div class=\"a\"><p>one</p><p class=\"x\">two</p></div></body>";
        let config = ComparisonConfig::css_selector(Some(".a".into()), Some(".x".into()));
        assert_eq!(normalize(raw, &config), normalize(raw, &config));
    }
}
