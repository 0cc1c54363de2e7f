//! Markup filter
//!
//! Removes ad/tracker elements from an HTML document in two passes: scan
//! the candidate elements and collect the blocked ones, then detach them
//! from the tree. The tree is never mutated while it is being walked.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use super::engine::{BlockRuleEngine, ResourceKind};

/// Elements that load a sub-resource through an attribute
const CANDIDATES: &str = "script[src], link[href], img[src], iframe[src]";

static CANDIDATE_SELECTOR: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse(CANDIDATES).ok());

/// Result of one filter pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Nothing matched; the input is returned verbatim
    Unchanged(String),
    Filtered { html: String, removed: usize },
}

impl FilterOutcome {
    pub fn removed(&self) -> usize {
        match self {
            FilterOutcome::Unchanged(_) => 0,
            FilterOutcome::Filtered { removed, .. } => *removed,
        }
    }

    pub fn into_html(self) -> String {
        match self {
            FilterOutcome::Unchanged(html) => html,
            FilterOutcome::Filtered { html, .. } => html,
        }
    }
}

/// Strips blocked resource-bearing elements from HTML documents
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupFilter;

impl MarkupFilter {
    pub fn new() -> Self {
        Self
    }

    /// Filter `html`, resolving relative resource URLs against `source_url`.
    pub fn filter(&self, html: String, source_url: &Url, engine: &BlockRuleEngine) -> FilterOutcome {
        let Some(candidates) = CANDIDATE_SELECTOR.as_ref() else {
            return FilterOutcome::Unchanged(html);
        };
        let mut document = Html::parse_document(&html);
        let source = source_url.as_str();

        // Pass 1: decide.
        let mut blocked = Vec::new();
        for element in document.select(candidates) {
            let Some(kind) = ResourceKind::from_tag(element.value().name()) else {
                continue;
            };
            let Some(raw) = element.value().attr(kind.url_attribute()) else {
                continue;
            };
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }

            if is_blocked(engine, raw, kind, source_url) {
                debug!(url = raw, kind = ?kind, page = source, "Blocking element");
                blocked.push(element.id());
            }
        }

        if blocked.is_empty() {
            return FilterOutcome::Unchanged(html);
        }

        // Pass 2: apply.
        let removed = blocked.len();
        for id in blocked {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
            }
        }

        FilterOutcome::Filtered {
            html: document.html(),
            removed,
        }
    }
}

/// Match one element, isolating failures to that element.
///
/// The resolved absolute URL is tried first; if it cannot be resolved the
/// raw attribute value still gets a chance to match. An element whose URL
/// the engine rejects outright is kept.
fn is_blocked(engine: &BlockRuleEngine, raw: &str, kind: ResourceKind, source_url: &Url) -> bool {
    let source = source_url.as_str();
    let candidate = match source_url.join(raw) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => raw.to_string(),
    };

    match engine.matches(&candidate, kind, source) {
        Ok(matched) => matched,
        Err(e) if candidate != raw => match engine.matches(raw, kind, source) {
            Ok(matched) => matched,
            Err(_) => {
                debug!("Skipping element: {}", e);
                false
            }
        },
        Err(e) => {
            debug!("Skipping element: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://news.example/articles/1").unwrap()
    }

    fn ad_engine() -> BlockRuleEngine {
        BlockRuleEngine::from_rules(["||ads.example^", "/tracking-pixel."])
    }

    #[test]
    fn test_candidate_selector_parses() {
        assert!(CANDIDATE_SELECTOR.is_some());
    }

    #[test]
    fn test_removes_matched_image_and_keeps_logo() {
        let html = r#"<!DOCTYPE html><html><head></head><body>
<img src="https://ads.example/t.gif">
<img src="https://cdn.example/logo.png" alt="Logo">
</body></html>"#;

        let outcome = MarkupFilter::new().filter(html.to_string(), &page(), &ad_engine());

        assert_eq!(outcome.removed(), 1);
        let out = outcome.into_html();
        assert!(!out.contains("ads.example"));
        assert!(out.contains(r#"<img src="https://cdn.example/logo.png" alt="Logo">"#));
    }

    #[test]
    fn test_relative_urls_are_resolved_against_page() {
        let html = r#"<html><body><img src="/img/tracking-pixel.gif"><img src="hero.jpg"></body></html>"#;

        let outcome = MarkupFilter::new().filter(html.to_string(), &page(), &ad_engine());

        assert_eq!(outcome.removed(), 1);
        let out = outcome.into_html();
        assert!(!out.contains("tracking-pixel"));
        assert!(out.contains("hero.jpg"));
    }

    #[test]
    fn test_all_candidate_kinds_are_checked() {
        let html = r#"<html><head>
<script src="https://ads.example/a.js"></script>
<link rel="stylesheet" href="https://ads.example/a.css">
</head><body>
<iframe src="https://ads.example/frame.html"></iframe>
<img src="https://ads.example/a.png">
<p>Story text</p>
</body></html>"#;

        let outcome = MarkupFilter::new().filter(html.to_string(), &page(), &ad_engine());

        assert_eq!(outcome.removed(), 4);
        let out = outcome.into_html();
        assert!(!out.contains("ads.example"));
        assert!(out.contains("<p>Story text</p>"));
    }

    #[test]
    fn test_non_candidate_elements_are_never_removed() {
        // Same URL in places the filter must not touch.
        let html = r#"<html><body>
<a href="https://ads.example/landing">sponsor</a>
<video src="https://ads.example/v.mp4"></video>
<script>var u = "https://ads.example/inline";</script>
</body></html>"#;

        let outcome = MarkupFilter::new().filter(html.to_string(), &page(), &ad_engine());

        assert_eq!(outcome, FilterOutcome::Unchanged(html.to_string()));
    }

    #[test]
    fn test_no_matches_returns_input_verbatim_and_is_idempotent() {
        let html = "<html><body><img src=\"/a.png\"><br/>\n<p class='x'>Tom &amp; Jerry</p></body></html>";
        let engine = BlockRuleEngine::empty();
        let filter = MarkupFilter::new();

        let once = filter.filter(html.to_string(), &page(), &engine).into_html();
        let twice = filter.filter(once.clone(), &page(), &engine).into_html();

        assert_eq!(once, html);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_serialization_keeps_void_elements_and_escaping() {
        let html = r#"<html><head><meta charset="utf-8"></head><body>
<img src="https://ads.example/x.gif"><input value="a &quot;b&quot; &amp; c"><br>
</body></html>"#;

        let out = MarkupFilter::new()
            .filter(html.to_string(), &page(), &ad_engine())
            .into_html();

        assert!(out.contains(r#"<meta charset="utf-8">"#));
        assert!(out.contains(r#"<input value="a &quot;b&quot; &amp; c">"#));
        assert!(out.contains("<br>"));
        assert!(!out.contains("</br>"));
        assert!(!out.contains("</input>"));
    }

    #[test]
    fn test_unmatchable_urls_are_kept() {
        let html = r#"<html><body><img src="data:image/png;base64,AAAA"><img src="https://ads.example/x.gif"></body></html>"#;

        let outcome = MarkupFilter::new().filter(html.to_string(), &page(), &ad_engine());

        assert_eq!(outcome.removed(), 1);
        assert!(outcome.into_html().contains("data:image/png;base64,AAAA"));
    }

    #[test]
    fn test_nested_blocked_elements_are_removed_once() {
        let html = r#"<html><body><iframe src="https://ads.example/f"><img src="https://ads.example/i.gif"></iframe><p>ok</p></body></html>"#;

        let out = MarkupFilter::new()
            .filter(html.to_string(), &page(), &ad_engine())
            .into_html();
        assert!(!out.contains("ads.example"));
        assert!(out.contains("<p>ok</p>"));
    }
}
