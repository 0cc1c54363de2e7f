//! Block rule engine backed by Brave's adblock-rust
//!
//! Supports EasyList, EasyPrivacy, and uBlock Origin network filter syntax.
//! The compiled engine is immutable; `LazyEngine` builds it exactly once
//! and then hands out shared references for unsynchronized reads.

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use adblock::lists::{FilterSet, ParseOptions};
use adblock::Engine;
use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::error::{LensError, Result};

/// Ad/tracker list compiled into the binary
const BUNDLED_RULES: &str = include_str!("../../assets/default_rules.txt");

/// Kind of sub-resource an element references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Script,
    Link,
    Image,
    Iframe,
}

impl ResourceKind {
    /// Map an HTML tag name to the resource it loads
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "script" => Some(ResourceKind::Script),
            "link" => Some(ResourceKind::Link),
            "img" => Some(ResourceKind::Image),
            "iframe" => Some(ResourceKind::Iframe),
            _ => None,
        }
    }

    /// Attribute holding the resource URL
    pub fn url_attribute(&self) -> &'static str {
        match self {
            ResourceKind::Link => "href",
            _ => "src",
        }
    }

    /// Request type understood by the rule engine
    pub fn request_type(&self) -> &'static str {
        match self {
            ResourceKind::Script => "script",
            ResourceKind::Link => "stylesheet",
            ResourceKind::Image => "image",
            ResourceKind::Iframe => "sub_frame",
        }
    }
}

/// Where rules come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    /// The list shipped with the binary
    Bundled,
    /// EasyList-format files; falls back to the bundled list if none load
    Files(Vec<PathBuf>),
    /// Inline rules
    Rules(Vec<String>),
}

/// Compiled ad/tracker rule set
pub struct BlockRuleEngine {
    engine: Engine,
    rule_count: usize,
}

impl fmt::Debug for BlockRuleEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockRuleEngine")
            .field("rule_count", &self.rule_count)
            .finish()
    }
}

impl BlockRuleEngine {
    /// Compile an engine from filter-list lines
    pub fn from_rules<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules: Vec<String> = rules
            .into_iter()
            .map(|r| r.as_ref().trim().to_string())
            .filter(|r| !r.is_empty() && !r.starts_with('!') && !r.starts_with('['))
            .collect();
        let rule_count = rules.len();

        let mut filter_set = FilterSet::new(false);
        filter_set.add_filters(&rules, ParseOptions::default());

        Self {
            engine: Engine::from_filter_set(filter_set, true),
            rule_count,
        }
    }

    /// An engine that matches nothing
    pub fn empty() -> Self {
        Self::from_rules(std::iter::empty::<&str>())
    }

    pub fn bundled() -> Self {
        Self::from_rules(BUNDLED_RULES.lines())
    }

    /// Build from a rule source, logging what was loaded
    pub fn build(source: &RuleSource) -> Self {
        let engine = match source {
            RuleSource::Bundled => Self::bundled(),
            RuleSource::Rules(rules) => Self::from_rules(rules),
            RuleSource::Files(paths) => {
                let mut lines = Vec::new();
                for path in paths {
                    match fs::read_to_string(path) {
                        Ok(content) => {
                            let before = lines.len();
                            lines.extend(content.lines().map(str::to_string));
                            info!(
                                "Loaded {} lines from {}",
                                lines.len() - before,
                                path.display()
                            );
                        }
                        Err(e) => warn!("Failed to read filter list {}: {}", path.display(), e),
                    }
                }

                if lines.is_empty() {
                    warn!("No filter lists could be read, using bundled rules");
                    Self::bundled()
                } else {
                    Self::from_rules(lines)
                }
            }
        };

        info!("Block rule engine initialized with {} rules", engine.rule_count);
        engine
    }

    pub fn rule_count(&self) -> usize {
        self.rule_count
    }

    /// Whether a request for `url`, made by a page at `source_url`, is blocked.
    ///
    /// Fails when the engine cannot build a request from the inputs, e.g.
    /// `url` is not an absolute URL.
    pub fn matches(&self, url: &str, kind: ResourceKind, source_url: &str) -> Result<bool> {
        let request = adblock::request::Request::new(url, source_url, kind.request_type())
            .map_err(|e| LensError::InvalidInput(format!("Unmatchable URL '{}': {:?}", url, e)))?;
        Ok(self.engine.check_network_request(&request).matched)
    }
}

/// One-time initialization barrier for the process-wide engine.
///
/// Concurrent first callers block until a single build completes; every
/// caller then shares the same immutable engine.
pub struct LazyEngine {
    cell: OnceCell<BlockRuleEngine>,
    source: RuleSource,
    builds: AtomicUsize,
}

impl LazyEngine {
    pub fn new(source: RuleSource) -> Self {
        Self {
            cell: OnceCell::new(),
            source,
            builds: AtomicUsize::new(0),
        }
    }

    /// Get the engine, building it on first use.
    ///
    /// The first call compiles every rule and can take a while; call from a
    /// blocking context.
    pub fn get(&self) -> &BlockRuleEngine {
        self.cell.get_or_init(|| {
            self.builds.fetch_add(1, Ordering::SeqCst);
            BlockRuleEngine::build(&self.source)
        })
    }

    pub fn is_ready(&self) -> bool {
        self.cell.get().is_some()
    }

    /// How many times the engine has been constructed (0 or 1)
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for LazyEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyEngine")
            .field("source", &self.source)
            .field("ready", &self.is_ready())
            .finish()
    }
}
