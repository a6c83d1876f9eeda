//! Pattern-based concept tagging and ranking-token weighting.
//!
//! Every segment is matched against [`TAG_CATALOGUE`], a fixed ordered table
//! of `(tag, pattern)` pairs. Detected tags, declaration names and the plain
//! word tokens are folded into one weighted token list that feeds the BM25
//! index. Queries go through the same catalogue and the same tag weight.

use std::collections::{BTreeMap, HashMap, HashSet};

use rayon::prelude::*;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::{chunking::Segment, error::Result, text_util::tokenize};

/// Tag name → pattern. Matched case-insensitively, `^` anchors per line.
pub const TAG_CATALOGUE: &[(&str, &str)] = &[
    ("react_hooks", r"\b(use[A-Z]\w+)\b"),
    (
        "react_components",
        r"(React\.(Component|PureComponent)|function\s+[A-Z]\w+|const\s+[A-Z]\w+\s*=)",
    ),
    (
        "api_calls",
        r"(fetch|axios|request|get|post|put|delete|patch)\s*\(",
    ),
    ("async_ops", r"\b(async|await|Promise|then|catch)\b"),
    ("error_handling", r"\b(try|catch|throw|finally|Error)\b"),
    ("imports", r"^import\s+.*?from"),
    ("exports", r"^export\s+(default\s+)?"),
    (
        "state_mgmt",
        r"\b(useState|useReducer|setState|dispatch|store)\b",
    ),
    (
        "effects",
        r"\b(useEffect|useLayoutEffect|componentDidMount|componentDidUpdate)\b",
    ),
    (
        "event_handlers",
        r"\b(onClick|onChange|onSubmit|addEventListener|removeEventListener)\b",
    ),
    (
        "data_transform",
        r"\b(map|filter|reduce|forEach|find|some|every)\b",
    ),
    (
        "ai_patterns",
        r"\b(stream|completion|embedding|prompt|model|token|LLM|GPT|Claude)\b",
    ),
    ("config", r"\b(config|options|settings|env|process\.env)\b"),
    (
        "testing",
        r"\b(test|describe|it|expect|jest|vitest|assert)\b",
    ),
    ("type_defs", r"\b(interface|type|enum|implements|extends)\b"),
];

/// Declaration idioms whose first capture group is a name worth boosting.
const NAME_PATTERNS: &[&str] = &[
    r"function\s+(\w+)",
    r"const\s+(\w+)\s*=\s*(?:async\s+)?(?:\([^)]*\)|[\w\s]*)\s*=>",
    r"class\s+(\w+)",
    r"interface\s+(\w+)",
    r"type\s+(\w+)\s*=",
];

/// Copies of each tag word added to a token list, at index and query time.
pub const TAG_TOKEN_WEIGHT: usize = 3;

/// Extra copies of each extracted declaration name.
pub const NAME_TOKEN_WEIGHT: usize = 2;

/// Example matches kept per triggered tag.
pub const MAX_EXAMPLE_MATCHES: usize = 5;

/// Declaration names kept on a tagged segment.
pub const MAX_STORED_NAMES: usize = 10;

/// Ranking tokens persisted per segment.
pub const MAX_STORED_TOKENS: usize = 500;

const TOP_TERMS: usize = 20;
const MOST_COMMON_TAGS: usize = 10;

/// Declaration names listed in a batch analysis.
const SAMPLE_NAMES: usize = 10;

/// Split a tag name into its words (`react_hooks` → `react`, `hooks`).
pub fn tag_words(tag: &str) -> impl Iterator<Item = &str> {
    tag.split('_').filter(|w| !w.is_empty())
}

/// Token frequency summary of a weighted token list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenStats {
    pub total: usize,
    pub unique: usize,
    /// Most frequent tokens, by count then token.
    pub top_terms: Vec<(String, usize)>,
}

impl TokenStats {
    fn from_tokens(tokens: &[String]) -> Self {
        let mut freq: HashMap<&str, usize> = HashMap::new();
        for token in tokens {
            *freq.entry(token.as_str()).or_default() += 1;
        }
        let unique = freq.len();

        let top = top_by_count(
            freq.into_iter()
                .map(|(token, count)| (token.to_string(), count)),
            TOP_TERMS,
        );

        Self {
            total: tokens.len(),
            unique,
            top_terms: top,
        }
    }
}

/// A segment enriched with tags and its weighted token list.
#[derive(Debug, Clone)]
pub struct TaggedSegment {
    pub segment: Segment,
    /// Triggered tags, in catalogue order.
    pub tags: Vec<String>,
    /// Up to [`MAX_EXAMPLE_MATCHES`] distinct matches per triggered tag.
    pub pattern_matches: BTreeMap<String, Vec<String>>,
    /// First [`MAX_STORED_NAMES`] extracted declaration names.
    pub names: Vec<String>,
    /// Full weighted token list.
    pub ranking_tokens: Vec<String>,
    pub token_stats: TokenStats,
}

impl TaggedSegment {
    /// The prefix of [`Self::ranking_tokens`] that gets persisted.
    pub fn stored_tokens(&self) -> &[String] {
        let len = self.ranking_tokens.len().min(MAX_STORED_TOKENS);
        &self.ranking_tokens[..len]
    }
}

/// Tags and weighted tokens derived from a query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTerms {
    pub tags: Vec<String>,
    pub tokens: Vec<String>,
}

/// Quality metrics over a batch of tagged segments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagAnalysis {
    pub total_segments: usize,
    pub avg_tags_per_segment: f64,
    pub segments_with_tags: usize,
    /// Percentage (0-100) of segments carrying at least one tag.
    pub tag_coverage_pct: f64,
    pub tag_distribution: BTreeMap<String, usize>,
    pub most_common_tags: Vec<(String, usize)>,
    /// First distinct example matches per tag across the batch.
    pub tag_examples: BTreeMap<String, Vec<String>>,
    /// Sum of full weighted token list lengths.
    pub total_tokens: usize,
    /// Per-segment top terms summed over the batch.
    pub top_terms: Vec<(String, usize)>,
    /// First distinct declaration names across the batch.
    pub sample_names: Vec<String>,
}

/// Compiled tag catalogue plus name extractors.
#[derive(Debug, Clone)]
pub struct Tagger {
    catalogue: Vec<(&'static str, Regex)>,
    name_patterns: Vec<Regex>,
}

impl Tagger {
    pub fn new() -> Result<Self> {
        let catalogue = TAG_CATALOGUE
            .iter()
            .map(|&(name, pattern)| -> Result<_> {
                let re = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .multi_line(true)
                    .build()?;
                Ok((name, re))
            })
            .collect::<Result<Vec<_>>>()?;

        let name_patterns = NAME_PATTERNS
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .multi_line(true)
                    .build()
                    .map_err(Into::into)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            catalogue,
            name_patterns,
        })
    }

    /// Tags whose pattern occurs anywhere in `text`, in catalogue order.
    pub fn detect_tags(&self, text: &str) -> Vec<String> {
        self.catalogue
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(name, _)| (*name).to_string())
            .collect()
    }

    /// Triggered tags with their first distinct example matches.
    pub fn pattern_matches(&self, text: &str) -> BTreeMap<String, Vec<String>> {
        let mut matches = BTreeMap::new();
        for (name, re) in &self.catalogue {
            let mut seen = HashSet::new();
            let examples: Vec<String> = re
                .find_iter(text)
                .map(|m| m.as_str())
                .filter(|m| seen.insert(*m))
                .take(MAX_EXAMPLE_MATCHES)
                .map(str::to_string)
                .collect();
            if !examples.is_empty() {
                matches.insert((*name).to_string(), examples);
            }
        }
        matches
    }

    /// Declaration names in pattern order, then source order.
    pub fn extract_names(&self, text: &str) -> Vec<String> {
        self.name_patterns
            .iter()
            .flat_map(|re| {
                re.captures_iter(text)
                    .filter_map(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string())
            })
            .collect()
    }

    /// Base tokens, then names ×[`NAME_TOKEN_WEIGHT`], then tag words
    /// ×[`TAG_TOKEN_WEIGHT`].
    pub fn weighted_tokens(
        &self,
        content: &str,
        tags: &[String],
        names: &[String],
    ) -> Vec<String> {
        let mut tokens = tokenize(content);

        for name in names {
            let lower = name.to_lowercase();
            tokens.extend(std::iter::repeat_n(lower, NAME_TOKEN_WEIGHT));
        }

        append_tag_words(&mut tokens, tags);
        tokens
    }

    /// The full weighted token list of `content` carrying `tags`.
    ///
    /// Names are re-extracted, so stored content and tags are enough to
    /// rebuild what [`Self::tag`] produced.
    pub fn ranking_tokens(&self, content: &str, tags: &[String]) -> Vec<String> {
        let names = self.extract_names(content);
        self.weighted_tokens(content, tags, &names)
    }

    /// Tag one segment.
    pub fn tag(&self, segment: Segment) -> TaggedSegment {
        let pattern_matches = self.pattern_matches(&segment.content);
        let tags: Vec<String> = self
            .catalogue
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| pattern_matches.contains_key(*name))
            .map(str::to_string)
            .collect();

        let mut names = self.extract_names(&segment.content);
        let ranking_tokens =
            self.weighted_tokens(&segment.content, &tags, &names);
        let token_stats = TokenStats::from_tokens(&ranking_tokens);
        names.truncate(MAX_STORED_NAMES);

        TaggedSegment {
            segment,
            tags,
            pattern_matches,
            names,
            ranking_tokens,
            token_stats,
        }
    }

    /// Tag a batch of segments in parallel, preserving order.
    pub fn tag_all(&self, segments: Vec<Segment>) -> Vec<TaggedSegment> {
        segments.into_par_iter().map(|s| self.tag(s)).collect()
    }

    /// Tags and weighted tokens for a query.
    ///
    /// Uses the same catalogue and tag weight as [`Self::tag`], so a tag word
    /// counts [`TAG_TOKEN_WEIGHT`] times on both sides.
    ///
    /// # Examples
    ///
    /// ```
    /// use libscope::tagger::Tagger;
    ///
    /// let tagger = Tagger::new().unwrap();
    /// let terms = tagger.query("useEffect cleanup");
    /// assert!(terms.tags.contains(&"effects".to_string()));
    /// assert_eq!(terms.tokens.iter().filter(|t| *t == "effects").count(), 3);
    /// ```
    pub fn query(&self, query: &str) -> QueryTerms {
        let tags = self.detect_tags(query);
        let mut tokens = tokenize(query);
        append_tag_words(&mut tokens, &tags);
        QueryTerms { tags, tokens }
    }
}

fn top_by_count(
    counts: impl Iterator<Item = (String, usize)>,
    n: usize,
) -> Vec<(String, usize)> {
    let mut top: Vec<(String, usize)> = counts.collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top.truncate(n);
    top
}

fn append_tag_words(tokens: &mut Vec<String>, tags: &[String]) {
    for tag in tags {
        let words: Vec<&str> = tag_words(tag).collect();
        for _ in 0..TAG_TOKEN_WEIGHT {
            tokens.extend(words.iter().map(|w| (*w).to_string()));
        }
    }
}

/// Summarize tag coverage over a batch of tagged segments.
pub fn analyze(tagged: &[TaggedSegment]) -> TagAnalysis {
    let total = tagged.len();
    let mut distribution: BTreeMap<String, usize> = BTreeMap::new();
    let mut examples: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut terms: HashMap<&str, usize> = HashMap::new();
    let mut names: Vec<String> = Vec::new();
    let mut tag_total = 0;
    let mut with_tags = 0;
    let mut total_tokens = 0;

    for t in tagged {
        tag_total += t.tags.len();
        if !t.tags.is_empty() {
            with_tags += 1;
        }
        for tag in &t.tags {
            *distribution.entry(tag.clone()).or_default() += 1;
        }
        for (tag, matches) in &t.pattern_matches {
            let kept = examples.entry(tag.clone()).or_default();
            for m in matches {
                if kept.len() < MAX_EXAMPLE_MATCHES && !kept.contains(m) {
                    kept.push(m.clone());
                }
            }
        }
        total_tokens += t.token_stats.total;
        for (term, count) in &t.token_stats.top_terms {
            *terms.entry(term.as_str()).or_default() += count;
        }
        for name in &t.names {
            if names.len() < SAMPLE_NAMES && !names.contains(name) {
                names.push(name.clone());
            }
        }
    }

    let most_common = top_by_count(
        distribution.iter().map(|(tag, count)| (tag.clone(), *count)),
        MOST_COMMON_TAGS,
    );
    let top_terms = top_by_count(
        terms.into_iter().map(|(term, count)| (term.to_string(), count)),
        TOP_TERMS,
    );

    let (avg, coverage) = if total == 0 {
        (0.0, 0.0)
    } else {
        (
            tag_total as f64 / total as f64,
            with_tags as f64 / total as f64 * 100.0,
        )
    };

    TagAnalysis {
        total_segments: total,
        avg_tags_per_segment: avg,
        segments_with_tags: with_tags,
        tag_coverage_pct: coverage,
        tag_distribution: distribution,
        most_common_tags: most_common,
        tag_examples: examples,
        total_tokens,
        top_terms,
        sample_names: names,
    }
}
