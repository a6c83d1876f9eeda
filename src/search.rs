//! Tag-boosted BM25 search over stored corpora.
//!
//! A query is tagged and tokenized with the same [`Tagger`] used at index
//! time, scored against a per-corpus [`Bm25Index`], boosted by
//! `1 + 0.2 × |query tags ∩ segment tags|`, sorted, filtered to positive
//! scores and cut to the requested limit.

use std::{
    collections::{HashMap, hash_map::Entry},
    path::Path,
    time::Instant,
};

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::{
    bm25::Bm25Index,
    chunking::Segmenter,
    error::Result,
    ingestion::{self, IndexOutcome},
    segment_db::{
        CorpusStats,
        CorpusSummary,
        SegmentDb,
        SegmentRecord,
        StoreStats,
    },
    tagger::{QueryTerms, Tagger},
    text_util::preview,
};

/// Boost added per tag shared between query and segment.
pub const TAG_BOOST_PER_MATCH: f64 = 0.2;

/// Searches slower than this are reported as slow.
pub const SLOW_SEARCH_MS: f64 = 500.0;

/// One ranked segment. Carries a preview, never the full content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: u64,
    pub source_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub tags: Vec<String>,
    /// Query tags this segment also carries.
    pub matching_tags: Vec<String>,
    pub score: f64,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub corpus: String,
    pub query_tags: Vec<String>,
    pub results: Vec<SearchResult>,
    pub total_results: usize,
    pub search_time_ms: f64,
}

impl SearchResponse {
    pub fn is_slow(&self) -> bool {
        self.search_time_ms > SLOW_SEARCH_MS
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CorpusResults {
    pub corpus: String,
    pub query_tags: Vec<String>,
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchAllResponse {
    pub query: String,
    pub corpora_searched: Vec<String>,
    /// Only corpora that produced at least one result.
    pub results_by_corpus: Vec<CorpusResults>,
    pub total_results: usize,
}

/// Loaded segments of one corpus and the ranking index built over them.
#[derive(Debug)]
pub struct CorpusEntry {
    segments: Vec<SegmentRecord>,
    index: Bm25Index,
}

impl CorpusEntry {
    /// Index each segment's full weighted token list.
    ///
    /// Stored token lists are capped, so the list is rebuilt from content and
    /// stored tags. Unreadable tags degrade to content and names only.
    pub fn build(segments: Vec<SegmentRecord>, tagger: &Tagger) -> Self {
        let docs: Vec<Vec<String>> = segments
            .par_iter()
            .map(|s| tagger.ranking_tokens(&s.content, &s.tags))
            .collect();
        let index = Bm25Index::build(&docs);
        Self { segments, index }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Per-corpus ranking indexes, built lazily and reused across queries.
#[derive(Debug, Default)]
pub struct CorpusCache {
    entries: HashMap<String, CorpusEntry>,
}

impl CorpusCache {
    pub fn contains(&self, corpus: &str) -> bool {
        self.entries.contains_key(corpus)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop the cached entry for `corpus`. Returns whether one existed.
    pub fn invalidate(&mut self, corpus: &str) -> bool {
        self.entries.remove(corpus).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn get_or_build(
        &mut self,
        corpus: &str,
        tagger: &Tagger,
        load: impl FnOnce() -> Result<Vec<SegmentRecord>>,
    ) -> Result<&CorpusEntry> {
        match self.entries.entry(corpus.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let start = Instant::now();
                let built = CorpusEntry::build(load()?, tagger);
                debug!(
                    corpus,
                    segments = built.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "built ranking index"
                );
                Ok(entry.insert(built))
            }
        }
    }
}

/// Score, boost, sort and cut one corpus against a processed query.
pub fn rank(
    entry: &CorpusEntry,
    terms: &QueryTerms,
    limit: usize,
) -> Vec<SearchResult> {
    let scores = entry.index.scores(&terms.tokens);

    let mut scored: Vec<(usize, f64, Vec<String>)> = entry
        .segments
        .iter()
        .zip(scores)
        .enumerate()
        .map(|(i, (segment, score))| {
            let matching: Vec<String> = segment
                .tags
                .iter()
                .filter(|t| terms.tags.contains(t))
                .cloned()
                .collect();
            let boost = 1.0 + TAG_BOOST_PER_MATCH * matching.len() as f64;
            (i, score * boost, matching)
        })
        .collect();

    // Stable: equal scores keep id order.
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    scored
        .into_iter()
        .filter(|(_, score, _)| *score > 0.0)
        .take(limit)
        .map(|(i, score, matching_tags)| {
            let segment = &entry.segments[i];
            SearchResult {
                id: segment.id,
                source_path: segment.source_path.clone(),
                start_line: segment.start_line,
                end_line: segment.end_line,
                tags: segment.tags.clone(),
                matching_tags,
                score,
                snippet: preview(&segment.content),
            }
        })
        .collect()
}

/// The search engine: owns the store, the tagger and the corpus cache.
///
/// Dropping the engine closes the store.
#[derive(Debug)]
pub struct SearchEngine {
    db: SegmentDb,
    segmenter: Segmenter,
    tagger: Tagger,
    cache: CorpusCache,
}

impl SearchEngine {
    /// Open the store at `path` and build an engine over it.
    pub fn open(path: &Path) -> Result<Self> {
        Self::new(SegmentDb::open(path)?)
    }

    pub fn new(db: SegmentDb) -> Result<Self> {
        Ok(Self {
            db,
            segmenter: Segmenter::new()?,
            tagger: Tagger::new()?,
            cache: CorpusCache::default(),
        })
    }

    pub fn db(&self) -> &SegmentDb {
        &self.db
    }

    pub fn tagger(&self) -> &Tagger {
        &self.tagger
    }

    pub fn cache(&self) -> &CorpusCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut CorpusCache {
        &mut self.cache
    }

    /// Rank the segments of `corpus` against `query`.
    ///
    /// An unknown or empty corpus yields an empty response.
    pub fn search(
        &mut self,
        query: &str,
        corpus: &str,
        limit: usize,
    ) -> Result<SearchResponse> {
        let start = Instant::now();

        let terms = self.tagger.query(query);
        let db = &self.db;
        let entry = self.cache.get_or_build(corpus, &self.tagger, || {
            db.load_corpus(corpus)
        })?;
        let results = rank(entry, &terms, limit);

        let search_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!(
            corpus,
            query,
            results = results.len(),
            search_time_ms,
            "search finished"
        );

        Ok(SearchResponse {
            query: query.to_string(),
            corpus: corpus.to_string(),
            query_tags: terms.tags,
            total_results: results.len(),
            results,
            search_time_ms,
        })
    }

    /// Search every stored corpus independently.
    ///
    /// Scores are not normalized across corpora.
    pub fn search_all(
        &mut self,
        query: &str,
        limit_per_corpus: usize,
    ) -> Result<SearchAllResponse> {
        let corpora: Vec<String> = self
            .db
            .list_corpora()?
            .into_iter()
            .map(|c| c.name)
            .collect();

        let mut results_by_corpus = Vec::new();
        for corpus in &corpora {
            let response = self.search(query, corpus, limit_per_corpus)?;
            if !response.results.is_empty() {
                results_by_corpus.push(CorpusResults {
                    corpus: response.corpus,
                    query_tags: response.query_tags,
                    results: response.results,
                });
            }
        }

        let total_results =
            results_by_corpus.iter().map(|c| c.results.len()).sum();

        Ok(SearchAllResponse {
            query: query.to_string(),
            corpora_searched: corpora,
            results_by_corpus,
            total_results,
        })
    }

    pub fn get_segment_content(&self, id: u64) -> Result<Option<String>> {
        self.db.segment_content(id)
    }

    pub fn get_segment(&self, id: u64) -> Result<Option<SegmentRecord>> {
        self.db.get_segment(id)
    }

    pub fn list_corpora(&self) -> Result<Vec<CorpusSummary>> {
        self.db.list_corpora()
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.db.stats()
    }

    pub fn corpus_stats(&self, corpus: &str) -> Result<CorpusStats> {
        self.db.corpus_stats(corpus)
    }

    /// Segment, tag and store `raw_text` as `corpus`, replacing any prior
    /// segments. Invalidates the cached index for `corpus`.
    pub fn index_corpus(
        &mut self,
        corpus: &str,
        source_path: &str,
        raw_text: &str,
    ) -> IndexOutcome {
        let outcome = ingestion::index_corpus(
            &self.db,
            &self.segmenter,
            &self.tagger,
            corpus,
            source_path,
            raw_text,
        );
        self.cache.invalidate(corpus);
        outcome
    }

    /// Read `path` and index it as `corpus`.
    pub fn index_file(&mut self, corpus: &str, path: &Path) -> IndexOutcome {
        let outcome = ingestion::index_file(
            &self.db,
            &self.segmenter,
            &self.tagger,
            corpus,
            path,
        );
        self.cache.invalidate(corpus);
        outcome
    }

    /// Delete every segment of `corpus`.
    pub fn remove_corpus(&mut self, corpus: &str) -> bool {
        let removed = ingestion::remove_corpus(&self.db, corpus);
        self.cache.invalidate(corpus);
        removed
    }
}

/// Format a single-corpus response for terminal output.
pub fn format_human(response: &SearchResponse) {
    if response.results.is_empty() {
        println!("No results found.");
        return;
    }

    if !response.query_tags.is_empty() {
        println!("query tags: {}\n", response.query_tags.join(", "));
    }
    print_results(&response.results);
    println!(
        "\n{} result(s) in {:.1}ms",
        response.total_results, response.search_time_ms
    );
}

/// Format a multi-corpus response for terminal output.
pub fn format_all_human(response: &SearchAllResponse) {
    if response.results_by_corpus.is_empty() {
        println!(
            "No results found in {} corpora.",
            response.corpora_searched.len()
        );
        return;
    }

    for group in &response.results_by_corpus {
        println!("== {} ==", group.corpus);
        print_results(&group.results);
        println!();
    }
    println!(
        "{} result(s) across {} corpora",
        response.total_results,
        response.corpora_searched.len()
    );
}

fn print_results(results: &[SearchResult]) {
    for (rank, r) in results.iter().enumerate() {
        println!(
            "{:>3}. [{:.3}] {}:{}-{} #{}",
            rank + 1,
            r.score,
            r.source_path,
            r.start_line,
            r.end_line,
            r.id
        );
        if !r.tags.is_empty() {
            println!("     tags: {}", r.tags.join(", "));
        }
        println!("     {}", r.snippet);
    }
}

/// Print any serializable value as pretty JSON.
pub fn format_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
