use std::{collections::BTreeMap, fmt::Display, path::Path, time::Instant};

use serde::Serialize;
use tracing::{error, info};

use crate::{
    chunking::Segmenter,
    error::Result,
    segment_db::{NewSegment, SegmentDb},
    tagger::{self, TaggedSegment, Tagger},
};

/// Metrics of one successful indexing run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexReport {
    pub corpus: String,
    pub source_path: String,
    pub line_count: usize,
    pub byte_size: usize,
    pub segment_count: usize,
    pub avg_tags_per_segment: f64,
    pub tag_coverage_pct: f64,
    pub tag_distribution: BTreeMap<String, usize>,
    /// First distinct matches per tag, across segments.
    pub tag_examples: BTreeMap<String, Vec<String>>,
    pub top_terms: Vec<(String, usize)>,
    pub sample_names: Vec<String>,
    pub process_time_secs: f64,
    pub segments_per_second: f64,
}

/// Result of an indexing run. Failures are reported, not raised.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexOutcome {
    pub success: bool,
    pub report: Option<IndexReport>,
    pub error: Option<String>,
}

impl IndexOutcome {
    fn succeeded(report: IndexReport) -> Self {
        Self {
            success: true,
            report: Some(report),
            error: None,
        }
    }

    fn failed(err: impl Display) -> Self {
        Self {
            success: false,
            report: None,
            error: Some(err.to_string()),
        }
    }
}

/// Segment and tag `raw_text` without touching the store.
///
/// Tagging is a pure function per segment and runs in parallel.
pub fn prepare(
    segmenter: &Segmenter,
    tagger: &Tagger,
    source_path: &str,
    raw_text: &str,
) -> Vec<TaggedSegment> {
    let segments = segmenter.segment(raw_text, source_path);
    tagger.tag_all(segments)
}

/// Index `raw_text` as `corpus`, replacing every prior segment of it.
///
/// The old segments are removed and the new ones inserted in a single write
/// transaction, so a failure leaves the previous corpus intact.
pub fn index_corpus(
    db: &SegmentDb,
    segmenter: &Segmenter,
    tagger: &Tagger,
    corpus: &str,
    source_path: &str,
    raw_text: &str,
) -> IndexOutcome {
    match try_index(db, segmenter, tagger, corpus, source_path, raw_text) {
        Ok(report) => {
            info!(
                corpus,
                segments = report.segment_count,
                lines = report.line_count,
                coverage_pct = report.tag_coverage_pct,
                secs = report.process_time_secs,
                "indexed corpus"
            );
            IndexOutcome::succeeded(report)
        }
        Err(e) => {
            error!(corpus, error = %e, "indexing failed");
            IndexOutcome::failed(e)
        }
    }
}

fn try_index(
    db: &SegmentDb,
    segmenter: &Segmenter,
    tagger: &Tagger,
    corpus: &str,
    source_path: &str,
    raw_text: &str,
) -> Result<IndexReport> {
    let start = Instant::now();

    let tagged = prepare(segmenter, tagger, source_path, raw_text);
    let analysis = tagger::analyze(&tagged);
    let rows: Vec<NewSegment> = tagged.iter().map(NewSegment::from).collect();
    db.replace_corpus(corpus, &rows)?;

    let secs = start.elapsed().as_secs_f64();
    Ok(IndexReport {
        corpus: corpus.to_string(),
        source_path: source_path.to_string(),
        // Same line split as the segmenter, so it matches the last end_line.
        line_count: raw_text.split('\n').count(),
        byte_size: raw_text.len(),
        segment_count: rows.len(),
        avg_tags_per_segment: analysis.avg_tags_per_segment,
        tag_coverage_pct: analysis.tag_coverage_pct,
        tag_distribution: analysis.tag_distribution,
        tag_examples: analysis.tag_examples,
        top_terms: analysis.top_terms,
        sample_names: analysis.sample_names,
        process_time_secs: secs,
        segments_per_second: if secs > 0.0 {
            rows.len() as f64 / secs
        } else {
            0.0
        },
    })
}

/// Read `path` and index its contents as `corpus`.
pub fn index_file(
    db: &SegmentDb,
    segmenter: &Segmenter,
    tagger: &Tagger,
    corpus: &str,
    path: &Path,
) -> IndexOutcome {
    let raw_text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            error!(corpus, path = %path.display(), error = %e, "cannot read source");
            return IndexOutcome::failed(format!(
                "cannot read {}: {e}",
                path.display()
            ));
        }
    };
    let source_path = path.to_string_lossy();
    index_corpus(db, segmenter, tagger, corpus, &source_path, &raw_text)
}

/// Delete every segment of `corpus`. Removing an absent corpus succeeds.
pub fn remove_corpus(db: &SegmentDb, corpus: &str) -> bool {
    match db.clear_corpus(corpus) {
        Ok(removed) => {
            info!(corpus, removed, "removed corpus");
            true
        }
        Err(e) => {
            error!(corpus, error = %e, "failed to remove corpus");
            false
        }
    }
}

/// Print an indexing outcome for terminal output.
pub fn format_outcome(outcome: &IndexOutcome) {
    match (&outcome.report, &outcome.error) {
        (Some(r), _) => {
            println!(
                "Indexed {} from {}: {} segments from {} lines ({} bytes) in {:.2}s",
                r.corpus,
                r.source_path,
                r.segment_count,
                r.line_count,
                r.byte_size,
                r.process_time_secs
            );
            println!(
                "  {:.1} tags/segment, {:.1}% tagged",
                r.avg_tags_per_segment, r.tag_coverage_pct
            );
            for (tag, count) in &r.tag_distribution {
                let examples = r
                    .tag_examples
                    .get(tag)
                    .map(|e| e.join(", "))
                    .unwrap_or_default();
                println!("  {tag:<18} {count:>5}  {examples}");
            }
            if !r.sample_names.is_empty() {
                println!("  names: {}", r.sample_names.join(", "));
            }
            if !r.top_terms.is_empty() {
                let terms: Vec<String> = r
                    .top_terms
                    .iter()
                    .map(|(term, count)| format!("{term}({count})"))
                    .collect();
                println!("  top terms: {}", terms.join(" "));
            }
        }
        (None, Some(e)) => eprintln!("Indexing failed: {e}"),
        (None, None) => eprintln!("Indexing failed"),
    }
}
