//! Stale-index diagnostics.
//!
//! A corpus is stale when its source dump was modified after the store was
//! last written, or when the store holds no segments for it. The check is
//! advisory: it never blocks indexing or search.

use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use serde::Serialize;
use tracing::warn;

use crate::{error::Result, segment_db::SegmentDb};

/// A corpus and the dump it is indexed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub corpus: String,
    pub path: PathBuf,
}

impl SourceFile {
    /// Use the file stem as the corpus name (`react.txt` → `react`).
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let corpus = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { corpus, path }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    SourceModified,
    NotIndexed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleCorpus {
    pub corpus: String,
    pub reason: StaleReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FreshnessReport {
    pub fresh: Vec<String>,
    pub stale: Vec<StaleCorpus>,
    /// Corpora whose source file could not be read.
    pub missing: Vec<String>,
}

impl FreshnessReport {
    pub fn is_fresh(&self) -> bool {
        self.stale.is_empty() && self.missing.is_empty()
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Compare each source file against the store at `store_path`.
pub fn check_freshness(
    db: &SegmentDb,
    store_path: &Path,
    sources: &[SourceFile],
) -> Result<FreshnessReport> {
    let store_mtime = modified(store_path);
    let mut report = FreshnessReport::default();

    for source in sources {
        let Some(source_mtime) = modified(&source.path) else {
            warn!(corpus = %source.corpus, path = %source.path.display(), "source file missing");
            report.missing.push(source.corpus.clone());
            continue;
        };

        let indexed = db.corpus_stats(&source.corpus)?.segment_count > 0;
        let reason = if !indexed {
            Some(StaleReason::NotIndexed)
        } else if store_mtime.is_none_or(|store| source_mtime > store) {
            Some(StaleReason::SourceModified)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                warn!(corpus = %source.corpus, ?reason, "corpus index is stale");
                report.stale.push(StaleCorpus {
                    corpus: source.corpus.clone(),
                    reason,
                });
            }
            None => report.fresh.push(source.corpus.clone()),
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::{fs::File, time::Duration};

    use super::*;
    use crate::segment_db::NewSegment;

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    fn one_segment() -> NewSegment {
        NewSegment {
            source_path: "react.txt".to_string(),
            content: "useState".to_string(),
            start_line: 1,
            end_line: 1,
            segment_type: "code".to_string(),
            token_count: 1,
            tags: vec![],
            ranking_tokens: vec!["usestate".to_string()],
        }
    }

    #[test]
    fn corpus_name_is_file_stem() {
        let source = SourceFile::from_path("/dumps/react.txt");
        assert_eq!(source.corpus, "react");
        assert_eq!(source.path, PathBuf::from("/dumps/react.txt"));
    }

    #[test]
    fn classifies_sources() {
        let tmp = tempfile::tempdir().unwrap();
        let store = tmp.path().join("segments.redb");
        let db = SegmentDb::open(&store).unwrap();
        db.insert_segments("react", &[one_segment()]).unwrap();
        db.insert_segments("vue", &[one_segment()]).unwrap();

        let react = tmp.path().join("react.txt");
        let vue = tmp.path().join("vue.txt");
        let svelte = tmp.path().join("svelte.txt");
        for path in [&react, &vue, &svelte] {
            std::fs::write(path, "x").unwrap();
        }

        let store_mtime = modified(&store).unwrap();
        set_mtime(&react, store_mtime - Duration::from_secs(60));
        set_mtime(&vue, store_mtime + Duration::from_secs(60));

        let sources = [
            SourceFile::from_path(&react),
            SourceFile::from_path(&vue),
            SourceFile::from_path(&svelte),
            SourceFile::from_path(tmp.path().join("angular.txt")),
        ];
        let report = check_freshness(&db, &store, &sources).unwrap();

        assert_eq!(report.fresh, vec!["react"]);
        assert_eq!(
            report.stale,
            vec![
                StaleCorpus {
                    corpus: "vue".to_string(),
                    reason: StaleReason::SourceModified,
                },
                StaleCorpus {
                    corpus: "svelte".to_string(),
                    reason: StaleReason::NotIndexed,
                },
            ]
        );
        assert_eq!(report.missing, vec!["angular"]);
        assert!(!report.is_fresh());
    }

    #[test]
    fn nothing_to_check_is_fresh() {
        let tmp = tempfile::tempdir().unwrap();
        let store = tmp.path().join("segments.redb");
        let db = SegmentDb::open(&store).unwrap();

        let report = check_freshness(&db, &store, &[]).unwrap();
        assert!(report.is_fresh());
    }
}
