use std::path::Path;

use redb::{
    Database,
    MultimapTableDefinition,
    ReadableDatabase,
    ReadableMultimapTable,
    ReadableTable,
    ReadableTableMetadata,
    TableDefinition,
    WriteTransaction,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::Result,
    tagger::{TAG_CATALOGUE, TaggedSegment},
};

const SEGMENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("segments");
const CORPUS_SEGMENTS: MultimapTableDefinition<&str, u64> =
    MultimapTableDefinition::new("corpus_segments");
const TAG_SEGMENTS: MultimapTableDefinition<&str, u64> =
    MultimapTableDefinition::new("tag_segments");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_SEGMENT_ID: &str = "next_segment_id";

/// On-disk layout of a segment. Tags and tokens are nested JSON strings.
#[derive(Serialize, Deserialize)]
struct StoredSegment {
    corpus: String,
    source_path: String,
    content: String,
    tags: String,
    ranking_tokens: String,
    start_line: usize,
    end_line: usize,
    segment_type: String,
    token_count: usize,
}

/// A segment ready to be written; the store assigns its id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSegment {
    pub source_path: String,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub segment_type: String,
    pub token_count: usize,
    pub tags: Vec<String>,
    pub ranking_tokens: Vec<String>,
}

impl From<&TaggedSegment> for NewSegment {
    fn from(tagged: &TaggedSegment) -> Self {
        let segment = &tagged.segment;
        Self {
            source_path: segment.source_path.clone(),
            content: segment.content.clone(),
            start_line: segment.start_line,
            end_line: segment.end_line,
            segment_type: segment.segment_type.to_string(),
            token_count: segment.token_count,
            tags: tagged.tags.clone(),
            ranking_tokens: tagged.stored_tokens().to_vec(),
        }
    }
}

/// A segment as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentRecord {
    pub id: u64,
    pub corpus: String,
    pub source_path: String,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub tags: Vec<String>,
    #[serde(skip)]
    pub ranking_tokens: Vec<String>,
    pub segment_type: String,
    pub token_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorpusSummary {
    pub name: String,
    pub segment_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CorpusStats {
    pub segment_count: usize,
    /// Sum of per-segment word counts.
    pub total_tokens: usize,
    pub total_tags: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub total_segments: u64,
    pub total_corpora: usize,
    pub average_segment_chars: f64,
}

fn encode(corpus: &str, segment: &NewSegment) -> Result<Vec<u8>> {
    let stored = StoredSegment {
        corpus: corpus.to_string(),
        source_path: segment.source_path.clone(),
        content: segment.content.clone(),
        tags: serde_json::to_string(&segment.tags)?,
        ranking_tokens: serde_json::to_string(&segment.ranking_tokens)?,
        start_line: segment.start_line,
        end_line: segment.end_line,
        segment_type: segment.segment_type.clone(),
        token_count: segment.token_count,
    };
    Ok(serde_json::to_vec(&stored)?)
}

/// Decode a stored record, or `None` when the outer JSON is unreadable.
///
/// Unreadable nested tag or token lists degrade to empty lists.
fn decode(id: u64, bytes: &[u8]) -> Option<SegmentRecord> {
    let stored: StoredSegment = match serde_json::from_slice(bytes) {
        Ok(stored) => stored,
        Err(e) => {
            warn!(id, error = %e, "skipping unreadable segment record");
            return None;
        }
    };

    let tags = serde_json::from_str(&stored.tags).unwrap_or_else(|e| {
        warn!(id, error = %e, "unreadable segment tags");
        Vec::new()
    });
    let ranking_tokens =
        serde_json::from_str(&stored.ranking_tokens).unwrap_or_else(|e| {
            warn!(id, error = %e, "unreadable segment tokens");
            Vec::new()
        });

    Some(SegmentRecord {
        id,
        corpus: stored.corpus,
        source_path: stored.source_path,
        content: stored.content,
        start_line: stored.start_line,
        end_line: stored.end_line,
        tags,
        ranking_tokens,
        segment_type: stored.segment_type,
        token_count: stored.token_count,
    })
}

/// Segment store: segments keyed by id plus corpus and tag indexes.
pub struct SegmentDb {
    db: Database,
}

impl SegmentDb {
    /// Open or create a segment store at the given path.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use libscope::SegmentDb;
    ///
    /// let db = SegmentDb::open(&tmp.path().join("segments.redb")).unwrap();
    /// assert!(db.list_corpora().unwrap().is_empty());
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(SEGMENTS)?;
        txn.open_multimap_table(CORPUS_SEGMENTS)?;
        txn.open_multimap_table(TAG_SEGMENTS)?;
        txn.open_table(META)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Replace every segment of `corpus` with `segments` in one transaction.
    ///
    /// Returns the ids assigned to the new segments, in input order.
    pub fn replace_corpus(
        &self,
        corpus: &str,
        segments: &[NewSegment],
    ) -> Result<Vec<u64>> {
        let txn = self.db.begin_write()?;
        let removed = clear_in(&txn, corpus)?;
        let ids = insert_in(&txn, corpus, segments)?;
        txn.commit()?;

        debug!(
            corpus,
            removed,
            inserted = ids.len(),
            "replaced corpus segments"
        );
        Ok(ids)
    }

    /// Append segments to `corpus` in one transaction.
    pub fn insert_segments(
        &self,
        corpus: &str,
        segments: &[NewSegment],
    ) -> Result<Vec<u64>> {
        if segments.is_empty() {
            return Ok(Vec::new());
        }
        let txn = self.db.begin_write()?;
        let ids = insert_in(&txn, corpus, segments)?;
        txn.commit()?;
        Ok(ids)
    }

    /// Delete every segment of `corpus`. Returns how many were removed.
    pub fn clear_corpus(&self, corpus: &str) -> Result<usize> {
        let txn = self.db.begin_write()?;
        let removed = clear_in(&txn, corpus)?;
        txn.commit()?;
        Ok(removed)
    }

    /// All readable segments of `corpus`, ordered by id.
    pub fn load_corpus(&self, corpus: &str) -> Result<Vec<SegmentRecord>> {
        let txn = self.db.begin_read()?;
        let index = txn.open_multimap_table(CORPUS_SEGMENTS)?;
        let segments = txn.open_table(SEGMENTS)?;

        let mut records = Vec::new();
        for id in index.get(corpus)? {
            let id = id?.value();
            let Some(guard) = segments.get(id)? else {
                warn!(id, corpus, "corpus index points at a missing segment");
                continue;
            };
            if let Some(record) = decode(id, guard.value()) {
                records.push(record);
            }
        }
        Ok(records)
    }

    pub fn get_segment(&self, id: u64) -> Result<Option<SegmentRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SEGMENTS)?;
        Ok(table.get(id)?.and_then(|guard| decode(id, guard.value())))
    }

    pub fn segment_content(&self, id: u64) -> Result<Option<String>> {
        Ok(self.get_segment(id)?.map(|record| record.content))
    }

    /// Corpus names with their segment counts, sorted by name.
    pub fn list_corpora(&self) -> Result<Vec<CorpusSummary>> {
        let txn = self.db.begin_read()?;
        let index = txn.open_multimap_table(CORPUS_SEGMENTS)?;

        let mut result = Vec::new();
        for entry in index.iter()? {
            let (name, ids) = entry?;
            if ids.is_empty() {
                continue;
            }
            result.push(CorpusSummary {
                name: name.value().to_string(),
                segment_count: ids.len(),
            });
        }
        Ok(result)
    }

    /// Ids of segments carrying `tag`, across all corpora.
    pub fn segment_ids_with_tag(&self, tag: &str) -> Result<Vec<u64>> {
        let txn = self.db.begin_read()?;
        let index = txn.open_multimap_table(TAG_SEGMENTS)?;
        let mut ids = Vec::new();
        for id in index.get(tag)? {
            ids.push(id?.value());
        }
        Ok(ids)
    }

    pub fn corpus_stats(&self, corpus: &str) -> Result<CorpusStats> {
        let records = self.load_corpus(corpus)?;
        Ok(CorpusStats {
            segment_count: records.len(),
            total_tokens: records.iter().map(|r| r.token_count).sum(),
            total_tags: records.iter().map(|r| r.tags.len()).sum(),
        })
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let txn = self.db.begin_read()?;
        let segments = txn.open_table(SEGMENTS)?;
        let index = txn.open_multimap_table(CORPUS_SEGMENTS)?;

        let mut total_chars = 0usize;
        let mut readable = 0usize;
        for entry in segments.iter()? {
            let (id, value) = entry?;
            if let Some(record) = decode(id.value(), value.value()) {
                total_chars += record.content.chars().count();
                readable += 1;
            }
        }

        let mut total_corpora = 0;
        for entry in index.iter()? {
            let (_, ids) = entry?;
            if !ids.is_empty() {
                total_corpora += 1;
            }
        }

        Ok(StoreStats {
            total_segments: segments.len()?,
            total_corpora,
            average_segment_chars: if readable == 0 {
                0.0
            } else {
                total_chars as f64 / readable as f64
            },
        })
    }
}

fn clear_in(txn: &WriteTransaction, corpus: &str) -> Result<usize> {
    let mut index = txn.open_multimap_table(CORPUS_SEGMENTS)?;
    let mut segments = txn.open_table(SEGMENTS)?;
    let mut tag_index = txn.open_multimap_table(TAG_SEGMENTS)?;

    let mut ids = Vec::new();
    for id in index.remove_all(corpus)? {
        ids.push(id?.value());
    }

    for &id in &ids {
        let tags = segments
            .remove(id)?
            .and_then(|guard| decode(id, guard.value()))
            .map(|record| record.tags);
        match tags {
            Some(tags) => {
                for tag in &tags {
                    tag_index.remove(tag.as_str(), id)?;
                }
            }
            // Unreadable record: its tags are unknown.
            None => {
                for (tag, _) in TAG_CATALOGUE {
                    tag_index.remove(*tag, id)?;
                }
            }
        }
    }

    Ok(ids.len())
}

fn insert_in(
    txn: &WriteTransaction,
    corpus: &str,
    new_segments: &[NewSegment],
) -> Result<Vec<u64>> {
    let mut meta = txn.open_table(META)?;
    let mut segments = txn.open_table(SEGMENTS)?;
    let mut index = txn.open_multimap_table(CORPUS_SEGMENTS)?;
    let mut tag_index = txn.open_multimap_table(TAG_SEGMENTS)?;

    let mut next = meta.get(NEXT_SEGMENT_ID)?.map_or(1, |v| v.value());
    let mut ids = Vec::with_capacity(new_segments.len());

    for segment in new_segments {
        let id = next;
        next += 1;

        let bytes = encode(corpus, segment)?;
        segments.insert(id, bytes.as_slice())?;
        index.insert(corpus, id)?;
        for tag in &segment.tags {
            tag_index.insert(tag.as_str(), id)?;
        }
        ids.push(id);
    }

    meta.insert(NEXT_SEGMENT_ID, next)?;
    Ok(ids)
}

impl std::fmt::Debug for SegmentDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentDb").finish_non_exhaustive()
    }
}
