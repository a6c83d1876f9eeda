//! libscope - tag-boosted BM25 search over flattened library source dumps.
//!
//! libscope splits large source dumps into overlapping, boundary-aware line
//! segments, tags each segment with code concepts (hooks, async, error
//! handling, ...) and ranks segments against a query with BM25 boosted by
//! shared tags. Segments live in a [redb](https://github.com/cberner/redb)
//! store; ranking indexes are rebuilt in memory per corpus.
//!
//! # Quick start
//!
//! ```no_run
//! use libscope::{DataDir, SearchEngine};
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let mut engine = SearchEngine::open(&data_dir.segments_db()).unwrap();
//!
//! let outcome = engine.index_file("react", "react.txt".as_ref());
//! assert!(outcome.success);
//!
//! let response = engine.search("useEffect cleanup", "react", 5).unwrap();
//! for r in &response.results {
//!     println!("#{} {:.3} {}:{}", r.id, r.score, r.source_path, r.start_line);
//! }
//! ```

pub mod bm25;
pub mod chunking;
pub mod cli;
pub mod data_dir;
pub mod error;
pub mod freshness;
pub mod ingestion;
pub mod mcp;
pub mod search;
pub mod segment_db;
pub mod tagger;
pub mod text_util;

pub use chunking::{Segment, Segmenter};
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use ingestion::{IndexOutcome, IndexReport};
pub use search::{SearchEngine, SearchResponse, SearchResult};
pub use segment_db::{SegmentDb, SegmentRecord};
pub use tagger::{TaggedSegment, Tagger};
