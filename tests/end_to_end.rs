use libscope::{SearchEngine, freshness};

fn filler(range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| format!("  total += {i};")).collect()
}

/// A dump with a hooks module, an error-handling module and plain filler,
/// large enough to span several segments.
fn library_dump() -> String {
    let mut lines = filler(0..200);
    lines.extend(
        [
            "export function useUserData(id) {",
            "  const [data, setData] = useState(null);",
            "  useEffect(() => {",
            "    fetch(`/api/users/${id}`).then((r) => r.json()).then(setData);",
            "  }, [id]);",
            "  return data;",
            "}",
        ]
        .map(str::to_string),
    );
    lines.extend(filler(207..500));
    lines.extend(
        [
            "export async function save(record) {",
            "  try {",
            "    await db.put(record);",
            "  } catch (err) {",
            "    throw new Error(`save failed: ${err}`);",
            "  }",
            "}",
        ]
        .map(str::to_string),
    );
    lines.extend(filler(507..800));
    lines.join("\n")
}

fn open_engine() -> (tempfile::TempDir, SearchEngine) {
    let tmp = tempfile::tempdir().unwrap();
    let engine = SearchEngine::open(&tmp.path().join("segments.redb")).unwrap();
    (tmp, engine)
}

#[test]
fn hook_query_prefers_hook_segment() {
    let (_tmp, mut engine) = open_engine();
    let outcome = engine.index_corpus("react", "react.txt", &library_dump());
    assert!(outcome.success);
    assert!(outcome.report.unwrap().segment_count >= 3);

    let response = engine.search("useEffect data fetching", "react", 5).unwrap();
    let top = &response.results[0];
    assert!(top.start_line <= 203 && 203 <= top.end_line);
    assert!(top.tags.contains(&"react_hooks".to_string()));
    assert!(top.matching_tags.contains(&"effects".to_string()));

    let response = engine.search("try catch error", "react", 5).unwrap();
    let top = &response.results[0];
    assert!(top.start_line <= 502 && 502 <= top.end_line);
    assert!(top.tags.contains(&"error_handling".to_string()));
}

#[test]
fn short_snippet_scenario() {
    let (_tmp, mut engine) = open_engine();
    let snippet = "\
import { useState } from 'react';

export function Search() {
  const [query, setQuery] = useState('');
  async function submit() {
    const res = await fetch('/search?q=' + query);
    return res.json();
  }
  return submit;
}";
    assert_eq!(snippet.lines().count(), 10);
    engine.index_corpus("snippet", "snippet.js", snippet);

    let response = engine.search("useState hook", "snippet", 5).unwrap();
    assert!(response.query_tags.contains(&"react_hooks".to_string()));
    assert_eq!(response.total_results, 1);
    let hit = &response.results[0];
    assert_eq!((hit.start_line, hit.end_line), (1, 10));
    assert!(hit.matching_tags.contains(&"react_hooks".to_string()));
    assert!(hit.tags.contains(&"async_ops".to_string()));
}

#[test]
fn scores_are_non_increasing() {
    let (_tmp, mut engine) = open_engine();
    engine.index_corpus("react", "react.txt", &library_dump());

    let five = engine.search("async fetch total", "react", 5).unwrap();
    let ten = engine.search("async fetch total", "react", 10).unwrap();

    for pair in ten.results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert_eq!(five.results[..], ten.results[..five.results.len()]);
}

#[test]
fn segments_cover_the_dump() {
    let (_tmp, mut engine) = open_engine();
    engine.index_corpus("react", "react.txt", &library_dump());

    let records = engine.db().load_corpus("react").unwrap();
    assert_eq!(records[0].start_line, 1);
    assert_eq!(records.last().unwrap().end_line, 800);
    for pair in records.windows(2) {
        assert!(pair[1].start_line <= pair[0].end_line + 1);
        assert!(pair[1].start_line > pair[0].start_line);
    }
}

#[test]
fn reindexing_same_dump_gives_same_results() {
    let (_tmp, mut engine) = open_engine();
    let dump = library_dump();

    let a = engine.index_corpus("react", "react.txt", &dump).report.unwrap();
    let first = engine.search("useState hooks", "react", 10).unwrap();
    let b = engine.index_corpus("react", "react.txt", &dump).report.unwrap();
    let second = engine.search("useState hooks", "react", 10).unwrap();

    assert_eq!(a.segment_count, b.segment_count);
    assert_eq!(a.tag_coverage_pct, b.tag_coverage_pct);
    assert_eq!(a.tag_distribution, b.tag_distribution);

    let ranges = |r: &libscope::SearchResponse| {
        r.results
            .iter()
            .map(|x| (x.start_line, x.end_line, x.snippet.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(ranges(&first), ranges(&second));
    assert_eq!(first.query_tags, second.query_tags);

    let stats = engine.stats().unwrap();
    assert_eq!(stats.total_corpora, 1);
    assert_eq!(
        stats.total_segments as usize,
        engine.corpus_stats("react").unwrap().segment_count
    );
}

#[test]
fn empty_store_behaves() {
    let (tmp, mut engine) = open_engine();

    assert!(engine.list_corpora().unwrap().is_empty());
    assert_eq!(engine.search("anything", "nope", 5).unwrap().total_results, 0);
    assert_eq!(engine.search_all("anything", 3).unwrap().total_results, 0);
    assert!(engine.get_segment_content(1).unwrap().is_none());

    let report = freshness::check_freshness(
        engine.db(),
        &tmp.path().join("segments.redb"),
        &[],
    )
    .unwrap();
    assert!(report.is_fresh());
}
