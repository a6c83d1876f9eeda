//! Line-based segmentation of flattened source dumps.
//!
//! Text is split into overlapping windows of [`DEFAULT_SEGMENT_LINES`] lines
//! with [`DEFAULT_OVERLAP_LINES`] lines shared between neighbours. When a
//! declaration boundary (function, class, type...) sits in the last fifth of a
//! window, the window is cut right before it so segments tend to start on a
//! natural boundary.

use std::path::Path;

use regex::Regex;

use crate::error::Result;

/// Target segment size in lines.
pub const DEFAULT_SEGMENT_LINES: usize = 300;

/// Lines shared between consecutive segments (20% of the target size).
pub const DEFAULT_OVERLAP_LINES: usize = 60;

/// Segment type recorded for segmenter output.
pub const CODE_SEGMENT: &str = "code";

/// Source language inferred from a path extension.
///
/// Only selects which boundary patterns are tried; it never changes the
/// segment size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    JavaScript,
    Jsx,
    TypeScript,
    Tsx,
    Python,
    Go,
    Rust,
    Java,
    C,
    Cpp,
    CSharp,
    Ruby,
    Php,
    Swift,
    Kotlin,
    Markdown,
    Text,
}

impl Language {
    /// Infer the language from a path's extension. Unknown extensions map to
    /// [`Language::Text`].
    ///
    /// # Examples
    ///
    /// ```
    /// use libscope::chunking::Language;
    ///
    /// assert_eq!(Language::from_path("src/app.tsx"), Language::Tsx);
    /// assert_eq!(Language::from_path("libsource-react.txt"), Language::Text);
    /// ```
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();

        match ext {
            "js" => Self::JavaScript,
            "jsx" => Self::Jsx,
            "ts" => Self::TypeScript,
            "tsx" => Self::Tsx,
            "py" => Self::Python,
            "go" => Self::Go,
            "rs" => Self::Rust,
            "java" => Self::Java,
            "c" => Self::C,
            "cpp" => Self::Cpp,
            "cs" => Self::CSharp,
            "rb" => Self::Ruby,
            "php" => Self::Php,
            "swift" => Self::Swift,
            "kt" => Self::Kotlin,
            "md" => Self::Markdown,
            _ => Self::Text,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::Jsx => "jsx",
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::Python => "python",
            Self::Go => "go",
            Self::Rust => "rust",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Swift => "swift",
            Self::Kotlin => "kotlin",
            Self::Markdown => "markdown",
            Self::Text => "text",
        }
    }
}

const JAVASCRIPT_BOUNDARIES: &[&str] = &[
    r"^(export\s+)?(async\s+)?function\s+\w+",
    r"^(export\s+)?class\s+\w+",
    r"^export\s+(default\s+)?",
    r"^const\s+\w+\s*=\s*(async\s+)?(\(|\w+\s*=>)",
];

const TYPESCRIPT_BOUNDARIES: &[&str] = &[
    r"^(export\s+)?(async\s+)?function\s+\w+",
    r"^(export\s+)?class\s+\w+",
    r"^export\s+(default\s+)?",
    r"^(export\s+)?interface\s+\w+",
    r"^(export\s+)?type\s+\w+",
    r"^const\s+\w+\s*=\s*(async\s+)?(\(|\w+\s*=>)",
];

const PYTHON_BOUNDARIES: &[&str] =
    &[r"^def\s+\w+", r"^class\s+\w+", r"^async\s+def\s+\w+"];

const GO_BOUNDARIES: &[&str] = &[
    r"^func\s+(\(\w+\s+\*?\w+\)\s+)?\w+",
    r"^type\s+\w+\s+(struct|interface)",
];

const RUST_BOUNDARIES: &[&str] = &[
    r"^(pub(\([\w:]+\))?\s+)?(const\s+)?(async\s+)?(unsafe\s+)?fn\s+\w+",
    r"^(pub(\([\w:]+\))?\s+)?(struct|enum|trait|union|mod)\s+\w+",
    r"^impl\b",
];

/// Compiled per-language boundary patterns.
#[derive(Debug, Clone)]
struct BoundaryPatterns {
    javascript: Vec<Regex>,
    typescript: Vec<Regex>,
    python: Vec<Regex>,
    go: Vec<Regex>,
    rust: Vec<Regex>,
}

impl BoundaryPatterns {
    fn compile() -> Result<Self> {
        Ok(Self {
            javascript: compile_all(JAVASCRIPT_BOUNDARIES)?,
            typescript: compile_all(TYPESCRIPT_BOUNDARIES)?,
            python: compile_all(PYTHON_BOUNDARIES)?,
            go: compile_all(GO_BOUNDARIES)?,
            rust: compile_all(RUST_BOUNDARIES)?,
        })
    }

    /// Patterns for `language`, falling back to the generic
    /// function-like set.
    fn for_language(&self, language: Language) -> &[Regex] {
        match language {
            Language::TypeScript | Language::Tsx => &self.typescript,
            Language::Python => &self.python,
            Language::Go => &self.go,
            Language::Rust => &self.rust,
            _ => &self.javascript,
        }
    }
}

fn compile_all(patterns: &[&str]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(Into::into))
        .collect()
}

/// A line range of a larger text.
///
/// Produced by [`Segmenter::segment`]. Line numbers are 1-indexed and
/// inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Zero-based segment index within the input.
    pub index: usize,
    /// The path hint the text came from.
    pub source_path: String,
    pub language: Language,
    /// The covered lines joined with `\n`.
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub segment_type: &'static str,
    /// Whitespace-separated word count of `content`.
    pub token_count: usize,
}

/// Splits text into overlapping, boundary-aware line windows.
#[derive(Debug, Clone)]
pub struct Segmenter {
    segment_lines: usize,
    overlap_lines: usize,
    boundaries: BoundaryPatterns,
}

impl Segmenter {
    /// Segmenter with the standard 300-line size and 60-line overlap.
    pub fn new() -> Result<Self> {
        Self::with_sizes(DEFAULT_SEGMENT_LINES, DEFAULT_OVERLAP_LINES)
    }

    /// Segmenter with explicit sizes.
    ///
    /// The size is at least one line and the overlap is kept strictly below
    /// the size.
    pub fn with_sizes(segment_lines: usize, overlap_lines: usize) -> Result<Self> {
        let segment_lines = segment_lines.max(1);
        Ok(Self {
            segment_lines,
            overlap_lines: overlap_lines.min(segment_lines - 1),
            boundaries: BoundaryPatterns::compile()?,
        })
    }

    pub fn segment_lines(&self) -> usize {
        self.segment_lines
    }

    pub fn overlap_lines(&self) -> usize {
        self.overlap_lines
    }

    /// Line indices (0-based) where a declaration starts.
    pub fn break_points(&self, lines: &[&str], language: Language) -> Vec<usize> {
        let patterns = self.boundaries.for_language(language);
        lines
            .iter()
            .enumerate()
            .filter(|(_, line)| {
                let stripped = line.trim_start();
                patterns.iter().any(|re| re.is_match(stripped))
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Split `content` into segments.
    ///
    /// Every line of the input belongs to at least one segment. Input shorter
    /// than the segment size yields exactly one segment.
    ///
    /// # Examples
    ///
    /// ```
    /// use libscope::chunking::Segmenter;
    ///
    /// let segmenter = Segmenter::new().unwrap();
    /// let text = "line\n".repeat(49) + "last";
    /// let segments = segmenter.segment(&text, "notes.txt");
    /// assert_eq!(segments.len(), 1);
    /// assert_eq!((segments[0].start_line, segments[0].end_line), (1, 50));
    /// ```
    pub fn segment(&self, content: &str, source_path: &str) -> Vec<Segment> {
        let lines: Vec<&str> = content.split('\n').collect();
        let total = lines.len();
        let language = Language::from_path(source_path);
        let break_points = self.break_points(&lines, language);
        let window = self.segment_lines / 5;

        let mut segments = Vec::new();
        let mut start = 0;

        loop {
            let naive_end = (start + self.segment_lines).min(total);
            let mut end = naive_end;

            if naive_end < total {
                let window_start = naive_end - window;
                // break_points is sorted, so the last hit is the largest.
                if let Some(&bp) = break_points
                    .iter()
                    .rev()
                    .find(|&&bp| bp >= window_start && bp <= naive_end)
                {
                    end = bp;
                }
            }

            let text = lines[start..end].join("\n");
            segments.push(Segment {
                index: segments.len(),
                source_path: source_path.to_string(),
                language,
                token_count: text.split_whitespace().count(),
                content: text,
                start_line: start + 1,
                end_line: end,
                segment_type: CODE_SEGMENT,
            });

            if end >= total {
                break;
            }

            // A snapped end can sit closer to start than the overlap.
            let mut next = end.saturating_sub(self.overlap_lines);
            if next <= start {
                next = (start + self.overlap_lines.max(1)).min(end);
            }
            start = next;
        }

        segments
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn numbered(count: usize) -> String {
        (1..=count)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn assert_full_coverage(segments: &[Segment], total: usize) {
        let mut covered = vec![false; total];
        for s in segments {
            assert!(s.start_line >= 1 && s.start_line <= s.end_line);
            for line in s.start_line..=s.end_line {
                covered[line - 1] = true;
            }
        }
        assert!(covered.iter().all(|&c| c), "some line was not covered");
    }

    #[test]
    fn language_detection() {
        assert_eq!(Language::from_path("a/b.js"), Language::JavaScript);
        assert_eq!(Language::from_path("a/b.jsx"), Language::Jsx);
        assert_eq!(Language::from_path("b.ts"), Language::TypeScript);
        assert_eq!(Language::from_path("main.go"), Language::Go);
        assert_eq!(Language::from_path("lib.rs"), Language::Rust);
        assert_eq!(Language::from_path("README.md"), Language::Markdown);
        assert_eq!(Language::from_path("dump.txt"), Language::Text);
        assert_eq!(Language::from_path("Makefile"), Language::Text);
        assert_eq!(Language::Text.as_str(), "text");
    }

    #[test]
    fn fifty_lines_is_one_segment() {
        let segmenter = Segmenter::new().unwrap();
        let segments = segmenter.segment(&numbered(50), "dump.txt");

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start_line, 1);
        assert_eq!(segments[0].end_line, 50);
        assert_eq!(segments[0].content, numbered(50));
        assert_eq!(segments[0].segment_type, CODE_SEGMENT);
        assert_eq!(segments[0].token_count, 100);
    }

    #[test]
    fn empty_input_is_one_empty_segment() {
        let segmenter = Segmenter::new().unwrap();
        let segments = segmenter.segment("", "dump.txt");
        assert_eq!(segments.len(), 1);
        assert_eq!((segments[0].start_line, segments[0].end_line), (1, 1));
        assert!(segments[0].content.is_empty());
    }

    #[test]
    fn plain_text_uses_fixed_windows() {
        let segmenter = Segmenter::new().unwrap();
        let segments = segmenter.segment(&numbered(700), "dump.txt");

        let spans: Vec<_> =
            segments.iter().map(|s| (s.start_line, s.end_line)).collect();
        assert_eq!(spans, vec![(1, 300), (241, 540), (481, 700)]);
        assert_eq!(segments[1].index, 1);
        assert!(segments[1].content.starts_with("line 241\n"));
    }

    #[test]
    fn snaps_to_last_boundary_in_window() {
        let mut lines: Vec<String> =
            (0..400).map(|i| format!("  value_{i};")).collect();
        // Both inside [240, 300]; the later one wins.
        lines[250] = "function early() {".to_string();
        lines[280] = "export function late() {".to_string();
        // Outside the window, ignored.
        lines[100] = "class Ignored {".to_string();
        let text = lines.join("\n");

        let segmenter = Segmenter::new().unwrap();
        let segments = segmenter.segment(&text, "bundle.js");

        assert_eq!(segments[0].start_line, 1);
        assert_eq!(segments[0].end_line, 280);
        assert_eq!(segments[1].start_line, 221);
        assert!(segments[1].content.contains("export function late()"));
    }

    #[test]
    fn boundary_detection_strips_indentation() {
        let segmenter = Segmenter::new().unwrap();
        let lines = ["x = 1", "    def handler(self):", "class Foo:"];
        assert_eq!(segmenter.break_points(&lines, Language::Python), vec![1, 2]);
    }

    #[test]
    fn unknown_language_uses_generic_boundaries() {
        let segmenter = Segmenter::new().unwrap();
        let lines = ["intro", "async function load() {", "def not_js():"];
        assert_eq!(segmenter.break_points(&lines, Language::Text), vec![1]);
        assert_eq!(segmenter.break_points(&lines, Language::Ruby), vec![1]);
    }

    #[test]
    fn typescript_and_go_boundaries() {
        let segmenter = Segmenter::new().unwrap();
        let ts = ["export interface Props {", "type Id = string", "let x"];
        assert_eq!(
            segmenter.break_points(&ts, Language::TypeScript),
            vec![0, 1]
        );

        let go = ["func (s *Server) Start() {", "type Config struct {", "x"];
        assert_eq!(segmenter.break_points(&go, Language::Go), vec![0, 1]);
    }

    #[test]
    fn rust_boundaries() {
        let segmenter = Segmenter::new().unwrap();
        let rs = [
            "pub(crate) async fn run() {",
            "impl Segmenter {",
            "struct Inner;",
            "let x = 1;",
        ];
        assert_eq!(
            segmenter.break_points(&rs, Language::Rust),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn dense_boundaries_still_progress() {
        let text = (0..2000)
            .map(|i| format!("function f{i}() {{}}"))
            .collect::<Vec<_>>()
            .join("\n");
        let segmenter = Segmenter::new().unwrap();
        let segments = segmenter.segment(&text, "dense.js");

        assert_full_coverage(&segments, 2000);
        for pair in segments.windows(2) {
            assert!(pair[1].start_line > pair[0].start_line);
        }
    }

    #[test]
    fn overlap_is_clamped_below_size() {
        let segmenter = Segmenter::with_sizes(10, 50).unwrap();
        assert_eq!(segmenter.segment_lines(), 10);
        assert_eq!(segmenter.overlap_lines(), 9);

        let segments = segmenter.segment(&numbered(35), "dump.txt");
        assert_full_coverage(&segments, 35);
    }

    #[test]
    fn early_boundary_with_large_overlap() {
        let mut lines: Vec<String> =
            (0..30).map(|i| format!("  value_{i};")).collect();
        lines[8] = "function f() {".to_string();
        let text = lines.join("\n");

        let segmenter = Segmenter::with_sizes(10, 9).unwrap();
        let segments = segmenter.segment(&text, "bundle.js");

        assert_eq!((segments[0].start_line, segments[0].end_line), (1, 8));
        assert_eq!(segments.last().unwrap().end_line, 30);
        assert_full_coverage(&segments, 30);
        for pair in segments.windows(2) {
            assert!(pair[1].start_line > pair[0].start_line);
            assert!(pair[1].start_line <= pair[0].end_line + 1);
        }
    }

    proptest! {
        #[test]
        fn segments_cover_every_line(
            lines in proptest::collection::vec(
                prop_oneof![
                    Just("plain text".to_string()),
                    Just("function f() {".to_string()),
                    Just("class C {".to_string()),
                    "[a-z ]{0,12}",
                ],
                1..600,
            ),
            size in 1usize..120,
            overlap in 0usize..120,
        ) {
            let segmenter = Segmenter::with_sizes(size, overlap).unwrap();
            let text = lines.join("\n");
            let segments = segmenter.segment(&text, "input.js");

            prop_assert!(!segments.is_empty());
            prop_assert_eq!(segments[0].start_line, 1);
            prop_assert_eq!(segments.last().unwrap().end_line, lines.len());
            for pair in segments.windows(2) {
                // Starts advance and no gap opens between neighbours.
                prop_assert!(pair[1].start_line > pair[0].start_line);
                prop_assert!(pair[1].start_line <= pair[0].end_line + 1);
            }
        }

        #[test]
        fn segment_count_is_bounded_without_boundaries(
            total in 1usize..3000,
            size in 2usize..400,
            overlap in 0usize..400,
        ) {
            let segmenter = Segmenter::with_sizes(size, overlap).unwrap();
            let step = segmenter.segment_lines() - segmenter.overlap_lines();
            let text = vec!["x"; total].join("\n");
            let segments = segmenter.segment(&text, "input.txt");

            prop_assert!(segments.len() <= total.div_ceil(step));
        }
    }
}
