use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::{
    error::{Error, Result},
    freshness::SourceFile,
};

/// Default result count when searching one corpus.
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Default result count per corpus when searching all corpora.
pub const DEFAULT_LIMIT_PER_CORPUS: usize = 3;

#[derive(Debug, Parser)]
#[command(
    name = "libscope",
    about = "Tag-boosted BM25 search over flattened library source dumps"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Segment, tag and store flattened source dumps, one corpus per file
    Index(IndexArgs),
    /// Remove a corpus and all its segments
    Remove {
        /// Name of the corpus to remove
        corpus: String,
    },
    /// Search one corpus, or every corpus when none is given
    Search(SearchArgs),
    /// Print a stored segment
    Get(GetArgs),
    /// List indexed corpora
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show store or corpus statistics
    Stats(StatsArgs),
    /// Report corpora whose source dumps changed since indexing
    Check(CheckArgs),
    /// Start MCP server for AI agent integration
    Mcp,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

#[derive(Debug, Parser)]
pub struct IndexArgs {
    /// Flattened source dumps; the corpus name is the file stem
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Corpus name for a single dump
    #[arg(short = 'c', long)]
    pub corpus: Option<String>,
}

impl IndexArgs {
    /// The corpus and path of every dump to index, in argument order.
    pub fn sources(&self) -> Result<Vec<SourceFile>> {
        match (&self.corpus, self.files.as_slice()) {
            (Some(corpus), [file]) => Ok(vec![SourceFile {
                corpus: corpus.clone(),
                path: file.clone(),
            }]),
            (Some(_), files) => Err(Error::Config(format!(
                "--corpus names a single dump, got {} files",
                files.len()
            ))),
            (None, files) => Ok(files.iter().map(SourceFile::from_path).collect()),
        }
    }
}

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// The search query
    pub query: String,

    /// Search only within this corpus
    #[arg(short = 'c', long)]
    pub corpus: Option<String>,

    /// Number of results (per corpus when searching all corpora)
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchArgs {
    /// The requested count, or the default for the search mode.
    pub fn limit(&self) -> usize {
        self.count.unwrap_or(if self.corpus.is_some() {
            DEFAULT_SEARCH_LIMIT
        } else {
            DEFAULT_LIMIT_PER_CORPUS
        })
    }
}

#[derive(Debug, Parser)]
pub struct GetArgs {
    /// Segment id
    pub id: u64,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct StatsArgs {
    /// Show statistics for this corpus only
    pub corpus: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct CheckArgs {
    /// Source dumps to check; the corpus name is the file stem
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "libscope",
            &mut std::io::stdout(),
        );
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    fn index_args(argv: &[&str]) -> IndexArgs {
        let cli = Cli::parse_from(
            ["libscope", "index"].iter().chain(argv).copied(),
        );
        match cli.command {
            Command::Index(args) => args,
            _ => panic!("expected Index command"),
        }
    }

    #[test]
    fn index_names_corpora_after_file_stems() {
        let args = index_args(&["dumps/react.txt", "dumps/vue.md"]);
        let sources = args.sources().unwrap();

        let names: Vec<_> = sources.iter().map(|s| s.corpus.as_str()).collect();
        assert_eq!(names, vec!["react", "vue"]);
        assert_eq!(sources[1].path, PathBuf::from("dumps/vue.md"));
    }

    #[test]
    fn index_corpus_flag_renames_one_dump() {
        let args = index_args(&["libsource-react.txt", "-c", "react"]);
        let sources = args.sources().unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].corpus, "react");

        let args = index_args(&["a.txt", "b.txt", "--corpus", "both"]);
        assert!(matches!(args.sources(), Err(Error::Config(_))));

        assert!(Cli::try_parse_from(["libscope", "index"]).is_err());
    }

    #[test]
    fn search_defaults_depend_on_corpus() {
        let cli = Cli::parse_from(["libscope", "search", "useState"]);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.query, "useState");
                assert!(args.corpus.is_none());
                assert_eq!(args.limit(), DEFAULT_LIMIT_PER_CORPUS);
                assert!(!args.json);
            }
            _ => panic!("expected Search command"),
        }

        let cli = Cli::parse_from(["libscope", "search", "hooks", "-c", "react"]);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.corpus.as_deref(), Some("react"));
                assert_eq!(args.limit(), DEFAULT_SEARCH_LIMIT);
            }
            _ => panic!("expected Search command"),
        }
    }

    #[test]
    fn search_explicit_count() {
        let cli =
            Cli::parse_from(["libscope", "search", "q", "-n", "12", "--json"]);
        match cli.command {
            Command::Search(args) => {
                assert_eq!(args.limit(), 12);
                assert!(args.json);
            }
            _ => panic!("expected Search command"),
        }
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::parse_from([
            "libscope",
            "list",
            "--data-dir",
            "/tmp/ls",
            "-vv",
        ]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/ls")));
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
    }

    #[test]
    fn check_requires_files() {
        assert!(Cli::try_parse_from(["libscope", "check"]).is_err());
        let cli =
            Cli::parse_from(["libscope", "check", "react.txt", "vue.txt"]);
        match cli.command {
            Command::Check(args) => assert_eq!(args.files.len(), 2),
            _ => panic!("expected Check command"),
        }
    }

    #[test]
    fn parse_get_and_stats() {
        let cli = Cli::parse_from(["libscope", "get", "42", "--json"]);
        match cli.command {
            Command::Get(args) => {
                assert_eq!(args.id, 42);
                assert!(args.json);
            }
            _ => panic!("expected Get command"),
        }

        let cli = Cli::parse_from(["libscope", "stats", "react"]);
        match cli.command {
            Command::Stats(args) => {
                assert_eq!(args.corpus.as_deref(), Some("react"))
            }
            _ => panic!("expected Stats command"),
        }
    }
}
