use clap::Parser;
use libscope::{
    DataDir,
    SearchEngine,
    cli::{CheckArgs, Cli, Command, GetArgs, IndexArgs, SearchArgs, StatsArgs},
    error,
    freshness::{self, SourceFile},
    ingestion,
    mcp,
    search,
    text_util::add_line_numbers,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("LIBSCOPE_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;

    if let Command::Mcp = cli.command {
        return mcp::run_mcp(&data_dir);
    }

    let mut engine = SearchEngine::open(&data_dir.segments_db())?;

    match cli.command {
        Command::Index(args) => cmd_index(&mut engine, &args)?,
        Command::Remove { corpus } => {
            let existed = engine.corpus_stats(&corpus)?.segment_count;
            if !engine.remove_corpus(&corpus) {
                return Err(error::Error::Indexing(format!(
                    "could not remove corpus '{corpus}'"
                )));
            }
            if existed == 0 {
                println!("Corpus '{corpus}' had no segments");
            } else {
                println!("Removed corpus '{corpus}' ({existed} segments)");
            }
        }
        Command::Search(args) => cmd_search(&mut engine, &args)?,
        Command::Get(args) => cmd_get(&engine, &args)?,
        Command::List { json } => cmd_list(&engine, json)?,
        Command::Stats(args) => cmd_stats(&engine, &args)?,
        Command::Check(args) => cmd_check(&engine, &data_dir, &args)?,
        Command::Mcp | Command::Completions(_) => {}
    }

    Ok(())
}

fn cmd_index(engine: &mut SearchEngine, args: &IndexArgs) -> error::Result<()> {
    let sources = args.sources()?;
    let mut failed = Vec::new();

    // A failed dump is reported and the rest are still indexed.
    for source in &sources {
        let outcome = engine.index_file(&source.corpus, &source.path);
        ingestion::format_outcome(&outcome);
        if !outcome.success {
            failed.push(source.corpus.as_str());
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(error::Error::Indexing(format!(
            "{} of {} dumps failed: {}",
            failed.len(),
            sources.len(),
            failed.join(", ")
        )))
    }
}

fn cmd_search(engine: &mut SearchEngine, args: &SearchArgs) -> error::Result<()> {
    let limit = args.limit();

    match &args.corpus {
        Some(corpus) => {
            let response = engine.search(&args.query, corpus, limit)?;
            if response.is_slow() {
                warn!(
                    corpus = %corpus,
                    ms = response.search_time_ms,
                    "slow search"
                );
            }
            if args.json {
                search::format_json(&response)?;
            } else {
                search::format_human(&response);
            }
        }
        None => {
            let response = engine.search_all(&args.query, limit)?;
            if args.json {
                search::format_json(&response)?;
            } else {
                search::format_all_human(&response);
            }
        }
    }

    Ok(())
}

fn cmd_get(engine: &SearchEngine, args: &GetArgs) -> error::Result<()> {
    let Some(record) = engine.get_segment(args.id)? else {
        return Err(error::Error::NotFound {
            kind: "segment",
            name: args.id.to_string(),
        });
    };

    if args.json {
        return search::format_json(&record);
    }

    println!(
        "#{} {} {}:{}-{}",
        record.id,
        record.corpus,
        record.source_path,
        record.start_line,
        record.end_line
    );
    if !record.tags.is_empty() {
        println!("tags: {}", record.tags.join(", "));
    }
    println!();
    println!("{}", add_line_numbers(&record.content, record.start_line));
    Ok(())
}

fn cmd_list(engine: &SearchEngine, json: bool) -> error::Result<()> {
    let corpora = engine.list_corpora()?;

    if json {
        return search::format_json(&corpora);
    }

    if corpora.is_empty() {
        println!("No corpora indexed.");
        return Ok(());
    }
    for corpus in &corpora {
        println!("{:<24} {:>8} segments", corpus.name, corpus.segment_count);
    }
    Ok(())
}

fn cmd_stats(engine: &SearchEngine, args: &StatsArgs) -> error::Result<()> {
    match &args.corpus {
        Some(corpus) => {
            let stats = engine.corpus_stats(corpus)?;
            if args.json {
                return search::format_json(&stats);
            }
            println!("Corpus:   {corpus}");
            println!("Segments: {}", stats.segment_count);
            println!("Tokens:   {}", stats.total_tokens);
            println!("Tags:     {}", stats.total_tags);
        }
        None => {
            let stats = engine.stats()?;
            if args.json {
                return search::format_json(&stats);
            }
            println!("Segments:           {}", stats.total_segments);
            println!("Corpora:            {}", stats.total_corpora);
            println!("Avg segment chars:  {:.0}", stats.average_segment_chars);
        }
    }
    Ok(())
}

fn cmd_check(
    engine: &SearchEngine,
    data_dir: &DataDir,
    args: &CheckArgs,
) -> error::Result<()> {
    let sources: Vec<SourceFile> =
        args.files.iter().map(SourceFile::from_path).collect();
    let report = freshness::check_freshness(
        engine.db(),
        &data_dir.segments_db(),
        &sources,
    )?;

    if args.json {
        return search::format_json(&report);
    }

    for corpus in &report.fresh {
        println!("fresh    {corpus}");
    }
    for stale in &report.stale {
        println!("stale    {} ({:?})", stale.corpus, stale.reason);
    }
    for corpus in &report.missing {
        println!("missing  {corpus}");
    }
    Ok(())
}
