use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;

use taxlineage_rs::{format_lineage, load_or_build, Taxonomy};

/// Resolve lineages and rank projections from an NCBI taxdump
#[derive(Parser, Debug)]
#[clap(version, about = "taxonomy lineage lookup")]
struct Args {
    /// Directory holding names.dmp and nodes.dmp (optionally gzipped).
    #[clap(short, long, value_parser, required = true)]
    taxdump: PathBuf,

    /// Snapshot file reused across runs; written after the first build.
    #[clap(short, long, value_parser)]
    cache: Option<PathBuf>,

    /// Print the nearest ancestor at this rank instead of the full lineage.
    #[clap(short, long, value_parser)]
    rank: Option<String>,

    /// Treat queries as display names instead of taxon ids.
    #[clap(long, value_parser)]
    by_name: bool,

    /// Taxon ids (or names with --by-name) to look up.
    #[clap(value_parser, required = true)]
    queries: Vec<String>,
}

fn spinner(color: &str, msg: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let template = format!("{{spinner:.{color}}} {{msg}}");
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template(&template)
    {
        spinner.set_style(style);
    }
    spinner.set_message(msg);
    spinner
}

fn main() -> ExitCode {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();

    // 1. Build or load the taxonomy
    let pb = spinner("blue", "Loading taxonomy...");
    let loaded = match &args.cache {
        Some(cache) => load_or_build(cache, &args.taxdump),
        None => Taxonomy::from_dump_dir(&args.taxdump),
    };
    let taxonomy = match loaded {
        Ok(taxonomy) => taxonomy,
        Err(e) => {
            pb.abandon_with_message("Loading taxonomy failed.");
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    pb.finish_with_message(format!("Loaded {} taxa.", taxonomy.len()));

    // 2. Resolve queries to taxon ids
    let ids: Vec<Option<&str>> = args
        .queries
        .iter()
        .map(|q| {
            if args.by_name {
                taxonomy.resolve_name(q)
            } else {
                Some(q.as_str())
            }
        })
        .collect();

    // 3. Answer them
    match &args.rank {
        Some(rank) => {
            let projected = taxonomy.project_resolved(&ids, rank);
            for (query, result) in args.queries.iter().zip(projected) {
                match result {
                    Ok(Some((taxid, name))) => println!("{}\t{}\t{}", query, taxid, name),
                    Ok(None) => println!("{}\t-\t-", query),
                    Err(e) => log::error!("{}: {}", query, e),
                }
            }
        }
        None => {
            for (query, id) in args.queries.iter().zip(&ids) {
                let path = match id {
                    Some(id) => taxonomy.ancestor_name_path(id),
                    None => Ok(Vec::new()),
                };
                match path {
                    Ok(path) => println!("{}\t{}", query, format_lineage(&path)),
                    Err(e) => log::error!("{}: {}", query, e),
                }
            }
        }
    }

    ExitCode::SUCCESS
}
