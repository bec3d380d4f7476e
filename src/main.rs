use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use mediadex::config::Config;
use mediadex::db::{Asset, AssetFilters, AssetKind, AssetStatus, Database};
use mediadex::embed::HttpEmbeddingProvider;
use mediadex::indexer::Indexer;
use mediadex::logging;
use mediadex::search::SearchExecutor;

struct Cli {
    config_path: Option<PathBuf>,
    command: Command,
}

enum Command {
    Watch { root: Option<PathBuf> },
    Scan { root: Option<PathBuf> },
    Search { text: String, filters: AssetFilters },
    Similar { id: i64, limit: usize },
    Lineage { id: i64 },
}

fn parse_args() -> Cli {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut positional: Vec<String> = Vec::new();
    let mut filters = AssetFilters::default();
    let mut limit: usize = 20;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("mediadex {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(expect_value(&args, &mut i)));
            }
            "--kind" => {
                let value = expect_value(&args, &mut i);
                filters.kind = Some(parse_or_die(AssetKind::from_str(&value), "kind", &value));
            }
            "--status" => {
                let value = expect_value(&args, &mut i);
                let status = parse_or_die(AssetStatus::from_str(&value), "status", &value);
                filters.statuses.get_or_insert_with(Vec::new).push(status);
            }
            "--tag" => {
                let value = expect_value(&args, &mut i);
                let id = parse_or_die(value.parse::<i64>().ok(), "tag id", &value);
                filters.tag_ids.get_or_insert_with(Vec::new).push(id);
            }
            "--id" => {
                let value = expect_value(&args, &mut i);
                let id = parse_or_die(value.parse::<i64>().ok(), "asset id", &value);
                filters.ids.get_or_insert_with(Vec::new).push(id);
            }
            "--author" => filters.author_id = Some(expect_value(&args, &mut i)),
            "--project" => filters.project = Some(expect_value(&args, &mut i)),
            "--scene" => filters.scene = Some(expect_value(&args, &mut i)),
            "--shot" => filters.shot = Some(expect_value(&args, &mut i)),
            "--platform" => filters.platform = Some(expect_value(&args, &mut i)),
            "--platform-url" => filters.platform_url = Some(expect_value(&args, &mut i)),
            "--model" => filters.model = Some(expect_value(&args, &mut i)),
            "--from" => {
                let value = expect_value(&args, &mut i);
                filters.date_from = Some(parse_or_die(parse_date(&value, false), "date", &value));
            }
            "--to" => {
                let value = expect_value(&args, &mut i);
                filters.date_to = Some(parse_or_die(parse_date(&value, true), "date", &value));
            }
            "--related" => {
                let value = expect_value(&args, &mut i);
                filters.related_to =
                    Some(parse_or_die(value.parse::<i64>().ok(), "asset id", &value));
            }
            "--semantic" => filters.semantic = true,
            "--limit" => {
                let value = expect_value(&args, &mut i);
                limit = parse_or_die(value.parse::<usize>().ok(), "limit", &value);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown argument: {}", other);
                print_help();
                std::process::exit(1);
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let command = match positional.first().map(String::as_str) {
        Some("watch") => Command::Watch {
            root: positional.get(1).map(PathBuf::from),
        },
        Some("scan") => Command::Scan {
            root: positional.get(1).map(PathBuf::from),
        },
        Some("search") => Command::Search {
            text: positional[1..].join(" "),
            filters,
        },
        Some("similar") => {
            let value = positional.get(1).cloned().unwrap_or_default();
            Command::Similar {
                id: parse_or_die(value.parse::<i64>().ok(), "asset id", &value),
                limit,
            }
        }
        Some("lineage") => {
            let value = positional.get(1).cloned().unwrap_or_default();
            Command::Lineage {
                id: parse_or_die(value.parse::<i64>().ok(), "asset id", &value),
            }
        }
        _ => {
            print_help();
            std::process::exit(1);
        }
    };

    Cli {
        config_path,
        command,
    }
}

fn expect_value(args: &[String], i: &mut usize) -> String {
    if *i + 1 < args.len() {
        *i += 1;
        args[*i].clone()
    } else {
        eprintln!("Error: {} requires a value", args[*i]);
        std::process::exit(1);
    }
}

fn parse_or_die<T>(value: Option<T>, what: &str, raw: &str) -> T {
    match value {
        Some(value) => value,
        None => {
            eprintln!("Error: invalid {}: {}", what, raw);
            std::process::exit(1);
        }
    }
}

/// Parse a YYYY-MM-DD date into milliseconds, at the start or end of
/// the day depending on which side of the range it bounds.
fn parse_date(value: &str, end_of_day: bool) -> Option<i64> {
    let date = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    let time = if end_of_day {
        date.and_hms_milli_opt(23, 59, 59, 999)?
    } else {
        date.and_hms_opt(0, 0, 0)?
    };
    Some(time.and_utc().timestamp_millis())
}

fn print_help() {
    println!(
        r#"mediadex - local media asset catalog with hybrid search

USAGE:
    mediadex <COMMAND> [OPTIONS]

COMMANDS:
    watch [DIR]         Index DIR (or the configured library root) and keep
                        watching for changes until interrupted
    scan [DIR]          One-shot index of DIR, then exit
    search [TEXT..]     Ranked search over the catalog
    similar ID          Assets most similar to the given asset
    lineage ID          Ancestors and descendants of the given asset

SEARCH OPTIONS:
    --kind K            image | video | other
    --status S          Filter by status (repeatable)
    --tag ID            Filter by tag id (repeatable, any-of)
    --id ID             Restrict to specific asset ids (repeatable)
    --author A          Filter by author id
    --project P         Filter by project
    --scene S           Filter by scene
    --shot S            Filter by shot
    --platform P        Filter by platform
    --platform-url U    Platform URL substring
    --model M           Filter by generation model
    --from YYYY-MM-DD   Created on or after
    --to YYYY-MM-DD     Created on or before
    --related ID        Assets related to the given asset
    --semantic          Resolve relatedness by vector similarity
    --limit N           Result cap for 'similar' (default: 20)

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    MEDIADEX_CONFIG     Path to config file (overrides default location)
    MEDIADEX_LOG        Log level (trace, debug, info, warn, error)
"#
    );
}

fn print_asset(asset: &Asset) {
    let similarity = match asset.distance {
        Some(distance) => format!("{:5.1}%  ", (1.0 - distance) * 100.0),
        None => "        ".to_string(),
    };
    let tags = asset
        .tags
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(",");
    println!(
        "{:>6}  {}{:<6} {:<16} {}  [{}]",
        asset.id,
        similarity,
        asset.kind.as_str(),
        asset.status.as_str(),
        asset.path,
        tags
    );
}

fn resolve_root(config: &Config, root: Option<PathBuf>) -> Result<PathBuf> {
    root.or_else(|| config.library.root.clone())
        .context("no library root configured; pass a directory or set library.root")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = parse_args();

    logging::init(None)?;

    let mut config = match cli.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let db = Arc::new(Database::open(&config.db_path)?);
    db.initialize()?;

    match cli.command {
        Command::Watch { root } => {
            let root = resolve_root(&config, root)?;
            if config.library.root.as_deref() != Some(root.as_path()) {
                config.library.root = Some(root.clone());
                config.save()?;
            }

            let indexer = Indexer::new(db, config.indexer.clone());
            indexer.set_root(&root).await?;

            let stats = indexer.stats();
            println!(
                "Indexed {} of {} files ({} failed); watching {:?}",
                stats.processed_files, stats.total_files, stats.failed_files, root
            );

            tokio::signal::ctrl_c().await?;
            indexer.stop();
            println!("Stopped.");
        }
        Command::Scan { root } => {
            let root = resolve_root(&config, root)?;
            let indexer = Indexer::new(db, config.indexer.clone());
            indexer.set_root(&root).await?;
            indexer.stop();

            let stats = indexer.stats();
            println!(
                "Indexed {} of {} files ({} failed)",
                stats.processed_files, stats.total_files, stats.failed_files
            );
        }
        Command::Search { text, filters } => {
            let provider = Arc::new(HttpEmbeddingProvider::new(&config.embedding));
            let executor = SearchExecutor::new(db, provider);
            let results = executor.search(&text, &filters)?;
            for asset in &results {
                print_asset(asset);
            }
            println!("{} result(s)", results.len());
        }
        Command::Similar { id, limit } => {
            let provider = Arc::new(HttpEmbeddingProvider::new(&config.embedding));
            let executor = SearchExecutor::new(db, provider);
            let results = executor.find_similar(id, limit)?;
            for asset in &results {
                print_asset(asset);
            }
            println!("{} result(s)", results.len());
        }
        Command::Lineage { id } => {
            let provider = Arc::new(HttpEmbeddingProvider::new(&config.embedding));
            let executor = SearchExecutor::new(db, provider);
            let results = executor.ancestors_and_descendants(id)?;
            for asset in &results {
                print_asset(asset);
            }
            println!("{} asset(s) in lineage", results.len());
        }
    }

    Ok(())
}
