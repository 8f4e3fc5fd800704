use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use musicscout::aggregate::ReviewConsensusAggregator;
use musicscout::db::Database;
use musicscout::db::models::AlbumReviewAggregate;
use musicscout::matcher::{EntityMatcher, MatchStrength};
use musicscout::metadata::CascadingProvider;
use musicscout::sources::SourceRegistry;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "musicscout", version, about = "Music review aggregator and critic consensus tracker")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the built-in and configured review sources
    SetupSources,

    /// List review sources and their weights
    Sources,

    /// Import article files (JSON/YAML) and extract artists, albums and scores
    Import {
        /// Files or directories to import (defaults to config import_dirs)
        paths: Vec<PathBuf>,

        /// Re-process articles that were already imported
        #[arg(long)]
        force: bool,
    },

    /// Re-run score, genre and track extraction over stored articles
    Rescore,

    /// Match reviews to albums and compute consensus aggregates
    Aggregate {
        /// Only recompute this album
        #[arg(long)]
        album_id: Option<i64>,
    },

    /// Show the highest rated albums by weighted average
    Top {
        /// Number of results
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,

        /// Minimum number of reviews
        #[arg(long, default_value = "2")]
        min_reviews: i64,
    },

    /// Show the albums critics disagree on most
    Controversial {
        /// Number of results
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,

        /// Minimum number of reviews
        #[arg(long, default_value = "2")]
        min_reviews: i64,
    },

    /// Show the most recently reviewed albums
    Recent {
        /// Time window in days
        #[arg(long, default_value = "30")]
        days: u32,

        /// Number of results
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Find albums similar to an artist/title pair
    Similar {
        artist: String,
        title: String,

        /// Number of results
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Resolve an artist/title pair to a canonical album
    Match {
        artist: String,
        title: String,

        /// Release year, favours albums from that year
        #[arg(long)]
        year: Option<i32>,

        /// Create the artist and album if nothing matches
        #[arg(long)]
        create: bool,
    },

    /// Parse a review score from text
    ParseScore {
        text: String,

        /// Source name, selects source-specific patterns
        #[arg(short, long, default_value = "")]
        source: String,
    },

    /// Fetch external metadata for albums that have none
    Enrich {
        /// Maximum albums to look up
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,

        /// Show what would be stored without writing to DB
        #[arg(long)]
        dry_run: bool,
    },

    /// Show catalog statistics
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = musicscout::config::AppConfig::load();

    // Resolve database path: CLI > config > XDG default
    let db_path = cli.db_path
        .or(config.db_path.clone())
        .unwrap_or_else(musicscout::config::default_db_path);
    log::info!("Database: {}", db_path.display());

    let db = Database::open(&db_path)
        .context("Failed to open database")?;

    match cli.command {
        Commands::SetupSources => {
            let registry = SourceRegistry::new(&config.custom_sources);
            let result = registry.seed(&db).context("Failed to seed sources")?;
            println!(
                "Sources: {} created, {} already present",
                result.created, result.existing
            );
        }

        Commands::Sources => {
            let sources = db.list_sources().context("Query failed")?;
            if sources.is_empty() {
                println!("No sources. Run `musicscout setup-sources` first.");
                return Ok(());
            }

            println!("{:<30} {:>6} {:>5} {:>7}  {}", "Source", "Weight", "Kind", "Enabled", "URL");
            println!("{}", "-".repeat(95));
            for s in &sources {
                println!(
                    "{:<30} {:>6.2} {:>5} {:>7}  {}",
                    truncate(&s.name, 30),
                    s.weight,
                    s.kind.as_str(),
                    if s.enabled { "yes" } else { "no" },
                    s.url
                );
            }
        }

        Commands::Import { paths, force } => {
            // Resolve import paths: CLI args > config import_dirs
            let import_paths = if !paths.is_empty() {
                paths
            } else if !config.import_dirs.is_empty() {
                config.import_dirs.clone()
            } else {
                anyhow::bail!(
                    "No paths to import. Pass paths as arguments or set import_dirs in config."
                );
            };

            let result = musicscout::import::import_paths(&db, &import_paths, force)
                .context("Import failed")?;
            println!(
                "Import complete: {} files, {} articles, {} new, {} updated, {} skipped, {} errors",
                result.files, result.articles, result.new, result.updated, result.skipped, result.errors
            );
        }

        Commands::Rescore => {
            let result = musicscout::extract::rescore_items(&db)
                .context("Rescore failed")?;
            println!(
                "Rescore complete: {} items, {} scored, {} updated",
                result.items, result.scored, result.changed
            );
        }

        Commands::Aggregate { album_id } => {
            let provider = config
                .metadata
                .enabled
                .then(|| CascadingProvider::from_config(&config.metadata));
            let aggregator = match &provider {
                Some(p) => ReviewConsensusAggregator::with_metadata(&db, p),
                None => ReviewConsensusAggregator::new(&db),
            };

            match album_id {
                Some(id) => {
                    let outcome = aggregator.aggregate_album(id)
                        .context("Aggregation failed")?;
                    match outcome.into_aggregate() {
                        Some(agg) => print_aggregate_table(&db, &[agg])?,
                        None => println!("No aggregate for album {id} (see -v output for why)."),
                    }
                }
                None => {
                    let aggregates = aggregator.aggregate_all_reviews()
                        .context("Aggregation failed")?;
                    println!("Aggregation complete: {} albums", aggregates.len());
                }
            }
        }

        Commands::Top { limit, min_reviews } => {
            let aggregator = ReviewConsensusAggregator::new(&db);
            let results = aggregator.get_top_rated_albums(limit, min_reviews)
                .context("Query failed")?;
            if results.is_empty() {
                println!("No albums with at least {min_reviews} reviews. Run `musicscout aggregate` first.");
                return Ok(());
            }
            println!("Top {} albums by weighted average:", results.len());
            println!();
            print_aggregate_table(&db, &results)?;
        }

        Commands::Controversial { limit, min_reviews } => {
            let aggregator = ReviewConsensusAggregator::new(&db);
            let results = aggregator.get_controversial_albums(limit, min_reviews)
                .context("Query failed")?;
            if results.is_empty() {
                println!("No albums with at least {min_reviews} reviews.");
                return Ok(());
            }
            println!("{} most divisive albums:", results.len());
            println!();
            print_aggregate_table(&db, &results)?;
        }

        Commands::Recent { days, limit } => {
            let aggregator = ReviewConsensusAggregator::new(&db);
            let results = aggregator.get_recent_aggregates(days, limit)
                .context("Query failed")?;
            if results.is_empty() {
                println!("No aggregates yet.");
                return Ok(());
            }
            println!("{} most recently reviewed albums:", results.len());
            println!();
            print_aggregate_table(&db, &results)?;
        }

        Commands::Similar { artist, title, limit } => {
            let matcher = EntityMatcher::new(&db);
            let results = matcher.find_similar(&title, &artist, limit)
                .context("Search failed")?;
            if results.is_empty() {
                println!("No albums similar to \"{title}\" by {artist}.");
                return Ok(());
            }

            println!("{:<30} {:<25} {:>5} {:>6}  {}", "Album", "Artist", "Year", "Score", "Match");
            println!("{}", "-".repeat(80));
            for (album, score) in &results {
                let artist_name = db.get_artist(album.artist_id)
                    .context("Query failed")?
                    .map(|a| a.name)
                    .unwrap_or_default();
                println!(
                    "{:<30} {:<25} {:>5} {:>6.3}  {}",
                    truncate(&album.title, 30),
                    truncate(&artist_name, 25),
                    album.release_year.map_or_else(|| "-".to_string(), |y| y.to_string()),
                    score,
                    MatchStrength::from_score(*score).as_str()
                );
            }
        }

        Commands::Match { artist, title, year, create } => {
            let matcher = EntityMatcher::new(&db);
            match matcher.match_album(&title, &artist, create, year).context("Match failed")? {
                Some(album) => {
                    println!("Album #{}: {}", album.id, album.title);
                    println!("  normalized:   {}", album.normalized_title);
                    if let Some(y) = album.release_year {
                        println!("  release year: {y}");
                    }
                    if !album.genres.is_empty() {
                        println!("  genres:       {}", album.genres.join(", "));
                    }
                }
                None => println!("No match for \"{title}\" by {artist}."),
            }
        }

        Commands::ParseScore { text, source } => {
            match musicscout::extract::score::parse_score(&text, &source) {
                Some(p) => {
                    println!("Score:      {:.2}/10", p.normalized_score);
                    println!("Raw:        {}", p.raw_text);
                    println!("Format:     {}", p.format.as_str());
                    println!("Confidence: {:.2} ({})", p.confidence, p.confidence_reason());
                    if let Some(subs) = &p.sub_scores {
                        for (name, value) in subs {
                            println!("  {name:<14} {value:.1}");
                        }
                    }
                }
                None => println!("No score found."),
            }
        }

        Commands::Enrich { limit, dry_run } => {
            if dry_run {
                println!("DRY RUN: no changes will be written to the database");
            }
            let provider = CascadingProvider::from_config(&config.metadata);
            let result = musicscout::metadata::enrich_albums(&db, &provider, limit, dry_run)
                .context("Enrichment failed")?;
            println!(
                "Enrichment complete: {} checked, {} enriched, {} not found",
                result.checked, result.enriched, result.not_found
            );
            if dry_run && result.enriched > 0 {
                println!("(dry run, re-run without --dry-run to write changes)");
            }
        }

        Commands::Stats => {
            let stats = db.stats().context("Failed to get stats")?;
            println!("Catalog Statistics");
            println!("==================");
            println!("Sources:          {}", stats.total_sources);
            println!("Articles:         {}", stats.total_items);
            println!("Reviews:          {}", stats.total_reviews);
            println!("Scored reviews:   {}", stats.scored_reviews);
            println!("Artists:          {}", stats.total_artists);
            println!("Albums:           {}", stats.total_albums);
            println!("  with metadata:  {}", stats.albums_with_metadata);
            println!("Aggregates:       {}", stats.total_aggregates);
        }
    }

    Ok(())
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let head: String = s.chars().take(width - 3).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

/// Print aggregates with album and artist names.
fn print_aggregate_table(db: &Database, aggregates: &[AlbumReviewAggregate]) -> Result<()> {
    println!(
        "{:<28} {:<22} {:>3} {:>5} {:>5} {:>5} {:>5} {:>10}",
        "Album", "Artist", "N", "Avg", "Wtd", "Cons", "Ctrv", "Latest"
    );
    println!("{}", "-".repeat(90));

    for a in aggregates {
        let album = db.get_album(a.album_id).context("Query failed")?;
        let (title, artist) = match album {
            Some(album) => {
                let artist = db.get_artist(album.artist_id)
                    .context("Query failed")?
                    .map(|ar| ar.name)
                    .unwrap_or_default();
                (album.title, artist)
            }
            None => (format!("#{}", a.album_id), String::new()),
        };

        println!(
            "{:<28} {:<22} {:>3} {:>5.2} {:>5.2} {:>5.2} {:>5.2} {:>10}",
            truncate(&title, 28),
            truncate(&artist, 22),
            a.review_count,
            a.average_score,
            a.weighted_average,
            a.consensus_strength,
            a.controversy_score,
            a.latest_review_date
                .map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d").to_string()),
        );
    }

    println!();
    println!("N=Reviews  Avg=Mean  Wtd=Source-weighted  Cons=Consensus  Ctrv=Controversy");
    Ok(())
}
