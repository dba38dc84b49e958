use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use genre_harvest::aggregator::{DEFAULT_PER_PLAYLIST_CAP, DEFAULT_QUOTA, DEFAULT_RETRY_BUDGET};
use genre_harvest::config::{parse_genres, HarvestConfig, DEFAULT_GENRE};
use genre_harvest::harvest::{run_harvest, Services};
use genre_harvest::playlist_source::{DEFAULT_CANDIDATES, DEFAULT_SAMPLE_SIZE};
use genre_harvest::progress::{format_duration, genre_line, set_log_only};
use genre_harvest::reccobeats::ReccoBeatsClient;
use genre_harvest::safety::validate_config;
use genre_harvest::spotify::SpotifyClient;

#[derive(Parser)]
#[command(name = "genre-harvest")]
#[command(about = "Harvest per-genre tracks with audio features into a SQLite store")]
struct Args {
    /// SQLite store (created if missing)
    #[arg(default_value = "tracks.sqlite3")]
    store: PathBuf,

    /// Comma-separated genres to harvest
    #[arg(long, default_value = DEFAULT_GENRE)]
    genres: String,

    #[arg(long, env = "CLIENT_ID", hide_env_values = true)]
    client_id: String,

    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    client_secret: String,

    /// Target number of stored tracks per genre
    #[arg(long, default_value_t = DEFAULT_QUOTA)]
    quota: usize,

    /// Playlists requested per genre search
    #[arg(long, default_value_t = DEFAULT_CANDIDATES)]
    candidates: usize,

    /// Tracks sampled from each visited playlist
    #[arg(long, default_value_t = DEFAULT_SAMPLE_SIZE)]
    sample_size: usize,

    /// New tracks accepted from a single playlist visit
    #[arg(long, default_value_t = DEFAULT_PER_PLAYLIST_CAP)]
    per_playlist_cap: usize,

    /// Playlist visits allowed per genre
    #[arg(long, default_value_t = DEFAULT_RETRY_BUDGET)]
    retry_budget: usize,

    /// Wait after a Spotify 429 without Retry-After
    #[arg(long, default_value = "5")]
    spotify_backoff_secs: u64,

    /// Wait after a ReccoBeats 429 without Retry-After
    #[arg(long, default_value = "5")]
    recco_backoff_secs: u64,

    /// Keep search order instead of shuffling candidates
    #[arg(long)]
    no_shuffle: bool,

    /// Seed for playlist choice and sampling (reproducible runs)
    #[arg(long)]
    seed: Option<u64>,

    /// Genres harvested in parallel
    #[arg(long, default_value = "1")]
    workers: usize,

    /// Hide progress bars and print one line per finished genre
    #[arg(long)]
    log_only: bool,

    /// Write run statistics as JSON to this file
    #[arg(long)]
    stats_json: Option<PathBuf>,
}

impl Args {
    fn to_config(&self) -> HarvestConfig {
        HarvestConfig {
            store_path: self.store.clone(),
            genres: parse_genres(&self.genres),
            quota: self.quota,
            candidates: self.candidates,
            sample_size: self.sample_size,
            per_playlist_cap: self.per_playlist_cap,
            retry_budget: self.retry_budget,
            spotify_backoff: Duration::from_secs(self.spotify_backoff_secs),
            recco_backoff: Duration::from_secs(self.recco_backoff_secs),
            shuffle: !self.no_shuffle,
            seed: self.seed,
            workers: self.workers.max(1),
        }
    }
}

fn main() -> Result<()> {
    // A missing .env is fine; credentials may come from the environment or flags
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    set_log_only(args.log_only);

    let config = args.to_config();
    validate_config(&config)?;

    let services = Services {
        playlists: Arc::new(
            SpotifyClient::new(&args.client_id, &args.client_secret)
                .context("Failed to create Spotify client")?,
        ),
        features: Arc::new(ReccoBeatsClient::new().context("Failed to create ReccoBeats client")?),
    };

    eprintln!(
        "[PHASE] Harvesting {} genre(s) into {:?} (quota {}, budget {}, workers {})",
        config.genres.len(),
        config.store_path,
        config.quota,
        config.retry_budget,
        config.workers
    );

    let stats = run_harvest(&config, &services)?;
    stats.log_summary();

    println!("\n{:=<60}", "");
    println!("Harvest complete!");
    for report in &stats.genres {
        println!("  {}", genre_line(report));
    }
    for failure in &stats.failures {
        println!("  {}: FAILED ({})", failure.genre, failure.error);
    }
    println!("  Genres at quota: {}/{}", stats.saturated_genres(), config.genres.len());
    println!("  New tracks: {}", stats.total_new_tracks);
    println!("  Attempts: {}", stats.total_attempts);
    println!(
        "  Elapsed: {}",
        format_duration(Duration::from_secs_f64(stats.elapsed_seconds))
    );
    println!("{:=<60}", "");

    if let Some(path) = &args.stats_json {
        stats
            .write_to_file(path)
            .with_context(|| format!("Failed to write stats to {:?}", path))?;
        eprintln!("[STATS] Written to {:?}", path);
    }

    if !stats.failures.is_empty() {
        bail!("{} genre(s) failed", stats.failures.len());
    }

    Ok(())
}
