//! Summarize a harvest store: tracks per genre, tracks still waiting for an
//! embedding, and a duplicate-id check.
//!
//! Usage: harvest-report <tracks.sqlite3> [--quota N]

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

use genre_harvest::aggregator::DEFAULT_QUOTA;
use genre_harvest::store::SqliteTrackStore;

#[derive(Parser)]
#[command(name = "harvest-report")]
#[command(about = "Report per-genre document counts in a harvest store")]
struct Args {
    store: PathBuf,

    /// Quota the counts are compared against
    #[arg(long, default_value_t = DEFAULT_QUOTA)]
    quota: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if !args.store.is_file() {
        bail!("Store {:?} does not exist", args.store);
    }
    let store = SqliteTrackStore::open(&args.store)?;

    let counts = store.genre_counts()?;
    let total = store.total_documents()?;

    println!("{:=<60}", "");
    println!("{:<30} {:>8} {:>8} {:>10}", "Genre", "Tracks", "Quota", "No embed");
    println!("{:-<60}", "");
    for count in &counts {
        let marker = if count.documents >= args.quota { "" } else { " *" };
        println!(
            "{:<30} {:>8} {:>8} {:>10}{}",
            count.genre, count.documents, args.quota, count.missing_embeddings, marker
        );
    }
    println!("{:-<60}", "");

    let below = counts.iter().filter(|c| c.documents < args.quota).count();
    let missing: usize = counts.iter().map(|c| c.missing_embeddings).sum();
    println!("  Genres: {} ({} below quota, marked *)", counts.len(), below);
    println!("  Tracks: {}", total);
    println!("  Missing embeddings: {}", missing);

    let dupes = store.duplicate_ids()?;
    if dupes.is_empty() {
        println!("  Duplicate ids: none");
    } else {
        println!("  Duplicate ids: {}", dupes.len());
        for (id, n) in dupes.iter().take(20) {
            println!("    {} x{}", id, n);
        }
    }
    println!("{:=<60}", "");

    if !dupes.is_empty() {
        bail!("{} track ids are stored more than once", dupes.len());
    }

    Ok(())
}
