use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use jiten_config::Config;
use jiten_dictionary::DictionaryDatabase;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jiten", about = "Inspect and maintain the dictionary store")]
struct Cli {
    /// Store file to operate on (defaults to JITEN_DB_PATH or ./jiten.redb)
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List installed dictionaries
    Info,
    /// Show per-store row counts
    Counts {
        /// Dictionary titles to count (all installed when omitted)
        titles: Vec<String>,
        /// Include a grand-total group
        #[arg(long)]
        total: bool,
    },
    /// Delete one dictionary and all of its rows
    Delete { title: String },
    /// Delete the whole store and start fresh
    Purge,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::new();
    if let Some(db) = cli.db {
        config.database.path = db;
    }

    let db = DictionaryDatabase::new(&config);
    db.prepare()
        .await
        .context("failed to open the dictionary store")?;
    tracing::debug!(path = %config.database.path.display(), "dictionary store ready");

    match cli.command {
        Command::Info => {
            let info = db.get_dictionary_info().await?;
            if info.is_empty() {
                println!("no dictionaries installed");
            }
            for summary in info {
                println!(
                    "{} (revision {}, format {})",
                    summary.title, summary.revision, summary.version
                );
            }
        }
        Command::Counts { titles, total } => {
            let titles = if titles.is_empty() {
                let info = db.get_dictionary_info().await?;
                info.into_iter().map(|summary| summary.title).collect()
            } else {
                titles
            };
            let counts = db.get_dictionary_counts(&titles, total).await?;
            if let Some(total) = counts.total {
                print_counts("total", &total);
            }
            for (title, group) in titles.iter().zip(&counts.counts) {
                print_counts(title, group);
            }
        }
        Command::Delete { title } => {
            let rate = config.media.delete_progress_rate;
            db.delete_dictionary(
                &title,
                rate,
                Box::new(|progress| {
                    eprintln!(
                        "deleting: {}/{} rows, {}/{} stores",
                        progress.processed,
                        progress.count,
                        progress.stores_processed,
                        progress.store_count
                    );
                }),
            )
            .await
            .with_context(|| format!("failed to delete dictionary {title}"))?;
            println!("deleted {title}");
        }
        Command::Purge => {
            let deleted = db.purge().await.context("purge failed")?;
            if deleted {
                println!("store deleted and reinitialized");
            } else {
                println!("store file could not be deleted; reinitialized anyway");
            }
        }
    }

    Ok(())
}

fn print_counts(label: &str, counts: &jiten_dictionary::StoreCounts) {
    println!(
        "{label}: {} terms, {} term meta, {} kanji, {} kanji meta, {} tags, {} media",
        counts.terms, counts.term_meta, counts.kanji, counts.kanji_meta, counts.tag_meta, counts.media
    );
}
