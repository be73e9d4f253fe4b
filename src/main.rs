mod canonical;
mod config;
mod error;
mod extract;
mod fetcher;
mod generator;
mod pipeline;
mod store;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::config::{parse_class_list, GeneratorConfig, ScrapeConfig};
use crate::generator::{generate_markets, GeminiGenerator, MARKET_HEADERS};
use crate::pipeline::{Pipeline, DESCRIPTOR_HEADER, RECORD_HEADER};
use crate::store::{read_entities, AppendStore};

#[derive(Parser, Debug)]
#[command(name = "market-images")]
#[command(about = "Find a representative image for every farmers' market in a CSV", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search images for each entity and append one row per match
    Images {
        /// CSV to read entity names from
        #[arg(short, long, default_value = "farmers_markets.csv")]
        input: PathBuf,

        /// Column holding the entity name
        #[arg(short, long, default_value = "market_name")]
        column: String,

        /// Append-only CSV that receives the matched images
        #[arg(short, long, default_value = "img_link_row.csv")]
        output: PathBuf,

        /// Result links to inspect per entity
        #[arg(long)]
        max_results: Option<usize>,

        /// Minimum delay between requests, in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Per-request timeout, in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Comma-separated anchor classes identifying image results
        #[arg(long)]
        fingerprint: Option<String>,

        /// Also write every scraped image descriptor to a timestamped CSV in this directory
        #[arg(long)]
        dump_descriptors: Option<PathBuf>,
    },

    /// Generate market listings with Gemini and append them to a CSV
    Generate {
        #[arg(short, long, default_value = "farmers_markets.csv")]
        output: PathBuf,

        #[arg(long, default_value = "California")]
        state: String,

        /// County to generate listings for (repeatable)
        #[arg(long = "county", required = true)]
        counties: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    match Cli::parse().command {
        Command::Images {
            input,
            column,
            output,
            max_results,
            delay_ms,
            timeout_secs,
            fingerprint,
            dump_descriptors,
        } => {
            let mut config = ScrapeConfig::from_env();
            if let Some(n) = max_results {
                config.max_results = n;
            }
            if let Some(ms) = delay_ms {
                config.politeness_delay = Duration::from_millis(ms);
            }
            if let Some(secs) = timeout_secs {
                config.timeout = Duration::from_secs(secs);
            }
            if let Some(classes) = fingerprint.map(|s| parse_class_list(&s)).filter(|c| !c.is_empty()) {
                config.fingerprint = classes;
            }

            let entities = read_entities(&input, &column)
                .with_context(|| format!("reading entities from {}", input.display()))?;

            let mut store = AppendStore::open(&output, &RECORD_HEADER)
                .with_context(|| format!("opening output {}", output.display()))?;

            let mut dump = match dump_descriptors {
                Some(dir) => {
                    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
                    let path = dir.join(format!("yahoo_images_{stamp}.csv"));
                    info!(path = %path.display(), "dumping image descriptors");
                    Some(
                        AppendStore::open(&path, &DESCRIPTOR_HEADER)
                            .with_context(|| format!("opening descriptor dump {}", path.display()))?,
                    )
                }
                None => None,
            };

            let mut pipeline = Pipeline::new(config)?;
            let summary = pipeline.run(&entities, &mut store, dump.as_mut()).await;

            info!(
                recorded = summary.recorded,
                skipped = summary.skipped.len(),
                rows = store.rows_written(),
                output = %store.path().display(),
                "run finished"
            );
        }

        Command::Generate { output, state, counties } => {
            let generator = GeminiGenerator::new(GeneratorConfig::from_env())?;
            let mut store = AppendStore::open(&output, &MARKET_HEADERS)
                .with_context(|| format!("opening output {}", output.display()))?;

            let summary = generate_markets(&generator, &state, &counties, &mut store).await;
            info!(
                rows = summary.rows,
                failed = summary.failed.len(),
                output = %store.path().display(),
                "generation finished"
            );
        }
    }

    Ok(())
}
