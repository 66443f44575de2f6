use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use livelist_spider::listing::{run_listing, ListingConfig, OutputFormat, WriterSink};
use livelist_spider::logging::init_tracing;
use livelist_spider::util::env;
use livelist_spider::videos::{run_video_scrape, VideoConfig};

#[derive(Parser, Debug)]
#[command(name = "spider", version, about = "Live listing enumerator and video scraper")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Enumerate every listing page and emit each game and streamer once
    Users {
        /// Override LISTING_BASE_URL
        #[arg(long)]
        base_url: Option<String>,
        /// Cap on concurrent page requests (0 = one request per page at once)
        #[arg(long)]
        max_concurrency: Option<usize>,
        /// Output format: sql, text or jsonl
        #[arg(long)]
        format: Option<OutputFormat>,
        /// Write records to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        /// Hand the discovery copy of page 1 to the fanout instead of fetching it again
        #[arg(long, default_value_t = false)]
        reuse_first_page: bool,
    },
    /// Scrape the video listing of one streamer
    Videos {
        /// Streamer uid
        #[arg(long, default_value_t = 0)]
        uid: i64,
        /// Output directory for downloaded videos
        #[arg(long, default_value = "videos")]
        out: PathBuf,
        /// Override VIDEO_PAGE_SIZE
        #[arg(long)]
        page_size: Option<u32>,
    },
    #[command(external_subcommand)]
    Other(Vec<String>),
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    init_tracing("info")?;

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Users {
            base_url,
            max_concurrency,
            format,
            output,
            reuse_first_page,
        }) => {
            let mut cfg = ListingConfig::from_env();
            if let Some(url) = base_url {
                cfg.base_url = url;
            }
            if let Some(n) = max_concurrency {
                cfg.max_concurrency = (n > 0).then_some(n);
            }
            if let Some(format) = format {
                cfg.output_format = format;
            }
            if reuse_first_page {
                cfg.refetch_first_page = false;
            }

            let out: Box<dyn Write + Send> = match &output {
                Some(path) => Box::new(BufWriter::new(
                    File::create(path)
                        .with_context(|| format!("failed to create {}", path.display()))?,
                )),
                None => Box::new(BufWriter::new(io::stdout())),
            };
            let mut sink = WriterSink::new(out, cfg.output_format);
            run_listing(&cfg, &mut sink).await?;
        }
        Some(Commands::Videos {
            uid,
            out,
            page_size,
        }) => {
            let mut cfg = VideoConfig::from_env();
            if let Some(n) = page_size {
                cfg.page_size = n.max(1);
            }
            run_video_scrape(&cfg, uid, &out).await?;
        }
        Some(Commands::Other(_)) | None => println!("unrecognized command"),
    }
    Ok(())
}
