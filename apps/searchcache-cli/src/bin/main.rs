use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use searchcache_core::{Config, LiveSearch, Payload};
use searchcache_embed::get_default_embedder;
use searchcache_resolver::{CacheInfo, CommandLiveSearch, SemanticCache};

#[derive(Parser)]
#[command(name = "searchcache", about = "Semantic cache in front of a live web search")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a query from the cache or the live search
    Resolve {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
        /// Print the payload as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show what the cache currently holds
    Info,
}

/// Stand-in when no live search command is configured: every miss fails.
struct Unconfigured;

impl LiveSearch for Unconfigured {
    fn perform_live_search(&self, _query: &str) -> Payload {
        Payload::from_error("no live search command configured (cache.live_search_command)")
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_payload(payload: &Payload) {
    for (key, value) in payload.sections() {
        println!("== {key} ==");
        println!("{value}");
        println!();
    }
    if let Some(error) = payload.error() {
        println!("error: {error}");
    }
    if let Some(status) = payload.status() {
        println!("status: {status}");
    }
}

fn print_info(info: &CacheInfo) {
    println!("directory:    {}", info.directory.display());
    println!("model:        {}", info.model);
    println!("dimension:    {}", info.dimension);
    println!("threshold:    {}", info.threshold);
    println!("indexed rows: {} ({} retired)", info.items, info.retired);
    println!("entry files:  {}", info.entry_files);
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let settings = config.cache_settings()?;

    match cli.command {
        Command::Resolve { query, json } => {
            let embedder = get_default_embedder(&settings)?;
            let live: Box<dyn LiveSearch> = match settings
                .live_search_command
                .as_deref()
                .and_then(CommandLiveSearch::from_command_line)
            {
                Some(command) => Box::new(command),
                None => {
                    tracing::warn!("cache.live_search_command is not set; cache misses will fail");
                    Box::new(Unconfigured)
                }
            };
            let cache = SemanticCache::open(&settings, embedder, live)?;
            let resolution = cache.resolve(&query.join(" "))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&resolution.payload)?);
            } else {
                print_payload(&resolution.payload);
            }
        }
        Command::Info => print_info(&CacheInfo::inspect(&settings)?),
    }
    Ok(())
}
