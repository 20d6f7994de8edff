use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chordex::config::AppConfig;
use chordex::context::AppContext;
use chordex::index::{inspect_chunk, IndexReport, Indexer};
use chordex::query::{open_store, SearchRequest};
use clap::{Args, Parser, Subcommand};
use tracing::Level;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);
    match cli.execute() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("chordex error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

#[derive(Parser, Debug)]
#[command(name = "chordex", about = "Chord index builder and search server for MIDI corpora")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct GlobalArgs {
    /// JSON configuration file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the index directory.
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,
    /// Override the MIDI corpus root.
    #[arg(long, global = true)]
    media_root: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

impl GlobalArgs {
    fn load_config(&self) -> AppConfig {
        let config = match &self.config {
            Some(path) => AppConfig::load_from_file(path),
            None => AppConfig::default(),
        };
        config.with_overrides(self.index_dir.clone(), self.media_root.clone())
    }
}

impl Cli {
    fn execute(self) -> Result<()> {
        let config = self.global.load_config();
        match self.command {
            Command::Index(args) => index_command(config, args),
            Command::Serve(args) => serve_command(config, args),
            Command::Search(args) => search_command(config, args),
            Command::Report(args) => report_command(config, args),
            Command::Inspect(args) => inspect_command(args),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild the chord index from the media root.
    Index(IndexArgs),
    /// Serve search, file and excerpt endpoints over HTTP.
    Serve(ServeArgs),
    /// Look up one chord and print the response JSON.
    Search(SearchArgs),
    /// Summarize bucket and chunk files in the index directory.
    Report(OutputArgs),
    /// List the keys stored in one chunk file.
    Inspect(InspectArgs),
}

#[derive(Args, Debug, Clone)]
struct OutputArgs {
    /// Print JSON instead of text.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug, Clone)]
struct IndexArgs {
    #[command(flatten)]
    output: OutputArgs,
    /// Keep bucket shards after chunking.
    #[arg(long, default_value_t = false)]
    keep_buckets: bool,
}

#[derive(Args, Debug, Clone)]
struct ServeArgs {
    /// Host interface; overrides the configured one.
    #[arg(long)]
    host: Option<String>,
    /// Port; overrides the configured one.
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Args, Debug, Clone)]
struct SearchArgs {
    /// MIDI note numbers of the chord, in any order.
    #[arg(required = true, num_args = 1..)]
    notes: Vec<u8>,
    /// First file group of the page.
    #[arg(long, default_value_t = 0)]
    start: usize,
}

#[derive(Args, Debug, Clone)]
struct InspectArgs {
    #[command(flatten)]
    output: OutputArgs,
    /// Chunk file to inspect.
    chunk: PathBuf,
}

fn index_command(mut config: AppConfig, args: IndexArgs) -> Result<()> {
    if args.keep_buckets {
        config.indexing.delete_buckets = false;
    }
    let metadata = open_store(config.storage.metadata_path.as_deref())
        .context("opening metadata store")?;
    let summary = Indexer::new(config.storage, config.indexing, metadata)
        .run()
        .context("indexing media root")?;

    if args.output.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("serializing index summary")?
        );
    } else {
        println!(
            "indexed {} of {} files ({} skipped): {} chords in {} chunks, {} ms",
            summary.files_indexed,
            summary.files_found,
            summary.files_skipped,
            summary.chords,
            summary.chunks,
            summary.elapsed_ms
        );
    }
    Ok(())
}

#[cfg(feature = "http")]
fn serve_command(mut config: AppConfig, args: ServeArgs) -> Result<()> {
    use std::net::{IpAddr, SocketAddr};
    use std::sync::Arc;

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    let ip: IpAddr = config
        .server
        .host
        .parse()
        .with_context(|| format!("parsing host {:?}", config.server.host))?;
    let addr = SocketAddr::new(ip, config.server.port);

    let ctx = Arc::new(AppContext::load(config).context("loading index")?);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    runtime.block_on(chordex::http::run_http_server(ctx, addr))
}

#[cfg(not(feature = "http"))]
fn serve_command(_config: AppConfig, _args: ServeArgs) -> Result<()> {
    anyhow::bail!("chordex serve requires the http feature");
}

fn search_command(config: AppConfig, args: SearchArgs) -> Result<()> {
    let ctx = AppContext::load(config).context("loading index")?;
    let response = ctx
        .search(&SearchRequest::single(args.notes), args.start)
        .context("searching index")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&response).context("serializing search response")?
    );
    Ok(())
}

fn report_command(config: AppConfig, args: OutputArgs) -> Result<()> {
    let dir = &config.storage.index_dir;
    let report = IndexReport::collect(dir)
        .with_context(|| format!("collecting report for {}", dir.display()))?;
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serializing report")?
        );
    } else {
        println!("{}", report);
    }
    Ok(())
}

fn inspect_command(args: InspectArgs) -> Result<()> {
    let inspection = inspect_chunk(&args.chunk)
        .with_context(|| format!("inspecting {}", args.chunk.display()))?;
    if args.output.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&inspection).context("serializing inspection")?
        );
    } else {
        print!("{}", inspection);
    }
    Ok(())
}
