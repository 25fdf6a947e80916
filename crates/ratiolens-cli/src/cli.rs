//! Command-line surface for ratiolens.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `analyze` | Full report: ratios, health score, peers, market status |
//! | `ratios` | Aggregated ratios with provenance |
//! | `peers` | Peer comparison only |
//! | `quote` | Live quote, or stored quote history with `--history-days` |
//! | `history` | Daily price history |
//! | `overview` | Sector gainers, losers and high-volume listings |
//! | `quotes` | Batch quotes with per-symbol failures |
//! | `market` | Exchange session status |
//! | `sql` | Query the local DuckDB warehouse |
//!
//! ```bash
//! ratiolens analyze TD --pretty
//! ratiolens peers SHOP --peers TD,RY --limit 2
//! ratiolens overview --sector "Financial Services"
//! ratiolens quotes TD,RY,SHOP
//! ratiolens sql "SELECT * FROM v_latest_ratios WHERE symbol = 'TD'"
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "ratiolens",
    author,
    version,
    about = "Financial ratio aggregation and health scoring",
    long_about = "ratiolens pulls financial ratios for exchange-listed equities from several \
providers with retry and fallback, scores overall financial health, and ranks a company \
against its peers.\n\
\n\
Use 'ratiolens <command> --help' for command-specific help."
)]
pub struct Cli {
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Read fresh results from and write results to the local warehouse.
    #[arg(long, global = true, default_value_t = false)]
    pub persist: bool,

    /// Emit logs on stderr as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    /// Human-readable summary followed by the JSON payload.
    Table,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Assemble a full financial-health report.
    Analyze(AnalyzeArgs),
    /// Fetch aggregated ratios.
    Ratios(SymbolArgs),
    /// Compare a company with its peers.
    Peers(PeerArgs),
    /// Fetch a quote or read stored quote history.
    Quote(QuoteArgs),
    /// Fetch daily price history.
    History(HistoryArgs),
    /// Summarize gainers, losers and volume across a sector.
    Overview(OverviewArgs),
    /// Quote several symbols at once.
    Quotes(QuotesArgs),
    /// Show exchange session status.
    Market,
    /// Execute a read-only SQL query against the local warehouse.
    Sql(SqlArgs),
}

#[derive(Debug, Args)]
pub struct SymbolArgs {
    /// Ticker, with or without venue suffix (TD, TD.TO, td.trt).
    pub symbol: String,
}

#[derive(Debug, Args)]
pub struct PeerSelectionArgs {
    /// Explicit comma-separated peer list.
    #[arg(long, value_delimiter = ',', conflicts_with = "sector")]
    pub peers: Vec<String>,

    /// Sector to draw peers from; detected from the universe when omitted.
    #[arg(long)]
    pub sector: Option<String>,

    #[arg(long, default_value_t = 3)]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    pub symbol: String,

    #[command(flatten)]
    pub selection: PeerSelectionArgs,

    /// Skip peer comparison.
    #[arg(long, default_value_t = false)]
    pub no_peers: bool,
}

#[derive(Debug, Args)]
pub struct PeerArgs {
    pub symbol: String,

    #[command(flatten)]
    pub selection: PeerSelectionArgs,
}

#[derive(Debug, Args)]
pub struct QuoteArgs {
    pub symbol: String,

    /// Read stored quotes from the last N days instead of fetching.
    #[arg(long)]
    pub history_days: Option<u32>,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    pub symbol: String,

    #[arg(long, default_value_t = 30)]
    pub days: u32,
}

#[derive(Debug, Args)]
pub struct OverviewArgs {
    /// Universe sector, or "major" for every listing.
    #[arg(long, default_value = "major")]
    pub sector: String,
}

#[derive(Debug, Args)]
pub struct QuotesArgs {
    /// Tickers, comma or space separated.
    #[arg(required = true, num_args = 1.., value_delimiter = ',')]
    pub symbols: Vec<String>,
}

#[derive(Debug, Args)]
pub struct SqlArgs {
    pub query: String,

    #[arg(long, default_value_t = 10_000)]
    pub max_rows: usize,

    #[arg(long, default_value_t = 5_000)]
    pub query_timeout_ms: u64,
}
