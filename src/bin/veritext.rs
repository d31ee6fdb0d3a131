//! Veritext CLI — text originality analysis with search history.
//!
//! Usage:
//!   veritext analyze --user alice --text "..." [--paraphrasing]
//!   veritext history --user alice [--page 0] [--size 10]
//!   veritext sources --user alice <record-id>
//!   veritext stats --user alice | veritext stats --system --user alice
//!   veritext identity add alice
//!   veritext cleanup --days 90

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use veritext::{
    AnalysisRecord, AnalysisRequest, EngineConfig, HistoryStore, Identity, OpenHistory, RecordId,
    SqliteHistory, StoreResolver, SubprocessEngine, VeritextApi,
};

#[derive(Parser)]
#[command(
    name = "veritext",
    version,
    about = "Text originality analysis with durable search history"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a block of text for similarity and AI authorship
    Analyze {
        /// Principal to run the analysis as
        #[arg(long)]
        user: String,
        /// Text to analyze
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,
        /// Read the text from a file instead
        #[arg(long)]
        file: Option<PathBuf>,
        /// Also request paraphrase detection
        #[arg(long)]
        paraphrasing: bool,
        /// Engine interpreter or executable
        #[arg(long, default_value = "python3")]
        engine: String,
        /// Engine script passed as the first argument
        #[arg(long, default_value = "ai_service/similarity.py")]
        engine_script: PathBuf,
        /// Engine timeout in seconds
        #[arg(long, default_value_t = 60)]
        timeout: u64,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show analysis history, newest first
    History {
        /// Principal whose history to show
        #[arg(long)]
        user: String,
        /// Zero-based page number
        #[arg(long, default_value_t = 0)]
        page: u32,
        /// Records per page
        #[arg(long, default_value_t = 10)]
        size: u32,
    },
    /// Show the matched sources of one record
    Sources {
        /// Principal owning the record
        #[arg(long)]
        user: String,
        /// Record id (shown by `history`)
        record_id: String,
    },
    /// Show per-user or system-wide statistics
    Stats {
        /// Principal to compute statistics for
        #[arg(long)]
        user: String,
        /// Show system-wide source-reuse statistics instead
        #[arg(long)]
        system: bool,
    },
    /// Manage identities
    Identity {
        #[command(subcommand)]
        action: IdentityAction,
    },
    /// Delete records older than a number of days
    Cleanup {
        /// Keep records newer than this many days
        #[arg(long)]
        days: u32,
    },
}

#[derive(Subcommand)]
enum IdentityAction {
    /// Register a new identity
    Add {
        /// Username for the new identity
        name: String,
    },
    /// List all identities
    List,
}

/// Get the default database path (~/.local/share/veritext/veritext.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("veritext").join("veritext.db")
}

fn open_store(db: Option<PathBuf>) -> Result<Arc<SqliteHistory>, String> {
    let db_path = db.unwrap_or_else(default_db_path);
    let store =
        SqliteHistory::open(&db_path).map_err(|e| format!("failed to open database: {e}"))?;
    Ok(Arc::new(store))
}

fn build_api(store: Arc<SqliteHistory>, config: EngineConfig) -> VeritextApi {
    let engine = Arc::new(SubprocessEngine::new(config));
    let resolver = Arc::new(StoreResolver::new(store.clone()));
    VeritextApi::new(engine, store, resolver)
}

fn print_record_row(record: &AnalysisRecord) {
    let score = record
        .similarity_score
        .map(|s| format!("{s:.1}"))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:<36}  {:<19}  {:<9}  {:>6}  {:>7}",
        record.id,
        record.created_at.format("%Y-%m-%d %H:%M:%S"),
        record.status,
        score,
        record.sources_found,
    );
}

async fn cmd_analyze(
    api: &VeritextApi,
    user: &str,
    text: String,
    paraphrasing: bool,
    json: bool,
) -> i32 {
    let request = AnalysisRequest::new(text).with_paraphrasing(paraphrasing);
    match api.analyze(user, request).await {
        Ok(report) => {
            if json {
                match serde_json::to_string_pretty(&report) {
                    Ok(rendered) => println!("{rendered}"),
                    Err(e) => {
                        eprintln!("Error: {e}");
                        return 1;
                    }
                }
                return 0;
            }

            println!("Record:      {}", report.record_id);
            println!("Similarity:  {:.1}%", report.similarity_score);
            println!(
                "AI detected: {} (confidence {:.1}%)",
                if report.ai_detected { "yes" } else { "no" },
                report.ai_confidence
            );
            println!("Elapsed:     {} ms", report.processing_time_ms);
            if let Some(paraphrased) = &report.paraphrased_text {
                println!("Paraphrased: {paraphrased}");
            }
            if report.matched_sources.is_empty() {
                println!("No similar sources found.");
            } else {
                println!("Sources ({}):", report.matched_sources.len());
                for source in &report.matched_sources {
                    println!(
                        "  {:>5.1}%  {}  ({})",
                        source.similarity_percentage, source.url, source.domain
                    );
                }
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    }
}

fn cmd_history(api: &VeritextApi, user: &str, page: u32, size: u32) -> i32 {
    match api.history(user, page, size) {
        Ok(result) => {
            if result.records.is_empty() {
                println!("No analysis history.");
                return 0;
            }
            println!(
                "{:<36}  {:<19}  {:<9}  {:>6}  {:>7}",
                "ID", "DATE", "STATUS", "SCORE", "SOURCES"
            );
            println!("{}", "-".repeat(86));
            for record in &result.records {
                print_record_row(record);
            }
            println!(
                "Page {} of {} ({} records total)",
                result.page + 1,
                result.total_pages().max(1),
                result.total
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    }
}

fn cmd_sources(api: &VeritextApi, user: &str, record_id: &str) -> i32 {
    let record_id = RecordId::from_string(record_id);
    match api.record_sources(user, &record_id) {
        Ok(sources) => {
            if sources.is_empty() {
                println!("No matched sources for this record.");
                return 0;
            }
            println!("{:<7}  {:<24}  {}", "MATCH", "DOMAIN", "URL");
            println!("{}", "-".repeat(80));
            for source in &sources {
                println!(
                    "{:>6.1}%  {:<24}  {}",
                    source.similarity_percentage, source.domain, source.url
                );
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    }
}

fn cmd_stats(api: &VeritextApi, user: &str, system: bool) -> i32 {
    if system {
        return match api.system_statistics(user) {
            Ok(stats) => {
                println!("System statistics");
                println!("=================");
                println!();
                println!("Most common source domains:");
                if stats.common_domains.is_empty() {
                    println!("  (none)");
                }
                for entry in &stats.common_domains {
                    println!("  {:<32} {:>6}", entry.domain, entry.count);
                }
                println!();
                println!("Sources matched by more than one analysis:");
                if stats.duplicate_sources.is_empty() {
                    println!("  (none)");
                }
                for entry in &stats.duplicate_sources {
                    println!("  {:<56} {:>6}", entry.url, entry.count);
                }
                0
            }
            Err(e) => {
                eprintln!("Error: {e}");
                1
            }
        };
    }

    match api.user_statistics(user) {
        Ok(stats) => {
            println!("Statistics for {user}");
            println!("==================={}", "=".repeat(user.len()));
            println!();
            println!("  Total searches:     {}", stats.total_searches);
            println!("  Average similarity: {:.1}%", stats.average_similarity);
            println!("  Last 7 days:        {}", stats.recent_searches);
            println!("  High similarity:    {}", stats.high_similarity_searches);
            println!("  Failed:             {}", stats.failed_searches);
            println!("  Success rate:       {:.2}%", stats.success_rate);
            if !stats.common_queries.is_empty() {
                println!();
                println!("  Most common queries:");
                for entry in &stats.common_queries {
                    let flat = entry.query.replace('\n', " ");
                    let mut preview: String = flat.chars().take(48).collect();
                    if preview.len() < flat.len() {
                        preview.push_str("...");
                    }
                    println!("    {:>4}x  {}", entry.count, preview);
                }
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    }
}

fn cmd_identity_add(store: &SqliteHistory, name: &str) -> i32 {
    let identity = Identity::new(name);
    match store.insert_identity(&identity) {
        Ok(()) => {
            println!("Created identity '{}' ({})", name, identity.id);
            0
        }
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    }
}

fn cmd_identity_list(store: &SqliteHistory) -> i32 {
    match store.list_identities() {
        Ok(identities) => {
            if identities.is_empty() {
                println!("No identities registered.");
                return 0;
            }
            println!("{:<36}  {:<24}  {}", "ID", "USERNAME", "CREATED");
            println!("{}", "-".repeat(82));
            for identity in identities {
                println!(
                    "{:<36}  {:<24}  {}",
                    identity.id,
                    identity.username,
                    identity.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    }
}

fn cmd_cleanup(api: &VeritextApi, days: u32) -> i32 {
    match api.cleanup(days) {
        Ok(deleted) => {
            println!("Deleted {deleted} record(s) older than {days} day(s).");
            0
        }
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    }
}

fn read_text(text: Option<String>, file: Option<PathBuf>) -> Result<String, String> {
    match (text, file) {
        (Some(text), None) => Ok(text),
        (None, Some(path)) => std::fs::read_to_string(&path)
            .map_err(|e| format!("cannot read '{}': {e}", path.display())),
        (None, None) => Err("either --text or --file is required".to_string()),
        (Some(_), Some(_)) => Err("--text and --file are mutually exclusive".to_string()),
    }
}

#[tokio::main]
async fn main() {
    // keep CLI output clean: structured logs go to stderr, warnings up
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let store = match open_store(cli.db) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Analyze {
            user,
            text,
            file,
            paraphrasing,
            engine,
            engine_script,
            timeout,
            json,
        } => {
            let text = match read_text(text, file) {
                Ok(text) => text,
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            };
            let config = EngineConfig {
                program: engine,
                script: Some(engine_script),
                timeout_seconds: timeout,
            };
            let api = build_api(store, config);
            cmd_analyze(&api, &user, text, paraphrasing, json).await
        }
        Commands::History { user, page, size } => {
            let api = build_api(store, EngineConfig::default());
            cmd_history(&api, &user, page, size)
        }
        Commands::Sources { user, record_id } => {
            let api = build_api(store, EngineConfig::default());
            cmd_sources(&api, &user, &record_id)
        }
        Commands::Stats { user, system } => {
            let api = build_api(store, EngineConfig::default());
            cmd_stats(&api, &user, system)
        }
        Commands::Identity { action } => match action {
            IdentityAction::Add { name } => cmd_identity_add(&store, &name),
            IdentityAction::List => cmd_identity_list(&store),
        },
        Commands::Cleanup { days } => {
            let api = build_api(store, EngineConfig::default());
            cmd_cleanup(&api, days)
        }
    };
    std::process::exit(code);
}
