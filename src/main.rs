//! CLI entry point for `mboxstore`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use mboxstore::config::{self, Config};
use mboxstore::model::message::Message;
use mboxstore::model::record::DocRecord;
use mboxstore::parser::mbox::MboxSplitter;
use mboxstore::search::{Query, DEFAULT_FIELD};
use mboxstore::store::mailstore::{INDEX_FILE, KV_FILE};
use mboxstore::store::reader::MessageReader;
use mboxstore::store::Store;

/// Ingest MBOX archives into a searchable, labelled message store.
#[derive(Parser)]
#[command(name = "mboxstore", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Store directory (defaults to the configured data directory)
    #[arg(long, global = true, value_name = "DIR", env = "MBOXSTORE_DIR")]
    store: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Add every message of an MBOX file to the store
    Add {
        path: PathBuf,
        /// Extra label for every added message (repeatable)
        #[arg(short, long = "label", value_name = "LABEL")]
        labels: Vec<String>,
    },
    /// Search the store
    Search {
        query: String,
        /// Maximum number of results
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Show a stored message
    Show {
        doc_id: u64,
        /// MBOX file the message was added from
        #[arg(long, value_name = "MBOX")]
        mbox: PathBuf,
        /// Print the raw message bytes
        #[arg(long)]
        raw: bool,
    },
    /// Replace the labels of a message
    Label {
        doc_id: u64,
        labels: Vec<String>,
    },
    /// Show store statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config();
    let store_dir = cli.store.clone().unwrap_or_else(|| config::data_dir(&config));

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &store_dir);

    match cli.command {
        Commands::Add { path, labels } => cmd_add(&store_dir, &path, &labels, &config),
        Commands::Search { query, limit, json } => {
            cmd_search(&store_dir, &query, limit, json, &config)
        }
        Commands::Show { doc_id, mbox, raw } => cmd_show(&store_dir, doc_id, &mbox, raw),
        Commands::Label { doc_id, labels } => cmd_label(&store_dir, doc_id, &labels),
        Commands::Stats { json } => cmd_stats(&store_dir, json),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, log_dir: &Path) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if std::fs::create_dir_all(log_dir).is_ok() {
        let log_file = config::log_file_path(log_dir);
        let file_name = log_file
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "mboxstore.log".into());
        let file_appender = tracing_appender::rolling::never(log_dir, file_name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mboxstore", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::stdout().write_all(&buf)?;
    Ok(())
}

/// Split, parse, deduplicate, and add every message of an MBOX file.
fn cmd_add(store_dir: &Path, path: &Path, labels: &[String], config: &Config) -> anyhow::Result<()> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }

    let file_size = std::fs::metadata(path)?.len();
    let pb = ProgressBar::new(file_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} Adding [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let labels: Vec<String> = config
        .ingest
        .default_labels
        .iter()
        .chain(labels)
        .cloned()
        .collect();

    let mut store = Store::open(store_dir)?;
    let mut splitter = MboxSplitter::open(path, config.ingest.read_buffer_size)?
        .with_max_message_size(config.ingest.max_message_size);

    let start = Instant::now();
    let (mut added, mut duplicates, mut invalid) = (0u64, 0u64, 0u64);

    for raw in splitter.messages()? {
        let raw = raw?;
        pb.set_position(raw.offset);

        let message = match Message::parse(&raw.bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!(offset = raw.offset, error = %e, "Skipping invalid message");
                invalid += 1;
                continue;
            }
        };

        if config.ingest.skip_duplicates && store.contains_msgid(message.msgid())? {
            duplicates += 1;
            continue;
        }

        store.add_message(&message, Some(raw.offset), &labels)?;
        added += 1;
    }

    pb.finish_and_clear();
    let elapsed = start.elapsed();
    let (index_time, store_time, total) = (store.index_time(), store.store_time(), store.size());
    store.close()?;

    println!();
    println!("  {:<20} {}", "File", path.display());
    println!("  {:<20} {}", "Added", added);
    println!("  {:<20} {}", "Duplicates skipped", duplicates);
    println!("  {:<20} {}", "Invalid skipped", invalid);
    println!("  {:<20} {}", "Documents in store", total);
    println!("  {:<20} {:.2?}", "Index time", index_time);
    println!("  {:<20} {:.2?}", "Store time", store_time);
    println!("  {:<20} {:.2?}", "Total time", elapsed);
    println!();

    Ok(())
}

/// Run a query and print up to `limit` results, newest first.
fn cmd_search(
    store_dir: &Path,
    query_str: &str,
    limit: usize,
    json: bool,
    config: &Config,
) -> anyhow::Result<()> {
    let mut store = Store::open(store_dir)?;
    let query = Query::parse(DEFAULT_FIELD, query_str)?;
    store.set_query(query)?;

    let total = store.num_results()?.unwrap_or(0);
    let page_size = config.search.page_size.max(1);
    let mut results: Vec<DocRecord> = Vec::new();
    while results.len() < limit {
        let page = store.load_results(page_size.min(limit - results.len()))?;
        if page.is_empty() {
            break;
        }
        results.extend(page);
    }

    if json {
        print_search_results_json(total, &results)?;
    } else {
        print_search_results_table(total, &results);
    }
    Ok(())
}

/// Print a stored record and its message.
fn cmd_show(store_dir: &Path, doc_id: u64, mbox: &Path, raw: bool) -> anyhow::Result<()> {
    let store = Store::open(store_dir)?;
    let record = store
        .docinfo(doc_id)?
        .ok_or_else(|| anyhow::anyhow!("No document with id {doc_id}"))?;

    let mut reader = MessageReader::open(mbox)?;
    if raw {
        std::io::stdout().write_all(reader.raw_message(record.offset)?)?;
        return Ok(());
    }

    let message = reader.message(record.offset)?;
    println!();
    println!("  {:<10} {}", "Doc id", record.doc_id);
    println!("  {:<10} {}", "Date", record.date.format("%Y-%m-%d %H:%M"));
    println!("  {:<10} {}", "From", record.from);
    println!("  {:<10} {}", "To", record.to.join(", "));
    println!("  {:<10} {}", "Subject", record.subject);
    println!("  {:<10} {}", "Labels", join_labels(&record));
    println!();
    for leaf in message.mime_parts("text/plain") {
        match (&leaf.filename, &leaf.content) {
            (Some(name), _) => println!("  [attachment: {name} ({})]", leaf.content_type),
            (None, Some(text)) => println!("{text}"),
            (None, None) => println!("  [{}]", leaf.content_type),
        }
    }
    Ok(())
}

/// Replace a message's labels and print the result.
fn cmd_label(store_dir: &Path, doc_id: u64, labels: &[String]) -> anyhow::Result<()> {
    let mut store = Store::open(store_dir)?;
    store.update_message_labels(doc_id, labels)?;
    let record = store
        .docinfo(doc_id)?
        .ok_or_else(|| anyhow::anyhow!("No document with id {doc_id}"))?;
    store.close()?;
    println!("  {doc_id}: {}", join_labels(&record));
    Ok(())
}

/// Print document count and on-disk sizes.
fn cmd_stats(store_dir: &Path, json: bool) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    let store = Store::open(store_dir)?;
    let file_len = |name: &str| {
        std::fs::metadata(store_dir.join(name))
            .map(|m| m.len())
            .unwrap_or(0)
    };
    let index_size = file_len(INDEX_FILE);
    let kv_size = file_len(KV_FILE);

    if json {
        let stats = serde_json::json!({
            "store": store_dir.to_string_lossy(),
            "documents": store.size(),
            "index_size": index_size,
            "store_size": kv_size,
        });
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!();
        println!("  {:<20} {}", "Store", store_dir.display());
        println!("  {:<20} {}", "Documents", store.size());
        println!("  {:<20} {}", "Index size", format_size(index_size, BINARY));
        println!("  {:<20} {}", "Record store size", format_size(kv_size, BINARY));
        println!();
    }
    Ok(())
}

fn join_labels(record: &DocRecord) -> String {
    record
        .labels
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Print search results as a human-readable table.
fn print_search_results_table(total: u64, results: &[DocRecord]) {
    println!();
    println!("  {} result(s), showing {}", total, results.len());
    println!();

    if results.is_empty() {
        return;
    }

    println!(
        "  {:<6} {:<17} {:<25} {:<40} {:<3}",
        "Id", "Date", "From", "Subject", "Att"
    );
    println!("  {}", "-".repeat(95));

    for record in results {
        let date = record.date.format("%Y-%m-%d %H:%M").to_string();
        let from_trunc: String = record.from.chars().take(24).collect();
        let subj_trunc: String = record.subject.chars().take(39).collect();
        let flags = format!(
            "{}{}",
            if record.has_attachment { "@" } else { "" },
            if record.starred { "*" } else { "" }
        );

        println!(
            "  {:<6} {:<17} {:<25} {:<40} {:<3}",
            record.doc_id, date, from_trunc, subj_trunc, flags
        );
    }
    println!();
}

/// Print search results as JSON.
fn print_search_results_json(total: u64, results: &[DocRecord]) -> anyhow::Result<()> {
    let items: Vec<serde_json::Value> = results
        .iter()
        .map(|r| {
            serde_json::json!({
                "doc_id": r.doc_id,
                "date": r.date.to_rfc3339(),
                "from": r.from,
                "to": r.to,
                "subject": r.subject,
                "offset": r.offset,
                "has_attachment": r.has_attachment,
                "starred": r.starred,
                "read": r.read,
                "labels": r.labels,
            })
        })
        .collect();

    let output = serde_json::json!({
        "result_count": total,
        "results": items,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
