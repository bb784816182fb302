//! cloudlist - Streaming cloud resource inventory
//!
//! Lists CloudWatch Logs log groups and S3 buckets with their tags, one
//! JSON line (or table row) per resource.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "cloudlist")]
#[command(about = "Streaming cloud resource inventory with tag enrichment")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./cloudlist.toml or ~/.config/cloudlist/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Maximum retry attempts for throttled or failed requests
    #[arg(long, global = true)]
    max_retries: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// List resources with their tags
    List(cmd::list::ListArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(cloudlist_core::ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug, spinners show activity
    //   non-TTY: info unless --debug, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    cloudlist_core::init_logging(quiet, cli.debug, multi);

    let mut config = if let Some(path) = &cli.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };
    if let Some(timeout) = cli.timeout {
        config.http.timeout = timeout;
    }
    if let Some(max_retries) = cli.max_retries {
        config.http.max_retries = max_retries;
    }

    match cli.command {
        Command::List(args) => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(cmd::list::run(args, &config, &progress))
        }
        Command::Config => {
            print_config(&config);
            Ok(())
        }
    }
}

fn print_config(config: &Config) {
    use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    let listing = config.listing();
    table.add_row(vec!["Endpoint", &config.endpoint.base_url]);
    table.add_row(vec![
        "Region",
        &format!(
            "{} ({})",
            config.endpoint.region,
            config.endpoint().partition()
        ),
    ]);
    table.add_row(vec!["Account", &config.endpoint.account_id]);
    table.add_row(vec![
        "Token",
        if config.endpoint.token.is_some() {
            "configured"
        } else {
            "not set"
        },
    ]);
    table.add_row(vec![
        "Page size",
        &listing
            .page_size
            .map_or_else(|| "API maximum".to_string(), |n| n.to_string()),
    ]);
    table.add_row(vec![
        "Tag batches",
        &format!(
            "{} ids ({} concurrent)",
            listing.tag_batch_size, listing.tag_batch_concurrency
        ),
    ]);
    table.add_row(vec![
        "Detail workers",
        &listing.detail_concurrency.to_string(),
    ]);
    table.add_row(vec![
        "Progress every",
        &format!(
            "{} pages / {} items",
            listing.progress_every_pages, listing.progress_every_items
        ),
    ]);
    table.add_row(vec!["Stop policy", &listing.stop_policy.to_string()]);
    table.add_row(vec![
        "Intervals",
        &format!(
            "list {}ms, tags {}ms, detail {}ms",
            listing.rate.list_ms, listing.rate.tags_ms, listing.rate.detail_ms
        ),
    ]);
    table.add_row(vec!["Timeout", &format!("{}s", config.http.timeout)]);
    table.add_row(vec!["Max retries", &config.http.max_retries.to_string()]);

    eprintln!("\n{table}");
}
