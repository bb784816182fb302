//! List subcommand - stream resources with their tags

use std::io::Write;
use std::ops::ControlFlow;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use serde::Serialize;

use cloudlist_aws::s3::BUCKETS_MAX_PAGE;
use cloudlist_aws::{
    BucketDetailApi, BucketsApi, HttpBackend, LogGroup, LogGroupsApi, TaggingApi, list_buckets,
    list_log_groups,
};
use cloudlist_core::{
    CancellationToken, DriveSummary, EnrichedResult, ItemFilter, ListingConfig, ListingStream,
    ProgressSink, RateLimiter, Resource, Session, SharedProgress, StopPolicy, Tags,
    cancel_on_ctrl_c, drive, fmt_num,
};

use crate::config::Config;

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(subcommand)]
    pub resource: ListResource,
}

#[derive(Subcommand, Debug)]
pub enum ListResource {
    /// CloudWatch Logs log groups
    LogGroups(LogGroupsArgs),
    /// S3 buckets, with per-bucket configuration
    Buckets(BucketsArgs),
}

#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Stop after this many resources
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,

    /// Only emit resources whose name matches this glob
    #[arg(short, long)]
    pub name: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "jsonl")]
    pub format: OutputFormat,

    /// Identifiers per tag lookup batch (1-100)
    #[arg(long)]
    pub tag_batch_size: Option<usize>,
}

#[derive(Args, Debug)]
pub struct LogGroupsArgs {
    /// Server-side log group name prefix
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// Log groups per page (1-50)
    #[arg(long)]
    pub page_size: Option<usize>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args, Debug)]
pub struct BucketsArgs {
    /// Concurrent per-bucket detail reads
    #[arg(short = 'j', long)]
    pub detail_concurrency: Option<usize>,

    /// What stopping early does to in-flight detail reads (abandon, drain)
    #[arg(long)]
    pub stop_policy: Option<StopPolicy>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Clone, Copy, ValueEnum, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// One JSON object per line on stdout
    Jsonl,
    /// Summary table on stderr
    Table,
}

pub async fn run(args: ListArgs, config: &Config, progress: &SharedProgress) -> Result<()> {
    let backend = Arc::new(
        HttpBackend::new(config.endpoint(), config.http_settings())
            .context("Failed to build HTTP client")?,
    );
    let shutdown = CancellationToken::new();
    let _signals = cancel_on_ctrl_c(shutdown.clone());
    let mut listing = config.listing();

    match args.resource {
        ListResource::LogGroups(args) => {
            listing.page_size = args.page_size.or(listing.page_size);
            apply_common(&mut listing, &args.common);
            let session = session(listing, &shutdown, progress, "log groups");
            let filter = name_filter(args.common.name.as_deref())?;
            let list = LogGroupsApi::new(backend.clone()).with_name_prefix(args.prefix);
            let stream = list_log_groups(
                session,
                Arc::new(list),
                Arc::new(TaggingApi::new(backend)),
                filter,
            );
            output(stream, &args.common, "Log group", log_group_row, progress).await
        }
        ListResource::Buckets(args) => {
            // The bucket listing is a single request bounded by the limit
            if let Some(limit) = args.common.limit {
                listing.page_size = Some(limit.clamp(1, BUCKETS_MAX_PAGE));
            }
            if let Some(n) = args.detail_concurrency {
                listing.detail_concurrency = n;
            }
            if let Some(policy) = args.stop_policy {
                listing.stop_policy = policy;
            }
            apply_common(&mut listing, &args.common);
            let session = session(listing, &shutdown, progress, "buckets");
            let filter = name_filter(args.common.name.as_deref())?;
            let stream = list_buckets(
                session,
                Arc::new(BucketsApi::new(backend.clone())),
                Arc::new(TaggingApi::new(backend.clone())),
                Arc::new(BucketDetailApi::new(backend)),
                filter,
            );
            output(
                stream,
                &args.common,
                "Bucket",
                |r| {
                    let region = r
                        .detail
                        .as_ref()
                        .and_then(|d| d.region.clone())
                        .or_else(|| r.resource.bucket_region.clone())
                        .unwrap_or_default();
                    vec![r.display_name.clone(), region, tag_summary(&r.tags)]
                },
                progress,
            )
            .await
        }
    }
}

fn apply_common(listing: &mut ListingConfig, common: &CommonArgs) {
    if let Some(size) = common.tag_batch_size {
        listing.tag_batch_size = size;
    }
}

fn session(
    listing: ListingConfig,
    shutdown: &CancellationToken,
    progress: &SharedProgress,
    label: &str,
) -> Session {
    let limiter = Arc::new(RateLimiter::new(&listing.rate));
    let sink = ProgressSink::new(progress.listing_line(label));
    Session::new(limiter, listing)
        .with_parent(shutdown)
        .with_events(Arc::new(sink))
}

fn name_filter<T: Resource>(pattern: Option<&str>) -> Result<ItemFilter<T>> {
    let filter = ItemFilter::accept_all();
    match pattern {
        Some(p) => filter
            .name_glob(p)
            .with_context(|| format!("Invalid name pattern: {p}")),
        None => Ok(filter),
    }
}

fn log_group_row(r: &EnrichedResult<LogGroup>) -> Vec<String> {
    let retention = r
        .resource
        .retention_in_days
        .map_or_else(|| "never expire".to_string(), |d| format!("{d} days"));
    vec![r.display_name.clone(), retention, tag_summary(&r.tags)]
}

/// `key=value` pairs, comma separated
fn tag_summary(tags: &Tags) -> String {
    tags.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Drain a listing into the chosen output format
async fn output<T, D, F>(
    stream: ListingStream<T, D>,
    common: &CommonArgs,
    kind: &str,
    row: F,
    progress: &SharedProgress,
) -> Result<()>
where
    T: Resource + Serialize,
    D: Serialize,
    F: Fn(&EnrichedResult<T, D>) -> Vec<String>,
{
    let summary = match common.format {
        OutputFormat::Jsonl => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let mut write_error = None;
            let summary = drive(stream, common.limit, |r| {
                match write_json_line(&mut out, &r) {
                    Ok(()) => ControlFlow::Continue(()),
                    Err(e) => {
                        write_error = Some(e);
                        ControlFlow::Break(())
                    }
                }
            })
            .await?;
            if let Some(e) = write_error {
                return Err(e).context("Failed to write output");
            }
            out.flush().context("Failed to write output")?;
            summary
        }
        OutputFormat::Table => {
            let mut rows = Vec::new();
            let summary = drive(stream, common.limit, |r| {
                rows.push(row(&r));
                ControlFlow::Continue(())
            })
            .await?;
            print_table(kind, &rows);
            summary
        }
    };
    report(&summary, progress);
    Ok(())
}

fn write_json_line<W: Write, R: Serialize>(out: &mut W, record: &R) -> std::io::Result<()> {
    serde_json::to_writer(&mut *out, record)?;
    out.write_all(b"\n")
}

fn print_table(kind: &str, rows: &[Vec<String>]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new(kind).fg(Color::Cyan),
            Cell::new(if kind == "Bucket" { "Region" } else { "Retention" }).fg(Color::Cyan),
            Cell::new("Tags").fg(Color::Cyan),
        ]);
    for row in rows {
        table.add_row(row.iter().map(Cell::new));
    }
    eprintln!("\n{table}");
}

fn report(summary: &DriveSummary, progress: &SharedProgress) {
    if summary.stopped_early {
        progress.println(format!("Stopped after {} resources", fmt_num(summary.emitted)));
    } else {
        log::debug!("{} resources listed", fmt_num(summary.emitted));
    }
}
