//! Batchscan CLI - batched, rate-limited item scanning
//!
//! Usage:
//!   batchscan <items_file> [options]
//!   batchscan - [options]        (read items from stdin)
//!
//! Options:
//!   --pattern=STR    Flag items containing STR as hits (default: validate only)
//!   --batch=N        Items per batch (default: 10)
//!   --limit=N        Max in-flight classifications (default: CPU cores)
//!   --delay=MS       Pause between batches in ms (default: 500)
//!   --max-hits=N     Cap the hit list embedded in the report
//!   --output=FILE    Save the JSON report to FILE
//!   --hits=FILE      Append hits to FILE as JSON lines
//!   --webhook=URL    POST run events to URL
//!   --feed=PORT      Serve live stats over WebSocket on PORT
//!   --help           Show this help
//!
//! Environment:
//!   RUST_LOG         Log level (default: info)

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use eyre::{bail, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use batchscan::{
    BatchScanner, ConsoleNotifier, JsonlSink, MemorySink, Notifier, PatternClassifier, ResultSink,
    ScanConfig, StatsBroadcaster, StatsCollector, StatsFeed, WebhookNotifier,
};

#[derive(Debug, Default)]
struct CliOptions {
    input: Option<String>,
    pattern: Option<String>,
    batch_size: Option<usize>,
    concurrency_limit: Option<usize>,
    delay_ms: Option<u64>,
    max_hits: Option<usize>,
    output_file: Option<String>,
    hits_file: Option<String>,
    webhook_url: Option<String>,
    feed_port: Option<u16>,
    help: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let options = parse_args(std::env::args().skip(1));
    if options.help {
        print_help();
        return Ok(());
    }

    let Some(input) = options.input.clone() else {
        print_help();
        bail!("No input provided");
    };

    let items = read_items(&input)?;
    if items.is_empty() {
        bail!("Input contains no items");
    }

    print_banner();
    info!("📝 Loaded {} items from {}", items.len(), input);

    let mut config = ScanConfig::default();
    if let Some(batch_size) = options.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(limit) = options.concurrency_limit {
        config.concurrency_limit = limit;
    }
    if let Some(delay_ms) = options.delay_ms {
        config.inter_batch_delay = Duration::from_millis(delay_ms);
    }
    config.output_limit = options.max_hits;

    let classifier = Arc::new(match &options.pattern {
        Some(pattern) => PatternClassifier::new(pattern.clone()),
        None => PatternClassifier::validate_only(),
    });

    let sink: Arc<dyn ResultSink> = match &options.hits_file {
        Some(path) => {
            info!("💾 Appending hits to {}", path);
            Arc::new(JsonlSink::new(path))
        }
        None => Arc::new(MemorySink::new()),
    };

    let notifier: Arc<dyn Notifier> = match &options.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())?),
        None => Arc::new(ConsoleNotifier),
    };

    // Stats plumbing: shared collector, heartbeat broadcaster, optional feed
    let collector = Arc::new(StatsCollector::new());
    let broadcaster =
        StatsBroadcaster::new(collector.clone(), batchscan::stats::DEFAULT_PUBLISH_INTERVAL);
    let feed_handle = match options.feed_port {
        Some(port) => {
            let feed = StatsFeed::bind(
                format!("0.0.0.0:{}", port).parse()?,
                collector.clone(),
                &broadcaster,
            )
            .await?;
            Some(feed.start())
        }
        None => None,
    };
    let broadcaster_handle = broadcaster.start();

    let scanner = BatchScanner::with_stats(config, classifier, sink, notifier, collector);

    // Ctrl+C cancels at the next batch boundary; in-flight items drain
    let cancel = scanner.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Ctrl+C received, cancelling at next batch boundary...");
            cancel.cancel();
        }
    });

    let report = scanner.run(items).await;

    broadcaster_handle.stop().await;
    if let Some(handle) = feed_handle {
        handle.stop().await;
    }

    println!("{}", report.summary());

    if !report.hits.is_empty() {
        println!("💰 HITS FOUND:");
        for (position, hit) in report.hits.iter().enumerate() {
            println!("\n[{}] Item #{}: {}", position + 1, hit.index, hit.item);
            for record in &hit.records {
                println!("    {}: {} ({})", record.label, record.reference, record.reading);
            }
        }
        println!();
    }

    if let Some(path) = &options.output_file {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        println!("💾 Report saved to {}", path);
    }

    if !report.success {
        bail!(
            "Scan failed: {}",
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn parse_args(args: impl Iterator<Item = String>) -> CliOptions {
    let mut options = CliOptions::default();

    for arg in args {
        if let Some(value) = arg.strip_prefix("--pattern=") {
            options.pattern = Some(value.to_string());
        } else if let Some(value) = arg.strip_prefix("--batch=") {
            options.batch_size = value.parse().ok();
        } else if let Some(value) = arg.strip_prefix("--limit=") {
            options.concurrency_limit = value.parse().ok();
        } else if let Some(value) = arg.strip_prefix("--delay=") {
            options.delay_ms = value.parse().ok();
        } else if let Some(value) = arg.strip_prefix("--max-hits=") {
            options.max_hits = value.parse().ok();
        } else if let Some(value) = arg.strip_prefix("--output=") {
            options.output_file = Some(value.to_string());
        } else if let Some(value) = arg.strip_prefix("--hits=") {
            options.hits_file = Some(value.to_string());
        } else if let Some(value) = arg.strip_prefix("--webhook=") {
            options.webhook_url = Some(value.to_string());
        } else if let Some(value) = arg.strip_prefix("--feed=") {
            options.feed_port = value.parse().ok();
        } else if arg == "--help" {
            options.help = true;
        } else if !arg.starts_with("--") {
            options.input = Some(arg);
        }
    }

    options
}

/// Read items from a file, or stdin when the input is "-". One item per
/// line; blank lines dropped.
fn read_items(input: &str) -> Result<Vec<String>> {
    let content = if input == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        std::fs::read_to_string(input)?
    };

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

fn print_banner() {
    println!("\n{}", "=".repeat(70));
    println!("  BATCHSCAN - Concurrent Batch Scan Engine");
    println!("  Bounded concurrency, paced batches, live stats");
    println!("{}\n", "=".repeat(70));
}

fn print_help() {
    println!(
        r#"
🔍 BATCHSCAN - Concurrent Batch Scan Engine

Usage:
  batchscan <items_file> [options]
  cat items.txt | batchscan - [options]

Options:
  --pattern=STR    Flag items containing STR as hits (default: validate only)
  --batch=N        Items per batch (default: 10)
  --limit=N        Max in-flight classifications (default: CPU cores)
  --delay=MS       Pause between batches in ms (default: 500)
  --max-hits=N     Cap the hit list embedded in the report
  --output=FILE    Save the JSON report to FILE
  --hits=FILE      Append hits to FILE as JSON lines
  --webhook=URL    POST run events to URL
  --feed=PORT      Serve live stats over WebSocket on PORT
  --help           Show this help

Examples:
  batchscan ./items.txt --pattern=ERROR --batch=500 --limit=8
  batchscan ./items.txt --output=report.json --hits=hits.jsonl
  cat items.txt | batchscan - --feed=3002
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args_full() {
        let options = parse_args(
            [
                "items.txt",
                "--pattern=X",
                "--batch=50",
                "--limit=8",
                "--delay=250",
                "--max-hits=10",
                "--output=out.json",
                "--feed=3002",
            ]
            .iter()
            .map(|s| s.to_string()),
        );

        assert_eq!(options.input.as_deref(), Some("items.txt"));
        assert_eq!(options.pattern.as_deref(), Some("X"));
        assert_eq!(options.batch_size, Some(50));
        assert_eq!(options.concurrency_limit, Some(8));
        assert_eq!(options.delay_ms, Some(250));
        assert_eq!(options.max_hits, Some(10));
        assert_eq!(options.output_file.as_deref(), Some("out.json"));
        assert_eq!(options.feed_port, Some(3002));
        assert!(!options.help);
    }

    #[test]
    fn test_parse_args_bad_numbers_ignored() {
        let options = parse_args(
            ["items.txt", "--batch=abc", "--limit="]
                .iter()
                .map(|s| s.to_string()),
        );
        assert_eq!(options.batch_size, None);
        assert_eq!(options.concurrency_limit, None);
    }
}
