//! sitewall: personal site blocker
//!
//! Main entry point. Loads configuration, sets up logging, runs the
//! startup reconciliation and dispatches one command through the control
//! surface.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{Config, LoggingConfig};
use serde_json::json;
use sitewall_core::{FallbackMatcher, FileStorage, KeyValueStore, RuleStore, RuleSynchronizer};
use sitewall_network::{DynamicRuleSet, ResourceType, RuleBackend};
use sitewall_runtime::{Background, DEFAULT_QUEUE_CAPACITY, NoTabs, Request, Response, channel};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

// Use mimalloc as the global allocator
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Keep a personal list of blocked sites
#[derive(Parser, Debug)]
#[command(name = "sitewall", version)]
struct Cli {
    /// Config file (default: <config dir>/sitewall/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List blocked entries
    List,
    /// Block a URL, a domain, or any text contained in URLs
    Add { input: String },
    /// Unblock an entry by id
    Remove { id: u32 },
    /// Block the site a link points to
    BlockLink { url: String },
    /// Show whether a page load would be blocked
    Check { url: String },
    /// Rebuild the dynamic rules from storage and report them
    Reconcile,
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    // Logs go to stderr; stdout carries the JSON responses
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.logging);

    info!("sitewall starting (storage: {})", config.storage_path.display());

    let storage: Arc<dyn KeyValueStore> = Arc::new(
        FileStorage::open(&config.storage_path)
            .await
            .context("Failed to open storage")?,
    );
    let rule_set = Arc::new(DynamicRuleSet::new(config.rule_set_config()));
    let origin = config.origin();

    let sync = RuleSynchronizer::new(rule_set.clone(), config.sync_config());
    let store = RuleStore::new(storage.clone(), sync);
    let background = Background::new(store, Arc::new(NoTabs), &origin);

    // Every run is a fresh browser session as far as the rules are concerned
    background
        .on_startup()
        .await
        .context("Startup reconciliation failed")?;

    let request = match cli.command {
        Command::List => Request::List,
        Command::Add { input } => Request::Add { input },
        Command::Remove { id } => Request::Remove { id },
        Command::BlockLink { url } => Request::BlockLink { url },
        Command::Check { url } => {
            let fallback =
                FallbackMatcher::new(storage, origin, &config.extension.blocked_page);
            return check(&rule_set, &fallback, &url).await;
        }
        Command::Reconcile => {
            let rules = rule_set.dynamic_rules().await?;
            println!("{}", serde_json::to_string_pretty(&json!({ "ok": true, "rules": rules }))?);
            return Ok(ExitCode::SUCCESS);
        }
    };

    let (dispatcher, handle) = channel(background, DEFAULT_QUEUE_CAPACITY);
    let worker = dispatcher.spawn();

    let response = handle.request(request).await;
    drop(handle);
    worker.await.context("Dispatcher task failed")?;

    Ok(report(&response))
}

fn report(response: &Response) -> ExitCode {
    println!("{}", response.to_json());
    if response.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Evaluate a page load the way the browser would: dynamic rules first,
/// then the page-level fallback check.
async fn check(rule_set: &DynamicRuleSet, fallback: &FallbackMatcher, url: &str) -> Result<ExitCode> {
    let rule = rule_set.evaluate(url, ResourceType::MainFrame).await;
    let entry = fallback.check(url).await;
    let blocked = rule.is_some() || entry.is_some();

    let verdict = json!({
        "ok": true,
        "url": url,
        "blocked": blocked,
        "rule": rule,
        "fallback": entry,
        "redirect": blocked.then(|| fallback.blocked_url().to_string()),
    });
    println!("{}", serde_json::to_string_pretty(&verdict)?);

    Ok(ExitCode::SUCCESS)
}
