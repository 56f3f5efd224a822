use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use erpo::app::App;
use erpo::cache::ListQuery;
use erpo::config::Config;
use erpo::connectivity::{Connectivity, ConnectivityMonitor};
use erpo::erp::Entity;
use erpo::queue::QueueStore;
use erpo::sync::SyncService;

#[derive(Parser, Debug)]
#[command(name = "erpo")]
#[command(about = "Offline-first ERPNext data access and sync")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/erpo/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Act as if the network were down, without probing
  #[arg(long)]
  offline: bool,

  /// Keep cache and queue in memory only
  #[arg(long)]
  ephemeral: bool,

  /// Log to stderr instead of the log file
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List documents (customer, item, quotation, sales-order, task, ...)
  List {
    entity: Entity,
    /// Filters as JSON, e.g. '[["status","=","Open"]]'
    #[arg(long)]
    filters: Option<String>,
    /// Comma-separated field names
    #[arg(long, value_delimiter = ',')]
    fields: Vec<String>,
  },
  /// Create a document, or queue it when offline
  Create {
    entity: Entity,
    /// Document body as JSON
    #[arg(long)]
    data: String,
  },
  /// Report a location update
  Location {
    #[arg(long)]
    data: String,
  },
  /// POST to an arbitrary endpoint
  Post {
    url: String,
    #[arg(long)]
    data: String,
  },
  /// Inspect or clear the offline queue
  Queue {
    #[command(subcommand)]
    action: QueueAction,
  },
  /// Read a raw cache entry
  Cache { key: String },
  /// Replay the offline queue once
  Sync,
  /// Keep running: sync periodically and on reconnect
  Watch,
}

#[derive(Subcommand, Debug)]
enum QueueAction {
  Show,
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = erpo::logging::init(&config.data_dir()?.join("logs"), args.verbose)?;

  let app = App::open(config, args.ephemeral)?;

  match args.command {
    Command::List {
      entity,
      filters,
      fields,
    } => {
      let connectivity = connectivity(&app, args.offline).await;
      let query = ListQuery::new(parse_json_opt(filters.as_deref())?, fields);
      let rows = app.client.get_list(entity, connectivity, &query).await?;
      print_json(&rows)?;
    }
    Command::Create { entity, data } => {
      let connectivity = connectivity(&app, args.offline).await;
      let result = app
        .client
        .create(entity, connectivity, parse_json(&data)?)
        .await?;
      print_json(&result)?;
    }
    Command::Location { data } => {
      let connectivity = connectivity(&app, args.offline).await;
      let result = app
        .client
        .post_location(connectivity, parse_json(&data)?)
        .await?;
      print_json(&result)?;
    }
    Command::Post { url, data } => {
      let connectivity = connectivity(&app, args.offline).await;
      let result = app.client.post(connectivity, &url, parse_json(&data)?).await?;
      print_json(&result)?;
    }
    Command::Queue { action } => match action {
      QueueAction::Show => print_json(&app.queue.get_queue())?,
      QueueAction::Clear => {
        app.queue.clear_queue();
        info!("Offline queue cleared");
      }
    },
    Command::Cache { key } => match app.client.cache().get_cache(&key) {
      Some(value) => print_json(&value)?,
      None => return Err(eyre!("No cache entry for {}", key)),
    },
    Command::Sync => {
      let report = app.engine.sync_queue().await;
      print_json(&report)?;
    }
    Command::Watch => watch(app).await?,
  }

  Ok(())
}

/// Probe once unless forced offline.
async fn connectivity(app: &App, forced_offline: bool) -> Connectivity {
  if forced_offline {
    return Connectivity::Offline;
  }
  Connectivity::from(app.remote.ping().await.is_ok())
}

async fn watch(app: App) -> Result<()> {
  let monitor = ConnectivityMonitor::spawn(
    Arc::clone(&app.remote),
    app.config.sync.probe_interval(),
  );
  let (report_tx, mut report_rx) = mpsc::unbounded_channel();

  let service =
    SyncService::new(app.engine.clone(), app.config.sync.interval()).with_reports(report_tx);

  tokio::spawn(async move {
    while let Some(report) = report_rx.recv().await {
      if let Ok(line) = serde_json::to_string(&report) {
        println!("{}", line);
      }
    }
  });

  info!(
    interval_secs = app.config.sync.interval_secs,
    "Watching connectivity and offline queue"
  );

  service
    .run(monitor.subscribe(), async {
      let _ = tokio::signal::ctrl_c().await;
    })
    .await;

  Ok(())
}

fn parse_json(raw: &str) -> Result<Value> {
  serde_json::from_str(raw).map_err(|e| eyre!("Invalid JSON {:?}: {}", raw, e))
}

fn parse_json_opt(raw: Option<&str>) -> Result<Value> {
  raw.map(parse_json).transpose().map(|v| v.unwrap_or(Value::Null))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
