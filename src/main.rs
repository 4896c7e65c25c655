//! magnet-relay - offline download relay
//!
//! Pushes pending magnet links, one at a time, to an offline-download service
//! and waits for each download and transfer to finish.

use anyhow::Result;
use clap::{Parser, Subcommand};
use magnet_relay::alist::{ExecutionState, TaskKind, TaskService};
use magnet_relay::database::{initialize_database, DatabaseManager, NewRequest};
use magnet_relay::utils::{ensure_dir, sqlite_url};
use magnet_relay::{
    AlistClient, AppSettings, EventLog, FeedRefresher, MonitorConfig, OfflineTasks, QueueManager,
    RelayActor, RelayCommand, RelayError,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// JSON settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay until Ctrl-C (default)
    Run,
    /// Subscribe a feed; its name is the save directory
    FeedAdd {
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
    },
    /// List subscribed feeds
    FeedList,
    /// Rename a feed and its save directory on the remote service
    FeedRename {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: String,
    },
    /// Fetch feeds now; all feeds flagged for updates unless --id is given
    FeedRefresh {
        #[arg(long)]
        id: Option<i64>,
    },
    /// Turn periodic refresh of a feed on or off
    FeedToggle {
        #[arg(long)]
        id: i64,
        #[arg(long, action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Delete a feed and its requests
    FeedDelete {
        #[arg(long)]
        id: i64,
        /// Also remove its save directory on the remote service
        #[arg(long)]
        purge: bool,
    },
    /// Add a magnet link to a feed
    RequestAdd {
        #[arg(long)]
        feed_id: i64,
        #[arg(long)]
        title: String,
        #[arg(long)]
        locator: String,
    },
    /// List requests not yet completed
    Pending,
    /// Ask the running relay to push a request ahead of the queue
    Retry {
        #[arg(long)]
        id: i64,
    },
    /// List remote tasks
    Tasks {
        #[arg(long, value_parser = parse_kind, default_value = "download")]
        kind: TaskKind,
        #[arg(long)]
        done: bool,
    },
}

fn parse_kind(raw: &str) -> Result<TaskKind, String> {
    match raw {
        "download" => Ok(TaskKind::Download),
        "transfer" => Ok(TaskKind::Transfer),
        other => Err(format!("unknown task kind '{}', expected download or transfer", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = AppSettings::load(args.config.as_deref())?;
    ensure_dir(&settings.data_dir)?;
    if let Some(parent) = settings.database_path.parent() {
        ensure_dir(parent)?;
    }

    let pool = initialize_database(&sqlite_url(&settings.database_path)).await?;
    let db = DatabaseManager::new(pool);

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(settings, db).await?,
        Command::FeedAdd { name, url } => {
            let feed = db.create_feed(&name, &url).await?;
            println!("{}\t{}\t{}", feed.id, feed.name, feed.url);
        }
        Command::FeedList => {
            for feed in db.list_feeds().await? {
                println!("{}\t{}\t{}", feed.id, feed.name, feed.url);
            }
        }
        Command::FeedRename { id, name } => {
            let feed = db
                .get_feed(id)
                .await?
                .ok_or_else(|| RelayError::NotFound(format!("feed {}", id)))?;
            if feed.name == name {
                println!("Feed {} is already named {}", id, name);
                return Ok(());
            }

            let remote = offline_tasks(&settings)?;
            if !remote.rename_feed_dir(&feed.name, &name).await? {
                info!("No save directory for feed {} yet", id);
            }
            db.rename_feed(id, &name).await?;
            println!("{}\t{}\t{}", feed.id, name, feed.url);
        }
        Command::FeedRefresh { id } => {
            let refresher = feed_refresher(&settings, db.clone())?;
            let added = match id {
                Some(id) => refresher.refresh_feed(id).await?,
                None => refresher.refresh_all().await,
            };
            println!("{} new requests", added);
        }
        Command::FeedToggle { id, enabled } => {
            if !db.set_should_update(id, enabled).await? {
                return Err(RelayError::NotFound(format!("feed {}", id)).into());
            }
        }
        Command::FeedDelete { id, purge } => {
            let feed = db
                .get_feed(id)
                .await?
                .ok_or_else(|| RelayError::NotFound(format!("feed {}", id)))?;
            if purge {
                offline_tasks(&settings)?.remove_feed_dir(&feed.name).await?;
            }
            db.delete_feed(id).await?;
        }
        Command::Retry { id } => {
            db.request_retry(id).await?;
            println!("Retry of request {} queued", id);
        }
        Command::RequestAdd {
            feed_id,
            title,
            locator,
        } => {
            let inserted = db
                .save_requests(&[NewRequest {
                    feed_id,
                    title,
                    content_locator: locator,
                }])
                .await?;
            if inserted == 0 {
                println!("Locator already known");
            }
        }
        Command::Pending => {
            for request in db.pending_requests().await? {
                println!("{}\t{}\t{}", request.id, request.name, request.content_locator);
            }
        }
        Command::Tasks { kind, done } => {
            let client = AlistClient::new(&settings.base_url, &settings.token)?;
            let state = if done {
                ExecutionState::Done
            } else {
                ExecutionState::Undone
            };
            for task in client.list_tasks(kind, state).await? {
                println!(
                    "{}\t{:?}\t{:.1}%\t{}",
                    task.task_id, task.status, task.progress, task.reported_locator
                );
            }
        }
    }

    Ok(())
}

fn offline_tasks_with(client: Arc<AlistClient>, settings: &AppSettings) -> OfflineTasks {
    OfflineTasks::new(
        client.clone(),
        client,
        settings.root_save_path.clone(),
        settings.delete_policy,
        settings.tool,
    )
}

fn offline_tasks(settings: &AppSettings) -> Result<OfflineTasks> {
    let client = Arc::new(AlistClient::new(&settings.base_url, &settings.token)?);
    Ok(offline_tasks_with(client, settings))
}

fn feed_refresher(settings: &AppSettings, db: DatabaseManager) -> Result<FeedRefresher> {
    FeedRefresher::new(
        db,
        settings.blocked_words.clone(),
        settings.feed_proxy.as_deref(),
    )
}

async fn run(settings: AppSettings, db: DatabaseManager) -> Result<()> {
    let client = Arc::new(AlistClient::new(&settings.base_url, &settings.token)?);
    match client.version().await {
        Ok(version) => info!("Connected to offline-download service v{}", version),
        Err(e) => error!("Offline-download service unreachable at {}: {}", settings.base_url, e),
    }

    let remote = offline_tasks_with(client, &settings);
    let feeds = feed_refresher(&settings, db.clone())?;
    let store = Arc::new(db);
    let event_log = Arc::new(EventLog::new(&settings.data_dir).await?);
    let monitor_config = MonitorConfig {
        poll_interval: settings.poll_interval(),
        timeout: settings.watch_timeout(),
    };

    let queue_manager = QueueManager::new(remote, store.clone(), monitor_config, event_log);

    let (tx, rx) = mpsc::channel(16);
    let actor = RelayActor::new(rx, queue_manager, store, settings.scan_interval())
        .with_feed_refresher(feeds)
        .with_control_interval(settings.control_interval());
    let actor_handle = tokio::spawn(actor.run());

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down");
    let _ = tx.send(RelayCommand::Shutdown).await;
    actor_handle.await?;

    Ok(())
}
