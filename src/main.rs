use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use castfeed::config::Config;
use castfeed::feed::{HttpFetcher, PubDate};
use castfeed::ingest::{import, Ingestor};
use castfeed::reconcile::FeedRequest;
use castfeed::storage::{Database, DatabaseError, EpisodeEdit, EpisodeFilter, FeedEdit};

/// Get the config directory path (~/.config/castfeed/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("castfeed"))
}

#[derive(Parser, Debug)]
#[command(name = "castfeed", version, about = "Podcast feed tracker")]
struct Args {
    /// Config file (default: ~/.config/castfeed/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding `database_path` from the config
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Track a feed, or merge new episodes into an already tracked one
    Add {
        url: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        topic: Option<String>,
        /// Mark the feed inactive so refreshes skip it
        #[arg(long)]
        inactive: bool,
    },
    /// Re-fetch a feed using the configured refresh policy
    Refresh { feed_id: i64 },
    /// Import an OPML or JSON subscription list
    Import { file: PathBuf },
    /// List tracked feeds
    Feeds,
    /// List episodes, newest first
    Episodes {
        #[arg(long = "feed", value_name = "ID")]
        feed_id: Option<i64>,
        #[arg(long)]
        favorites: bool,
    },
    /// Mark an episode as favorite
    Favorite {
        episode_id: i64,
        /// Clear the favorite flag instead
        #[arg(long)]
        unset: bool,
    },
    /// Edit feed metadata; blank values clear optional fields
    EditFeed {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        topic: Option<String>,
        #[arg(long)]
        homepage: Option<String>,
        #[arg(long, value_name = "true|false")]
        active: Option<bool>,
    },
    /// Edit episode fields
    EditEpisode {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// ISO-8601 date or date-time
        #[arg(long)]
        pub_date: Option<String>,
        #[arg(long)]
        host: Option<String>,
    },
    /// Delete a feed and all its episodes
    DeleteFeed { id: i64 },
    /// Delete a single episode
    DeleteEpisode { id: i64 },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{out}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = match args.db.clone().or_else(|| config.database_path.clone()) {
        Some(path) => path,
        None => {
            std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) =
                    std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))
                {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            config_dir.join("castfeed.db")
        }
    };

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: the database is locked by another castfeed process. Try again.");
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("Failed to open database"),
    };

    run(args.command, db, config).await
}

async fn run(command: Command, db: Database, config: Config) -> Result<()> {
    match command {
        Command::Add {
            url,
            name,
            topic,
            inactive,
        } => {
            let request = FeedRequest {
                url,
                name,
                topic,
                // Re-adding leaves a stored feed's activation alone.
                is_active: inactive.then_some(false),
            };
            let outcome = ingestor(db, &config)?.add_feed(request).await?;
            print_json(&outcome)
        }
        Command::Refresh { feed_id } => {
            let outcome = ingestor(db, &config)?.refresh_feed(feed_id).await?;
            print_json(&outcome)
        }
        Command::Import { file } => {
            let requests = import::load_requests(&file)
                .await
                .with_context(|| format!("Failed to load {}", file.display()))?;
            let summary = ingestor(db, &config)?.bulk_import(requests).await;
            eprintln!("{}", summary.message());
            print_json(&summary)
        }
        Command::Feeds => print_json(&db.list_feeds().await?),
        Command::Episodes { feed_id, favorites } => {
            let filter = EpisodeFilter {
                feed_id,
                favorites_only: favorites,
            };
            print_json(&db.list_episodes(&filter).await?)
        }
        Command::Favorite { episode_id, unset } => {
            db.set_episode_favorite(episode_id, !unset).await?;
            Ok(())
        }
        Command::EditFeed {
            id,
            name,
            topic,
            homepage,
            active,
        } => {
            let edit = FeedEdit {
                name,
                topic,
                homepage_url: homepage,
                is_active: active,
            };
            print_json(&db.update_feed(id, &edit).await?)
        }
        Command::EditEpisode {
            id,
            title,
            description,
            pub_date,
            host,
        } => {
            let pub_date = pub_date
                .map(|raw| {
                    PubDate::from_iso8601(raw.trim())
                        .ok_or_else(|| anyhow::anyhow!("Invalid ISO-8601 pub date: {raw}"))
                })
                .transpose()?;
            let edit = EpisodeEdit {
                title,
                description,
                pub_date,
                host,
            };
            print_json(&db.update_episode(id, &edit).await?)
        }
        Command::DeleteFeed { id } => {
            let episodes = db.delete_feed(id).await?;
            eprintln!("Deleted feed {id} and {episodes} episode(s)");
            Ok(())
        }
        Command::DeleteEpisode { id } => {
            db.delete_episode(id).await?;
            Ok(())
        }
    }
}

fn ingestor(db: Database, config: &Config) -> Result<Ingestor<HttpFetcher>> {
    let fetcher = HttpFetcher::new(&config.fetch).context("Failed to build HTTP client")?;
    Ok(Ingestor::new(db, fetcher, config.ingest.clone())
        .allow_private_hosts(config.fetch.allow_private_hosts))
}
