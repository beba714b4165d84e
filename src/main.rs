use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use feedloom::app::App;
use feedloom::config::Config;
use feedloom::storage::{Article, KeyValueStore, MemoryStore, SqliteStore};

/// Get the config directory path (~/.config/feedloom/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedloom"))
}

#[derive(Parser, Debug)]
#[command(name = "feedloom", version, about = "Personal RSS/Atom/RDF feed reader")]
struct Args {
    /// Config file (default: ~/.config/feedloom/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Keep everything in memory for this run only
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to a feed
    Add { url: String },
    /// Unsubscribe from a feed
    Remove { feed_id: String },
    /// List subscribed feeds
    Feeds,
    /// Refresh one feed, or every feed when no id is given
    Refresh { feed_id: Option<String> },
    /// List articles, newest first
    Articles {
        #[arg(long, conflicts_with_all = ["collection", "bookmarked"])]
        feed: Option<String>,
        #[arg(long, conflicts_with = "bookmarked")]
        collection: Option<String>,
        #[arg(long)]
        bookmarked: bool,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Mark an article read
    Read { article_id: String },
    /// Mark an article unread
    Unread { article_id: String },
    /// Toggle an article's bookmark
    Bookmark { article_id: String },
    /// Mark every article of a feed read (or unread)
    MarkAll {
        feed_id: String,
        #[arg(long)]
        unread: bool,
    },
    /// Manage collections
    Collection {
        #[command(subcommand)]
        action: CollectionAction,
    },
    /// List collections
    Collections,
    /// Refresh in the background until Ctrl-C
    Daemon,
}

#[derive(Subcommand, Debug)]
enum CollectionAction {
    /// Create a collection over existing feeds
    Create { name: String, feed_ids: Vec<String> },
    /// Delete a collection
    Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if args.memory {
        let app = App::open(&config, MemoryStore::new()).await?;
        return run(app, args.command).await;
    }

    let db_path = match &config.database_path {
        Some(path) => path.clone(),
        None => {
            if !config_dir.exists() {
                std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
            }
            // SEC-007: Set directory permissions on Unix (user-only access)
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
            config_dir.join("feedloom.db")
        }
    };
    let db_path = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?
        .to_string();

    let store = SqliteStore::open(&db_path)
        .await
        .with_context(|| format!("Failed to open database at {db_path}"))?;
    let app = App::open(&config, store).await?;
    run(app, args.command).await
}

async fn run<S: KeyValueStore>(app: App<S>, command: Command) -> Result<()> {
    match command {
        Command::Add { url } => {
            let feed = app.add_feed_by_url(&url).await?;
            let count = app.articles(&feed.id).await.len();
            println!("Added {} ({}) with {} articles", feed.display_title(), feed.id, count);
        }
        Command::Remove { feed_id } => {
            if app.remove_feed(&feed_id).await? {
                println!("Removed {feed_id}");
            } else {
                anyhow::bail!("No feed with id {feed_id}");
            }
        }
        Command::Feeds => {
            for feed in app.feeds().await {
                println!("{}  {}  {}", feed.id, feed.display_title(), feed.url);
            }
        }
        Command::Refresh { feed_id: Some(feed_id) } => {
            let articles = app.refresh_feed(&feed_id).await?;
            println!("{} articles stored", articles.len());
        }
        Command::Refresh { feed_id: None } => {
            let outcomes = app.refresh_all().await;
            for outcome in &outcomes {
                match &outcome.result {
                    Ok(count) => println!("{}  ok ({count} articles)", outcome.feed_id),
                    Err(e) => println!("{}  failed: {e}", outcome.feed_id),
                }
            }
        }
        Command::Articles {
            feed,
            collection,
            bookmarked,
            limit,
        } => {
            let articles = if let Some(feed_id) = feed {
                app.articles(&feed_id).await
            } else if let Some(collection_id) = collection {
                app.collection_articles(&collection_id).await?
            } else if bookmarked {
                app.bookmarked_articles().await
            } else {
                app.all_articles().await
            };
            let marks = app.storage().get_read_marks().await;
            for article in articles.iter().take(limit) {
                print_article(article, marks.contains_key(&article.id));
            }
        }
        Command::Read { article_id } => app.set_article_read(&article_id, true).await?,
        Command::Unread { article_id } => app.set_article_read(&article_id, false).await?,
        Command::Bookmark { article_id } => {
            let state = if app.toggle_bookmark(&article_id).await? {
                "Bookmarked"
            } else {
                "Removed bookmark for"
            };
            println!("{state} {article_id}");
        }
        Command::MarkAll { feed_id, unread } => app.mark_all_in_feed(&feed_id, !unread).await?,
        Command::Collection { action } => match action {
            CollectionAction::Create { name, feed_ids } => {
                let collection = app.create_collection(&name, feed_ids).await?;
                println!("Created collection {} ({})", collection.name, collection.id);
            }
            CollectionAction::Delete { id } => {
                app.delete_collection(&id).await?;
                println!("Deleted collection {id}");
            }
        },
        Command::Collections => {
            for collection in app.collections().await {
                println!(
                    "{}  {}  {} feeds",
                    collection.id,
                    collection.name,
                    collection.feed_ids.len()
                );
            }
        }
        Command::Daemon => {
            let handle = app.start_scheduler().await;
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            handle.stop().await;
        }
    }
    Ok(())
}

fn print_article(article: &Article, read: bool) {
    let marker = if read { ' ' } else { '*' };
    println!(
        "{marker} {}  {}  {}",
        article.id,
        article.pub_date.as_deref().unwrap_or("-"),
        article.title
    );
}
