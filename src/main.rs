use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod db;
mod error;
mod models;
mod notify;
mod services;
mod sync;
mod youtube;

use app::App;
use config::Config;
use error::Result;
use models::{Preferences, SubscribeOutcome, SubscriberRecord, Topic, VideoPage};
use notify::PostAnnouncement;
use services::DEFAULT_PAGE_SIZE;

#[derive(Parser)]
#[command(name = "shorts-herald")]
#[command(version, about = "Keeps a local catalog of a YouTube channel and emails subscribers about new videos", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the periodic sync until interrupted
    Serve {
        /// Also run one sync immediately
        #[arg(long)]
        sync_on_start: bool,
    },

    /// Fetch new videos now and notify subscribers
    Sync,

    /// List stored videos, newest first
    Videos {
        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: u32,

        /// Include hidden videos
        #[arg(long)]
        all: bool,

        #[arg(long)]
        json: bool,
    },

    /// Make a stored video publicly visible
    Show { id: i64 },

    /// Hide a stored video from the public listing
    Hide { id: i64 },

    /// Delete a stored video (it returns on the next sync if still on YouTube)
    Delete { id: i64 },

    /// Add or reactivate a subscriber
    Subscribe { email: String },

    /// Deactivate a subscriber
    Unsubscribe { email: String },

    /// List subscribers
    Subscribers {
        /// Show counts and the most recent active subscribers instead
        #[arg(long)]
        stats: bool,

        #[arg(long)]
        json: bool,
    },

    /// Permanently delete a subscriber
    SubscriberDelete { id: i64 },

    /// Change which updates a subscriber receives
    Preferences {
        email: String,

        #[arg(long)]
        videos: Option<bool>,

        #[arg(long)]
        posts: Option<bool>,

        #[arg(long)]
        gallery: Option<bool>,
    },

    /// Email post-update subscribers about a newly published post
    AnnouncePost {
        #[arg(long)]
        title: String,

        #[arg(long)]
        url: String,

        #[arg(long)]
        excerpt: Option<String>,

        /// Post body, used for the excerpt when none is given
        #[arg(long)]
        content: Option<String>,

        #[arg(long)]
        image: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let app = App::new(&config).await?;

    match cli.command {
        Commands::Serve { sync_on_start } => {
            if sync_on_start {
                app.engine.run_scheduled().await;
            }

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let scheduler = app.start_scheduler(shutdown_rx);

            tokio::signal::ctrl_c().await?;
            tracing::info!("shutdown requested");
            shutdown_tx.send(true).ok();
            scheduler.await.map_err(anyhow::Error::from)?;
        }

        Commands::Sync => {
            let summary = app.engine.sync_now().await?;
            println!(
                "Videos synced successfully: {} fetched, {} new, {} announced",
                summary.total_fetched, summary.new_count, summary.notified_videos
            );
            if summary.failed_inserts > 0 {
                println!("{} new videos could not be stored", summary.failed_inserts);
            }
        }

        Commands::Videos {
            page,
            page_size,
            all,
            json,
        } => {
            let page = if all {
                app.catalog.get_admin_page(page, page_size).await?
            } else {
                app.catalog.get_page(page, page_size).await?
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&page)?);
            } else {
                print_videos(&page);
            }
        }

        Commands::Show { id } => set_visibility(&app, id, true).await?,

        Commands::Hide { id } => set_visibility(&app, id, false).await?,

        Commands::Delete { id } => match app.catalog.delete(id).await? {
            Some(video) => println!(
                "Deleted {} ({}). It will be re-synced if still on YouTube.",
                video.id, video.external_id
            ),
            None => println!("Video not found: {}", id),
        },

        Commands::Subscribe { email } => match app.subscriptions.subscribe(&email).await? {
            SubscribeOutcome::Created(record) => println!("Subscribed {}", record.email),
            SubscribeOutcome::AlreadySubscribed => println!("Already subscribed"),
            SubscribeOutcome::Reactivated(record) => {
                println!("Subscription reactivated for {}", record.email)
            }
        },

        Commands::Unsubscribe { email } => {
            if app.subscriptions.unsubscribe(&email).await? {
                println!("Unsubscribed {}", email.trim().to_lowercase());
            } else {
                println!("Email not found in subscribers list");
            }
        }

        Commands::Subscribers { stats, json } => {
            if stats {
                let stats = app.subscriptions.stats().await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                } else {
                    println!(
                        "{} total, {} active, {} inactive",
                        stats.total, stats.active, stats.inactive
                    );
                    print_subscribers(&stats.recent);
                }
            } else {
                let subscribers = app.subscriptions.list().await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&subscribers)?);
                } else {
                    print_subscribers(&subscribers);
                }
            }
        }

        Commands::SubscriberDelete { id } => {
            if app.subscriptions.delete(id).await? {
                println!("Subscriber deleted");
            } else {
                println!("Subscriber not found: {}", id);
            }
        }

        Commands::Preferences {
            email,
            videos,
            posts,
            gallery,
        } => {
            let Some(current) = app.subscriptions.find(&email).await? else {
                println!("Email not found in subscribers list");
                return Ok(());
            };
            let prefs = Preferences {
                video_updates: videos.unwrap_or(current.preferences.video_updates),
                post_updates: posts.unwrap_or(current.preferences.post_updates),
                gallery_updates: gallery.unwrap_or(current.preferences.gallery_updates),
            };
            if let Some(updated) = app.subscriptions.set_preferences(&email, prefs).await? {
                print_subscribers(&[updated]);
            }
        }

        Commands::AnnouncePost {
            title,
            url,
            excerpt,
            content,
            image,
        } => {
            let post = PostAnnouncement {
                title,
                url,
                excerpt,
                content,
                image_url: image,
            };
            let report = app.announce_post(&post).await?;
            println!(
                "Post notification sent: {}/{} successful",
                report.successful, report.total_targeted
            );
        }
    }

    Ok(())
}

async fn set_visibility(app: &App, id: i64, visible: bool) -> Result<()> {
    match app.catalog.set_visibility(id, visible).await? {
        Some(video) => println!(
            "Video {} is now {}: {}",
            video.id,
            if video.is_visible { "visible" } else { "hidden" },
            video.title
        ),
        None => println!("Video not found: {}", id),
    }
    Ok(())
}

fn print_videos(page: &VideoPage) {
    for video in &page.items {
        println!(
            "{:>6}  {}  {:<7}  {}  {}",
            video.id,
            video.published_at.format("%Y-%m-%d %H:%M"),
            if video.is_visible { "visible" } else { "hidden" },
            video.external_id,
            video.title
        );
    }
    println!(
        "page {}/{} ({} videos){}",
        page.current_page,
        page.total_pages.max(1),
        page.total_count,
        if page.has_more { ", more available" } else { "" }
    );
}

fn print_subscribers(subscribers: &[SubscriberRecord]) {
    for s in subscribers {
        let prefs = [Topic::Videos, Topic::Posts, Topic::Gallery]
            .into_iter()
            .filter(|topic| s.preferences.wants(*topic))
            .map(|topic| topic.to_string())
            .collect::<Vec<_>>()
            .join(",");

        println!(
            "{:>6}  {:<8}  {}  {}  [{}]  last notified: {}",
            s.id,
            if s.is_active { "active" } else { "inactive" },
            s.subscribed_at.format("%Y-%m-%d"),
            s.email,
            prefs,
            s.last_notified
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".to_string())
        );
    }
}
