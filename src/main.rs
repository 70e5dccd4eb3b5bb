//! CLI entry point for the chapter downloader.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chapterdl_core::{
    DownloadQueueManager, DownloadTask, EventBus, FetchConfig, FsStore, HttpContentFetcher,
    Library, QueueConfig, StaticHtmlExtractor, Title,
};
use clap::Parser;
use tracing::{debug, info};
use uuid::Uuid;

mod app_config;
mod cli;
mod progress_ui;

use app_config::{FileConfig, load_default_file_config, resolve_default_data_dir};
use cli::{Args, ClearTarget, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    let file_config = load_default_file_config()?;

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config file > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => file_config.verbosity.map_or("info", |v| v.filter()),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, ?file_config, "CLI arguments parsed");

    let data_dir = args
        .data_dir
        .clone()
        .or_else(|| file_config.data_dir.clone())
        .unwrap_or_else(resolve_default_data_dir);
    let context = AppContext::open(&data_dir, &file_config).await?;

    match args.command {
        Command::Import { file } => import(&context, &file).await,
        Command::Titles => list_titles(&context).await,
        Command::Enqueue { title_id, chapters } => enqueue(&context, title_id, &chapters).await,
        Command::Run => run(&context, !args.quiet).await,
        Command::Status => {
            print_status(&context.manager).await;
            Ok(())
        }
        Command::Retry { chapter_id } => {
            context.manager.retry(chapter_id).await?;
            println!("re-queued chapter {chapter_id}");
            Ok(())
        }
        Command::Cancel { chapter_id } => {
            if !context.manager.cancel(chapter_id).await {
                bail!("no queued download for chapter {chapter_id}");
            }
            println!("cancelled chapter {chapter_id}");
            Ok(())
        }
        Command::Clear { list } => {
            match list {
                ClearTarget::Completed => context.manager.clear_completed().await,
                ClearTarget::Failed => context.manager.clear_failed().await,
                ClearTarget::Queue => context.manager.clear_queue().await,
            }
            Ok(())
        }
        Command::Read { chapter_id, unread } => {
            if !context.library.set_chapter_read(chapter_id, !unread).await? {
                bail!("chapter {chapter_id} is not in the library");
            }
            Ok(())
        }
        Command::Delete { chapter_id } => {
            if !context.library.delete_chapter_download(chapter_id).await? {
                bail!("chapter {chapter_id} is not in the library");
            }
            println!("deleted stored pages of chapter {chapter_id}");
            Ok(())
        }
    }
}

/// Library and queue opened over one data directory.
struct AppContext {
    library: Library,
    manager: DownloadQueueManager,
}

impl AppContext {
    async fn open(data_dir: &Path, file_config: &FileConfig) -> Result<Self> {
        let queue_config = file_config.queue_config(QueueConfig::default());
        let fetch_config = file_config.fetch_config(FetchConfig::default());
        debug!(data_dir = %data_dir.display(), ?queue_config, "opening library");

        let store = Arc::new(FsStore::new(data_dir));
        let library = Library::new(store.clone(), EventBus::new());
        let extractor = StaticHtmlExtractor::new(fetch_config.read_timeout)
            .context("Failed to build page extractor")?;
        let fetcher =
            HttpContentFetcher::new(&fetch_config).context("Failed to build HTTP client")?;

        let manager = DownloadQueueManager::open(
            Arc::new(extractor),
            Arc::new(fetcher),
            store,
            library.clone(),
            queue_config,
        )
        .await
        .with_context(|| format!("Failed to open download queue in '{}'", data_dir.display()))?;

        Ok(Self { library, manager })
    }
}

async fn import(context: &AppContext, file: &Path) -> Result<()> {
    let raw = fs::read_to_string(file)
        .with_context(|| format!("Failed to read title file '{}'", file.display()))?;
    let title: Title = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse title file '{}'", file.display()))?;
    let title = context.library.import_title(title).await?;
    println!("{}  {} ({} chapters)", title.id, title.name, title.chapters.len());
    Ok(())
}

async fn list_titles(context: &AppContext) -> Result<()> {
    let titles = context.library.titles().await?;
    if titles.is_empty() {
        println!("library is empty; add a title with `chapterdl import <FILE>`");
    }
    for title in titles {
        println!(
            "{}  {}  [{}/{} downloaded]",
            title.id,
            title.name,
            title.downloaded_count(),
            title.chapters.len()
        );
        for chapter in &title.chapters {
            let marker = match (chapter.is_downloaded, chapter.is_read) {
                (true, true) => "D R",
                (true, false) => "D  ",
                (false, true) => "  R",
                (false, false) => "   ",
            };
            println!("    {marker}  {}  {}", chapter.id, chapter.label());
        }
    }
    Ok(())
}

async fn enqueue(context: &AppContext, title_id: Uuid, numbers: &[f64]) -> Result<()> {
    let Some(title) = context.library.title(title_id).await? else {
        bail!("title {title_id} is not in the library\n  Suggestion: Run `chapterdl titles` to list title ids");
    };

    // Explicitly requested chapters ignore the hidden list
    let (chapters, excluded) = if numbers.is_empty() {
        (title.chapters.clone(), title.hidden_chapter_urls.clone())
    } else {
        let mut selected = Vec::with_capacity(numbers.len());
        for &number in numbers {
            let Some(chapter) = title.chapter_by_number(number) else {
                bail!("title '{}' has no chapter {number}", title.name);
            };
            selected.push(chapter.clone());
        }
        (selected, BTreeSet::new())
    };

    let added = context.manager.enqueue_all(chapters, &excluded).await;
    info!(title = %title.name, added, "chapters queued");
    println!("queued {added} chapter(s) of {}", title.name);
    Ok(())
}

async fn run(context: &AppContext, show_progress: bool) -> Result<()> {
    let manager = &context.manager;
    manager.start().await;

    let (ui_handle, ui_stop) = progress_ui::spawn_progress_ui(show_progress, manager.clone());
    let interrupted = tokio::select! {
        () = manager.wait_until_idle() => false,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            manager.pause().await;
            true
        }
    };
    let _ = ui_stop.send(true);
    if let Some(handle) = ui_handle {
        let _ = handle.await;
    }

    if interrupted {
        println!("paused; run `chapterdl run` again to continue");
    }
    print_status(manager).await;
    Ok(())
}

async fn print_status(manager: &DownloadQueueManager) {
    let snapshot = manager.snapshot().await;
    print_section("queue", &snapshot.queue);
    print_section("completed", &snapshot.completed);
    print_section("failed", &snapshot.failed);
}

fn print_section(name: &str, tasks: &[DownloadTask]) {
    println!("{name} ({})", tasks.len());
    for task in tasks {
        let detail = match &task.error {
            Some(error) => format!("  error: {error}"),
            None => format!("  {:.0}%", task.progress * 100.0),
        };
        println!(
            "    {}  {}  {}{detail}",
            task.chapter_id(),
            task.status,
            task.chapter.label()
        );
    }
}
