//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

/// Download manga chapters for offline reading.
///
/// Chapters are queued per title and downloaded one at a time: the reader
/// page is scanned for page images, which are fetched in reading order and
/// stored under the data directory.
#[derive(Parser, Debug)]
#[command(name = "chapterdl")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Library and queue state directory (overrides the config file)
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add or replace a title from a JSON file
    Import {
        /// Title JSON (name, sourceUrl, chapters)
        file: PathBuf,
    },
    /// List titles in the library
    Titles,
    /// Queue a title's chapters for download
    Enqueue {
        /// Title id as shown by `titles`
        title_id: Uuid,
        /// Only queue the given chapter numbers (repeatable)
        #[arg(short, long = "chapter", value_name = "N")]
        chapters: Vec<f64>,
    },
    /// Download everything queued until done or interrupted
    Run,
    /// Show queued, completed and failed downloads
    Status,
    /// Move a failed download back to the queue
    Retry {
        /// Chapter id
        chapter_id: Uuid,
    },
    /// Remove a queued download
    Cancel {
        /// Chapter id
        chapter_id: Uuid,
    },
    /// Empty one of the download lists
    Clear {
        /// Which list to empty
        #[arg(value_enum)]
        list: ClearTarget,
    },
    /// Mark a chapter read (or unread)
    Read {
        /// Chapter id
        chapter_id: Uuid,
        /// Mark unread instead
        #[arg(long)]
        unread: bool,
    },
    /// Delete a chapter's stored pages
    Delete {
        /// Chapter id
        chapter_id: Uuid,
    },
}

/// Lists `clear` can empty.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClearTarget {
    Completed,
    Failed,
    Queue,
}
