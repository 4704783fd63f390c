//! LVCS Host — command-line access to a local history store
//!
//! Opens a directory-backed history, applies simple mutations to it and
//! prints what the history knows about the tree.

use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lvcs_core::{
    at_or_before, exactly, Clock, DirectoryStorage, EntryRef, LocalVcs, LvcsConfig, RecentChange,
    Revision, RevisionKind, SystemClock,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lvcs")]
#[command(about = "Inspect and maintain a local history store")]
#[command(version, long_about = None)]
struct Args {
    /// Directory holding the history state and stored contents
    #[arg(short, long, default_value = ".lvcs")]
    store: PathBuf,

    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the current entry tree
    Tree,
    /// List the revisions of an entry, newest first
    Revisions { path: String },
    /// Print file content, optionally as it was before a change
    Content {
        path: String,
        /// Content before the change made exactly at this time (ms)
        #[arg(long, conflicts_with = "before")]
        at: Option<i64>,
        /// Content before the newest change made at or before this time (ms)
        #[arg(long)]
        before: Option<i64>,
    },
    /// List recent named changes
    Recent,
    /// Put a label on the whole history or on one entry
    Label {
        name: String,
        #[arg(long)]
        path: Option<String>,
    },
    /// Drop history older than the given age
    Purge {
        /// Retention in milliseconds, the configured period when omitted
        #[arg(long)]
        older_than_ms: Option<i64>,
    },
    /// Record a new directory
    Mkdir { path: String },
    /// Record the content of a local file under `path`
    Write { path: String, file: PathBuf },
    /// Record a rename
    Rename { path: String, new_name: String },
    /// Record a move under another directory ("" for the top level)
    Mv { path: String, new_parent: String },
    /// Record a deletion
    Rm { path: String },
}

fn load_config(config_path: Option<PathBuf>) -> Result<LvcsConfig> {
    match config_path {
        Some(path) => LvcsConfig::load(&path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(LvcsConfig::default()),
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn format_time(millis: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis)
        .map(|time| time.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}

fn render_entry(out: &mut String, entry: EntryRef<'_>, depth: usize) {
    let indent = "  ".repeat(depth);
    if entry.is_directory() {
        let _ = writeln!(out, "{indent}{}/", entry.name());
        for child in entry.children() {
            render_entry(out, child, depth + 1);
        }
    } else {
        let size = entry
            .content()
            .and_then(|content| content.bytes())
            .map(|bytes| format!("{} bytes", bytes.len()))
            .unwrap_or_else(|| "unavailable".to_string());
        let _ = writeln!(out, "{indent}{} ({size})", entry.name());
    }
}

fn render_tree(vcs: &LocalVcs) -> String {
    let mut out = String::new();
    for root in vcs.roots() {
        render_entry(&mut out, root, 0);
    }
    out
}

fn render_revision(revision: &Revision) -> String {
    let (kind, index) = match &revision.kind {
        RevisionKind::Current => ("current", None),
        RevisionKind::Labeled { index, .. } => ("label", Some(index)),
        RevisionKind::AfterChange { index, .. } => ("after", Some(index)),
        RevisionKind::BeforeChange { index, .. } => ("before", Some(index)),
    };
    let mut line = format!("{:<8}{}", kind, format_time(revision.timestamp));
    if let Some(index) = index {
        let _ = write!(line, " #{}", index.0);
    }
    if let Some(name) = revision.name() {
        let _ = write!(line, " {name:?}");
    }
    if let Some(bytes) = revision.content.as_ref().and_then(|content| content.bytes()) {
        let _ = write!(line, " [{} bytes]", bytes.len());
    }
    line
}

fn render_recent(change: &RecentChange) -> String {
    format!(
        "{} {}",
        format_time(change.timestamp),
        change.name.as_deref().unwrap_or("<unnamed>")
    )
}

/// Modification time of a local file in ms, the clock when unknown.
fn modified_millis(file: &Path, clock: &dyn Clock) -> i64 {
    fs::metadata(file)
        .and_then(|metadata| metadata.modified())
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or_else(|| clock.now())
}

fn run(vcs: &mut LocalVcs, command: Command, clock: &dyn Clock) -> Result<()> {
    let mut stdout = io::stdout().lock();
    match command {
        Command::Tree => stdout.write_all(render_tree(vcs).as_bytes())?,
        Command::Revisions { path } => {
            for revision in vcs.get_revisions_for(&path)? {
                writeln!(stdout, "{}", render_revision(&revision))?;
            }
        }
        Command::Content { path, at, before } => {
            let bytes = match (at, before) {
                (Some(at), _) => vcs.get_byte_content(&path, &exactly(at))?,
                (None, Some(before)) => vcs.get_byte_content(&path, &at_or_before(before))?,
                (None, None) => vcs
                    .get_entry(&path)?
                    .content()
                    .and_then(|content| content.bytes()),
            };
            match bytes {
                Some(bytes) => stdout.write_all(&bytes)?,
                None => anyhow::bail!("content of {path} is not available"),
            }
        }
        Command::Recent => {
            for change in vcs.get_recent_changes() {
                writeln!(stdout, "{}", render_recent(&change))?;
            }
        }
        Command::Label { name, path } => {
            match path {
                Some(path) => vcs.put_entry_label(&path, &name)?,
                None => vcs.put_label(&name, false)?,
            }
            vcs.save()?;
        }
        Command::Purge { older_than_ms } => {
            let released = match older_than_ms {
                Some(period) => {
                    let released = vcs.purge_obsolete(period)?;
                    vcs.save()?;
                    released
                }
                None => vcs.purge_obsolete_and_save()?,
            };
            writeln!(stdout, "released {released} stored contents")?;
        }
        Command::Mkdir { path } => {
            vcs.create_directory(&path)?;
            vcs.save()?;
        }
        Command::Write { path, file } => {
            let bytes =
                fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let timestamp = modified_millis(&file, clock);
            if vcs.has_entry(&path) {
                vcs.change_file_content(&path, &bytes, timestamp)?;
            } else {
                vcs.create_file(&path, &bytes, timestamp)?;
            }
            vcs.save()?;
        }
        Command::Rename { path, new_name } => {
            vcs.rename(&path, &new_name)?;
            vcs.save()?;
        }
        Command::Mv { path, new_parent } => {
            vcs.move_entry(&path, &new_parent)?;
            vcs.save()?;
        }
        Command::Rm { path } => {
            vcs.delete(&path)?;
            vcs.save()?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = load_config(args.config)?;
    debug!("Configuration loaded: {:?}", config);

    info!("Opening local history at {}", args.store.display());
    let storage = Arc::new(DirectoryStorage::open(&args.store)?);
    let clock = Arc::new(SystemClock);
    let mut vcs = LocalVcs::open_or_rebuild(storage, clock.clone(), config)?;

    run(&mut vcs, args.command, clock.as_ref())
}
