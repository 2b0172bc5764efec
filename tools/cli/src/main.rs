//! gitmount CLI - Command line interface for browsing repository history.
//!
//! This tool mounts a repository as a read-only filesystem, or runs the same
//! filesystem operations directly for inspection and scripting.

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use gitmount_common::{flatten_ref_name, RefKind};
use gitmount_core::{Attributes, FsConfig, GitFs, NodeKind};
use gitmount_fuse::MountOptions;
use gitmount_store::{GitStore, ObjectStore};

/// Bytes requested per read when streaming a file to stdout.
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Parser)]
#[command(name = "gitmount")]
#[command(about = "gitmount - Browse git history as a read-only filesystem")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount a repository and serve it until interrupted.
    Mount {
        /// Path to the repository (working tree or bare).
        #[arg(short, long)]
        repo: PathBuf,

        /// Directory to mount on.
        #[arg(short, long)]
        mountpoint: PathBuf,

        /// JSON configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Allow other users to access the mount.
        #[arg(long)]
        allow_other: bool,
    },

    /// List a directory of the virtual filesystem.
    Ls {
        /// Path to the repository.
        #[arg(short, long, default_value = ".")]
        repo: PathBuf,

        /// Path inside the filesystem (default: root).
        #[arg(default_value = "/")]
        path: String,
    },

    /// Print a file of the virtual filesystem to stdout.
    Cat {
        /// Path to the repository.
        #[arg(short, long, default_value = ".")]
        repo: PathBuf,

        /// Path inside the filesystem.
        path: String,
    },

    /// Print the target of a link.
    Readlink {
        /// Path to the repository.
        #[arg(short, long, default_value = ".")]
        repo: PathBuf,

        /// Path inside the filesystem.
        path: String,
    },

    /// Show attributes of a path.
    Stat {
        /// Path to the repository.
        #[arg(short, long, default_value = ".")]
        repo: PathBuf,

        /// Path inside the filesystem.
        path: String,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// List branches, tags and remote refs with their head commits.
    Refs {
        /// Path to the repository.
        #[arg(short, long, default_value = ".")]
        repo: PathBuf,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Mount {
            repo,
            mountpoint,
            config,
            allow_other,
        } => cmd_mount(&repo, &mountpoint, config.as_deref(), allow_other).await,

        Commands::Ls { repo, path } => cmd_ls(&repo, &path),

        Commands::Cat { repo, path } => cmd_cat(&repo, &path),

        Commands::Readlink { repo, path } => cmd_readlink(&repo, &path),

        Commands::Stat { repo, path, json } => cmd_stat(&repo, &path, json),

        Commands::Refs { repo, json } => cmd_refs(&repo, json),

        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "gitmount", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Open the repository and build the filesystem over it.
fn open_fs(repo: &Path, config: Option<&Path>) -> Result<GitFs> {
    let config = match config {
        Some(path) => FsConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => FsConfig::default(),
    };
    let store = GitStore::open(repo)
        .with_context(|| format!("Failed to open repository at {:?}", repo))?;
    GitFs::new(Arc::new(store), config).context("Invalid configuration")
}

/// Mount the repository and block until Ctrl-C.
async fn cmd_mount(
    repo: &Path,
    mountpoint: &Path,
    config: Option<&Path>,
    allow_other: bool,
) -> Result<()> {
    if !gitmount_fuse::is_fuse_available() {
        bail!("{}", gitmount_fuse::fuse_info());
    }

    let fs = Arc::new(open_fs(repo, config)?);
    let options = MountOptions {
        allow_other,
        ..MountOptions::default()
    };

    let handle = gitmount_fuse::mount(fs, mountpoint, options).context("Failed to mount")?;
    info!(
        "Mounted {:?} at {:?} (read-only). Press Ctrl-C to unmount.",
        repo,
        handle.mount_point()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl-C")?;

    handle.unmount();
    info!("Unmounted {:?}", mountpoint);
    Ok(())
}

/// List a directory.
fn cmd_ls(repo: &Path, path: &str) -> Result<()> {
    let fs = open_fs(repo, None)?;
    let path = normalize(path);
    let entries = fs
        .readdir(&path)
        .with_context(|| format!("Failed to list {}", path))?;

    for entry in entries {
        println!("{} {}", kind_marker(entry.kind), entry.name);
    }
    Ok(())
}

/// Stream a file to stdout.
fn cmd_cat(repo: &Path, path: &str) -> Result<()> {
    let fs = open_fs(repo, None)?;
    let path = normalize(path);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut offset = 0u64;
    loop {
        let n = fs
            .read(&path, offset, &mut buf)
            .with_context(|| format!("Failed to read {}", path))?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        offset += n as u64;
    }
    out.flush()?;
    Ok(())
}

/// Print a link target.
fn cmd_readlink(repo: &Path, path: &str) -> Result<()> {
    let fs = open_fs(repo, None)?;
    let path = normalize(path);
    let target = fs
        .readlink(&path)
        .with_context(|| format!("Failed to read link {}", path))?;
    println!("{}", String::from_utf8_lossy(&target));
    Ok(())
}

/// Attributes as printed by `stat`.
#[derive(Debug, Serialize)]
struct StatOutput {
    path: String,
    kind: &'static str,
    size: u64,
    executable: bool,
    mtime: String,
}

impl StatOutput {
    fn new(path: &str, attrs: &Attributes) -> Self {
        Self {
            path: path.to_string(),
            kind: kind_name(attrs.kind),
            size: attrs.size,
            executable: attrs.executable,
            mtime: format_time(attrs.mtime),
        }
    }
}

/// Show attributes of a path.
fn cmd_stat(repo: &Path, path: &str, json: bool) -> Result<()> {
    let fs = open_fs(repo, None)?;
    let path = normalize(path);
    let attrs = fs
        .getattr(&path)
        .with_context(|| format!("Failed to stat {}", path))?;
    let output = StatOutput::new(&path, &attrs);

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("  Path:       {}", output.path);
        println!("  Kind:       {}", output.kind);
        println!("  Size:       {} bytes", output.size);
        println!("  Executable: {}", output.executable);
        println!("  Modified:   {}", output.mtime);
    }
    Ok(())
}

/// One row of the `refs` listing.
#[derive(Debug, Serialize)]
struct RefRow {
    kind: RefKind,
    name: String,
    commit: String,
    time: String,
}

/// List refs with their head commits.
fn cmd_refs(repo: &Path, json: bool) -> Result<()> {
    let store = GitStore::open(repo)
        .with_context(|| format!("Failed to open repository at {:?}", repo))?;
    let rows = ref_rows(&store)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No branches, tags or remote refs.");
        return Ok(());
    }
    for row in rows {
        println!(
            "{:<8} {:<32} {} {}",
            row.kind.dir_name(),
            row.name,
            &row.commit[..12],
            row.time
        );
    }
    Ok(())
}

fn ref_rows(store: &dyn ObjectStore) -> Result<Vec<RefRow>> {
    let mut rows = Vec::new();
    for info in store.refs().context("Failed to list refs")? {
        let commit = store
            .find_commit(&info.target)
            .with_context(|| format!("Failed to read commit of {}", info.full_name))?;
        rows.push(RefRow {
            kind: info.kind,
            name: flatten_ref_name(&info.short_name),
            commit: commit.id.to_string(),
            time: commit
                .time
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S %z")
                .to_string(),
        });
    }
    rows.sort_by_key(|row| RefKind::ALL.iter().position(|k| *k == row.kind));
    Ok(rows)
}

/// Make a user-supplied path mount-relative: leading slash, no trailing one.
fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn kind_name(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Directory => "directory",
        NodeKind::File => "file",
        NodeKind::Symlink => "symlink",
    }
}

fn kind_marker(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Directory => "[DIR] ",
        NodeKind::File => "[FILE]",
        NodeKind::Symlink => "[LINK]",
    }
}

fn format_time(time: SystemTime) -> String {
    chrono::DateTime::<chrono::Local>::from(time)
        .format("%Y-%m-%d %H:%M:%S %z")
        .to_string()
}
