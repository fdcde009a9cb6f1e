use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};

use drive_core::batch::{BatchCoordinator, BatchEvent, BatchReport};
use drive_core::config::DriveConfig;
use drive_core::directory;
use drive_core::format::{format_bytes, format_relative_date};
use drive_core::mutation::{self, Download, MutationOutcome};
use drive_core::path;
use drive_core::tree::{Filter, SortOrder, TreeView};
use drive_core::{DriveSession, Entry};
use drive_github::{GitHubStore, GitHubTarget};
use drive_platform::StaticCredential;

#[derive(Parser, Debug)]
#[command(name = "repodrive")]
#[command(about = "Use a GitHub repository as a personal file drive")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(long, env = "REPODRIVE_CONFIG_PATH", global = true)]
    config_path: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "REPODRIVE_LOG_LEVEL", global = true)]
    log_level: String,

    /// Repository owner
    #[arg(long, env = "REPODRIVE_OWNER", global = true)]
    owner: Option<String>,

    /// Repository holding the drive
    #[arg(long, env = "REPODRIVE_REPO", global = true)]
    repo: Option<String>,

    /// Branch to commit to
    #[arg(long, env = "REPODRIVE_BRANCH", global = true)]
    branch: Option<String>,

    /// Personal access token
    #[arg(long, env = "REPODRIVE_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// Write the effective settings (minus the token) back to the config file
    #[arg(long, global = true)]
    save_config: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List a folder
    Ls {
        #[arg(default_value = "")]
        path: String,
        /// all, folders, images, documents, recent
        #[arg(long, default_value = "all")]
        filter: Filter,
        /// name, name_desc, newest, oldest, largest, smallest
        #[arg(long, default_value = "name")]
        sort: SortOrder,
        /// Case-insensitive name substring
        #[arg(long)]
        search: Option<String>,
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create an empty folder
    Mkdir { path: String },
    /// Upload local files into a folder
    Upload {
        dir: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Download one file
    Download {
        path: String,
        /// Output file (default: the file's name in the current directory)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Rename a file within its folder
    Rename { path: String, new_name: String },
    /// Move a file into another folder
    Mv { path: String, dest_dir: String },
    /// Delete files from a folder
    Rm {
        dir: String,
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Delete the files of a folder (subfolders are left alone)
    Rmdir { path: String },
    /// Download several files from a folder
    Get {
        dir: String,
        #[arg(required = true)]
        names: Vec<String>,
        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Folder statistics and storage usage
    Stats {
        #[arg(default_value = "")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli
        .config_path
        .clone()
        .map(PathBuf::from)
        .unwrap_or_else(DriveConfig::default_path);

    let mut config = if config_path.exists() {
        info!("loading config from {}", config_path.display());
        DriveConfig::load(&config_path)?
    } else {
        info!("no config at {}, using defaults", config_path.display());
        DriveConfig::default()
    };

    // CLI args override config file
    if let Some(owner) = cli.owner.clone() {
        config.owner = owner;
    }
    if let Some(repo) = cli.repo.clone() {
        config.repo = repo;
    }
    if let Some(branch) = cli.branch.clone() {
        config.branch = Some(branch);
    }

    if cli.save_config {
        config.save(&config_path)?;
        info!("config saved to {}", config_path.display());
    }

    if let Some(token) = cli.token.clone() {
        config.token = Some(token);
    }
    if config.owner.is_empty() {
        anyhow::bail!("repository owner is required (--owner or config file)");
    }

    let session = open_session(&config)?;
    run(cli.command, &session, &config).await
}

fn open_session(config: &DriveConfig) -> Result<DriveSession> {
    let target = GitHubTarget {
        api_url: config.api_url.clone(),
        owner: config.owner.clone(),
        repo: config.repo.clone(),
        branch: config.branch.clone(),
    };
    let credential = Arc::new(StaticCredential::new(config.token.clone()));
    let store = GitHubStore::new(target, credential, config.request_timeout())
        .context("failed to set up GitHub client")?;
    Ok(DriveSession::new(Arc::new(store), config.limits()))
}

async fn run(command: Commands, session: &DriveSession, config: &DriveConfig) -> Result<()> {
    match command {
        Commands::Ls {
            path,
            filter,
            sort,
            search,
            json,
        } => {
            let mut view = TreeView::new();
            view.navigate(session, &path).await?;
            view.set_filter(filter);
            view.set_sort(sort);
            if let Some(query) = search {
                view.set_search(&query);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&view.visible())?);
            } else {
                print_listing(&view);
            }
        }
        Commands::Mkdir { path } => {
            directory::create_directory(session, &path).await?;
            println!("created {}", path::normalize(&path));
        }
        Commands::Upload { dir, files } => {
            let mut payload = Vec::with_capacity(files.len());
            for file in &files {
                let name = file
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .with_context(|| format!("{} has no file name", file.display()))?;
                let content = tokio::fs::read(file)
                    .await
                    .with_context(|| format!("failed to read {}", file.display()))?;
                payload.push((name, content));
            }
            let (coordinator, progress) = with_progress(session);
            let report = coordinator.upload_many(&dir, payload).await;
            drop(coordinator);
            let _ = progress.await;
            print_report("uploaded", &report);
            check_report(&report)?;
        }
        Commands::Download { path, out } => {
            let entry = lookup(session, &path).await?;
            let download = mutation::download(session, &entry).await?;
            let target = out.unwrap_or_else(|| PathBuf::from(&download.name));
            write_download(&download, &target).await?;
        }
        Commands::Rename { path, new_name } => {
            let entry = lookup(session, &path).await?;
            let outcome = mutation::rename(session, &entry, &new_name).await?;
            report_mutation(&outcome)?;
        }
        Commands::Mv { path, dest_dir } => {
            let entry = lookup(session, &path).await?;
            let outcome = mutation::move_to(session, &entry, &dest_dir).await?;
            report_mutation(&outcome)?;
        }
        Commands::Rm { dir, names } => {
            let mut view = select_in(session, &dir, &names).await?;
            let (coordinator, progress) = with_progress(session);
            let report = coordinator.delete_selected(&mut view).await?;
            drop(coordinator);
            let _ = progress.await;
            print_report("deleted", &report);
            check_report(&report)?;
        }
        Commands::Rmdir { path } => {
            let report = mutation::delete_directory(session, &path).await?;
            for outcome in &report.outcomes {
                match &outcome.result {
                    Ok(()) => println!("deleted {}", outcome.path),
                    Err(e) => eprintln!("failed {}: {}", outcome.path, e),
                }
            }
            for skipped in &report.skipped {
                eprintln!("skipped folder {}", skipped);
            }
            if report.removed_marker {
                println!("removed folder {}", report.path);
            }
            if let Some(e) = &report.marker_error {
                eprintln!("failed to remove folder {}: {}", report.path, e);
            }
            if report.failed() > 0 {
                anyhow::bail!("{} of {} deletions failed", report.failed(), report.outcomes.len());
            }
            if report.marker_error.is_some() {
                anyhow::bail!("{} is still listed", report.path);
            }
        }
        Commands::Get { dir, names, out } => {
            let mut view = select_in(session, &dir, &names).await?;
            let (coordinator, progress) = with_progress(session);
            let report = coordinator.download_selected(&mut view).await?;
            drop(coordinator);
            let _ = progress.await;
            for outcome in &report.outcomes {
                if let Ok(download) = &outcome.result {
                    write_download(download, &out.join(&download.name)).await?;
                }
            }
            print_report("downloaded", &report);
            check_report(&report)?;
        }
        Commands::Stats { path } => {
            let mut view = TreeView::new();
            view.navigate(session, &path).await?;
            let stats = view.stats();
            let usage = view.storage_usage(config.quota_bytes);
            let location: Vec<String> = view.breadcrumbs().into_iter().map(|c| c.label).collect();
            println!("{}", location.join(" / "));
            println!("folders: {}", stats.folders);
            println!("files:   {}", stats.files);
            println!("images:  {}", stats.images);
            println!("pdfs:    {}", stats.pdfs);
            println!(
                "used:    {} of {} ({:.1}%)",
                format_bytes(usage.used_bytes),
                format_bytes(usage.quota_bytes),
                usage.percent
            );
        }
    }
    Ok(())
}

/// Resolve a drive path to the entry its parent folder currently lists.
async fn lookup(session: &DriveSession, path: &str) -> Result<Entry> {
    let path = path::normalize(path);
    let mut view = TreeView::new();
    view.navigate(session, path::parent_of(&path)).await?;
    let entry = view
        .find(path::name_of(&path))
        .cloned()
        .ok_or_else(|| drive_core::DriveError::NotFound { path: path.clone() })?;
    Ok(entry)
}

async fn select_in(session: &DriveSession, dir: &str, names: &[String]) -> Result<TreeView> {
    let mut view = TreeView::new();
    view.navigate(session, dir).await?;
    for name in names {
        if !view.contains_name(name) {
            warn!("{} is not in {:?}", name, dir);
        }
        view.selection_mut().select(path::join(dir, name));
    }
    Ok(view)
}

fn with_progress(session: &DriveSession) -> (BatchCoordinator<'_>, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                BatchEvent::Started { total } => info!("starting batch of {} item(s)", total),
                BatchEvent::ItemFinished { index, path, ok } => {
                    info!("[{}] {} {}", index + 1, path, if ok { "ok" } else { "failed" })
                }
                BatchEvent::Finished { succeeded, failed } => {
                    info!("batch done: {} ok, {} failed", succeeded, failed)
                }
            }
        }
    });
    (BatchCoordinator::new(session).with_progress(tx), handle)
}

fn print_listing(view: &TreeView) {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let entries = view.visible_at(now);
    if entries.is_empty() {
        println!("(empty)");
        return;
    }
    for entry in entries {
        if entry.is_dir() {
            println!("{:>10}  {:<12}  {}/", "-", "Folder", entry.name);
        } else {
            let size = format_bytes(entry.size.unwrap_or(0));
            let date = entry
                .modified
                .map(|m| format_relative_date(m, now))
                .unwrap_or_default();
            println!("{:>10}  {:<12}  {}", size, date, entry.name);
        }
    }
}

fn report_mutation(outcome: &MutationOutcome) -> Result<()> {
    let mutation = outcome.mutation();
    match outcome {
        MutationOutcome::Completed { .. } => {
            println!("{} -> {}", mutation.from, mutation.to);
            Ok(())
        }
        MutationOutcome::PartialFailure { error, .. } => {
            eprintln!(
                "{} was written but {} could not be removed: {}",
                mutation.to, mutation.from, error
            );
            eprintln!("both paths now exist; delete {} to finish", mutation.from);
            anyhow::bail!("partial failure")
        }
    }
}

fn print_report<T>(verb: &str, report: &BatchReport<T>) {
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(_) => println!("{} {}", verb, outcome.path),
            Err(e) => eprintln!("failed {}: {}", outcome.path, e),
        }
    }
}

fn check_report<T>(report: &BatchReport<T>) -> Result<()> {
    if report.failed > 0 {
        anyhow::bail!(
            "{} of {} item(s) failed",
            report.failed,
            report.failed + report.succeeded
        );
    }
    Ok(())
}

async fn write_download(download: &Download, target: &Path) -> Result<()> {
    tokio::fs::write(target, &download.content)
        .await
        .with_context(|| format!("failed to write {}", target.display()))?;
    println!(
        "{} -> {} ({})",
        download.path,
        target.display(),
        format_bytes(download.size)
    );
    Ok(())
}
