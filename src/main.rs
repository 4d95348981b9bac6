//! deptool CLI
//!
//! Entry point for the `deptool` command-line tool.

use clap::{Args, Parser, Subcommand};
use deptool::{
    activate, download, upload, ActivationOutcome, CliOverrides, DeptoolConfig, DownloadOutcome,
    UploadReport,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "deptool")]
#[command(about = "Package, sync and activate prebuilt native dependencies", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to config file (default: ./deptool.toml if present)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Dependencies root directory
    #[arg(long, global = true)]
    deps_dir: Option<PathBuf>,

    /// Directory backing the object store
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Target {
    /// Dependency name (libluau, libpng, libjolt)
    name: String,

    /// Dependency version
    version: String,

    /// Platform (source, android, ios, macos, windows, linux, all)
    platform: String,

    /// Output in JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand a local archive into the active directory
    Activate(Target),

    /// Fetch an archive and its checksum from object storage
    Download {
        #[command(flatten)]
        target: Target,

        /// Replace artifacts that are already present
        #[arg(long)]
        force: bool,
    },

    /// Package pre-archive directories and push them to object storage
    Upload(Target),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let overrides = CliOverrides {
        deps_dir: cli.deps_dir,
        store_root: cli.store_dir,
    };
    let config = match DeptoolConfig::load(cli.config.as_deref(), &overrides) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::from(2);
        }
    };
    tracing::debug!(
        deps_dir = %config.deps_dir.display(),
        store_root = %config.store_root.display(),
        "configuration loaded"
    );

    let layout = config.layout();
    let result = match cli.command {
        Commands::Activate(t) => activate(&layout, &t.name, &t.version, &t.platform)
            .map(|o| report_activation(&o, t.json)),
        Commands::Download { target: t, force } => {
            let store = config.object_store();
            download(&store, &layout, &t.name, &t.version, &t.platform, force)
                .map(|o| report_download(&o, t.json))
        }
        Commands::Upload(t) => {
            let store = config.object_store();
            upload(
                &store,
                &layout,
                &t.name,
                &t.version,
                &t.platform,
                &config.excluded_filenames,
            )
            .map(|r| report_upload(&r, t.json))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing output: {}", e),
    }
}

fn report_activation(outcome: &ActivationOutcome, json: bool) {
    if json {
        return print_json(outcome);
    }
    match outcome {
        ActivationOutcome::AlreadyActive { path } => {
            println!("Already activated: {}", path.display());
        }
        ActivationOutcome::Activated {
            path,
            files,
            replaced,
            ..
        } => {
            let verb = if *replaced { "Replaced" } else { "Activated" };
            println!("{}: {} ({} files)", verb, path.display(), files);
        }
    }
}

fn report_download(outcome: &DownloadOutcome, json: bool) {
    if json {
        return print_json(outcome);
    }
    match outcome {
        DownloadOutcome::AlreadyPresent { path } => {
            println!("Artifacts already present locally, doing nothing.");
            println!("  {}", path.display());
            println!("Use --force to download them again.");
        }
        DownloadOutcome::Downloaded { files } => {
            for file in files {
                println!("Wrote: {}", file.display());
            }
        }
    }
}

fn report_upload(report: &UploadReport, json: bool) {
    if json {
        return print_json(report);
    }
    for artifact in &report.uploaded {
        println!("Uploaded: {} ({})", artifact.archive_key, artifact.checksum);
    }
    for platform in &report.skipped {
        println!("Skipped: {} (no local directory)", platform);
    }
    println!(
        "{} uploaded, {} skipped",
        report.uploaded.len(),
        report.skipped.len()
    );
}
