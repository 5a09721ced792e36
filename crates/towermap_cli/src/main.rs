//! TowerMap batch CLI.
//!
//! # Responsibility
//! - Drive dataset imports, merge scans and audit inspection over a local
//!   marker database.
//! - Keep all engine behavior in `towermap_core`; this binary only parses
//!   arguments, wires repositories and prints outcomes.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use towermap_core::db::open_db;
use towermap_core::ingest::sources::agcom::AgcomAdapter;
use towermap_core::ingest::sources::aria_veneto::AriaVenetoAdapter;
use towermap_core::ingest::sources::arpa_fvg::ArpaFvgAdapter;
use towermap_core::ingest::sources::arpat_toscana::ArpatToscanaAdapter;
use towermap_core::ingest::sources::lte_italy::LteItalyAdapter;
use towermap_core::ingest::{run_import, SourceAdapter};
use towermap_core::logging::{default_log_level, init_logging};
use towermap_core::merge::scanner::ClusterScanner;
use towermap_core::repo::audit_repo::{AuditRepository, SqliteAuditRepository};
use towermap_core::repo::marker_repo::SqliteMarkerRepository;

#[derive(Parser, Debug)]
#[command(name = "towermap")]
#[command(about = "Batch import and merge tooling for the TowerMap marker store")]
#[command(version)]
struct Cli {
    /// SQLite database file.
    #[arg(long, default_value = "towermap.db", env = "TOWERMAP_DB")]
    db: PathBuf,

    /// Log directory; created if missing.
    #[arg(long, default_value = "logs", env = "TOWERMAP_LOG_DIR")]
    log_dir: PathBuf,

    /// Log level: error, warn, info, debug or trace.
    #[arg(long, env = "TOWERMAP_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import an external dataset file.
    Import {
        /// Dataset the file comes from.
        #[arg(value_enum)]
        source: SourceKind,
        /// Path to the source file.
        file: PathBuf,
        /// Dedup radius override in meters (arpa-fvg only).
        #[arg(long)]
        radius: Option<f64>,
    },
    /// Merge all markers closer than the given distance.
    MergeNearby {
        /// Distance threshold in meters.
        #[arg(long, default_value_t = 10.0)]
        radius: f64,
    },
    /// Print recent audit entries, newest first.
    Audit {
        /// Maximum number of entries to print.
        #[arg(long, default_value_t = 200)]
        limit: u32,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SourceKind {
    LteItaly,
    Agcom,
    ArpatToscana,
    AriaVeneto,
    ArpaFvg,
}

impl SourceKind {
    fn adapter(self, radius_override: Option<f64>) -> Result<Box<dyn SourceAdapter>, String> {
        if radius_override.is_some() && !matches!(self, Self::ArpaFvg) {
            return Err("--radius is only supported for the arpa-fvg source".to_string());
        }
        Ok(match self {
            Self::LteItaly => Box::new(LteItalyAdapter::new()),
            Self::Agcom => Box::new(AgcomAdapter::new()),
            Self::ArpatToscana => Box::new(ArpatToscanaAdapter::new()),
            Self::AriaVeneto => Box::new(AriaVenetoAdapter::new()),
            Self::ArpaFvg => match radius_override {
                Some(radius) => Box::new(ArpaFvgAdapter::with_radius(radius)),
                None => Box::new(ArpaFvgAdapter::new()),
            },
        })
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_dir = absolutize(&cli.log_dir);
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| default_log_level().to_string());
    if let Err(err) = init_logging(&level, &log_dir.to_string_lossy()) {
        eprintln!("logging setup failed: {err}");
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let conn = open_db(&cli.db)
        .map_err(|err| format!("failed to open database `{}`: {err}", cli.db.display()))?;
    let markers = SqliteMarkerRepository::try_new(&conn).map_err(|err| err.to_string())?;
    let audit = SqliteAuditRepository::try_new(&conn).map_err(|err| err.to_string())?;

    match &cli.command {
        Command::Import {
            source,
            file,
            radius,
        } => {
            let adapter = source.adapter(*radius)?;
            let report = run_import(&markers, &audit, adapter.as_ref(), file)
                .map_err(|err| err.to_string())?;
            println!(
                "parsed {} rows: {} created, {} reconciled, {} skipped, {} failed",
                report.parsed, report.created, report.reconciled, report.skipped, report.failed
            );

            let profile = adapter.profile();
            if profile.post_import_scan {
                let eliminated = ClusterScanner::new(&markers)
                    .scan(profile.dedup_radius_m)
                    .map_err(|err| err.to_string())?;
                println!("merged {eliminated} markers");
            }
            Ok(())
        }
        Command::MergeNearby { radius } => {
            let eliminated = ClusterScanner::new(&markers)
                .scan(*radius)
                .map_err(|err| err.to_string())?;
            println!("merged {eliminated} markers");
            Ok(())
        }
        Command::Audit { limit } => {
            let entries = audit.list_recent(*limit).map_err(|err| err.to_string())?;
            for entry in &entries {
                let marker = entry
                    .marker_id
                    .map_or_else(|| "-".to_string(), |id| id.to_string());
                let user = entry
                    .user_id
                    .map_or_else(|| "-".to_string(), |id| id.to_string());
                println!(
                    "{} {:<6} marker={marker} user={user}",
                    entry.timestamp,
                    entry.action.as_str()
                );
            }
            Ok(())
        }
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
