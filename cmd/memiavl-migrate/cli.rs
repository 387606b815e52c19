use std::{
    fmt::Display,
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
    time::Instant,
};

use clap::{Parser as ClapParser, Subcommand as ClapSubcommand};
use eyre::{Result, WrapErr};
use migrate_core::{MigrationError, MigrationSummary, StoreOutcome, StoreSummary};
use migrate_snapshot::snapshot_name;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};

const REPORT_SCHEMA_VERSION: u32 = 1;

#[allow(clippy::upper_case_acronyms)]
#[derive(ClapParser)]
#[command(
    name = "memiavl-migrate",
    author = "Cronos",
    about = "Migrate legacy IAVL databases to memiavl snapshots"
)]
pub struct CLI {
    #[arg(
        long = "log.level",
        global = true,
        default_value_t = Level::INFO,
        value_name = "LOG_LEVEL",
        env = "MEMIAVL_MIGRATE_LOG_LEVEL",
        help = "The verbosity level used for logs.",
        long_help = "Possible values: info, debug, trace, warn, error"
    )]
    pub log_level: Level,
    #[arg(
        long = "log.color",
        global = true,
        default_value_t = LogColor::Auto,
        env = "MEMIAVL_MIGRATE_LOG_COLOR",
        help = "Output logs with ANSI color codes.",
        long_help = "Possible values: auto, always, never"
    )]
    pub log_color: LogColor,
    #[command(subcommand)]
    pub command: Subcommand,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum LogColor {
    #[default]
    Auto,
    Always,
    Never,
}

impl Display for LogColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogColor::Auto => write!(f, "auto"),
            LogColor::Always => write!(f, "always"),
            LogColor::Never => write!(f, "never"),
        }
    }
}

impl FromStr for LogColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(LogColor::Auto),
            "always" => Ok(LogColor::Always),
            "never" => Ok(LogColor::Never),
            _ => Err(format!(
                "Invalid log color '{s}'. Expected: auto, always, or never"
            )),
        }
    }
}

#[derive(ClapSubcommand)]
pub enum Subcommand {
    #[command(
        name = "snapshot",
        about = "Given an iavl v0 application.db build a memiavl snapshot"
    )]
    Snapshot {
        #[arg(long = "db-v0", value_name = "PATH", env = "MEMIAVL_MIGRATE_DB_V0")]
        /// Path to the legacy application.db
        db_v0: PathBuf,
        #[arg(long = "out", value_name = "DIR", env = "MEMIAVL_MIGRATE_OUT")]
        /// Directory in which the snapshot is created
        out: PathBuf,
        #[arg(long = "json", default_value_t = false)]
        /// Emit machine-readable JSON output
        json: bool,
        #[arg(long = "report-file")]
        /// Optional path to append emitted reports (JSON lines in --json mode)
        report_file: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct MigrationReport {
    schema_version: u32,
    status: &'static str,
    version: i64,
    snapshot: PathBuf,
    stores: Vec<StoreSummary>,
    migrated_stores: usize,
    skipped_stores: usize,
    nodes: u64,
    elapsed_ms: u64,
}

impl MigrationReport {
    fn new(summary: MigrationSummary, snapshot: PathBuf) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            status: "completed",
            version: summary.version,
            snapshot,
            migrated_stores: summary.migrated_stores(),
            skipped_stores: summary.skipped_stores(),
            nodes: summary.total_nodes(),
            elapsed_ms: summary.elapsed.as_millis() as u64,
            stores: summary.stores,
        }
    }
}

#[derive(Serialize)]
struct MigrationErrorReport {
    schema_version: u32,
    status: &'static str,
    phase: &'static str,
    error_type: &'static str,
    error: String,
    elapsed_ms: u64,
}

fn elapsed_ms(started_at: Instant) -> u64 {
    started_at.elapsed().as_millis() as u64
}

fn classify(error: &eyre::Report) -> (&'static str, &'static str) {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<MigrationError>())
        .map_or(("execution", "internal"), |error| (error.phase(), error.kind()))
}

fn build_migration_error_report(error: &eyre::Report, started_at: Instant) -> MigrationErrorReport {
    let (phase, error_type) = classify(error);
    MigrationErrorReport {
        schema_version: REPORT_SCHEMA_VERSION,
        status: "failed",
        phase,
        error_type,
        error: format!("{error:#}"),
        elapsed_ms: elapsed_ms(started_at),
    }
}

/// Lines printed for a successful run: one JSON document, or one line per
/// store followed by a summary.
fn render_report(report: &MigrationReport, json: bool) -> Result<Vec<String>> {
    if json {
        let encoded =
            serde_json::to_string(report).wrap_err("Cannot serialize migration report")?;
        return Ok(vec![encoded]);
    }

    let mut lines: Vec<String> = report
        .stores
        .iter()
        .map(|store| match &store.outcome {
            StoreOutcome::Migrated { nodes } => {
                format!("Store {}: migrated {nodes} node(s)", store.name)
            }
            StoreOutcome::Skipped { reason } => {
                format!("Store {}: skipped ({reason})", store.name)
            }
        })
        .collect();
    lines.push(format!(
        "Migration completed successfully: snapshot at version {} in {}, {} store(s) migrated, {} skipped, {} node(s) in {}ms.",
        report.version,
        report.snapshot.display(),
        report.migrated_stores,
        report.skipped_stores,
        report.nodes,
        report.elapsed_ms
    ));
    Ok(lines)
}

fn write_report_file(path: &Path, lines: &[String]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .wrap_err_with(|| format!("Cannot create report directory {dir:?}"))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .wrap_err_with(|| format!("Cannot open report file {path:?}"))?;
    for line in lines {
        writeln!(file, "{line}").wrap_err_with(|| format!("Cannot write report file {path:?}"))?;
    }
    Ok(())
}

/// Appends `lines` to the report file, if any. The run outcome is already
/// final at this point, so a write failure only produces a warning.
fn persist_report(report_file: Option<&Path>, lines: &[String]) {
    if let Some(path) = report_file
        && let Err(error) = write_report_file(path, lines)
    {
        eprintln!("Warning: report not saved: {error:#}");
    }
}

fn emit_report(report: &MigrationReport, json: bool, report_file: Option<&Path>) -> Result<()> {
    let lines = render_report(report, json)?;
    for line in &lines {
        println!("{line}");
    }
    persist_report(report_file, &lines);
    Ok(())
}

pub fn emit_error_report(
    json: bool,
    started_at: Instant,
    error: &eyre::Report,
    report_file: Option<&Path>,
) {
    let line = if json {
        match serde_json::to_string(&build_migration_error_report(error, started_at)) {
            Ok(encoded) => {
                println!("{encoded}");
                encoded
            }
            Err(encode_error) => {
                eprintln!("Migration failed: {error:#}\nReport encoding failed: {encode_error}");
                return;
            }
        }
    } else {
        let line = format!(
            "Migration failed after {}ms: {error:#}",
            elapsed_ms(started_at)
        );
        eprintln!("{line}");
        line
    };
    persist_report(report_file, &[line]);
}

impl Subcommand {
    pub fn json_output(&self) -> bool {
        match self {
            Self::Snapshot { json, .. } => *json,
        }
    }

    pub fn report_file(&self) -> Option<&Path> {
        match self {
            Self::Snapshot { report_file, .. } => report_file.as_deref(),
        }
    }

    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        match self {
            Self::Snapshot {
                db_v0,
                out,
                json,
                report_file,
            } => {
                let report = build_snapshot(db_v0.clone(), out.clone(), cancel).await?;
                emit_report(&report, *json, report_file.as_deref())
            }
        }
    }
}

async fn build_snapshot(
    db_v0: PathBuf,
    out: PathBuf,
    cancel: CancellationToken,
) -> Result<MigrationReport> {
    info!(db_v0 = %db_v0.display(), out = %out.display(), "Starting snapshot migration");

    let (summary, out) = tokio::task::spawn_blocking(move || {
        migrate_core::migrate_to_snapshot(&db_v0, &out, &cancel).map(|summary| (summary, out))
    })
    .await
    .wrap_err("Migration task panicked")?
    .wrap_err("Cannot build memiavl snapshot")?;

    let version = u32::try_from(summary.version).wrap_err("Snapshot version out of range")?;
    let snapshot = out.join(snapshot_name(version));
    Ok(MigrationReport::new(summary, snapshot))
}

#[cfg(test)]
mod tests {
    use std::{fs, time::Duration};

    use super::{
        CLI, LogColor, MigrationErrorReport, MigrationReport, REPORT_SCHEMA_VERSION, Subcommand,
        build_migration_error_report, emit_report, render_report, write_report_file,
    };
    use clap::Parser;
    use migrate_core::{MigrationError, MigrationSummary, StoreOutcome, StoreSummary};
    use serde_json::Value;
    use std::time::Instant;
    use tempfile::TempDir;
    use tracing::Level;

    fn summary() -> MigrationSummary {
        MigrationSummary {
            version: 42,
            stores: vec![
                StoreSummary {
                    name: "bank".into(),
                    outcome: StoreOutcome::Migrated { nodes: 5 },
                },
                StoreSummary {
                    name: "staking".into(),
                    outcome: StoreOutcome::Skipped {
                        reason: "Store `staking` has no committed tree".into(),
                    },
                },
            ],
            elapsed: Duration::from_millis(12),
        }
    }

    #[test]
    fn parses_snapshot_command() {
        let cli = CLI::try_parse_from([
            "memiavl-migrate",
            "snapshot",
            "--db-v0",
            "/data/application.db",
            "--out",
            "/data/memiavl.db",
            "--json",
            "--log.level",
            "debug",
        ])
        .expect("arguments should parse");

        assert_eq!(cli.log_level, Level::DEBUG);
        assert_eq!(cli.log_color, LogColor::Auto);
        let Subcommand::Snapshot {
            db_v0,
            out,
            json,
            report_file,
        } = cli.command;
        assert_eq!(db_v0, std::path::PathBuf::from("/data/application.db"));
        assert_eq!(out, std::path::PathBuf::from("/data/memiavl.db"));
        assert!(json);
        assert!(report_file.is_none());
    }

    #[test]
    fn rejects_unknown_log_color() {
        assert!(
            CLI::try_parse_from([
                "memiavl-migrate",
                "--log.color",
                "sometimes",
                "snapshot",
                "--db-v0",
                "a",
                "--out",
                "b",
            ])
            .is_err()
        );
    }

    #[test]
    fn emit_report_writes_json_line_to_report_file() {
        let dir = TempDir::new().unwrap();
        let report_path = dir.path().join("reports").join("report.jsonl");
        let report = MigrationReport::new(summary(), dir.path().join("snapshot-42"));

        emit_report(&report, true, Some(&report_path))
            .expect("json report emission should succeed");

        let content = fs::read_to_string(&report_path).expect("report file should be readable");
        let line = content.lines().next().expect("report file should contain one line");
        let parsed: Value = serde_json::from_str(line).expect("line should be valid json");
        assert_eq!(parsed["schema_version"], REPORT_SCHEMA_VERSION);
        assert_eq!(parsed["status"], "completed");
        assert_eq!(parsed["version"], 42);
        assert_eq!(parsed["migrated_stores"], 1);
        assert_eq!(parsed["skipped_stores"], 1);
        assert_eq!(parsed["nodes"], 5);
        assert_eq!(parsed["stores"][0]["outcome"], "migrated");
        assert_eq!(parsed["stores"][1]["outcome"], "skipped");
    }

    #[test]
    fn emit_report_writes_human_lines() {
        let dir = TempDir::new().unwrap();
        let report_path = dir.path().join("report.log");
        let report = MigrationReport::new(summary(), dir.path().join("snapshot-42"));

        emit_report(&report, false, Some(&report_path)).unwrap();

        let content = fs::read_to_string(&report_path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Store bank: migrated 5 node(s)");
        assert!(lines[1].starts_with("Store staking: skipped"));
        assert!(lines[2].starts_with("Migration completed successfully"));
    }

    #[test]
    fn write_report_file_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.log");
        write_report_file(&path, &["first".to_owned()]).unwrap();
        write_report_file(&path, &["second".to_owned(), "third".to_owned()]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\nthird\n");
    }

    #[test]
    fn unwritable_report_file_does_not_fail_a_completed_run() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"").unwrap();
        let report_path = blocker.join("report.jsonl");
        let report = MigrationReport::new(summary(), dir.path().join("snapshot-42"));

        assert!(write_report_file(&report_path, &["line".to_owned()]).is_err());
        emit_report(&report, true, Some(&report_path)).unwrap();
        emit_report(&report, false, Some(&report_path)).unwrap();
        assert!(!report_path.exists());
    }

    #[test]
    fn json_report_renders_as_single_line() {
        let report = MigrationReport::new(summary(), "snapshot-42".into());
        let lines = render_report(&report, true).unwrap();
        assert_eq!(lines.len(), 1);
        assert!(!lines[0].contains('\n'));
    }

    #[test]
    fn error_report_classifies_migration_errors() {
        let error = eyre::Report::new(MigrationError::VersionMismatch {
            store: "staking".into(),
            expected: 42,
            found: 43,
        })
        .wrap_err("Cannot build memiavl snapshot");

        let report: MigrationErrorReport = build_migration_error_report(&error, Instant::now());
        assert_eq!(report.status, "failed");
        assert_eq!(report.phase, "discovery");
        assert_eq!(report.error_type, "version_mismatch");
        assert!(report.error.contains("different versions"));
    }

    #[test]
    fn error_report_falls_back_for_other_errors() {
        let error = eyre::eyre!("join error");
        let report = build_migration_error_report(&error, Instant::now());
        assert_eq!(report.phase, "execution");
        assert_eq!(report.error_type, "internal");
    }
}
