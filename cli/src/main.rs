mod console;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use quarry_sqlite::{Database, DatabaseConfig, MigrationReport, Migrator};
use tracing::debug;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "quarry.yml";

#[derive(Debug, Parser)]
#[command(name = "quarry", version)]
#[command(about = "SQLite schema migrations")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Configuration file (default: ./quarry.yml when present).
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,
    /// SQLite database file; overrides the config file.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Migrations directory; overrides the config file.
    #[arg(long, short = 'd', global = true)]
    dir: Option<PathBuf>,
    /// Bookkeeping table name; overrides the config file.
    #[arg(long, global = true)]
    table: Option<String>,
    /// Echo every migration file considered.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply all pending migrations.
    Migrate(MigrateArgs),
    /// Revert applied migrations, newest first.
    Rollback(RollbackArgs),
    /// Create a new, empty SQL migration file.
    MakeMigration(MakeMigrationArgs),
    /// List migrations and whether they have been applied.
    Status,
}

#[derive(Debug, Args)]
struct MigrateArgs {
    /// Print the SQL instead of executing it.
    #[arg(long, short = 'x')]
    dryrun: bool,
    /// Accepted for compatibility; has no effect.
    #[arg(long, short = 'f')]
    force: bool,
}

#[derive(Debug, Args)]
struct RollbackArgs {
    /// Revert every migration newer than this version. Without it only the
    /// most recent migration is reverted.
    #[arg(long, short = 't')]
    time: Option<i64>,
    /// Print the SQL instead of executing it.
    #[arg(long, short = 'x')]
    dryrun: bool,
}

#[derive(Debug, Args)]
struct MakeMigrationArgs {
    /// PascalCase class name, e.g. CreateUsersTable.
    name: String,
    /// Replace an existing migration with the same class name.
    #[arg(long, short = 'f')]
    force: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let result = load_config(&cli.global).and_then(|config| {
        let db = Database::new(config);
        match cli.command {
            Command::Migrate(args) => run_migrate(&db, args, cli.global.verbose),
            Command::Rollback(args) => run_rollback(&db, args, cli.global.verbose),
            Command::MakeMigration(args) => run_make_migration(&db, args),
            Command::Status => run_status(&db),
        }
    });

    if let Err(err) = result {
        console::error(err);
        std::process::exit(1);
    }
}

/// Logs go to stderr. `QUARRY_LOG` takes precedence over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { LevelFilter::DEBUG } else { LevelFilter::WARN };
    let filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .with_env_var("QUARRY_LOG")
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Reads the config file, then applies command-line overrides.
fn load_config(args: &GlobalArgs) -> Result<DatabaseConfig, String> {
    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None if Path::new(DEFAULT_CONFIG).is_file() => read_config(Path::new(DEFAULT_CONFIG))?,
        None => DatabaseConfig::default(),
    };

    if let Some(db) = &args.db {
        config.database = Some(db.clone());
    }
    if let Some(dir) = &args.dir {
        config.migrations_path = dir.clone();
    }
    if let Some(table) = &args.table {
        config.migrations_table = table.clone();
    }
    debug!(?config, "resolved configuration");
    config.validated().map_err(|err| err.to_string())
}

fn read_config(path: &Path) -> Result<DatabaseConfig, String> {
    DatabaseConfig::load(path).map_err(|err| format!("Failed to load config '{}': {err}", path.display()))
}

fn run_migrate(db: &Database, args: MigrateArgs, verbose: bool) -> Result<(), String> {
    if args.force {
        debug!("--force has no effect on migrate");
    }
    let report = Migrator::new(db)
        .run(args.dryrun)
        .map_err(|err| format!("Migration failed: {err}"))?;

    print_report(db, &report, verbose, "Migrated");
    console::success(format!("\nSkipped migrations: {}", report.skipped.len()));
    console::success(format!("Processed migrations: {}", report.processed.len()));
    console::success("Migration done!");
    Ok(())
}

fn run_rollback(db: &Database, args: RollbackArgs, verbose: bool) -> Result<(), String> {
    let report = Migrator::new(db)
        .rollback(args.time, args.dryrun)
        .map_err(|err| format!("Rollback failed: {err}"))?;

    print_report(db, &report, verbose, "Rollback");
    console::success(format!("\nSkipped migrations: {}", report.skipped.len()));
    console::success(format!("Processed rollback: {}", report.processed.len()));
    console::success("Rollback done!");
    Ok(())
}

fn print_report(db: &Database, report: &MigrationReport, verbose: bool, action: &str) {
    if report.table_created && verbose {
        console::info(format!("Created migrations table: {}", db.config().migrations_table));
    }
    if verbose {
        for filename in &report.skipped {
            console::info(format!("Skipped migration file: {filename}"));
        }
        for filename in &report.invalid {
            console::warning(format!("Invalid migration file: {filename}"));
        }
    }
    for filename in &report.processed {
        console::info(format!("{action}: {filename}"));
    }
    if !report.planned.is_empty() {
        console::info("Dry run, SQL not executed:");
        for statement in &report.planned {
            console::sql(statement);
        }
    }
}

fn run_make_migration(db: &Database, args: MakeMigrationArgs) -> Result<(), String> {
    let path = Migrator::new(db)
        .create(&args.name, args.force)
        .map_err(|err| format!("Make migration failed: {err}"))?;
    console::success(format!("Created migration: {}", path.display()));
    Ok(())
}

fn run_status(db: &Database) -> Result<(), String> {
    let status = Migrator::new(db).status().map_err(|err| format!("Status failed: {err}"))?;

    for entry in &status.entries {
        match &entry.record {
            Some(record) => {
                let at = record.end_at.as_deref().unwrap_or("unknown");
                console::success(format!("[applied {at}] {}", entry.file.filename));
            }
            None => console::warning(format!("[pending] {}", entry.file.filename)),
        }
    }
    for filename in &status.invalid {
        console::warning(format!("[invalid] {filename}"));
    }
    console::info(format!(
        "\nApplied: {}, pending: {}",
        status.applied().count(),
        status.pending().count()
    ));
    Ok(())
}
