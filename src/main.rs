// SAKAN - admin CLI
// Schema setup, first admin, and the jobs cron runs (fee generation, reminders)

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

use sakan::auth::{purge_expired, Identity};
use sakan::balances::send_payment_reminders;
use sakan::db::count_rows;
use sakan::entities::profile::validate_email;
use sakan::fees::generate_contribution_fees;
use sakan::residents::import_residents_csv;
use sakan::{open_database, Config, LogMailer, Profile, ProfileStatus, Role};

#[derive(Parser)]
#[command(name = "sakan")]
#[command(about = "SAKAN residence management - admin tools", version)]
struct Cli {
    /// SQLite file; defaults to SAKAN_DATABASE
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the schema
    Migrate,
    /// Create the first back-office account
    CreateAdmin {
        email: String,
        #[arg(long, default_value = "Administrator")]
        name: String,
    },
    /// Generate due contribution fees (safe to run repeatedly)
    GenerateFees {
        #[arg(long)]
        residence: Option<String>,
        /// Generate up to this date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// E-mail every resident with overdue fees
    SendReminders {
        #[arg(long)]
        residence: Option<String>,
    },
    /// Invite residents from a CSV file (email,full_name,apartment_number,phone)
    ImportResidents {
        file: PathBuf,
        #[arg(long)]
        residence: String,
        /// E-mail of the admin account the invitations are issued as
        #[arg(long = "as")]
        admin: String,
    },
    /// Drop expired sessions and spent login codes
    PurgeSessions,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(path) = cli.database {
        config.database_path = path.display().to_string();
    }

    let conn = open_database(Path::new(&config.database_path))?;

    match cli.command {
        Commands::Migrate => run_migrate(&conn),
        Commands::CreateAdmin { email, name } => run_create_admin(&conn, &email, &name),
        Commands::GenerateFees { residence, as_of } => run_generate(&conn, residence.as_deref(), as_of),
        Commands::SendReminders { residence } => run_reminders(&conn, &config, residence.as_deref()),
        Commands::ImportResidents { file, residence, admin } => {
            run_import(&conn, &config, &file, residence, &admin)
        }
        Commands::PurgeSessions => {
            let removed = purge_expired(&conn, Utc::now())?;
            println!("🧹 Removed {removed} expired sessions and codes");
            Ok(())
        }
    }
}

fn run_migrate(conn: &Connection) -> Result<()> {
    println!("🗄️  Schema ready");
    for table in ["residences", "profiles", "fees", "payments", "expenses"] {
        println!("   {table:<12} {}", count_rows(conn, table)?);
    }
    Ok(())
}

fn run_create_admin(conn: &Connection, email: &str, name: &str) -> Result<()> {
    let email = validate_email(email)?;
    let admin = Profile::new(&email, name, Role::Admin, ProfileStatus::Active);
    admin.insert(conn)?;

    println!("✓ Admin created: {} ({})", admin.email, admin.id);
    println!("   Sign in with a one-time code sent to this address.");
    Ok(())
}

fn run_generate(conn: &Connection, residence: Option<&str>, as_of: Option<NaiveDate>) -> Result<()> {
    let now = Utc::now();
    let as_of = as_of.unwrap_or_else(|| now.date_naive());

    let report = generate_contribution_fees(conn, residence, as_of, now)?;
    println!(
        "🔁 {} contributions processed, {} fees created (as of {as_of})",
        report.contributions, report.fees_created
    );
    Ok(())
}

fn run_reminders(conn: &Connection, config: &Config, residence: Option<&str>) -> Result<()> {
    let report = send_payment_reminders(conn, &LogMailer, config, residence, Utc::now().date_naive())?;
    println!(
        "✉️  {} residents overdue: {} reminders sent, {} failed",
        report.residents, report.sent, report.failed
    );
    Ok(())
}

fn run_import(conn: &Connection, config: &Config, file: &Path, residence: String, admin: &str) -> Result<()> {
    let profile = Profile::find_by_email(conn, admin)?
        .with_context(|| format!("No account for {admin}"))?;
    if profile.role != Role::Admin {
        bail!("{admin} is not an admin account");
    }
    let actor = Identity { session_id: "cli".to_string(), profile };

    let reader = File::open(file).with_context(|| format!("Failed to open {}", file.display()))?;
    let report = import_residents_csv(conn, &LogMailer, config, &actor, Some(residence), reader, Utc::now())?;

    println!("📥 {} residents invited", report.invited);
    for error in &report.errors {
        println!("   ⚠️  line {}: {}", error.line, error.message);
    }
    Ok(())
}
