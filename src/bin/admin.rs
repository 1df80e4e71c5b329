//! CLI administration tool for shorturl.
//!
//! Runs mapping operations and maintenance tasks directly against PostgreSQL,
//! without going through the HTTP server.
//!
//! # Usage
//!
//! ```bash
//! # Check database connection
//! cargo run --bin admin -- db check
//!
//! # View statistics
//! cargo run --bin admin -- stats
//!
//! # Shorten and resolve
//! cargo run --bin admin -- shorten https://example.com/some/page
//! cargo run --bin admin -- resolve aZ3k9Qx
//!
//! # Complete rows left pending by interrupted sequential allocations
//! cargo run --bin admin -- reconcile --limit 500
//! ```
//!
//! # Environment Variables
//!
//! Same database settings as the server (`DATABASE_URL` or `DB_*`), plus
//! `CODE_STRATEGY`, `CODE_LENGTH`, `MAX_ALLOCATION_ATTEMPTS` and `STORE_TIMEOUT_MS`.

use shorturl::AppState;
use shorturl::application::services::MappingService;
use shorturl::config::StorageBackend;
use shorturl::domain::repositories::MappingRepository;
use shorturl::infrastructure::persistence::PgMappingRepository;
use shorturl::server::connect_database;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::Confirm;
use sqlx::PgPool;
use std::sync::Arc;

/// CLI tool for managing shorturl.
#[derive(Parser)]
#[command(name = "admin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Top-level command groups.
#[derive(Subcommand)]
enum Commands {
    /// Database operations
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Show mapping statistics
    Stats,

    /// Shorten a URL (returns the existing code if already mapped)
    Shorten {
        /// Long URL to shorten
        url: String,
    },

    /// Look up the long URL behind a code
    Resolve {
        /// Short code
        code: String,
    },

    /// Complete pending rows left by interrupted sequential allocations
    Reconcile {
        /// Maximum number of rows to process
        #[arg(short, long, default_value_t = 100)]
        limit: i64,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

/// Database operation subcommands.
#[derive(Subcommand)]
enum DbAction {
    /// Check database connection
    Check,

    /// Show database info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = shorturl::config::load_from_env()?;
    if config.storage_backend != StorageBackend::Postgres {
        anyhow::bail!("admin only works with STORAGE_BACKEND=postgres");
    }

    let pool = connect_database(&config).await?;
    let repository: Arc<dyn MappingRepository> =
        Arc::new(PgMappingRepository::new(Arc::new(pool.clone())));
    let service = MappingService::new(repository, config.allocation_options()?);
    let state = AppState::new(Arc::new(service), config.base_url.clone());

    match cli.command {
        Commands::Db { action } => handle_db_action(action, &pool).await?,
        Commands::Stats => handle_stats(&state).await?,
        Commands::Shorten { url } => shorten(&state, &url).await?,
        Commands::Resolve { code } => resolve(&state, &code).await?,
        Commands::Reconcile { limit, yes } => reconcile(&state, limit, yes).await?,
    }

    Ok(())
}

/// Dispatches database commands.
async fn handle_db_action(action: DbAction, pool: &PgPool) -> Result<()> {
    match action {
        DbAction::Check => {
            sqlx::query("SELECT 1")
                .execute(pool)
                .await
                .context("Database is not reachable")?;
            let mappings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mappings")
                .fetch_one(pool)
                .await
                .context("mappings table is missing; start the server once to migrate")?;

            println!("{}", "✅ Database connection OK".green().bold());
            println!("  Rows in mappings: {}", mappings.to_string().cyan());
        }
        DbAction::Info => {
            let version: String = sqlx::query_scalar("SELECT version()")
                .fetch_one(pool)
                .await?;
            let size: String =
                sqlx::query_scalar("SELECT pg_size_pretty(pg_total_relation_size('mappings'))")
                    .fetch_one(pool)
                    .await?;

            println!("{}", "🗄  Database".bright_blue().bold());
            println!();
            println!("  Server:        {}", version.bright_black());
            println!("  Mappings size: {}", size.cyan());
            println!();
        }
    }

    Ok(())
}

/// Displays mapping counts.
async fn handle_stats(state: &AppState) -> Result<()> {
    let service = &state.mapping_service;

    println!("{}", "📊 Statistics".bright_blue().bold());
    println!();

    let mappings = service
        .count()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to count mappings: {}", e))?;
    let pending = service
        .count_pending()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to count pending rows: {}", e))?;

    println!("  Mappings: {}", mappings.to_string().bright_white().bold());

    let pending_label = pending.to_string();
    if pending == 0 {
        println!("  Pending:  {}", pending_label.bright_black());
    } else {
        println!("  Pending:  {}", pending_label.yellow().bold());
        println!();
        println!(
            "  Complete them with: {} admin -- reconcile",
            "cargo run --bin".bright_cyan()
        );
    }
    println!();

    Ok(())
}

async fn shorten(state: &AppState, url: &str) -> Result<()> {
    let code = state
        .mapping_service
        .create(url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to shorten URL: {}", e))?;

    println!("  Code:      {}", code.bright_yellow().bold());
    println!("  Short URL: {}", state.short_url(&code));

    Ok(())
}

async fn resolve(state: &AppState, code: &str) -> Result<()> {
    match state.mapping_service.resolve(code).await {
        Ok(long_url) => {
            println!("  {} → {}", code.bright_yellow(), long_url.cyan());
            Ok(())
        }
        Err(shorturl::AppError::NotFound { .. }) => {
            println!("{}", format!("❌ No mapping for '{code}'").red());
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("Failed to resolve code: {}", e)),
    }
}

/// Writes the base-62 code of every pending row.
///
/// A pending row holds its long URL but is invisible to lookups. The code
/// depends only on the row id, so completing a row another process is also
/// completing is safe.
async fn reconcile(state: &AppState, limit: i64, skip_confirm: bool) -> Result<()> {
    let service = &state.mapping_service;

    println!("{}", "🔧 Reconcile pending rows".bright_blue().bold());
    println!();

    let pending = service
        .list_pending(limit)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to list pending rows: {}", e))?;

    if pending.is_empty() {
        println!("{}", "  Nothing to reconcile".green());
        return Ok(());
    }

    println!(
        "  {:<10} {:<20} {}",
        "ID".bright_white().bold(),
        "Created".bright_white().bold(),
        "Long URL".bright_white().bold()
    );
    println!("  {}", "─".repeat(75).bright_black());
    for row in &pending {
        println!(
            "  {:<10} {:<20} {}",
            row.id.to_string().bright_black(),
            row.created_at
                .format("%Y-%m-%d %H:%M")
                .to_string()
                .bright_black(),
            row.long_url.cyan()
        );
    }
    println!();

    if !skip_confirm {
        let confirmed = Confirm::new()
            .with_prompt(format!("Complete {} pending rows?", pending.len()))
            .default(true)
            .interact()?;

        if !confirmed {
            println!("{}", "❌ Cancelled".red());
            return Ok(());
        }
    }

    let mut failed = 0;
    for row in &pending {
        match service.complete_pending(row.id).await {
            Ok(mapping) => println!(
                "  {} {} → {}",
                "✔".green(),
                mapping.code.bright_yellow(),
                mapping.long_url
            ),
            Err(e) => {
                failed += 1;
                println!("  {} row {}: {}", "✘".red(), row.id, e);
            }
        }
    }

    println!();
    if failed == 0 {
        println!("{}", "✅ All pending rows completed".green().bold());
    } else {
        println!(
            "{}",
            format!("⚠️  {failed} rows could not be completed").yellow().bold()
        );
    }

    Ok(())
}
