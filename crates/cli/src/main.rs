//! Nestling CLI - database migrations, catalog sync and maintenance.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! nestling migrate
//!
//! # Pull the catalog from the CMS, then refresh the search index
//! nestling sync-cms --reindex
//!
//! # Expire lapsed checkout sessions once
//! nestling sweep-checkouts
//!
//! # Grant dashboard access to an existing account
//! nestling admin promote -e owner@example.com
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `sync-cms` - Upsert categories, products and variants from the CMS
//! - `reindex` - Push every product to the search index
//! - `sweep-checkouts` - Expire open checkout sessions whose hold has lapsed
//! - `admin promote` - Give an account the admin role

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "nestling")]
#[command(author, version, about = "Nestling CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Sync the catalog from the CMS into the database
    SyncCms {
        /// Refresh the search index after a successful sync
        #[arg(long)]
        reindex: bool,
    },
    /// Push every product to the search index
    Reindex,
    /// Expire lapsed checkout sessions and release their stock
    SweepCheckouts,
    /// Manage admin users
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Give an existing account the admin role
    Promote {
        /// Account email address
        #[arg(short, long)]
        email: String,
    },
}

#[tokio::main]
async fn main() {
    // Defaults to info level if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "nestling_cli=info,nestling_storefront=info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::SyncCms { reindex } => commands::catalog::sync(reindex).await?,
        Commands::Reindex => commands::catalog::reindex().await?,
        Commands::SweepCheckouts => commands::checkout::sweep().await?,
        Commands::Admin { action } => match action {
            AdminAction::Promote { email } => commands::admin::promote(&email).await?,
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_sync_with_reindex() {
        let cli = Cli::try_parse_from(["nestling", "sync-cms", "--reindex"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::SyncCms { reindex: true })
        ));
    }

    #[test]
    fn test_promote_requires_email() {
        assert!(Cli::try_parse_from(["nestling", "admin", "promote"]).is_err());
        let cli = Cli::try_parse_from(["nestling", "admin", "promote", "-e", "a@b.co"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Admin { action: AdminAction::Promote { email } }) if email == "a@b.co"
        ));
    }
}
