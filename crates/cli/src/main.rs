//! Crave CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! crave migrate
//!
//! # Create an administrator
//! crave user create -e admin@example.com -p 'S3cure-pass' -r admin -n "Head Chef"
//!
//! # Unlock an account, or lift the site-wide lockout
//! crave lockout clear -e someone@example.com
//! crave lockout clear --global
//!
//! # Load menu items from YAML
//! crave seed foods demos/menu.yaml
//! ```
//!
//! All commands read the same environment (and `.env`) as the server.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "crave")]
#[command(author, version, about = "Crave CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage user accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Inspect and clear login lockouts
    Lockout {
        #[command(subcommand)]
        action: LockoutAction,
    },
    /// Seed the database
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a verified user
    Create {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Initial password
        #[arg(short, long)]
        password: String,

        /// Role (`customer`, `admin`)
        #[arg(short, long, default_value = "admin")]
        role: String,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum LockoutAction {
    /// Clear an account lockout and/or the global lockout
    Clear {
        /// Account to unlock
        #[arg(short, long)]
        email: Option<String>,

        /// Lift the site-wide lockout
        #[arg(long)]
        global: bool,
    },
    /// List locked accounts
    List,
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Import menu items from a YAML file
    Foods {
        /// Path to the YAML file
        file: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::Create {
                email,
                password,
                role,
                name,
            } => {
                commands::user::create(&email, &password, &role, name.as_deref()).await?;
            }
        },
        Commands::Lockout { action } => match action {
            LockoutAction::Clear { email, global } => {
                commands::lockout::clear(email.as_deref(), global).await?;
            }
            LockoutAction::List => commands::lockout::list().await?,
        },
        Commands::Seed { target } => match target {
            SeedTarget::Foods { file } => {
                commands::seed::foods(&file).await?;
            }
        },
    }
    Ok(())
}
