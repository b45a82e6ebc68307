//! Joty CLI
//!
//! Runs a Joty server over SQLite, or talks to one.
//!
//! # Commands
//!
//! - `serve` - Serve a SQLite database over HTTP
//! - `query` - Log in, run one query and print the rows
//! - `exec` - Log in and run statements as one batch
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Joty protocol server and client.
#[derive(Parser)]
#[command(name = "joty")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server URL used by client commands
    #[arg(global = true, long, default_value = "http://127.0.0.1:8080/joty")]
    url: String,

    /// Carry the session in the URL instead of a cookie
    #[arg(global = true, long)]
    no_cookies: bool,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a SQLite database over HTTP
    Serve {
        /// SQLite database file
        #[arg(long)]
        db: PathBuf,

        /// SQL script run once at startup
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Resolver catalog (JSON)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Account as user:password[:sharing-key]; repeatable
        #[arg(long = "user")]
        users: Vec<String>,

        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,

        /// SQL dialect for paged queries (sqlite, postgres)
        #[arg(long, default_value = "sqlite")]
        dialect: String,

        /// Rows per page
        #[arg(long, default_value = "50")]
        page_size: u32,

        /// Idle session timeout in seconds
        #[arg(long, default_value = "1800")]
        session_timeout: u64,

        /// Reject SQL text that is not a catalog statement
        #[arg(long)]
        catalog_only: bool,
    },

    /// Log in, run one query and print the rows
    Query {
        /// SQL text or catalog statement name
        sql: String,

        /// User name
        #[arg(short, long)]
        user: String,

        /// Password
        #[arg(short, long)]
        password: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Log in and run statements as one batch
    Exec {
        /// Statements, in order
        #[arg(required = true)]
        statements: Vec<String>,

        /// User name
        #[arg(short, long)]
        user: String,

        /// Password
        #[arg(short, long)]
        password: String,

        /// Run inside one database transaction
        #[arg(short, long)]
        trans: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let use_cookies = !cli.no_cookies;
    match cli.command {
        Commands::Serve {
            db,
            schema,
            catalog,
            users,
            bind,
            dialect,
            page_size,
            session_timeout,
            catalog_only,
        } => {
            let options = commands::serve::ServeOptions {
                db,
                schema,
                catalog,
                users,
                bind,
                dialect,
                page_size,
                session_timeout,
                catalog_only,
            };
            commands::serve::run(&options)?;
        }
        Commands::Query {
            sql,
            user,
            password,
            format,
        } => {
            let mut client = commands::connect(&cli.url, use_cookies, &user, &password)?;
            commands::query::run(&mut client, &sql, &format)?;
        }
        Commands::Exec {
            statements,
            user,
            password,
            trans,
        } => {
            let mut client = commands::connect(&cli.url, use_cookies, &user, &password)?;
            commands::exec::run(&mut client, &statements, trans)?;
        }
        Commands::Version => {
            println!("Joty CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
