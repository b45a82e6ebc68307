//! Serve command implementation.

use joty_resolver::{Accessor, CatalogSpec, Dialect};
use joty_server::{
    HandlerContext, JotyServer, ServerConfig, SqliteProvider, StaticAuthenticator,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Options of the serve command.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// SQLite database file.
    pub db: PathBuf,
    /// SQL script run at startup.
    pub schema: Option<PathBuf>,
    /// Resolver catalog.
    pub catalog: Option<PathBuf>,
    /// Accounts as `user:password[:sharing-key]`.
    pub users: Vec<String>,
    /// Listen address.
    pub bind: SocketAddr,
    /// Dialect name.
    pub dialect: String,
    /// Rows per page.
    pub page_size: u32,
    /// Idle session timeout, seconds.
    pub session_timeout: u64,
    /// Reject literal SQL.
    pub catalog_only: bool,
}

/// Builds the server described by the options.
pub fn build(options: &ServeOptions) -> Result<JotyServer, Box<dyn std::error::Error>> {
    let dialect = Dialect::by_name(&options.dialect)
        .ok_or_else(|| format!("unknown dialect: {}", options.dialect))?;
    let mut config = ServerConfig::new(options.bind)
        .with_dialect(dialect)
        .with_page_size(options.page_size)
        .with_session_timeout(Duration::from_secs(options.session_timeout));
    if options.catalog_only {
        config = config.catalog_only();
    }

    let provider = SqliteProvider::open(&options.db)?;
    if let Some(path) = &options.schema {
        provider.init_schema(&std::fs::read_to_string(path)?)?;
    }

    let accessor = match &options.catalog {
        Some(path) => CatalogSpec::load(path)?.build()?,
        None => Accessor::builder().build()?,
    };

    let mut authenticator = StaticAuthenticator::new();
    for spec in &options.users {
        authenticator = authenticator.with_user_spec(spec)?;
    }
    if authenticator.is_empty() {
        return Err("at least one --user is required".into());
    }
    info!(
        db = %options.db.display(),
        users = authenticator.len(),
        "server configured"
    );

    let context = HandlerContext::new(config, Arc::new(accessor), Arc::new(provider))
        .with_authenticator(Arc::new(authenticator));
    Ok(JotyServer::new(context))
}

/// Runs the serve command until the listener fails.
pub fn run(options: &ServeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let server = Arc::new(build(options)?);
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(joty_server::http::serve(server, options.bind))?;
    Ok(())
}
