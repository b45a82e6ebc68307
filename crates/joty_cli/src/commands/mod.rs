//! CLI command implementations.

pub mod exec;
pub mod query;
pub mod serve;

use joty_client::{ClientConfig, HttpClient, ReqwestClient, WebClient};
use tracing::warn;

/// Opens a logged-in client session.
pub fn connect(
    url: &str,
    use_cookies: bool,
    user: &str,
    password: &str,
) -> Result<WebClient<ReqwestClient>, Box<dyn std::error::Error>> {
    let config = ClientConfig::new(url).with_cookies(use_cookies);
    let http = ReqwestClient::new(&config)?;
    let mut client = WebClient::new(config, http);
    client.login(user, password, None)?;
    Ok(client)
}

/// Closes the session; a failure here does not fail the command.
pub fn disconnect<C: HttpClient>(client: &mut WebClient<C>) {
    if let Err(err) = client.end_session() {
        warn!(error = %err, "could not end the session");
    }
}
