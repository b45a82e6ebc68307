//! Exec command implementation.

use super::disconnect;
use joty_client::{ClientResult, HttpClient, WebClient};
use joty_protocol::PostStatement;

/// Runs the exec command and prints the returned values.
pub fn run<C: HttpClient>(
    client: &mut WebClient<C>,
    statements: &[String],
    transactional: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = send(client, statements, transactional);
    disconnect(client);
    let returned = result?;
    if returned.is_empty() {
        println!("ok");
    } else {
        println!("ok, returned: {}", returned.join(", "));
    }
    Ok(())
}

/// Sends the statements as one `trans` batch, or one `exec` request each.
pub fn send<C: HttpClient>(
    client: &mut WebClient<C>,
    statements: &[String],
    transactional: bool,
) -> ClientResult<Vec<String>> {
    if transactional {
        client.begin_transaction();
        for sql in statements {
            client.add_statement(PostStatement::sql(sql.as_str()))?;
        }
        client.end_transaction()?;
        return Ok(client.returned_values().to_vec());
    }
    let mut returned = Vec::new();
    for sql in statements {
        client.add_statement(PostStatement::sql(sql.as_str()))?;
        returned.extend_from_slice(client.returned_values());
    }
    Ok(returned)
}
