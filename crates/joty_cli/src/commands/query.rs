//! Query command implementation.

use super::disconnect;
use joty_client::{HttpClient, WebClient};
use joty_protocol::{QueryPayload, ResultSet};
use serde_json::{Map, Value};

/// Runs the query command.
pub fn run<C: HttpClient>(
    client: &mut WebClient<C>,
    sql: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let rows = client.query(QueryPayload::Text(sql.to_string()));
    disconnect(client);
    println!("{}", render(&rows?, format)?);
    Ok(())
}

/// Renders rows as tab-separated text or a JSON array of objects.
pub fn render(rows: &ResultSet, format: &str) -> Result<String, Box<dyn std::error::Error>> {
    match format {
        "text" => Ok(render_text(rows)),
        "json" => Ok(serde_json::to_string_pretty(&to_json(rows))?),
        other => Err(format!("unknown output format: {other}").into()),
    }
}

fn render_text(rows: &ResultSet) -> String {
    let mut out = rows
        .fields
        .iter()
        .map(|f| f.name.as_str())
        .collect::<Vec<_>>()
        .join("\t");
    for record in &rows.records {
        out.push('\n');
        let cells: Vec<&str> = record
            .iter()
            .map(|cell| cell.as_deref().unwrap_or("NULL"))
            .collect();
        out.push_str(&cells.join("\t"));
    }
    out.push_str(&format!("\n({} rows)", rows.len()));
    out
}

fn to_json(rows: &ResultSet) -> Value {
    let records = rows
        .records
        .iter()
        .map(|record| {
            let object: Map<String, Value> = rows
                .fields
                .iter()
                .zip(record)
                .map(|(field, cell)| {
                    let value = cell.clone().map_or(Value::Null, Value::String);
                    (field.name.clone(), value)
                })
                .collect();
            Value::Object(object)
        })
        .collect();
    Value::Array(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use joty_protocol::FieldDesc;

    fn rows() -> ResultSet {
        let mut rows = ResultSet::new(vec![FieldDesc::new("id", 10, 0), FieldDesc::new("name", 20, 0)]);
        rows.push_record(vec![Some("1".into()), Some("ann".into())]);
        rows.push_record(vec![Some("2".into()), None]);
        rows
    }

    #[test]
    fn text_output() {
        assert_eq!(
            render(&rows(), "text").unwrap(),
            "id\tname\n1\tann\n2\tNULL\n(2 rows)"
        );
    }

    #[test]
    fn json_output() {
        let text = render(&rows(), "json").unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value[0]["name"], "ann");
        assert_eq!(value[1]["name"], Value::Null);
    }

    #[test]
    fn unknown_format() {
        assert!(render(&rows(), "csv").is_err());
    }
}
