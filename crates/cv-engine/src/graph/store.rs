//! Cypher-speaking graph backend client.
//!
//! The backend (FalkorDB) exposes a property-graph query language over the
//! RESP protocol; queries go through `GRAPH.QUERY <name> <cypher>` and the
//! engine passes them through unchanged — there is no query planner here.
//! Reply cells are decoded defensively into a narrow [`GraphValue`] sum
//! because the backend's verbose mode stringifies most scalars.

use std::time::{Duration, Instant};

use redis::aio::ConnectionManager;
use redis::Value;

use cv_core::{Error, Result};

/// A single cell of a query result row.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphValue {
    Null,
    Int(i64),
    Double(f64),
    String(String),
    Array(Vec<GraphValue>),
}

impl GraphValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            GraphValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view, coercing stringified numbers.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            GraphValue::Int(i) => Some(*i),
            GraphValue::Double(d) => Some(*d as i64),
            GraphValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Boolean view; the backend's verbose mode stringifies booleans.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            GraphValue::Int(i) => Some(*i != 0),
            GraphValue::String(s) => match s.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, GraphValue::Null)
    }

    /// Owned string view, stringifying numbers.
    pub fn into_string(self) -> Option<String> {
        match self {
            GraphValue::String(s) => Some(s),
            GraphValue::Int(i) => Some(i.to_string()),
            GraphValue::Double(d) => Some(d.to_string()),
            _ => None,
        }
    }

    /// String-list view, handling both a real array reply and the verbose
    /// mode's `[a, b]` stringification.
    pub fn into_string_vec(self) -> Vec<String> {
        match self {
            GraphValue::Array(items) => items
                .into_iter()
                .filter_map(GraphValue::into_string)
                .collect(),
            GraphValue::String(s) => {
                let trimmed = s.trim();
                let Some(inner) = trimmed
                    .strip_prefix('[')
                    .and_then(|rest| rest.strip_suffix(']'))
                else {
                    return Vec::new();
                };
                inner
                    .split(',')
                    .map(|item| item.trim().trim_matches('"').to_string())
                    .filter(|item| !item.is_empty())
                    .collect()
            }
            _ => Vec::new(),
        }
    }
}

pub type GraphRow = Vec<GraphValue>;

/// Connection to one named graph in the shared backend.
pub struct GraphStore {
    conn: ConnectionManager,
    graph: String,
}

impl GraphStore {
    /// Connect to the backend and bind to the given graph name
    /// (`cv_<repoId>` for repo-scoped graphs).
    ///
    /// Connection establishment retries with exponential backoff until
    /// `connect_timeout` elapses.
    pub async fn connect(url: &str, graph: String, connect_timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::Graph(format!("invalid backend url {url}: {e}")))?;

        let started = Instant::now();
        let mut backoff = Duration::from_millis(250);
        let conn = loop {
            match ConnectionManager::new(client.clone()).await {
                Ok(conn) => break conn,
                Err(e) => {
                    if started.elapsed() + backoff > connect_timeout {
                        return Err(Error::Graph(format!(
                            "could not reach graph backend at {url} within {connect_timeout:?}: {e}"
                        )));
                    }
                    tracing::debug!(error = %e, "graph backend not ready, retrying in {backoff:?}");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(4));
                }
            }
        };

        Ok(Self { conn, graph })
    }

    pub fn graph(&self) -> &str {
        &self.graph
    }

    /// Run a Cypher query with parameters and return the result rows.
    ///
    /// Parameters are rendered into the backend's `CYPHER k=v` prefix;
    /// string values are escaped, so callers never interpolate user data
    /// into the query text itself.
    pub async fn query(
        &self,
        cypher: &str,
        params: &[(&str, serde_json::Value)],
    ) -> Result<Vec<GraphRow>> {
        let full = if params.is_empty() {
            cypher.to_string()
        } else {
            let rendered: Vec<String> = params
                .iter()
                .map(|(k, v)| format!("{k}={}", render_param(v)))
                .collect();
            format!("CYPHER {} {}", rendered.join(" "), cypher)
        };

        let mut conn = self.conn.clone();
        let reply: Value = redis::cmd("GRAPH.QUERY")
            .arg(&self.graph)
            .arg(&full)
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Graph(format!("query failed: {e}")))?;

        Ok(parse_reply(reply))
    }

    /// Drop the whole graph. Missing graphs are not an error.
    pub async fn delete_graph(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let result: std::result::Result<Value, redis::RedisError> = redis::cmd("GRAPH.DELETE")
            .arg(&self.graph)
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("Invalid graph operation on empty key") => Ok(()),
            Err(e) => Err(Error::Graph(format!("delete failed: {e}"))),
        }
    }
}

/// Render a parameter value in the `CYPHER k=v` prefix syntax.
fn render_param(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => quote_string(s),
        serde_json::Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(render_param).collect();
            format!("[{}]", inner.join(","))
        }
        // The backend has no map parameter literal; objects go through as
        // JSON text.
        serde_json::Value::Object(_) => quote_string(&value.to_string()),
    }
}

fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Decode a `GRAPH.QUERY` reply into rows.
///
/// The verbose reply is `[header, rows, stats]` for projecting queries and
/// `[stats]` for pure writes. Node/relation cells (nested arrays) are not
/// projected by any engine query and decode to `Null`.
fn parse_reply(reply: Value) -> Vec<GraphRow> {
    let Value::Array(mut parts) = reply else {
        return Vec::new();
    };
    if parts.len() != 3 {
        return Vec::new();
    }

    let rows = parts.remove(1);
    let Value::Array(rows) = rows else {
        return Vec::new();
    };

    rows.into_iter()
        .filter_map(|row| match row {
            Value::Array(cells) => Some(cells.into_iter().map(decode_cell).collect()),
            _ => None,
        })
        .collect()
}

fn decode_cell(cell: Value) -> GraphValue {
    match cell {
        Value::Nil => GraphValue::Null,
        Value::Int(i) => GraphValue::Int(i),
        Value::Double(d) => GraphValue::Double(d),
        Value::BulkString(bytes) => GraphValue::String(String::from_utf8_lossy(&bytes).to_string()),
        Value::SimpleString(s) => GraphValue::String(s),
        Value::Array(items) => GraphValue::Array(items.into_iter().map(decode_cell).collect()),
        Value::Map(_) | Value::Set(_) => GraphValue::Null,
        other => {
            tracing::debug!(?other, "unexpected graph reply cell");
            GraphValue::Null
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_rendering_escapes_strings() {
        assert_eq!(render_param(&serde_json::json!(42)), "42");
        assert_eq!(render_param(&serde_json::json!(true)), "true");
        assert_eq!(render_param(&serde_json::json!(null)), "null");
        assert_eq!(
            render_param(&serde_json::json!("say \"hi\"\n")),
            "\"say \\\"hi\\\"\\n\""
        );
        assert_eq!(
            render_param(&serde_json::json!(["a", "b"])),
            "[\"a\",\"b\"]"
        );
    }

    #[test]
    fn reply_rows_decode_with_coercion() {
        let reply = Value::Array(vec![
            Value::Array(vec![Value::BulkString(b"count".to_vec())]),
            Value::Array(vec![Value::Array(vec![
                Value::BulkString(b"7".to_vec()),
                Value::Int(3),
                Value::Nil,
            ])]),
            Value::Array(vec![]),
        ]);
        let rows = parse_reply(reply);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0].as_i64(), Some(7));
        assert_eq!(rows[0][1].as_i64(), Some(3));
        assert!(rows[0][2].is_null());
    }

    #[test]
    fn write_only_reply_has_no_rows() {
        let reply = Value::Array(vec![Value::Array(vec![Value::BulkString(
            b"Nodes created: 1".to_vec(),
        )])]);
        assert!(parse_reply(reply).is_empty());
    }
}
