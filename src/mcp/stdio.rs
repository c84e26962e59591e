//! stdio transport: newline-delimited JSON-RPC.
//!
//! Each line is handled on its own task so a slow upstream call does not
//! block the next message. A single writer task owns the output.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::server::{self, PARSE_ERROR};
use crate::dispatch::Dispatcher;

/// Serve on the process stdin/stdout until stdin closes.
pub async fn serve_stdio(dispatcher: Dispatcher) -> std::io::Result<()> {
    serve(dispatcher, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serve on any reader/writer pair. Returns after the reader hits EOF and
/// every in-flight message has been answered.
pub async fn serve<R, W>(dispatcher: Dispatcher, reader: R, writer: W) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Value>(64);
    let writer_task = tokio::spawn(write_loop(writer, rx));

    let mut lines = BufReader::new(reader).lines();
    let mut in_flight = JoinSet::new();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let message: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "stdio: unparsable message");
                let error = server::json_rpc_error(Value::Null, PARSE_ERROR, &format!("Parse error: {e}"));
                if tx.send(error).await.is_err() {
                    break;
                }
                continue;
            }
        };
        let dispatcher = dispatcher.clone();
        let tx = tx.clone();
        in_flight.spawn(async move {
            if let Some(response) = server::handle_message(&dispatcher, message).await {
                if tx.send(response).await.is_err() {
                    tracing::debug!("stdio: writer closed before the response was delivered");
                }
            }
        });
    }

    tracing::info!(pending = in_flight.len(), "stdio: input closed");
    while in_flight.join_next().await.is_some() {}
    drop(tx);

    writer_task
        .await
        .map_err(|e| std::io::Error::other(format!("stdio writer task failed: {e}")))?
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::Receiver<Value>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let mut line = message.to_string();
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::backend::SqlBackend;

    async fn dispatcher() -> Dispatcher {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let backend = SqlBackend::opengenes(pool, std::time::Duration::from_secs(5), "");
        Dispatcher::new(Arc::new(backend)).unwrap()
    }

    #[tokio::test]
    async fn answers_each_request_line() {
        let input = [
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}).to_string(),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
            String::new(),
            "{not json".to_string(),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
                   "params": {"name": "get_schema_info", "arguments": {}}})
            .to_string(),
        ]
        .join("\n");

        let (mut client, server_side) = tokio::io::duplex(64 * 1024);
        serve(dispatcher().await, input.as_bytes(), server_side)
            .await
            .unwrap();

        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        let responses: Vec<Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(responses.len(), 3);

        let by_id = |id: Value| responses.iter().find(|r| r["id"] == id).unwrap();
        assert_eq!(by_id(json!(1))["result"]["serverInfo"]["name"], "opengenes-mcp");
        assert_eq!(by_id(json!(2))["result"]["isError"], false);
        assert_eq!(by_id(Value::Null)["error"]["code"], PARSE_ERROR);
    }

    #[tokio::test]
    async fn closed_output_ends_serving_with_an_error() {
        let input = (1..=3)
            .map(|id| json!({"jsonrpc": "2.0", "id": id, "method": "tools/list"}).to_string())
            .collect::<Vec<_>>()
            .join("\n");

        let (client, server_side) = tokio::io::duplex(64);
        drop(client);
        let err = serve(dispatcher().await, input.as_bytes(), server_side)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }
}
