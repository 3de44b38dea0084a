//! Bridge channels over JSON lines.
//!
//! Each input line is a call:
//!
//! ```text
//! {"id": 1, "channel": "com.example.app/updater", "method": "updateStatus", "arguments": {}}
//! ```
//!
//! and gets one reply line `{"id": 1, "response": ...}`. Update events are
//! interleaved as `{"channel": ".../updater/events", "event": {...}}`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use hostlink_bridge::{Bridge, EventSink, MethodCall, MethodResponse};

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Option<Value>,
    channel: String,
    #[serde(flatten)]
    call: MethodCall,
}

#[derive(Debug, Serialize)]
struct Reply<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    response: &'a MethodResponse,
}

#[derive(Debug, Serialize)]
struct EventLine<'a> {
    channel: &'a str,
    event: &'a Value,
}

/// Writes event payloads as lines.
struct LineSink {
    lines: mpsc::UnboundedSender<String>,
}

impl EventSink for LineSink {
    fn emit(&self, channel: &str, payload: Value) {
        match serde_json::to_string(&EventLine {
            channel,
            event: &payload,
        }) {
            Ok(line) => {
                let _ = self.lines.send(line);
            }
            Err(e) => warn!(error = %e, "Failed to encode event line"),
        }
    }
}

/// Answers one input line.
async fn handle_line(bridge: &Bridge, line: &str) -> String {
    let (id, response) = match serde_json::from_str::<Request>(line) {
        Ok(request) => {
            debug!(channel = %request.channel, method = %request.call.method, "Call");
            let response = bridge.call(&request.channel, &request.call).await;
            (request.id, response)
        }
        Err(e) => (
            None,
            MethodResponse::Error {
                code: "INVALID_REQUEST".to_string(),
                message: e.to_string(),
                details: None,
            },
        ),
    };

    serde_json::to_string(&Reply {
        id,
        response: &response,
    })
    .unwrap_or_else(|e| {
        format!(r#"{{"response":{{"error":{{"code":"INTERNAL","message":"{e}"}}}}}}"#)
    })
}

/// Serves calls from `input` until it ends, then returns `output`.
pub async fn serve<R, W>(bridge: &Bridge, input: R, mut output: W) -> anyhow::Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            output.write_all(line.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
        Ok::<_, std::io::Error>(output)
    });

    let forwarder = bridge.forward_events(Arc::new(LineSink { lines: tx.clone() }));

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = handle_line(bridge, &line).await;
        if tx.send(reply).is_err() {
            break;
        }
    }

    forwarder.abort();
    let _ = forwarder.await;
    drop(tx);

    Ok(writer.await??)
}
