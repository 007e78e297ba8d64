//! Stdio transport for the MCP server.
//!
//! Reads one JSON message per line from stdin and writes one response per
//! line to stdout. Each message is dispatched on its own task; responses are
//! funnelled through a single writer task so lines never interleave.

use crate::error::{DbError, DbResult};
use crate::mcp::{Dispatcher, Response};
use crate::transport::{Transport, wait_for_signal};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Responses queued for the writer before dispatch tasks start waiting.
const WRITE_QUEUE_DEPTH: usize = 64;

/// Stdio transport implementation.
pub struct StdioTransport {
    dispatcher: Dispatcher,
    /// How long in-flight requests may run after shutdown starts
    grace: Duration,
}

impl StdioTransport {
    pub fn new(dispatcher: Dispatcher, grace: Duration) -> Self {
        Self { dispatcher, grace }
    }

    /// Serve line-delimited messages from `reader` until EOF or `shutdown` resolves.
    pub async fn serve<R, W, S>(&self, reader: R, writer: W, shutdown: S) -> DbResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
        S: Future<Output = ()>,
    {
        let (tx, rx) = mpsc::channel::<Response>(WRITE_QUEUE_DEPTH);
        let writer_task = tokio::spawn(write_responses(writer, rx));

        let mut lines = BufReader::new(reader).split(b'\n');
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        let read_error = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer reading stdin");
                    break None;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "Dispatch task failed");
                    }
                }
                segment = lines.next_segment() => match segment {
                    Ok(Some(bytes)) => {
                        let Ok(line) = String::from_utf8(bytes) else {
                            warn!("Dropping message that is not valid UTF-8");
                            continue;
                        };
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        let line = line.to_string();
                        let dispatcher = self.dispatcher.clone();
                        let tx = tx.clone();
                        tasks.spawn(async move {
                            if let Some(response) = dispatcher.handle_message(&line).await {
                                if tx.send(response).await.is_err() {
                                    debug!("Writer closed before response could be sent");
                                }
                            }
                        });
                    }
                    Ok(None) => {
                        info!("Stdin closed");
                        break None;
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to read stdin");
                        break Some(e);
                    }
                }
            }
        };

        self.drain(&mut tasks).await;
        drop(tx);
        if let Err(e) = writer_task.await {
            warn!(error = %e, "Writer task failed");
        }

        match read_error {
            Some(e) => Err(DbError::internal(format!("Stdio transport error: {}", e))),
            None => Ok(()),
        }
    }

    /// Wait up to the grace period for in-flight requests, then abort the rest.
    async fn drain(&self, tasks: &mut JoinSet<()>) {
        if tasks.is_empty() {
            return;
        }
        info!(
            in_flight = tasks.len(),
            grace_secs = self.grace.as_secs(),
            "Waiting for in-flight requests"
        );
        let drained = tokio::time::timeout(self.grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(aborted = tasks.len(), "Grace period elapsed, aborting in-flight requests");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
    }
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::Receiver<Response>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = match serde_json::to_string(&response) {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "Failed to serialize response");
                continue;
            }
        };
        line.push('\n');
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            error!(error = %e, "Failed to write response");
            break;
        }
        if let Err(e) = writer.flush().await {
            error!(error = %e, "Failed to flush response");
            break;
        }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> DbResult<()> {
        info!("Starting MCP server with stdio transport");
        self.serve(tokio::io::stdin(), tokio::io::stdout(), wait_for_signal())
            .await
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}
