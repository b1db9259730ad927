use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Best-effort client for the external consumer's completion-event channel.
///
/// The connection is an owned, swappable handle with explicit state: every
/// send checks it first, and a failed send drops it rather than erroring up
/// into the submission pipeline. `connect` can be re-invoked at any time,
/// e.g. when the consumer announces it came online.
pub struct Notifier {
    address: Option<String>,
    conn: Mutex<Option<TcpStream>>,
}

impl Notifier {
    pub fn new(address: Option<String>) -> Self {
        Self {
            address,
            conn: Mutex::new(None),
        }
    }

    /// (Re)establish the channel. Returns Ok(false) when no consumer is
    /// configured; an existing connection is replaced.
    pub async fn connect(&self) -> Result<bool> {
        let Some(addr) = &self.address else {
            log::info!("no consumer address configured, running unnotified");
            return Ok(false);
        };

        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| anyhow!("timed out connecting to consumer at {addr}"))?
            .with_context(|| format!("connecting to consumer at {addr}"))?;

        *self.conn.lock().await = Some(stream);
        log::info!("connected to consumer at {addr}");
        Ok(true)
    }

    pub async fn is_connected(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    /// Fire-and-forget completion event, one JSON line per submission.
    /// Failures are logged and swallowed; the submission's stored result is
    /// never affected.
    pub async fn notify_complete(&self, id: &str) {
        let mut guard = self.conn.lock().await;
        let Some(stream) = guard.as_mut() else {
            log::warn!("not connected to consumer, completion of {id} not notified");
            return;
        };

        let event = serde_json::json!({
            "event": "finish_judge",
            "submission_id": id,
        });
        let mut line = event.to_string();
        line.push('\n');

        let sent = {
            let send = async {
                stream.write_all(line.as_bytes()).await?;
                stream.flush().await
            };
            timeout(SEND_TIMEOUT, send).await
        };
        match sent {
            Ok(Ok(())) => log::debug!("notified consumer that {id} finished"),
            Ok(Err(e)) => {
                log::warn!("failed to notify consumer that {id} finished: {e}");
                *guard = None;
            }
            Err(_) => {
                log::warn!("notifying consumer that {id} finished timed out");
                *guard = None;
            }
        }
    }
}
