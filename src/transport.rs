//! Producers that push stream bytes into a [`ProducerSink`].
//!
//! A transport runs on its own task and never touches the render path
//! directly: bytes go through the sink, failures through `on_error`.

use futures_util::StreamExt;
use reqwest::Client;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use url::Url;

use crate::config::Config;
use crate::error::{Result, StreamError};
use crate::streamer::ProducerSink;

/// Source of stream bytes for a network node.
pub trait Transport: Send + Sync {
    /// Start fetching `url`, delivering bytes to `sink` until the body ends,
    /// the sink goes stale or the returned handle is cancelled.
    fn fetch(&self, url: &Url, sink: ProducerSink) -> FetchHandle;
}

/// Cancellation handle of one in-flight fetch.
#[derive(Debug, Default)]
pub struct FetchHandle {
    abort: Option<AbortHandle>,
}

impl FetchHandle {
    /// A handle with nothing to cancel, for transports that deliver
    /// synchronously or are driven externally.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn from_task(abort: AbortHandle) -> Self {
        Self { abort: Some(abort) }
    }

    pub fn cancel(&mut self) {
        if let Some(abort) = self.abort.take() {
            abort.abort();
        }
    }
}

/// Streams an HTTP(S) response body with reqwest.
pub struct HttpTransport {
    client: Client,
    runtime: Handle,
}

impl HttpTransport {
    /// Build a transport whose fetch tasks run on `runtime`.
    pub fn new(config: &Config, runtime: Handle) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.http_user_agent.as_str())
            .build()?;
        Ok(Self { client, runtime })
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &Url, sink: ProducerSink) -> FetchHandle {
        let client = self.client.clone();
        let url = url.clone();
        let task = self.runtime.spawn(async move {
            match stream_body(&client, &url, &sink).await {
                Ok(total) => log::info!("Stream {} ended after {} bytes", url, total),
                Err(e) => sink.on_error(&e.to_string()),
            }
        });
        FetchHandle::from_task(task.abort_handle())
    }
}

async fn stream_body(client: &Client, url: &Url, sink: &ProducerSink) -> Result<u64> {
    let response = client
        .get(url.clone())
        .send()
        .await?
        .error_for_status()?;
    log::info!("Connected to {} ({})", url, response.status());
    if !sink.is_current() {
        log::debug!("Stream {} replaced before the body arrived", url);
        return Ok(0);
    }

    let mut body = response.bytes_stream();
    let mut total = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| StreamError::Transport(e.to_string()))?;
        total += chunk.len() as u64;
        if !sink.on_data(&chunk) {
            log::debug!("Stream {} detached, closing connection", url);
            break;
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_cancel_is_noop() {
        let mut handle = FetchHandle::detached();
        handle.cancel();
        handle.cancel();
    }

    #[tokio::test]
    async fn test_cancel_aborts_task() {
        let task = tokio::spawn(std::future::pending::<()>());
        let mut handle = FetchHandle::from_task(task.abort_handle());
        handle.cancel();
        assert!(task.await.unwrap_err().is_cancelled());
    }
}
