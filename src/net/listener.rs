//! NDJSON event ingest over TCP, with backpressure.
//!
//! # Responsibilities
//! - Bind to the configured ingest address
//! - Accept connections, bounded by `max_connections` via semaphore
//! - Feed each connection's lines to the event listener in order
//! - Stop accepting on shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};

use crate::capture::EventListener;
use crate::config::IngestConfig;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
    /// The connection limiter was closed.
    Closed,
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
            ListenerError::Closed => write!(f, "Connection limiter closed"),
        }
    }
}

impl std::error::Error for ListenerError {}

/// A bounded TCP listener that carries lifecycle events.
///
/// When `max_connections` sources are connected, new connections wait until a
/// slot becomes available.
pub struct IngestListener {
    inner: TcpListener,
    connection_limit: Arc<Semaphore>,
}

impl IngestListener {
    /// Bind to the configured address with connection limits.
    pub async fn bind(config: &IngestConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|e| ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            "Ingest listener bound"
        );

        Ok(Self {
            inner: listener,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// The returned permit must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, OwnedSemaphorePermit), ListenerError> {
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Event source connected"
        );

        Ok((stream, addr, permit))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Accept loop. Returns once `shutdown` fires.
    pub async fn run(self, events: Arc<EventListener>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                accepted = self.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let events = events.clone();
                        tokio::spawn(async move {
                            let handled = ingest_stream(BufReader::new(stream), &events).await;
                            tracing::debug!(peer_addr = %peer, events = handled, "Event source disconnected");
                            drop(permit);
                        });
                    }
                    Err(ListenerError::Closed) => break,
                    Err(e) => tracing::warn!(error = %e, "Ingest accept failed"),
                },
                _ = shutdown.recv() => {
                    tracing::info!("Ingest listener stopping");
                    break;
                }
            }
        }
    }
}

/// Longest accepted event line, in bytes. Longer lines are skipped whole.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Outcome of reading one line.
#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    Line,
    Oversized,
    Eof,
}

/// Feed every line of `reader` to `events`, in order. Returns the count of
/// lines handed over.
///
/// Lines that are not UTF-8 or exceed [`MAX_LINE_BYTES`] are logged and
/// skipped; the stream keeps going until EOF or a read error.
pub async fn ingest_stream<R>(mut reader: R, events: &EventListener) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut handled = 0;
    loop {
        buf.clear();
        match read_line_capped(&mut reader, &mut buf, MAX_LINE_BYTES).await {
            Ok(LineRead::Line) => {}
            Ok(LineRead::Oversized) => {
                tracing::warn!(limit = MAX_LINE_BYTES, "Skipping oversized event line");
                continue;
            }
            Ok(LineRead::Eof) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Event stream read failed");
                break;
            }
        }
        match std::str::from_utf8(&buf) {
            Ok(line) => {
                events.handle_line(line.strip_suffix('\r').unwrap_or(line)).await;
                handled += 1;
            }
            Err(e) => tracing::warn!(error = %e, "Skipping event line that is not UTF-8"),
        }
    }
    handled
}

/// Read up to the next newline into `buf`, without the newline.
///
/// Once a line passes `limit` bytes, the rest of it is consumed and dropped
/// so `buf` never grows past `limit`.
async fn read_line_capped<R>(reader: &mut R, buf: &mut Vec<u8>, limit: usize) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let mut read_any = false;
    let mut oversized = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(match (read_any, oversized) {
                (false, _) => LineRead::Eof,
                (true, true) => LineRead::Oversized,
                (true, false) => LineRead::Line,
            });
        }
        read_any = true;

        let (chunk, used, done) = match available.iter().position(|b| *b == b'\n') {
            Some(i) => (&available[..i], i + 1, true),
            None => (available, available.len(), false),
        };
        if !oversized {
            if buf.len() + chunk.len() > limit {
                oversized = true;
                buf.clear();
            } else {
                buf.extend_from_slice(chunk);
            }
        }
        reader.consume(used);

        if done {
            return Ok(if oversized { LineRead::Oversized } else { LineRead::Line });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badge::{CountPublisher, LogIndicator};
    use crate::capture::{FailureStore, RecordBuilder};
    use crate::config::CaptureConfig;
    use crate::correlation::{CacheSettings, CorrelationCache};
    use crate::storage::MemoryStore;
    use tokio::io::AsyncWriteExt;

    fn pipeline() -> (Arc<EventListener>, Arc<FailureStore>) {
        let backend = Arc::new(MemoryStore::new());
        let store = Arc::new(FailureStore::new(backend.clone(), "failedRequests", 500));
        let events = Arc::new(EventListener::new(
            Arc::new(CorrelationCache::new(backend, CacheSettings::default())),
            RecordBuilder::new(CaptureConfig::default().internal_schemes),
            store.clone(),
            CountPublisher::new(Arc::new(LogIndicator::new())),
        ));
        (events, store)
    }

    #[tokio::test]
    async fn test_ingest_stream_handles_lines_in_order() {
        let (events, store) = pipeline();
        let input = concat!(
            r#"{"event":"sendHeaders","requestId":"1","requestHeaders":[{"name":"X-A","value":"1"}]}"#, "\n",
            "garbage\n",
            "\n",
            r#"{"event":"completed","requestId":"1","url":"https://a.test/","statusCode":418}"#, "\n",
        );

        let handled = ingest_stream(input.as_bytes(), &events).await;
        assert_eq!(handled, 4);

        let list = store.list().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].request_header("x-a").unwrap().value, "1");
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_does_not_end_stream() {
        let (events, store) = pipeline();
        let mut input = b"\xff\xfe bad\n".to_vec();
        input.extend_from_slice(
            b"{\"event\":\"completed\",\"requestId\":\"2\",\"url\":\"https://a.test/\",\"statusCode\":500}\r\n",
        );

        let handled = ingest_stream(input.as_slice(), &events).await;
        assert_eq!(handled, 1);

        let list = store.list().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].status_code, Some(500));
    }

    #[tokio::test]
    async fn test_oversized_line_is_skipped() {
        let (events, store) = pipeline();
        let mut input = vec![b'x'; MAX_LINE_BYTES + 1];
        input.push(b'\n');
        input.extend_from_slice(
            b"{\"event\":\"errorOccurred\",\"requestId\":\"3\",\"url\":\"https://a.test/\"}",
        );

        // Small buffer so the long line arrives in many chunks.
        let reader = BufReader::with_capacity(64, input.as_slice());
        let handled = ingest_stream(reader, &events).await;
        assert_eq!(handled, 1);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_line_at_limit_is_kept() {
        let mut reader = BufReader::with_capacity(8, &b"abcdefgh\nabcdefghi\nok"[..]);
        let mut buf = Vec::new();

        assert_eq!(read_line_capped(&mut reader, &mut buf, 8).await.unwrap(), LineRead::Line);
        assert_eq!(buf, b"abcdefgh");
        buf.clear();
        assert_eq!(read_line_capped(&mut reader, &mut buf, 8).await.unwrap(), LineRead::Oversized);
        assert!(buf.is_empty());
        assert_eq!(read_line_capped(&mut reader, &mut buf, 8).await.unwrap(), LineRead::Line);
        assert_eq!(buf, b"ok");
        buf.clear();
        assert_eq!(read_line_capped(&mut reader, &mut buf, 8).await.unwrap(), LineRead::Eof);
    }

    #[tokio::test]
    async fn test_listener_accepts_and_stops_on_shutdown() {
        let (events, store) = pipeline();
        let config = IngestConfig {
            bind_address: "127.0.0.1:0".to_string(),
            max_connections: 2,
        };
        let listener = IngestListener::bind(&config).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(listener.run(events, rx));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"{\"event\":\"errorOccurred\",\"requestId\":\"9\",\"url\":\"https://a.test/\"}\n")
            .await
            .unwrap();
        client.shutdown().await.unwrap();
        drop(client);

        let mut stored = 0;
        for _ in 0..50 {
            stored = store.len().await.unwrap();
            if stored == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(stored, 1);

        tx.send(()).unwrap();
        task.await.unwrap();
    }
}
