//! MCP server - stdio and TCP transports over one connection handler.
//!
//! Each connection runs a read loop, a writer task fed through a bounded
//! channel, and one task per `tools/call`. Every call gets a child of the
//! connection's cancellation token, so `notifications/cancelled`, EOF and
//! server shutdown all cancel in-flight work.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use super::codec::{encode_message, read_frame, write_frame};
use super::protocol::{JsonRpcRequest, JsonRpcResponse, RequestId, RpcError, JSONRPC_VERSION};
use super::router::{McpRouter, Route};
use crate::types::{ConnectionId, ServerConfig, Transport};

/// Responses buffered per connection before tool tasks wait on the writer.
const OUTBOUND_QUEUE: usize = 64;

type InFlight = Arc<Mutex<HashMap<RequestId, CancellationToken>>>;

/// Owns a call's in-flight entry for the lifetime of its task.
///
/// The entry is removed on drop, including during unwinding. A task that
/// ends without [`InFlightGuard::release`] still answers its request with an
/// internal error.
struct InFlightGuard {
    in_flight: InFlight,
    id: RequestId,
    tx: mpsc::Sender<JsonRpcResponse>,
    released: bool,
}

impl InFlightGuard {
    fn new(in_flight: InFlight, id: RequestId, tx: mpsc::Sender<JsonRpcResponse>) -> Self {
        Self {
            in_flight,
            id,
            tx,
            released: false,
        }
    }

    /// Clear the entry ahead of sending the normal response.
    fn release(&mut self) {
        lock(&self.in_flight).remove(&self.id);
        self.released = true;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        lock(&self.in_flight).remove(&self.id);
        tracing::error!(request_id = %self.id, "tool_call_aborted");
        let response = JsonRpcResponse::failure(
            Some(self.id.clone()),
            RpcError::internal("tool call aborted"),
        );
        let _ = self.tx.try_send(response);
    }
}

/// Per-connection I/O limits.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub max_frame_bytes: usize,
    /// Idle read timeout. `None` waits forever (stdio).
    pub read_timeout: Option<Duration>,
    pub write_timeout: Duration,
}

impl ConnectionLimits {
    pub fn tcp(config: &ServerConfig) -> Self {
        Self {
            max_frame_bytes: config.max_frame_bytes,
            read_timeout: Some(config.read_timeout),
            write_timeout: config.write_timeout,
        }
    }

    /// The stdio peer is the parent process; it is never considered idle.
    pub fn stdio(config: &ServerConfig) -> Self {
        Self {
            read_timeout: None,
            ..Self::tcp(config)
        }
    }
}

// =============================================================================
// Server
// =============================================================================

/// MCP server wrapping the router.
#[derive(Debug)]
pub struct McpServer {
    router: Arc<McpRouter>,
    config: ServerConfig,
    cancel: CancellationToken,
}

impl McpServer {
    pub fn new(router: Arc<McpRouter>, config: ServerConfig) -> Self {
        Self {
            router,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Serve on the configured transport until shutdown.
    pub async fn serve(&self) -> io::Result<()> {
        match self.config.transport {
            Transport::Stdio => self.serve_stdio().await,
            Transport::Tcp => {
                let listener = TcpListener::bind(&self.config.listen_addr).await?;
                self.serve_listener(listener).await
            }
        }
    }

    /// Serve a single session over stdin/stdout.
    pub async fn serve_stdio(&self) -> io::Result<()> {
        tracing::info!(server = %self.config.name, "MCP server listening on stdio");
        serve_connection(
            tokio::io::stdin(),
            tokio::io::stdout(),
            self.router.clone(),
            ConnectionLimits::stdio(&self.config),
            self.cancel.child_token(),
        )
        .await
    }

    /// Accept TCP connections until cancelled.
    pub async fn serve_listener(&self, listener: TcpListener) -> io::Result<()> {
        let conn_semaphore = Arc::new(Semaphore::new(self.config.max_connections));
        tracing::info!(
            "MCP server listening on {} (max_connections={})",
            listener.local_addr()?,
            self.config.max_connections,
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("MCP server shutting down");
                    break;
                }
                accept = listener.accept() => {
                    let (stream, peer) = match accept {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!("Accept failed: {}", e);
                            continue;
                        }
                    };

                    let permit = match conn_semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            tracing::warn!(
                                "Connection from {} rejected: at max_connections ({})",
                                peer,
                                self.config.max_connections,
                            );
                            drop(stream);
                            continue;
                        }
                    };

                    tracing::debug!(
                        "MCP connection from {} (active={})",
                        peer,
                        self.config.max_connections - conn_semaphore.available_permits(),
                    );
                    let router = self.router.clone();
                    let limits = ConnectionLimits::tcp(&self.config);
                    let cancel = self.cancel.child_token();
                    tokio::spawn(async move {
                        if let Err(e) = handle_tcp(stream, router, limits, cancel, permit).await {
                            tracing::warn!("Connection from {} error: {}", peer, e);
                        }
                    });
                }
            }
        }
        Ok(())
    }

    /// Request graceful shutdown of the listener and every connection.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Token cancelled on shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

async fn handle_tcp(
    stream: TcpStream,
    router: Arc<McpRouter>,
    limits: ConnectionLimits,
    cancel: CancellationToken,
    _permit: OwnedSemaphorePermit,
) -> io::Result<()> {
    let (reader, writer) = stream.into_split();
    serve_connection(reader, writer, router, limits, cancel).await
}

// =============================================================================
// Connection
// =============================================================================

/// Run one MCP session over a byte stream until EOF, read error or shutdown.
///
/// Outstanding tool calls are cancelled and their responses flushed before
/// this returns.
pub async fn serve_connection<R, W>(
    reader: R,
    writer: W,
    router: Arc<McpRouter>,
    limits: ConnectionLimits,
    shutdown: CancellationToken,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let connection_id = ConnectionId::new();
    tracing::debug!(connection_id = %connection_id, "mcp_connection_opened");
    let mut reader = BufReader::new(reader);
    let connection = shutdown.child_token();
    let (tx, rx) = mpsc::channel::<JsonRpcResponse>(OUTBOUND_QUEUE);
    let writer_task = tokio::spawn(write_loop(writer, rx, limits.write_timeout));
    let in_flight: InFlight = Arc::default();
    let mut calls = JoinSet::new();

    let read_result = loop {
        while let Some(joined) = calls.try_join_next() {
            log_call_exit(joined);
        }

        let frame = tokio::select! {
            _ = connection.cancelled() => break Ok(()),
            frame = next_frame(&mut reader, &limits) => frame,
        };
        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };
        if frame.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let request = match decode_request(&frame) {
            Ok(request) => request,
            Err(response) => {
                if !send(&tx, response).await {
                    break Ok(());
                }
                continue;
            }
        };
        tracing::trace!(method = %request.method, id = ?request.id, "mcp_request");

        match router.route(&request) {
            Route::Reply(response) => {
                if !send(&tx, response).await {
                    break Ok(());
                }
            }
            Route::Ignore => {}
            Route::Cancel(params) => {
                if let Some(token) = lock(&in_flight).get(&params.request_id) {
                    tracing::debug!(
                        request_id = %params.request_id,
                        reason = params.reason.as_deref().unwrap_or(""),
                        "tool_call_cancel_requested"
                    );
                    token.cancel();
                }
            }
            Route::CallTool(params) => {
                let Some(id) = request.id else { continue };
                let token = connection.child_token();
                let duplicate = {
                    let mut map = lock(&in_flight);
                    if map.contains_key(&id) {
                        true
                    } else {
                        map.insert(id.clone(), token.clone());
                        false
                    }
                };
                if duplicate {
                    let response = JsonRpcResponse::failure(
                        Some(id.clone()),
                        RpcError::invalid_request(format!("request id {} is already in flight", id)),
                    );
                    if !send(&tx, response).await {
                        break Ok(());
                    }
                    continue;
                }

                let router = router.clone();
                let tx = tx.clone();
                let in_flight = in_flight.clone();
                calls.spawn(async move {
                    let mut guard = InFlightGuard::new(in_flight, id.clone(), tx.clone());
                    let outcome = router.call_tool(params, &token).await;
                    guard.release();
                    let response = match outcome {
                        Ok(result) => JsonRpcResponse::success(Some(id), result),
                        Err(error) => JsonRpcResponse::failure(Some(id), error),
                    };
                    send(&tx, response).await;
                });
            }
        }
    };

    // EOF, read failure or shutdown: every in-flight call is cancelled.
    connection.cancel();
    let cancelled = lock(&in_flight).len();
    while let Some(joined) = calls.join_next().await {
        log_call_exit(joined);
    }
    drop(tx);
    tracing::debug!(
        connection_id = %connection_id,
        cancelled_calls = cancelled,
        "mcp_connection_closed"
    );

    let write_result = match writer_task.await {
        Ok(result) => result,
        Err(e) => Err(io::Error::new(io::ErrorKind::Other, e.to_string())),
    };
    read_result.and(write_result)
}

async fn next_frame<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    limits: &ConnectionLimits,
) -> io::Result<Option<Vec<u8>>> {
    let Some(read_timeout) = limits.read_timeout else {
        return read_frame(reader, limits.max_frame_bytes).await;
    };
    match tokio::time::timeout(read_timeout, read_frame(reader, limits.max_frame_bytes)).await {
        Ok(result) => result,
        Err(_elapsed) => {
            tracing::debug!("Read timeout ({:?}), dropping connection", read_timeout);
            Ok(None)
        }
    }
}

/// Parse one frame into a request, or the error response to send instead.
fn decode_request(frame: &[u8]) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let value: Value = serde_json::from_slice(frame)
        .map_err(|e| JsonRpcResponse::failure(None, RpcError::parse_error(e)))?;

    let id = value
        .get("id")
        .cloned()
        .and_then(|id| serde_json::from_value::<RequestId>(id).ok());
    if !value.is_object() {
        return Err(JsonRpcResponse::failure(
            id,
            RpcError::invalid_request("expected a single request object"),
        ));
    }

    let request: JsonRpcRequest = serde_json::from_value(value)
        .map_err(|e| JsonRpcResponse::failure(id.clone(), RpcError::invalid_request(e)))?;
    if request.jsonrpc != JSONRPC_VERSION {
        return Err(JsonRpcResponse::failure(
            id,
            RpcError::invalid_request(format!("unsupported jsonrpc version '{}'", request.jsonrpc)),
        ));
    }
    Ok(request)
}

fn log_call_exit(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, panicked = e.is_panic(), "tool_call_task_failed");
    }
}

/// Queue a response. Returns false once the writer has gone away.
async fn send(tx: &mpsc::Sender<JsonRpcResponse>, response: JsonRpcResponse) -> bool {
    tx.send(response).await.is_ok()
}

fn lock(in_flight: &InFlight) -> MutexGuard<'_, HashMap<RequestId, CancellationToken>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut rx: mpsc::Receiver<JsonRpcResponse>,
    write_timeout: Duration,
) -> io::Result<()> {
    while let Some(response) = rx.recv().await {
        let payload = encode_message(&response)?;
        timed_write(&mut writer, &payload, write_timeout).await?;
    }
    Ok(())
}

/// Write a frame with a timeout. Slow consumers lose the connection.
async fn timed_write<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
    timeout: Duration,
) -> io::Result<()> {
    tokio::time::timeout(timeout, write_frame(writer, payload))
        .await
        .map_err(|_| {
            tracing::warn!("Write timeout ({:?}), dropping connection", timeout);
            io::Error::new(io::ErrorKind::TimedOut, "write timeout")
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::{INVALID_REQUEST, PARSE_ERROR};

    #[tokio::test]
    async fn test_in_flight_entry_cleared_when_call_task_panics() {
        let in_flight: InFlight = Arc::default();
        let id = RequestId::Number(2);
        lock(&in_flight).insert(id.clone(), CancellationToken::new());
        let (tx, mut rx) = mpsc::channel(4);

        let task = {
            let in_flight = in_flight.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let _guard = InFlightGuard::new(in_flight, id, tx);
                tokio::task::yield_now().await;
                panic!("handler blew up");
            })
        };
        assert!(task.await.unwrap_err().is_panic());

        assert!(lock(&in_flight).is_empty());
        let response = rx.recv().await.unwrap();
        assert_eq!(response.id, Some(id));
        assert_eq!(response.error.unwrap().code, crate::mcp::protocol::INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn test_released_guard_sends_nothing() {
        let in_flight: InFlight = Arc::default();
        let id = RequestId::String("ok".to_string());
        lock(&in_flight).insert(id.clone(), CancellationToken::new());
        let (tx, mut rx) = mpsc::channel(4);

        let mut guard = InFlightGuard::new(in_flight.clone(), id, tx);
        guard.release();
        assert!(lock(&in_flight).is_empty());
        drop(guard);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        let response = decode_request(b"{not json").unwrap_err();
        assert_eq!(response.id, None);
        assert_eq!(response.error.unwrap().code, PARSE_ERROR);
    }

    #[test]
    fn test_decode_rejects_batches() {
        let response = decode_request(br#"[{"jsonrpc":"2.0","id":1,"method":"ping"}]"#).unwrap_err();
        assert_eq!(response.error.unwrap().code, INVALID_REQUEST);
    }

    #[test]
    fn test_decode_keeps_id_on_invalid_request() {
        let response = decode_request(br#"{"jsonrpc":"2.0","id":9}"#).unwrap_err();
        assert_eq!(response.id, Some(RequestId::Number(9)));
        assert_eq!(response.error.unwrap().code, INVALID_REQUEST);
    }

    #[test]
    fn test_decode_rejects_wrong_version() {
        let response = decode_request(br#"{"jsonrpc":"1.0","id":"x","method":"ping"}"#).unwrap_err();
        assert_eq!(response.id, Some(RequestId::String("x".to_string())));
        assert_eq!(response.error.unwrap().code, INVALID_REQUEST);
    }

    #[test]
    fn test_stdio_limits_have_no_read_timeout() {
        let config = ServerConfig::default();
        assert_eq!(ConnectionLimits::stdio(&config).read_timeout, None);
        assert_eq!(
            ConnectionLimits::tcp(&config).read_timeout,
            Some(config.read_timeout)
        );
    }

    #[tokio::test]
    async fn test_write_timeout_drops_slow_consumer() {
        // A duplex with a tiny buffer and no reader never drains.
        let (mut writer, _peer) = tokio::io::duplex(8);
        let err = timed_write(&mut writer, &[b'x'; 64], Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
