//! MCP client.
//!
//! [`McpClient`] turns one framed duplex stream into concurrent
//! request/response calls. Each call takes the next id from an atomic
//! counter, parks a oneshot waiter in the pending map and writes its frame.
//! A single reader task decodes inbound frames and hands every response to
//! the waiter registered under its id.
//!
//! A pending entry is removed exactly once: by the reader when the response
//! arrives, by the caller when it is cancelled, times out or its future is
//! dropped, or by connection teardown, which fails every remaining waiter
//! with [`Error::ConnectionClosed`].

use serde_json::{json, Value};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{ClientConfig, PeerCommand};
use crate::error::{Error, Result};
use crate::mcp::process::{PeerProcess, ProcessTransport};
use crate::mcp::protocol::{
    Implementation, InitializeParams, InitializeResult, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, Message, RequestId, Tool, ToolResult,
    SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::mcp::resources::{ListResourcesResult, ReadResourceResult, Resource};
use crate::mcp::transport::{FrameReader, FrameWriter};

type Waiter = oneshot::Sender<Result<JsonRpcResponse>>;

/// Outstanding calls keyed by id.
#[derive(Default)]
struct PendingCalls {
    waiters: HashMap<i64, Waiter>,
    /// Set once the connection is torn down; later registrations fail.
    closed: Option<String>,
}

impl PendingCalls {
    fn register(&mut self, id: i64) -> Result<oneshot::Receiver<Result<JsonRpcResponse>>> {
        if let Some(reason) = &self.closed {
            return Err(Error::ConnectionClosed(reason.clone()));
        }
        match self.waiters.entry(id) {
            Entry::Occupied(_) => Err(Error::Internal(format!("call id {} already in flight", id))),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(tx);
                Ok(rx)
            }
        }
    }

    fn close(&mut self, reason: &str) -> Vec<(i64, Waiter)> {
        if self.closed.is_none() {
            self.closed = Some(reason.to_string());
        }
        self.waiters.drain().collect()
    }
}

/// State shared between callers and the reader task.
struct Connection {
    pending: Mutex<PendingCalls>,
    writer: FrameWriter,
    next_id: AtomicI64,
}

impl Connection {
    fn pending(&self) -> MutexGuard<'_, PendingCalls> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver one inbound frame.
    fn route(&self, line: &str) {
        match Message::decode(line) {
            Ok(Message::Response(response)) => {
                let RequestId::Number(id) = response.id else {
                    warn!("Dropping response with non-numeric id: {:?}", response.id);
                    return;
                };
                let waiter = self.pending().waiters.remove(&id);
                match waiter {
                    Some(waiter) => {
                        trace!("Routing response for call {}", id);
                        if waiter.send(Ok(response)).is_err() {
                            debug!("Caller for call {} went away before delivery", id);
                        }
                    }
                    None => debug!("Dropping response for unknown or abandoned call {}", id),
                }
            }
            Ok(Message::Request(req)) => {
                debug!("Ignoring request from peer: {} (id: {:?})", req.method, req.id);
            }
            Ok(Message::Notification(notif)) => {
                debug!("Peer notification: {}", notif.method);
            }
            Err(e) => warn!("Skipping undecodable frame: {}", e),
        }
    }

    /// Fail every pending call and refuse new ones. Returns how many
    /// waiters were resolved.
    fn shutdown(&self, reason: &str) -> usize {
        let waiters = self.pending().close(reason);
        let count = waiters.len();
        for (id, waiter) in waiters {
            trace!("Failing call {}: {}", id, reason);
            let _ = waiter.send(Err(Error::ConnectionClosed(reason.to_string())));
        }
        count
    }

    fn is_closed(&self) -> bool {
        self.pending().closed.is_some()
    }
}

/// Removes a call's pending entry when the call finishes for any reason.
struct PendingGuard<'a> {
    conn: &'a Connection,
    id: i64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.conn.pending().waiters.remove(&self.id).is_some() {
            trace!("Removed abandoned call {}", self.id);
        }
    }
}

async fn read_loop(conn: Arc<Connection>, mut reader: FrameReader) {
    let reason = loop {
        match reader.read_line().await {
            Ok(Some(line)) => conn.route(&line),
            Ok(None) => break "peer closed the connection".to_string(),
            Err(e) => break format!("read failed: {}", e),
        }
    };
    let resolved = conn.shutdown(&reason);
    debug!("Reader task stopped ({}), failed {} pending calls", reason, resolved);
}

/// A client connection to one MCP peer.
pub struct McpClient {
    conn: Arc<Connection>,
    config: ClientConfig,
    initialized: AtomicBool,
    init_lock: tokio::sync::Mutex<()>,
    server: OnceLock<InitializeResult>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    process: tokio::sync::Mutex<Option<PeerProcess>>,
}

impl McpClient {
    /// Connect over an arbitrary pair of byte streams.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect<R, W>(reader: R, writer: W, config: ClientConfig) -> Self
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::from_parts(FrameReader::new(reader), FrameWriter::new(writer), None, config)
    }

    /// Spawn `peer` and connect to its stdio.
    pub fn spawn(peer: &PeerCommand, config: ClientConfig) -> Result<Self> {
        let (reader, writer, process) = ProcessTransport::spawn(peer)?.into_parts();
        Ok(Self::from_parts(reader, writer, Some(process), config))
    }

    fn from_parts(
        reader: FrameReader,
        writer: FrameWriter,
        process: Option<PeerProcess>,
        config: ClientConfig,
    ) -> Self {
        let conn = Arc::new(Connection {
            pending: Mutex::new(PendingCalls::default()),
            writer,
            next_id: AtomicI64::new(1),
        });
        let reader_task = tokio::spawn(read_loop(conn.clone(), reader));

        Self {
            conn,
            config,
            initialized: AtomicBool::new(false),
            init_lock: tokio::sync::Mutex::new(()),
            server: OnceLock::new(),
            reader_task: Mutex::new(Some(reader_task)),
            process: tokio::sync::Mutex::new(process),
        }
    }

    /// Perform the `initialize` / `notifications/initialized` handshake.
    pub async fn initialize(&self) -> Result<InitializeResult> {
        let _guard = self.init_lock.lock().await;
        if self.is_initialized() {
            return Err(Error::McpProtocol("connection already initialized".to_string()));
        }

        let params = InitializeParams {
            protocol_version: self.config.protocol_version.clone(),
            capabilities: json!({}),
            client_info: Implementation {
                name: self.config.client_name.clone(),
                version: self.config.client_version.clone(),
            },
        };
        let value = self
            .request("initialize", Some(serde_json::to_value(params)?))
            .await?;
        let result: InitializeResult = serde_json::from_value(value)
            .map_err(|e| Error::McpProtocol(format!("invalid initialize result: {}", e)))?;

        if result.protocol_version != self.config.protocol_version
            && !SUPPORTED_PROTOCOL_VERSIONS.contains(&result.protocol_version.as_str())
        {
            warn!(
                "Peer answered with unsupported protocol version {}",
                result.protocol_version
            );
        }

        self.send_notification("notifications/initialized", None).await?;
        self.initialized.store(true, Ordering::Release);
        let _ = self.server.set(result.clone());

        info!(
            "MCP connection initialized: {} v{} (protocol {})",
            result.server_info.name, result.server_info.version, result.protocol_version
        );
        Ok(result)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// The peer's `initialize` answer, once the handshake completed.
    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.server.get()
    }

    /// Issue a request and wait for its result.
    ///
    /// Applies `request_timeout` from the client config when set. The
    /// handshake is only available through [`McpClient::initialize`].
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.check_callable(method)?;
        self.request(method, params).await
    }

    /// Issue a request that fails with [`Error::Timeout`] after `timeout`.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        self.check_callable(method)?;
        self.request_with_timeout(method, params, timeout).await
    }

    /// Issue a request that fails with [`Error::Cancelled`] as soon as
    /// `cancel` fires. A response arriving afterwards is dropped.
    pub async fn call_with_cancel(
        &self,
        method: &str,
        params: Option<Value>,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        self.check_callable(method)?;
        self.send_and_wait(method, params, cancel).await
    }

    fn check_callable(&self, method: &str) -> Result<()> {
        if method == "initialize" {
            return Err(Error::McpProtocol(
                "initialize is only sent by McpClient::initialize".to_string(),
            ));
        }
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }
        Ok(())
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        match self.config.request_timeout {
            Some(timeout) => self.request_with_timeout(method, params, timeout).await,
            None => {
                self.send_and_wait(method, params, &CancellationToken::new())
                    .await
            }
        }
    }

    async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let never = CancellationToken::new();
        match tokio::time::timeout(timeout, self.send_and_wait(method, params, &never)).await {
            Ok(result) => result,
            Err(_) => {
                debug!("Call {} timed out after {:?}", method, timeout);
                Err(Error::Timeout {
                    millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    async fn send_and_wait(
        &self,
        method: &str,
        params: Option<Value>,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let id = self.conn.next_id.fetch_add(1, Ordering::Relaxed);
        let rx = self.conn.pending().register(id)?;
        let _guard = PendingGuard {
            conn: &self.conn,
            id,
        };

        let frame = serde_json::to_vec(&JsonRpcRequest::new(id, method, params))?;
        trace!("Sending call {}: {}", id, method);
        if let Err(e) = self.conn.writer.write_frame(&frame).await {
            // no response can arrive on a broken stream
            self.conn.shutdown(&e.to_string());
            return Err(e);
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Call {} ({}) cancelled", id, method);
                return Err(Error::Cancelled);
            }
            delivered = rx => delivered
                .map_err(|_| Error::ConnectionClosed("reader stopped".to_string()))??,
        };
        response.into_result()
    }

    /// Send a notification. No response is expected.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }
        self.send_notification(method, params).await
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        if self.conn.is_closed() {
            return Err(Error::ConnectionClosed("connection is closed".to_string()));
        }
        let frame = serde_json::to_vec(&JsonRpcNotification::new(method, params))?;
        self.conn.writer.write_frame(&frame).await
    }

    pub async fn ping(&self) -> Result<()> {
        self.call("ping", None).await.map(|_| ())
    }

    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        let value = self.call("tools/list", None).await?;
        let result: ListToolsResult = decode_result("tools/list", value)?;
        Ok(result.tools)
    }

    /// Invoke a tool. A tool-level failure comes back as
    /// `Ok(ToolResult { is_error: true, .. })`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult> {
        let params = json!({ "name": name, "arguments": arguments });
        let value = self.call("tools/call", Some(params)).await?;
        decode_result("tools/call", value)
    }

    pub async fn list_resources(&self) -> Result<Vec<Resource>> {
        let value = self.call("resources/list", None).await?;
        let result: ListResourcesResult = decode_result("resources/list", value)?;
        Ok(result.resources)
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
        let value = self
            .call("resources/read", Some(json!({ "uri": uri })))
            .await?;
        decode_result("resources/read", value)
    }

    /// Number of calls waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.conn.pending().waiters.len()
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }

    /// Tear the connection down.
    ///
    /// Every pending call fails with [`Error::ConnectionClosed`]. For a
    /// spawned peer, its stdin is closed and its exit awaited; an unclean
    /// exit is returned as an error.
    pub async fn close(&self) -> Result<()> {
        let resolved = self.conn.shutdown("connection closed by client");
        self.conn.writer.close().await;

        let outcome = match self.process.lock().await.take() {
            Some(mut process) => process.wait(self.config.shutdown_timeout).await,
            None => Ok(()),
        };

        let task = self
            .reader_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }

        info!("MCP client closed ({} pending calls failed)", resolved);
        outcome
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        let task = self
            .reader_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

fn decode_result<T: serde::de::DeserializeOwned>(method: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::McpProtocol(format!("invalid {} result: {}", method, e)))
}
