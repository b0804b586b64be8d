//! The protocol engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};
use uuid::Uuid;

use toolbus_core::{
    EXECUTION_ERROR_CODE, Error, HEALTH_CHECK_TOOL, Message, MessageType, Registry,
    RequestPayload, Result, ToolDescriptor,
};
use toolbus_transport::Transport;

use crate::config::EngineConfig;
use crate::state::{ConnectionState, ConnectionStatus};

type StateCallback = Box<dyn Fn(&ConnectionState) + Send + Sync>;

#[derive(Default)]
struct TaskHandles {
    heartbeat: Option<JoinHandle<()>>,
    inbound: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

impl TaskHandles {
    fn abort_all(&mut self) {
        for handle in [
            self.heartbeat.take(),
            self.inbound.take(),
            self.reconnect.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

struct EngineInner {
    config: EngineConfig,
    registry: Arc<Registry>,
    transport: StdMutex<Option<Arc<dyn Transport>>>,
    state: StdMutex<ConnectionState>,
    state_tx: watch::Sender<ConnectionState>,
    callbacks: StdMutex<Vec<StateCallback>>,
    /// Monotonic timestamp of the last inbound message.
    last_message: StdMutex<Instant>,
    started_at: Instant,
    /// Bounded in `[0, max_reconnect_attempts]`; reset on reaching `Connected`.
    reconnect_attempts: AtomicU32,
    /// Outbound correlation: waiters keyed by request id.
    pending: StdMutex<HashMap<String, oneshot::Sender<Result<Value>>>>,
    tasks: StdMutex<TaskHandles>,
}

/// The protocol/connection-lifecycle engine.
///
/// Owns at most one transport. Cheaply cloneable via `Arc`; all clones share
/// the same connection and state. Exactly one inbound loop and one heartbeat
/// timer run per attached transport, so no internal locking is held across
/// message processing.
pub struct ProtocolEngine {
    inner: Arc<EngineInner>,
}

impl Clone for ProtocolEngine {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for ProtocolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("state", &self.state())
            .field("registry", &self.inner.registry)
            .finish_non_exhaustive()
    }
}

impl ProtocolEngine {
    /// Create an engine with default configuration over the given registry.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    /// Create an engine with explicit configuration.
    pub fn with_config(registry: Arc<Registry>, config: EngineConfig) -> Self {
        let initial = ConnectionState::disconnected();
        let (state_tx, _) = watch::channel(initial.clone());
        Self {
            inner: Arc::new(EngineInner {
                config,
                registry,
                transport: StdMutex::new(None),
                state: StdMutex::new(initial),
                state_tx,
                callbacks: StdMutex::new(Vec::new()),
                last_message: StdMutex::new(Instant::now()),
                started_at: Instant::now(),
                reconnect_attempts: AtomicU32::new(0),
                pending: StdMutex::new(HashMap::new()),
                tasks: StdMutex::new(TaskHandles::default()),
            }),
        }
    }

    /// Attach a transport and establish the session.
    ///
    /// Transitions to `Connecting`, starts the heartbeat timer and the inbound
    /// loop (which performs the transport's own connect), then waits - bounded
    /// by [`EngineConfig::connect_timeout`] - for the state to reach
    /// `Connected` or `Error`. On timeout the background machinery is left
    /// running and will drive its own retries.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if a transport is already attached, or if the
    ///   state reaches `Error` before `Connected`
    /// - [`Error::ConnectionTimeout`] if neither happens within the window
    pub async fn connect(&self, transport: Arc<dyn Transport>) -> Result<()> {
        {
            let mut slot = self.inner.transport.lock().expect("transport mutex poisoned");
            if slot.is_some() {
                return Err(Error::Connection("a transport is already attached".to_string()));
            }
            *slot = Some(Arc::clone(&transport));
        }

        // An explicit connect starts with a fresh reconnect budget.
        self.inner.reconnect_attempts.store(0, Ordering::SeqCst);
        self.inner.set_state(ConnectionStatus::Connecting, None);
        self.inner.start_session(transport);
        self.wait_for_connected().await
    }

    async fn wait_for_connected(&self) -> Result<()> {
        let mut rx = self.inner.state_tx.subscribe();
        let wait = async move {
            loop {
                let state = rx.borrow_and_update().clone();
                match state.status {
                    ConnectionStatus::Connected => return Ok(()),
                    ConnectionStatus::Error => {
                        return Err(Error::Connection(
                            state.error.unwrap_or_else(|| "Connection failed".to_string()),
                        ));
                    }
                    _ => {}
                }
                if rx.changed().await.is_err() {
                    return Err(Error::Connection("engine dropped".to_string()));
                }
            }
        };
        match tokio::time::timeout(self.inner.config.connect_timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(Error::ConnectionTimeout(self.inner.config.connect_timeout)),
        }
    }

    /// Tear the session down.
    ///
    /// Cancels the heartbeat timer and any scheduled reconnect (an explicit
    /// disconnect always wins the race against a pending reconnect), aborts
    /// the inbound loop, best-effort announces the disconnect on the wire,
    /// closes and detaches the transport, fails pending calls, and
    /// unconditionally resets the state to `Disconnected` with the error
    /// cleared. Safe to call with no transport attached.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` keeps the signature stable.
    pub async fn disconnect(&self) -> Result<()> {
        self.inner.tasks.lock().expect("task mutex poisoned").abort_all();

        let transport = self
            .inner
            .transport
            .lock()
            .expect("transport mutex poisoned")
            .take();
        if let Some(transport) = transport {
            let note = Message::notification(
                format!("disconnect-{}", Uuid::new_v4()),
                serde_json::json!({ "type": "disconnect", "message": "Client is disconnecting" }),
            );
            if let Err(e) = transport.send(note).await {
                debug!("disconnect notification failed: {e}");
            }
            if let Err(e) = transport.close().await {
                debug!("error closing transport: {e}");
            }
        }

        self.inner
            .fail_pending(&Error::Connection("disconnected".to_string()));
        self.inner.set_state(ConnectionStatus::Disconnected, None);
        Ok(())
    }

    /// Dispatch an inbound request through the registry.
    ///
    /// Dual role: executes the named tool, sends the `Response` (or `Error`)
    /// on the request's id downstream, and returns the raw result to the
    /// in-process caller.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] with no transport attached
    /// - [`Error::ToolNotFound`] when the tool is absent (an `Error` message
    ///   with code `EXECUTION_ERROR` is sent on the same id first)
    /// - [`Error::Execution`] when the tool itself fails (likewise relayed)
    pub async fn handle_request(&self, message: &Message) -> Result<Value> {
        let payload = message.request_payload()?;
        let transport = self.inner.current_transport().ok_or_else(|| {
            Error::Connection("transport not attached".to_string())
        })?;
        self.inner
            .dispatch_request(&transport, &message.id, payload)
            .await
    }

    /// Send an outbound correlated request and await its reply.
    ///
    /// Generates a unique id, sends the `Request`, and waits indefinitely for
    /// the matching `Response` or `Error`. Concurrent requests with distinct
    /// ids never cross-resolve. When the connection errors out, every pending
    /// call fails with [`Error::Connection`] as an implicit cancellation.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] with no transport attached, on send failure, or
    ///   when the connection dies while awaiting
    /// - [`Error::Execution`] when the peer replies with an `Error` message
    pub async fn request(&self, tool: &str, args: Map<String, Value>) -> Result<Value> {
        let transport = self.inner.current_transport().ok_or_else(|| {
            Error::Connection("transport not attached".to_string())
        })?;

        let id = format!("{tool}-{}", Uuid::new_v4());
        let (tx, rx) = oneshot::channel();
        self.inner
            .pending
            .lock()
            .expect("pending mutex poisoned")
            .insert(id.clone(), tx);

        if let Err(e) = transport.send(Message::request(id.clone(), tool, args)).await {
            self.inner
                .pending
                .lock()
                .expect("pending mutex poisoned")
                .remove(&id);
            let reason = format!("send failed: {e}");
            self.inner.handle_connection_error(&reason);
            return Err(Error::Connection(reason));
        }

        rx.await
            .map_err(|_| Error::Connection("connection closed while awaiting response".to_string()))?
    }

    /// Register a state-change observer.
    ///
    /// Observers are invoked synchronously, in registration order, on
    /// whichever task triggered the transition; they must not block.
    pub fn on_state_change<F>(&self, callback: F)
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.inner
            .callbacks
            .lock()
            .expect("callback mutex poisoned")
            .push(Box::new(callback));
    }

    /// A watch receiver carrying every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Snapshot of the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().expect("state mutex poisoned").clone()
    }

    /// The registry this engine dispatches through.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.inner.registry)
    }

    /// Serializable descriptors of every registered tool.
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.inner.registry.descriptors()
    }

    /// Time since the engine was created.
    pub fn uptime(&self) -> Duration {
        self.inner.started_at.elapsed()
    }
}

impl EngineInner {
    fn current_transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport
            .lock()
            .expect("transport mutex poisoned")
            .clone()
    }

    fn set_state(&self, status: ConnectionStatus, error: Option<String>) {
        let state = ConnectionState { status, error };
        *self.state.lock().expect("state mutex poisoned") = state.clone();
        debug!("connection state: {:?}", state.status);
        {
            let callbacks = self.callbacks.lock().expect("callback mutex poisoned");
            for callback in callbacks.iter() {
                callback(&state);
            }
        }
        self.state_tx.send_replace(state);
    }

    /// Start (or restart) the heartbeat timer and inbound loop for a session.
    fn start_session(self: &Arc<Self>, transport: Arc<dyn Transport>) {
        let mut tasks = self.tasks.lock().expect("task mutex poisoned");
        if let Some(handle) = tasks.heartbeat.take() {
            handle.abort();
        }
        if let Some(handle) = tasks.inbound.take() {
            handle.abort();
        }

        let inner = Arc::clone(self);
        let heartbeat_transport = Arc::clone(&transport);
        tasks.heartbeat = Some(tokio::spawn(async move {
            inner.run_heartbeat(heartbeat_transport).await;
        }));

        let inner = Arc::clone(self);
        tasks.inbound = Some(tokio::spawn(async move {
            inner.run_inbound(transport).await;
        }));
    }

    /// The inbound message loop - the sole consumer of `transport.receive()`.
    async fn run_inbound(self: Arc<Self>, transport: Arc<dyn Transport>) {
        if let Err(e) = transport.connect().await {
            self.handle_connection_error(&format!("transport connect failed: {e}"));
            return;
        }

        // A successful connection resets the reconnect counter.
        self.reconnect_attempts.store(0, Ordering::SeqCst);
        *self.last_message.lock().expect("last message mutex poisoned") = Instant::now();
        self.set_state(ConnectionStatus::Connected, None);

        loop {
            match transport.receive().await {
                Ok(Some(message)) => self.process_message(&transport, message).await,
                Ok(None) => {
                    self.handle_connection_error("inbound stream ended");
                    return;
                }
                Err(e) => {
                    self.handle_connection_error(&format!("receive failed: {e}"));
                    return;
                }
            }
        }
    }

    async fn process_message(self: &Arc<Self>, transport: &Arc<dyn Transport>, message: Message) {
        *self.last_message.lock().expect("last message mutex poisoned") = Instant::now();

        match message.kind {
            MessageType::Request => {
                let payload = match message.request_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("malformed request payload on id {}: {e}", message.id);
                        self.send_or_flag(
                            transport,
                            Message::error(
                                &message.id,
                                EXECUTION_ERROR_CODE,
                                format!("Malformed request payload: {e}"),
                            ),
                        )
                        .await;
                        return;
                    }
                };
                if payload.tool == HEALTH_CHECK_TOOL {
                    self.answer_health_check(transport, &message.id).await;
                } else if let Err(e) = self.dispatch_request(transport, &message.id, payload).await {
                    // The wire error reply has already been sent; the failure
                    // must not take down the inbound loop.
                    debug!("inbound dispatch failed: {e}");
                }
            }
            MessageType::Response => {
                self.complete_pending(&message.id, Ok(message.payload));
            }
            MessageType::Error => {
                let err = message
                    .error_payload()
                    .map(|p| Error::Execution(format!("{}: {}", p.code, p.message)))
                    .unwrap_or_else(|_| Error::Execution("malformed error payload".to_string()));
                self.complete_pending(&message.id, Err(err));
            }
            MessageType::Notification => {
                debug!("notification {}: {}", message.id, message.payload);
            }
            MessageType::Unknown => {
                debug!("ignoring message {} with unknown type", message.id);
            }
        }
    }

    /// Answer a liveness probe inline, without touching the registry.
    async fn answer_health_check(self: &Arc<Self>, transport: &Arc<dyn Transport>, id: &str) {
        let reply = Message::response(
            id,
            serde_json::json!({
                "status": "healthy",
                "uptime": self.started_at.elapsed().as_secs(),
                "timestamp": unix_millis(),
            }),
        );
        self.send_or_flag(transport, reply).await;
    }

    async fn dispatch_request(
        self: &Arc<Self>,
        transport: &Arc<dyn Transport>,
        id: &str,
        payload: RequestPayload,
    ) -> Result<Value> {
        let Some(tool) = self.registry.tool(&payload.tool) else {
            let err = Error::ToolNotFound(payload.tool.clone());
            self.send_or_flag(
                transport,
                Message::error(id, EXECUTION_ERROR_CODE, err.to_string()),
            )
            .await;
            return Err(err);
        };

        match tool.execute(payload.args, None).await {
            Ok(result) => {
                self.send_or_flag(transport, Message::response(id, result.clone()))
                    .await;
                Ok(result)
            }
            Err(e) => {
                self.send_or_flag(
                    transport,
                    Message::error(id, EXECUTION_ERROR_CODE, e.to_string()),
                )
                .await;
                Err(Error::Execution(e.to_string()))
            }
        }
    }

    async fn send_or_flag(self: &Arc<Self>, transport: &Arc<dyn Transport>, message: Message) {
        if let Err(e) = transport.send(message).await {
            self.handle_connection_error(&format!("send failed: {e}"));
        }
    }

    /// Heartbeat timer: probe only after a window of inbound silence.
    async fn run_heartbeat(self: Arc<Self>, transport: Arc<dyn Transport>) {
        let mut interval = tokio::time::interval(self.config.health_check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let silent = self
                .last_message
                .lock()
                .expect("last message mutex poisoned")
                .elapsed();
            if silent > self.config.message_timeout {
                warn!("no inbound messages for {silent:?}, sending health check");
                let probe = Message::request(
                    format!("health-check-{}", Uuid::new_v4()),
                    HEALTH_CHECK_TOOL,
                    Map::new(),
                );
                if let Err(e) = transport.send(probe).await {
                    self.handle_connection_error(&format!("health check send failed: {e}"));
                    return;
                }
            }
        }
    }

    fn complete_pending(&self, id: &str, result: Result<Value>) {
        let waiter = self
            .pending
            .lock()
            .expect("pending mutex poisoned")
            .remove(id);
        match waiter {
            // The receiver may have been dropped; nothing to do then.
            Some(tx) => drop(tx.send(result)),
            None => debug!("no pending request for id {id}"),
        }
    }

    fn fail_pending(&self, err: &Error) {
        let waiters: Vec<_> = self
            .pending
            .lock()
            .expect("pending mutex poisoned")
            .drain()
            .collect();
        for (_, tx) in waiters {
            drop(tx.send(Err(err.clone())));
        }
    }

    /// Drive the reconnect policy after a transport failure.
    ///
    /// Pending calls fail immediately. While attempts remain, the engine
    /// transitions to `Connecting` and schedules a session restart after a
    /// linear `attempt × base` delay in an abortable timer task, so an
    /// explicit `disconnect` stays responsive during the backoff window.
    /// Exhausting the bound is terminal.
    fn handle_connection_error(self: &Arc<Self>, reason: &str) {
        if self.current_transport().is_none() {
            // Explicit disconnect already detached the transport.
            return;
        }

        self.fail_pending(&Error::Connection(reason.to_string()));

        let max = self.config.max_reconnect_attempts;
        let attempt = self.reconnect_attempts.load(Ordering::SeqCst);
        if attempt < max {
            let attempt = attempt + 1;
            self.reconnect_attempts.store(attempt, Ordering::SeqCst);
            warn!("connection error ({reason}); reconnect attempt {attempt}/{max}");
            self.set_state(
                ConnectionStatus::Connecting,
                Some(format!("Reconnecting... attempt {attempt}/{max}: {reason}")),
            );

            let inner = Arc::clone(self);
            let delay = self.config.reconnect_base_delay * attempt;
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let transport = inner.current_transport();
                if let Some(transport) = transport {
                    // Fresh channel for the new cycle; a closed one is never
                    // reused.
                    if let Err(e) = transport.close().await {
                        debug!("error closing transport before reconnect: {e}");
                    }
                    inner.start_session(transport);
                }
            });

            let mut tasks = self.tasks.lock().expect("task mutex poisoned");
            if let Some(old) = tasks.reconnect.take() {
                old.abort();
            }
            tasks.reconnect = Some(handle);
        } else {
            error!("connection failed after {max} reconnect attempts: {reason}");
            // Terminal: stop the timers and detach the transport so a later
            // explicit `connect` can attach a fresh one.
            {
                let mut tasks = self.tasks.lock().expect("task mutex poisoned");
                if let Some(handle) = tasks.heartbeat.take() {
                    handle.abort();
                }
                if let Some(handle) = tasks.reconnect.take() {
                    handle.abort();
                }
            }
            let transport = self
                .transport
                .lock()
                .expect("transport mutex poisoned")
                .take();
            if let Some(transport) = transport {
                tokio::spawn(async move {
                    if let Err(e) = transport.close().await {
                        debug!("error closing transport after terminal failure: {e}");
                    }
                });
            }
            self.set_state(ConnectionStatus::Error, Some(reason.to_string()));
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
