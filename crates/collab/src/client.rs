//! Collaboration sync client
//!
//! Owns the WebSocket transport and its lifecycle (connect,
//! reconnect-with-backoff, disconnect), stamps and sends outbound
//! intents, and fans inbound frames out to registered subscribers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use sitecraft_protocol::{
    timestamp_ms, CursorPosition, EditAction, EditOp, ElementRef, ErrorDetail, MessageKind,
    Payload, PresenceBeat, SelectionSet, SyncMessage,
};

use crate::config::CollabConfig;
use crate::dispatch::{dispatch_all, HandlerRegistry, SubscriptionId};
use crate::error::CollabError;

type Transport = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Identity triple captured by the most recent connect call.
#[derive(Debug, Clone)]
struct Identity {
    project_id: String,
    user_id: String,
    user_name: String,
}

#[derive(Default)]
struct ClientState {
    identity: Option<Identity>,
    registry: HandlerRegistry,
    /// Writer half of the live connection, when one exists.
    outbound: Option<mpsc::UnboundedSender<Message>>,
    connected: bool,
    /// Connection generation. Bumped by `connect` and `disconnect`;
    /// state mutations from a superseded connection task are discarded
    /// by epoch mismatch.
    epoch: u64,
    /// Most recent presence beat, re-sent by the heartbeat task.
    last_beat: PresenceBeat,
    conn_task: Option<JoinHandle<()>>,
    heartbeat_task: Option<JoinHandle<()>>,
}

struct ClientInner {
    config: CollabConfig,
    state: Mutex<ClientState>,
}

/// Real-time collaboration client.
///
/// Cheap to clone; clones share the same connection, identity, and
/// subscriptions. Construct one at application root and pass it down.
#[derive(Clone)]
pub struct CollabClient {
    inner: Arc<ClientInner>,
}

impl CollabClient {
    pub fn new(config: CollabConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                state: Mutex::new(ClientState::default()),
            }),
        }
    }

    pub fn config(&self) -> &CollabConfig {
        &self.inner.config
    }

    fn lock(&self) -> MutexGuard<'_, ClientState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // === Connection lifecycle ===

    /// Open a collaboration channel for `(project_id, user_id, user_name)`.
    ///
    /// Supersedes any previous connection, including one still in its
    /// backoff window. Transport failures after this call returns are
    /// retried with exponential backoff and never surface as errors;
    /// the only synchronous failure is an unusable configured base URL.
    ///
    /// Must be called within a tokio runtime.
    pub fn connect(
        &self,
        project_id: &str,
        user_id: &str,
        user_name: &str,
    ) -> Result<(), CollabError> {
        let endpoint = self.inner.config.websocket_endpoint()?;
        let identity = Identity {
            project_id: project_id.to_string(),
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
        };

        let mut state = self.lock();
        state.epoch += 1;
        let epoch = state.epoch;
        if let Some(task) = state.conn_task.take() {
            task.abort();
        }
        state.outbound = None;
        state.connected = false;
        state.identity = Some(identity.clone());

        let client = self.clone();
        state.conn_task = Some(tokio::spawn(async move {
            client.run_connection(endpoint, identity, epoch).await;
        }));
        Ok(())
    }

    /// Close the channel and drop all client state.
    ///
    /// Aborts the connection task (cancelling any pending reconnect
    /// timer) and the heartbeat, clears the stored identity, and clears
    /// the entire handler registry: callers must re-subscribe after a
    /// fresh `connect`.
    pub fn disconnect(&self) {
        let mut state = self.lock();
        state.epoch += 1;
        if let Some(task) = state.conn_task.take() {
            task.abort();
        }
        if let Some(task) = state.heartbeat_task.take() {
            task.abort();
        }
        state.outbound = None;
        state.connected = false;
        state.identity = None;
        state.last_beat = PresenceBeat::default();
        state.registry.clear();
        tracing::info!("collaboration client disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// The user id from the most recent `connect`, if any.
    pub fn user_id(&self) -> Option<String> {
        self.lock().identity.as_ref().map(|id| id.user_id.clone())
    }

    /// The project id from the most recent `connect`, if any.
    pub fn project_id(&self) -> Option<String> {
        self.lock().identity.as_ref().map(|id| id.project_id.clone())
    }

    async fn run_connection(self, endpoint: Url, identity: Identity, epoch: u64) {
        let mut attempt: u32 = 0;
        loop {
            match connect_async(endpoint.as_str()).await {
                Ok((transport, _)) => {
                    attempt = 0;
                    tracing::info!(
                        project_id = %identity.project_id,
                        user_id = %identity.user_id,
                        "collaboration channel open"
                    );

                    let (tx, rx) = mpsc::unbounded_channel();
                    if !self.install_session(epoch, tx) {
                        return; // superseded while the handshake was in flight
                    }
                    self.dispatch_local(Payload::Connected);
                    self.run_session(transport, rx).await;
                    if !self.teardown_session(epoch) {
                        return; // superseded while the session was live
                    }
                    tracing::info!(user_id = %identity.user_id, "collaboration channel closed");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "collaboration connect failed");
                }
            }

            attempt += 1;
            if attempt > self.inner.config.max_reconnect_attempts {
                tracing::warn!(
                    attempts = attempt - 1,
                    "reconnect budget exhausted, collaboration stays offline"
                );
                return;
            }
            let delay = reconnect_delay(self.inner.config.reconnect_base_delay(), attempt);
            tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
            tokio::time::sleep(delay).await;
            if self.lock().epoch != epoch {
                return; // superseded during backoff
            }
        }
    }

    /// Publish the session's writer handle, unless superseded.
    fn install_session(&self, epoch: u64, tx: mpsc::UnboundedSender<Message>) -> bool {
        let mut state = self.lock();
        if state.epoch != epoch {
            return false;
        }
        state.outbound = Some(tx);
        state.connected = true;
        true
    }

    /// Mark the session gone, unless superseded.
    fn teardown_session(&self, epoch: u64) -> bool {
        let mut state = self.lock();
        if state.epoch != epoch {
            return false;
        }
        state.outbound = None;
        state.connected = false;
        true
    }

    /// Pump one live connection until it closes or errors.
    async fn run_session(&self, transport: Transport, mut outbound_rx: mpsc::UnboundedReceiver<Message>) {
        let (mut write, mut read) = transport.split();
        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_frame(&text),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary and ping/pong frames are not part of this protocol
                    Some(Err(e)) => {
                        self.dispatch_local(Payload::Error(ErrorDetail {
                            message: e.to_string(),
                        }));
                        break;
                    }
                },
                outgoing = outbound_rx.recv() => match outgoing {
                    Some(message) => {
                        if let Err(e) = write.send(message).await {
                            self.dispatch_local(Payload::Error(ErrorDetail {
                                message: e.to_string(),
                            }));
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        match serde_json::from_str::<SyncMessage>(text) {
            Ok(message) => self.dispatch(&message),
            Err(e) => tracing::warn!(error = %e, "dropping malformed frame"),
        }
    }

    // === Subscriptions ===

    /// Register a handler for one message kind.
    pub fn on(
        &self,
        kind: MessageKind,
        handler: impl Fn(&SyncMessage) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.lock().registry.on(kind, Arc::new(handler))
    }

    /// Register a handler for every message kind.
    pub fn on_any(&self, handler: impl Fn(&SyncMessage) + Send + Sync + 'static) -> SubscriptionId {
        self.lock().registry.on_any(Arc::new(handler))
    }

    /// Remove a subscription; unknown ids are a no-op.
    pub fn off(&self, id: SubscriptionId) {
        self.lock().registry.off(id);
    }

    /// Route a message to kind handlers, then wildcard handlers.
    ///
    /// The handler snapshot is taken outside the state lock so a handler
    /// may call back into the client.
    pub(crate) fn dispatch(&self, message: &SyncMessage) {
        let handlers = self.lock().registry.snapshot(message.payload.kind());
        dispatch_all(&handlers, message);
    }

    fn dispatch_local(&self, payload: Payload) {
        self.dispatch(&SyncMessage::local(payload));
    }

    // === Outbound intents ===

    /// Stamp identity and timestamp onto `payload` and send it.
    ///
    /// Best-effort: while disconnected this logs a warning and drops the
    /// message. Never blocks, never queues, never returns an error.
    fn send(&self, payload: Payload) {
        let kind = payload.kind();
        let (tx, identity) = {
            let state = self.lock();
            match (&state.outbound, &state.identity) {
                (Some(tx), Some(identity)) if state.connected => (tx.clone(), identity.clone()),
                _ => {
                    tracing::warn!(kind = %kind, "send while disconnected, dropping message");
                    return;
                }
            }
        };

        let message = SyncMessage {
            payload,
            project_id: Some(identity.project_id),
            user_id: Some(identity.user_id),
            user_name: Some(identity.user_name),
            timestamp: Some(timestamp_ms()),
        };
        match serde_json::to_string(&message) {
            Ok(json) => {
                if tx.send(Message::Text(json)).is_err() {
                    tracing::warn!(kind = %kind, "connection task gone, dropping message");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to encode outbound message"),
        }
    }

    /// Broadcast the local pointer position.
    pub fn send_cursor(&self, cursor: CursorPosition) {
        self.send(Payload::Cursor(cursor));
    }

    /// Broadcast an edit intent for one element.
    pub fn send_edit(
        &self,
        element_id: &str,
        operation: EditAction,
        data: Option<serde_json::Value>,
    ) {
        self.send(Payload::Edit(EditOp {
            element_id: element_id.to_string(),
            operation,
            data,
        }));
    }

    /// Broadcast the local selection.
    pub fn send_selection(&self, element_ids: Vec<String>) {
        self.send(Payload::Selection(SelectionSet { element_ids }));
    }

    /// Request an advisory edit lock on one element.
    pub fn lock_element(&self, element_id: &str) {
        self.send(Payload::Lock(ElementRef {
            element_id: element_id.to_string(),
        }));
    }

    /// Release an advisory edit lock.
    pub fn unlock_element(&self, element_id: &str) {
        self.send(Payload::Unlock(ElementRef {
            element_id: element_id.to_string(),
        }));
    }

    /// Send a presence beat and remember it as the local snapshot the
    /// heartbeat re-sends.
    pub fn update_presence(
        &self,
        cursor: Option<CursorPosition>,
        active_elements: Option<Vec<String>>,
    ) {
        let beat = PresenceBeat {
            cursor,
            active_elements,
        };
        self.lock().last_beat = beat.clone();
        self.send(Payload::Presence(beat));
    }

    /// Re-send the last presence beat without changing it; used to
    /// request a fresh roster after `user_left`.
    pub fn request_presence(&self) {
        let beat = self.lock().last_beat.clone();
        self.send(Payload::Presence(beat));
    }

    // === Heartbeat ===

    /// Spawn the periodic presence heartbeat.
    ///
    /// Re-sends the last presence beat at the configured interval,
    /// bounding how stale other participants' view of this client can
    /// get. Skips ticks while disconnected. Stopped by `disconnect`.
    pub fn start_heartbeat(&self) {
        let interval = self.inner.config.heartbeat_interval();
        let mut state = self.lock();
        if let Some(task) = state.heartbeat_task.take() {
            task.abort();
        }
        let client = self.clone();
        state.heartbeat_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // skip the immediate first tick
            loop {
                ticker.tick().await;
                if !client.is_connected() {
                    continue;
                }
                client.request_presence();
            }
        }));
    }

    /// Stop the heartbeat task, if running.
    pub fn stop_heartbeat(&self) {
        if let Some(task) = self.lock().heartbeat_task.take() {
            task.abort();
        }
    }
}

/// Delay before reconnect attempt `attempt` (1-based): `base * 2^(attempt-1)`.
pub(crate) fn reconnect_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use proptest::prelude::*;

    #[test]
    fn backoff_doubles_from_base() {
        let base = Duration::from_millis(1000);
        assert_eq!(reconnect_delay(base, 1), Duration::from_millis(1000));
        assert_eq!(reconnect_delay(base, 2), Duration::from_millis(2000));
        assert_eq!(reconnect_delay(base, 3), Duration::from_millis(4000));
        assert_eq!(reconnect_delay(base, 4), Duration::from_millis(8000));
        assert_eq!(reconnect_delay(base, 5), Duration::from_millis(16000));
    }

    proptest! {
        #[test]
        fn backoff_growth_is_exactly_exponential(
            base_ms in 1u64..10_000,
            attempt in 1u32..=5,
        ) {
            let base = Duration::from_millis(base_ms);
            let delay = reconnect_delay(base, attempt);
            prop_assert_eq!(delay, base * 2u32.pow(attempt - 1));
            // Each attempt waits exactly twice as long as the one before.
            if attempt > 1 {
                prop_assert_eq!(delay, reconnect_delay(base, attempt - 1) * 2);
            }
        }
    }

    #[test]
    fn send_while_never_connected_is_silent() {
        let client = CollabClient::new(CollabConfig::default());
        // No connect() has happened; none of these may panic.
        client.send_cursor(CursorPosition {
            x: 1.0,
            y: 2.0,
            element_id: None,
        });
        client.send_edit("hero-1", EditAction::Update, None);
        client.send_selection(vec!["hero-1".to_string()]);
        client.lock_element("hero-1");
        client.unlock_element("hero-1");
        client.update_presence(None, None);
        assert!(!client.is_connected());
    }

    #[test]
    fn disconnect_clears_subscriptions() {
        let client = CollabClient::new(CollabConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        client.on(MessageKind::Edit, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let message = SyncMessage::local(Payload::Edit(EditOp {
            element_id: "hero-1".to_string(),
            operation: EditAction::Update,
            data: None,
        }));
        client.dispatch(&message);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        client.disconnect();
        client.dispatch(&message);
        assert_eq!(calls.load(Ordering::SeqCst), 1, "handler survived disconnect");
    }

    #[test]
    fn off_by_subscription_id() {
        let client = CollabClient::new(CollabConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let id = client.on_any(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        client.off(id);
        client.dispatch(&SyncMessage::local(Payload::UserLeft));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
