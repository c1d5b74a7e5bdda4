// src/realtime/bridge.rs
//
// Realtime Bridge - one live connection per session, fanned out to
// subscribers.
//
// State machine: Disconnected -> Connecting -> Open -> Closed -> (delay)
// -> Connecting -> ... Terminal only after an explicit teardown. Every
// subscriber receives every parsed event; handlers filter by resource
// themselves. Malformed frames are logged and dropped without touching the
// connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::realtime::event::RemoteEvent;
use crate::realtime::transport::{RealtimeTransport, TokenSource};

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Fixed delay before reconnecting after an unexpected close.
    pub reconnect_delay: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closed,
}

type EventHandler = Arc<dyn Fn(&RemoteEvent) + Send + Sync>;

pub struct RealtimeBridge {
    transport: Arc<dyn RealtimeTransport>,
    tokens: Arc<dyn TokenSource>,
    config: BridgeConfig,
    handlers: Arc<RwLock<HashMap<Uuid, EventHandler>>>,
    state: Arc<Mutex<ConnectionState>>,
    closed: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeBridge {
    pub fn new(
        transport: Arc<dyn RealtimeTransport>,
        tokens: Arc<dyn TokenSource>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            transport,
            tokens,
            config,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            closed: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    /// Register a handler that receives every event. Returns the handle to
    /// pass to `unsubscribe`.
    pub fn subscribe<F>(&self, handler: F) -> Uuid
    where
        F: Fn(&RemoteEvent) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.handlers.write().unwrap().insert(id, Arc::new(handler));
        id
    }

    /// Safe to call repeatedly and after the connection is already closed.
    pub fn unsubscribe(&self, id: Uuid) {
        self.handlers.write().unwrap().remove(&id);
    }

    /// Start the connection loop. Idempotent: a second call while the loop
    /// is running is a no-op.
    pub fn init(&self) {
        let mut task = self.task.lock().unwrap();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        self.closed.store(false, Ordering::SeqCst);

        let transport = Arc::clone(&self.transport);
        let tokens = Arc::clone(&self.tokens);
        let handlers = Arc::clone(&self.handlers);
        let state = Arc::clone(&self.state);
        let closed = Arc::clone(&self.closed);
        let config = self.config.clone();

        *task = Some(tokio::spawn(async move {
            run_connection_loop(transport, tokens, handlers, state, closed, config).await;
        }));
    }

    /// Intentional close: no further reconnect attempts.
    pub fn teardown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
        }
        *self.state.lock().unwrap() = ConnectionState::Closed;
    }
}

impl Drop for RealtimeBridge {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn run_connection_loop(
    transport: Arc<dyn RealtimeTransport>,
    tokens: Arc<dyn TokenSource>,
    handlers: Arc<RwLock<HashMap<Uuid, EventHandler>>>,
    state: Arc<Mutex<ConnectionState>>,
    closed: Arc<AtomicBool>,
    config: BridgeConfig,
) {
    while !closed.load(Ordering::SeqCst) {
        *state.lock().unwrap() = ConnectionState::Connecting;

        match connect_once(&transport, &tokens).await {
            Ok(mut stream) => {
                *state.lock().unwrap() = ConnectionState::Open;
                while let Some(frame) = stream.next_frame().await {
                    if closed.load(Ordering::SeqCst) {
                        break;
                    }
                    match RemoteEvent::parse(&frame) {
                        Ok(event) => fan_out(&handlers, &event),
                        Err(e) => log::warn!("dropping malformed realtime frame: {e}"),
                    }
                }
                *state.lock().unwrap() = ConnectionState::Closed;
            }
            Err(e) => {
                log::warn!("realtime connect failed: {e}");
            }
        }

        if closed.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(config.reconnect_delay).await;
    }
    *state.lock().unwrap() = ConnectionState::Closed;
}

async fn connect_once(
    transport: &Arc<dyn RealtimeTransport>,
    tokens: &Arc<dyn TokenSource>,
) -> crate::error::AppResult<Box<dyn crate::realtime::transport::RealtimeStream>> {
    // Token is refreshed at every attempt; a reconnect never reuses an
    // expired credential.
    let token = tokens.token().await?;
    transport.connect(&token).await
}

fn fan_out(handlers: &RwLock<HashMap<Uuid, EventHandler>>, event: &RemoteEvent) {
    // Snapshot the handlers so subscribe/unsubscribe from inside a handler
    // cannot deadlock on the registry lock.
    let snapshot: Vec<EventHandler> = handlers.read().unwrap().values().cloned().collect();
    for handler in snapshot {
        handler(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, AppResult};
    use crate::realtime::transport::{RealtimeStream, StaticTokenSource};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    struct ScriptedStream {
        frames: VecDeque<String>,
    }

    #[async_trait]
    impl RealtimeStream for ScriptedStream {
        async fn next_frame(&mut self) -> Option<String> {
            self.frames.pop_front()
        }
    }

    /// Hands out one scripted frame batch per connect, then refuses.
    struct ScriptedTransport {
        connects: Mutex<VecDeque<Vec<String>>>,
        connect_count: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(connects: Vec<Vec<&str>>) -> Self {
            Self {
                connects: Mutex::new(
                    connects
                        .into_iter()
                        .map(|frames| frames.into_iter().map(String::from).collect())
                        .collect(),
                ),
                connect_count: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RealtimeTransport for ScriptedTransport {
        async fn connect(&self, _token: &str) -> AppResult<Box<dyn RealtimeStream>> {
            self.connect_count.fetch_add(1, Ordering::SeqCst);
            match self.connects.lock().unwrap().pop_front() {
                Some(frames) => Ok(Box::new(ScriptedStream {
                    frames: frames.into(),
                })),
                None => Err(AppError::ConnectionClosed),
            }
        }
    }

    fn bridge_with(transport: Arc<ScriptedTransport>) -> RealtimeBridge {
        RealtimeBridge::new(
            transport,
            Arc::new(StaticTokenSource::new("test-token")),
            BridgeConfig::default(),
        )
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    async fn wait_for(mut cond: impl FnMut() -> bool) {
        for _ in 0..50 {
            if cond() {
                return;
            }
            tokio::time::advance(Duration::from_secs(2)).await;
            settle().await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_events_fan_out_to_all_subscribers() {
        let transport = Arc::new(ScriptedTransport::new(vec![vec![
            r#"{"resource":"customer","action":"created","payload":{"id":1}}"#,
            r#"{"resource":"customer","action":"deleted","payload":{"id":1}}"#,
        ]]));
        let bridge = bridge_with(Arc::clone(&transport));

        let count_a = Arc::new(AtomicUsize::new(0));
        let count_b = Arc::new(AtomicUsize::new(0));
        let a = Arc::clone(&count_a);
        let b = Arc::clone(&count_b);
        bridge.subscribe(move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        });
        bridge.subscribe(move |_| {
            b.fetch_add(1, Ordering::SeqCst);
        });

        bridge.init();
        wait_for(|| count_a.load(Ordering::SeqCst) == 2).await;
        assert_eq!(count_b.load(Ordering::SeqCst), 2);
        bridge.teardown();
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_malformed_frame_is_dropped_not_fatal() {
        let transport = Arc::new(ScriptedTransport::new(vec![vec![
            r#"{"resource":"customer","action":"created","payload":{"id":1}}"#,
            "this is not json",
            r#"{"type":"customer.updated","payload":{"id":1}}"#,
        ]]));
        let bridge = bridge_with(Arc::clone(&transport));

        let delivered = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&delivered);
        bridge.subscribe(move |_| {
            d.fetch_add(1, Ordering::SeqCst);
        });

        bridge.init();
        // The frame after the malformed one still arrives.
        wait_for(|| delivered.load(Ordering::SeqCst) == 2).await;
        bridge.teardown();
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_reconnects_after_unexpected_close() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            vec![r#"{"resource":"sale","action":"created","payload":{"id":1}}"#],
            vec![r#"{"resource":"sale","action":"created","payload":{"id":2}}"#],
        ]));
        let bridge = bridge_with(Arc::clone(&transport));

        let delivered = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&delivered);
        bridge.subscribe(move |_| {
            d.fetch_add(1, Ordering::SeqCst);
        });

        bridge.init();
        wait_for(|| delivered.load(Ordering::SeqCst) == 2).await;
        assert!(transport.connect_count.load(Ordering::SeqCst) >= 2);
        bridge.teardown();
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_teardown_stops_reconnecting() {
        let transport = Arc::new(ScriptedTransport::new(vec![vec![]]));
        let bridge = bridge_with(Arc::clone(&transport));

        bridge.init();
        wait_for(|| transport.connect_count.load(Ordering::SeqCst) >= 1).await;
        bridge.teardown();
        assert_eq!(bridge.state(), ConnectionState::Closed);

        let attempts = transport.connect_count.load(Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(transport.connect_count.load(Ordering::SeqCst), attempts);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_unsubscribe_is_idempotent_and_safe_after_close() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let bridge = bridge_with(transport);

        let id = bridge.subscribe(|_| {});
        bridge.unsubscribe(id);
        bridge.unsubscribe(id);
        bridge.teardown();
        bridge.unsubscribe(id);
    }
}
