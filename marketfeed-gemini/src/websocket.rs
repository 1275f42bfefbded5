//! Gemini WebSocket client for real-time market data
//!
//! Opens one v1 market data stream per instrument. The first frame on each
//! stream is the order book at subscription time; every later frame is an
//! incremental update. Decoded frames are delivered on a bounded channel;
//! a reader waits for the consumer instead of dropping frames.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use marketfeed_core::{ConnectionState, Exchange, FeedError, FeedResult};

use crate::backoff::{FailureAction, ReconnectPolicy};
use crate::config::GeminiWebSocketConfig;
use crate::decode::{decode_initial, decode_update};
use crate::sequence::{SequenceCheck, SequenceTracker};
use crate::transport::{Connection, Connector, TungsteniteConnector};
use crate::types::{InitialState, Update};

const EXCHANGE: Exchange = Exchange::Gemini;

/// Capacity of the update channel shared by all instrument feeds
const UPDATE_CHANNEL_CAPACITY: usize = 1024;

/// Build the subscription address for one instrument.
pub fn subscription_url(base_url: &str, instrument: &str, heartbeat: bool) -> String {
    let mut address = String::with_capacity(base_url.len() + instrument.len() + 16);
    address.push_str(base_url);
    address.push_str(instrument);
    address.push_str(if heartbeat {
        "?heartbeat=true"
    } else {
        "?heartbeat=false"
    });
    address
}

// ============================================================================
// Normalized Update Types (sent to consumers)
// ============================================================================

/// Update from a Gemini market data stream
#[derive(Debug, Clone)]
pub enum GeminiUpdate {
    /// Order book at subscription time
    InitialState {
        instrument: String,
        state: InitialState,
    },
    /// Incremental changes and trades
    Update { instrument: String, update: Update },
    /// Connection state change
    ConnectionState {
        instrument: String,
        state: ConnectionState,
        error: Option<String>,
    },
}

/// Why an instrument feed stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    /// The reconnect policy gave up after this error
    Failed(FeedError),
}

/// Counters reported by an instrument feed when it stops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSummary {
    pub instrument: String,
    /// Successfully established connections
    pub connections: u32,
    /// Frames decoded and forwarded (heartbeats excluded)
    pub messages: u64,
    pub heartbeats: u64,
    pub decode_failures: u64,
    pub sequence_anomalies: u64,
    pub stop: StopReason,
}

// ============================================================================
// Gemini WebSocket Client
// ============================================================================

/// Gemini WebSocket client
pub struct GeminiWebSocket<C = TungsteniteConnector> {
    config: GeminiWebSocketConfig,
    connector: Arc<C>,
    /// Channel to send updates to consumers
    update_tx: mpsc::Sender<GeminiUpdate>,
}

impl GeminiWebSocket<TungsteniteConnector> {
    /// Create a new Gemini WebSocket client
    pub fn new(config: GeminiWebSocketConfig) -> (Self, mpsc::Receiver<GeminiUpdate>) {
        Self::with_connector(config, TungsteniteConnector)
    }
}

impl<C> GeminiWebSocket<C>
where
    C: Connector + 'static,
{
    /// Create a client over a custom transport
    pub fn with_connector(
        config: GeminiWebSocketConfig,
        connector: C,
    ) -> (Self, mpsc::Receiver<GeminiUpdate>) {
        let (update_tx, update_rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);

        (
            Self {
                config,
                connector: Arc::new(connector),
                update_tx,
            },
            update_rx,
        )
    }

    /// Spawn one task per configured instrument.
    ///
    /// Each task runs until `cancel` fires or its reconnect policy gives up.
    pub fn start(&self, cancel: CancellationToken) -> FeedResult<Vec<JoinHandle<FeedSummary>>> {
        self.config.validate()?;

        info!(
            "[{} WS] Starting feeds for {} instrument(s)",
            EXCHANGE,
            self.config.instruments.len()
        );
        let handles = self
            .config
            .instruments
            .iter()
            .map(|instrument| {
                let feed = self.instrument_feed(instrument, self.config.reconnect_policy());
                let cancel = cancel.clone();
                tokio::spawn(async move { feed.run(cancel).await })
            })
            .collect();

        Ok(handles)
    }

    /// Build the feed for a single instrument without spawning it
    pub fn instrument_feed(
        &self,
        instrument: &str,
        policy: Box<dyn ReconnectPolicy>,
    ) -> InstrumentFeed<C> {
        InstrumentFeed {
            instrument: instrument.to_string(),
            address: subscription_url(&self.config.base_url, instrument, self.config.heartbeat),
            connector: Arc::clone(&self.connector),
            update_tx: self.update_tx.clone(),
            policy,
            tracker: SequenceTracker::new(),
            counters: Counters::default(),
        }
    }

}

impl<C> std::fmt::Debug for GeminiWebSocket<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiWebSocket")
            .field("config", &self.config)
            .finish()
    }
}

// ============================================================================
// Per-instrument connection loop
// ============================================================================

#[derive(Debug, Default)]
struct Counters {
    connections: u32,
    messages: u64,
    heartbeats: u64,
    decode_failures: u64,
    sequence_anomalies: u64,
}

/// Connection loop for one instrument
pub struct InstrumentFeed<C: Connector> {
    instrument: String,
    address: String,
    connector: Arc<C>,
    update_tx: mpsc::Sender<GeminiUpdate>,
    policy: Box<dyn ReconnectPolicy>,
    tracker: SequenceTracker,
    counters: Counters,
}

impl<C: Connector> InstrumentFeed<C> {
    /// Main connection loop with reconnection logic
    pub async fn run(mut self, cancel: CancellationToken) -> FeedSummary {
        let stop = loop {
            let error = match self.run_connection(&cancel).await {
                Ok(()) => break StopReason::Cancelled,
                Err(e) => e,
            };

            self.notify(ConnectionState::Disconnected, Some(error.to_string()))
                .await;

            match self.policy.on_failure(&error) {
                FailureAction::Retry(delay) => {
                    info!(
                        "[{} WS] Reconnecting {} in {:?}",
                        EXCHANGE, self.instrument, delay
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break StopReason::Cancelled,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                FailureAction::Stop => {
                    error!(
                        "[{} WS] Giving up on {}: {}",
                        EXCHANGE, self.instrument, error
                    );
                    self.notify(ConnectionState::Failed, Some(error.to_string()))
                        .await;
                    break StopReason::Failed(error);
                }
            }
        };

        if stop == StopReason::Cancelled {
            info!("[{} WS] Feed for {} cancelled", EXCHANGE, self.instrument);
            self.notify(ConnectionState::Disconnected, None).await;
        }

        FeedSummary {
            instrument: self.instrument,
            connections: self.counters.connections,
            messages: self.counters.messages,
            heartbeats: self.counters.heartbeats,
            decode_failures: self.counters.decode_failures,
            sequence_anomalies: self.counters.sequence_anomalies,
            stop,
        }
    }

    /// Connect once and read until the connection fails or `cancel` fires.
    ///
    /// Returns `Ok(())` when cancelled, otherwise the error that ended the
    /// connection.
    async fn run_connection(&mut self, cancel: &CancellationToken) -> FeedResult<()> {
        info!("[{} WS] Connecting to {}", EXCHANGE, self.address);
        self.notify(ConnectionState::Connecting, None).await;

        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            result = self.connector.connect(&self.address) => result,
        };
        let mut connection = connected.map_err(|e| {
            error!(
                "[{} WS] Error connecting to websocket for {}: {}",
                EXCHANGE, self.instrument, e
            );
            e
        })?;

        info!("[{} WS] Connected to {}", EXCHANGE, self.instrument);
        self.counters.connections += 1;
        self.tracker.reset();
        self.notify(ConnectionState::Connected, None).await;

        let result = self.read_frames(&mut connection, cancel).await;
        connection.close().await;
        match result {
            Err(FeedError::Cancelled) => Ok(()),
            other => other,
        }
    }

    async fn read_frames(
        &mut self,
        connection: &mut C::Connection,
        cancel: &CancellationToken,
    ) -> FeedResult<()> {
        // The first frame carries the current state of the book; later frames
        // carry trades and book changes.
        let initial = receive(connection, cancel).await.map_err(|e| {
            if e != FeedError::Cancelled {
                error!(
                    "[{} WS] Error retrieving initial state of order book for {}: {}",
                    EXCHANGE, self.instrument, e
                );
            }
            e
        })?;
        self.policy.on_connected();
        self.handle_initial(&initial).await;

        loop {
            let frame = receive(connection, cancel).await.map_err(|e| {
                if e != FeedError::Cancelled {
                    error!(
                        "[{} WS] Error in reading message for {}: {}",
                        EXCHANGE, self.instrument, e
                    );
                }
                e
            })?;
            self.handle_update(&frame).await;
        }
    }

    async fn handle_initial(&mut self, bytes: &[u8]) {
        let state = match decode_initial(bytes) {
            Ok(state) => state,
            Err(e) => {
                warn!(
                    "[{} WS] Skipping initial state for {}: {}",
                    EXCHANGE, self.instrument, e
                );
                self.counters.decode_failures += 1;
                return;
            }
        };

        debug!(
            "[{} WS] Initial state for {}: event_id={} socket_sequence={} levels={}",
            EXCHANGE,
            self.instrument,
            state.event_id,
            state.socket_sequence,
            state.events.len()
        );
        self.check_sequence(state.socket_sequence, Some(state.event_id));
        self.counters.messages += 1;

        self.forward(GeminiUpdate::InitialState {
            instrument: self.instrument.clone(),
            state,
        })
        .await;
    }

    async fn handle_update(&mut self, bytes: &[u8]) {
        let update = match decode_update(bytes) {
            Ok(update) => update,
            Err(e) => {
                warn!(
                    "[{} WS] Skipping update for {}: {}",
                    EXCHANGE, self.instrument, e
                );
                self.counters.decode_failures += 1;
                return;
            }
        };

        if update.is_heartbeat() {
            debug!(
                "[{} WS] Heartbeat for {} (socket_sequence={})",
                EXCHANGE, self.instrument, update.socket_sequence
            );
            self.check_sequence(update.socket_sequence, None);
            self.counters.heartbeats += 1;
            return;
        }

        self.check_sequence(update.socket_sequence, Some(update.event_id));
        self.counters.messages += 1;

        self.forward(GeminiUpdate::Update {
            instrument: self.instrument.clone(),
            update,
        })
        .await;
    }

    fn check_sequence(&mut self, socket_sequence: u32, event_id: Option<u64>) {
        let check = self.tracker.observe(socket_sequence, event_id);
        if !check.is_anomaly() {
            return;
        }

        self.counters.sequence_anomalies += 1;
        match check {
            SequenceCheck::Gap { expected, received } => warn!(
                "[{} WS] {} socket sequence gap: expected {}, received {}",
                EXCHANGE, self.instrument, expected, received
            ),
            SequenceCheck::Replayed { last, received } => warn!(
                "[{} WS] {} socket sequence went backwards: last {}, received {}",
                EXCHANGE, self.instrument, last, received
            ),
            SequenceCheck::EventIdRegression { last, received } => warn!(
                "[{} WS] {} eventId went backwards: last {}, received {}",
                EXCHANGE, self.instrument, last, received
            ),
            SequenceCheck::InOrder => {}
        }
    }

    async fn notify(&mut self, state: ConnectionState, error: Option<String>) {
        self.forward(GeminiUpdate::ConnectionState {
            instrument: self.instrument.clone(),
            state,
            error,
        })
        .await;
    }

    /// Wait for channel capacity; only fails once every receiver is gone.
    async fn forward(&mut self, update: GeminiUpdate) {
        if self.update_tx.send(update).await.is_err() {
            debug!(
                "[{} WS] No consumer for {} updates, dropping",
                EXCHANGE, self.instrument
            );
        }
    }
}

impl<C: Connector> std::fmt::Debug for InstrumentFeed<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentFeed")
            .field("instrument", &self.instrument)
            .field("address", &self.address)
            .finish()
    }
}

/// Receive one frame unless cancelled first
async fn receive<T: Connection + ?Sized>(
    connection: &mut T,
    cancel: &CancellationToken,
) -> FeedResult<Vec<u8>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FeedError::Cancelled),
        frame = connection.receive() => frame,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::backoff::{ExponentialBackoff, NoRetry};

    const INITIAL: &str = r#"{"type":"update","eventId":5,"socket_sequence":0,"events":[{"type":"change","price":"100.5","delta":"0.1","remaining":"0.1","side":"bid","reason":"initial"}]}"#;
    const UPDATE_1: &str = r#"{"type":"update","eventId":6,"timestamp":1614556800,"timestampms":1614556800123,"socket_sequence":1,"events":[{"type":"trade","tid":1,"price":"100.5","amount":"0.1","makerSide":"bid"}]}"#;
    const UPDATE_2: &str = r#"{"type":"update","eventId":7,"timestamp":1614556801,"timestampms":1614556801456,"socket_sequence":2,"events":[]}"#;

    type Script = Vec<FeedResult<Vec<u8>>>;

    fn frame(json: &str) -> FeedResult<Vec<u8>> {
        Ok(json.as_bytes().to_vec())
    }

    /// Hands out one scripted connection per connect call
    #[derive(Default)]
    struct ScriptedConnector {
        scripts: Mutex<VecDeque<FeedResult<Script>>>,
        addresses: Mutex<Vec<String>>,
    }

    impl ScriptedConnector {
        fn new(scripts: Vec<FeedResult<Script>>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                addresses: Mutex::new(Vec::new()),
            }
        }
    }

    struct ScriptedConnection {
        frames: VecDeque<FeedResult<Vec<u8>>>,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        type Connection = ScriptedConnection;

        async fn connect(&self, address: &str) -> FeedResult<Self::Connection> {
            self.addresses.lock().unwrap().push(address.to_string());
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FeedError::connect("connection refused")))?;
            Ok(ScriptedConnection {
                frames: script.into(),
            })
        }
    }

    #[async_trait]
    impl Connection for ScriptedConnection {
        async fn receive(&mut self) -> FeedResult<Vec<u8>> {
            match self.frames.pop_front() {
                Some(frame) => frame,
                // An idle but healthy connection
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) {}
    }

    fn client(
        connector: ScriptedConnector,
    ) -> (
        GeminiWebSocket<ScriptedConnector>,
        mpsc::Receiver<GeminiUpdate>,
    ) {
        GeminiWebSocket::with_connector(GeminiWebSocketConfig::default(), connector)
    }

    fn drain(rx: &mut mpsc::Receiver<GeminiUpdate>) -> Vec<GeminiUpdate> {
        let mut out = Vec::new();
        while let Ok(update) = rx.try_recv() {
            out.push(update);
        }
        out
    }

    /// Wait for the n-th data frame (initial state or update)
    async fn wait_for_data(rx: &mut mpsc::Receiver<GeminiUpdate>, n: usize) -> Vec<GeminiUpdate> {
        let mut seen = Vec::new();
        let mut data = 0;
        while data < n {
            let update = rx.recv().await.unwrap();
            if !matches!(update, GeminiUpdate::ConnectionState { .. }) {
                data += 1;
            }
            seen.push(update);
        }
        seen
    }

    #[test]
    fn test_subscription_url() {
        assert_eq!(
            subscription_url("wss://api.gemini.com/v1/marketdata/", "BTCUSD", false),
            "wss://api.gemini.com/v1/marketdata/BTCUSD?heartbeat=false"
        );
        assert_eq!(
            subscription_url("wss://api.gemini.com/v1/marketdata/", "ETHUSD", true),
            "wss://api.gemini.com/v1/marketdata/ETHUSD?heartbeat=true"
        );
    }

    #[tokio::test]
    async fn test_frames_processed_in_order_then_stops_without_retry() {
        let connector = ScriptedConnector::new(vec![Ok(vec![
            frame(INITIAL),
            frame(UPDATE_1),
            frame(UPDATE_2),
            Err(FeedError::receive("connection reset")),
        ])]);
        let (ws, mut rx) = client(connector);

        let summary = ws
            .instrument_feed("BTCUSD", Box::new(NoRetry))
            .run(CancellationToken::new())
            .await;

        assert_eq!(summary.connections, 1);
        assert_eq!(summary.messages, 3);
        assert_eq!(summary.decode_failures, 0);
        assert_eq!(summary.sequence_anomalies, 0);
        assert_eq!(
            summary.stop,
            StopReason::Failed(FeedError::receive("connection reset"))
        );

        let updates = drain(&mut rx);
        assert!(matches!(
            updates[0],
            GeminiUpdate::ConnectionState { state: ConnectionState::Connecting, .. }
        ));
        assert!(matches!(
            updates[1],
            GeminiUpdate::ConnectionState { state: ConnectionState::Connected, .. }
        ));
        match &updates[2] {
            GeminiUpdate::InitialState { instrument, state } => {
                assert_eq!(instrument, "BTCUSD");
                assert_eq!(state.event_id, 5);
                assert_eq!(state.events.len(), 1);
            }
            other => panic!("expected initial state, got {:?}", other),
        }
        match &updates[3] {
            GeminiUpdate::Update { update, .. } => {
                assert_eq!(update.event_id, 6);
                assert_eq!(update.timestampms, 1614556800123);
            }
            other => panic!("expected update, got {:?}", other),
        }
        match &updates[4] {
            GeminiUpdate::Update { update, .. } => assert_eq!(update.event_id, 7),
            other => panic!("expected update, got {:?}", other),
        }
        assert!(matches!(
            updates[5],
            GeminiUpdate::ConnectionState { state: ConnectionState::Disconnected, .. }
        ));
        assert!(matches!(
            updates[6],
            GeminiUpdate::ConnectionState { state: ConnectionState::Failed, .. }
        ));
        assert_eq!(updates.len(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_read_error() {
        let connector = ScriptedConnector::new(vec![
            Ok(vec![
                frame(INITIAL),
                frame(UPDATE_1),
                frame(UPDATE_2),
                Err(FeedError::receive("connection reset")),
            ]),
            Ok(vec![frame(INITIAL), frame(UPDATE_1)]),
        ]);
        let (ws, mut rx) = client(connector);
        let cancel = CancellationToken::new();

        let policy = ExponentialBackoff::new(Duration::from_millis(10), Duration::from_secs(1), Some(3));
        let feed = ws.instrument_feed("BTCUSD", Box::new(policy));
        let handle = tokio::spawn(feed.run(cancel.clone()));

        let seen = wait_for_data(&mut rx, 5).await;
        cancel.cancel();
        let summary = handle.await.unwrap();

        assert_eq!(summary.connections, 2);
        assert_eq!(summary.messages, 5);
        assert_eq!(summary.sequence_anomalies, 0);
        assert_eq!(summary.stop, StopReason::Cancelled);

        let initial_states = seen
            .iter()
            .filter(|u| matches!(u, GeminiUpdate::InitialState { .. }))
            .count();
        assert_eq!(initial_states, 2);
    }

    #[tokio::test]
    async fn test_connect_failure_without_retry() {
        let connector = ScriptedConnector::new(vec![Err(FeedError::connect("dns failure"))]);
        let (ws, _rx) = client(connector);

        let summary = ws
            .instrument_feed("BTCUSD", Box::new(NoRetry))
            .run(CancellationToken::new())
            .await;

        assert_eq!(summary.connections, 0);
        assert_eq!(summary.messages, 0);
        assert_eq!(summary.stop, StopReason::Failed(FeedError::connect("dns failure")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_retries_until_policy_gives_up() {
        let connector = ScriptedConnector::new(vec![]);
        let (ws, _rx) = client(connector);

        let policy = ExponentialBackoff::new(Duration::from_millis(10), Duration::from_secs(1), Some(2));
        let feed = ws.instrument_feed("BTCUSD", Box::new(policy));
        let summary = feed.run(CancellationToken::new()).await;

        assert!(matches!(summary.stop, StopReason::Failed(FeedError::Connect(_))));
        // One initial attempt plus two retries
        assert_eq!(ws.connector.addresses.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_initial_read_is_not_decoded() {
        let connector = ScriptedConnector::new(vec![Ok(vec![Err(FeedError::closed("stream ended"))])]);
        let (ws, mut rx) = client(connector);

        let summary = ws
            .instrument_feed("BTCUSD", Box::new(NoRetry))
            .run(CancellationToken::new())
            .await;

        assert_eq!(summary.connections, 1);
        assert_eq!(summary.messages, 0);
        assert_eq!(summary.decode_failures, 0);
        assert!(drain(&mut rx)
            .iter()
            .all(|u| matches!(u, GeminiUpdate::ConnectionState { .. })));
    }

    #[tokio::test]
    async fn test_undecodable_frame_is_skipped() {
        let connector = ScriptedConnector::new(vec![Ok(vec![
            frame(INITIAL),
            frame("{not json"),
            frame(UPDATE_1),
        ])]);
        let (ws, mut rx) = client(connector);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(ws.instrument_feed("BTCUSD", Box::new(NoRetry)).run(cancel.clone()));
        wait_for_data(&mut rx, 2).await;
        cancel.cancel();
        let summary = handle.await.unwrap();

        assert_eq!(summary.messages, 2);
        assert_eq!(summary.decode_failures, 1);
        assert_eq!(summary.stop, StopReason::Cancelled);
    }

    #[tokio::test]
    async fn test_heartbeats_are_observed_but_not_forwarded() {
        let connector = ScriptedConnector::new(vec![Ok(vec![
            frame(INITIAL),
            frame(r#"{"type":"heartbeat","socket_sequence":1}"#),
            frame(r#"{"type":"update","eventId":6,"socket_sequence":2,"events":[]}"#),
        ])]);
        let (ws, mut rx) = client(connector);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(ws.instrument_feed("BTCUSD", Box::new(NoRetry)).run(cancel.clone()));
        let seen = wait_for_data(&mut rx, 2).await;
        cancel.cancel();
        let summary = handle.await.unwrap();

        assert_eq!(summary.heartbeats, 1);
        assert_eq!(summary.messages, 2);
        assert_eq!(summary.sequence_anomalies, 0);
        assert!(seen.iter().all(|u| match u {
            GeminiUpdate::Update { update, .. } => !update.is_heartbeat(),
            _ => true,
        }));
    }

    #[tokio::test]
    async fn test_sequence_gap_is_counted_not_fatal() {
        let connector = ScriptedConnector::new(vec![Ok(vec![
            frame(INITIAL),
            frame(UPDATE_2),
            frame(r#"{"type":"update","eventId":8,"socket_sequence":3,"events":[]}"#),
        ])]);
        let (ws, mut rx) = client(connector);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(ws.instrument_feed("BTCUSD", Box::new(NoRetry)).run(cancel.clone()));
        wait_for_data(&mut rx, 3).await;
        cancel.cancel();
        let summary = handle.await.unwrap();

        assert_eq!(summary.messages, 3);
        assert_eq!(summary.sequence_anomalies, 1);
    }

    #[tokio::test]
    async fn test_cancel_while_idle() {
        let connector = ScriptedConnector::new(vec![Ok(vec![frame(INITIAL)])]);
        let (ws, mut rx) = client(connector);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(ws.instrument_feed("BTCUSD", Box::new(NoRetry)).run(cancel.clone()));
        wait_for_data(&mut rx, 1).await;
        cancel.cancel();
        let summary = handle.await.unwrap();

        assert_eq!(summary.stop, StopReason::Cancelled);
        assert_eq!(summary.messages, 1);
    }

    #[tokio::test]
    async fn test_start_spawns_one_feed_per_instrument() {
        let connector = ScriptedConnector::new(vec![Ok(vec![frame(INITIAL)]), Ok(vec![frame(INITIAL)])]);
        let config = GeminiWebSocketConfig {
            instruments: vec!["BTCUSD".to_string(), "ETHUSD".to_string()],
            ..Default::default()
        };
        let (ws, mut rx) = GeminiWebSocket::with_connector(config, connector);
        let cancel = CancellationToken::new();

        let handles = ws.start(cancel.clone()).unwrap();
        assert_eq!(handles.len(), 2);

        wait_for_data(&mut rx, 2).await;
        cancel.cancel();
        for handle in handles {
            assert_eq!(handle.await.unwrap().stop, StopReason::Cancelled);
        }

        let mut addresses = ws.connector.addresses.lock().unwrap().clone();
        addresses.sort();
        assert_eq!(
            addresses,
            vec![
                "wss://api.gemini.com/v1/marketdata/BTCUSD?heartbeat=false",
                "wss://api.gemini.com/v1/marketdata/ETHUSD?heartbeat=false",
            ]
        );
    }

    #[tokio::test]
    async fn test_start_rejects_empty_instrument_list() {
        let config = GeminiWebSocketConfig {
            instruments: vec![],
            ..Default::default()
        };
        let (ws, _rx) = GeminiWebSocket::with_connector(config, ScriptedConnector::default());

        let err = ws.start(CancellationToken::new()).unwrap_err();
        assert!(matches!(err, FeedError::Config(_)));
    }

    #[tokio::test]
    async fn test_reader_waits_for_consumer_instead_of_dropping() {
        let total_updates = UPDATE_CHANNEL_CAPACITY + 476;
        let mut script = vec![frame(INITIAL)];
        for seq in 1..=total_updates {
            let json = format!(
                r#"{{"type":"update","eventId":{},"socket_sequence":{},"events":[]}}"#,
                seq + 5,
                seq
            );
            script.push(Ok(json.into_bytes()));
        }
        script.push(Err(FeedError::receive("connection reset")));

        let (ws, mut rx) = client(ScriptedConnector::new(vec![Ok(script)]));
        let handle = tokio::spawn(ws.instrument_feed("BTCUSD", Box::new(NoRetry)).run(CancellationToken::new()));

        // Let the reader run ahead until the channel is full
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }

        let mut event_ids = Vec::new();
        loop {
            match rx.recv().await.unwrap() {
                GeminiUpdate::InitialState { state, .. } => event_ids.push(state.event_id),
                GeminiUpdate::Update { update, .. } => event_ids.push(update.event_id),
                GeminiUpdate::ConnectionState { state: ConnectionState::Failed, .. } => break,
                GeminiUpdate::ConnectionState { .. } => {}
            }
        }
        let summary = handle.await.unwrap();

        assert_eq!(summary.messages, (total_updates + 1) as u64);
        assert_eq!(event_ids.len(), total_updates + 1);
        let expected: Vec<u64> = (5..=(total_updates as u64 + 5)).collect();
        assert_eq!(event_ids, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_sleep() {
        let (ws, mut rx) = client(ScriptedConnector::new(vec![]));
        let cancel = CancellationToken::new();

        let policy = ExponentialBackoff::new(Duration::from_secs(60), Duration::from_secs(60), None);
        let handle = tokio::spawn(ws.instrument_feed("BTCUSD", Box::new(policy)).run(cancel.clone()));

        // Connecting, then Disconnected once the first connect is refused
        loop {
            if let GeminiUpdate::ConnectionState { state: ConnectionState::Disconnected, .. } =
                rx.recv().await.unwrap()
            {
                break;
            }
        }
        cancel.cancel();
        let summary = handle.await.unwrap();

        assert_eq!(summary.stop, StopReason::Cancelled);
        assert_eq!(summary.connections, 0);
        assert_eq!(ws.connector.addresses.lock().unwrap().len(), 1);
        assert!(drain(&mut rx)
            .iter()
            .all(|u| !matches!(u, GeminiUpdate::ConnectionState { state: ConnectionState::Connecting, .. })));
    }
}
