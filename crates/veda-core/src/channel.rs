//! The persistent command channel.
//!
//! A single driver task owns the [`ChannelState`], the [`RetryBudget`] and the
//! live connection. Callers talk to it through a cloneable
//! [`TransportChannel`] handle and observe it through an ordered stream of
//! [`ChannelEvent`]s: every state transition is emitted exactly once, in the
//! order it happened, interleaved with inbound messages in arrival order.
//!
//! Reconnection uses a constant delay. A failure while the budget has room
//! schedules one more attempt; a failure with the budget spent moves the
//! channel to [`ChannelState::Failed`], where it stays until someone calls
//! [`TransportChannel::open`] again.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::ChannelError;
use crate::message::{parse_inbound, InboundMessage};
use crate::state::{ChannelState, RetryBudget};

/// One established connection.
#[async_trait]
pub trait Link: Send {
    async fn send(&mut self, text: &str) -> Result<(), ChannelError>;

    /// Next text payload, or `None` once the peer has closed.
    async fn recv(&mut self) -> Option<Result<String, ChannelError>>;

    async fn close(&mut self);
}

/// Opens [`Link`]s to the fixed endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Link>, ChannelError>;
}

pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Link>, ChannelError> {
        let (ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        Ok(Box::new(WsLink { ws }))
    }
}

struct WsLink {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Link for WsLink {
    async fn send(&mut self, text: &str) -> Result<(), ChannelError> {
        self.ws
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ChannelError>> {
        loop {
            match self.ws.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(Ok(String::from_utf8_lossy(&bytes).into_owned()))
                }
                Ok(Message::Close(_)) => return None,
                // Pings are answered by tungstenite itself.
                Ok(_) => continue,
                Err(e) => return Some(Err(ChannelError::Lost(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(2),
        }
    }
}

impl From<&Config> for RetryPolicy {
    fn from(config: &Config) -> Self {
        Self {
            max_attempts: config.max_reconnect_attempts,
            delay: config.reconnect_delay(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    State(ChannelState),
    Message(InboundMessage),
}

/// What the command dispatcher needs from a channel.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    fn state(&self) -> ChannelState;

    /// Ask the channel to start connecting. No-op unless it is idle.
    fn open(&self);

    /// Fails with [`ChannelError::NotConnected`] unless the channel is open.
    async fn send(&self, command: &str) -> Result<(), ChannelError>;
}

enum Request {
    Open,
    Close,
    Send {
        text: String,
        reply: oneshot::Sender<Result<(), ChannelError>>,
    },
}

/// Handle to the channel driver. Dropping every handle stops the driver.
#[derive(Clone)]
pub struct TransportChannel {
    requests: mpsc::UnboundedSender<Request>,
    state: watch::Receiver<ChannelState>,
    budget: watch::Receiver<u32>,
}

impl TransportChannel {
    /// Spawn the driver. The channel starts [`ChannelState::Disconnected`];
    /// call [`open`](Self::open) to connect.
    pub fn spawn(
        connector: Arc<dyn Connector>,
        policy: RetryPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (requests, requests_rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ChannelState::Disconnected);
        let (budget_tx, budget) = watch::channel(0);

        let driver = Driver {
            connector,
            policy,
            state: ChannelState::Disconnected,
            budget: RetryBudget::new(policy.max_attempts),
            link: None,
            connecting: None,
            reconnect_at: None,
            events,
            state_tx,
            budget_tx,
        };
        tokio::spawn(driver.run(requests_rx));

        (
            Self {
                requests,
                state,
                budget,
            },
            events_rx,
        )
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Reconnect attempts spent since the channel was last open.
    pub fn retry_budget(&self) -> u32 {
        *self.budget.borrow()
    }

    pub fn open(&self) {
        let _ = self.requests.send(Request::Open);
    }

    /// Drop the connection, cancel any pending reconnect and go
    /// [`ChannelState::Disconnected`].
    pub fn close(&self) {
        let _ = self.requests.send(Request::Close);
    }

    pub async fn send(&self, text: &str) -> Result<(), ChannelError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::Send {
                text: text.to_string(),
                reply,
            })
            .map_err(|_| ChannelError::Closed)?;
        rx.await.map_err(|_| ChannelError::Closed)?
    }
}

#[async_trait]
impl CommandChannel for TransportChannel {
    fn state(&self) -> ChannelState {
        TransportChannel::state(self)
    }

    fn open(&self) {
        TransportChannel::open(self)
    }

    async fn send(&self, command: &str) -> Result<(), ChannelError> {
        TransportChannel::send(self, command).await
    }
}

type ConnectFuture = BoxFuture<'static, Result<Box<dyn Link>, ChannelError>>;

struct Driver {
    connector: Arc<dyn Connector>,
    policy: RetryPolicy,
    state: ChannelState,
    budget: RetryBudget,
    link: Option<Box<dyn Link>>,
    connecting: Option<ConnectFuture>,
    reconnect_at: Option<Instant>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    state_tx: watch::Sender<ChannelState>,
    budget_tx: watch::Sender<u32>,
}

impl Driver {
    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<Request>) {
        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    None => break,
                },
                result = pending_connect(&mut self.connecting), if self.connecting.is_some() => {
                    self.connecting = None;
                    self.on_connect_result(result);
                }
                frame = next_frame(&mut self.link), if self.link.is_some() => {
                    self.on_frame(frame);
                }
                () = sleep_until(self.reconnect_at.unwrap_or_else(Instant::now)), if self.reconnect_at.is_some() => {
                    self.reconnect_at = None;
                    info!(attempt = self.budget.used(), "reconnecting");
                    self.start_connect();
                }
            }
        }

        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
        debug!("channel driver stopped");
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::Open => {
                if self.state.accepts_open() {
                    self.start_connect();
                } else {
                    debug!(state = self.state.as_str(), "open ignored");
                }
            }
            Request::Close => {
                self.connecting = None;
                self.reconnect_at = None;
                if let Some(mut link) = self.link.take() {
                    link.close().await;
                }
                self.set_state(ChannelState::Disconnected);
            }
            Request::Send { text, reply } => {
                let link = match (self.state, self.link.as_mut()) {
                    (ChannelState::Open, Some(link)) => link,
                    _ => {
                        let _ = reply.send(Err(ChannelError::NotConnected));
                        return;
                    }
                };
                let result = link.send(&text).await;
                match result {
                    Ok(()) => {
                        debug!(len = text.len(), "command sent");
                        let _ = reply.send(Ok(()));
                    }
                    Err(e) => {
                        warn!(error = %e, "send failed");
                        let _ = reply.send(Err(e));
                        self.on_transport_failure();
                    }
                }
            }
        }
    }

    fn start_connect(&mut self) {
        self.set_state(ChannelState::Connecting);
        let connector = Arc::clone(&self.connector);
        self.connecting = Some(Box::pin(async move { connector.connect().await }));
    }

    fn on_connect_result(&mut self, result: Result<Box<dyn Link>, ChannelError>) {
        match result {
            Ok(link) => {
                self.link = Some(link);
                self.budget.reset();
                self.budget_tx.send_replace(0);
                info!("channel open");
                self.set_state(ChannelState::Open);
            }
            Err(e) => {
                warn!(error = %e, "connect failed");
                self.on_transport_failure();
            }
        }
    }

    fn on_frame(&mut self, frame: Option<Result<String, ChannelError>>) {
        match frame {
            Some(Ok(text)) => {
                let _ = self.events.send(ChannelEvent::Message(parse_inbound(&text)));
            }
            Some(Err(e)) => {
                warn!(error = %e, "channel error");
                self.on_transport_failure();
            }
            None => {
                warn!("channel closed by peer");
                self.on_transport_failure();
            }
        }
    }

    fn on_transport_failure(&mut self) {
        self.link = None;
        self.set_state(ChannelState::Reconnecting);

        if self.budget.try_spend() {
            self.budget_tx.send_replace(self.budget.used());
            self.reconnect_at = Some(Instant::now() + self.policy.delay);
            info!(
                attempt = self.budget.used(),
                max = self.budget.max(),
                delay_ms = self.policy.delay.as_millis() as u64,
                "reconnect scheduled"
            );
        } else {
            warn!(max = self.budget.max(), "reconnect budget exhausted");
            self.set_state(ChannelState::Failed);
        }
    }

    fn set_state(&mut self, next: ChannelState) {
        if self.state == next {
            return;
        }
        debug!(from = self.state.as_str(), to = next.as_str(), "channel state");
        self.state = next;
        self.state_tx.send_replace(next);
        let _ = self.events.send(ChannelEvent::State(next));
    }
}

async fn pending_connect(slot: &mut Option<ConnectFuture>) -> Result<Box<dyn Link>, ChannelError> {
    match slot {
        Some(connect) => connect.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(link: &mut Option<Box<dyn Link>>) -> Option<Result<String, ChannelError>> {
    match link {
        Some(link) => link.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// In-memory link. Dropping its [`LinkController`] closes it.
    pub struct FakeLink {
        incoming: mpsc::UnboundedReceiver<String>,
        sent: Arc<Mutex<Vec<String>>>,
        fail_sends: bool,
    }

    pub struct LinkController {
        pub incoming: mpsc::UnboundedSender<String>,
        pub sent: Arc<Mutex<Vec<String>>>,
    }

    pub fn fake_link() -> (FakeLink, LinkController) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        (
            FakeLink {
                incoming: rx,
                sent: Arc::clone(&sent),
                fail_sends: false,
            },
            LinkController { incoming: tx, sent },
        )
    }

    pub fn broken_link() -> (FakeLink, LinkController) {
        let (mut link, controller) = fake_link();
        link.fail_sends = true;
        (link, controller)
    }

    #[async_trait]
    impl Link for FakeLink {
        async fn send(&mut self, text: &str) -> Result<(), ChannelError> {
            if self.fail_sends {
                return Err(ChannelError::Send("broken pipe".to_string()));
            }
            self.sent.lock().push(text.to_string());
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String, ChannelError>> {
            self.incoming.recv().await.map(Ok)
        }

        async fn close(&mut self) {
            self.incoming.close();
        }
    }

    /// Hands out scripted connection results; refuses once the script runs out.
    #[derive(Default)]
    pub struct FakeConnector {
        script: Mutex<VecDeque<Result<FakeLink, ChannelError>>>,
        attempts: AtomicU32,
    }

    impl FakeConnector {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn push_ok(&self, link: FakeLink) {
            self.script.lock().push_back(Ok(link));
        }

        pub fn push_refused(&self, count: usize) {
            let mut script = self.script.lock();
            for _ in 0..count {
                script.push_back(Err(ChannelError::Connect("connection refused".to_string())));
            }
        }

        pub fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self) -> Result<Box<dyn Link>, ChannelError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().pop_front();
            match next {
                Some(Ok(link)) => Ok(Box::new(link)),
                Some(Err(e)) => Err(e),
                None => Err(ChannelError::Connect("connection refused".to_string())),
            }
        }
    }

    pub async fn next_state(events: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> ChannelState {
        loop {
            match events.recv().await {
                Some(ChannelEvent::State(state)) => return state,
                Some(ChannelEvent::Message(_)) => continue,
                None => panic!("channel driver stopped"),
            }
        }
    }

    pub async fn wait_for(
        events: &mut mpsc::UnboundedReceiver<ChannelEvent>,
        target: ChannelState,
    ) -> Vec<ChannelState> {
        let mut seen = Vec::new();
        loop {
            let state = next_state(events).await;
            seen.push(state);
            if state == target {
                return seen;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use ChannelState::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_reaches_open_and_resets_budget() {
        let connector = FakeConnector::new();
        let (link, _ctl) = fake_link();
        connector.push_ok(link);

        let (channel, mut events) = TransportChannel::spawn(connector.clone(), policy());
        assert_eq!(channel.state(), Disconnected);
        channel.open();

        assert_eq!(wait_for(&mut events, Open).await, vec![Connecting, Open]);
        assert_eq!(channel.state(), Open);
        assert_eq!(channel.retry_budget(), 0);
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_reaches_failed_without_sixth_retry() {
        let connector = FakeConnector::new();
        connector.push_refused(6);

        let (channel, mut events) = TransportChannel::spawn(connector.clone(), policy());
        channel.open();

        let seen = wait_for(&mut events, Failed).await;
        let mut expected = vec![Connecting, Reconnecting];
        for _ in 0..5 {
            expected.extend([Connecting, Reconnecting]);
        }
        expected.push(Failed);
        assert_eq!(seen, expected);
        assert_eq!(connector.attempts(), 6);
        assert_eq!(channel.retry_budget(), 5);

        // Nothing left scheduled.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts(), 6);
        assert_eq!(channel.state(), Failed);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_uses_constant_delay() {
        let connector = FakeConnector::new();
        connector.push_refused(3);
        let (link, _ctl) = fake_link();
        connector.push_ok(link);

        let (channel, mut events) = TransportChannel::spawn(connector.clone(), policy());
        let started = Instant::now();
        channel.open();

        wait_for(&mut events, Open).await;
        // Three scheduled reconnects at 2s each, not 2 + 4 + 8.
        assert_eq!(started.elapsed(), Duration::from_secs(6));
        assert_eq!(channel.retry_budget(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_retry_from_budget_four() {
        let connector = FakeConnector::new();
        connector.push_refused(5);

        let (channel, mut events) = TransportChannel::spawn(connector.clone(), policy());
        channel.open();

        // Initial attempt plus four reconnects have failed.
        for _ in 0..5 {
            wait_for(&mut events, Reconnecting).await;
        }
        assert_eq!(channel.retry_budget(), 5);
        assert_eq!(connector.attempts(), 5);

        // The fifth reconnect is still pending; it fails too.
        assert_eq!(wait_for(&mut events, Failed).await, vec![Connecting, Reconnecting, Failed]);
        assert_eq!(connector.attempts(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_close_reconnects_and_resets_budget() {
        let connector = FakeConnector::new();
        let (first, first_ctl) = fake_link();
        let (second, _second_ctl) = fake_link();
        connector.push_ok(first);
        connector.push_refused(2);
        connector.push_ok(second);

        let (channel, mut events) = TransportChannel::spawn(connector.clone(), policy());
        channel.open();
        wait_for(&mut events, Open).await;

        drop(first_ctl);
        let seen = wait_for(&mut events, Open).await;
        assert_eq!(
            seen,
            vec![Reconnecting, Connecting, Reconnecting, Connecting, Reconnecting, Connecting, Open]
        );
        assert_eq!(channel.retry_budget(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_requires_open() {
        let connector = FakeConnector::new();
        let (channel, _events) = TransportChannel::spawn(connector, policy());
        assert_eq!(channel.send("hello").await, Err(ChannelError::NotConnected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_and_receive_in_order() {
        let connector = FakeConnector::new();
        let (link, ctl) = fake_link();
        connector.push_ok(link);

        let (channel, mut events) = TransportChannel::spawn(connector, policy());
        channel.open();
        wait_for(&mut events, Open).await;

        channel.send("hello").await.unwrap();
        assert_eq!(ctl.sent.lock().clone(), vec!["hello".to_string()]);

        ctl.incoming.send(r#"{"command":"hello","response":"hi"}"#.to_string()).unwrap();
        ctl.incoming.send("not json".to_string()).unwrap();

        assert_eq!(
            events.recv().await,
            Some(ChannelEvent::Message(InboundMessage::CommandResult {
                command: "hello".to_string(),
                response: "hi".to_string(),
            }))
        );
        assert_eq!(
            events.recv().await,
            Some(ChannelEvent::Message(InboundMessage::PlainText("not json".to_string())))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_drives_reconnect() {
        let connector = FakeConnector::new();
        let (link, _ctl) = broken_link();
        connector.push_ok(link);

        let (channel, mut events) = TransportChannel::spawn(connector, policy());
        channel.open();
        wait_for(&mut events, Open).await;

        assert!(matches!(channel.send("hello").await, Err(ChannelError::Send(_))));
        assert_eq!(next_state(&mut events).await, Reconnecting);
        assert_eq!(channel.retry_budget(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_open_after_failed() {
        let connector = FakeConnector::new();
        let policy = RetryPolicy {
            max_attempts: 1,
            delay: Duration::from_secs(2),
        };
        connector.push_refused(2);
        let (link, _ctl) = fake_link();
        connector.push_ok(link);

        let (channel, mut events) = TransportChannel::spawn(connector.clone(), policy);
        channel.open();
        wait_for(&mut events, Failed).await;
        assert_eq!(connector.attempts(), 2);

        channel.open();
        assert_eq!(wait_for(&mut events, Open).await, vec![Connecting, Open]);
        assert_eq!(connector.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_ignored_while_connecting_or_open() {
        let connector = FakeConnector::new();
        let (link, _ctl) = fake_link();
        connector.push_ok(link);

        let (channel, mut events) = TransportChannel::spawn(connector.clone(), policy());
        channel.open();
        channel.open();
        wait_for(&mut events, Open).await;
        channel.open();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(connector.attempts(), 1);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_reconnect() {
        let connector = FakeConnector::new();
        connector.push_refused(1);

        let (channel, mut events) = TransportChannel::spawn(connector.clone(), policy());
        channel.open();
        wait_for(&mut events, Reconnecting).await;

        channel.close();
        assert_eq!(next_state(&mut events).await, Disconnected);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.attempts(), 1);
    }
}
