//! One client session: a channel, a dispatcher, a poller and the surface they
//! all render into.
//!
//! The session is driven from a single loop. Channel events and voice
//! completions come out of [`Session::next_event`] and go back in through
//! [`Session::handle`], so the dispatcher's state is only ever mutated from
//! that loop.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::backend::{AutomationBackend, BackendClient, VoiceBackend};
use crate::channel::{ChannelEvent, Connector, RetryPolicy, TransportChannel, WsConnector};
use crate::config::Config;
use crate::dispatcher::{CommandDispatcher, VoiceCompletion};
use crate::error::{SubmitError, VoiceError};
use crate::poller::{spawn_suggestion_timer, AutomationPoller, PollRequest};
use crate::render::SurfaceHandle;
use crate::state::ChannelState;

#[derive(Debug)]
pub enum SessionEvent {
    Channel(ChannelEvent),
    Voice(VoiceCompletion),
}

pub struct Session {
    channel: TransportChannel,
    dispatcher: CommandDispatcher,
    poller: AutomationPoller,
    surface: SurfaceHandle,
    channel_events: mpsc::UnboundedReceiver<ChannelEvent>,
    voice_events: mpsc::UnboundedReceiver<VoiceCompletion>,
    suggestions_visible: watch::Sender<bool>,
    timer: JoinHandle<()>,
}

impl Session {
    /// Build a session against the configured backend. Must be called from
    /// within a tokio runtime.
    pub fn new(config: &Config) -> Self {
        let backend = Arc::new(BackendClient::new(&config.server_url));
        let connector = Arc::new(WsConnector::new(&config.channel_url()));
        info!(server = %config.server_url, channel = %config.channel_url(), "session configured");
        Self::with_parts(config, connector, backend.clone(), backend)
    }

    pub fn with_parts(
        config: &Config,
        connector: Arc<dyn Connector>,
        voice: Arc<dyn VoiceBackend>,
        automation: Arc<dyn AutomationBackend>,
    ) -> Self {
        let surface = SurfaceHandle::new();
        let sink = Arc::new(surface.clone());

        let (channel, channel_events) = TransportChannel::spawn(connector, RetryPolicy::from(config));
        let (dispatcher, voice_events) = CommandDispatcher::new(
            Arc::new(channel.clone()),
            voice,
            sink.clone(),
            config.max_command_chars,
        );
        let poller = AutomationPoller::new(automation, sink);

        let (suggestions_visible, visible_rx) = watch::channel(false);
        let timer = spawn_suggestion_timer(poller.clone(), config.suggestions_refresh(), visible_rx);

        Self {
            channel,
            dispatcher,
            poller,
            surface,
            channel_events,
            voice_events,
            suggestions_visible,
            timer,
        }
    }

    /// Open the channel.
    pub fn start(&self) {
        self.channel.open();
    }

    /// Manual restart, e.g. after the channel has given up.
    pub fn reconnect(&self) {
        self.channel.open();
    }

    pub fn shutdown(&self) {
        self.channel.close();
        self.timer.abort();
    }

    pub fn surface(&self) -> &SurfaceHandle {
        &self.surface
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn retry_budget(&self) -> u32 {
        self.channel.retry_budget()
    }

    pub fn is_listening(&self) -> bool {
        self.dispatcher.is_listening()
    }

    /// Next event to feed into [`handle`](Self::handle). Cancel-safe.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        tokio::select! {
            Some(event) = self.channel_events.recv() => Some(SessionEvent::Channel(event)),
            Some(completion) = self.voice_events.recv() => Some(SessionEvent::Voice(completion)),
            else => None,
        }
    }

    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Channel(event) => self.dispatcher.on_channel_event(&event),
            SessionEvent::Voice(completion) => self.dispatcher.on_voice_completion(completion),
        }
    }

    pub async fn submit_text(&self, raw: &str) -> Result<(), SubmitError> {
        self.dispatcher.submit_text(raw).await
    }

    pub fn submit_voice(&mut self) -> Result<(), VoiceError> {
        self.dispatcher.submit_voice()
    }

    pub fn calibrate(&self) {
        self.dispatcher.calibrate();
    }

    pub fn poll(&self, request: PollRequest) -> JoinHandle<()> {
        self.poller.spawn(request)
    }

    /// Showing the suggestions panel fetches once right away and arms the
    /// periodic refresh; hiding it disarms the refresh.
    pub fn set_suggestions_visible(&self, visible: bool) {
        let was_visible = self.suggestions_visible.send_replace(visible);
        if visible && !was_visible {
            self.poller.spawn(PollRequest::Suggestions);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::VoiceOutcome;
    use crate::channel::testing::{fake_link, FakeConnector};
    use crate::dispatcher::testing::{FakeVoice, Scripted};
    use crate::poller::testing::FakeAutomation;
    use crate::render::Tone;

    async fn pump_until(session: &mut Session, target: ChannelState) {
        while session.channel_state() != target {
            let event = session.next_event().await.expect("session events ended");
            session.handle(event);
        }
    }

    async fn pump_one(session: &mut Session) {
        let event = session.next_event().await.expect("session events ended");
        session.handle(event);
    }

    #[tokio::test(start_paused = true)]
    async fn test_greeting_then_command_round_trip() {
        let connector = FakeConnector::new();
        let (link, ctl) = fake_link();
        connector.push_ok(link);

        let mut session = Session::with_parts(
            &Config::new(),
            connector,
            FakeVoice::new(Scripted::Outcome(VoiceOutcome::NoSpeech)),
            Arc::new(FakeAutomation::default()),
        );
        session.start();
        pump_until(&mut session, ChannelState::Open).await;
        // Drain the Open transition itself.
        while session.surface().snapshot().primary.tone != Tone::Success {
            pump_one(&mut session).await;
        }

        ctl.incoming
            .send(r#"{"response":"Good evening","command":"system_greeting","type":"greeting"}"#.to_string())
            .unwrap();
        pump_one(&mut session).await;
        let primary = session.surface().snapshot().primary;
        assert_eq!(primary.text, "🤖 VEDA: Good evening\n\n✅ Ready for commands!");

        session.submit_text("hello").await.unwrap();
        assert_eq!(session.surface().snapshot().primary.text, "⏳ Processing...");
        assert_eq!(ctl.sent.lock().clone(), vec!["hello".to_string()]);

        ctl.incoming
            .send(r#"{"response":"hi","command":"hello"}"#.to_string())
            .unwrap();
        pump_one(&mut session).await;
        assert_eq!(
            session.surface().snapshot().primary.text,
            "You: hello\n\n🤖 VEDA: hi"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_channel_shows_refresh_message() {
        let connector = FakeConnector::new();
        let mut session = Session::with_parts(
            &Config::new(),
            connector.clone(),
            FakeVoice::new(Scripted::Outcome(VoiceOutcome::NoSpeech)),
            Arc::new(FakeAutomation::default()),
        );
        session.start();
        pump_until(&mut session, ChannelState::Failed).await;
        while !session.surface().snapshot().primary.text.contains("refresh") {
            pump_one(&mut session).await;
        }
        assert_eq!(connector.attempts(), 6);
        assert_eq!(session.retry_budget(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_showing_suggestions_fetches_once() {
        let automation = Arc::new(FakeAutomation::default());
        let session = Session::with_parts(
            &Config::new(),
            FakeConnector::new(),
            FakeVoice::new(Scripted::Outcome(VoiceOutcome::NoSpeech)),
            automation.clone(),
        );

        session.set_suggestions_visible(true);
        session.set_suggestions_visible(true);
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        assert_eq!(automation.count("suggestions"), 1);

        session.set_suggestions_visible(false);
        tokio::time::sleep(std::time::Duration::from_secs(1200)).await;
        assert_eq!(automation.count("suggestions"), 1);
    }
}
