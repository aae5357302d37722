//! Command dispatch.
//!
//! The dispatcher is the only writer to the command channel. It validates
//! typed commands, runs one voice capture at a time, and turns channel events
//! into render instructions for the primary output line.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::backend::{CalibrationOutcome, RequestResult, VoiceBackend, VoiceOutcome};
use crate::channel::{ChannelEvent, CommandChannel};
use crate::error::{SubmitError, VoiceError};
use crate::message::{InboundMessage, SYSTEM_GREETING};
use crate::render::{RenderInstruction, RenderSink, Tone};
use crate::state::ChannelState;

pub const USER_PREFIX: &str = "You: ";
pub const ASSISTANT_PREFIX: &str = "🤖 VEDA: ";
pub const PROCESSING: &str = "⏳ Processing...";

/// Completion of a one-shot voice request, fed back through
/// [`CommandDispatcher::on_voice_completion`].
#[derive(Debug)]
pub enum VoiceCompletion {
    Capture(RequestResult<VoiceOutcome>),
    Calibration(RequestResult<CalibrationOutcome>),
}

pub struct CommandDispatcher {
    channel: Arc<dyn CommandChannel>,
    voice: Arc<dyn VoiceBackend>,
    sink: Arc<dyn RenderSink>,
    completions: mpsc::UnboundedSender<VoiceCompletion>,
    listening: bool,
    max_command_chars: usize,
}

impl CommandDispatcher {
    pub fn new(
        channel: Arc<dyn CommandChannel>,
        voice: Arc<dyn VoiceBackend>,
        sink: Arc<dyn RenderSink>,
        max_command_chars: usize,
    ) -> (Self, mpsc::UnboundedReceiver<VoiceCompletion>) {
        let (completions, completions_rx) = mpsc::unbounded_channel();
        (
            Self {
                channel,
                voice,
                sink,
                completions,
                listening: false,
                max_command_chars,
            },
            completions_rx,
        )
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    fn render(&self, tone: Tone, text: impl Into<String>) {
        self.sink.render(RenderInstruction::primary(tone, text));
    }

    /// Validate and send a typed command.
    ///
    /// Nothing is queued: if the channel is not open the command is dropped
    /// after asking the channel to reconnect, and the user has to resubmit.
    pub async fn submit_text(&self, raw: &str) -> Result<(), SubmitError> {
        let command = raw.trim();

        if command.is_empty() {
            self.render(Tone::Warning, "⚠️ Please enter a command");
            return Err(SubmitError::Empty);
        }

        let len = command.chars().count();
        if len > self.max_command_chars {
            debug!(len, max = self.max_command_chars, "command rejected");
            self.render(
                Tone::Warning,
                format!("⚠️ Command too long (max {} characters)", self.max_command_chars),
            );
            return Err(SubmitError::TooLong {
                len,
                max: self.max_command_chars,
            });
        }

        if self.channel.state() != ChannelState::Open {
            self.render(Tone::Error, "❌ Not connected. Reconnecting...");
            self.channel.open();
            return Err(SubmitError::NotConnected);
        }

        self.render(Tone::Info, PROCESSING);

        if let Err(e) = self.channel.send(command).await {
            warn!(error = %e, "command not sent");
            self.render(Tone::Error, "❌ Failed to send command. Please try again.");
            return Err(SubmitError::Send(e));
        }
        Ok(())
    }

    /// Start one voice capture. Refused while another is outstanding.
    pub fn submit_voice(&mut self) -> Result<(), VoiceError> {
        if self.listening {
            self.render(Tone::Warning, "⚠️ Already listening...");
            return Err(VoiceError::AlreadyListening);
        }

        self.listening = true;
        self.render(Tone::Info, "🎤 Listening... Speak now!");
        info!("voice capture started");

        let voice = Arc::clone(&self.voice);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = voice.capture().await;
            let _ = completions.send(VoiceCompletion::Capture(result));
        });
        Ok(())
    }

    pub fn calibrate(&self) {
        self.render(
            Tone::Warning,
            "🎯 Starting voice calibration...\n\n\
             Please remain SILENT for 3 seconds.\n\
             This helps VEDA understand your environment.",
        );

        let voice = Arc::clone(&self.voice);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = voice.calibrate().await;
            let _ = completions.send(VoiceCompletion::Calibration(result));
        });
    }

    pub fn on_voice_completion(&mut self, completion: VoiceCompletion) {
        match completion {
            VoiceCompletion::Capture(result) => {
                self.listening = false;
                match result {
                    Ok(VoiceOutcome::Recognized { command, response }) => {
                        info!(%command, "voice command recognised");
                        self.render(Tone::Assistant, exchange_text(&command, &response));
                    }
                    Ok(VoiceOutcome::NoSpeech) => {
                        self.render(
                            Tone::Warning,
                            "⚠️ No speech detected. Please try again and speak clearly.",
                        );
                    }
                    Ok(VoiceOutcome::NoResponse) => {
                        self.render(Tone::Warning, "⚠️ No response received");
                    }
                    Ok(VoiceOutcome::Failed(error)) => {
                        warn!(%error, "voice capture failed");
                        self.render(Tone::Error, format!("❌ {}", error));
                    }
                    Err(e) => {
                        warn!(error = %e, "voice request failed");
                        self.render(
                            Tone::Error,
                            "❌ Connection Error\n\nPlease ensure the VEDA AI server is running.",
                        );
                    }
                }
            }
            VoiceCompletion::Calibration(result) => match result {
                Ok(CalibrationOutcome::Calibrated(message)) => self.render(
                    Tone::Success,
                    format!(
                        "✅ Calibration Successful!\n\n{}\n\nTry speaking a command now!",
                        message
                    ),
                ),
                Ok(CalibrationOutcome::Failed(message)) => {
                    self.render(Tone::Error, format!("❌ Calibration Failed\n\n{}", message))
                }
                Err(e) => {
                    warn!(error = %e, "calibration request failed");
                    self.render(
                        Tone::Error,
                        "❌ Calibration Error\n\nCould not calibrate microphone.\n\
                         Please ensure the VEDA AI server is running.",
                    );
                }
            },
        }
    }

    pub fn on_channel_event(&self, event: &ChannelEvent) {
        let instruction = match event {
            ChannelEvent::State(state) => render_state(*state),
            ChannelEvent::Message(message) => Some(render_inbound(message)),
        };
        if let Some(instruction) = instruction {
            self.sink.render(instruction);
        }
    }
}

fn exchange_text(command: &str, response: &str) -> String {
    format!("{}{}\n\n{}{}", USER_PREFIX, command, ASSISTANT_PREFIX, response)
}

/// Primary-line text for a channel transition.
pub fn render_state(state: ChannelState) -> Option<RenderInstruction> {
    let (tone, text) = match state {
        ChannelState::Disconnected => return None,
        ChannelState::Connecting => (Tone::Info, "🔌 Connecting to VEDA..."),
        ChannelState::Open => (Tone::Success, "✅ Connected to VEDA"),
        ChannelState::Reconnecting => (Tone::Warning, "⚠️ Disconnected. Reconnecting..."),
        ChannelState::Failed => (
            Tone::Error,
            "❌ Connection lost. Please refresh (press r) or restart the VEDA AI server.",
        ),
    };
    Some(RenderInstruction::primary(tone, text))
}

/// Primary-line text for an inbound message. This is the one place that
/// decides whether the user's command is echoed back.
pub fn render_inbound(message: &InboundMessage) -> RenderInstruction {
    match message {
        InboundMessage::Greeting(text) => RenderInstruction::primary(
            Tone::Assistant,
            format!("{}{}\n\n✅ Ready for commands!", ASSISTANT_PREFIX, text),
        ),
        InboundMessage::CommandResult { command, response } if command == SYSTEM_GREETING => {
            RenderInstruction::primary(Tone::Assistant, format!("{}{}", ASSISTANT_PREFIX, response))
        }
        InboundMessage::CommandResult { command, response } => {
            RenderInstruction::primary(Tone::Assistant, exchange_text(command, response))
        }
        InboundMessage::PlainText(text) => RenderInstruction::primary(Tone::Assistant, text.clone()),
        InboundMessage::ErrorMessage(text) => {
            RenderInstruction::primary(Tone::Error, format!("❌ Error: {}", text))
        }
    }
}
