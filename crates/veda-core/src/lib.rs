pub mod automation;
pub mod backend;
pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod poller;
pub mod render;
pub mod session;
pub mod state;

// Re-export main types for convenience
pub use automation::{ContextSnapshot, NewTask, ScheduleType, ScheduledTask, Shortcut, Suggestion};
pub use backend::{BackendClient, HealthStatus, VoiceOutcome};
pub use channel::{ChannelEvent, TransportChannel};
pub use config::Config;
pub use error::{ChannelError, RequestError, SubmitError, VoiceError};
pub use message::InboundMessage;
pub use poller::PollRequest;
pub use render::{OutputLine, OutputSurface, Panel, SurfaceHandle, Tone};
pub use session::{Session, SessionEvent};
pub use state::ChannelState;
