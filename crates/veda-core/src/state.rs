//! UI-agnostic session state types
//!
//! These are owned by the component that mutates them; everything else only
//! ever sees copies.

use serde::{Deserialize, Serialize};

/// Lifecycle of the persistent command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Reconnecting,
    Failed,
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "open",
            ChannelState::Reconnecting => "reconnecting",
            ChannelState::Failed => "failed",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ChannelState::Disconnected => "Offline",
            ChannelState::Connecting => "Connecting",
            ChannelState::Open => "Online",
            ChannelState::Reconnecting => "Reconnecting",
            ChannelState::Failed => "Connection lost",
        }
    }

    /// States from which a manual `open()` starts a new attempt.
    pub fn accepts_open(&self) -> bool {
        matches!(self, ChannelState::Disconnected | ChannelState::Failed)
    }
}

/// Count of reconnect attempts since the channel was last open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    used: u32,
    max: u32,
}

impl RetryBudget {
    pub fn new(max: u32) -> Self {
        Self { used: 0, max }
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn reset(&mut self) {
        self.used = 0;
    }

    /// Spends one attempt. Returns `false` once the budget is exhausted.
    pub fn try_spend(&mut self) -> bool {
        if self.used < self.max {
            self.used += 1;
            true
        } else {
            false
        }
    }
}
