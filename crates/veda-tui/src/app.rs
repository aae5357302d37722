use ratatui::widgets::ListState;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use veda_core::backend::RequestResult;
use veda_core::{
    BackendClient, ChannelState, HealthStatus, OutputSurface, Panel, ScheduledTask, Session,
    Suggestion,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// What the input line is collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputTarget {
    Command,
    NewTask,
    Shortcut,
}

impl InputTarget {
    pub fn title(&self) -> &'static str {
        match self {
            InputTarget::Command => " Command ",
            InputTarget::NewTask => " New task: name | command | schedule_type | schedule_value ",
            InputTarget::Shortcut => " New shortcut: name | command ",
        }
    }
}

/// Convert a character index to a byte index for UTF-8 safe string operations
pub fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub input_target: InputTarget,
    pub input: String,
    pub input_cursor: usize, // in chars

    // Side panel
    pub panel: Option<Panel>,
    pub suggestion_state: ListState,
    pub task_state: ListState,

    // Mirrored from the session on every loop turn
    pub surface: OutputSurface,
    pub synced_revision: Option<u64>,
    pub channel_state: ChannelState,
    pub listening: bool,

    // Backend identity for the header
    pub server_url: String,
    pub health: Option<HealthStatus>,
    pub health_task: Option<JoinHandle<RequestResult<HealthStatus>>>,

    pub animation_frame: u8,
}

impl App {
    pub fn new(server_url: &str) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            input_target: InputTarget::Command,
            input: String::new(),
            input_cursor: 0,

            panel: None,
            suggestion_state: ListState::default(),
            task_state: ListState::default(),

            surface: OutputSurface::default(),
            synced_revision: None,
            channel_state: ChannelState::Disconnected,
            listening: false,

            server_url: server_url.to_string(),
            health: None,
            health_task: None,

            animation_frame: 0,
        }
    }

    /// Fire the health request in the background; the result is picked up on a tick.
    pub fn start_health_check(&mut self) {
        let client = BackendClient::new(&self.server_url);
        self.health_task = Some(tokio::spawn(async move { client.health().await }));
    }

    pub async fn collect_health(&mut self) {
        let finished = self.health_task.as_ref().is_some_and(|task| task.is_finished());
        if !finished {
            return;
        }
        let Some(task) = self.health_task.take() else {
            return;
        };
        match task.await {
            Ok(Ok(health)) => {
                info!(service = %health.service, version = %health.version, "backend healthy");
                self.health = Some(health);
            }
            Ok(Err(e)) => warn!(error = %e, "health check failed"),
            Err(e) => warn!(error = %e, "health check task failed"),
        }
    }

    pub fn sync(&mut self, session: &Session) {
        self.channel_state = session.channel_state();
        self.listening = session.is_listening();

        let revision = session.surface().revision();
        if self.synced_revision != Some(revision) {
            self.surface = session.surface().snapshot();
            self.synced_revision = Some(revision);
            clamp_selection(&mut self.suggestion_state, self.surface.suggestions.len());
            clamp_selection(&mut self.task_state, self.surface.tasks.len());
        }
    }

    pub fn is_busy(&self) -> bool {
        self.listening
            || matches!(
                self.channel_state,
                ChannelState::Connecting | ChannelState::Reconnecting
            )
    }

    pub fn tick_animation(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Input line

    pub fn start_editing(&mut self, target: InputTarget) {
        if self.input_target != target {
            self.input.clear();
            self.input_cursor = 0;
        }
        self.input_target = target;
        self.input_mode = InputMode::Editing;
    }

    pub fn stop_editing(&mut self) {
        self.input_mode = InputMode::Normal;
        self.input_target = InputTarget::Command;
        self.clear_input();
    }

    pub fn clear_input(&mut self) {
        self.input.clear();
        self.input_cursor = 0;
    }

    pub fn insert_char(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.input, self.input_cursor);
        self.input.insert(byte_pos, c);
        self.input_cursor += 1;
    }

    pub fn delete_char_before(&mut self) {
        if self.input_cursor > 0 {
            self.input_cursor -= 1;
            let byte_pos = char_to_byte_index(&self.input, self.input_cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn delete_char_at(&mut self) {
        if self.input_cursor < self.input.chars().count() {
            let byte_pos = char_to_byte_index(&self.input, self.input_cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn cursor_left(&mut self) {
        self.input_cursor = self.input_cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        self.input_cursor = (self.input_cursor + 1).min(self.input.chars().count());
    }

    pub fn cursor_home(&mut self) {
        self.input_cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.input_cursor = self.input.chars().count();
    }

    // Side panel

    pub fn panel_nav_down(&mut self) {
        match self.panel {
            Some(Panel::Suggestions) => {
                select_next(&mut self.suggestion_state, self.surface.suggestions.len())
            }
            Some(Panel::Tasks) => select_next(&mut self.task_state, self.surface.tasks.len()),
            _ => {}
        }
    }

    pub fn panel_nav_up(&mut self) {
        match self.panel {
            Some(Panel::Suggestions) => {
                select_prev(&mut self.suggestion_state, self.surface.suggestions.len())
            }
            Some(Panel::Tasks) => select_prev(&mut self.task_state, self.surface.tasks.len()),
            _ => {}
        }
    }

    pub fn selected_suggestion(&self) -> Option<&Suggestion> {
        self.suggestion_state
            .selected()
            .and_then(|i| self.surface.suggestions.get(i))
    }

    pub fn selected_task(&self) -> Option<&ScheduledTask> {
        self.task_state.selected().and_then(|i| self.surface.tasks.get(i))
    }
}

fn clamp_selection(state: &mut ListState, len: usize) {
    match state.selected() {
        _ if len == 0 => state.select(None),
        None => state.select(Some(0)),
        Some(i) if i >= len => state.select(Some(len - 1)),
        Some(_) => {}
    }
}

fn select_next(state: &mut ListState, len: usize) {
    if len == 0 {
        return;
    }
    let i = state.selected().map_or(0, |i| (i + 1).min(len - 1));
    state.select(Some(i));
}

fn select_prev(state: &mut ListState, len: usize) {
    if len == 0 {
        return;
    }
    let i = state.selected().map_or(0, |i| i.saturating_sub(1));
    state.select(Some(i));
}
