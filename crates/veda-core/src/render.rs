//! The shared output surface.
//!
//! Components never touch presentation directly. They hand
//! [`RenderInstruction`]s to a [`RenderSink`] injected at construction. The
//! [`OutputSurface`] applies each instruction as it arrives: the primary line
//! is a single slot that the latest writer overwrites, and each panel is its
//! own region that only its panel updates touch.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::automation::{ContextSnapshot, ScheduledTask, Suggestion};

/// Visual class of a line. The front end maps these to colours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tone {
    #[default]
    Info,
    Assistant,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputLine {
    pub tone: Tone,
    pub text: String,
}

impl OutputLine {
    pub fn new(tone: Tone, text: impl Into<String>) -> Self {
        Self {
            tone,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Panel {
    Suggestions,
    Tasks,
    Context,
}

impl Panel {
    pub fn title(&self) -> &'static str {
        match self {
            Panel::Suggestions => "Suggestions",
            Panel::Tasks => "Scheduled Tasks",
            Panel::Context => "Context",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PanelUpdate {
    Suggestions(Vec<Suggestion>),
    Tasks(Vec<ScheduledTask>),
    Context(ContextSnapshot),
    /// Status line scoped to one panel (errors, mutation results).
    Status(Panel, OutputLine),
}

impl PanelUpdate {
    pub fn panel(&self) -> Panel {
        match self {
            PanelUpdate::Suggestions(_) => Panel::Suggestions,
            PanelUpdate::Tasks(_) => Panel::Tasks,
            PanelUpdate::Context(_) => Panel::Context,
            PanelUpdate::Status(panel, _) => *panel,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderInstruction {
    Primary(OutputLine),
    Panel(PanelUpdate),
}

impl RenderInstruction {
    pub fn primary(tone: Tone, text: impl Into<String>) -> Self {
        RenderInstruction::Primary(OutputLine::new(tone, text))
    }

    pub fn status(panel: Panel, tone: Tone, text: impl Into<String>) -> Self {
        RenderInstruction::Panel(PanelUpdate::Status(panel, OutputLine::new(tone, text)))
    }
}

/// Render target injected into every component.
pub trait RenderSink: Send + Sync {
    fn render(&self, instruction: RenderInstruction);
}

/// Contents of the surface at one instant.
#[derive(Debug, Clone, Default)]
pub struct OutputSurface {
    pub primary: OutputLine,
    pub suggestions: Vec<Suggestion>,
    pub tasks: Vec<ScheduledTask>,
    pub context: Option<ContextSnapshot>,
    pub suggestions_status: Option<OutputLine>,
    pub tasks_status: Option<OutputLine>,
    pub context_status: Option<OutputLine>,
    /// Bumped on every applied instruction so a front end can skip redraws.
    pub revision: u64,
}

impl OutputSurface {
    pub fn apply(&mut self, instruction: RenderInstruction) {
        match instruction {
            RenderInstruction::Primary(line) => self.primary = line,
            RenderInstruction::Panel(update) => match update {
                PanelUpdate::Suggestions(items) => self.suggestions = items,
                PanelUpdate::Tasks(items) => self.tasks = items,
                PanelUpdate::Context(snapshot) => self.context = Some(snapshot),
                PanelUpdate::Status(panel, line) => *self.status_mut(panel) = Some(line),
            },
        }
        self.revision += 1;
    }

    pub fn status(&self, panel: Panel) -> Option<&OutputLine> {
        match panel {
            Panel::Suggestions => self.suggestions_status.as_ref(),
            Panel::Tasks => self.tasks_status.as_ref(),
            Panel::Context => self.context_status.as_ref(),
        }
    }

    fn status_mut(&mut self, panel: Panel) -> &mut Option<OutputLine> {
        match panel {
            Panel::Suggestions => &mut self.suggestions_status,
            Panel::Tasks => &mut self.tasks_status,
            Panel::Context => &mut self.context_status,
        }
    }
}

/// Cloneable handle to an [`OutputSurface`] that several writers share.
#[derive(Debug, Clone, Default)]
pub struct SurfaceHandle {
    inner: Arc<Mutex<OutputSurface>>,
}

impl SurfaceHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> OutputSurface {
        self.inner.lock().clone()
    }

    pub fn revision(&self) -> u64 {
        self.inner.lock().revision
    }
}

impl RenderSink for SurfaceHandle {
    fn render(&self, instruction: RenderInstruction) {
        self.inner.lock().apply(instruction);
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_is_last_write_wins() {
        let surface = SurfaceHandle::new();
        surface.render(RenderInstruction::primary(Tone::Info, "Processing..."));
        surface.render(RenderInstruction::primary(Tone::Warning, "Disconnected"));
        surface.render(RenderInstruction::primary(Tone::Assistant, "hi"));

        let snap = surface.snapshot();
        assert_eq!(snap.primary, OutputLine::new(Tone::Assistant, "hi"));
        assert_eq!(snap.revision, 3);
    }

    #[test]
    fn test_panel_updates_do_not_touch_primary() {
        let surface = SurfaceHandle::new();
        surface.render(RenderInstruction::primary(Tone::Info, "ready"));
        surface.render(RenderInstruction::Panel(PanelUpdate::Tasks(Vec::new())));
        surface.render(RenderInstruction::status(Panel::Tasks, Tone::Error, "boom"));

        let snap = surface.snapshot();
        assert_eq!(snap.primary.text, "ready");
        assert_eq!(snap.status(Panel::Tasks).map(|l| l.text.as_str()), Some("boom"));
        assert!(snap.status(Panel::Suggestions).is_none());
    }
}
