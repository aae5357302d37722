//! Automation polling.
//!
//! Suggestions, scheduled tasks and usage context come from plain
//! request/response calls that never touch the command channel. Each call
//! renders into its own panel; a failure shows up as that panel's status
//! line and nowhere else. Task mutations are always followed by a full
//! re-fetch, so the task list on screen is a snapshot of the backend rather
//! than a locally patched copy.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::automation::{NewTask, Shortcut};
use crate::backend::AutomationBackend;
use crate::render::{Panel, PanelUpdate, RenderInstruction, RenderSink, Tone};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollRequest {
    Suggestions,
    ExecuteSuggestion(String),
    Tasks,
    CreateTask(NewTask),
    ToggleTask { id: i64, enabled: bool },
    DeleteTask(i64),
    Context,
    CreateShortcut(Shortcut),
}

#[derive(Clone)]
pub struct AutomationPoller {
    backend: Arc<dyn AutomationBackend>,
    sink: Arc<dyn RenderSink>,
}

impl AutomationPoller {
    pub fn new(backend: Arc<dyn AutomationBackend>, sink: Arc<dyn RenderSink>) -> Self {
        Self { backend, sink }
    }

    /// Run `request` on its own task. Nothing waits for it; its result lands
    /// on the surface whenever it completes.
    pub fn spawn(&self, request: PollRequest) -> JoinHandle<()> {
        let poller = self.clone();
        tokio::spawn(async move { poller.run(request).await })
    }

    pub async fn run(&self, request: PollRequest) {
        match request {
            PollRequest::Suggestions => self.fetch_suggestions().await,
            PollRequest::ExecuteSuggestion(action) => self.execute_suggestion(&action).await,
            PollRequest::Tasks => self.fetch_tasks().await,
            PollRequest::CreateTask(task) => self.create_task(&task).await,
            PollRequest::ToggleTask { id, enabled } => self.toggle_task(id, enabled).await,
            PollRequest::DeleteTask(id) => self.delete_task(id).await,
            PollRequest::Context => self.fetch_context().await,
            PollRequest::CreateShortcut(shortcut) => self.create_shortcut(&shortcut).await,
        }
    }

    fn status(&self, panel: Panel, tone: Tone, text: impl Into<String>) {
        self.sink.render(RenderInstruction::status(panel, tone, text));
    }

    pub async fn fetch_suggestions(&self) {
        match self.backend.suggestions().await {
            Ok(items) => {
                debug!(count = items.len(), "suggestions fetched");
                self.sink
                    .render(RenderInstruction::Panel(PanelUpdate::Suggestions(items)));
            }
            Err(e) => {
                warn!(error = %e, "suggestions fetch failed");
                self.status(
                    Panel::Suggestions,
                    Tone::Error,
                    format!("❌ Could not load suggestions: {}", e),
                );
            }
        }
    }

    /// Execute a suggestion's action, then refresh the list whatever the
    /// outcome.
    pub async fn execute_suggestion(&self, action: &str) {
        match self.backend.execute_suggestion(action).await {
            Ok(result) => {
                debug!(%action, "suggestion executed");
                self.sink
                    .render(RenderInstruction::primary(Tone::Assistant, result));
            }
            Err(e) => {
                warn!(%action, error = %e, "suggestion execution failed");
                self.status(
                    Panel::Suggestions,
                    Tone::Error,
                    format!("❌ Could not run '{}': {}", action, e),
                );
            }
        }
        self.fetch_suggestions().await;
    }

    pub async fn fetch_tasks(&self) {
        match self.backend.tasks().await {
            Ok(tasks) => {
                debug!(count = tasks.len(), "tasks fetched");
                self.sink.render(RenderInstruction::Panel(PanelUpdate::Tasks(tasks)));
            }
            Err(e) => {
                warn!(error = %e, "task fetch failed");
                self.status(Panel::Tasks, Tone::Error, format!("❌ Could not load tasks: {}", e));
            }
        }
    }

    pub async fn create_task(&self, task: &NewTask) {
        match self.backend.create_task(task).await {
            Ok(created) => self.status(
                Panel::Tasks,
                Tone::Success,
                format!("✅ Task '{}' created (#{})", created.name, created.id),
            ),
            Err(e) => {
                warn!(name = %task.name, error = %e, "task creation failed");
                self.status(Panel::Tasks, Tone::Error, format!("❌ Could not create task: {}", e));
            }
        }
        self.fetch_tasks().await;
    }

    pub async fn toggle_task(&self, id: i64, enabled: bool) {
        match self.backend.set_task_enabled(id, enabled).await {
            Ok(message) => self.status(Panel::Tasks, Tone::Success, format!("✅ {}", message)),
            Err(e) => {
                warn!(id, enabled, error = %e, "task toggle failed");
                self.status(Panel::Tasks, Tone::Error, format!("❌ Could not update task #{}: {}", id, e));
            }
        }
        self.fetch_tasks().await;
    }

    pub async fn delete_task(&self, id: i64) {
        match self.backend.delete_task(id).await {
            Ok(message) => self.status(Panel::Tasks, Tone::Success, format!("🗑 {}", message)),
            Err(e) => {
                warn!(id, error = %e, "task delete failed");
                self.status(Panel::Tasks, Tone::Error, format!("❌ Could not delete task #{}: {}", id, e));
            }
        }
        self.fetch_tasks().await;
    }

    pub async fn fetch_context(&self) {
        match self.backend.context().await {
            Ok(snapshot) => self
                .sink
                .render(RenderInstruction::Panel(PanelUpdate::Context(snapshot))),
            Err(e) => {
                warn!(error = %e, "context fetch failed");
                self.status(Panel::Context, Tone::Error, format!("❌ Could not load context: {}", e));
            }
        }
    }

    pub async fn create_shortcut(&self, shortcut: &Shortcut) {
        match self.backend.create_shortcut(shortcut).await {
            Ok(message) => self.status(Panel::Context, Tone::Success, format!("✅ {}", message)),
            Err(e) => {
                warn!(name = %shortcut.name, error = %e, "shortcut creation failed");
                self.status(Panel::Context, Tone::Error, format!("❌ Could not create shortcut: {}", e));
            }
        }
    }
}

/// Refresh suggestions every `period` while `visible` reads true.
///
/// Ticks while hidden are skipped without any request. The task ends once the
/// visibility sender is dropped.
pub fn spawn_suggestion_timer(
    poller: AutomationPoller,
    period: Duration,
    mut visible: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if visible.has_changed().is_err() {
                break;
            }
            let shown = *visible.borrow_and_update();
            if shown {
                poller.fetch_suggestions().await;
            }
        }
        debug!("suggestion timer stopped");
    })
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::automation::Suggestion;
    use crate::render::testing::RecordingSink;
    use crate::render::OutputLine;

    fn poller(backend: FakeAutomation) -> (AutomationPoller, Arc<FakeAutomation>, RecordingSink) {
        let backend = Arc::new(backend);
        let sink = RecordingSink::default();
        let poller = AutomationPoller::new(backend.clone(), Arc::new(sink.clone()));
        (poller, backend, sink)
    }

    fn suggestion(action: &str) -> Suggestion {
        Suggestion {
            kind: "suggestion".to_string(),
            priority: "low".to_string(),
            message: format!("Try {}", action),
            action: action.to_string(),
        }
    }

    #[tokio::test]
    async fn test_execute_suggestion_renders_result_then_refreshes_once() {
        let (poller, backend, sink) = poller(FakeAutomation::default());
        backend.suggestions.lock().push(suggestion("weather"));

        poller.execute_suggestion("x").await;

        assert_eq!(backend.calls(), vec!["execute:x".to_string(), "suggestions".to_string()]);
        assert_eq!(sink.last_primary(), Some(OutputLine::new(Tone::Assistant, "done")));
        assert!(matches!(
            sink.all().last(),
            Some(RenderInstruction::Panel(PanelUpdate::Suggestions(items))) if items.len() == 1
        ));
    }

    #[tokio::test]
    async fn test_execute_failure_still_refreshes_once() {
        let (poller, backend, sink) = poller(FakeAutomation {
            fail_execute: true,
            ..Default::default()
        });

        poller.execute_suggestion("x").await;

        assert_eq!(backend.count("suggestions"), 1);
        assert!(sink.primaries().is_empty());
        assert!(sink.all().iter().any(|i| matches!(
            i,
            RenderInstruction::Panel(PanelUpdate::Status(Panel::Suggestions, line)) if line.tone == Tone::Error
        )));
    }

    #[tokio::test]
    async fn test_every_task_mutation_refetches() {
        let (poller, backend, _sink) = poller(FakeAutomation::default());
        backend.tasks.lock().push(task(1, "news", true));

        poller.toggle_task(1, false).await;
        poller.delete_task(1).await;
        poller
            .create_task(&NewTask::parse("n | c | daily | 08:00").unwrap())
            .await;

        assert_eq!(
            backend.calls(),
            vec![
                "toggle:1:false".to_string(),
                "tasks".to_string(),
                "delete:1".to_string(),
                "tasks".to_string(),
                "create_task".to_string(),
                "tasks".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_mutation_still_refetches_and_stays_in_panel() {
        let (poller, backend, sink) = poller(FakeAutomation {
            fail_mutations: true,
            ..Default::default()
        });

        poller.delete_task(9).await;

        assert_eq!(backend.calls(), vec!["delete:9".to_string(), "tasks".to_string()]);
        assert!(sink.primaries().is_empty());
        let statuses: Vec<_> = sink
            .all()
            .into_iter()
            .filter_map(|i| match i {
                RenderInstruction::Panel(PanelUpdate::Status(panel, line)) => Some((panel, line.tone)),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec![(Panel::Tasks, Tone::Error)]);
    }

    #[tokio::test]
    async fn test_fetch_failures_are_scoped_to_their_panel() {
        let (poller, _backend, sink) = poller(FakeAutomation {
            fail_fetches: true,
            ..Default::default()
        });

        poller.fetch_suggestions().await;
        poller.fetch_tasks().await;
        poller.fetch_context().await;

        let panels: Vec<Panel> = sink
            .all()
            .iter()
            .map(|i| match i {
                RenderInstruction::Panel(update) => update.panel(),
                RenderInstruction::Primary(_) => panic!("fetch failure reached the primary line"),
            })
            .collect();
        assert_eq!(panels, vec![Panel::Suggestions, Panel::Tasks, Panel::Context]);
    }

    #[tokio::test]
    async fn test_shortcut_reports_in_context_panel() {
        let (poller, backend, sink) = poller(FakeAutomation::default());
        poller
            .run(PollRequest::CreateShortcut(Shortcut::parse("yt | open youtube").unwrap()))
            .await;
        assert_eq!(backend.calls(), vec!["shortcut:yt".to_string()]);
        assert!(matches!(
            sink.all().last(),
            Some(RenderInstruction::Panel(PanelUpdate::Status(Panel::Context, line))) if line.tone == Tone::Success
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_only_polls_while_visible() {
        let (poller, backend, _sink) = poller(FakeAutomation::default());
        let (visible_tx, visible_rx) = watch::channel(false);
        let period = Duration::from_secs(300);
        let timer = spawn_suggestion_timer(poller, period, visible_rx);

        tokio::time::sleep(Duration::from_secs(601)).await;
        assert_eq!(backend.count("suggestions"), 0);

        visible_tx.send_replace(true);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(backend.count("suggestions"), 1);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(backend.count("suggestions"), 3);

        visible_tx.send_replace(false);
        tokio::time::sleep(Duration::from_secs(900)).await;
        assert_eq!(backend.count("suggestions"), 3);

        drop(visible_tx);
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(timer.is_finished());
    }
}
