use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::debug;
use veda_core::render::{RenderInstruction, RenderSink};
use veda_core::{NewTask, Panel, PollRequest, Session, Shortcut, Tone};

use crate::app::{App, InputMode, InputTarget};
use crate::tui::AppEvent;

pub async fn handle_event(app: &mut App, session: &mut Session, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, session, key).await?,
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
            app.collect_health().await;
        }
    }
    Ok(())
}

async fn handle_key(app: &mut App, session: &mut Session, key: KeyEvent) -> Result<()> {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, session, key),
        InputMode::Editing => handle_editing_mode(app, session, key).await,
    }
    Ok(())
}

fn handle_normal_mode(app: &mut App, session: &mut Session, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Char('i') | KeyCode::Char('/') => app.start_editing(InputTarget::Command),
        KeyCode::Enter => match app.panel {
            Some(Panel::Suggestions) => {
                if let Some(suggestion) = app.selected_suggestion() {
                    session.poll(PollRequest::ExecuteSuggestion(suggestion.action.clone()));
                }
            }
            _ => app.start_editing(InputTarget::Command),
        },

        // Voice
        KeyCode::Char('v') => {
            if let Err(e) = session.submit_voice() {
                debug!(error = %e, "voice request ignored");
            }
        }
        KeyCode::Char('c') => session.calibrate(),

        KeyCode::Char('r') => session.reconnect(),

        // Panels
        KeyCode::Char('s') => toggle_panel(app, session, Panel::Suggestions),
        KeyCode::Char('t') => toggle_panel(app, session, Panel::Tasks),
        KeyCode::Char('x') => toggle_panel(app, session, Panel::Context),
        KeyCode::Esc => set_panel(app, session, None),
        KeyCode::Char('R') => {
            if let Some(panel) = app.panel {
                session.poll(fetch_request(panel));
            }
        }

        KeyCode::Char('j') | KeyCode::Down => app.panel_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.panel_nav_up(),

        // Tasks panel
        KeyCode::Char(' ') if app.panel == Some(Panel::Tasks) => {
            if let Some(task) = app.selected_task() {
                session.poll(PollRequest::ToggleTask {
                    id: task.id,
                    enabled: !task.enabled,
                });
            }
        }
        KeyCode::Char('d') if app.panel == Some(Panel::Tasks) => {
            if let Some(task) = app.selected_task() {
                session.poll(PollRequest::DeleteTask(task.id));
            }
        }
        KeyCode::Char('n') if app.panel == Some(Panel::Tasks) => {
            app.start_editing(InputTarget::NewTask)
        }

        // Context panel
        KeyCode::Char('a') if app.panel == Some(Panel::Context) => {
            app.start_editing(InputTarget::Shortcut)
        }

        _ => {}
    }
}

async fn handle_editing_mode(app: &mut App, session: &mut Session, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.stop_editing(),
        KeyCode::Enter => submit_input(app, session).await,
        KeyCode::Backspace => app.delete_char_before(),
        KeyCode::Delete => app.delete_char_at(),
        KeyCode::Left => app.cursor_left(),
        KeyCode::Right => app.cursor_right(),
        KeyCode::Home => app.cursor_home(),
        KeyCode::End => app.cursor_end(),
        KeyCode::Char(c) => app.insert_char(c),
        _ => {}
    }
}

async fn submit_input(app: &mut App, session: &mut Session) {
    match app.input_target {
        InputTarget::Command => {
            // Rejected or undelivered commands stay in the line for another try.
            if session.submit_text(&app.input).await.is_ok() {
                app.clear_input();
            }
        }
        InputTarget::NewTask => match NewTask::parse(&app.input) {
            Ok(task) => {
                session.poll(PollRequest::CreateTask(task));
                app.stop_editing();
            }
            Err(message) => form_error(session, Panel::Tasks, message),
        },
        InputTarget::Shortcut => match Shortcut::parse(&app.input) {
            Ok(shortcut) => {
                session.poll(PollRequest::CreateShortcut(shortcut));
                app.stop_editing();
            }
            Err(message) => form_error(session, Panel::Context, message),
        },
    }
}

fn form_error(session: &Session, panel: Panel, message: String) {
    session
        .surface()
        .render(RenderInstruction::status(panel, Tone::Warning, format!("⚠️ {}", message)));
}

fn fetch_request(panel: Panel) -> PollRequest {
    match panel {
        Panel::Suggestions => PollRequest::Suggestions,
        Panel::Tasks => PollRequest::Tasks,
        Panel::Context => PollRequest::Context,
    }
}

fn toggle_panel(app: &mut App, session: &Session, panel: Panel) {
    let next = if app.panel == Some(panel) { None } else { Some(panel) };
    set_panel(app, session, next);
}

/// Switch the side panel. Opening tasks or context fetches them; the
/// suggestions panel is refreshed by the session while it is shown.
fn set_panel(app: &mut App, session: &Session, panel: Option<Panel>) {
    app.panel = panel;
    session.set_suggestions_visible(panel == Some(Panel::Suggestions));
    if let Some(panel @ (Panel::Tasks | Panel::Context)) = panel {
        session.poll(fetch_request(panel));
    }
}
