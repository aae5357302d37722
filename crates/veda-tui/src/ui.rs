use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};
use veda_core::{ChannelState, ContextSnapshot, OutputLine, Panel, Tone};

use crate::app::{App, InputMode, InputTarget};

pub fn tone_color(tone: Tone) -> Color {
    match tone {
        Tone::Info => Color::Rgb(0x00, 0xe5, 0xff),
        Tone::Assistant => Color::White,
        Tone::Success => Color::Rgb(0x00, 0xff, 0x00),
        Tone::Warning => Color::Rgb(0xff, 0x98, 0x00),
        Tone::Error => Color::Rgb(0xff, 0x44, 0x44),
    }
}

fn state_color(state: ChannelState) -> Color {
    match state {
        ChannelState::Open => Color::Green,
        ChannelState::Connecting | ChannelState::Reconnecting => Color::Yellow,
        ChannelState::Failed => Color::Red,
        ChannelState::Disconnected => Color::Gray,
    }
}

/// Multi-line text in a single tone.
fn toned_text(line: &OutputLine) -> Text<'static> {
    let style = Style::default().fg(tone_color(line.tone));
    Text::from(
        line.text
            .lines()
            .map(|l| Line::from(Span::styled(l.to_string(), style)))
            .collect::<Vec<_>>(),
    )
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, body_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.panel {
        Some(panel) => {
            let [output_area, panel_area] =
                Layout::horizontal([Constraint::Min(0), Constraint::Percentage(45)]).areas(body_area);
            render_output(app, frame, output_area);
            render_panel(app, frame, panel_area, panel);
        }
        None => render_output(app, frame, body_area),
    }

    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let dots = ".".repeat(app.animation_frame as usize + 1);
    let mut spans = vec![
        Span::styled(" VEDA AI ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!(" ● {} ", app.channel_state.display_name()),
            Style::default().fg(state_color(app.channel_state)),
        ),
    ];
    if app.listening {
        spans.push(Span::styled(
            format!(" 🎤 listening{:<3} ", dots),
            Style::default().fg(tone_color(Tone::Info)).add_modifier(Modifier::BOLD),
        ));
    }

    let backend = match &app.health {
        Some(health) => format!(" {} v{} ", health.service, health.version),
        None => format!(" {} ", app.server_url),
    };
    spans.push(Span::styled(backend, Style::default().fg(Color::Gray)));
    spans.push(Span::styled(
        format!("v{}", env!("CARGO_PKG_VERSION")),
        Style::default().fg(Color::Gray),
    ));

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_output(app: &App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Output ");

    let output = Paragraph::new(toned_text(&app.surface.primary))
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(output, area);
}

fn render_panel(app: &mut App, frame: &mut Frame, area: Rect, panel: Panel) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(format!(" {} ", panel.title()));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let status = app.surface.status(panel).cloned();
    let status_height = status
        .as_ref()
        .map_or(0, |line| line.text.lines().count().max(1) as u16 + 1);
    let [list_area, status_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(status_height)]).areas(inner);

    match panel {
        Panel::Suggestions => render_suggestions(app, frame, list_area),
        Panel::Tasks => render_tasks(app, frame, list_area),
        Panel::Context => render_context(app.surface.context.as_ref(), frame, list_area),
    }

    if let Some(line) = status {
        let status = Paragraph::new(toned_text(&line))
            .block(Block::default().borders(Borders::TOP).border_style(Style::default().fg(Color::DarkGray)))
            .wrap(Wrap { trim: true });
        frame.render_widget(status, status_area);
    }
}

fn highlight_style() -> Style {
    Style::default()
        .bg(Color::Blue)
        .fg(Color::White)
        .add_modifier(Modifier::BOLD)
}

fn empty_hint(frame: &mut Frame, area: Rect, text: &str) {
    let hint = Paragraph::new(text.to_string())
        .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC))
        .wrap(Wrap { trim: true });
    frame.render_widget(hint, area);
}

fn priority_color(priority: &str) -> Color {
    match priority {
        "high" => Color::Red,
        "medium" => Color::Yellow,
        _ => Color::Gray,
    }
}

fn render_suggestions(app: &mut App, frame: &mut Frame, area: Rect) {
    if app.surface.suggestions.is_empty() {
        empty_hint(frame, area, "No suggestions right now.");
        return;
    }

    let items: Vec<ListItem> = app
        .surface
        .suggestions
        .iter()
        .map(|s| {
            ListItem::new(vec![
                Line::from(vec![
                    Span::styled(
                        format!("[{}] ", s.priority),
                        Style::default().fg(priority_color(&s.priority)),
                    ),
                    Span::raw(s.message.clone()),
                ]),
                Line::from(Span::styled(
                    format!("   → {}", s.action),
                    Style::default().fg(Color::DarkGray),
                )),
            ])
        })
        .collect();

    let list = List::new(items)
        .highlight_style(highlight_style())
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut app.suggestion_state);
}

fn render_tasks(app: &mut App, frame: &mut Frame, area: Rect) {
    if app.surface.tasks.is_empty() {
        empty_hint(frame, area, "No scheduled tasks. Press n to add one.");
        return;
    }

    let items: Vec<ListItem> = app
        .surface
        .tasks
        .iter()
        .map(|task| {
            let (mark, mark_color) = if task.enabled {
                ("[✓]", Color::Green)
            } else {
                ("[ ]", Color::DarkGray)
            };
            let schedule = match &task.schedule_value {
                Some(value) if !value.is_empty() => format!("{} {}", task.schedule_type, value),
                _ => task.schedule_type.clone(),
            };
            let mut detail = format!("   {} · runs {}", schedule, task.run_count);
            if let Some(next) = &task.next_run {
                detail.push_str(&format!(" · next {}", next));
            }
            ListItem::new(vec![
                Line::from(vec![
                    Span::styled(format!("{} ", mark), Style::default().fg(mark_color)),
                    Span::raw(task.name.clone()),
                    Span::styled(format!("  {}", task.command), Style::default().fg(Color::Gray)),
                ]),
                Line::from(Span::styled(detail, Style::default().fg(Color::DarkGray))),
            ])
        })
        .collect();

    let list = List::new(items)
        .highlight_style(highlight_style())
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, area, &mut app.task_state);
}

fn render_context(context: Option<&ContextSnapshot>, frame: &mut Frame, area: Rect) {
    let Some(context) = context else {
        empty_hint(frame, area, "Loading context...");
        return;
    };

    let label = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let now = &context.current_context;
    let mut lines = vec![
        Line::from(Span::styled("Now", label)),
        Line::from(format!(
            "  {} · {} {}",
            now.time_of_day, now.day_of_week, now.date
        )),
        Line::default(),
        Line::from(Span::styled("Likely apps", label)),
    ];
    if context.prediction.likely_apps.is_empty() {
        lines.push(Line::from(Span::styled("  none", Style::default().fg(Color::DarkGray))));
    }
    for app in &context.prediction.likely_apps {
        lines.push(Line::from(format!("  {} ({}×)", app.app, app.frequency)));
    }

    lines.push(Line::default());
    lines.push(Line::from(Span::styled("Frequent commands", label)));
    if context.frequent_tasks.is_empty() {
        lines.push(Line::from(Span::styled("  none", Style::default().fg(Color::DarkGray))));
    }
    for task in &context.frequent_tasks {
        lines.push(Line::from(format!("  {} ({}×)", task.command, task.count)));
    }

    let paragraph = Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(app.input_target.title());

    // Horizontal scroll keeps the cursor in view
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 || app.input_cursor < inner_width {
        0
    } else {
        app.input_cursor - inner_width + 1
    };
    let visible: String = app.input.chars().skip(scroll_offset).take(inner_width).collect();

    let input = Paragraph::new(visible)
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(input, area);

    if editing {
        let cursor_x = (app.input_cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let key = |k: &'static str, label: &'static str| {
        [
            Span::styled(format!(" {} ", k), key_style),
            Span::styled(format!(" {} ", label), label_style),
        ]
    };

    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" INPUT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    let mut hints: Vec<Span> = Vec::new();
    match (app.input_mode, app.input_target) {
        (InputMode::Editing, InputTarget::Command) => {
            hints.extend(key("Enter", "send"));
            hints.extend(key("Esc", "stop typing"));
        }
        (InputMode::Editing, _) => {
            hints.extend(key("Enter", "save"));
            hints.extend(key("Esc", "cancel"));
        }
        (InputMode::Normal, _) => {
            hints.extend(key("i", "type"));
            hints.extend(key("v", "voice"));
            hints.extend(key("c", "calibrate"));
            match app.panel {
                Some(Panel::Suggestions) => {
                    hints.extend(key("j/k", "nav"));
                    hints.extend(key("Enter", "run"));
                }
                Some(Panel::Tasks) => {
                    hints.extend(key("j/k", "nav"));
                    hints.extend(key("Space", "toggle"));
                    hints.extend(key("d", "delete"));
                    hints.extend(key("n", "new"));
                }
                Some(Panel::Context) => {
                    hints.extend(key("a", "shortcut"));
                }
                None => {}
            }
            if app.panel.is_some() {
                hints.extend(key("R", "refresh"));
            }
            hints.extend(key("s/t/x", "panels"));
            if app.channel_state == ChannelState::Failed {
                hints.extend(key("r", "reconnect"));
            }
            hints.extend(key("q", "quit"));
        }
    }

    let footer = Line::from(
        [Span::styled(mode_text, mode_style), Span::styled(" ", label_style)]
            .into_iter()
            .chain(hints)
            .collect::<Vec<_>>(),
    );
    frame.render_widget(Paragraph::new(footer).style(Style::default().bg(Color::Black)), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};
    use veda_core::render::{RenderInstruction, RenderSink};
    use veda_core::{ScheduledTask, SurfaceHandle};

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(buffer[(x, y)].symbol());
            }
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_tone_colors_are_distinct() {
        let tones = [Tone::Info, Tone::Assistant, Tone::Success, Tone::Warning, Tone::Error];
        for (i, a) in tones.iter().enumerate() {
            for b in &tones[i + 1..] {
                assert_ne!(tone_color(*a), tone_color(*b));
            }
        }
    }

    #[test]
    fn test_render_primary_and_tasks_panel() {
        let surface = SurfaceHandle::new();
        surface.render(RenderInstruction::primary(Tone::Assistant, "You: hi\n\nhello there"));
        surface.render(RenderInstruction::Panel(veda_core::render::PanelUpdate::Tasks(vec![
            ScheduledTask {
                id: 1,
                name: "Backup".to_string(),
                command: "run backup".to_string(),
                schedule_type: "daily".to_string(),
                schedule_value: Some("02:00".to_string()),
                enabled: false,
                run_count: 3,
                last_run: None,
                next_run: None,
                created_at: None,
            },
        ])));
        surface.render(RenderInstruction::status(Panel::Tasks, Tone::Success, "✅ Task created"));

        let mut app = App::new("http://localhost:8000");
        app.surface = surface.snapshot();
        app.panel = Some(Panel::Tasks);
        app.channel_state = ChannelState::Open;

        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        let text = buffer_text(&terminal);

        assert!(text.contains("Online"));
        assert!(text.contains("hello there"));
        assert!(text.contains("Backup"));
        assert!(text.contains("daily 02:00"));
        assert!(text.contains("Task created"));
    }

    #[test]
    fn test_render_empty_context_panel() {
        let mut app = App::new("http://localhost:8000");
        app.panel = Some(Panel::Context);

        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal.draw(|frame| render(&mut app, frame)).unwrap();
        assert!(buffer_text(&terminal).contains("Loading context"));
    }
}
