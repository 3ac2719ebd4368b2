use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;
use regex::Regex;
use unicode_width::UnicodeWidthStr;

use crate::app::state::{
    AppState, AuthField, AuthMode, FormField, NoteForm, NoticeKind, Overlay, Screen,
};
use crate::config::Palette;
use crate::highlight::{search_highlighter, split_matches};
use crate::notes::{Group, Note, NoteController};

pub fn draw_app(
    frame: &mut Frame,
    state: &AppState,
    controller: &NoteController,
    list_state: &mut ListState,
) {
    let palette = state.theme.palette();
    frame.render_widget(
        Block::default().style(Style::default().bg(palette.background).fg(palette.text)),
        frame.size(),
    );
    match state.screen {
        Screen::Auth => draw_auth(frame, state, &palette),
        Screen::Dashboard => draw_dashboard(frame, state, controller, list_state, &palette),
    }
    if let Some(notice) = state.notice() {
        draw_notice(frame, notice.kind, &notice.message, &palette);
    }
}

fn draw_auth(frame: &mut Frame, state: &AppState, palette: &Palette) {
    let area = centered_rect(50, 50, frame.size());
    let form = &state.auth;
    let mut lines = Vec::new();
    for field in form.fields() {
        let focused = *field == form.focus;
        let label_style = if focused {
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(palette.muted)
        };
        let value = match field {
            AuthField::Password => "•".repeat(form.password.chars().count()),
            other => form.value(*other).to_string(),
        };
        lines.push(Line::from(Span::styled(field.to_string(), label_style)));
        lines.push(Line::from(vec![
            Span::raw(if focused { "> " } else { "  " }),
            Span::raw(value),
        ]));
        lines.push(Line::from(""));
    }
    let hint = match form.mode {
        AuthMode::Login => "Enter sign in • Tab next field • Ctrl-t create an account • Esc quit",
        AuthMode::Register => "Enter register • Tab next field • Ctrl-t back to sign in • Esc quit",
    };
    lines.push(Line::from(Span::styled(hint, Style::default().fg(palette.muted))));

    let title = match form.mode {
        AuthMode::Login => "Sign in",
        AuthMode::Register => "Create account",
    };
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false }).block(
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.accent)),
    );
    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

fn draw_dashboard(
    frame: &mut Frame,
    state: &AppState,
    controller: &NoteController,
    list_state: &mut ListState,
    palette: &Palette,
) {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(2),
        ])
        .split(frame.size());

    draw_header(frame, vertical[0], state, controller, palette);

    let collection = controller.collection();
    let highlighter = search_highlighter(collection.search_term());
    let groups = collection.partitioned();
    let mut items = Vec::new();
    let mut selected_row = None;
    let mut visible_index = 0;
    let sections = [Group::Pinned, Group::Unpinned, Group::Archived];
    for group in sections {
        if group == Group::Archived && !collection.show_archived() {
            continue;
        }
        let notes = groups.group(group);
        if notes.is_empty() {
            continue;
        }
        items.push(ListItem::new(Line::from(Span::styled(
            format!("{group} ({})", notes.len()),
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        ))));
        for note in notes {
            if visible_index == state.selected {
                selected_row = Some(items.len());
            }
            items.push(note_item(note, group, state, highlighter.as_ref(), palette));
            visible_index += 1;
        }
    }
    if items.is_empty() {
        let empty = if collection.search_term().trim().is_empty() {
            "No notes yet. Press `a` to create one."
        } else {
            "No notes match your search."
        };
        items.push(ListItem::new(Span::styled(empty, Style::default().fg(palette.muted))));
    }
    list_state.select(selected_row);

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("Notes"))
        .highlight_style(
            Style::default()
                .bg(palette.selection)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(list, vertical[1], list_state);

    frame.render_widget(
        Paragraph::new(build_status_line(state, palette)),
        vertical[2],
    );

    match state.overlay() {
        Some(Overlay::Form(form)) => draw_form(frame, form, palette),
        Some(Overlay::ConfirmDelete { title, .. }) => draw_confirm(frame, title, palette),
        Some(Overlay::Detail(_)) => {
            if let Some(note) = collection.viewing() {
                draw_detail(frame, note, state, highlighter.as_ref(), palette);
            }
        }
        None => {}
    }
}

fn draw_header(
    frame: &mut Frame,
    area: Rect,
    state: &AppState,
    controller: &NoteController,
    palette: &Palette,
) {
    let who = controller
        .identity()
        .map(|identity| format!("{} <{}>", identity.name, identity.email))
        .unwrap_or_else(|| "Loading…".to_string());
    let term = controller.collection().search_term();
    let search_style = if state.is_search_active() {
        Style::default().fg(palette.highlight)
    } else {
        Style::default().fg(palette.muted)
    };
    let search = if term.is_empty() && !state.is_search_active() {
        "Search notes... (/)".to_string()
    } else {
        format!("/{term}")
    };
    let offset = UnicodeWidthStr::width(who.as_str()) + 4 + UnicodeWidthStr::width(term);
    let line = Line::from(vec![
        Span::styled(who, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("   "),
        Span::styled(search, search_style),
    ]);
    frame.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::ALL).title("notedeck")),
        area,
    );
    if state.is_search_active() && state.overlay().is_none() {
        let x = area.x + 1 + offset.min(area.width.saturating_sub(3) as usize) as u16;
        frame.set_cursor(x, area.y + 1);
    }
}

fn note_item(
    note: &Note,
    group: Group,
    state: &AppState,
    highlighter: Option<&Regex>,
    palette: &Palette,
) -> ListItem<'static> {
    let mut title = Vec::new();
    if group == Group::Pinned || note.pinned {
        title.push(Span::styled(
            "★ ",
            Style::default()
                .fg(palette.highlight)
                .add_modifier(Modifier::BOLD),
        ));
    }
    if note.archived {
        title.push(Span::styled(
            "[A] ",
            Style::default()
                .fg(palette.muted)
                .add_modifier(Modifier::ITALIC),
        ));
    }
    title.extend(highlight_spans(
        &note.title,
        highlighter,
        Style::default().add_modifier(Modifier::BOLD),
        palette,
    ));
    if let Some(color) = &note.color {
        title.push(Span::styled(format!("  {color}"), Style::default().fg(palette.muted)));
    }
    if note.image.is_some() {
        title.push(Span::styled("  +image", Style::default().fg(palette.muted)));
    }

    let mut lines = vec![Line::from(title)];
    for line in note
        .body
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(state.preview_lines)
    {
        let mut spans = vec![Span::raw("  ")];
        spans.extend(highlight_spans(
            line,
            highlighter,
            Style::default().fg(palette.muted),
            palette,
        ));
        lines.push(Line::from(spans));
    }
    ListItem::new(lines)
}

fn highlight_spans(
    text: &str,
    highlighter: Option<&Regex>,
    base_style: Style,
    palette: &Palette,
) -> Vec<Span<'static>> {
    let highlight_style = Style::default()
        .fg(palette.highlight)
        .add_modifier(Modifier::BOLD);
    split_matches(text, highlighter)
        .into_iter()
        .map(|(run, matched)| {
            Span::styled(
                run.to_string(),
                if matched { highlight_style } else { base_style },
            )
        })
        .collect()
}

fn build_status_line(state: &AppState, palette: &Palette) -> Text<'static> {
    let mut spans = Vec::new();
    if state.pending() > 0 {
        spans.push(Span::styled(
            format!("⟳ {} pending  ", state.pending()),
            Style::default().fg(palette.highlight),
        ));
    }
    if let Some(message) = state.status_message() {
        spans.push(Span::styled(
            message.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
    }
    let keys = "a new • e edit • d delete • p pin • A archive • J/K move • H archived • / search • Enter open • D theme • Ctrl-r refresh • L logout • q quit";
    Text::from(vec![
        Line::from(spans),
        Line::from(Span::styled(keys, Style::default().fg(palette.muted))),
    ])
}

fn draw_form(frame: &mut Frame, form: &NoteForm, palette: &Palette) {
    let area = centered_rect(70, 70, frame.size());
    let fields = [
        (FormField::Title, "Title", form.title.as_str()),
        (FormField::Body, "Body", form.body.as_str()),
        (FormField::Color, "Color (e.g. #FFDD57)", form.color.as_str()),
        (FormField::Images, "Images (comma separated paths)", form.images.as_str()),
    ];
    let mut lines = Vec::new();
    for (field, label, value) in fields {
        let focused = form.focus == field;
        let label_style = if focused {
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(palette.muted)
        };
        lines.push(Line::from(Span::styled(label, label_style)));
        let mut value_lines: Vec<&str> = value.split('\n').collect();
        if value_lines.is_empty() {
            value_lines.push("");
        }
        for (idx, text) in value_lines.iter().enumerate() {
            let marker = if focused && idx + 1 == value_lines.len() {
                "▏"
            } else {
                ""
            };
            lines.push(Line::from(format!("  {text}{marker}")));
        }
        lines.push(Line::from(""));
    }
    lines.push(Line::from(Span::styled(
        "Tab next field • Enter new line / next • Ctrl-s save • Esc cancel",
        Style::default().fg(palette.muted),
    )));
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false }).block(
        Block::default()
            .title(form.heading())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.accent)),
    );
    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

fn draw_confirm(frame: &mut Frame, title: &str, palette: &Palette) {
    let area = centered_rect(50, 20, frame.size());
    let lines = vec![
        Line::from("Are you sure you want to delete this note?"),
        Line::from(Span::styled(
            title.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "y / Enter delete • n / Esc keep",
            Style::default().fg(palette.muted),
        )),
    ];
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: true }).block(
        Block::default()
            .title("Delete note")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.danger)),
    );
    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

fn draw_detail(
    frame: &mut Frame,
    note: &Note,
    state: &AppState,
    highlighter: Option<&Regex>,
    palette: &Palette,
) {
    let area = centered_rect(80, 80, frame.size());
    let mut lines = vec![Line::from(highlight_spans(
        &note.title,
        highlighter,
        Style::default().add_modifier(Modifier::BOLD),
        palette,
    ))];
    let mut meta = Vec::new();
    if note.pinned {
        meta.push("pinned".to_string());
    }
    if note.archived {
        meta.push("archived".to_string());
    }
    if let Some(color) = &note.color {
        meta.push(format!("color {color}"));
    }
    if !meta.is_empty() {
        lines.push(Line::from(Span::styled(
            meta.join(" • "),
            Style::default().fg(palette.muted),
        )));
    }
    if let Some(url) = note.attachment_url(&state.uploads_url) {
        lines.push(Line::from(Span::styled(
            format!("image {url}"),
            Style::default().fg(palette.accent),
        )));
    }
    lines.push(Line::from(""));
    for line in note.body.lines() {
        lines.push(Line::from(highlight_spans(
            line,
            highlighter,
            Style::default(),
            palette,
        )));
    }
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false }).block(
        Block::default()
            .title("Note • Esc close")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.accent)),
    );
    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

fn draw_notice(frame: &mut Frame, kind: NoticeKind, message: &str, palette: &Palette) {
    let area = centered_rect(50, 20, frame.size());
    let (title, color) = match kind {
        NoticeKind::Error => ("Error", palette.danger),
        NoticeKind::Info => ("Notice", palette.accent),
    };
    let lines = vec![
        Line::from(message.to_string()),
        Line::from(""),
        Line::from(Span::styled(
            "Enter / Esc to dismiss",
            Style::default().fg(palette.muted),
        )),
    ];
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: true }).block(
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color).add_modifier(Modifier::BOLD)),
    );
    frame.render_widget(Clear, area);
    frame.render_widget(paragraph, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThemeName;
    use crate::notes::collection::note;
    use crate::session::SessionStore;
    use ratatui::backend::TestBackend;
    use ratatui::buffer::Buffer;
    use ratatui::Terminal;
    use tempfile::TempDir;

    fn span_texts(spans: &[Span<'static>]) -> Vec<String> {
        spans
            .iter()
            .map(|span| span.content.clone().into_owned())
            .collect()
    }

    fn buffer_text(buffer: &Buffer) -> String {
        let area = buffer.area;
        let mut out = String::new();
        for y in area.top()..area.bottom() {
            for x in area.left()..area.right() {
                out.push_str(buffer.get(x, y).symbol());
            }
            out.push('\n');
        }
        out
    }

    #[test]
    fn highlight_spans_split_on_search_term() {
        let regex = search_highlighter("note").expect("regex");
        let spans = highlight_spans(
            "Notebook notes",
            Some(&regex),
            Style::default(),
            &ThemeName::Dark.palette(),
        );
        assert_eq!(span_texts(&spans), vec!["Note", "book ", "note", "s"]);
    }

    #[test]
    fn dashboard_renders_sections_in_display_order() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let session = SessionStore::open(temp.path().join("session.json"))?.into_handle();
        let mut controller = NoteController::new(session);
        controller.collection_mut().replace_all(vec![
            note(1, "Groceries", "milk", false, false),
            note(2, "Taxes", "", true, false),
            note(3, "Old trip", "", false, true),
        ]);
        let state = AppState::new(Screen::Dashboard, ThemeName::Dark, 1, String::new());
        let mut list_state = ListState::default();
        let mut terminal = Terminal::new(TestBackend::new(100, 20))?;
        terminal.draw(|frame| draw_app(frame, &state, &controller, &mut list_state))?;

        let text = buffer_text(terminal.backend().buffer());
        let pinned = text.find("Pinned (1)").expect("pinned header");
        let notes = text.find("Notes (1)").expect("notes header");
        assert!(pinned < notes);
        assert!(text.contains("Taxes"));
        assert!(!text.contains("Old trip"));
        assert_eq!(list_state.selected(), Some(1));
        Ok(())
    }

    #[test]
    fn auth_screen_masks_the_password() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let session = SessionStore::open(temp.path().join("session.json"))?.into_handle();
        let controller = NoteController::new(session);
        let mut state = AppState::new(Screen::Auth, ThemeName::Light, 1, String::new());
        state.auth.email = "ada@example.com".into();
        state.auth.password = "hunter2".into();
        let mut list_state = ListState::default();
        let mut terminal = Terminal::new(TestBackend::new(100, 30))?;
        terminal.draw(|frame| draw_app(frame, &state, &controller, &mut list_state))?;

        let text = buffer_text(terminal.backend().buffer());
        assert!(text.contains("ada@example.com"));
        assert!(!text.contains("hunter2"));
        assert!(text.contains("•••••••"));
        Ok(())
    }
}
