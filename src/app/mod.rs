use std::collections::{HashMap, HashSet};
use std::io::Stdout;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::ListState;
use ratatui::Terminal;

use crate::cli::commands::Workspace;
use crate::dispatch::{Completion, Dispatcher, Ticket};
use crate::notes::{DragSlot, Group, Job, NoteController, NoteId, NotesError, ToggleFlag};
use crate::session::auth;
use crate::ui;

pub mod state;

pub use state::{
    AppState, AuthField, AuthForm, AuthMode, FormField, NoteForm, Notice, NoticeKind, Overlay,
    Screen,
};

enum Action {
    Quit,
    SelectNext,
    SelectPrevious,
    Refresh,
    NewNote,
    EditNote,
    StartSearch,
    TogglePin,
    ToggleArchive,
    DeleteNote,
    MoveDown,
    MoveUp,
    ToggleShowArchived,
    OpenDetail,
    ToggleTheme,
    Logout,
}

pub struct App {
    ws: Workspace,
    controller: NoteController,
    dispatcher: Dispatcher,
    state: AppState,
    list_state: ListState,
    should_quit: bool,
    tick_rate: Duration,
    // Forms behind in-flight saves, reopened if the save fails.
    pending_forms: HashMap<Ticket, NoteForm>,
    // Tickets issued in the current session; anything else is from before a sign-out.
    live_tickets: HashSet<Ticket>,
}

impl App {
    pub fn new(ws: Workspace) -> Result<Self> {
        let config = ws.config.clone();
        let mut controller = NoteController::new(ws.session.clone());
        controller
            .collection_mut()
            .set_show_archived(config.dashboard.show_archived);
        let dispatcher = Dispatcher::spawn(ws.remote.clone(), config.remote.workers)
            .context("starting remote workers")?;
        let (signed_in, theme) = {
            let session = ws.session.read();
            (session.is_signed_in(), session.theme().unwrap_or(config.theme))
        };
        let screen = if signed_in {
            Screen::Dashboard
        } else {
            Screen::Auth
        };
        let state = AppState::new(
            screen,
            theme,
            config.preview_lines as usize,
            config.remote.uploads_url.clone(),
        );
        let mut app = Self {
            ws,
            controller,
            dispatcher,
            state,
            list_state: ListState::default(),
            should_quit: false,
            tick_rate: Duration::from_millis(100),
            pending_forms: HashMap::new(),
            live_tickets: HashSet::new(),
        };
        if signed_in {
            let job = app.controller.begin_load();
            app.submit(job);
        }
        Ok(app)
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        restore_terminal(&mut terminal)?;
        result
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn controller(&self) -> &NoteController {
        &self.controller
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        loop {
            terminal
                .draw(|frame| {
                    ui::draw_app(frame, &self.state, &self.controller, &mut self.list_state)
                })
                .context("rendering frame")?;

            if self.should_quit {
                break;
            }

            let timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(0));

            if event::poll(timeout).context("polling for terminal events")? {
                if let Event::Key(key) = event::read().context("reading terminal event")? {
                    self.handle_key(key);
                }
            }

            if last_tick.elapsed() >= self.tick_rate {
                self.on_tick();
                last_tick = Instant::now();
            }
        }
        Ok(())
    }

    fn on_tick(&mut self) {
        while let Some(completion) = self.dispatcher.try_next() {
            self.apply_completion(completion);
        }
        self.state.set_pending(self.dispatcher.in_flight());
    }

    fn submit(&mut self, job: Job) -> Option<Ticket> {
        match self.dispatcher.submit(job) {
            Ok(ticket) => {
                self.live_tickets.insert(ticket);
                self.state.set_pending(self.dispatcher.in_flight());
                Some(ticket)
            }
            Err(err) => {
                tracing::error!(?err, "failed to queue remote job");
                self.state
                    .push_notice(NoticeKind::Error, "Could not reach the background workers.");
                None
            }
        }
    }

    fn apply_completion(&mut self, completion: Completion) {
        let Completion {
            ticket,
            job,
            result,
            elapsed,
        } = completion;
        if !self.live_tickets.remove(&ticket) {
            tracing::debug!(%ticket, job = job.label(), "discarding completion from an ended session");
            return;
        }
        tracing::debug!(%ticket, job = job.label(), ?elapsed, "applying completion");
        let form = self.pending_forms.remove(&ticket);
        let selected = self.state.selected_id(self.controller.collection());
        match self.controller.complete(&job, result) {
            Ok(next) => {
                if let Some(message) = success_message(&job) {
                    self.state.set_status_message(Some(message));
                }
                if let Some(next) = next {
                    self.submit(next);
                }
            }
            Err(err) => self.report(err, form),
        }
        self.close_dangling_overlay();
        let collection = self.controller.collection();
        if let Some(id) = selected {
            self.state.select_id(collection, &id);
        }
        self.state.clamp_selection(collection.visible().len());
    }

    /// Closes an overlay whose note is no longer in the collection.
    fn close_dangling_overlay(&mut self) {
        let collection = self.controller.collection();
        let dangling = match self.state.overlay() {
            Some(Overlay::Detail(id)) | Some(Overlay::ConfirmDelete { id, .. }) => {
                !collection.contains(id)
            }
            Some(Overlay::Form(form)) => form
                .editing
                .as_ref()
                .is_some_and(|id| !collection.contains(id)),
            None => false,
        };
        if !dangling {
            return;
        }
        match self.state.close_overlay() {
            Some(Overlay::Form(_)) => self.controller.cancel_edit(),
            Some(Overlay::Detail(_)) => self.controller.close_view(),
            _ => {}
        }
        self.state
            .set_status_message(Some("That note is no longer available"));
    }

    fn end_session(&mut self) {
        self.controller.reset();
        self.pending_forms.clear();
        self.live_tickets.clear();
        self.state.sign_out();
    }

    fn report(&mut self, err: NotesError, form: Option<NoteForm>) {
        if err.requires_login() {
            self.end_session();
        } else if let (NotesError::Save(_), Some(form)) = (&err, form) {
            if self.state.overlay().is_none() {
                self.state.open_overlay(Overlay::Form(form));
            }
        }
        self.state.push_notice(NoticeKind::Error, err.to_string());
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }
        if self.state.notice().is_some() {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
                self.state.dismiss_notice();
            }
            return;
        }
        match self.state.screen {
            Screen::Auth => self.handle_auth_key(key),
            Screen::Dashboard => {
                if self.handle_overlay_key(key) {
                    return;
                }
                if self.state.is_search_active() && self.handle_search_key(key) {
                    return;
                }
                if let Some(action) = dashboard_action(key) {
                    self.handle_action(action);
                }
            }
        }
    }

    fn handle_auth_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('t') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.state.auth.toggle_mode();
            }
            KeyCode::Tab | KeyCode::Down => self.state.auth.focus_next(1),
            KeyCode::BackTab | KeyCode::Up => self.state.auth.focus_next(-1),
            KeyCode::Enter => {
                if self.state.auth.is_last_field() {
                    self.submit_auth();
                } else {
                    self.state.auth.focus_next(1);
                }
            }
            KeyCode::Backspace => self.state.auth.pop_char(),
            KeyCode::Char(ch) if !has_command_modifier(key) => self.state.auth.push_char(ch),
            _ => {}
        }
    }

    fn submit_auth(&mut self) {
        let form = self.state.auth.clone();
        let remote = self.ws.remote.as_ref();
        match form.mode {
            AuthMode::Login => {
                match auth::login(remote, &self.ws.session, &form.email, &form.password) {
                    Ok(()) => {
                        self.state.auth.password.clear();
                        self.state.screen = Screen::Dashboard;
                        self.state.set_status_message(Some("Signed in"));
                        let job = self.controller.begin_load();
                        self.submit(job);
                    }
                    Err(err) => self.state.push_notice(NoticeKind::Error, err.to_string()),
                }
            }
            AuthMode::Register => {
                match auth::register(remote, &form.name, &form.email, &form.password) {
                    Ok(()) => {
                        self.state.auth.reset_to_login();
                        self.state.push_notice(
                            NoticeKind::Info,
                            "Registration successful! Please login.",
                        );
                    }
                    Err(err) => self.state.push_notice(NoticeKind::Error, err.to_string()),
                }
            }
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) -> bool {
        let collection = self.controller.collection_mut();
        match key.code {
            KeyCode::Esc => {
                collection.set_search_term("");
                self.state.set_search_active(false);
            }
            KeyCode::Enter => self.state.set_search_active(false),
            KeyCode::Backspace => {
                let mut term = collection.search_term().to_string();
                state::pop_grapheme(&mut term);
                collection.set_search_term(term);
            }
            KeyCode::Char(ch) if !has_command_modifier(key) => {
                let term = format!("{}{ch}", collection.search_term());
                collection.set_search_term(term);
            }
            _ => return false,
        }
        self.state.selected = 0;
        true
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) -> bool {
        let Some(overlay) = self.state.overlay().cloned() else {
            return false;
        };
        match overlay {
            Overlay::Form(_) => self.handle_form_key(key),
            Overlay::ConfirmDelete { id, .. } => match key.code {
                KeyCode::Char('y') | KeyCode::Enter => {
                    self.state.close_overlay();
                    match self.controller.begin_delete(id, |_| true) {
                        Ok(Some(job)) => {
                            self.submit(job);
                        }
                        Ok(None) => {}
                        Err(err) => self.report(err, None),
                    }
                }
                KeyCode::Char('n') | KeyCode::Esc => {
                    self.state.close_overlay();
                    self.state.set_status_message(Some("Delete canceled"));
                }
                _ => {}
            },
            Overlay::Detail(_) => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')) {
                    self.state.close_overlay();
                    self.controller.close_view();
                }
            }
        }
        true
    }

    fn handle_form_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.state.close_overlay();
                self.controller.cancel_edit();
                self.state.set_status_message(Some("Canceled"));
            }
            KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.submit_form();
            }
            KeyCode::Tab => self.with_form(|form| form.focus_next(1)),
            KeyCode::BackTab => self.with_form(|form| form.focus_next(-1)),
            KeyCode::Enter => {
                let mut advanced = false;
                self.with_form(|form| {
                    if !form.newline() {
                        advanced = form.focus == FormField::Images;
                        if !advanced {
                            form.focus_next(1);
                        }
                    }
                });
                if advanced {
                    self.submit_form();
                }
            }
            KeyCode::Backspace => self.with_form(NoteForm::pop_char),
            KeyCode::Char(ch) if !has_command_modifier(key) => {
                self.with_form(|form| form.push_char(ch))
            }
            _ => {}
        }
    }

    fn with_form<F: FnOnce(&mut NoteForm)>(&mut self, f: F) {
        if let Some(form) = self.state.form_mut() {
            f(form);
        }
    }

    fn submit_form(&mut self) {
        let Some(Overlay::Form(form)) = self.state.overlay().cloned() else {
            return;
        };
        let draft = match form.to_draft() {
            Ok(draft) => draft,
            Err(err) => {
                tracing::warn!(?err, "failed to read attachments");
                self.state
                    .push_notice(NoticeKind::Error, format!("Could not attach images: {err:#}"));
                return;
            }
        };
        let job = match form.editing.clone() {
            Some(id) => self.controller.begin_update(id, draft),
            None => self.controller.begin_create(draft),
        };
        match job {
            Ok(job) => {
                self.state.close_overlay();
                self.state.set_status_message(Some("Saving..."));
                if let Some(ticket) = self.submit(job) {
                    self.pending_forms.insert(ticket, form);
                }
            }
            // The form stays open so the user can fix it.
            Err(err) => self.state.push_notice(NoticeKind::Error, err.to_string()),
        }
    }

    fn handle_action(&mut self, action: Action) {
        let selected = self.state.selected_id(self.controller.collection());
        match action {
            Action::Quit => self.should_quit = true,
            Action::SelectNext => {
                let len = self.controller.collection().visible().len();
                self.state.move_selection(1, len);
            }
            Action::SelectPrevious => {
                let len = self.controller.collection().visible().len();
                self.state.move_selection(-1, len);
            }
            Action::Refresh => {
                let job = self.controller.begin_refresh();
                self.submit(job);
                self.state.set_status_message(Some("Refreshing..."));
            }
            Action::NewNote => self.state.open_overlay(Overlay::Form(NoteForm::blank())),
            Action::EditNote => {
                if let Some(id) = selected {
                    if let Some(draft) = self.controller.begin_edit(&id) {
                        self.state
                            .open_overlay(Overlay::Form(NoteForm::from_draft(Some(id), draft)));
                    }
                }
            }
            Action::StartSearch => self.state.set_search_active(true),
            Action::TogglePin | Action::ToggleArchive => {
                let flag = if matches!(action, Action::TogglePin) {
                    ToggleFlag::Pin
                } else {
                    ToggleFlag::Archive
                };
                if let Some(id) = selected {
                    match self.controller.begin_toggle(id, flag) {
                        Ok(job) => {
                            self.submit(job);
                        }
                        Err(err) => self.report(err, None),
                    }
                }
            }
            Action::DeleteNote => {
                if let Some(note) = selected.and_then(|id| self.controller.collection().get(&id))
                {
                    let overlay = Overlay::ConfirmDelete {
                        id: note.id.clone(),
                        title: note.title.clone(),
                    };
                    self.state.open_overlay(overlay);
                }
            }
            Action::MoveDown | Action::MoveUp => {
                if let Some(id) = selected {
                    self.move_selected(&id, matches!(action, Action::MoveDown));
                }
            }
            Action::ToggleShowArchived => {
                let shown = self.controller.collection_mut().toggle_show_archived();
                self.state.set_status_message(Some(if shown {
                    "Showing archived notes"
                } else {
                    "Hiding archived notes"
                }));
                if let Some(id) = selected {
                    self.state.select_id(self.controller.collection(), &id);
                }
                let len = self.controller.collection().visible().len();
                self.state.clamp_selection(len);
            }
            Action::OpenDetail => {
                if let Some(id) = selected {
                    if self.controller.view(&id).is_some() {
                        self.state.open_overlay(Overlay::Detail(id));
                    }
                }
            }
            Action::ToggleTheme => {
                let theme = self.state.theme.toggled();
                self.state.theme = theme;
                if let Err(err) = self.ws.session.write().set_theme(theme) {
                    tracing::warn!(?err, "failed to persist theme preference");
                }
            }
            Action::Logout => {
                if let Err(err) = auth::logout(&self.ws.session) {
                    tracing::error!(?err, "failed to clear stored session");
                }
                self.end_session();
            }
        }
    }

    fn move_selected(&mut self, id: &NoteId, down: bool) {
        let collection = self.controller.collection();
        let Some(source) = collection.slot_of(id) else {
            return;
        };
        if source.group != Group::Unpinned {
            self.state
                .set_status_message(Some("Only notes in the Notes section can be reordered"));
            return;
        }
        let destination = if down {
            source.index + 1
        } else {
            match source.index.checked_sub(1) {
                Some(index) => index,
                None => return,
            }
        };
        let destination = DragSlot::new(Group::Unpinned, destination);
        if let Some(job) = self.controller.begin_move(source, destination) {
            self.submit(job);
            self.state.select_id(self.controller.collection(), id);
        }
    }

    #[cfg(test)]
    fn settle(&mut self) {
        while !self.dispatcher.is_idle() {
            match self.dispatcher.next_timeout(Duration::from_secs(5)) {
                Some(completion) => self.apply_completion(completion),
                None => panic!("remote job did not finish"),
            }
        }
        self.state.set_pending(0);
    }
}

fn success_message(job: &Job) -> Option<&'static str> {
    match job {
        Job::Create(_) | Job::Update { .. } => Some("Note saved"),
        Job::Delete(_) => Some("Note deleted"),
        Job::Toggle {
            flag: ToggleFlag::Pin,
            ..
        } => Some("Pin toggled"),
        Job::Toggle {
            flag: ToggleFlag::Archive,
            ..
        } => Some("Archive toggled"),
        Job::PersistOrder(_) => Some("Order saved"),
        Job::FetchIdentity | Job::FetchNotes => None,
    }
}

fn has_command_modifier(key: KeyEvent) -> bool {
    key.modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER)
}

fn dashboard_action(key: KeyEvent) -> Option<Action> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('r') => Some(Action::Refresh),
            _ => None,
        };
    }
    if has_command_modifier(key) {
        return None;
    }
    let action = match key.code {
        KeyCode::Char('q') => Action::Quit,
        KeyCode::Char('j') | KeyCode::Down => Action::SelectNext,
        KeyCode::Char('k') | KeyCode::Up => Action::SelectPrevious,
        KeyCode::Char('a') => Action::NewNote,
        KeyCode::Char('e') => Action::EditNote,
        KeyCode::Char('/') => Action::StartSearch,
        KeyCode::Char('p') => Action::TogglePin,
        KeyCode::Char('A') => Action::ToggleArchive,
        KeyCode::Char('d') => Action::DeleteNote,
        KeyCode::Char('J') => Action::MoveDown,
        KeyCode::Char('K') => Action::MoveUp,
        KeyCode::Char('H') => Action::ToggleShowArchived,
        KeyCode::Enter => Action::OpenDetail,
        KeyCode::Char('D') => Action::ToggleTheme,
        KeyCode::Char('L') => Action::Logout,
        _ => return None,
    };
    Some(action)
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen).context("entering alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("creating terminal backend")
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode().context("disabling raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("leaving alternate screen")?;
    terminal.show_cursor().context("showing cursor")?;
    Ok(())
}
