use std::collections::VecDeque;
use std::path::PathBuf;

use anyhow::Result;
use strum::Display;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::ThemeName;
use crate::notes::{Attachment, NoteCollection, NoteDraft, NoteId};

const MAX_TITLE_LEN: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Auth,
    Dashboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum AuthMode {
    Login,
    Register,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum AuthField {
    Name,
    Email,
    Password,
}

#[derive(Debug, Clone)]
pub struct AuthForm {
    pub mode: AuthMode,
    pub name: String,
    pub email: String,
    pub password: String,
    pub focus: AuthField,
}

impl Default for AuthForm {
    fn default() -> Self {
        Self {
            mode: AuthMode::Login,
            name: String::new(),
            email: String::new(),
            password: String::new(),
            focus: AuthField::Email,
        }
    }
}

impl AuthForm {
    pub fn fields(&self) -> &'static [AuthField] {
        match self.mode {
            AuthMode::Login => &[AuthField::Email, AuthField::Password],
            AuthMode::Register => &[AuthField::Name, AuthField::Email, AuthField::Password],
        }
    }

    pub fn value(&self, field: AuthField) -> &str {
        match field {
            AuthField::Name => &self.name,
            AuthField::Email => &self.email,
            AuthField::Password => &self.password,
        }
    }

    fn value_mut(&mut self) -> &mut String {
        match self.focus {
            AuthField::Name => &mut self.name,
            AuthField::Email => &mut self.email,
            AuthField::Password => &mut self.password,
        }
    }

    pub fn push_char(&mut self, ch: char) {
        self.value_mut().push(ch);
    }

    pub fn pop_char(&mut self) {
        pop_grapheme(self.value_mut());
    }

    pub fn focus_next(&mut self, delta: isize) {
        let fields = self.fields();
        let current = fields.iter().position(|f| *f == self.focus).unwrap_or(0) as isize;
        let len = fields.len() as isize;
        self.focus = fields[(current + delta).rem_euclid(len) as usize];
    }

    pub fn is_last_field(&self) -> bool {
        self.fields().last() == Some(&self.focus)
    }

    /// Switches between sign-in and sign-up, keeping the email.
    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            AuthMode::Login => AuthMode::Register,
            AuthMode::Register => AuthMode::Login,
        };
        self.password.clear();
        self.focus = self.fields()[0];
    }

    pub fn reset_to_login(&mut self) {
        let email = std::mem::take(&mut self.email);
        *self = Self {
            email,
            ..Self::default()
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FormField {
    Title,
    Body,
    Color,
    Images,
}

impl FormField {
    const ORDER: [FormField; 4] = [
        FormField::Title,
        FormField::Body,
        FormField::Color,
        FormField::Images,
    ];
}

/// Contents of the create/edit overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteForm {
    pub editing: Option<NoteId>,
    pub title: String,
    pub body: String,
    pub color: String,
    /// Comma separated file paths to upload.
    pub images: String,
    pub focus: FormField,
}

impl NoteForm {
    pub fn blank() -> Self {
        Self::from_draft(None, NoteDraft::default())
    }

    pub fn from_draft(editing: Option<NoteId>, draft: NoteDraft) -> Self {
        Self {
            editing,
            title: draft.title,
            body: draft.body,
            color: draft.color.unwrap_or_default(),
            images: String::new(),
            focus: FormField::Title,
        }
    }

    pub fn heading(&self) -> &'static str {
        if self.editing.is_some() {
            "Edit note"
        } else {
            "New note"
        }
    }

    pub fn image_paths(&self) -> Vec<PathBuf> {
        self.images
            .split(',')
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .collect()
    }

    /// Builds the submission, reading any attached files from disk.
    pub fn to_draft(&self) -> Result<NoteDraft> {
        let attachments = self
            .image_paths()
            .iter()
            .map(|path| Attachment::from_path(path))
            .collect::<Result<Vec<_>>>()?;
        let color = self.color.trim();
        Ok(NoteDraft {
            title: self.title.clone(),
            body: self.body.clone(),
            color: (!color.is_empty()).then(|| color.to_string()),
            attachments,
        })
    }

    pub fn focus_next(&mut self, delta: isize) {
        let current = FormField::ORDER
            .iter()
            .position(|field| *field == self.focus)
            .unwrap_or(0) as isize;
        let len = FormField::ORDER.len() as isize;
        self.focus = FormField::ORDER[(current + delta).rem_euclid(len) as usize];
    }

    pub fn push_char(&mut self, ch: char) {
        match self.focus {
            FormField::Title => {
                if self.title.chars().count() < MAX_TITLE_LEN {
                    self.title.push(ch);
                }
            }
            FormField::Body => self.body.push(ch),
            FormField::Color => self.color.push(ch),
            FormField::Images => self.images.push(ch),
        }
    }

    pub fn pop_char(&mut self) {
        let value = match self.focus {
            FormField::Title => &mut self.title,
            FormField::Body => &mut self.body,
            FormField::Color => &mut self.color,
            FormField::Images => &mut self.images,
        };
        pop_grapheme(value);
    }

    /// Only the body takes multiple lines.
    pub fn newline(&mut self) -> bool {
        if self.focus == FormField::Body {
            self.body.push('\n');
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
}

/// A blocking message; nothing else takes input until it is dismissed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Overlay {
    Form(NoteForm),
    ConfirmDelete { id: NoteId, title: String },
    Detail(NoteId),
}

#[derive(Debug)]
pub struct AppState {
    pub screen: Screen,
    pub auth: AuthForm,
    pub theme: ThemeName,
    pub preview_lines: usize,
    pub uploads_url: String,
    pub selected: usize,
    search_active: bool,
    overlay: Option<Overlay>,
    notices: VecDeque<Notice>,
    status_message: Option<String>,
    pending: usize,
}

impl AppState {
    pub fn new(screen: Screen, theme: ThemeName, preview_lines: usize, uploads_url: String) -> Self {
        Self {
            screen,
            auth: AuthForm::default(),
            theme,
            preview_lines,
            uploads_url,
            selected: 0,
            search_active: false,
            overlay: None,
            notices: VecDeque::new(),
            status_message: None,
            pending: 0,
        }
    }

    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    pub fn overlay_mut(&mut self) -> Option<&mut Overlay> {
        self.overlay.as_mut()
    }

    pub fn open_overlay(&mut self, overlay: Overlay) {
        self.overlay = Some(overlay);
    }

    pub fn close_overlay(&mut self) -> Option<Overlay> {
        self.overlay.take()
    }

    pub fn form_mut(&mut self) -> Option<&mut NoteForm> {
        match self.overlay.as_mut() {
            Some(Overlay::Form(form)) => Some(form),
            _ => None,
        }
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notices.front()
    }

    pub fn push_notice(&mut self, kind: NoticeKind, message: impl Into<String>) {
        self.notices.push_back(Notice {
            kind,
            message: message.into(),
        });
    }

    pub fn dismiss_notice(&mut self) -> Option<Notice> {
        self.notices.pop_front()
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn set_status_message<S: Into<String>>(&mut self, message: Option<S>) {
        self.status_message = message.map(Into::into);
    }

    pub fn is_search_active(&self) -> bool {
        self.search_active
    }

    pub fn set_search_active(&mut self, active: bool) {
        self.search_active = active;
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn set_pending(&mut self, pending: usize) {
        self.pending = pending;
    }

    pub fn selected_id(&self, collection: &NoteCollection) -> Option<NoteId> {
        collection
            .visible()
            .get(self.selected)
            .map(|note| note.id.clone())
    }

    pub fn move_selection(&mut self, delta: isize, len: usize) {
        if len == 0 {
            self.selected = 0;
            return;
        }
        let next = (self.selected as isize + delta).clamp(0, len as isize - 1);
        self.selected = next as usize;
    }

    pub fn clamp_selection(&mut self, len: usize) {
        self.selected = self.selected.min(len.saturating_sub(1));
    }

    pub fn select_id(&mut self, collection: &NoteCollection, id: &NoteId) {
        if let Some(index) = collection.visible().iter().position(|note| &note.id == id) {
            self.selected = index;
        }
    }

    /// Drops everything tied to the signed-in user.
    pub fn sign_out(&mut self) {
        self.screen = Screen::Auth;
        self.auth.reset_to_login();
        self.overlay = None;
        self.search_active = false;
        self.selected = 0;
        self.status_message = None;
    }
}

/// Removes the last grapheme cluster.
pub fn pop_grapheme(text: &mut String) {
    if let Some((offset, _)) = text.grapheme_indices(true).next_back() {
        text.truncate(offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::collection::note;
    use tempfile::TempDir;

    #[test]
    fn auth_form_cycles_only_visible_fields() {
        let mut form = AuthForm::default();
        assert_eq!(form.focus, AuthField::Email);
        form.focus_next(1);
        assert_eq!(form.focus, AuthField::Password);
        assert!(form.is_last_field());
        form.focus_next(1);
        assert_eq!(form.focus, AuthField::Email);

        form.push_char('a');
        form.toggle_mode();
        assert_eq!(form.mode, AuthMode::Register);
        assert_eq!(form.focus, AuthField::Name);
        assert_eq!(form.email, "a");
        form.focus_next(-1);
        assert_eq!(form.focus, AuthField::Password);
    }

    #[test]
    fn note_form_round_trips_through_a_draft() -> anyhow::Result<()> {
        let mut draft = NoteDraft::new("Trip", "pack");
        draft.color = Some("#ffdd57".into());
        let form = NoteForm::from_draft(Some(NoteId::from(3)), draft.clone());
        assert_eq!(form.heading(), "Edit note");
        assert_eq!(form.to_draft()?, draft);
        Ok(())
    }

    #[test]
    fn note_form_reads_listed_images() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let first = temp.path().join("a.png");
        let second = temp.path().join("b.gif");
        std::fs::write(&first, [1u8])?;
        std::fs::write(&second, [2u8])?;
        let mut form = NoteForm::blank();
        form.title = "Pics".into();
        form.images = format!(" {}, ,{} ", first.display(), second.display());
        let draft = form.to_draft()?;
        assert_eq!(draft.attachments.len(), 2);
        assert_eq!(draft.attachments[1].content_type.as_deref(), Some("image/gif"));

        form.images = temp.path().join("missing.png").display().to_string();
        assert!(form.to_draft().is_err());
        Ok(())
    }

    #[test]
    fn note_form_only_breaks_lines_in_the_body() {
        let mut form = NoteForm::blank();
        assert!(!form.newline());
        form.focus_next(1);
        assert_eq!(form.focus, FormField::Body);
        assert!(form.newline());
        form.push_char('x');
        assert_eq!(form.body, "\nx");
        form.focus_next(-2);
        assert_eq!(form.focus, FormField::Images);
    }

    #[test]
    fn selection_follows_visible_order() {
        let collection = NoteCollection::from_notes(vec![
            note(1, "a", "", false, false),
            note(2, "b", "", true, false),
        ]);
        let mut state = AppState::new(Screen::Dashboard, ThemeName::Dark, 2, String::new());
        assert_eq!(state.selected_id(&collection), Some(NoteId::from(2)));
        state.move_selection(5, collection.visible().len());
        assert_eq!(state.selected_id(&collection), Some(NoteId::from(1)));
        state.select_id(&collection, &NoteId::from(2));
        assert_eq!(state.selected, 0);
    }

    #[test]
    fn notices_queue_in_order() {
        let mut state = AppState::new(Screen::Auth, ThemeName::Dark, 2, String::new());
        state.push_notice(NoticeKind::Error, "first");
        state.push_notice(NoticeKind::Info, "second");
        assert_eq!(state.dismiss_notice().map(|n| n.message), Some("first".into()));
        assert_eq!(state.notice().map(|n| n.kind), Some(NoticeKind::Info));
    }
}
