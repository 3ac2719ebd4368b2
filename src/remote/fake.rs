use std::collections::HashSet;

use parking_lot::Mutex;

use crate::notes::{Identity, Note, NoteDraft, NoteId};
use crate::remote::{RemoteError, RemoteStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Op {
    Identity,
    List,
    Create,
    Update,
    Delete,
    TogglePin,
    ToggleArchive,
    PersistOrder,
    Login,
    Register,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Identity,
    List,
    Create { title: String, attachments: usize },
    Update(NoteId),
    Delete(NoteId),
    TogglePin(NoteId),
    ToggleArchive(NoteId),
    PersistOrder(Vec<NoteId>),
    Login(String),
    Register(String),
}

#[derive(Debug, Default)]
struct FakeState {
    notes: Vec<Note>,
    next_id: i64,
    calls: Vec<Call>,
    failing: HashSet<Op>,
}

/// In-memory backend that records every call and can be told to fail.
#[derive(Debug, Default)]
pub(crate) struct FakeRemote {
    state: Mutex<FakeState>,
}

impl FakeRemote {
    pub(crate) fn with_notes(notes: Vec<Note>) -> Self {
        let next_id = notes.len() as i64 + 100;
        Self {
            state: Mutex::new(FakeState {
                notes,
                next_id,
                ..FakeState::default()
            }),
        }
    }

    pub(crate) fn fail(&self, op: Op) {
        self.state.lock().failing.insert(op);
    }

    pub(crate) fn recover(&self, op: Op) {
        self.state.lock().failing.remove(&op);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub(crate) fn server_notes(&self) -> Vec<Note> {
        self.state.lock().notes.clone()
    }

    fn record(&self, op: Op, call: Call) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if !state.failing.contains(&op) {
            return Ok(());
        }
        match op {
            Op::Identity => Err(RemoteError::Unauthorized),
            _ => Err(RemoteError::Status {
                status: 500,
                message: Some(format!("{op:?} exploded")),
            }),
        }
    }

    fn with_note<F>(&self, id: &NoteId, f: F) -> Result<Note, RemoteError>
    where
        F: FnOnce(&mut Note),
    {
        let mut state = self.state.lock();
        let note = state
            .notes
            .iter_mut()
            .find(|note| &note.id == id)
            .ok_or(RemoteError::Status {
                status: 404,
                message: Some("Note not found".into()),
            })?;
        f(note);
        Ok(note.clone())
    }
}

impl RemoteStore for FakeRemote {
    fn identity(&self) -> Result<Identity, RemoteError> {
        self.record(Op::Identity, Call::Identity)?;
        Ok(Identity {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            profile_image: None,
        })
    }

    fn list_notes(&self) -> Result<Vec<Note>, RemoteError> {
        self.record(Op::List, Call::List)?;
        Ok(self.server_notes())
    }

    fn create_note(&self, draft: &NoteDraft) -> Result<Note, RemoteError> {
        self.record(
            Op::Create,
            Call::Create {
                title: draft.title.clone(),
                attachments: draft.attachments.len(),
            },
        )?;
        let mut state = self.state.lock();
        state.next_id += 1;
        let note = Note {
            id: NoteId::from(state.next_id),
            title: draft.title.clone(),
            body: draft.body.clone(),
            color: draft.color.clone(),
            image: draft.attachments.first().map(|a| a.file_name.clone()),
            pinned: false,
            archived: false,
        };
        state.notes.push(note.clone());
        Ok(note)
    }

    fn update_note(&self, id: &NoteId, draft: &NoteDraft) -> Result<Note, RemoteError> {
        self.record(Op::Update, Call::Update(id.clone()))?;
        self.with_note(id, |note| {
            note.title = draft.title.clone();
            note.body = draft.body.clone();
            note.color = draft.color.clone();
        })
    }

    fn delete_note(&self, id: &NoteId) -> Result<(), RemoteError> {
        self.record(Op::Delete, Call::Delete(id.clone()))?;
        self.state.lock().notes.retain(|note| &note.id != id);
        Ok(())
    }

    fn toggle_pin(&self, id: &NoteId) -> Result<(), RemoteError> {
        self.record(Op::TogglePin, Call::TogglePin(id.clone()))?;
        self.with_note(id, |note| note.pinned = !note.pinned)
            .map(|_| ())
    }

    fn toggle_archive(&self, id: &NoteId) -> Result<(), RemoteError> {
        self.record(Op::ToggleArchive, Call::ToggleArchive(id.clone()))?;
        self.with_note(id, |note| note.archived = !note.archived)
            .map(|_| ())
    }

    fn persist_order(&self, ordered: &[NoteId]) -> Result<(), RemoteError> {
        self.record(Op::PersistOrder, Call::PersistOrder(ordered.to_vec()))?;
        let mut state = self.state.lock();
        state.notes.sort_by_key(|note| {
            ordered
                .iter()
                .position(|id| id == &note.id)
                .unwrap_or(usize::MAX)
        });
        Ok(())
    }

    fn login(&self, email: &str, _password: &str) -> Result<String, RemoteError> {
        self.record(Op::Login, Call::Login(email.to_string()))?;
        Ok(format!("token-for-{email}"))
    }

    fn register(&self, _name: &str, email: &str, _password: &str) -> Result<(), RemoteError> {
        self.record(Op::Register, Call::Register(email.to_string()))
    }
}
