use crate::notes::collection::{DragSlot, NoteCollection};
use crate::notes::error::{NotesError, ToggleFlag};
use crate::notes::{Identity, Note, NoteDraft, NoteId};
use crate::remote::{RemoteError, RemoteStore};
use crate::session::SessionHandle;

/// The remote half of a controller operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    FetchIdentity,
    FetchNotes,
    Create(NoteDraft),
    Update { id: NoteId, draft: NoteDraft },
    Delete(NoteId),
    Toggle { id: NoteId, flag: ToggleFlag },
    PersistOrder(Vec<NoteId>),
}

#[derive(Debug, Clone)]
pub enum JobOutput {
    Identity(Identity),
    Notes(Vec<Note>),
    Saved(Note),
    Done,
}

impl Job {
    pub fn label(&self) -> &'static str {
        match self {
            Job::FetchIdentity => "identity",
            Job::FetchNotes => "list notes",
            Job::Create(_) => "create note",
            Job::Update { .. } => "update note",
            Job::Delete(_) => "delete note",
            Job::Toggle {
                flag: ToggleFlag::Pin,
                ..
            } => "toggle pin",
            Job::Toggle {
                flag: ToggleFlag::Archive,
                ..
            } => "toggle archive",
            Job::PersistOrder(_) => "persist order",
        }
    }

    pub fn run(&self, remote: &dyn RemoteStore) -> Result<JobOutput, RemoteError> {
        match self {
            Job::FetchIdentity => remote.identity().map(JobOutput::Identity),
            Job::FetchNotes => remote.list_notes().map(JobOutput::Notes),
            Job::Create(draft) => remote.create_note(draft).map(JobOutput::Saved),
            Job::Update { id, draft } => remote.update_note(id, draft).map(JobOutput::Saved),
            Job::Delete(id) => remote.delete_note(id).map(|_| JobOutput::Done),
            Job::Toggle {
                id,
                flag: ToggleFlag::Pin,
            } => remote.toggle_pin(id).map(|_| JobOutput::Done),
            Job::Toggle {
                id,
                flag: ToggleFlag::Archive,
            } => remote.toggle_archive(id).map(|_| JobOutput::Done),
            Job::PersistOrder(ordered) => remote.persist_order(ordered).map(|_| JobOutput::Done),
        }
    }
}

/// Owns the signed-in user's notes and keeps them in step with the remote store.
///
/// Every operation is split in two. `begin_*` validates, asks for
/// confirmation and applies optimistic changes, returning the [`Job`] to run.
/// [`NoteController::complete`] folds the job's result back into local state and
/// may hand back a follow-up job (identity → list, save → list). The blocking
/// helpers (`load`, `create`, ...) drive that chain inline; the dashboard runs
/// jobs on the dispatcher instead. Results are applied in arrival order with
/// no cancellation, so a stale response overwrites newer state.
#[derive(Debug)]
pub struct NoteController {
    collection: NoteCollection,
    identity: Option<Identity>,
    session: SessionHandle,
}

impl NoteController {
    pub fn new(session: SessionHandle) -> Self {
        Self {
            collection: NoteCollection::new(),
            identity: None,
            session,
        }
    }

    pub fn collection(&self) -> &NoteCollection {
        &self.collection
    }

    pub fn collection_mut(&mut self) -> &mut NoteCollection {
        &mut self.collection
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Forgets everything tied to the current user.
    pub fn reset(&mut self) {
        self.collection.clear();
        self.identity = None;
    }

    pub fn begin_load(&self) -> Job {
        Job::FetchIdentity
    }

    pub fn begin_refresh(&self) -> Job {
        Job::FetchNotes
    }

    pub fn begin_create(&self, draft: NoteDraft) -> Result<Job, NotesError> {
        draft.validate()?;
        Ok(Job::Create(draft))
    }

    pub fn begin_update(&self, id: NoteId, draft: NoteDraft) -> Result<Job, NotesError> {
        draft.validate()?;
        self.require(&id)?;
        Ok(Job::Update { id, draft })
    }

    /// `confirm` is consulted before anything leaves the process; declining
    /// yields `Ok(None)` and leaves the list as it was.
    pub fn begin_delete<F>(&self, id: NoteId, confirm: F) -> Result<Option<Job>, NotesError>
    where
        F: FnOnce(&Note) -> bool,
    {
        let note = self.require(&id)?;
        if !confirm(note) {
            tracing::debug!(%id, "delete declined");
            return Ok(None);
        }
        Ok(Some(Job::Delete(id)))
    }

    pub fn begin_toggle(&self, id: NoteId, flag: ToggleFlag) -> Result<Job, NotesError> {
        self.require(&id)?;
        Ok(Job::Toggle { id, flag })
    }

    /// Applies `ordered` locally right away and returns the job persisting it.
    /// Anything but a permutation of the reorderable subset is ignored.
    pub fn begin_reorder(&mut self, ordered: Vec<NoteId>) -> Option<Job> {
        if !self.collection.apply_order(&ordered) {
            tracing::debug!(count = ordered.len(), "rejected reorder outside the unpinned set");
            return None;
        }
        Some(Job::PersistOrder(ordered))
    }

    pub fn begin_move(&mut self, source: DragSlot, destination: DragSlot) -> Option<Job> {
        let ordered = self.collection.plan_move(source, destination)?;
        self.begin_reorder(ordered)
    }

    /// Marks `id` as being edited and returns the form contents to start from.
    pub fn begin_edit(&mut self, id: &NoteId) -> Option<NoteDraft> {
        let draft = self.collection.get(id).map(NoteDraft::from_note)?;
        self.collection.set_editing(Some(id.clone()));
        Some(draft)
    }

    pub fn cancel_edit(&mut self) {
        self.collection.set_editing(None);
    }

    pub fn view(&mut self, id: &NoteId) -> Option<&Note> {
        self.collection.set_viewing(Some(id.clone()));
        self.collection.viewing()
    }

    pub fn close_view(&mut self) {
        self.collection.set_viewing(None);
    }

    pub fn complete(
        &mut self,
        job: &Job,
        result: Result<JobOutput, RemoteError>,
    ) -> Result<Option<Job>, NotesError> {
        match job {
            Job::FetchIdentity => match result {
                Ok(JobOutput::Identity(identity)) => {
                    tracing::debug!(email = %identity.email, "identity confirmed");
                    self.identity = Some(identity);
                    Ok(Some(Job::FetchNotes))
                }
                Ok(_) => Err(self.auth_failed(RemoteError::Unexpected(job.label()))),
                Err(err) => Err(self.auth_failed(err)),
            },
            Job::FetchNotes => match result {
                Ok(JobOutput::Notes(notes)) => {
                    tracing::debug!(count = notes.len(), "note list refreshed");
                    self.collection.replace_all(notes);
                    Ok(None)
                }
                Ok(_) => Err(NotesError::Fetch(RemoteError::Unexpected(job.label()))),
                Err(err) => {
                    tracing::warn!(?err, "failed to fetch notes");
                    Err(NotesError::Fetch(err))
                }
            },
            Job::Create(_) | Job::Update { .. } => match result {
                Ok(_) => {
                    if let Job::Update { id, .. } = job {
                        if self.collection.editing() == Some(id) {
                            self.collection.set_editing(None);
                        }
                    }
                    tracing::info!(job = job.label(), "note saved");
                    Ok(Some(Job::FetchNotes))
                }
                Err(err) => {
                    tracing::warn!(?err, job = job.label(), "failed to save note");
                    Err(NotesError::Save(err))
                }
            },
            Job::Delete(id) => match result {
                Ok(_) => {
                    self.collection.remove(id);
                    tracing::info!(%id, "note deleted");
                    Ok(None)
                }
                Err(err) => {
                    tracing::warn!(?err, %id, "failed to delete note");
                    Err(NotesError::Delete(err))
                }
            },
            Job::Toggle { id, flag } => match result {
                Ok(_) => {
                    let applied = match flag {
                        ToggleFlag::Pin => self.collection.flip_pinned(id),
                        ToggleFlag::Archive => self.collection.flip_archived(id),
                    };
                    tracing::info!(%id, %flag, applied, "note flag toggled");
                    Ok(None)
                }
                Err(source) => {
                    tracing::warn!(err = ?source, %id, %flag, "failed to toggle note flag");
                    Err(NotesError::Toggle { flag: *flag, source })
                }
            },
            Job::PersistOrder(ordered) => match result {
                Ok(_) => {
                    tracing::info!(count = ordered.len(), "note order saved");
                    Ok(None)
                }
                // The optimistic order stays; the next refresh reconciles.
                Err(err) => {
                    tracing::warn!(?err, "failed to persist note order");
                    Err(NotesError::Reorder(err))
                }
            },
        }
    }

    /// Runs `job` and every follow-up it produces against `remote`, blocking.
    pub fn run(&mut self, remote: &dyn RemoteStore, job: Job) -> Result<(), NotesError> {
        let mut next = Some(job);
        while let Some(job) = next.take() {
            let result = job.run(remote);
            next = self.complete(&job, result)?;
        }
        Ok(())
    }

    pub fn load(&mut self, remote: &dyn RemoteStore) -> Result<(), NotesError> {
        let job = self.begin_load();
        self.run(remote, job)
    }

    pub fn refresh(&mut self, remote: &dyn RemoteStore) -> Result<(), NotesError> {
        let job = self.begin_refresh();
        self.run(remote, job)
    }

    pub fn create(&mut self, remote: &dyn RemoteStore, draft: NoteDraft) -> Result<(), NotesError> {
        let job = self.begin_create(draft)?;
        self.run(remote, job)
    }

    pub fn update(
        &mut self,
        remote: &dyn RemoteStore,
        id: NoteId,
        draft: NoteDraft,
    ) -> Result<(), NotesError> {
        let job = self.begin_update(id, draft)?;
        self.run(remote, job)
    }

    /// Returns whether the delete went ahead.
    pub fn delete<F>(
        &mut self,
        remote: &dyn RemoteStore,
        id: NoteId,
        confirm: F,
    ) -> Result<bool, NotesError>
    where
        F: FnOnce(&Note) -> bool,
    {
        match self.begin_delete(id, confirm)? {
            Some(job) => self.run(remote, job).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn toggle_pin(&mut self, remote: &dyn RemoteStore, id: NoteId) -> Result<(), NotesError> {
        let job = self.begin_toggle(id, ToggleFlag::Pin)?;
        self.run(remote, job)
    }

    pub fn toggle_archive(
        &mut self,
        remote: &dyn RemoteStore,
        id: NoteId,
    ) -> Result<(), NotesError> {
        let job = self.begin_toggle(id, ToggleFlag::Archive)?;
        self.run(remote, job)
    }

    /// Returns whether the new order was accepted.
    pub fn reorder(
        &mut self,
        remote: &dyn RemoteStore,
        ordered: Vec<NoteId>,
    ) -> Result<bool, NotesError> {
        match self.begin_reorder(ordered) {
            Some(job) => self.run(remote, job).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn move_note(
        &mut self,
        remote: &dyn RemoteStore,
        source: DragSlot,
        destination: DragSlot,
    ) -> Result<bool, NotesError> {
        match self.begin_move(source, destination) {
            Some(job) => self.run(remote, job).map(|_| true),
            None => Ok(false),
        }
    }

    fn require(&self, id: &NoteId) -> Result<&Note, NotesError> {
        self.collection
            .get(id)
            .ok_or_else(|| NotesError::UnknownNote(id.clone()))
    }

    fn auth_failed(&mut self, err: RemoteError) -> NotesError {
        tracing::warn!(?err, "identity check failed; clearing credential");
        self.identity = None;
        if let Err(persist_err) = self.session.write().clear_token() {
            tracing::warn!(err = ?persist_err, "failed to clear stored credential");
        }
        NotesError::Auth(err)
    }
}
