use strum::{Display, EnumString};
use thiserror::Error;

use crate::notes::NoteId;
use crate::remote::RemoteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ToggleFlag {
    Pin,
    Archive,
}

/// Failures surfaced to the user by the note controller and auth flows.
#[derive(Debug, Error)]
pub enum NotesError {
    #[error("Authentication error. Please login again.")]
    Auth(#[source] RemoteError),
    #[error("Failed to fetch notes.")]
    Fetch(#[source] RemoteError),
    #[error("{0}")]
    Validation(String),
    #[error("Error saving note")]
    Save(#[source] RemoteError),
    #[error("Failed to delete note.")]
    Delete(#[source] RemoteError),
    #[error("Failed to toggle {flag}.")]
    Toggle {
        flag: ToggleFlag,
        #[source]
        source: RemoteError,
    },
    #[error("Failed to save note order.")]
    Reorder(#[source] RemoteError),
    #[error("{message}")]
    Login {
        message: String,
        #[source]
        source: RemoteError,
    },
    #[error("{message}")]
    Register {
        message: String,
        #[source]
        source: RemoteError,
    },
    #[error("note {0} is not in the current list")]
    UnknownNote(NoteId),
}

impl NotesError {
    /// Auth failures invalidate the session and send the user back to login.
    pub fn requires_login(&self) -> bool {
        matches!(self, NotesError::Auth(_))
    }
}
