use thiserror::Error;

use crate::notes::{Identity, Note, NoteDraft, NoteId};

mod http;

#[cfg(test)]
pub(crate) mod fake;

pub use http::HttpRemote;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("no credential stored; sign in first")]
    MissingCredential,
    #[error("credential rejected by server")]
    Unauthorized,
    #[error("server responded with status {status}")]
    Status {
        status: u16,
        message: Option<String>,
    },
    #[error("request failed")]
    Http(#[from] reqwest::Error),
    #[error("could not decode server response")]
    Decode(#[from] serde_json::Error),
    #[error("unexpected response to {0}")]
    Unexpected(&'static str),
}

impl RemoteError {
    /// Message the backend attached to an error response, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            RemoteError::Status {
                message: Some(message),
                ..
            } => Some(message.as_str()),
            _ => None,
        }
    }
}

/// The notes backend, treated as a black box.
pub trait RemoteStore: Send + Sync {
    fn identity(&self) -> Result<Identity, RemoteError>;

    fn list_notes(&self) -> Result<Vec<Note>, RemoteError>;

    fn create_note(&self, draft: &NoteDraft) -> Result<Note, RemoteError>;

    fn update_note(&self, id: &NoteId, draft: &NoteDraft) -> Result<Note, RemoteError>;

    fn delete_note(&self, id: &NoteId) -> Result<(), RemoteError>;

    fn toggle_pin(&self, id: &NoteId) -> Result<(), RemoteError>;

    fn toggle_archive(&self, id: &NoteId) -> Result<(), RemoteError>;

    fn persist_order(&self, ordered: &[NoteId]) -> Result<(), RemoteError>;

    /// Exchanges credentials for a bearer token.
    fn login(&self, email: &str, password: &str) -> Result<String, RemoteError>;

    fn register(&self, name: &str, email: &str, password: &str) -> Result<(), RemoteError>;
}
