pub mod app;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod highlight;
pub mod notes;
pub mod remote;
pub mod session;
pub mod ui;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use notes::{Note, NoteCollection, NoteController, NoteDraft, NoteId, NotesError};
pub use remote::{HttpRemote, RemoteStore};
