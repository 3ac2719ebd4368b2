use std::convert::Infallible;
use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{serde_as, DefaultOnNull, NoneAsEmptyString};

pub mod collection;
pub mod controller;
pub mod error;

pub use collection::{DragSlot, Group, NoteCollection, Partition};
pub use controller::{Job, JobOutput, NoteController};
pub use error::{NotesError, ToggleFlag};

/// Server-assigned note identifier.
///
/// The backend may hand out numeric or string keys; the wire form is kept so
/// that ids echo back exactly as received. Equality only looks at the textual
/// key, so `12` typed on the command line matches a numeric `12` from the
/// server.
#[derive(Debug, Clone)]
pub struct NoteId {
    key: String,
    numeric: bool,
}

impl NoteId {
    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl PartialEq for NoteId {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for NoteId {}

impl Hash for NoteId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl From<i64> for NoteId {
    fn from(value: i64) -> Self {
        Self {
            key: value.to_string(),
            numeric: true,
        }
    }
}

impl From<&str> for NoteId {
    fn from(value: &str) -> Self {
        Self {
            key: value.to_string(),
            numeric: false,
        }
    }
}

impl FromStr for NoteId {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(match trimmed.parse::<i64>() {
            Ok(value) => NoteId::from(value),
            Err(_) => NoteId::from(trimmed),
        })
    }
}

impl Serialize for NoteId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.numeric {
            if let Ok(value) = self.key.parse::<i64>() {
                return serializer.serialize_i64(value);
            }
        }
        serializer.serialize_str(&self.key)
    }
}

impl<'de> Deserialize<'de> for NoteId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(value) => NoteId::from(value),
            RawId::Text(value) => NoteId::from(value.as_str()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "NoteWire")]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub body: String,
    pub color: Option<String>,
    pub image: Option<String>,
    pub pinned: bool,
    pub archived: bool,
}

impl Note {
    /// Default view membership: archived notes are hidden whatever their pin state.
    pub fn is_active(&self) -> bool {
        !self.archived
    }

    pub fn is_reorderable(&self) -> bool {
        !self.pinned && !self.archived
    }

    pub fn matches(&self, needle_lower: &str) -> bool {
        self.title.to_lowercase().contains(needle_lower)
            || self.body.to_lowercase().contains(needle_lower)
    }

    pub fn attachment_url(&self, uploads_url: &str) -> Option<String> {
        self.image
            .as_deref()
            .map(|image| format!("{}/notes/{}", uploads_url.trim_end_matches('/'), image))
    }
}

// The list endpoint names the body `content`; some responses use `body`.
#[serde_as]
#[derive(Deserialize)]
struct NoteWire {
    #[serde(alias = "_id")]
    id: NoteId,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde_as(as = "DefaultOnNull<NoneAsEmptyString>")]
    #[serde(default)]
    color: Option<String>,
    #[serde_as(as = "DefaultOnNull<NoneAsEmptyString>")]
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    pinned: bool,
    #[serde(default)]
    archived: bool,
}

impl From<NoteWire> for Note {
    fn from(wire: NoteWire) -> Self {
        Self {
            id: wire.id,
            title: wire.title,
            body: wire.content.or(wire.body).unwrap_or_default(),
            color: wire.color,
            image: wire.image,
            pinned: wire.pinned,
            archived: wire.archived,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde_as(as = "DefaultOnNull<NoneAsEmptyString>")]
    #[serde(default)]
    pub profile_image: Option<String>,
}

impl Identity {
    pub fn avatar_url(&self, uploads_url: &str) -> Option<String> {
        self.profile_image
            .as_deref()
            .map(|image| format!("{}/{}", uploads_url.trim_end_matches('/'), image))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("reading attachment {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_owned)
            .with_context(|| format!("attachment {} has no file name", path.display()))?;
        let content_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(guess_content_type)
            .map(str::to_owned);
        Ok(Self {
            file_name,
            content_type,
            bytes,
        })
    }
}

fn guess_content_type(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

/// What the user submits from the note form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteDraft {
    pub title: String,
    pub body: String,
    pub color: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn from_note(note: &Note) -> Self {
        Self {
            title: note.title.clone(),
            body: note.body.clone(),
            color: note.color.clone(),
            attachments: Vec::new(),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), NotesError> {
        if self.title.trim().is_empty() {
            return Err(NotesError::Validation("Title is required.".into()));
        }
        Ok(())
    }
}
