use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::config::RemoteOptions;
use crate::notes::{Identity, Note, NoteDraft, NoteId};
use crate::remote::{RemoteError, RemoteStore};
use crate::session::SessionHandle;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

/// `RemoteStore` over the backend's JSON/multipart REST API.
#[derive(Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: Arc<String>,
    session: SessionHandle,
}

impl HttpRemote {
    pub fn new(options: &RemoteOptions, session: SessionHandle) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("notedeck/", env!("CARGO_PKG_VERSION")))
            .timeout(options.timeout())
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            base_url: Arc::new(options.base_url.trim_end_matches('/').to_string()),
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, RemoteError> {
        let session = self.session.read();
        let token = session.token().ok_or(RemoteError::MissingCredential)?;
        Ok(builder.bearer_auth(token))
    }

    fn send(&self, label: &'static str, builder: RequestBuilder) -> Result<Response, RemoteError> {
        let response = builder.send()?;
        let status = response.status();
        tracing::debug!(request = label, status = status.as_u16(), "remote call finished");
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RemoteError::Unauthorized);
        }
        if !status.is_success() {
            let message = response
                .text()
                .ok()
                .and_then(|raw| serde_json::from_str::<ErrorResponse>(&raw).ok())
                .map(|body| body.message);
            return Err(RemoteError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
        let raw = response.text()?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn note_form(draft: &NoteDraft) -> Result<Form, RemoteError> {
        let mut form = Form::new()
            .text("title", draft.title.clone())
            .text("body", draft.body.clone())
            .text("color", draft.color.clone().unwrap_or_default());
        for attachment in &draft.attachments {
            let mut part = Part::bytes(attachment.bytes.clone()).file_name(attachment.file_name.clone());
            if let Some(content_type) = attachment.content_type.as_deref() {
                part = part.mime_str(content_type)?;
            }
            form = form.part("images", part);
        }
        Ok(form)
    }
}

impl RemoteStore for HttpRemote {
    fn identity(&self) -> Result<Identity, RemoteError> {
        let request = self.authorized(self.client.get(self.url("me")))?;
        Self::decode(self.send("identity", request)?)
    }

    fn list_notes(&self) -> Result<Vec<Note>, RemoteError> {
        let request = self.authorized(self.client.get(self.url("notes")))?;
        Self::decode(self.send("list notes", request)?)
    }

    fn create_note(&self, draft: &NoteDraft) -> Result<Note, RemoteError> {
        let request = self
            .authorized(self.client.post(self.url("notes")))?
            .multipart(Self::note_form(draft)?);
        Self::decode(self.send("create note", request)?)
    }

    fn update_note(&self, id: &NoteId, draft: &NoteDraft) -> Result<Note, RemoteError> {
        let request = self
            .authorized(self.client.put(self.url(&format!("notes/{id}"))))?
            .multipart(Self::note_form(draft)?);
        Self::decode(self.send("update note", request)?)
    }

    fn delete_note(&self, id: &NoteId) -> Result<(), RemoteError> {
        let request = self.authorized(self.client.delete(self.url(&format!("notes/{id}"))))?;
        self.send("delete note", request).map(|_| ())
    }

    fn toggle_pin(&self, id: &NoteId) -> Result<(), RemoteError> {
        let request = self.authorized(self.client.put(self.url(&format!("notes/{id}/pin"))))?;
        self.send("toggle pin", request).map(|_| ())
    }

    fn toggle_archive(&self, id: &NoteId) -> Result<(), RemoteError> {
        let request =
            self.authorized(self.client.put(self.url(&format!("notes/{id}/archive"))))?;
        self.send("toggle archive", request).map(|_| ())
    }

    fn persist_order(&self, ordered: &[NoteId]) -> Result<(), RemoteError> {
        let request = self
            .authorized(self.client.post(self.url("notes/reorder")))?
            .json(&json!({ "order": ordered }));
        self.send("persist order", request).map(|_| ())
    }

    fn login(&self, email: &str, password: &str) -> Result<String, RemoteError> {
        let request = self
            .client
            .post(self.url("login"))
            .json(&json!({ "email": email, "password": password }));
        let response: TokenResponse = Self::decode(self.send("login", request)?)?;
        Ok(response.token)
    }

    fn register(&self, name: &str, email: &str, password: &str) -> Result<(), RemoteError> {
        let request = self
            .client
            .post(self.url("register"))
            .json(&json!({ "name": name, "email": email, "password": password }));
        self.send("register", request).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::Attachment;
    use crate::session::SessionStore;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn remote(dir: &TempDir, base_url: &str) -> anyhow::Result<HttpRemote> {
        let session = SessionStore::open(dir.path().join("session.json"))?.into_handle();
        let options = RemoteOptions {
            base_url: base_url.into(),
            ..RemoteOptions::default()
        };
        HttpRemote::new(&options, session)
    }

    #[test]
    fn joins_paths_onto_base_without_double_slashes() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let remote = remote(&dir, "http://localhost:5000/api/")?;
        assert_eq!(remote.base_url(), "http://localhost:5000/api");
        assert_eq!(remote.url("notes/7/pin"), "http://localhost:5000/api/notes/7/pin");
        assert_eq!(remote.url("/me"), "http://localhost:5000/api/me");
        Ok(())
    }

    #[test]
    fn authorized_calls_need_a_stored_token() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let remote = remote(&dir, "http://127.0.0.1:9")?;
        assert_matches!(remote.identity(), Err(RemoteError::MissingCredential));
        assert_matches!(remote.list_notes(), Err(RemoteError::MissingCredential));
        Ok(())
    }

    #[test]
    fn note_form_accepts_known_and_unknown_content_types() {
        let mut draft = NoteDraft::new("Trip", "pack bags");
        draft.attachments.push(Attachment {
            file_name: "map.png".into(),
            content_type: Some("image/png".into()),
            bytes: vec![1, 2, 3],
        });
        draft.attachments.push(Attachment {
            file_name: "notes.bin".into(),
            content_type: None,
            bytes: vec![4],
        });
        assert!(HttpRemote::note_form(&draft).is_ok());
    }
}
