use crate::notes::NotesError;
use crate::remote::RemoteStore;
use crate::session::SessionHandle;

pub fn login(
    remote: &dyn RemoteStore,
    session: &SessionHandle,
    email: &str,
    password: &str,
) -> Result<(), NotesError> {
    if email.trim().is_empty() || password.trim().is_empty() {
        return Err(NotesError::Validation(
            "Please enter both email and password.".into(),
        ));
    }
    let token = remote.login(email, password).map_err(|source| NotesError::Login {
        message: source.server_message().unwrap_or("Login failed").to_string(),
        source,
    })?;
    if let Err(err) = session.write().set_token(token) {
        // The token is still usable for this process.
        tracing::warn!(?err, "failed to persist session token");
    }
    tracing::info!(email, "signed in");
    Ok(())
}

pub fn register(
    remote: &dyn RemoteStore,
    name: &str,
    email: &str,
    password: &str,
) -> Result<(), NotesError> {
    if name.trim().is_empty() || email.trim().is_empty() || password.trim().is_empty() {
        return Err(NotesError::Validation("Please fill in all fields.".into()));
    }
    remote
        .register(name, email, password)
        .map_err(|source| NotesError::Register {
            message: source
                .server_message()
                .unwrap_or("Registration failed.")
                .to_string(),
            source,
        })?;
    tracing::info!(email, "registered account");
    Ok(())
}

pub fn logout(session: &SessionHandle) -> anyhow::Result<()> {
    session.write().clear_token()?;
    tracing::info!("signed out");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::fake::{Call, FakeRemote, Op};
    use crate::session::SessionStore;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn session(dir: &TempDir) -> anyhow::Result<SessionHandle> {
        Ok(SessionStore::open(dir.path().join("session.json"))?.into_handle())
    }

    #[test]
    fn login_stores_the_token() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let session = session(&dir)?;
        let remote = FakeRemote::default();
        login(&remote, &session, "ada@example.com", "pw")?;
        assert_eq!(session.read().token(), Some("token-for-ada@example.com"));
        Ok(())
    }

    #[test]
    fn login_requires_both_fields_before_calling_out() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let session = session(&dir)?;
        let remote = FakeRemote::default();
        assert_matches!(
            login(&remote, &session, "ada@example.com", "  "),
            Err(NotesError::Validation(_))
        );
        assert!(remote.calls().is_empty());
        assert!(!session.read().is_signed_in());
        Ok(())
    }

    #[test]
    fn login_failure_carries_server_message() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let session = session(&dir)?;
        let remote = FakeRemote::default();
        remote.fail(Op::Login);
        let err = login(&remote, &session, "ada@example.com", "pw").unwrap_err();
        assert_eq!(err.to_string(), "Login exploded");
        assert!(!session.read().is_signed_in());
        Ok(())
    }

    #[test]
    fn register_validates_and_calls_remote() {
        let remote = FakeRemote::default();
        assert_matches!(
            register(&remote, "", "ada@example.com", "pw"),
            Err(NotesError::Validation(_))
        );
        assert!(register(&remote, "Ada", "ada@example.com", "pw").is_ok());
        assert_eq!(remote.calls(), vec![Call::Register("ada@example.com".into())]);
    }

    #[test]
    fn logout_clears_the_token() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let session = session(&dir)?;
        session.write().set_token("abc".into())?;
        logout(&session)?;
        assert!(!session.read().is_signed_in());
        Ok(())
    }
}
