//! Remote conversation sessions that runners read history from and append to.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use axcommon::{BoxFuture, SessionId};
use axprovider::Message;
use axstore::DEFAULT_USER_ID;

use crate::ChatError;

pub type ChatFuture<'a, T> = BoxFuture<'a, T>;

pub const APP_NAME: &str = "axe-desktop";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub app_name: String,
    pub user_id: String,
    pub session_id: SessionId,
}

impl SessionKey {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<SessionId>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Key under the desktop app name and the default user.
    pub fn desktop(session_id: impl Into<SessionId>) -> Self {
        Self::new(APP_NAME, DEFAULT_USER_ID, session_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSession {
    pub key: SessionKey,
    pub message_count: usize,
}

pub trait SessionService: Send + Sync {
    fn get<'a>(
        &'a self,
        key: &'a SessionKey,
    ) -> ChatFuture<'a, Result<Option<RemoteSession>, ChatError>>;

    /// Creates the session with `seed` as its initial history. Fails if it already exists.
    fn create<'a>(
        &'a self,
        key: &'a SessionKey,
        seed: Vec<Message>,
    ) -> ChatFuture<'a, Result<RemoteSession, ChatError>>;

    /// Full history in conversation order. Unknown sessions have an empty history.
    fn history<'a>(&'a self, key: &'a SessionKey)
    -> ChatFuture<'a, Result<Vec<Message>, ChatError>>;

    fn append<'a>(
        &'a self,
        key: &'a SessionKey,
        messages: Vec<Message>,
    ) -> ChatFuture<'a, Result<(), ChatError>>;

    fn delete<'a>(&'a self, key: &'a SessionKey) -> ChatFuture<'a, Result<(), ChatError>>;
}

#[derive(Debug, Default)]
pub struct InMemorySessionService {
    sessions: Mutex<HashMap<SessionKey, Vec<Message>>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> Result<MutexGuard<'_, HashMap<SessionKey, Vec<Message>>>, ChatError> {
        self.sessions
            .lock()
            .map_err(|_| ChatError::internal("session service lock poisoned"))
    }
}

impl SessionService for InMemorySessionService {
    fn get<'a>(
        &'a self,
        key: &'a SessionKey,
    ) -> ChatFuture<'a, Result<Option<RemoteSession>, ChatError>> {
        Box::pin(async move {
            Ok(self.sessions()?.get(key).map(|history| RemoteSession {
                key: key.clone(),
                message_count: history.len(),
            }))
        })
    }

    fn create<'a>(
        &'a self,
        key: &'a SessionKey,
        seed: Vec<Message>,
    ) -> ChatFuture<'a, Result<RemoteSession, ChatError>> {
        Box::pin(async move {
            let mut sessions = self.sessions()?;
            if sessions.contains_key(key) {
                return Err(ChatError::invalid_request(format!(
                    "remote session '{}' already exists",
                    key.session_id
                )));
            }

            let message_count = seed.len();
            sessions.insert(key.clone(), seed);
            Ok(RemoteSession {
                key: key.clone(),
                message_count,
            })
        })
    }

    fn history<'a>(
        &'a self,
        key: &'a SessionKey,
    ) -> ChatFuture<'a, Result<Vec<Message>, ChatError>> {
        Box::pin(async move { Ok(self.sessions()?.get(key).cloned().unwrap_or_default()) })
    }

    fn append<'a>(
        &'a self,
        key: &'a SessionKey,
        messages: Vec<Message>,
    ) -> ChatFuture<'a, Result<(), ChatError>> {
        Box::pin(async move {
            self.sessions()?
                .entry(key.clone())
                .or_default()
                .extend(messages);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a SessionKey) -> ChatFuture<'a, Result<(), ChatError>> {
        Box::pin(async move {
            self.sessions()?.remove(key);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use axprovider::Role;

    use super::*;

    #[tokio::test]
    async fn create_seeds_history_and_rejects_duplicates() {
        let service = InMemorySessionService::new();
        let key = SessionKey::desktop("s-1");

        assert!(service.get(&key).await.expect("get").is_none());

        let created = service
            .create(&key, vec![Message::new(Role::User, "earlier")])
            .await
            .expect("session should be created");
        assert_eq!(created.message_count, 1);
        assert_eq!(created.key.app_name, APP_NAME);

        let duplicate = service
            .create(&key, Vec::new())
            .await
            .expect_err("second create should fail");
        assert_eq!(duplicate.kind, crate::ChatErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn append_extends_history_and_delete_forgets_it() {
        let service = InMemorySessionService::new();
        let key = SessionKey::desktop("s-2");

        service
            .append(
                &key,
                vec![
                    Message::new(Role::User, "hello"),
                    Message::new(Role::Assistant, "hi"),
                ],
            )
            .await
            .expect("append should work");

        let history = service.history(&key).await.expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[1], Message::new(Role::Assistant, "hi"));

        let other_user = SessionKey::new(APP_NAME, "someone-else", "s-2");
        assert!(service.history(&other_user).await.expect("history").is_empty());

        service.delete(&key).await.expect("delete should work");
        assert!(service.get(&key).await.expect("get").is_none());
    }
}
