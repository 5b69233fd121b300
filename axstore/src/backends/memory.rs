//! Process-local record store, used by tests and ephemeral runtimes.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use serde_json::Value;

use crate::error::StoreError;
use crate::store::{RecordStore, StoreFuture};
use crate::types::{JsonMap, MessageRecord, SessionRecord, ToolCallRecord, assign_id};

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    state: Mutex<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    sessions: HashMap<String, SessionRecord>,
    session_order: HashMap<String, u64>,
    messages: Vec<MessageRecord>,
    tool_calls: Vec<ToolCallRecord>,
    settings: HashMap<String, Value>,
    sequence: u64,
}

impl StoreState {
    fn bump(&mut self, session_id: &str) {
        self.sequence += 1;
        self.session_order
            .insert(session_id.to_string(), self.sequence);
    }

    fn require_session(&self, session_id: &str) -> Result<(), StoreError> {
        if self.sessions.contains_key(session_id) {
            return Ok(());
        }

        Err(StoreError::invalid_request(format!(
            "session '{session_id}' does not exist"
        )))
    }
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::storage("record store lock poisoned"))
    }
}

impl RecordStore for InMemoryRecordStore {
    fn create_session<'a>(&'a self, mut session: SessionRecord) -> StoreFuture<'a, SessionRecord> {
        Box::pin(async move {
            let mut state = self.state()?;
            assign_id(&mut session.id);
            if state.sessions.contains_key(&session.id) {
                return Err(StoreError::invalid_request(format!(
                    "session '{}' already exists",
                    session.id
                )));
            }

            let now = SystemTime::now();
            session.created_at = now;
            session.updated_at = now;
            session.archived_at = None;

            state.bump(&session.id);
            state.sessions.insert(session.id.clone(), session.clone());
            Ok(session)
        })
    }

    fn get_session<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<SessionRecord>> {
        Box::pin(async move { Ok(self.state()?.sessions.get(id).cloned()) })
    }

    fn list_sessions<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, Vec<SessionRecord>> {
        Box::pin(async move {
            let state = self.state()?;
            let mut sessions = state
                .sessions
                .values()
                .filter(|session| session.user_id == user_id && !session.is_archived())
                .map(|session| {
                    let order = state.session_order.get(&session.id).copied().unwrap_or(0);
                    (order, session.clone())
                })
                .collect::<Vec<_>>();

            sessions.sort_by(|(left_order, left), (right_order, right)| {
                right
                    .updated_at
                    .cmp(&left.updated_at)
                    .then(right_order.cmp(left_order))
            });

            Ok(sessions.into_iter().map(|(_, session)| session).collect())
        })
    }

    fn update_session<'a>(&'a self, mut session: SessionRecord) -> StoreFuture<'a, SessionRecord> {
        Box::pin(async move {
            let mut state = self.state()?;
            let Some(existing) = state.sessions.get_mut(&session.id) else {
                return Err(StoreError::not_found(format!(
                    "session '{}' not found",
                    session.id
                )));
            };

            existing.title = session.title.clone();
            existing.model = session.model.clone();
            existing.provider_id = session.provider_id.clone();
            existing.system_prompt = session.system_prompt.clone();
            existing.summary = session.summary.clone();
            existing.updated_at = SystemTime::now();
            session = existing.clone();

            state.bump(&session.id);
            Ok(session)
        })
    }

    fn archive_session<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state()?;
            let session = state
                .sessions
                .get_mut(id)
                .ok_or_else(|| StoreError::not_found(format!("session '{id}' not found")))?;
            session.archived_at = Some(SystemTime::now());
            Ok(())
        })
    }

    fn delete_session<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state()?;
            state.sessions.remove(id);
            state.session_order.remove(id);
            state.messages.retain(|message| message.session_id != id);
            state.tool_calls.retain(|call| call.session_id != id);
            Ok(())
        })
    }

    fn touch_session<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state()?;
            if let Some(session) = state.sessions.get_mut(id) {
                session.updated_at = SystemTime::now();
                state.bump(id);
            }
            Ok(())
        })
    }

    fn create_message<'a>(&'a self, mut message: MessageRecord) -> StoreFuture<'a, MessageRecord> {
        Box::pin(async move {
            let mut state = self.state()?;
            state.require_session(&message.session_id)?;
            assign_id(&mut message.id);
            if state.messages.iter().any(|existing| existing.id == message.id) {
                return Err(StoreError::invalid_request(format!(
                    "message '{}' already exists",
                    message.id
                )));
            }

            message.created_at = SystemTime::now();
            state.messages.push(message.clone());
            Ok(message)
        })
    }

    fn get_message<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<MessageRecord>> {
        Box::pin(async move {
            Ok(self
                .state()?
                .messages
                .iter()
                .find(|message| message.id == id)
                .cloned())
        })
    }

    fn list_messages<'a>(
        &'a self,
        session_id: &'a str,
        limit: usize,
        offset: usize,
    ) -> StoreFuture<'a, Vec<MessageRecord>> {
        Box::pin(async move {
            let state = self.state()?;
            let newest_first = state
                .messages
                .iter()
                .rev()
                .filter(|message| message.session_id == session_id)
                .skip(offset);

            let messages = if limit == 0 {
                newest_first.cloned().collect()
            } else {
                newest_first.take(limit).cloned().collect()
            };
            Ok(messages)
        })
    }

    fn update_message<'a>(&'a self, message: MessageRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state()?;
            let existing = state
                .messages
                .iter_mut()
                .find(|existing| existing.id == message.id)
                .ok_or_else(|| {
                    StoreError::not_found(format!("message '{}' not found", message.id))
                })?;

            existing.content = message.content;
            existing.status = message.status;
            existing.token_count = message.token_count;
            existing.metadata = message.metadata;
            Ok(())
        })
    }

    fn create_tool_call<'a>(&'a self, mut call: ToolCallRecord) -> StoreFuture<'a, ToolCallRecord> {
        Box::pin(async move {
            let mut state = self.state()?;
            state.require_session(&call.session_id)?;
            if !state
                .messages
                .iter()
                .any(|message| message.id == call.message_id)
            {
                return Err(StoreError::invalid_request(format!(
                    "message '{}' does not exist",
                    call.message_id
                )));
            }

            assign_id(&mut call.id);
            call.created_at = SystemTime::now();
            state.tool_calls.push(call.clone());
            Ok(call)
        })
    }

    fn update_tool_call<'a>(
        &'a self,
        id: &'a str,
        result: Option<JsonMap>,
        error: Option<String>,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state()?;
            let call = state
                .tool_calls
                .iter_mut()
                .find(|call| call.id == id)
                .ok_or_else(|| StoreError::not_found(format!("tool call '{id}' not found")))?;

            call.result = result;
            call.error = error;
            Ok(())
        })
    }

    fn list_tool_calls<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, Vec<ToolCallRecord>> {
        Box::pin(async move {
            Ok(self
                .state()?
                .tool_calls
                .iter()
                .rev()
                .filter(|call| call.session_id == session_id)
                .cloned()
                .collect())
        })
    }

    fn get_setting<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move { Ok(self.state()?.settings.get(key).cloned()) })
    }

    fn set_setting<'a>(&'a self, key: &'a str, value: Value) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.state()?.settings.insert(key.to_string(), value);
            Ok(())
        })
    }
}
