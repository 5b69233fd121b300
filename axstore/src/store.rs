//! Record store contract and backend selection.

use std::path::PathBuf;
use std::sync::Arc;

use axcommon::BoxFuture;
use serde_json::Value;

use crate::backends::memory::InMemoryRecordStore;
use crate::backends::sqlite::SqliteRecordStore;
use crate::error::StoreError;
use crate::types::{JsonMap, MessageRecord, SessionRecord, ToolCallRecord};

pub type StoreFuture<'a, T> = BoxFuture<'a, Result<T, StoreError>>;

/// Persistence for sessions, messages, tool calls, and settings.
///
/// Records created with an empty id receive a UUID v4. Timestamps are assigned by the store.
/// Listing operations return the newest records first.
pub trait RecordStore: Send + Sync {
    fn create_session<'a>(&'a self, session: SessionRecord) -> StoreFuture<'a, SessionRecord>;

    fn get_session<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<SessionRecord>>;

    /// Non-archived sessions of `user_id`, most recently updated first.
    fn list_sessions<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, Vec<SessionRecord>>;

    fn update_session<'a>(&'a self, session: SessionRecord) -> StoreFuture<'a, SessionRecord>;

    fn archive_session<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()>;

    /// Deletes the session together with its messages and tool calls.
    fn delete_session<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()>;

    /// Bumps `updated_at` of the session.
    fn touch_session<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()>;

    fn create_message<'a>(&'a self, message: MessageRecord) -> StoreFuture<'a, MessageRecord>;

    fn get_message<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<MessageRecord>>;

    /// Messages of a session, newest first. A `limit` of zero means no limit.
    fn list_messages<'a>(
        &'a self,
        session_id: &'a str,
        limit: usize,
        offset: usize,
    ) -> StoreFuture<'a, Vec<MessageRecord>>;

    /// Rewrites content, status, token count, and metadata of an existing message.
    fn update_message<'a>(&'a self, message: MessageRecord) -> StoreFuture<'a, ()>;

    fn create_tool_call<'a>(&'a self, call: ToolCallRecord) -> StoreFuture<'a, ToolCallRecord>;

    fn update_tool_call<'a>(
        &'a self,
        id: &'a str,
        result: Option<JsonMap>,
        error: Option<String>,
    ) -> StoreFuture<'a, ()>;

    fn list_tool_calls<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, Vec<ToolCallRecord>>;

    fn get_setting<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>>;

    fn set_setting<'a>(&'a self, key: &'a str, value: Value) -> StoreFuture<'a, ()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStoreConfig {
    Sqlite { path: PathBuf },
    InMemory,
}

pub fn create_record_store(config: RecordStoreConfig) -> Result<Arc<dyn RecordStore>, StoreError> {
    match config {
        RecordStoreConfig::Sqlite { path } => Ok(Arc::new(SqliteRecordStore::new(path)?)),
        RecordStoreConfig::InMemory => Ok(Arc::new(InMemoryRecordStore::new())),
    }
}
