use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use serde_json::Value;

use crate::error::StoreError;
use crate::store::{RecordStore, StoreFuture};
use crate::types::{
    JsonMap, MessageRecord, MessageRole, MessageStatus, SessionRecord, ToolCallRecord, assign_id,
};

const SESSION_COLUMNS: &str = "
    id, user_id, title, model, provider_id, system_prompt, summary,
    created_at_secs, created_at_nanos, updated_at_secs, updated_at_nanos,
    archived_at_secs, archived_at_nanos
";

const MESSAGE_COLUMNS: &str = "
    id, session_id, role, content, status, token_count, metadata_json,
    created_at_secs, created_at_nanos
";

const TOOL_CALL_COLUMNS: &str = "
    id, session_id, message_id, tool_name, args_json, result_json, error,
    created_at_secs, created_at_nanos
";

#[derive(Debug)]
pub struct SqliteRecordStore {
    connection: Mutex<Connection>,
}

impl SqliteRecordStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|error| {
                StoreError::storage(format!("failed to create sqlite parent directory: {error}"))
            })?;
        }

        let connection = Connection::open(path)
            .map_err(|error| sqlite_error("failed to open sqlite database", error))?;
        Self::from_connection(connection)
    }

    pub fn new_in_memory() -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory()
            .map_err(|error| sqlite_error("failed to open in-memory sqlite database", error))?;
        Self::from_connection(connection)
    }

    fn from_connection(connection: Connection) -> Result<Self, StoreError> {
        connection
            .busy_timeout(Duration::from_secs(5))
            .map_err(|error| sqlite_error("failed to configure sqlite busy timeout", error))?;
        let store = Self {
            connection: Mutex::new(connection),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection
            .lock()
            .map_err(|_| StoreError::storage("sqlite record store lock poisoned"))
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.connection()?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                model TEXT NOT NULL,
                provider_id TEXT NOT NULL DEFAULT '',
                system_prompt TEXT NOT NULL DEFAULT '',
                summary TEXT,
                created_at_secs INTEGER NOT NULL,
                created_at_nanos INTEGER NOT NULL,
                updated_at_secs INTEGER NOT NULL,
                updated_at_nanos INTEGER NOT NULL,
                archived_at_secs INTEGER,
                archived_at_nanos INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_user_updated
            ON sessions(user_id, updated_at_secs, updated_at_nanos);

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'completed',
                token_count INTEGER,
                metadata_json TEXT,
                created_at_secs INTEGER NOT NULL,
                created_at_nanos INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_session_created
            ON messages(session_id, created_at_secs, created_at_nanos);

            CREATE TABLE IF NOT EXISTS tool_calls (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                tool_name TEXT NOT NULL,
                args_json TEXT,
                result_json TEXT,
                error TEXT,
                created_at_secs INTEGER NOT NULL,
                created_at_nanos INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tool_calls_session_created
            ON tool_calls(session_id, created_at_secs, created_at_nanos);

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value_json TEXT
            );

            INSERT OR IGNORE INTO users (id, name) VALUES ('default', 'Default User');
            ",
        )
        .map_err(|error| sqlite_error("failed to initialize sqlite schema", error))?;

        Ok(())
    }

    fn read_session(row: &Row<'_>) -> Result<SessionRecord, StoreError> {
        let archived_secs: Option<i64> = column(row, 11)?;
        let archived_nanos: Option<i64> = column(row, 12)?;
        let archived_at = match (archived_secs, archived_nanos) {
            (Some(secs), Some(nanos)) => Some(decode_system_time(secs, nanos)?),
            _ => None,
        };

        Ok(SessionRecord {
            id: column(row, 0)?,
            user_id: column(row, 1)?,
            title: column(row, 2)?,
            model: column(row, 3)?,
            provider_id: column(row, 4)?,
            system_prompt: column(row, 5)?,
            summary: column(row, 6)?,
            created_at: decode_system_time(column(row, 7)?, column(row, 8)?)?,
            updated_at: decode_system_time(column(row, 9)?, column(row, 10)?)?,
            archived_at,
        })
    }

    fn read_message(row: &Row<'_>) -> Result<MessageRecord, StoreError> {
        let role: String = column(row, 2)?;
        let status: String = column(row, 4)?;
        let token_count: Option<i64> = column(row, 5)?;
        let metadata_json: Option<String> = column(row, 6)?;

        Ok(MessageRecord {
            id: column(row, 0)?,
            session_id: column(row, 1)?,
            role: role.parse::<MessageRole>()?,
            content: column(row, 3)?,
            status: status.parse::<MessageStatus>()?,
            token_count: token_count.and_then(|count| u32::try_from(count).ok()),
            metadata: decode_map(metadata_json.as_deref())?.unwrap_or_default(),
            created_at: decode_system_time(column(row, 7)?, column(row, 8)?)?,
        })
    }

    fn read_tool_call(row: &Row<'_>) -> Result<ToolCallRecord, StoreError> {
        let args_json: Option<String> = column(row, 4)?;
        let result_json: Option<String> = column(row, 5)?;

        Ok(ToolCallRecord {
            id: column(row, 0)?,
            session_id: column(row, 1)?,
            message_id: column(row, 2)?,
            tool_name: column(row, 3)?,
            args: decode_map(args_json.as_deref())?.unwrap_or_default(),
            result: decode_map(result_json.as_deref())?,
            error: column(row, 6)?,
            created_at: decode_system_time(column(row, 7)?, column(row, 8)?)?,
        })
    }

    fn query_rows<T>(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
        read: fn(&Row<'_>) -> Result<T, StoreError>,
    ) -> Result<Vec<T>, StoreError> {
        let mut statement = conn
            .prepare(sql)
            .map_err(|error| sqlite_error("failed to prepare query", error))?;
        let mut rows = statement
            .query(params)
            .map_err(|error| sqlite_error("failed to run query", error))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|error| sqlite_error("failed to read row", error))?
        {
            records.push(read(row)?);
        }
        Ok(records)
    }

    fn query_one<T>(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
        read: fn(&Row<'_>) -> Result<T, StoreError>,
    ) -> Result<Option<T>, StoreError> {
        Ok(Self::query_rows(conn, sql, params, read)?.into_iter().next())
    }
}

impl RecordStore for SqliteRecordStore {
    fn create_session<'a>(&'a self, mut session: SessionRecord) -> StoreFuture<'a, SessionRecord> {
        Box::pin(async move {
            assign_id(&mut session.id);
            let now = SystemTime::now();
            session.created_at = now;
            session.updated_at = now;
            session.archived_at = None;
            let (secs, nanos) = encode_system_time(now)?;

            let conn = self.connection()?;
            conn.execute(
                "INSERT OR IGNORE INTO users (id, name) VALUES (?1, ?1)",
                params![&session.user_id],
            )
            .map_err(|error| sqlite_error("failed to ensure session user", error))?;
            conn.execute(
                "
                INSERT INTO sessions (
                    id, user_id, title, model, provider_id, system_prompt, summary,
                    created_at_secs, created_at_nanos, updated_at_secs, updated_at_nanos
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?8, ?9)
                ",
                params![
                    &session.id,
                    &session.user_id,
                    &session.title,
                    &session.model,
                    &session.provider_id,
                    &session.system_prompt,
                    session.summary.as_deref(),
                    secs,
                    nanos,
                ],
            )
            .map_err(|error| sqlite_error("failed to insert session", error))?;

            Ok(session)
        })
    }

    fn get_session<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<SessionRecord>> {
        Box::pin(async move {
            let conn = self.connection()?;
            Self::query_one(
                &conn,
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![id],
                Self::read_session,
            )
        })
    }

    fn list_sessions<'a>(&'a self, user_id: &'a str) -> StoreFuture<'a, Vec<SessionRecord>> {
        Box::pin(async move {
            let conn = self.connection()?;
            Self::query_rows(
                &conn,
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE user_id = ?1 AND archived_at_secs IS NULL
                     ORDER BY updated_at_secs DESC, updated_at_nanos DESC, rowid DESC"
                ),
                params![user_id],
                Self::read_session,
            )
        })
    }

    fn update_session<'a>(&'a self, session: SessionRecord) -> StoreFuture<'a, SessionRecord> {
        Box::pin(async move {
            let (secs, nanos) = encode_system_time(SystemTime::now())?;
            let conn = self.connection()?;
            let changed = conn
                .execute(
                    "
                    UPDATE sessions
                    SET title = ?1, model = ?2, provider_id = ?3, system_prompt = ?4,
                        summary = ?5, updated_at_secs = ?6, updated_at_nanos = ?7
                    WHERE id = ?8
                    ",
                    params![
                        &session.title,
                        &session.model,
                        &session.provider_id,
                        &session.system_prompt,
                        session.summary.as_deref(),
                        secs,
                        nanos,
                        &session.id,
                    ],
                )
                .map_err(|error| sqlite_error("failed to update session", error))?;

            if changed == 0 {
                return Err(StoreError::not_found(format!(
                    "session '{}' not found",
                    session.id
                )));
            }

            Self::query_one(
                &conn,
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![&session.id],
                Self::read_session,
            )?
            .ok_or_else(|| StoreError::not_found(format!("session '{}' not found", session.id)))
        })
    }

    fn archive_session<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let (secs, nanos) = encode_system_time(SystemTime::now())?;
            let conn = self.connection()?;
            let changed = conn
                .execute(
                    "UPDATE sessions SET archived_at_secs = ?1, archived_at_nanos = ?2 WHERE id = ?3",
                    params![secs, nanos, id],
                )
                .map_err(|error| sqlite_error("failed to archive session", error))?;

            if changed == 0 {
                return Err(StoreError::not_found(format!("session '{id}' not found")));
            }
            Ok(())
        })
    }

    fn delete_session<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let conn = self.connection()?;
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])
                .map_err(|error| sqlite_error("failed to delete session", error))?;
            Ok(())
        })
    }

    fn touch_session<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let (secs, nanos) = encode_system_time(SystemTime::now())?;
            let conn = self.connection()?;
            conn.execute(
                "UPDATE sessions SET updated_at_secs = ?1, updated_at_nanos = ?2 WHERE id = ?3",
                params![secs, nanos, id],
            )
            .map_err(|error| sqlite_error("failed to touch session", error))?;
            Ok(())
        })
    }

    fn create_message<'a>(&'a self, mut message: MessageRecord) -> StoreFuture<'a, MessageRecord> {
        Box::pin(async move {
            assign_id(&mut message.id);
            message.created_at = SystemTime::now();
            let (secs, nanos) = encode_system_time(message.created_at)?;
            let metadata_json = encode_json(&message.metadata)?;

            let conn = self.connection()?;
            conn.execute(
                "
                INSERT INTO messages (
                    id, session_id, role, content, status, token_count, metadata_json,
                    created_at_secs, created_at_nanos
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ",
                params![
                    &message.id,
                    &message.session_id,
                    message.role.as_str(),
                    &message.content,
                    message.status.as_str(),
                    message.token_count.map(i64::from),
                    metadata_json,
                    secs,
                    nanos,
                ],
            )
            .map_err(|error| sqlite_error("failed to insert message", error))?;

            Ok(message)
        })
    }

    fn get_message<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<MessageRecord>> {
        Box::pin(async move {
            let conn = self.connection()?;
            Self::query_one(
                &conn,
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
                Self::read_message,
            )
        })
    }

    fn list_messages<'a>(
        &'a self,
        session_id: &'a str,
        limit: usize,
        offset: usize,
    ) -> StoreFuture<'a, Vec<MessageRecord>> {
        Box::pin(async move {
            // SQLite treats a negative LIMIT as unbounded.
            let limit = if limit == 0 {
                -1
            } else {
                i64::try_from(limit).unwrap_or(i64::MAX)
            };
            let offset = i64::try_from(offset).unwrap_or(i64::MAX);

            let conn = self.connection()?;
            Self::query_rows(
                &conn,
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE session_id = ?1
                     ORDER BY created_at_secs DESC, created_at_nanos DESC, rowid DESC
                     LIMIT ?2 OFFSET ?3"
                ),
                params![session_id, limit, offset],
                Self::read_message,
            )
        })
    }

    fn update_message<'a>(&'a self, message: MessageRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let metadata_json = encode_json(&message.metadata)?;
            let conn = self.connection()?;
            let changed = conn
                .execute(
                    "
                    UPDATE messages
                    SET content = ?1, status = ?2, token_count = ?3, metadata_json = ?4
                    WHERE id = ?5
                    ",
                    params![
                        &message.content,
                        message.status.as_str(),
                        message.token_count.map(i64::from),
                        metadata_json,
                        &message.id,
                    ],
                )
                .map_err(|error| sqlite_error("failed to update message", error))?;

            if changed == 0 {
                return Err(StoreError::not_found(format!(
                    "message '{}' not found",
                    message.id
                )));
            }
            Ok(())
        })
    }

    fn create_tool_call<'a>(&'a self, mut call: ToolCallRecord) -> StoreFuture<'a, ToolCallRecord> {
        Box::pin(async move {
            assign_id(&mut call.id);
            call.created_at = SystemTime::now();
            let (secs, nanos) = encode_system_time(call.created_at)?;
            let args_json = encode_json(&call.args)?;
            let result_json = call.result.as_ref().map(encode_json).transpose()?;

            let conn = self.connection()?;
            conn.execute(
                "
                INSERT INTO tool_calls (
                    id, session_id, message_id, tool_name, args_json, result_json, error,
                    created_at_secs, created_at_nanos
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ",
                params![
                    &call.id,
                    &call.session_id,
                    &call.message_id,
                    &call.tool_name,
                    args_json,
                    result_json,
                    call.error.as_deref(),
                    secs,
                    nanos,
                ],
            )
            .map_err(|error| sqlite_error("failed to insert tool call", error))?;

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
            let result_json = result.as_ref().map(encode_json).transpose()?;
            let conn = self.connection()?;
            let changed = conn
                .execute(
                    "UPDATE tool_calls SET result_json = ?1, error = ?2 WHERE id = ?3",
                    params![result_json, error.as_deref(), id],
                )
                .map_err(|error| sqlite_error("failed to update tool call", error))?;

            if changed == 0 {
                return Err(StoreError::not_found(format!("tool call '{id}' not found")));
            }
            Ok(())
        })
    }

    fn list_tool_calls<'a>(&'a self, session_id: &'a str) -> StoreFuture<'a, Vec<ToolCallRecord>> {
        Box::pin(async move {
            let conn = self.connection()?;
            Self::query_rows(
                &conn,
                &format!(
                    "SELECT {TOOL_CALL_COLUMNS} FROM tool_calls
                     WHERE session_id = ?1
                     ORDER BY created_at_secs DESC, created_at_nanos DESC, rowid DESC"
                ),
                params![session_id],
                Self::read_tool_call,
            )
        })
    }

    fn get_setting<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move {
            let conn = self.connection()?;
            let stored: Option<Option<String>> = conn
                .query_row(
                    "SELECT value_json FROM settings WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|error| sqlite_error("failed to read setting", error))?;

            match stored.flatten() {
                Some(json) => serde_json::from_str(&json).map(Some).map_err(|error| {
                    StoreError::storage(format!("failed to decode setting '{key}': {error}"))
                }),
                None => Ok(None),
            }
        })
    }

    fn set_setting<'a>(&'a self, key: &'a str, value: Value) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let value_json = encode_json(&value)?;
            let conn = self.connection()?;
            conn.execute(
                "
                INSERT INTO settings (key, value_json) VALUES (?1, ?2)
                ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json
                ",
                params![key, value_json],
            )
            .map_err(|error| sqlite_error("failed to write setting", error))?;
            Ok(())
        })
    }
}

fn column<T: rusqlite::types::FromSql>(row: &Row<'_>, index: usize) -> Result<T, StoreError> {
    row.get(index)
        .map_err(|error| sqlite_error("failed to decode column", error))
}

fn sqlite_error(context: &str, error: rusqlite::Error) -> StoreError {
    let message = format!("{context}: {error}");
    match error.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => StoreError::busy(message),
        Some(ErrorCode::ConstraintViolation) => StoreError::invalid_request(message),
        _ => StoreError::storage(message),
    }
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value)
        .map_err(|error| StoreError::invalid_request(format!("failed to encode JSON column: {error}")))
}

fn decode_map(json: Option<&str>) -> Result<Option<JsonMap>, StoreError> {
    match json.map(str::trim) {
        None | Some("") | Some("null") => Ok(None),
        Some(json) => serde_json::from_str(json)
            .map(Some)
            .map_err(|error| StoreError::storage(format!("failed to decode JSON column: {error}"))),
    }
}

fn encode_system_time(value: SystemTime) -> Result<(i64, i64), StoreError> {
    let duration = value.duration_since(UNIX_EPOCH).map_err(|error| {
        StoreError::invalid_request(format!("timestamp predates unix epoch: {error}"))
    })?;
    Ok((
        duration.as_secs() as i64,
        i64::from(duration.subsec_nanos()),
    ))
}

fn decode_system_time(seconds: i64, nanos: i64) -> Result<SystemTime, StoreError> {
    if seconds < 0 {
        return Err(StoreError::storage(format!(
            "timestamp seconds must be non-negative, got {seconds}"
        )));
    }
    if !(0..1_000_000_000).contains(&nanos) {
        return Err(StoreError::storage(format!(
            "timestamp nanos must be in [0, 1_000_000_000), got {nanos}"
        )));
    }
    Ok(UNIX_EPOCH + Duration::new(seconds as u64, nanos as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_survive_encoding() {
        let now = SystemTime::now();
        let (secs, nanos) = encode_system_time(now).expect("now should encode");
        assert_eq!(decode_system_time(secs, nanos).expect("decode"), now);
        assert!(decode_system_time(-1, 0).is_err());
    }

    #[test]
    fn null_json_columns_decode_to_none() {
        assert_eq!(decode_map(None).expect("none"), None);
        assert_eq!(decode_map(Some("null")).expect("null"), None);
        let map = decode_map(Some("{\"query\":\"rust\"}"))
            .expect("object should decode")
            .expect("object should be present");
        assert_eq!(map["query"], "rust");
    }

    #[tokio::test]
    async fn foreign_key_violations_are_invalid_requests() {
        let store = SqliteRecordStore::new_in_memory().expect("store should open");
        let error = store
            .create_message(MessageRecord::new("missing", MessageRole::User, "hello"))
            .await
            .expect_err("orphan message should fail");

        assert_eq!(error.kind, crate::StoreErrorKind::InvalidRequest);
        assert!(!error.is_retryable());
    }
}
