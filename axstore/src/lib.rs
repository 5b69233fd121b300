//! Session record store: chat sessions, messages, tool calls, and settings.
//!
//! ```rust
//! use axstore::{InMemoryRecordStore, MessageRecord, MessageRole, RecordStore, SessionRecord};
//!
//! # tokio_test_block(async {
//! let store = InMemoryRecordStore::new();
//! let session = store
//!     .create_session(SessionRecord::new("Weather", "gemini-2.0-flash"))
//!     .await
//!     .expect("session should be created");
//! store
//!     .create_message(MessageRecord::new(&session.id, MessageRole::User, "Is it raining?"))
//!     .await
//!     .expect("message should be created");
//! # });
//! # fn tokio_test_block(future: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Builder::new_current_thread().build().expect("runtime").block_on(future);
//! # }
//! ```

mod backends;
mod error;
mod store;
mod types;

pub mod prelude {
    pub use crate::{
        InMemoryRecordStore, JsonMap, MessageRecord, MessageRole, MessageStatus, RecordStore,
        RecordStoreConfig, SessionRecord, SqliteRecordStore, StoreError, StoreErrorKind,
        ToolCallRecord, create_record_store,
    };
}

pub use backends::memory::InMemoryRecordStore;
pub use backends::sqlite::SqliteRecordStore;
pub use error::{StoreError, StoreErrorKind};
pub use store::{RecordStore, RecordStoreConfig, StoreFuture, create_record_store};
pub use types::{
    DEFAULT_USER_ID, JsonMap, MessageRecord, MessageRole, MessageStatus, SessionRecord,
    ToolCallRecord,
};
