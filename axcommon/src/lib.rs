//! Shared identifiers, retry policy, and small runtime utilities for the axe workspace.
//!
//! ```rust
//! use axcommon::{GenerationOptions, MetadataMap, RetryPolicy, SessionId, TurnId};
//!
//! let session = SessionId::from("session-1");
//! let turn = TurnId::new("turn-1");
//! let mut metadata = MetadataMap::new();
//! metadata.insert("delivery".to_string(), "streaming".to_string());
//!
//! let options = GenerationOptions::default().with_temperature(0.3).enable_streaming();
//! assert_eq!(session.as_str(), "session-1");
//! assert_eq!(turn.to_string(), "turn-1");
//! assert!(options.stream);
//! assert_eq!(RetryPolicy::default().max_attempts, 3);
//! ```

pub mod future {
    //! Shared async future aliases.
    //!
    //! ```rust
    //! use axcommon::BoxFuture;
    //!
    //! fn str_len<'a>(value: &'a str) -> BoxFuture<'a, usize> {
    //!     Box::pin(async move { value.len() })
    //! }
    //!
    //! let _future = str_len("hello");
    //! ```

    use std::future::Future;
    use std::pin::Pin;

    pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
}

pub mod context {
    //! Metadata map and identifier newtypes shared across crates.

    use std::collections::HashMap;
    use std::fmt::{Display, Formatter};

    pub type MetadataMap = HashMap<String, String>;

    macro_rules! string_id {
        ($(#[$meta:meta])* $name:ident) => {
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(String);

            impl $name {
                pub fn new(value: impl Into<String>) -> Self {
                    Self(value.into())
                }

                pub fn as_str(&self) -> &str {
                    self.0.as_str()
                }

                pub fn is_empty(&self) -> bool {
                    self.0.trim().is_empty()
                }
            }

            impl Display for $name {
                fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<String> for $name {
                fn from(value: String) -> Self {
                    Self(value)
                }
            }

            impl From<&str> for $name {
                fn from(value: &str) -> Self {
                    Self(value.to_string())
                }
            }

            impl AsRef<str> for $name {
                fn as_ref(&self) -> &str {
                    self.0.as_str()
                }
            }
        };
    }

    string_id!(
        /// Identifier of a persisted chat session.
        SessionId
    );

    string_id!(
        /// Identifier of one in-flight send/receive cycle within a session.
        TurnId
    );
}

pub mod model {
    //! Generation settings carried by model requests.
    //!
    //! ```rust
    //! use axcommon::GenerationOptions;
    //!
    //! let options = GenerationOptions::default()
    //!     .with_temperature(0.2)
    //!     .with_max_tokens(128)
    //!     .enable_streaming();
    //!
    //! assert_eq!(options.temperature, Some(0.2));
    //! assert_eq!(options.max_tokens, Some(128));
    //! assert!(options.stream);
    //! ```

    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    pub struct GenerationOptions {
        pub temperature: Option<f32>,
        pub max_tokens: Option<u32>,
        pub stream: bool,
    }

    impl GenerationOptions {
        pub fn with_temperature(mut self, temperature: f32) -> Self {
            self.temperature = Some(temperature);
            self
        }

        pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
            self.max_tokens = Some(max_tokens);
            self
        }

        pub fn with_streaming(mut self, stream: bool) -> Self {
            self.stream = stream;
            self
        }

        pub fn enable_streaming(self) -> Self {
            self.with_streaming(true)
        }
    }
}

pub mod retry {
    //! Attempt-limited exponential backoff shared by provider calls and store writes.
    //!
    //! ```rust
    //! use std::time::Duration;
    //! use axcommon::RetryPolicy;
    //!
    //! let policy = RetryPolicy::new(3);
    //! assert!(policy.should_retry(1, true));
    //! assert!(!policy.should_retry(3, true));
    //! assert!(!policy.should_retry(1, false));
    //! assert_eq!(policy.backoff_for_attempt(1), Duration::from_millis(200));
    //! ```

    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    pub struct RetryPolicy {
        pub max_attempts: u32,
        pub initial_backoff: Duration,
        pub max_backoff: Duration,
        pub backoff_multiplier: f64,
    }

    impl Default for RetryPolicy {
        fn default() -> Self {
            Self {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(200),
                max_backoff: Duration::from_secs(5),
                backoff_multiplier: 2.0,
            }
        }
    }

    impl RetryPolicy {
        pub fn new(max_attempts: u32) -> Self {
            Self {
                max_attempts: max_attempts.max(1),
                ..Self::default()
            }
        }

        /// Disables retries; the first failure is final.
        pub fn none() -> Self {
            Self::new(1)
        }

        pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
            self.initial_backoff = backoff;
            self
        }

        pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
            self.max_backoff = backoff;
            self
        }

        pub fn should_retry(&self, attempt: u32, retryable: bool) -> bool {
            retryable && attempt < self.max_attempts
        }

        pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
            let exponent = (attempt.saturating_sub(1)) as i32;
            let unbounded =
                self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
            Duration::from_secs_f64(unbounded.min(self.max_backoff.as_secs_f64()))
        }
    }
}

pub mod sse {
    //! Line framing for `text/event-stream` response bodies.
    //!
    //! ```rust
    //! use axcommon::sse::{SseLineBuffer, sse_data_payload};
    //!
    //! let mut buffer = SseLineBuffer::default();
    //! let lines = buffer.push(b"data: {\"ok\":true}\n\n");
    //! assert_eq!(sse_data_payload(&lines[0]), Some("{\"ok\":true}"));
    //! ```

    #[derive(Debug, Default)]
    pub struct SseLineBuffer {
        buffer: Vec<u8>,
    }

    impl SseLineBuffer {
        pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
            self.buffer.extend_from_slice(chunk);
            self.drain_lines(false)
        }

        pub fn finish(&mut self) -> Vec<String> {
            self.drain_lines(true)
        }

        fn drain_lines(&mut self, flush: bool) -> Vec<String> {
            let mut lines = Vec::new();
            let mut start = 0;

            while let Some(offset) = self.buffer[start..].iter().position(|byte| *byte == b'\n') {
                let newline = start + offset;
                let mut end = newline;
                if end > start && self.buffer[end - 1] == b'\r' {
                    end -= 1;
                }

                push_trimmed(&self.buffer[start..end], &mut lines);
                start = newline + 1;
            }

            if flush {
                push_trimmed(&self.buffer[start..], &mut lines);
                self.buffer.clear();
            } else if start > 0 {
                self.buffer.drain(..start);
            }

            lines
        }
    }

    fn push_trimmed(bytes: &[u8], lines: &mut Vec<String>) {
        if let Ok(text) = std::str::from_utf8(bytes) {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
    }

    /// Payload of a `data:` line, or `None` for comments and other fields.
    pub fn sse_data_payload(line: &str) -> Option<&str> {
        line.strip_prefix("data:").map(str::trim)
    }

    pub fn is_event_stream_content_type(content_type: &str) -> bool {
        content_type
            .split(';')
            .next()
            .map(str::trim)
            .is_some_and(|value| value.eq_ignore_ascii_case("text/event-stream"))
    }

}

pub mod registry {
    //! Generic registry map wrapper used by runtime registries.
    //!
    //! ```rust
    //! use axcommon::Registry;
    //!
    //! let mut registry = Registry::new();
    //! registry.insert("alpha".to_string(), 1_u32);
    //!
    //! assert_eq!(registry.get("alpha"), Some(&1));
    //! assert!(registry.contains_key("alpha"));
    //! ```

    use std::borrow::Borrow;
    use std::collections::HashMap;
    use std::hash::Hash;

    #[derive(Debug, Clone)]
    pub struct Registry<K, V> {
        items: HashMap<K, V>,
    }

    impl<K, V> Default for Registry<K, V>
    where
        K: Eq + Hash,
    {
        fn default() -> Self {
            Self {
                items: HashMap::new(),
            }
        }
    }

    impl<K, V> Registry<K, V>
    where
        K: Eq + Hash,
    {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&mut self, key: K, value: V) -> Option<V> {
            self.items.insert(key, value)
        }

        pub fn get<Q>(&self, key: &Q) -> Option<&V>
        where
            K: Borrow<Q>,
            Q: Eq + Hash + ?Sized,
        {
            self.items.get(key)
        }

        pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
        where
            K: Borrow<Q>,
            Q: Eq + Hash + ?Sized,
        {
            self.items.remove(key)
        }

        pub fn contains_key<Q>(&self, key: &Q) -> bool
        where
            K: Borrow<Q>,
            Q: Eq + Hash + ?Sized,
        {
            self.items.contains_key(key)
        }

        pub fn keys(&self) -> impl Iterator<Item = &K> {
            self.items.keys()
        }

        pub fn values(&self) -> impl Iterator<Item = &V> {
            self.items.values()
        }

        pub fn clear(&mut self) {
            self.items.clear();
        }

        pub fn len(&self) -> usize {
            self.items.len()
        }

        pub fn is_empty(&self) -> bool {
            self.items.is_empty()
        }
    }
}

pub use context::{MetadataMap, SessionId, TurnId};
pub use future::BoxFuture;
pub use model::GenerationOptions;
pub use registry::Registry;
pub use retry::RetryPolicy;
